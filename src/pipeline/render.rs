//! PDF rasterisation: render every page of a PDF to PNG files in a temp dir.
//!
//! ## Why files, not in-memory images?
//!
//! A policy handbook can run to hundreds of pages at 300 DPI. Writing each
//! page to disk as soon as it is rendered keeps peak memory at one page;
//! page tasks read their own image back when they need it. The temp dir is
//! owned by [`RenderedPages`] and removed by [`RenderedPages::release`] (or
//! on drop) whatever the outcome of the batch.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! [`render_document`] moves the work onto Tokio's blocking pool so worker
//! threads never stall.

use crate::config::ExpenseConfig;
use crate::error::ExpenseError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Rendering parameters handed to a [`Rasterizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_pixels: u32,
    pub password: Option<String>,
}

impl RenderOptions {
    pub fn from_config(config: &ExpenseConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
        }
    }
}

/// One rendered page on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// 1-based page number.
    pub page_num: usize,
    pub path: PathBuf,
}

/// Ordered page images plus the temp dir that holds them.
#[derive(Debug)]
pub struct RenderedPages {
    pages: Vec<PageImage>,
    dir: TempDir,
}

impl RenderedPages {
    pub fn new(dir: TempDir, pages: Vec<PageImage>) -> Self {
        Self { pages, dir }
    }

    pub fn pages(&self) -> &[PageImage] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the page images. Failures are logged, never returned.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Released page images in {}", path.display()),
            Err(e) => warn!("Could not remove page images in {}: {}", path.display(), e),
        }
    }
}

/// Turns a PDF into page images.
pub trait Rasterizer: Send + Sync {
    /// Blocking. Called from the blocking thread pool.
    fn rasterize(&self, pdf: &Path, options: &RenderOptions) -> Result<RenderedPages, ExpenseError>;
}

/// Default [`Rasterizer`] backed by pdfium.
///
/// Binds to the library in `PDFIUM_LIB_PATH` when set, else the system one.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRasterizer;

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &Path, options: &RenderOptions) -> Result<RenderedPages, ExpenseError> {
        let pdfium = bind_pdfium()?;
        let password = options.password.as_deref();

        let document = pdfium
            .load_pdf_from_file(pdf, password)
            .map_err(|e| classify_load_error(pdf, password.is_some(), format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);
        if total_pages == 0 {
            return Err(ExpenseError::EmptyDocument {
                path: pdf.to_path_buf(),
            });
        }

        let max_pixels = options.max_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(max_pixels)
            .set_maximum_height(max_pixels);

        let dir = TempDir::new().map_err(|e| ExpenseError::Internal(e.to_string()))?;
        let mut rendered = Vec::with_capacity(total_pages);

        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                ExpenseError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            let path = dir.path().join(format!("page_{page_num}.png"));
            image
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| ExpenseError::RasterisationFailed {
                    page: page_num,
                    detail: e.to_string(),
                })?;

            debug!(
                "Rendered page {} → {}x{} px",
                page_num,
                image.width(),
                image.height()
            );
            rendered.push(PageImage { page_num, path });
        }

        Ok(RenderedPages::new(dir, rendered))
    }
}

fn bind_pdfium() -> Result<Pdfium, ExpenseError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExpenseError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn classify_load_error(pdf: &Path, had_password: bool, detail: String) -> ExpenseError {
    if detail.to_lowercase().contains("password") {
        if had_password {
            ExpenseError::WrongPassword {
                path: pdf.to_path_buf(),
            }
        } else {
            ExpenseError::PasswordRequired {
                path: pdf.to_path_buf(),
            }
        }
    } else {
        ExpenseError::CorruptPdf {
            path: pdf.to_path_buf(),
            detail,
        }
    }
}

/// Rasterise every page of `pdf` with the configured [`Rasterizer`].
pub async fn render_document(
    pdf: &Path,
    config: &ExpenseConfig,
) -> Result<RenderedPages, ExpenseError> {
    let rasterizer: Arc<dyn Rasterizer> = config
        .rasterizer
        .clone()
        .unwrap_or_else(|| Arc::new(PdfiumRasterizer));
    let path = pdf.to_path_buf();
    let options = RenderOptions::from_config(config);

    tokio::task::spawn_blocking(move || rasterizer.rasterize(&path, &options))
        .await
        .map_err(|e| ExpenseError::Internal(format!("Render task panicked: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_removes_page_images() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page_1.png");
        std::fs::write(&path, b"png").unwrap();
        let pages = RenderedPages::new(dir, vec![PageImage { page_num: 1, path: path.clone() }]);

        let root = pages.dir().to_path_buf();
        assert_eq!(pages.len(), 1);
        pages.release();
        assert!(!path.exists());
        assert!(!root.exists());
    }

    #[test]
    fn password_errors_are_classified() {
        let p = Path::new("x.pdf");
        assert!(matches!(
            classify_load_error(p, false, "PasswordError".into()),
            ExpenseError::PasswordRequired { .. }
        ));
        assert!(matches!(
            classify_load_error(p, true, "PdfiumLibraryInternalError(PasswordError)".into()),
            ExpenseError::WrongPassword { .. }
        ));
        assert!(matches!(
            classify_load_error(p, false, "FormatError".into()),
            ExpenseError::CorruptPdf { .. }
        ));
    }

    #[test]
    fn options_follow_config() {
        let config = ExpenseConfig::builder()
            .dpi(150)
            .password("secret")
            .build()
            .unwrap();
        let opts = RenderOptions::from_config(&config);
        assert_eq!(opts.dpi, 150);
        assert_eq!(opts.max_pixels, 2400);
        assert_eq!(opts.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn configured_rasterizer_is_used() {
        struct OnePage;
        impl Rasterizer for OnePage {
            fn rasterize(&self, _pdf: &Path, o: &RenderOptions) -> Result<RenderedPages, ExpenseError> {
                let dir = TempDir::new().map_err(|e| ExpenseError::Internal(e.to_string()))?;
                let path = dir.path().join(format!("dpi_{}.png", o.dpi));
                std::fs::write(&path, b"").map_err(|e| ExpenseError::Internal(e.to_string()))?;
                Ok(RenderedPages::new(dir, vec![PageImage { page_num: 1, path }]))
            }
        }

        let config = ExpenseConfig::builder()
            .dpi(100)
            .rasterizer(Arc::new(OnePage))
            .build()
            .unwrap();
        let pages = render_document(Path::new("ignored.pdf"), &config).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages.pages()[0].path.ends_with("dpi_100.png"));
        pages.release();
    }
}
