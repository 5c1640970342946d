//! Input resolution: validate local files and fetch policy URLs.
//!
//! pdfium needs a file-system path, so a PDF fetched from a URL is written to
//! a `TempDir` that lives as long as the returned [`ResolvedInput`]. Magic
//! bytes are checked up front so callers get a meaningful error rather than a
//! pdfium failure.

use crate::error::ExpenseError;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// A PDF ready for rasterisation: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` is kept alive until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

/// Kind of an uploaded invoice file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Image,
}

impl FromStr for FileKind {
    type Err = ExpenseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pdf" => Ok(FileKind::Pdf),
            "image" | "img" | "png" | "jpg" | "jpeg" => Ok(FileKind::Image),
            other => Err(ExpenseError::InvalidInput {
                input: other.to_string(),
                reason: "file type must be 'pdf' or 'image'".into(),
            }),
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileKind::Pdf => "pdf",
            FileKind::Image => "image",
        })
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Open `path` for reading, mapping failures to the matching error.
fn open_readable(path: &Path) -> Result<std::fs::File, ExpenseError> {
    if !path.exists() {
        return Err(ExpenseError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExpenseError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => ExpenseError::FileNotFound {
            path: path.to_path_buf(),
        },
    })
}

/// Validate a local PDF: it must exist, be readable and start with `%PDF`.
pub fn resolve_local_pdf(path: &Path) -> Result<ResolvedInput, ExpenseError> {
    let mut file = open_readable(path)?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
        return Err(ExpenseError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path.to_path_buf()))
}

/// Validate that a local file exists and is readable.
pub fn ensure_readable(path: &Path) -> Result<(), ExpenseError> {
    open_readable(path).map(|_| ())
}

/// Body of a fetched URL.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FetchedBody {
    /// Whether the body is a PDF, by content type or magic bytes.
    pub fn is_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.to_lowercase().contains("application/pdf"))
    }

    /// The body decoded as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Write a PDF body to a temp file.
    pub async fn into_pdf(self) -> Result<ResolvedInput, ExpenseError> {
        if !self.bytes.starts_with(b"%PDF") {
            let mut magic = [0u8; 4];
            let n = self.bytes.len().min(4);
            magic[..n].copy_from_slice(&self.bytes[..n]);
            return Err(ExpenseError::NotAPdf {
                path: PathBuf::from(&self.url),
                magic,
            });
        }

        let temp_dir = TempDir::new().map_err(|e| ExpenseError::Internal(e.to_string()))?;
        let path = temp_dir.path().join(filename_from_url(&self.url));
        tokio::fs::write(&path, &self.bytes)
            .await
            .map_err(|e| ExpenseError::Internal(format!("Failed to write temp file: {}", e)))?;

        info!("Downloaded to: {}", path.display());
        Ok(ResolvedInput::Downloaded {
            path,
            _temp_dir: temp_dir,
        })
    }
}

/// Fetch a URL with a timeout and a body size cap.
pub async fn fetch_url(
    url: &str,
    timeout_secs: u64,
    max_bytes: u64,
) -> Result<FetchedBody, ExpenseError> {
    info!("Fetching: {}", url);

    let transport_error = |e: reqwest::Error| {
        if e.is_timeout() {
            ExpenseError::FetchTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExpenseError::FetchFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExpenseError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut response = client.get(url).send().await.map_err(transport_error)?;

    if !response.status().is_success() {
        return Err(ExpenseError::FetchFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(declared) = response.content_length() {
        if declared > max_bytes {
            return Err(ExpenseError::ContentTooLarge {
                url: url.to_string(),
                limit: max_bytes,
                actual: declared,
            });
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
        bytes.extend_from_slice(&chunk);
        if bytes.len() as u64 > max_bytes {
            return Err(ExpenseError::ContentTooLarge {
                url: url.to_string(),
                limit: max_bytes,
                actual: bytes.len() as u64,
            });
        }
    }

    debug!(
        "Fetched {} bytes ({})",
        bytes.len(),
        content_type.as_deref().unwrap_or("no content type")
    );

    Ok(FetchedBody {
        url: url.to_string(),
        content_type,
        bytes,
    })
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/policy.pdf"));
        assert!(is_url("http://example.com/travel"));
        assert!(!is_url("/tmp/policy.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn file_kind_parses_loosely() {
        assert_eq!("PDF".parse::<FileKind>().unwrap(), FileKind::Pdf);
        assert_eq!("image".parse::<FileKind>().unwrap(), FileKind::Image);
        assert_eq!("jpeg".parse::<FileKind>().unwrap(), FileKind::Image);
        assert!("docx".parse::<FileKind>().is_err());
        assert_eq!(FileKind::Image.to_string(), "image");
    }

    #[test]
    fn local_pdf_validation() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("nope.pdf");
        assert!(matches!(
            resolve_local_pdf(&missing),
            Err(ExpenseError::FileNotFound { .. })
        ));

        let png = dir.path().join("scan.pdf");
        std::fs::write(&png, b"\x89PNG\r\n").unwrap();
        match resolve_local_pdf(&png) {
            Err(ExpenseError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"\x89PNG"),
            other => panic!("unexpected: {other:?}"),
        }

        let pdf = dir.path().join("policy.pdf");
        std::fs::write(&pdf, b"%PDF-1.7\n").unwrap();
        assert_eq!(resolve_local_pdf(&pdf).unwrap().path(), pdf.as_path());
    }

    #[test]
    fn filenames_come_from_the_url_path() {
        assert_eq!(filename_from_url("https://x.org/docs/travel.pdf"), "travel.pdf");
        assert_eq!(filename_from_url("https://x.org/docs/"), "downloaded.pdf");
        assert_eq!(filename_from_url("not a url"), "downloaded.pdf");
    }

    #[test]
    fn pdf_detection_uses_type_or_magic() {
        let body = |ct: Option<&str>, bytes: &[u8]| FetchedBody {
            url: "https://x.org/p".into(),
            content_type: ct.map(str::to_string),
            bytes: bytes.to_vec(),
        };
        assert!(body(Some("application/pdf"), b"").is_pdf());
        assert!(body(Some("application/octet-stream"), b"%PDF-1.4").is_pdf());
        assert!(!body(Some("text/html; charset=utf-8"), b"<html>").is_pdf());
    }

    #[tokio::test]
    async fn non_pdf_body_cannot_become_a_pdf_file() {
        let body = FetchedBody {
            url: "https://x.org/p.pdf".into(),
            content_type: Some("application/pdf".into()),
            bytes: b"<h".to_vec(),
        };
        match body.into_pdf().await {
            Err(ExpenseError::NotAPdf { magic, .. }) => assert_eq!(&magic, b"<h\0\0"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(content_type: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type,
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        });
        format!("http://{}/travel-policy", addr)
    }

    #[tokio::test]
    async fn fetch_returns_body_and_content_type() {
        let url = serve_once("text/html", b"<p>Meals capped at $50</p>".to_vec()).await;
        let body = fetch_url(&url, 5, 1024).await.unwrap();
        assert_eq!(body.content_type.as_deref(), Some("text/html"));
        assert_eq!(body.text(), "<p>Meals capped at $50</p>");
        assert!(!body.is_pdf());
    }

    #[tokio::test]
    async fn fetch_rejects_oversized_bodies() {
        let url = serve_once("text/html", vec![b'a'; 2048]).await;
        match fetch_url(&url, 5, 1024).await {
            Err(ExpenseError::ContentTooLarge { limit, actual, .. }) => {
                assert_eq!(limit, 1024);
                assert!(actual > 1024);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
