//! Pipeline stages for policy and invoice extraction.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ pages ──────────────────────▶ dedup ──▶ policies
//! (path/URL) (pdfium)   (encode → reasoner → recover)  (signature)
//!    │
//!    └──▶ webtext ──▶ (text prompt → reasoner → recover) ──▶ dedup
//!
//! invoice + catalog ──▶ filter ──▶ compliance prompt ──▶ reasoner ──▶ recover
//! ```
//!
//! 1. [`input`]   — validate local files, fetch URLs with a size cap
//! 2. [`render`]  — rasterise pages to PNG files in a temp dir (`spawn_blocking`)
//! 3. [`encode`]  — sniff and base64-wrap page or receipt images
//! 4. [`pages`]   — bounded-concurrency fan-out of page images to the reasoner
//! 5. [`recover`] — pull a JSON object out of free-form model output
//! 6. [`dedup`]   — drop near-duplicate rules across pages, assign ids
//! 7. [`filter`]  — select the rules whose scope admits an invoice
//! 8. [`webtext`] — reduce fetched HTML to plain text

pub mod dedup;
pub mod encode;
pub mod filter;
pub mod input;
pub mod pages;
pub mod recover;
pub mod render;
pub mod webtext;
