//! Page scraping and content extraction.
//!
//! This crate provides:
//! - [`adapters`]: platform-specific main-content extractors (Jupyter Book, Sphinx, generic)
//! - [`AdapterRegistry`]: detects the best adapter for a given HTML document
//! - [`engine`]: [`PageScraper`], the fetch → extract → text pipeline with `[LINK]` markers

pub mod adapters;
pub mod engine;

pub use adapters::{
    AdapterRegistry, ExtractedContent, GenericAdapter, JupyterBookAdapter, PlatformAdapter,
    SphinxAdapter,
};
pub use engine::{PageScraper, mark_source};
