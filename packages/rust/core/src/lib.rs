//! Tutoring orchestration for Jupytutor.
//!
//! This crate ties rule resolution, link extraction, chapter expansion and
//! page scraping together: per-notebook state, per-cell assistant config, and
//! background context retrieval.

pub mod retriever;
pub mod session;
pub mod state;

pub use retriever::{ContextRetriever, RetrievalPhase, RetrieverConfig, filter_links};
pub use session::{CellAssist, TutorSession};
pub use state::{ConfigSubscribers, NotebookState, NotebookStore, SubscriptionId};
