//! Rule-based assistant configuration for notebook cells.
//!
//! This crate provides:
//! - [`notebook`]: host cell/notebook abstractions and an `.ipynb` implementation
//! - [`context`]: the per-cell snapshot predicates are evaluated against
//! - [`predicate`]: the predicate evaluator
//! - [`resolver`]: folds matching rules and the cell override into a [`RuleConfig`]
//!
//! [`RuleConfig`]: jupytutor_shared::RuleConfig

pub mod context;
pub mod notebook;
pub mod predicate;
pub mod resolver;

pub use context::{CellContext, CellContextCache, ContextLookup, build as build_context};
pub use notebook::{CellHandle, IpynbCell, IpynbNotebook, NotebookHandle};
pub use predicate::{evaluate, string_matches};
pub use resolver::{cell_override, merge, parse_override, resolve, resolve_all};
