#![deny(missing_docs)]
//! Shared data model for the scout search client.
//!
//! Everything here is plain data: providers and their model catalog, the
//! query and the frames a streaming search decodes into, and the history
//! records the server keeps. No I/O happens in this crate.

pub mod catalog;
pub mod error;
pub mod history;
pub mod types;

pub use catalog::*;
pub use error::*;
pub use history::*;
pub use types::*;
