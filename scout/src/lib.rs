#![deny(missing_docs)]
//! Application layer of the scout search client.
//!
//! [`Workbench`] is the controller a front end drives: it holds the
//! provider/model selection, runs one search or document analysis at a time
//! into a [`ResultBuffer`], cancels superseded actions, and turns every
//! failure into a [`Notice`]. [`ScoutConfig`] is the `scout.json` file the
//! `scout` binary reads.

pub mod buffer;
pub mod config;
pub mod document;
pub mod error;
pub mod notice;
pub mod workbench;

pub use buffer::ResultBuffer;
pub use config::{ConfigError, OidcConfig, ScoutConfig};
pub use error::WorkbenchError;
pub use notice::{Notice, NoticeLevel};
pub use workbench::{ActionOutcome, Workbench};
