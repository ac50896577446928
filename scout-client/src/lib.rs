#![deny(missing_docs)]
//! HTTP client for the scout AI search service.
//!
//! [`ScoutClient`] wraps the authenticated endpoints: streaming search,
//! document upload and deletion, the model catalog and history. Search
//! responses are server-sent events decoded incrementally by
//! [`FrameDecoder`]; see the [`streaming`] module for the framing rules.
//!
//! [`Accounts`] covers the unauthenticated login and registration endpoints,
//! and [`PasswordTokenSource`] plugs password login into a
//! [`scout_auth::Session`].

mod accounts;
mod client;
mod error;
pub mod streaming;
mod types;

pub use accounts::{Accounts, PasswordTokenSource};
pub use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, ScoutClient};
pub use streaming::{FrameDecoder, decode_frames};
pub use types::Registration;
