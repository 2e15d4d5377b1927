//! Minimal Chrome DevTools Protocol client.
//!
//! Covers exactly what a scraping session needs: discovering and launching a
//! local Chromium, attaching to a page target over the DevTools WebSocket,
//! navigating, evaluating JavaScript, and capturing screenshots. Commands
//! are correlated with responses by id over a single shared connection.

pub mod browser;
pub mod connection;
pub mod error;
pub mod launcher;
pub mod page;

pub use browser::{Browser, LaunchOptions};
pub use connection::Connection;
pub use error::{CdpError, Result};
pub use page::Page;
