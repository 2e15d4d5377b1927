//! Core engine for deploywatch: authenticated extraction from a
//! browser-rendered deployment console, and reconciliation of each
//! extracted snapshot batch against persisted deployment history.

pub mod config;
pub mod console;
pub mod error;
pub mod extract;
pub mod model;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod watch;

pub use config::WatchConfig;
pub use console::{Console, ConsoleConnector};
pub use error::{AuthError, ConfigError, ConsoleError, ExtractError, StoreError};
pub use model::{DeploymentRecord, DeploymentSnapshot, MULTI_APP_SENTINEL};
pub use reconcile::{MergeSummary, acknowledge_notification, reconcile};
pub use session::SessionManager;
pub use store::{DeploymentStore, JsonStore};
pub use watch::{RefreshOutcome, Watcher};
