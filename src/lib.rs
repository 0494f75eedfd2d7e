pub mod audit;
pub mod config;
pub mod error;
pub mod ostree;

// Re-export commonly used types for convenience
pub use error::{OstreeError, Result};
pub use ostree::{OstreeVersion, Parsed, Repository, Response};
