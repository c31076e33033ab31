//! Error types for the render service

use thiserror::Error;

/// Result type alias for render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering a page
///
/// The HTTP layer collapses everything except `Config` into one generic
/// failure response; the specific variant is only ever logged server-side.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch the browser or open a tab
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Failed to navigate to the target URL
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Load condition not met within the navigation timeout
    #[error("Page load timed out after {0}ms")]
    Timeout(u64),

    /// Failed to serialize the rendered document
    #[error("Content extraction failed: {0}")]
    Extraction(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}
