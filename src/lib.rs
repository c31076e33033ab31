//! renderd
//!
//! A single-endpoint HTTP service that loads a URL in headless Chrome and
//! returns the fully rendered HTML, including content produced by client-side
//! JavaScript up to the configured load-completion condition.
//!
//! # Features
//!
//! - **Per-request isolation**: every render launches its own Chrome process
//!   and tears it down before the response is sent, on every exit path
//! - **Configurable load policy**: network-idle heuristics or DOM-ready plus
//!   full network idle, bounded by a navigation timeout
//! - **Optional fingerprint masking**: user agent, headers, and a
//!   pre-navigation patch that hides common automation markers
//!
//! # Example
//!
//! ```no_run
//! use renderd::{cdp::CdpRenderer, LoadCondition, RenderConfig, Renderer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RenderConfig {
//!     navigation_timeout_ms: 30_000,
//!     load_condition: LoadCondition::NetworkIdle2,
//!     ..Default::default()
//! };
//!
//! let renderer = CdpRenderer::new(config);
//! let html = renderer.render("https://example.com")?;
//! println!("{} bytes of rendered HTML", html.len());
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub mod error;
pub use error::{Error, Result};

pub mod cdp;
pub mod server;

/// Configuration for a render service instance
///
/// The original deployment ran as two near-identical services that differed
/// only in wait policy, timeout, and fingerprint handling; those knobs are
/// expressed here as one structure. Defaults match the plain variant:
/// `networkidle2`, 30 second timeout, no identity spoofing.
///
/// # Examples
///
/// ```
/// let cfg = renderd::RenderConfig::default();
/// assert_eq!(cfg.navigation_timeout_ms, 30_000);
/// assert!(!cfg.spoof_identity);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Upper bound for navigation plus the load-completion wait, in milliseconds
    pub navigation_timeout_ms: u64,
    /// Policy that decides when a page counts as loaded
    pub load_condition: LoadCondition,
    /// Whether to mask automation markers and send a desktop user agent
    pub spoof_identity: bool,
    /// Additional Chrome launch arguments
    pub extra_args: Vec<String>,
    /// User agent sent when `spoof_identity` is set
    pub user_agent: String,
    /// Extra HTTP headers sent when `spoof_identity` is set
    pub headers: HashMap<String, String>,
    /// Viewport dimensions for the browser window
    pub viewport: Viewport,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            load_condition: LoadCondition::NetworkIdle2,
            spoof_identity: false,
            extra_args: Vec::new(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            headers: HashMap::new(),
            viewport: Viewport::default(),
        }
    }
}

/// Load-completion policy for a navigation
///
/// "In-flight connections" counts fetches, XHRs, and incomplete images as
/// observed from inside the page. The idle window is 500ms in all variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCondition {
    /// Navigation committed and zero in-flight connections
    NetworkIdle0,
    /// Navigation committed and at most two in-flight connections
    NetworkIdle2,
    /// DOM parsed and zero in-flight connections
    DomContentLoadedNetworkIdle0,
}

impl FromStr for LoadCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "networkidle0" => Ok(Self::NetworkIdle0),
            "networkidle2" => Ok(Self::NetworkIdle2),
            "domcontentloaded" => Ok(Self::DomContentLoadedNetworkIdle0),
            other => Err(Error::Config(format!(
                "unrecognized load condition '{other}' (expected networkidle0, networkidle2, or domcontentloaded)"
            ))),
        }
    }
}

impl fmt::Display for LoadCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NetworkIdle0 => "networkidle0",
            Self::NetworkIdle2 => "networkidle2",
            Self::DomContentLoadedNetworkIdle0 => "domcontentloaded",
        };
        f.write_str(s)
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Core trait for render backends
///
/// One call renders one URL in a freshly launched, exclusively owned browser
/// instance that is released before the call returns, whatever the outcome.
/// The trait is the seam the HTTP layer is tested through.
pub trait Renderer: Send + Sync {
    /// Load `url`, wait for the configured load condition, and return the
    /// serialized post-JavaScript document.
    fn render(&self, url: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RenderConfig::default();
        assert_eq!(config.navigation_timeout_ms, 30_000);
        assert_eq!(config.load_condition, LoadCondition::NetworkIdle2);
        assert!(!config.spoof_identity);
        assert!(config.extra_args.is_empty());
        assert_eq!(config.viewport.width, 1280);
        assert_eq!(config.viewport.height, 720);
    }

    #[test]
    fn test_load_condition_parsing() {
        assert_eq!(
            "networkidle0".parse::<LoadCondition>().unwrap(),
            LoadCondition::NetworkIdle0
        );
        assert_eq!(
            "NetworkIdle2".parse::<LoadCondition>().unwrap(),
            LoadCondition::NetworkIdle2
        );
        assert_eq!(
            "domcontentloaded".parse::<LoadCondition>().unwrap(),
            LoadCondition::DomContentLoadedNetworkIdle0
        );
    }

    #[test]
    fn test_load_condition_rejects_unknown() {
        let err = "idle-ish".parse::<LoadCondition>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("idle-ish"));
    }

    #[test]
    fn test_load_condition_display_round_trip() {
        for cond in [
            LoadCondition::NetworkIdle0,
            LoadCondition::NetworkIdle2,
            LoadCondition::DomContentLoadedNetworkIdle0,
        ] {
            let parsed = cond.to_string().parse::<LoadCondition>().unwrap();
            assert_eq!(parsed, cond);
        }
    }
}
