//! Chrome DevTools Protocol render backend

use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};

use crate::{Error, LoadCondition, RenderConfig, Renderer, Result};

/// How often the load-condition wait probes the page
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long the network must stay at or below the allowed connection count
/// before it counts as idle
const IDLE_QUIET_WINDOW: Duration = Duration::from_millis(500);

/// Installed before navigation so the idle wait can observe in-flight work
/// from inside the page: fetches, XHRs, and images that have not finished.
const NETWORK_PROBE_SCRIPT: &str = r#"(() => {
    if (window.__renderd_inflight !== undefined) return;
    let inflight = 0;
    Object.defineProperty(window, '__renderd_inflight', {
        get: () => {
            const images = document.images
                ? Array.from(document.images).filter(i => !i.complete).length
                : 0;
            return inflight + images;
        },
    });
    const realFetch = window.fetch;
    if (realFetch) {
        window.fetch = function (...args) {
            inflight += 1;
            return realFetch.apply(this, args).finally(() => { inflight -= 1; });
        };
    }
    const realSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.send = function (...args) {
        inflight += 1;
        this.addEventListener('loadend', () => { inflight -= 1; }, { once: true });
        return realSend.apply(this, args);
    };
})();"#;

/// Masks the markers that most automation checks probe for. Only installed
/// when `spoof_identity` is set; has no effect on the render contract, only
/// on what fingerprint-sensitive sites choose to serve.
const STEALTH_SCRIPT: &str = r#"(() => {
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    if (!window.chrome) {
        window.chrome = { runtime: {} };
    }
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [{ name: 'Chrome PDF Viewer' }, { name: 'Native Client' }],
    });
})();"#;

/// CDP-based renderer (uses the `headless_chrome` crate)
///
/// Each `render` call launches a fresh headless Chrome process, drives a
/// single tab through navigation and extraction, and lets the process die
/// with the `Browser` handle when the call returns. Nothing is shared or
/// reused between calls, so concurrent renders are fully independent.
pub struct CdpRenderer {
    config: RenderConfig,
    launch_attempts: AtomicU64,
}

impl CdpRenderer {
    /// Create a renderer with the given configuration. No browser is
    /// launched until the first `render` call.
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            launch_attempts: AtomicU64::new(0),
        }
    }

    /// Number of browser launches attempted so far. Instrumentation hook for
    /// tests that assert input validation never reaches the browser.
    pub fn launch_attempts(&self) -> u64 {
        self.launch_attempts.load(Ordering::Relaxed)
    }

    fn launch(&self) -> Result<Browser> {
        let args: Vec<&OsStr> = self.config.extra_args.iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((self.config.viewport.width, self.config.viewport.height)))
            .args(args)
            .build()
            .map_err(|e| Error::Launch(format!("failed to build launch options: {e}")))?;

        Browser::new(launch_options)
            .map_err(|e| Error::Launch(format!("failed to launch browser: {e}")))
    }

    /// Everything between launch and teardown. Runs against a borrowed
    /// `Browser` so early returns still drop the instance in `render`.
    fn drive(&self, browser: &Browser, url: &str) -> Result<String> {
        let timeout = Duration::from_millis(self.config.navigation_timeout_ms);
        let deadline = Instant::now() + timeout;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::Launch(format!("failed to create tab: {e}")))?;
        tab.set_default_timeout(timeout);

        self.install_script(&tab, NETWORK_PROBE_SCRIPT)?;
        if self.config.spoof_identity {
            self.apply_identity(&tab)?;
        }

        tab.navigate_to(url)
            .map_err(|e| Error::Navigation(format!("navigation to {url} failed: {e}")))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::Navigation(format!("wait for navigation failed: {e}")))?;

        self.wait_for_load(&tab, deadline)?;

        tab.get_content()
            .map_err(|e| Error::Extraction(format!("failed to serialize document: {e}")))
    }

    fn apply_identity(&self, tab: &Tab) -> Result<()> {
        tab.set_user_agent(&self.config.user_agent, None, None)
            .map_err(|e| Error::Launch(format!("failed to set user agent: {e}")))?;

        if !self.config.headers.is_empty() {
            // headless_chrome expects a HashMap<&str, &str>
            let headers: std::collections::HashMap<&str, &str> = self
                .config
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();

            tab.set_extra_http_headers(headers)
                .map_err(|e| Error::Launch(format!("failed to set headers: {e}")))?;
        }

        self.install_script(tab, STEALTH_SCRIPT)
    }

    fn install_script(&self, tab: &Tab, source: &str) -> Result<()> {
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: source.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|e| Error::Launch(format!("failed to install page script: {e}")))?;
        Ok(())
    }

    fn wait_for_load(&self, tab: &Tab, deadline: Instant) -> Result<()> {
        match self.config.load_condition {
            LoadCondition::NetworkIdle2 => self.wait_network_idle(tab, 2, deadline),
            LoadCondition::NetworkIdle0 => self.wait_network_idle(tab, 0, deadline),
            LoadCondition::DomContentLoadedNetworkIdle0 => {
                self.wait_dom_ready(tab, deadline)?;
                self.wait_network_idle(tab, 0, deadline)
            }
        }
    }

    /// Poll until `document.readyState` has moved past `loading`.
    fn wait_dom_ready(&self, tab: &Tab, deadline: Instant) -> Result<()> {
        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(self.config.navigation_timeout_ms));
            }
            let state = self.probe_string(tab, "document.readyState")?;
            if state != "loading" {
                return Ok(());
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    /// Poll until the in-flight connection count stays at or below `allowed`
    /// for the full quiet window, or the deadline passes.
    fn wait_network_idle(&self, tab: &Tab, allowed: i64, deadline: Instant) -> Result<()> {
        let mut quiet_since: Option<Instant> = None;
        loop {
            if Instant::now() >= deadline {
                return Err(Error::Timeout(self.config.navigation_timeout_ms));
            }
            let inflight = self.probe_inflight(tab)?;
            if inflight <= allowed {
                let since = *quiet_since.get_or_insert_with(Instant::now);
                if since.elapsed() >= IDLE_QUIET_WINDOW {
                    return Ok(());
                }
            } else {
                quiet_since = None;
            }
            std::thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    fn probe_inflight(&self, tab: &Tab) -> Result<i64> {
        let eval = tab
            .evaluate(
                "window.__renderd_inflight === undefined ? 0 : window.__renderd_inflight",
                false,
            )
            .map_err(|e| Error::Navigation(format!("network idle probe failed: {e}")))?;

        // CDP may serialize the counter as an integer or a double; a missing
        // counter (the instrumented document was replaced by a cross-origin
        // navigation) is treated as quiet rather than aborting.
        Ok(eval
            .value
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .unwrap_or(0))
    }

    fn probe_string(&self, tab: &Tab, expr: &str) -> Result<String> {
        let eval = tab
            .evaluate(expr, false)
            .map_err(|e| Error::Navigation(format!("page probe failed: {e}")))?;

        match eval.value {
            Some(val) if val.is_string() => Ok(val.as_str().unwrap_or_default().to_string()),
            Some(val) => Ok(val.to_string()),
            None => Err(Error::Navigation(format!("no value returned for probe '{expr}'"))),
        }
    }
}

impl Renderer for CdpRenderer {
    fn render(&self, url: &str) -> Result<String> {
        self.launch_attempts.fetch_add(1, Ordering::Relaxed);
        debug!("launching browser for {url}");

        let browser = self.launch()?;

        // `Browser` terminates the Chrome child process on drop, so every
        // early return inside drive() still releases the instance. Failures
        // during teardown are swallowed by the drop path.
        let result = self.drive(&browser, url);
        if let Err(ref err) = result {
            warn!("render of {url} failed: {err}");
        }
        result
    }
}
