//! Prerender
//!
//! Build-time prerendering for a client-rendered single-page site. A local
//! static server exposes the built output directory, a headless browser loads
//! the root page, and once client rendering has settled the live document
//! markup is written back over the entry document so crawlers and link
//! previews see the rendered content.
//!
//! # Features
//!
//! - **CDP Backend** (default): drives headless Chrome over the DevTools protocol
//! - **Pluggable renderer**: the pipeline is generic over the [`Renderer`] trait
//! - **Safe defaults**: loopback-only server, confined path resolution, atomic write
//!
//! # Example
//!
//! ```no_run
//! use prerender::{PrerenderConfig, Prerenderer};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = PrerenderConfig::default();
//! config.server.root = "dist".into();
//!
//! let report = Prerenderer::new(config).run().await?;
//! println!("wrote {} bytes to {}", report.bytes, report.entry.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod server;
pub use server::{ServerConfig, StaticServer};

pub mod renderer;
pub use renderer::Renderer;

pub mod quiescence;

pub mod snapshot;
pub use snapshot::{Snapshot, SnapshotReport};

// Async-friendly browser API (worker-thread backed)
pub mod async_api;
pub use async_api::Browser;

pub mod prerender;
pub use prerender::Prerenderer;

#[cfg(feature = "cdp")]
pub mod cdp;

/// Browser settings used when launching a renderer
///
/// The defaults match a desktop viewport and a 30 second navigation budget.
///
/// # Examples
///
/// ```
/// let cfg = prerender::BrowserConfig::default();
/// assert_eq!(cfg.timeout_ms, 30000);
/// assert!(cfg.sandbox);
/// ```
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Viewport dimensions
    pub viewport: Viewport,
    /// Budget in milliseconds shared by navigation and the network-idle wait
    pub timeout_ms: u64,
    /// Trailing window with no new network activity that counts as idle
    pub idle_window_ms: u64,
    /// Run Chrome with its sandbox enabled
    pub sandbox: bool,
    /// Explicit Chrome binary; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timeout_ms: 30000,
            idle_window_ms: 500,
            sandbox: true,
            chrome_path: None,
        }
    }
}

impl BrowserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
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

/// How the pipeline decides that client rendering has settled after the
/// network went idle.
#[derive(Debug, Clone, PartialEq)]
pub enum Quiescence {
    /// Sleep for a fixed grace period
    FixedDelay(Duration),
    /// Wait until no DOM mutation happened for `window`, giving up after `max`
    DomQuiet { window: Duration, max: Duration },
    /// Wait until a page expression evaluates truthy, giving up after `max`
    ReadySignal { expression: String, max: Duration },
}

impl Default for Quiescence {
    fn default() -> Self {
        Quiescence::FixedDelay(Duration::from_millis(3000))
    }
}

/// Top-level configuration for one prerender run
#[derive(Debug, Clone)]
pub struct PrerenderConfig {
    /// Static server settings (output directory, entry, bind address)
    pub server: ServerConfig,
    /// Browser launch settings
    pub browser: BrowserConfig,
    /// Settle policy applied after network idle
    pub quiescence: Quiescence,
    /// Selector of the client mount node that must be non-empty in the
    /// snapshot; `None` disables the check
    pub mount_selector: Option<String>,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            browser: BrowserConfig::default(),
            quiescence: Quiescence::default(),
            mount_selector: Some("#root".to_string()),
        }
    }
}

impl PrerenderConfig {
    /// Path of the entry document that gets overwritten
    pub fn entry_path(&self) -> PathBuf {
        self.server.root.join(&self.server.entry)
    }

    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let mut components = Path::new(&self.server.entry).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(Error::Config(format!(
                    "entry must be a plain file name inside the output directory, got `{}`",
                    self.server.entry
                )))
            }
        }
        if self.browser.timeout_ms == 0 {
            return Err(Error::Config("navigation timeout must be greater than zero".into()));
        }
        if let Quiescence::ReadySignal { expression, .. } = &self.quiescence {
            if expression.trim().is_empty() {
                return Err(Error::Config("ready signal expression is empty".into()));
            }
        }
        server::ensure_loopback(&self.server.host)
    }
}
