//! Chrome DevTools Protocol renderer implementation

use crate::quiescence::NETWORK_TRACKER_SCRIPT;
use crate::{BrowserConfig, Error, Renderer, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

/// CDP-based renderer (uses the `headless_chrome` crate)
///
/// Launches a headless Chrome instance and drives a single tab. Dropping the
/// renderer drops the `Browser`, which terminates the Chrome child process.
pub struct CdpRenderer {
    browser: Browser,
    tab: Arc<Tab>,
}

impl Renderer for CdpRenderer {
    fn launch(config: BrowserConfig) -> Result<Self>
    where
        Self: Sized,
    {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .path(config.chrome_path.clone())
            .build()
            .map_err(|e| Error::Launch(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::Launch(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::Launch(format!("Failed to create tab: {}", e)))?;

        // Bounds navigation and element waits
        tab.set_default_timeout(config.timeout());

        // Runs ahead of the bundle on every document so pending requests are seen
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: NETWORK_TRACKER_SCRIPT.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|e| Error::Launch(format!("Failed to install network tracker: {}", e)))?;

        debug!("Chrome launched (sandbox: {})", config.sandbox);
        Ok(Self { browser, tab })
    }

    fn navigate(&mut self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| Error::Navigation(format!("Navigation to {} failed: {}", url, e)))?;

        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Navigation(format!("Wait for navigation failed: {}", e)))?;

        Ok(())
    }

    fn evaluate(&mut self, script: &str) -> Result<Value> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::Extraction(format!("Evaluation failed: {}", e)))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    fn close(self) -> Result<()> {
        let closed = self.tab.close(false);
        // Dropping the browser kills the child process even if the tab
        // refused to close.
        drop(self.tab);
        drop(self.browser);
        if let Err(ref e) = closed {
            warn!("Tab did not close cleanly: {}", e);
        }
        closed?;
        Ok(())
    }
}
