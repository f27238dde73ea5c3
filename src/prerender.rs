//! Snapshot orchestration
//!
//! One run is a fixed sequence: start the static server, launch the browser,
//! load the root page and wait for network idle, settle, extract markup,
//! close the browser, stop the server, then write the entry document. The
//! entry document is only touched after the snapshot exists in memory and
//! passed verification.

use crate::async_api::Browser;
use crate::server::StaticServer;
use crate::{Error, PrerenderConfig, Quiescence, Renderer, Result, Snapshot, SnapshotReport};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Instant;

/// Runs the prerender pipeline for one output directory
#[derive(Debug, Clone)]
pub struct Prerenderer {
    config: PrerenderConfig,
}

impl Prerenderer {
    pub fn new(config: PrerenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PrerenderConfig {
        &self.config
    }

    /// Run with the headless Chrome renderer
    #[cfg(feature = "cdp")]
    pub async fn run(&self) -> Result<SnapshotReport> {
        self.run_with::<crate::cdp::CdpRenderer>().await
    }

    /// Run with renderer `R`.
    ///
    /// Whatever was acquired is released on every path: the browser is
    /// closed before the server stops, on failure as well as on success.
    pub async fn run_with<R: Renderer + 'static>(&self) -> Result<SnapshotReport> {
        let started = Instant::now();
        let entry = self.preflight()?;

        info!("Starting static server for {}", self.config.server.root.display());
        let server = StaticServer::start(&self.config.server)?;
        let url = server.base_url()?;

        info!("Launching headless browser");
        let browser = match Browser::launch::<R>(self.config.browser.clone()).await {
            Ok(browser) => browser,
            Err(e) => {
                server.stop();
                return Err(e);
            }
        };

        let captured = capture(&browser, url.as_str(), &self.config.quiescence).await;
        let closed = browser.close().await;
        server.stop();

        let snapshot = captured?;
        closed?;

        snapshot.verify(self.config.mount_selector.as_deref())?;
        snapshot.persist(&entry)?;

        let report = SnapshotReport {
            entry,
            url: snapshot.url,
            title: snapshot.title,
            bytes: snapshot.html.len(),
            sha256: snapshot.sha256,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            "Wrote rendered markup to {} ({} bytes, sha256 {})",
            report.entry.display(),
            report.bytes,
            &report.sha256[..12]
        );
        Ok(report)
    }

    /// Validate configuration and require an existing build output.
    pub fn preflight(&self) -> Result<PathBuf> {
        self.config.validate()?;

        let root = &self.config.server.root;
        if !root.is_dir() {
            return Err(Error::MissingOutput(format!(
                "{} is not a directory; build the site before prerendering",
                root.display()
            )));
        }
        let entry = self.config.entry_path();
        if !entry.is_file() {
            return Err(Error::MissingOutput(format!("entry document {} not found", entry.display())));
        }
        Ok(entry)
    }
}

/// Byte length below which extracted markup is unlikely to be a rendered page
const MIN_EXPECTED_MARKUP: usize = 64;

async fn capture(browser: &Browser, url: &str, quiescence: &Quiescence) -> Result<Snapshot> {
    let page = browser.new_page().await?;

    info!("Loading {}", url);
    page.goto(url).await?;

    if let Quiescence::FixedDelay(delay) = quiescence {
        info!("Network idle; waiting {:?} for rendering to settle", delay);
    } else {
        info!("Network idle; waiting for rendering to settle");
    }
    page.settle(quiescence.clone()).await?;

    let html = page.content().await?;
    if html.len() < MIN_EXPECTED_MARKUP {
        warn!("Extracted markup is suspiciously short ({} bytes)", html.len());
    }
    Snapshot::new(html, url)
}
