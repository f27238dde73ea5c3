//! Rendered snapshot: verification and persistence

use crate::{Error, Result};
use log::warn;
use scraper::{Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Markup captured from the live page
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Serialized document (doctype + root element)
    pub html: String,
    /// URL the page was loaded from
    pub url: String,
    /// Text of the `<title>` element, empty if absent
    pub title: String,
    /// Hex SHA-256 of `html`
    pub sha256: String,
}

impl Snapshot {
    /// Wrap extracted markup; blank markup is an extraction failure.
    pub fn new(html: String, url: impl Into<String>) -> Result<Self> {
        if html.trim().is_empty() {
            return Err(Error::Extraction("page returned empty markup".into()));
        }
        let title = document_title(&html);
        let sha256 = hex::encode(Sha256::digest(html.as_bytes()));
        Ok(Self {
            html,
            url: url.into(),
            title,
            sha256,
        })
    }

    /// Check that the client mount node was rendered into.
    ///
    /// A mount node with neither child elements nor visible text means the
    /// client bundle never ran. A selector that matches nothing is logged and
    /// accepted, since not every page mounts into the same node.
    pub fn verify(&self, mount_selector: Option<&str>) -> Result<()> {
        let raw = match mount_selector {
            Some(raw) => raw,
            None => return Ok(()),
        };
        let selector = Selector::parse(raw)
            .map_err(|e| Error::Config(format!("invalid mount selector `{}`: {:?}", raw, e)))?;

        let document = Html::parse_document(&self.html);
        let mount = match document.select(&selector).next() {
            Some(mount) => mount,
            None => {
                warn!("Mount node `{}` not found in snapshot; skipping render check", raw);
                return Ok(());
            }
        };

        let has_elements = mount.children().any(|child| child.value().is_element());
        let has_text = mount.text().any(|t| !t.trim().is_empty());
        if has_elements || has_text {
            Ok(())
        } else {
            Err(Error::Extraction(format!(
                "mount node `{}` is empty; client rendering did not produce content",
                raw
            )))
        }
    }

    /// Atomically replace `entry` with the snapshot markup.
    ///
    /// The markup goes to a temporary file next to `entry` which is then
    /// renamed over it, keeping the previous file permissions.
    pub fn persist(&self, entry: &Path) -> Result<()> {
        let dir = match entry.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".prerender-")
            .suffix(".html")
            .tempfile_in(dir)
            .map_err(|e| Error::Write(format!("cannot create temporary file in {}: {}", dir.display(), e)))?;

        tmp.write_all(self.html.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| Error::Write(format!("cannot write snapshot: {}", e)))?;

        if let Ok(meta) = fs::metadata(entry) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| Error::Write(format!("cannot copy permissions of {}: {}", entry.display(), e)))?;
        }

        tmp.persist(entry)
            .map_err(|e| Error::Write(format!("cannot replace {}: {}", entry.display(), e.error)))?;
        Ok(())
    }
}

fn document_title(html: &str) -> String {
    let document = Html::parse_document(html);
    Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|n| n.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default()
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotReport {
    /// Entry document that was overwritten
    pub entry: PathBuf,
    /// URL the snapshot was taken from
    pub url: String,
    pub title: String,
    /// Size of the written document in bytes
    pub bytes: usize,
    pub sha256: String,
    /// Wall-clock duration of the whole run
    pub elapsed_ms: u64,
}
