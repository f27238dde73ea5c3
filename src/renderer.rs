//! Renderer backend trait
//!
//! A renderer owns one browser with one page. The prerender pipeline only
//! needs navigation, script evaluation and markup extraction; everything
//! else (network idle, settle policies) is built on top of `evaluate`.

use crate::{BrowserConfig, Error, Result};
use serde_json::Value;

/// Serializes the live document the same way a browser's "page content"
/// call does: doctype followed by the root element's outer HTML.
pub const DOCUMENT_MARKUP_SCRIPT: &str = r#"(function() {
    let markup = '';
    if (document.doctype) {
        markup = new XMLSerializer().serializeToString(document.doctype);
    }
    if (document.documentElement) {
        markup += document.documentElement.outerHTML;
    }
    return markup;
})()"#;

/// Core trait for headless renderer implementations
pub trait Renderer {
    /// Launch the browser and open a single page
    fn launch(config: BrowserConfig) -> Result<Self>
    where
        Self: Sized;

    /// Navigate the page and wait until the browser reports it navigated
    fn navigate(&mut self, url: &str) -> Result<()>;

    /// Evaluate a JavaScript expression in the page; primitive results come
    /// back as JSON values, anything else as `Value::Null`
    fn evaluate(&mut self, script: &str) -> Result<Value>;

    /// Current markup of the live document
    fn content(&mut self) -> Result<String> {
        match self.evaluate(DOCUMENT_MARKUP_SCRIPT)? {
            Value::String(markup) => Ok(markup),
            other => Err(Error::Extraction(format!("expected document markup, page returned {}", other))),
        }
    }

    /// Close the page and the browser
    fn close(self) -> Result<()>;
}
