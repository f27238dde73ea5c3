//! Settle detection after navigation
//!
//! Network idle is judged from inside the page: the document must be
//! `complete`, no more than [`MAX_IN_FLIGHT`] fetch/XHR requests may be
//! pending and the number of performance resource entries must stay the same
//! for a trailing window. Pending requests are counted by
//! [`NETWORK_TRACKER_SCRIPT`], which a renderer installs before any page
//! script runs. The settle policies in [`Quiescence`] run afterwards.

use crate::{Error, Quiescence, Renderer, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pending requests still tolerated when declaring the network idle
pub const MAX_IN_FLIGHT: u64 = 0;

/// Counts pending `fetch` and `XMLHttpRequest` calls in
/// `window.__prerenderNetwork.pending`. It also lifts the resource timing
/// buffer limit so the entry count keeps moving on asset-heavy pages.
pub const NETWORK_TRACKER_SCRIPT: &str = r#"(function() {
    if (window.__prerenderNetwork) return;
    const net = { pending: 0 };
    window.__prerenderNetwork = net;
    const done = function() { net.pending = Math.max(0, net.pending - 1); };
    try { performance.setResourceTimingBufferSize(1000000); } catch (e) {}
    if (typeof window.fetch === 'function') {
        const fetch = window.fetch;
        window.fetch = function() {
            net.pending++;
            let request;
            try { request = fetch.apply(this, arguments); } catch (e) { done(); throw e; }
            request.then(done, done);
            return request;
        };
    }
    if (typeof XMLHttpRequest === 'function') {
        const send = XMLHttpRequest.prototype.send;
        XMLHttpRequest.prototype.send = function() {
            net.pending++;
            this.addEventListener('loadend', done, { once: true });
            try { return send.apply(this, arguments); } catch (e) { done(); throw e; }
        };
    }
})();"#;

const NETWORK_STATE_SCRIPT: &str = r#"JSON.stringify({
    ready: document.readyState,
    pending: window.__prerenderNetwork ? window.__prerenderNetwork.pending : 0,
    resources: performance.getEntriesByType('resource').length
})"#;

// Milliseconds since the last DOM mutation; installs the observer on first use.
const MUTATION_AGE_SCRIPT: &str = r#"(function() {
    if (!window.__prerenderMutations) {
        const state = { last: performance.now() };
        new MutationObserver(function() { state.last = performance.now(); })
            .observe(document, { subtree: true, childList: true, attributes: true, characterData: true });
        window.__prerenderMutations = state;
    }
    return performance.now() - window.__prerenderMutations.last;
})()"#;

#[derive(Debug, Deserialize)]
struct NetworkState {
    ready: String,
    #[serde(default)]
    pending: u64,
    resources: u64,
}

fn network_state<R: Renderer>(renderer: &mut R) -> Result<NetworkState> {
    let value = renderer.evaluate(NETWORK_STATE_SCRIPT)?;
    let raw = value
        .as_str()
        .ok_or_else(|| Error::Navigation(format!("unexpected network state {}", value)))?;
    serde_json::from_str(raw).map_err(|e| Error::Navigation(format!("unreadable network state: {}", e)))
}

/// Block until the page looks network-idle, or fail with `Error::Timeout`.
pub fn wait_for_network_idle<R: Renderer>(renderer: &mut R, idle_window: Duration, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    let mut last_count: Option<u64> = None;
    let mut stable_since = started;

    loop {
        let state = network_state(renderer)?;
        let now = Instant::now();

        let quiet = state.ready == "complete" && state.pending <= MAX_IN_FLIGHT;
        if quiet && last_count == Some(state.resources) {
            if now.duration_since(stable_since) >= idle_window {
                debug!("Network idle after {:?} ({} resources)", started.elapsed(), state.resources);
                return Ok(());
            }
        } else {
            last_count = quiet.then_some(state.resources);
            stable_since = now;
        }

        if started.elapsed() >= timeout {
            return Err(Error::Timeout(timeout.as_millis() as u64));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Apply a settle policy. Polling policies never fail on reaching their
/// bound; they log and continue.
pub fn settle<R: Renderer>(renderer: &mut R, policy: &Quiescence) -> Result<()> {
    match policy {
        Quiescence::FixedDelay(delay) => {
            debug!("Settling for {:?}", delay);
            thread::sleep(*delay);
            Ok(())
        }
        Quiescence::DomQuiet { window, max } => {
            let window_ms = window.as_millis() as f64;
            poll_until(*max, "DOM quiet", || {
                let age = renderer.evaluate(MUTATION_AGE_SCRIPT)?;
                Ok(age.as_f64().map_or(false, |ms| ms >= window_ms))
            })
        }
        Quiescence::ReadySignal { expression, max } => {
            let script = ready_script(expression)?;
            poll_until(*max, "ready signal", || {
                Ok(renderer.evaluate(&script)?.as_bool().unwrap_or(false))
            })
        }
    }
}

fn ready_script(expression: &str) -> Result<String> {
    let quoted = serde_json::to_string(expression)
        .map_err(|e| Error::Config(format!("cannot embed ready expression: {}", e)))?;
    Ok(format!(
        "(function() {{ try {{ return Boolean((0, eval)({})); }} catch (e) {{ return false; }} }})()",
        quoted
    ))
}

fn poll_until<F>(max: Duration, what: &str, mut done: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let started = Instant::now();
    loop {
        if done()? {
            debug!("{} reached after {:?}", what, started.elapsed());
            return Ok(());
        }
        if started.elapsed() >= max {
            warn!("{} not reached within {:?}; snapshotting anyway", what, max);
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BrowserConfig;
    use serde_json::Value;
    use std::collections::VecDeque;

    /// Replays queued evaluation results, repeating the last one.
    struct Scripted {
        replies: VecDeque<Value>,
        last: Value,
        scripts: Vec<String>,
    }

    impl Scripted {
        fn new(replies: Vec<Value>) -> Self {
            Self { replies: replies.into(), last: Value::Null, scripts: Vec::new() }
        }
    }

    impl Renderer for Scripted {
        fn launch(_config: BrowserConfig) -> Result<Self> {
            Ok(Scripted::new(Vec::new()))
        }

        fn navigate(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }

        fn evaluate(&mut self, script: &str) -> Result<Value> {
            self.scripts.push(script.to_string());
            if let Some(next) = self.replies.pop_front() {
                self.last = next;
            }
            Ok(self.last.clone())
        }

        fn close(self) -> Result<()> {
            Ok(())
        }
    }

    fn net(ready: &str, resources: u64) -> Value {
        Value::String(format!(r#"{{"ready":"{}","resources":{}}}"#, ready, resources))
    }

    fn busy(pending: u64, resources: u64) -> Value {
        Value::String(format!(r#"{{"ready":"complete","pending":{},"resources":{}}}"#, pending, resources))
    }

    #[test]
    fn idle_once_complete_and_stable() {
        let mut r = Scripted::new(vec![net("loading", 0), net("interactive", 2), net("complete", 3), net("complete", 3)]);
        wait_for_network_idle(&mut r, Duration::ZERO, Duration::from_secs(5)).unwrap();
        assert_eq!(r.scripts.len(), 4);
    }

    #[test]
    fn pending_requests_block_idle() {
        let mut r = Scripted::new(vec![busy(2, 3)]);
        let err = wait_for_network_idle(&mut r, Duration::ZERO, Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, Error::Timeout(250)));
        assert!(r.scripts.len() >= 2);
    }

    #[test]
    fn idle_window_restarts_after_requests_finish() {
        let mut r = Scripted::new(vec![busy(0, 3), busy(1, 3), busy(0, 4), busy(0, 4)]);
        wait_for_network_idle(&mut r, Duration::ZERO, Duration::from_secs(5)).unwrap();
        assert_eq!(r.scripts.len(), 4);
    }

    #[test]
    fn tracker_counts_fetch_and_xhr() {
        assert!(NETWORK_TRACKER_SCRIPT.contains("window.fetch = function"));
        assert!(NETWORK_TRACKER_SCRIPT.contains("XMLHttpRequest.prototype.send"));
        assert!(NETWORK_STATE_SCRIPT.contains("__prerenderNetwork"));
    }

    #[test]
    fn growing_resource_count_resets_window() {
        let mut r = Scripted::new(vec![net("complete", 1), net("complete", 2), net("complete", 5), net("complete", 5)]);
        wait_for_network_idle(&mut r, Duration::ZERO, Duration::from_secs(5)).unwrap();
        assert_eq!(r.scripts.len(), 4);
    }

    #[test]
    fn never_complete_times_out() {
        let mut r = Scripted::new(vec![net("loading", 0)]);
        let err = wait_for_network_idle(&mut r, Duration::ZERO, Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, Error::Timeout(250)));
    }

    #[test]
    fn garbage_network_state_is_navigation_error() {
        let mut r = Scripted::new(vec![Value::Bool(true)]);
        let err = wait_for_network_idle(&mut r, Duration::ZERO, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Navigation(_)));
    }

    #[test]
    fn fixed_delay_does_not_touch_page() {
        let mut r = Scripted::new(Vec::new());
        settle(&mut r, &Quiescence::FixedDelay(Duration::from_millis(10))).unwrap();
        assert!(r.scripts.is_empty());
    }

    #[test]
    fn dom_quiet_waits_for_mutation_age() {
        let mut r = Scripted::new(vec![Value::from(5.0), Value::from(40.0), Value::from(250.0)]);
        let policy = Quiescence::DomQuiet { window: Duration::from_millis(200), max: Duration::from_secs(5) };
        settle(&mut r, &policy).unwrap();
        assert_eq!(r.scripts.len(), 3);
        assert!(r.scripts[0].contains("MutationObserver"));
    }

    #[test]
    fn dom_quiet_gives_up_at_max() {
        let mut r = Scripted::new(vec![Value::from(0.0)]);
        let policy = Quiescence::DomQuiet { window: Duration::from_secs(60), max: Duration::from_millis(150) };
        settle(&mut r, &policy).unwrap();
        assert!(r.scripts.len() >= 2);
    }

    #[test]
    fn ready_signal_embeds_expression_safely() {
        let mut r = Scripted::new(vec![Value::Bool(false), Value::Bool(true)]);
        let policy = Quiescence::ReadySignal {
            expression: r#"window.__ready === "yes""#.into(),
            max: Duration::from_secs(5),
        };
        settle(&mut r, &policy).unwrap();
        assert_eq!(r.scripts.len(), 2);
        assert!(r.scripts[0].contains(r#""window.__ready === \"yes\"""#));
    }
}
