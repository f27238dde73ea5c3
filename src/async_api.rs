use crate::quiescence;
use crate::{BrowserConfig, Error, Quiescence, Renderer, Result};
use log::debug;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

enum Command {
    Goto(String, oneshot::Sender<Result<()>>),
    Settle(Quiescence, oneshot::Sender<Result<()>>),
    Content(oneshot::Sender<Result<String>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly browser abstraction backed by a dedicated worker thread.
///
/// The worker thread owns a synchronous [`Renderer`] and executes commands
/// sent from async tasks, so the renderer never has to be `Send`. When every
/// handle is dropped the command loop ends and the renderer is dropped with
/// it, which also tears the browser down on early-exit paths.
pub struct Browser {
    cmd_tx: Sender<Command>,
}

/// A handle representing the single page of a [`Browser`].
#[derive(Clone)]
pub struct Page {
    cmd_tx: Sender<Command>,
}

impl Browser {
    /// Launch renderer `R` on a background thread and wait until it is up.
    pub async fn launch<R: Renderer + 'static>(config: BrowserConfig) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::Builder::new()
            .name("prerender-browser".into())
            .spawn(move || {
                let idle_window = config.idle_window();
                let timeout = config.timeout();

                let mut renderer = match R::launch(config) {
                    Ok(r) => r,
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::Goto(url, resp) => {
                            let res = goto(&mut renderer, &url, idle_window, timeout);
                            let _ = resp.send(res);
                        }
                        Command::Settle(policy, resp) => {
                            let res = quiescence::settle(&mut renderer, &policy);
                            let _ = resp.send(res);
                        }
                        Command::Content(resp) => {
                            let res = renderer.content();
                            let _ = resp.send(res);
                        }
                        Command::Close(resp) => {
                            let res = renderer.close();
                            let _ = resp.send(res);
                            return;
                        }
                    }
                }
                debug!("Browser handle dropped without close; dropping renderer");
            })
            .map_err(|e| Error::Launch(format!("Failed to spawn browser worker: {}", e)))?;

        init_rx
            .await
            .map_err(|e| Error::Launch(format!("Browser worker exited during launch: {}", e)))??;

        Ok(Self { cmd_tx })
    }

    /// Page handle backed by the same worker thread.
    pub async fn new_page(&self) -> Result<Page> {
        Ok(Page {
            cmd_tx: self.cmd_tx.clone(),
        })
    }

    /// Shutdown the background worker and close the browser.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}

/// Navigation and the network-idle wait share one `timeout` budget.
fn goto<R: Renderer>(renderer: &mut R, url: &str, idle_window: Duration, timeout: Duration) -> Result<()> {
    let started = Instant::now();
    renderer.navigate(url)?;
    let remaining = timeout.saturating_sub(started.elapsed());
    quiescence::wait_for_network_idle(renderer, idle_window, remaining).map_err(|e| match e {
        Error::Timeout(_) => Error::Timeout(timeout.as_millis() as u64),
        other => other,
    })
}

impl Page {
    /// Navigate to a URL and wait for network idle
    pub async fn goto(&self, url: &str) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Goto(url.to_string(), tx));
        rx.await
            .map_err(|e| Error::Other(format!("Goto canceled: {}", e)))?
    }

    /// Apply a settle policy
    pub async fn settle(&self, policy: Quiescence) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Settle(policy, tx));
        rx.await
            .map_err(|e| Error::Other(format!("Settle canceled: {}", e)))?
    }

    /// Markup of the live document
    pub async fn content(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Content(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Content canceled: {}", e)))?
    }
}
