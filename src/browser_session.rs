//! Shared headless Chromium session
//!
//! One browser process serves every request. It is launched lazily on first
//! use, handed out as a [`BrowserHandle`], and every scrape opens its own page
//! in it. Creation happens under a mutex so concurrent first callers never
//! launch twice.

use crate::{create_browser_config, Config, Metrics, NutritionError};
use chromiumoxide::browser::Browser;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct SessionInner {
    browser: Arc<Mutex<Browser>>,
    /// Background task driving Chrome DevTools Protocol communication
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
    liveness: Liveness,
}

/// What `stats` needs to know about the current session, readable while a
/// launch holds the session lock.
#[derive(Clone)]
struct Liveness {
    created_at: Instant,
    /// Cleared by the handler task when the CDP stream ends
    alive: Arc<AtomicBool>,
}

impl Liveness {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl SessionInner {
    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn close(self) {
        if let Err(e) = self.browser.lock().await.close().await {
            warn!("Browser did not close cleanly: {}", e);
        }
        self.handler.abort();
    }
}

/// Cheap reference to the live browser, valid until the session shuts down.
#[derive(Clone)]
pub struct BrowserHandle {
    browser: Arc<Mutex<Browser>>,
}

pub struct BrowserSession {
    config: Config,
    metrics: Arc<Metrics>,
    inner: Mutex<Option<SessionInner>>,
    liveness: std::sync::Mutex<Option<Liveness>>,
    closed: AtomicBool,
    launches: AtomicUsize,
    pages_opened: AtomicUsize,
    pages_closed: AtomicUsize,
}

impl BrowserSession {
    /// Create a session manager. No browser is launched until
    /// [`ensure_session`](Self::ensure_session) is called.
    pub fn new(config: Config, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            metrics,
            inner: Mutex::new(None),
            liveness: std::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            pages_opened: AtomicUsize::new(0),
            pages_closed: AtomicUsize::new(0),
        }
    }

    /// Return the live session, launching Chromium if there is none.
    ///
    /// A session whose CDP handler has exited is replaced under the same lock.
    pub async fn ensure_session(&self) -> Result<BrowserHandle, NutritionError> {
        let mut inner = self.inner.lock().await;

        if self.closed.load(Ordering::Acquire) {
            return Err(NutritionError::Browser(
                "browser session has been shut down".to_string(),
            ));
        }

        if let Some(session) = inner.as_ref() {
            if session.is_alive() {
                return Ok(BrowserHandle {
                    browser: session.browser.clone(),
                });
            }
        }

        if let Some(dead) = inner.take() {
            warn!("Browser handler exited, relaunching session");
            self.set_liveness(None);
            dead.close().await;
        }

        let session = self.launch().await?;
        let handle = BrowserHandle {
            browser: session.browser.clone(),
        };
        self.set_liveness(Some(session.liveness.clone()));
        *inner = Some(session);
        Ok(handle)
    }

    async fn launch(&self) -> Result<SessionInner, NutritionError> {
        let browser_config = create_browser_config(&self.config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| NutritionError::BrowserLaunchFailed(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();

        // The handler is a Stream and must be polled for the browser to make progress
        let handler_task = tokio::spawn(async move {
            let outcome = loop {
                match handler.next().await {
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        error!("Browser handler error: {}", e);
                        break Err(e);
                    }
                    None => {
                        info!("Browser handler stream ended");
                        break Ok(());
                    }
                }
            };
            handler_alive.store(false, Ordering::Release);
            outcome
        });

        let launches = self.launches.fetch_add(1, Ordering::Relaxed) + 1;
        self.metrics.record_browser_launch();
        info!(launches, "Browser session launched");

        Ok(SessionInner {
            browser: Arc::new(Mutex::new(browser)),
            handler: handler_task,
            liveness: Liveness {
                created_at: Instant::now(),
                alive,
            },
        })
    }

    /// Open a blank page in the shared browser. The caller closes it.
    pub async fn new_page(&self, handle: &BrowserHandle) -> Result<Page, NutritionError> {
        let page = handle
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| NutritionError::Browser(format!("failed to open page: {e}")))?;
        self.pages_opened.fetch_add(1, Ordering::Relaxed);
        Ok(page)
    }

    /// Close a page from [`new_page`](Self::new_page). A failed close is
    /// logged; the page is counted as closed either way.
    pub async fn close_page(&self, page: Page) {
        if let Err(e) = page.close().await {
            debug!("Page close failed: {}", e);
        }
        self.pages_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the browser and stop its handler. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);

        let session = self.inner.lock().await.take();
        self.set_liveness(None);
        if let Some(session) = session {
            info!("Shutting down browser session...");
            session.close().await;
            info!("Browser session shutdown complete");
        }
    }

    fn set_liveness(&self, liveness: Option<Liveness>) {
        *self
            .liveness
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = liveness;
    }

    fn current_liveness(&self) -> Option<Liveness> {
        self.liveness
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn is_active(&self) -> bool {
        self.current_liveness()
            .map_or(false, |liveness| liveness.is_alive())
    }

    /// Snapshot of the session. Never waits on an in-progress launch.
    pub async fn stats(&self) -> SessionStats {
        let liveness = self.current_liveness();

        SessionStats {
            active: liveness.as_ref().map_or(false, Liveness::is_alive),
            launches: self.launches.load(Ordering::Relaxed),
            pages_opened: self.pages_opened.load(Ordering::Relaxed),
            pages_closed: self.pages_closed.load(Ordering::Relaxed),
            age: liveness.map(|liveness| liveness.created_at.elapsed()),
            shut_down: self.closed.load(Ordering::Acquire),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStats {
    pub active: bool,
    pub launches: usize,
    pub pages_opened: usize,
    pub pages_closed: usize,
    pub age: Option<Duration>,
    pub shut_down: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_does_not_wait_for_session_lock() {
        let session = BrowserSession::new(Config::default(), Arc::new(Metrics::new()));

        // Held for the whole of a launch
        let _launching = session.inner.lock().await;

        let stats = tokio::time::timeout(Duration::from_millis(100), session.stats())
            .await
            .expect("stats blocked on the session lock");
        assert!(!stats.active);
        assert_eq!(stats.launches, 0);
        assert!(stats.age.is_none());

        let active = tokio::time::timeout(Duration::from_millis(100), session.is_active()).await;
        assert_eq!(active.ok(), Some(false));
    }
}
