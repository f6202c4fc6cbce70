//! Loading nutrition pages in the shared browser
//!
//! [`BrowserPageSource`] renders a URL and returns the DOM once the content
//! marker is present. Field extraction happens afterwards, offline, in
//! [`crate::extractor`].

use crate::{BrowserSession, Config, NutritionError};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);
const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// True once the navigated document has been parsed.
const DOCUMENT_READY_JS: &str =
    "document.location.href !== 'about:blank' && document.readyState !== 'loading'";

/// Something that turns a URL into rendered HTML.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn render(&self, url: &str) -> Result<String, NutritionError>;
}

/// Fails subresource requests the scraper never needs.
#[derive(Debug, Clone)]
pub struct ResourceBlocker {
    blocked: Vec<ResourceType>,
}

impl ResourceBlocker {
    /// Build from CDP resource type names such as `"image"` or `"font"`.
    /// Unknown names are skipped with a warning.
    pub fn from_names(names: &[String]) -> Self {
        let mut blocked = Vec::new();
        for name in names {
            match resource_type_from_name(name) {
                Some(resource_type) if !blocked.contains(&resource_type) => {
                    blocked.push(resource_type)
                }
                Some(_) => {}
                None => warn!("Ignoring unknown resource type '{}'", name),
            }
        }
        Self { blocked }
    }

    pub fn should_block(&self, resource_type: &ResourceType) -> bool {
        self.blocked.contains(resource_type)
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    fn patterns(&self) -> Vec<RequestPattern> {
        self.blocked
            .iter()
            .map(|resource_type| {
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(resource_type.clone())
                    .build()
            })
            .collect()
    }

    /// Enable request interception on `page`. The returned task answers paused
    /// requests until it is aborted.
    async fn attach(&self, page: &Page) -> Result<JoinHandle<()>, NutritionError> {
        let mut paused = page.event_listener::<EventRequestPaused>().await?;
        let intercept_page = page.clone();
        let blocker = self.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let outcome = if blocker.should_block(&event.resource_type) {
                    intercept_page
                        .execute(FailRequestParams::new(
                            request_id,
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                } else {
                    intercept_page
                        .execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("Intercepted request not answered: {}", e);
                }
            }
        });

        let enable = EnableParams::builder().patterns(self.patterns()).build();
        if let Err(e) = page.execute(enable).await {
            task.abort();
            return Err(e.into());
        }

        Ok(task)
    }
}

fn resource_type_from_name(name: &str) -> Option<ResourceType> {
    let resource_type = match name.trim().to_ascii_lowercase().as_str() {
        "image" => ResourceType::Image,
        "stylesheet" => ResourceType::Stylesheet,
        "font" => ResourceType::Font,
        "media" => ResourceType::Media,
        "script" => ResourceType::Script,
        "texttrack" => ResourceType::TextTrack,
        "manifest" => ResourceType::Manifest,
        "ping" => ResourceType::Ping,
        _ => return None,
    };
    Some(resource_type)
}

/// [`PageSource`] backed by the shared headless browser.
pub struct BrowserPageSource {
    session: Arc<BrowserSession>,
    config: Config,
    blocker: Option<ResourceBlocker>,
}

impl BrowserPageSource {
    pub fn new(session: Arc<BrowserSession>, config: Config) -> Self {
        let blocker = config
            .block_resources
            .then(|| ResourceBlocker::from_names(&config.blocked_resource_types))
            .filter(|blocker| !blocker.is_empty());

        Self {
            session,
            config,
            blocker,
        }
    }

    pub fn session(&self) -> &Arc<BrowserSession> {
        &self.session
    }

    async fn load(&self, page: &Page, url: &str) -> Result<String, NutritionError> {
        timeout(self.config.navigation_timeout, self.navigate(page, url))
            .await
            .map_err(|_| {
                NutritionError::Navigation(format!(
                    "{url} did not load within {:?}",
                    self.config.navigation_timeout
                ))
            })??;

        self.wait_for_marker(page).await?;

        Ok(page.content().await?)
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), NutritionError> {
        let response = page
            .execute(NavigateParams::new(url))
            .await
            .map_err(|e| NutritionError::Navigation(format!("{url}: {e}")))?;

        if let Some(error_text) = &response.result.error_text {
            return Err(NutritionError::Navigation(format!("{url}: {error_text}")));
        }

        loop {
            let ready: bool = page.evaluate(DOCUMENT_READY_JS).await?.into_value()?;
            if ready {
                return Ok(());
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_marker(&self, page: &Page) -> Result<(), NutritionError> {
        let marker = self.config.content_marker.as_str();
        let poll = async {
            while page.find_element(marker).await.is_err() {
                sleep(MARKER_POLL_INTERVAL).await;
            }
        };

        timeout(self.config.content_wait_timeout, poll)
            .await
            .map_err(|_| NutritionError::ExtractionTimeout(self.config.content_wait_timeout))
    }
}

#[async_trait]
impl PageSource for BrowserPageSource {
    async fn render(&self, url: &str) -> Result<String, NutritionError> {
        let handle = self.session.ensure_session().await?;
        let page = self.session.new_page(&handle).await?;

        let interceptor = match &self.blocker {
            Some(blocker) => match blocker.attach(&page).await {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!("Resource blocking unavailable for this page: {}", e);
                    None
                }
            },
            None => None,
        };

        // Bounded here as well so the cleanup below runs inside the request budget
        let result = timeout(self.config.request_timeout, self.load(&page, url))
            .await
            .unwrap_or(Err(NutritionError::Timeout(self.config.request_timeout)));

        if let Some(task) = interceptor {
            task.abort();
        }
        self.session.close_page(page).await;

        result
    }
}
