use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::RetrievalError;
use crate::fetcher::{RetrievalMode, Retrieved, Retriever};

/// Browser retrieval through a remote Chrome DevTools endpoint.
///
/// The connection is opened on first use and shared by every later fetch.
/// If the browser goes away the next fetch reconnects. Each fetch gets its
/// own page, which is closed however the fetch ends.
pub struct ChromeFetcher {
    endpoint: Option<String>,
    timeout: Duration,
    connection: Mutex<Option<Connection>>,
}

struct Connection {
    browser: Arc<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl Connection {
    fn is_alive(&self) -> bool {
        self.handler
            .as_ref()
            .map_or(true, |handler| !handler.is_finished())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl ChromeFetcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            timeout,
            connection: Mutex::new(None),
        }
    }

    /// A fetcher with no browser behind it; every fetch fails as unavailable
    pub fn unconfigured(timeout: Duration) -> Self {
        Self {
            endpoint: None,
            timeout,
            connection: Mutex::new(None),
        }
    }

    /// Use an already connected browser. Its handler must be polled by the caller.
    pub fn with_browser(browser: Browser, timeout: Duration) -> Self {
        Self {
            endpoint: None,
            timeout,
            connection: Mutex::new(Some(Connection {
                browser: Arc::new(browser),
                handler: None,
            })),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Whether a live browser connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(Connection::is_alive)
    }

    async fn browser(&self) -> Result<Arc<Browser>, RetrievalError> {
        let mut connection = self.connection.lock().await;

        if let Some(ref existing) = *connection {
            if existing.is_alive() {
                return Ok(existing.browser.clone());
            }
            info!("Browser connection lost, reconnecting");
        }

        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            RetrievalError::BrowserUnavailable("no browser endpoint configured".into())
        })?;

        let fresh = connect(endpoint, self.timeout).await?;
        let browser = fresh.browser.clone();
        *connection = Some(fresh);
        Ok(browser)
    }

    async fn render(
        &self,
        browser: &Browser,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<String, RetrievalError> {
        let session = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| RetrievalError::Browser(format!("Failed to create page: {}", e)))?;
            let _close = close_on_drop(page.clone(), url);
            load(&page, url).await
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RetrievalError::Cancelled),
            rendered = tokio::time::timeout(self.timeout, session) => {
                rendered.unwrap_or(Err(RetrievalError::NavigationTimeout(self.timeout)))
            }
        }
    }
}

/// Runs its action once when dropped, however the owning future ends
struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(action) = self.0.take() {
            action();
        }
    }
}

/// Close `page` in the background once the guard goes out of scope,
/// including when the fetch is abandoned mid-flight.
fn close_on_drop(page: Page, url: &Url) -> OnDrop<impl FnOnce()> {
    let url = url.to_string();
    OnDrop(Some(move || {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to close page for {}", url);
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = page.close().await {
                warn!("Failed to close page for {}: {}", url, e);
            }
        });
    }))
}

async fn connect(endpoint: &str, timeout: Duration) -> Result<Connection, RetrievalError> {
    let (browser, mut handler) = tokio::time::timeout(timeout, Browser::connect(endpoint))
        .await
        .map_err(|_| {
            RetrievalError::BrowserUnavailable(format!(
                "Timed out connecting to browser at {}",
                endpoint
            ))
        })?
        .map_err(|e| {
            RetrievalError::BrowserUnavailable(format!(
                "Failed to connect to browser at {}: {}",
                endpoint, e
            ))
        })?;

    // Spawn the browser handler; it ends when the socket does
    let handler = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            match event {
                Err(CdpError::Ws(e)) => {
                    warn!("Browser connection closed: {}", e);
                    break;
                }
                Err(e) => debug!("Browser handler error: {}", e),
                Ok(()) => {}
            }
        }
    });

    info!("Connected to browser at {}", endpoint);
    Ok(Connection {
        browser: Arc::new(browser),
        handler: Some(handler),
    })
}

async fn load(page: &Page, url: &Url) -> Result<String, RetrievalError> {
    page.goto(url.as_str())
        .await
        .map_err(|e| RetrievalError::Browser(format!("Navigation failed: {}", e)))?;

    page.wait_for_navigation()
        .await
        .map_err(|e| RetrievalError::Browser(format!("Navigation failed: {}", e)))?;

    page.content()
        .await
        .map_err(|e| RetrievalError::Browser(format!("Failed to read document: {}", e)))
}

#[async_trait]
impl Retriever for ChromeFetcher {
    async fn fetch(
        &self,
        url: &Url,
        cancel: &CancellationToken,
    ) -> Result<Retrieved, RetrievalError> {
        let browser = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
            browser = self.browser() => browser?,
        };

        let html = self.render(&browser, url, cancel).await?;

        Ok(Retrieved {
            html,
            mode: RetrievalMode::Browser,
        })
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Browser
    }
}
