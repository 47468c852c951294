use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ScraperConfig;
use crate::extraction::{is_challenge_page, result_text, PriceExtractor};
use crate::models::GroupedPrices;
use crate::utils::error::{AppError, Result};

/// Opaque reference to a page opened by a [`NavigationProvider`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageHandle {
    pub id: Uuid,
    pub url: String,
}

impl PageHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
        }
    }
}

/// What the in-page extraction reported.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageExtraction {
    pub anomaly: bool,
    pub grouped: Option<GroupedPrices>,
}

impl PageExtraction {
    pub fn challenge() -> Self {
        Self {
            anomaly: true,
            grouped: None,
        }
    }

    pub fn prices(grouped: GroupedPrices) -> Self {
        Self {
            anomaly: false,
            grouped: Some(grouped),
        }
    }
}

/// Browser seam used by the scheduler for each task.
#[async_trait]
pub trait NavigationProvider: Send + Sync {
    async fn open_page(&self, url: &str) -> Result<PageHandle>;

    /// Waits for the page to settle. Never fails; the caller bounds it
    /// with its own ceiling as well.
    async fn wait_until_loaded(&self, page: &PageHandle, timeout: Duration);

    async fn run_extraction(&self, page: &PageHandle) -> Result<PageExtraction>;

    async fn close_page(&self, page: &PageHandle) -> Result<()>;
}

/// [`NavigationProvider`] backed by a single headless Chrome instance.
pub struct ChromeNavigator {
    browser: Arc<Browser>,
    pages: Mutex<HashMap<Uuid, Arc<Tab>>>,
    extractor: Arc<PriceExtractor>,
    config: ScraperConfig,
}

impl ChromeNavigator {
    /// Launches Chrome. Blocking.
    pub fn launch(config: ScraperConfig, extractor: Arc<PriceExtractor>) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false) // Often needed in containerized environments
            .idle_browser_timeout(Duration::from_secs(600))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-backgrounding-occluded-windows"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::navigation(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::navigation(format!("Failed to launch browser: {}", e)))?;

        Ok(Self {
            browser: Arc::new(browser),
            pages: Mutex::new(HashMap::new()),
            extractor,
            config,
        })
    }

    fn tab(&self, page: &PageHandle) -> Result<Arc<Tab>> {
        let pages = self.pages.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pages
            .get(&page.id)
            .cloned()
            .ok_or_else(|| AppError::navigation(format!("Unknown page {}", page.id)))
    }

    fn take_tab(&self, page: &PageHandle) -> Option<Arc<Tab>> {
        let mut pages = self.pages.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pages.remove(&page.id)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::navigation(format!("Browser task panicked: {}", e)))?
}

#[async_trait]
impl NavigationProvider for ChromeNavigator {
    async fn open_page(&self, url: &str) -> Result<PageHandle> {
        let browser = self.browser.clone();
        let user_agent = self.config.user_agent.clone();
        let target = url.to_string();

        let tab = blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::navigation(format!("Failed to create tab: {}", e)))?;
            tab.set_user_agent(&user_agent, None, None)
                .map_err(|e| AppError::navigation(format!("Failed to set user agent: {}", e)))?;
            if let Err(e) = tab.navigate_to(&target) {
                let _ = tab.close(true);
                return Err(AppError::navigation(format!("Navigation failed: {}", e)));
            }
            Ok(tab)
        })
        .await?;

        let page = PageHandle::new(url);
        self.pages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(page.id, tab);
        debug!("Opened page {} for {}", page.id, url);
        Ok(page)
    }

    async fn wait_until_loaded(&self, page: &PageHandle, timeout: Duration) {
        let Ok(tab) = self.tab(page) else {
            return;
        };
        let result = blocking(move || {
            tab.set_default_timeout(timeout);
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|e| AppError::navigation(e.to_string()))
        })
        .await;
        if let Err(e) = result {
            debug!("Page {} did not settle: {}", page.id, e);
        }
    }

    async fn run_extraction(&self, page: &PageHandle) -> Result<PageExtraction> {
        let tab = self.tab(page)?;
        let extractor = self.extractor.clone();

        blocking(move || {
            let html = tab
                .get_content()
                .map_err(|e| AppError::navigation(format!("Failed to get page content: {}", e)))?;
            let final_url = tab.get_url();

            if is_challenge_page(&final_url, &html) {
                return Ok(PageExtraction::challenge());
            }
            let text = result_text(&html);
            Ok(PageExtraction::prices(extractor.extract(&text)))
        })
        .await
    }

    async fn close_page(&self, page: &PageHandle) -> Result<()> {
        let Some(tab) = self.take_tab(page) else {
            return Ok(());
        };
        blocking(move || {
            tab.close(true)
                .map(|_| ())
                .map_err(|e| AppError::navigation(format!("Failed to close tab: {}", e)))
        })
        .await
        .inspect_err(|e| warn!("Closing page {} failed: {}", page.id, e))
    }
}
