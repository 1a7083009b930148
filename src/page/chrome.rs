use std::sync::Mutex;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::app::{GleanerError, Result};
use crate::page::config::BrowserConfig;
use crate::page::{scripts, Affordance, FeedMetrics, FeedPage};

/// Feed page backed by a headless Chrome tab
pub struct ChromePage {
    browser: Browser,
    page: Page,
    config: BrowserConfig,
    handler: JoinHandle<()>,
    /// Container selectors set by [`FeedPage::focus`].
    scope: Mutex<Vec<String>>,
}

impl ChromePage {
    /// Launch a browser and navigate to `url`
    pub async fn open(url: &str, config: BrowserConfig) -> Result<Self> {
        let mut builder = LaunchConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer");

        if !config.headless {
            builder = builder.with_head();
        }

        let launch_config = builder
            .build()
            .map_err(|e| GleanerError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(launch_config).await.map_err(|e| {
            GleanerError::Browser(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        let handler = tokio::spawn(async move {
            while let Some(_event) = handler.next().await {}
        });

        let page = tokio::time::timeout(config.timeout(), browser.new_page(url))
            .await
            .map_err(|_| GleanerError::Page(format!("Timed out opening {}", url)))?
            .map_err(|e| GleanerError::Page(format!("Failed to create page: {}", e)))?;

        if let Some(ref ua) = config.user_agent {
            page.set_user_agent(ua)
                .await
                .map_err(|e| GleanerError::Page(format!("Failed to set user agent: {}", e)))?;
        }

        tokio::time::timeout(config.timeout(), page.wait_for_navigation())
            .await
            .map_err(|_| GleanerError::Page(format!("Timed out loading {}", url)))?
            .map_err(|e| GleanerError::Page(format!("Navigation failed: {}", e)))?;

        tokio::time::sleep(config.wait_after_load()).await;
        debug!("Opened {}", url);

        Ok(Self {
            browser,
            page,
            config,
            handler,
            scope: Mutex::new(Vec::new()),
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = tokio::time::timeout(self.config.timeout(), self.page.evaluate(script))
            .await
            .map_err(|_| GleanerError::Page("Script execution timed out".to_string()))?
            .map_err(|e| GleanerError::Page(format!("Script execution failed: {}", e)))?;

        result
            .into_value()
            .map_err(|e| GleanerError::Page(format!("Failed to parse result: {:?}", e)))
    }

    fn scope(&self) -> Vec<String> {
        self.scope
            .lock()
            .map(|scope| scope.clone())
            .unwrap_or_default()
    }

    /// Close the tab and the browser
    pub async fn close(mut self) -> Result<()> {
        let timeout = self.config.timeout();
        if tokio::time::timeout(timeout, self.page.close()).await.is_err() {
            warn!("Timed out closing the tab");
        }
        let closed = tokio::time::timeout(timeout, self.browser.close()).await;
        self.handler.abort();
        closed
            .map_err(|_| GleanerError::Browser("Timed out closing browser".to_string()))?
            .map_err(|e| GleanerError::Browser(format!("Failed to close browser: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl FeedPage for ChromePage {
    async fn current_url(&self) -> Result<String> {
        let url = tokio::time::timeout(self.config.timeout(), self.page.url())
            .await
            .map_err(|_| GleanerError::Page("Timed out reading URL".to_string()))?
            .map_err(|e| GleanerError::Page(format!("Failed to read URL: {}", e)))?;
        Ok(url.unwrap_or_default())
    }

    async fn focus(&self, containers: &[String]) -> Result<()> {
        let mut scope = self
            .scope
            .lock()
            .map_err(|e| GleanerError::Page(format!("Scope lock poisoned: {}", e)))?;
        *scope = containers.to_vec();
        Ok(())
    }

    async fn metrics(&self) -> Result<FeedMetrics> {
        self.eval(scripts::metrics_script(&self.scope())).await
    }

    async fn scroll_by(&self, px: f64) -> Result<()> {
        let _: bool = self.eval(scripts::scroll_script(&self.scope(), px)).await?;
        Ok(())
    }

    async fn snapshot(&self) -> Result<String> {
        self.eval(scripts::snapshot_script()).await
    }

    async fn click_matching(&self, affordance: &Affordance) -> Result<usize> {
        self.eval(scripts::click_script(&self.scope(), affordance)).await
    }

    async fn place_sentinel(&self, offset: f64) -> Result<()> {
        let _: bool = self.eval(scripts::sentinel_script(offset)).await?;
        Ok(())
    }

    async fn detach(&self) -> Result<()> {
        let _: bool = self.eval(scripts::detach_script()).await?;
        Ok(())
    }
}
