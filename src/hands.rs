use std::ffi::OsStr;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dom;
use crate::error::{PilotError, Result};
use crate::types::WebElement;

/// Chrome exits on its own after this long without CDP traffic.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

/// One page (tab) a run drives. Each run owns its page exclusively.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Visible elements matching `selector` inside `scope` (whole document
    /// when `None`).
    async fn query_visible(&self, scope: Option<&str>, selector: &str) -> Result<Vec<WebElement>>;

    /// Fails with `ExtractionTimeout` if `selector` is not visible in time.
    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// The browser process shared by all runs.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>>;

    async fn shutdown(&self);
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    pub settle: Duration,
}

/// Chrome launched on first use and reused for every run.
pub struct ChromeBrowser {
    settings: BrowserSettings,
    browser: Mutex<Option<Browser>>,
}

impl ChromeBrowser {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browser: Mutex::new(None),
        }
    }

    async fn launch(&self) -> Result<Browser> {
        let settings = self.settings.clone();
        tokio::task::spawn_blocking(move || launch_browser(&settings))
            .await
            .map_err(|e| PilotError::browser(format!("browser launch panicked: {e}")))?
    }

    fn page_for(&self, tab: Arc<Tab>) -> Box<dyn PageDriver> {
        Box::new(ChromePage {
            tab,
            settle: self.settings.settle,
        })
    }
}

#[async_trait]
impl BrowserProvider for ChromeBrowser {
    async fn open_page(&self) -> Result<Box<dyn PageDriver>> {
        let mut slot = self.browser.lock().await;
        let profile_dir = self.settings.profile_dir.as_deref();
        let tab = tab_with_relaunch(&mut *slot, profile_dir, || self.launch(), new_tab).await?;
        Ok(self.page_for(tab))
    }

    async fn shutdown(&self) {
        if self.browser.lock().await.take().is_some() {
            info!("Chrome closed");
        }
    }
}

/// Open a tab on the cached browser, launching one first if the slot is
/// empty. When the tab cannot be opened (idle timeout, crash) the cached
/// handle is dropped before a single relaunch, so the old process releases
/// its profile lock.
async fn tab_with_relaunch<B, T, L, LF, N, NF>(
    slot: &mut Option<B>,
    profile_dir: Option<&Path>,
    mut launch: L,
    mut open: N,
) -> Result<T>
where
    B: Clone,
    L: FnMut() -> LF,
    LF: Future<Output = Result<B>>,
    N: FnMut(B) -> NF,
    NF: Future<Output = Result<T>>,
{
    let browser = match slot.as_ref() {
        Some(browser) => browser.clone(),
        None => {
            info!("launching Chrome");
            let browser = launch().await?;
            *slot = Some(browser.clone());
            browser
        }
    };

    match open(browser).await {
        Ok(tab) => Ok(tab),
        Err(e) => {
            warn!(error = %e, ?profile_dir, "could not open a tab, relaunching Chrome");
            drop(slot.take());
            let browser = launch().await?;
            *slot = Some(browser.clone());
            open(browser).await
        }
    }
}

fn launch_browser(settings: &BrowserSettings) -> Result<Browser> {
    if let Some(dir) = &settings.profile_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| PilotError::browser(format!("cannot create profile dir {dir:?}: {e}")))?;
    }

    let options = LaunchOptions {
        headless: settings.headless,
        sandbox: false,
        path: settings.chrome_path.clone(),
        user_data_dir: settings.profile_dir.clone(),
        args: vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-setuid-sandbox"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
        ],
        idle_browser_timeout: BROWSER_IDLE_TIMEOUT,
        ..Default::default()
    };

    let browser =
        Browser::new(options).map_err(|e| PilotError::browser(format!("launch failed: {e}")))?;
    debug!(headless = settings.headless, "Chrome started");
    Ok(browser)
}

async fn new_tab(browser: Browser) -> Result<Arc<Tab>> {
    tokio::task::spawn_blocking(move || browser.new_tab().map_err(PilotError::browser))
        .await
        .map_err(|e| PilotError::browser(format!("new tab panicked: {e}")))?
}

/// A Chrome tab. `headless_chrome` blocks, so every call runs on the
/// blocking pool.
pub struct ChromePage {
    tab: Arc<Tab>,
    settle: Duration,
}

impl ChromePage {
    async fn on_tab<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || op(&tab))
            .await
            .map_err(|e| PilotError::browser(format!("browser task panicked: {e}")))?
    }

    async fn evaluate(&self, script: String) -> Result<Option<serde_json::Value>> {
        self.on_tab(move |tab| {
            let remote = tab.evaluate(&script, false).map_err(PilotError::browser)?;
            Ok(remote.value)
        })
        .await
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.on_tab(move |tab| {
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| PilotError::browser(format!("navigation to {url} failed: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn query_visible(&self, scope: Option<&str>, selector: &str) -> Result<Vec<WebElement>> {
        let value = self.evaluate(dom::extraction_script(scope, selector)).await?;
        let raw = value
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| PilotError::browser("extraction script returned no data"))?;
        dom::parse_elements(raw)
    }

    async fn wait_for_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let visible = self
                .evaluate(dom::visibility_probe(selector))
                .await?
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if visible {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(PilotError::ExtractionTimeout {
                    scope: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let selector = selector.to_string();
        let value = value.to_string();
        self.on_tab(move |tab| {
            let element = tab
                .find_element(&selector)
                .map_err(|e| PilotError::MissingTarget {
                    selector: selector.clone(),
                    reason: e.to_string(),
                })?;
            element.focus().map_err(PilotError::browser)?;
            element
                .call_js_fn(dom::CLEAR_VALUE_FN, vec![], false)
                .map_err(PilotError::browser)?;
            tab.type_str(&value).map_err(PilotError::browser)?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let selector = selector.to_string();
        self.on_tab(move |tab| {
            let element = tab
                .find_element(&selector)
                .map_err(|e| PilotError::MissingTarget {
                    selector: selector.clone(),
                    reason: e.to_string(),
                })?;
            element
                .click()
                .map_err(|e| PilotError::browser(format!("click on {selector} failed: {e}")))?;
            Ok(())
        })
        .await?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.on_tab(|tab| tab.close(true).map(|_| ()).map_err(PilotError::browser))
            .await
    }
}
