// spider_chrome re-exports chromiumoxide API (renamed in Cargo.toml)
use super::script;
use super::session::{Cookie, ElementHandle, Session};
use crate::config::{AppConfig, Selector};
use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::DescribeNodeParams;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::network::SetCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, CreateIsolatedWorldParams, NavigateParams,
    Viewport,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// How to launch the Chrome process backing a [`ChromeSession`]
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// Linux workaround for AppArmor/container restrictions
    pub no_sandbox: bool,
    pub page_load_timeout: Duration,
}

impl LaunchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            headless: config.effective_headless(),
            chrome_path: config.browser.chrome_path.clone(),
            window_width: config.browser.window_width,
            window_height: config.browser.window_height,
            no_sandbox: true,
            page_load_timeout: config.page_load_timeout(),
        }
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            window_width: 1600,
            window_height: 1200,
            no_sandbox: true,
            page_load_timeout: Duration::from_secs(20),
        }
    }
}

/// A single Chrome tab driven over the DevTools protocol
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    temp_dir: Option<PathBuf>,
    page_load_timeout: Duration,
    /// Frames entered, outermost first
    frame_path: Mutex<Vec<FrameEntry>>,
    next_ref: AtomicU64,
}

/// Name of the isolated worlds created in entered frames
const WORLD_NAME: &str = "webpt-capture";

/// Keep cross-origin frames in the page's renderer so their documents can be
/// reached through isolated worlds. Repeats chromey's `TranslateUI` default
/// since the last `--disable-features` wins.
const FRAME_ARGS: [&str; 2] = [
    "--disable-site-isolation-trials",
    "--disable-features=IsolateOrigins,site-per-process,TranslateUI",
];

/// An entered frame: the frame element (tagged in its parent document) and
/// the execution context scripts run in inside it
#[derive(Debug, Clone)]
struct FrameEntry {
    element_ref: String,
    context: ExecutionContextId,
}

#[derive(Debug, Deserialize)]
struct Offset {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ElementRect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl ChromeSession {
    /// Launch Chrome and open the tab used for the whole session
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        // Unique profile directory so concurrent runs never share state
        let unique_id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let temp_dir = std::env::temp_dir().join(format!("webpt-capture-{}", unique_id));
        std::fs::create_dir_all(&temp_dir).map_err(|e| {
            BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
        })?;

        let (browser, page) = match Self::start(&options, &temp_dir).await {
            Ok(started) => started,
            Err(e) => {
                // No session owns the profile yet, so Drop will not remove it
                let _ = std::fs::remove_dir_all(&temp_dir);
                return Err(e);
            }
        };

        log::info!(
            "Chrome launched ({}, {}x{})",
            if options.headless { "headless" } else { "headed" },
            options.window_width,
            options.window_height
        );

        Ok(Self {
            browser,
            page,
            temp_dir: Some(temp_dir),
            page_load_timeout: options.page_load_timeout,
            frame_path: Mutex::new(Vec::new()),
            next_ref: AtomicU64::new(1),
        })
    }

    async fn start(options: &LaunchOptions, temp_dir: &Path) -> Result<(Browser, Page)> {
        let mut config = if options.headless {
            BrowserConfig::builder()
        } else {
            BrowserConfig::builder().with_head()
        };

        config = config
            .user_data_dir(temp_dir)
            .window_size(options.window_width, options.window_height)
            .viewport(None)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        for arg in FRAME_ARGS {
            config = config.arg(arg);
        }

        if options.no_sandbox {
            config = config.arg("--no-sandbox");
        }

        if let Some(path) = &options.chrome_path {
            config = config.chrome_executable(path);
        }

        let config = config.build().map_err(|e| {
            BrowserError::LaunchFailed(format!(
                "{}. \n\n\
                 Chrome not found. You can:\n\
                 - Install Chrome: https://www.google.com/chrome/\n\
                 - Ubuntu/Debian: sudo apt install chromium-browser\n\
                 - Or set `browser.chrome_path` in the configuration file",
                e
            ))
        })?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Spawn handler task
        tokio::spawn(async move {
            while (handler.next().await).is_some() {
                // Handle browser events
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(format!("Failed to create page: {}", e)))?;

        Ok((browser, page))
    }

    /// Close the browser connection
    pub async fn close(self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| BrowserError::Other(e.to_string()))?;
        Ok(())
    }

    fn candidate_ref(&self) -> String {
        format!("e{}", self.next_ref.fetch_add(1, Ordering::Relaxed))
    }

    /// Execution context of the innermost entered frame; `None` is the page
    async fn current_context(&self) -> Option<ExecutionContextId> {
        self.frame_path.lock().await.last().map(|f| f.context)
    }

    /// Evaluate a script and deserialize its result
    async fn eval<T: DeserializeOwned>(
        &self,
        script: String,
        context: Option<ExecutionContextId>,
    ) -> Result<T> {
        let mut params = EvaluateParams::new(script);
        params.context_id = context;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;

        result
            .into_value()
            .map_err(|e| BrowserError::Script(format!("Failed to deserialize result: {}", e)))
    }

    /// Create an isolated world in the document of the frame element tagged
    /// `element_ref`. `Ok(None)` when the frame has no document yet.
    async fn enter_frame(
        &self,
        element_ref: &str,
        parent: Option<ExecutionContextId>,
    ) -> Result<Option<ExecutionContextId>> {
        let mut params = EvaluateParams::new(script::frame_element(element_ref));
        params.context_id = parent;
        params.return_by_value = Some(false);

        let element = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        let object_id = element.object().object_id.clone().ok_or_else(|| {
            BrowserError::Script(format!("Frame element {} has no remote object", element_ref))
        })?;

        // The owner element's node carries the id of the frame it hosts
        let described = self
            .page
            .execute(DescribeNodeParams::builder().object_id(object_id).build())
            .await?;
        let Some(frame_id) = described.result.node.frame_id.clone() else {
            return Ok(None);
        };

        let mut world = CreateIsolatedWorldParams::new(frame_id);
        world.world_name = Some(WORLD_NAME.to_string());
        match self.page.execute(world).await {
            Ok(created) => Ok(Some(created.result.execution_context_id)),
            Err(e) => {
                log::debug!("No document in frame {}: {}", element_ref, e);
                Ok(None)
            }
        }
    }

    async fn element_action(&self, script: String, element: &ElementHandle) -> Result<()> {
        let context = self.current_context().await;
        self.eval::<bool>(script, context).await.map_err(|e| match e {
            BrowserError::Script(msg) if msg.contains("is not in the current document") => {
                BrowserError::StaleElement(element.id().to_string())
            }
            other => other,
        })?;
        Ok(())
    }
}

#[async_trait]
impl Session for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.frame_path.lock().await.clear();
        log::debug!("Navigating to {}", url);

        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| BrowserError::NavigationFailed(format!("Invalid URL {}: {}", url, e)))?;

        match tokio::time::timeout(self.page_load_timeout, self.page.goto(params)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                let error_str = e.to_string();
                // "oneshot canceled" means the browser connection is gone
                if error_str.contains("oneshot canceled") {
                    Err(BrowserError::NavigationFailed(
                        "Browser connection lost. The browser may have been closed or crashed."
                            .to_string(),
                    ))
                } else {
                    Err(BrowserError::NavigationFailed(format!(
                        "Failed to navigate to {}: {}",
                        url, e
                    )))
                }
            }
            Err(_) => Err(BrowserError::NavigationFailed(format!(
                "Page load of {} did not finish within {:.0}s",
                url,
                self.page_load_timeout.as_secs_f64()
            ))),
        }
    }

    async fn find_element(&self, selector: &Selector) -> Result<Option<ElementHandle>> {
        let context = self.current_context().await;
        let found: String = self
            .eval(script::find_element(selector, &self.candidate_ref()), context)
            .await?;
        Ok((!found.is_empty()).then(|| ElementHandle::new(found)))
    }

    async fn switch_to_frame_when_available(&self, selector: &Selector) -> Result<bool> {
        let mut path = self.frame_path.lock().await;
        let parent = path.last().map(|f| f.context);
        let found: String = self
            .eval(script::locate_frame(selector, &self.candidate_ref()), parent)
            .await?;
        if found.is_empty() {
            return Ok(false);
        }

        let Some(context) = self.enter_frame(&found, parent).await? else {
            return Ok(false);
        };
        let ready: bool = self.eval(script::document_ready(), Some(context)).await?;
        if !ready {
            return Ok(false);
        }

        path.push(FrameEntry {
            element_ref: found,
            context,
        });
        Ok(true)
    }

    async fn switch_to_frame(&self, frame: &ElementHandle) -> Result<()> {
        let mut path = self.frame_path.lock().await;
        let parent = path.last().map(|f| f.context);
        let context = self
            .enter_frame(frame.id(), parent)
            .await
            .map_err(|e| BrowserError::FrameUnavailable(e.to_string()))?
            .ok_or_else(|| {
                BrowserError::FrameUnavailable(format!("Frame {} has no document", frame.id()))
            })?;

        path.push(FrameEntry {
            element_ref: frame.id().to_string(),
            context,
        });
        Ok(())
    }

    async fn switch_to_default_content(&self) -> Result<()> {
        self.frame_path.lock().await.clear();
        Ok(())
    }

    async fn page_source(&self) -> Result<String> {
        match self.current_context().await {
            None => self
                .page
                .content()
                .await
                .map_err(|e| BrowserError::Other(e.to_string())),
            Some(context) => self.eval(script::document_source(), Some(context)).await,
        }
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> Result<()> {
        self.element_action(script::scroll_into_view(element.id()), element)
            .await
    }

    async fn highlight(&self, element: &ElementHandle) -> Result<()> {
        self.element_action(script::highlight(element.id()), element)
            .await
    }

    async fn screenshot_element(&self, element: &ElementHandle) -> Result<Vec<u8>> {
        let path = self.frame_path.lock().await.clone();
        let rect: ElementRect = self
            .eval(
                script::element_rect(element.id()),
                path.last().map(|f| f.context),
            )
            .await?;

        if rect.width <= 0.0 || rect.height <= 0.0 {
            return Err(BrowserError::Other(format!(
                "Element {} has an empty bounding box ({}x{})",
                element.id(),
                rect.width,
                rect.height
            )));
        }

        // Each frame's offset is measured in its parent's viewport
        let (mut x, mut y) = (rect.x, rect.y);
        let mut parent = None;
        for frame in &path {
            let offset: Offset = self
                .eval(script::frame_offset(&frame.element_ref), parent)
                .await?;
            x += offset.x;
            y += offset.y;
            parent = Some(frame.context);
        }
        let scroll: Offset = self.eval(script::scroll_offset(), None).await?;

        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .capture_beyond_viewport(true)
            .clip(Viewport {
                x: x + scroll.x,
                y: y + scroll.y,
                width: rect.width,
                height: rect.height,
                scale: 1.0,
            })
            .build();

        let response = self.page.execute(params).await?;
        let data_b64: &str = response.data.as_ref();
        general_purpose::STANDARD
            .decode(data_b64.as_bytes())
            .map_err(|e| BrowserError::Other(format!("Failed to decode screenshot data: {}", e)))
    }

    async fn is_clickable(&self, element: &ElementHandle) -> Result<bool> {
        let context = self.current_context().await;
        self.eval(script::is_clickable(element.id()), context).await
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.element_action(script::focus_and_clear(element.id()), element)
            .await?;
        self.page.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.element_action(script::click(element.id()), element)
            .await
    }

    async fn add_cookie(&self, cookie: &Cookie) -> Result<()> {
        let mut param = serde_json::json!({
            "name": cookie.name,
            "value": cookie.value,
        });

        // Cookies without a domain apply to the current document, as in WebDriver
        match &cookie.domain {
            Some(domain) => param["domain"] = domain.clone().into(),
            None => {
                let url = self.page.url().await?.ok_or(BrowserError::NoPage)?;
                param["url"] = url.into();
            }
        }
        if let Some(path) = &cookie.path {
            param["path"] = path.clone().into();
        }
        if let Some(secure) = cookie.secure {
            param["secure"] = secure.into();
        }
        if let Some(http_only) = cookie.http_only {
            param["httpOnly"] = http_only.into();
        }
        if let Some(expiry) = cookie.expiry {
            param["expires"] = expiry.into();
        }

        let params: SetCookiesParams =
            serde_json::from_value(serde_json::json!({ "cookies": [param] })).map_err(|e| {
                BrowserError::Other(format!("Invalid cookie {}: {}", cookie.name, e))
            })?;

        self.page.execute(params).await?;
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        // Clean up temporary directory if it exists
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}
