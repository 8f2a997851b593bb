//! W3C WebDriver session driver (chromedriver, geckodriver, ...).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PortalConfig, WebDriverConfig};

use super::{
    Action, Condition, Credentials, DownloadRequest, ElementRef, PageState, Selector,
    SessionDriver, SessionError, SessionFactory,
};

/// W3C element reference key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Session driver speaking the W3C WebDriver HTTP protocol.
pub struct WebDriverSession {
    client: Client,
    config: Arc<WebDriverConfig>,
    portal: Arc<PortalConfig>,
    step_timeout: Duration,
    session_id: Option<String>,
}

impl WebDriverSession {
    pub fn new(
        client: Client,
        config: Arc<WebDriverConfig>,
        portal: Arc<PortalConfig>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            client,
            config,
            portal,
            step_timeout,
            session_id: None,
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn session_path(&self, suffix: &str) -> Result<String, SessionError> {
        let id = self
            .session_id
            .as_deref()
            .ok_or_else(|| SessionError::Transport("session not open".to_string()))?;
        Ok(format!("/session/{}{}", id, suffix))
    }

    /// Send a WebDriver command and return its `value`.
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        let url = format!("{}{}", self.base_url(), path);
        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SessionError::Transport(format!("invalid WebDriver response: {}", e)))?;

        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
            return Err(map_webdriver_error(error, message));
        }

        if !status.is_success() {
            return Err(SessionError::Transport(format!("HTTP {}", status)));
        }

        Ok(value)
    }

    async fn session_command(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Value, SessionError> {
        let path = self.session_path(suffix)?;
        self.command(method, &path, body).await
    }

    async fn find(&self, selector: &Selector) -> Result<String, SessionError> {
        let value = self
            .session_command(
                Method::POST,
                "/element",
                Some(json!({ "using": "css selector", "value": selector.to_css() })),
            )
            .await?;

        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| SessionError::NotFound(selector.to_string()))
    }

    async fn current_url(&self) -> Result<String, SessionError> {
        let value = self.session_command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_source(&self) -> Result<String, SessionError> {
        let value = self.session_command(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn window_handles(&self) -> Result<Vec<String>, SessionError> {
        let value = self
            .session_command(Method::GET, "/window/handles", None)
            .await?;
        Ok(value
            .as_array()
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn current_window(&self) -> Result<String, SessionError> {
        let value = self.session_command(Method::GET, "/window", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), SessionError> {
        self.session_command(Method::POST, "/window", Some(json!({ "handle": handle })))
            .await
            .map(|_| ())
    }

    async fn switch_to_frame(&self, element_id: Option<&str>) -> Result<(), SessionError> {
        let id = match element_id {
            Some(id) => json!({ ELEMENT_KEY: id }),
            None => Value::Null,
        };
        self.session_command(Method::POST, "/frame", Some(json!({ "id": id })))
            .await
            .map(|_| ())
    }

    async fn type_into(&self, selector: &Selector, text: &str) -> Result<(), SessionError> {
        let element = self.find(selector).await?;
        self.session_command(Method::POST, &format!("/element/{}/clear", element), Some(json!({})))
            .await?;
        self.session_command(
            Method::POST,
            &format!("/element/{}/value", element),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    /// Check a condition once; `Ok(false)` means "not yet".
    async fn check(&self, condition: &Condition) -> Result<bool, SessionError> {
        match condition {
            Condition::ElementPresent(selector) => match self.find(selector).await {
                Ok(_) => Ok(true),
                Err(SessionError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            },
            Condition::UrlContains(fragment) => {
                Ok(self.current_url().await?.contains(fragment.as_str()))
            }
            Condition::PageContainsAny(fragments) => {
                let source = self.page_source().await?.to_lowercase();
                let url = self.current_url().await?.to_lowercase();
                Ok(fragments.iter().any(|f| {
                    let f = f.to_lowercase();
                    source.contains(&f) || url.contains(&f)
                }))
            }
        }
    }

    /// Poll for a window not in `known`, optionally requiring its URL to
    /// contain `url_fragment`. Leaves the session switched to that window.
    async fn wait_for_new_window(
        &self,
        known: &HashSet<String>,
        url_fragment: Option<&str>,
        timeout: Duration,
    ) -> Result<(String, String), SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            for handle in self.window_handles().await? {
                if known.contains(&handle) {
                    continue;
                }
                self.switch_to_window(&handle).await?;
                let url = self.current_url().await?;
                match url_fragment {
                    Some(fragment) if !url.contains(fragment) => continue,
                    _ => return Ok((handle, url)),
                }
            }

            if Instant::now() >= deadline {
                return Err(SessionError::Timeout(match url_fragment {
                    Some(fragment) => format!("no window with url containing '{}'", fragment),
                    None => "no new window opened".to_string(),
                }));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn fetch_artifact(
        &self,
        url: &str,
        destination: &Path,
        timeout: Duration,
    ) -> Result<u64, SessionError> {
        let response = self.client.get(url).timeout(timeout).send().await?;
        if !response.status().is_success() {
            return Err(SessionError::Transport(format!(
                "artifact download returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Transport(e.to_string()))?;
        }
        tokio::fs::write(destination, &bytes)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))?;

        Ok(bytes.len() as u64)
    }
}

/// A window other than `current`. Before the case window is followed the
/// portal runs in a single window, so any other handle was opened by a click.
fn opened_window<'a>(handles: &'a [String], current: &str) -> Option<&'a str> {
    handles
        .iter()
        .map(String::as_str)
        .find(|handle| *handle != current)
}

fn map_webdriver_error(error: &str, message: String) -> SessionError {
    let detail = if message.is_empty() {
        error.to_string()
    } else {
        format!("{}: {}", error, message)
    };
    match error {
        "no such element" | "stale element reference" | "no such window" | "no such frame"
        | "element not interactable" => SessionError::NotFound(detail),
        "timeout" | "script timeout" => SessionError::Timeout(detail),
        _ => SessionError::Transport(detail),
    }
}

#[async_trait]
impl SessionDriver for WebDriverSession {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        if self.session_id.is_some() {
            return Ok(());
        }

        let mut args = self.config.browser_args.clone();
        if self.config.headless {
            args.push("--headless=new".to_string());
        }

        let value = self
            .command(
                Method::POST,
                "/session",
                Some(json!({
                    "capabilities": {
                        "alwaysMatch": {
                            "browserName": "chrome",
                            "goog:chromeOptions": { "args": args }
                        }
                    }
                })),
            )
            .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::Transport("WebDriver returned no session id".into()))?;

        info!(session_id = %session_id, "WebDriver session opened");
        self.session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), SessionError> {
        let portal = Arc::clone(&self.portal);
        let selectors = &portal.selectors;
        let login_url = portal.login_url();
        self.navigate(&login_url).await?;

        let frame = Selector::parse(&selectors.sso_frame);
        let in_frame = match self
            .wait_for(&Condition::ElementPresent(frame.clone()), self.step_timeout)
            .await
        {
            Ok(()) => {
                let frame_id = self.find(&frame).await?;
                self.switch_to_frame(Some(&frame_id)).await?;
                true
            }
            Err(SessionError::Timeout(_)) => {
                debug!("No SSO frame found, using top-level login form");
                false
            }
            Err(e) => return Err(e),
        };

        let username = Selector::parse(&selectors.username_field);
        self.wait_for(&Condition::ElementPresent(username.clone()), self.step_timeout)
            .await?;
        self.type_into(&username, &credentials.username).await?;
        self.type_into(&Selector::parse(&selectors.password_field), &credentials.password)
            .await?;

        let submit = self.find(&Selector::parse(&selectors.submit_button)).await?;
        self.session_command(Method::POST, &format!("/element/{}/click", submit), Some(json!({})))
            .await?;

        if in_frame {
            self.switch_to_frame(None).await?;
        }

        let indicators = Condition::PageContainsAny(portal.login_success_indicators.clone());
        match self.wait_for(&indicators, self.step_timeout).await {
            Ok(()) => {}
            Err(SessionError::Timeout(_)) => {
                return Err(SessionError::Rejected(
                    "login not confirmed by the portal".to_string(),
                ));
            }
            Err(e) => return Err(e),
        }

        // The portal only renders the logged-in menu after a reload.
        self.session_command(Method::POST, "/refresh", Some(json!({})))
            .await?;

        info!(username = %credentials.username, "Portal login confirmed");
        Ok(())
    }

    async fn navigate(&mut self, target: &str) -> Result<(), SessionError> {
        debug!(url = %target, "Navigating");
        self.session_command(Method::POST, "/url", Some(json!({ "url": target })))
            .await
            .map(|_| ())
    }

    async fn wait_for(
        &mut self,
        condition: &Condition,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.check(condition).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SessionError::Timeout(format!(
                    "waited {:?} for {}",
                    timeout, condition
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn locate(&mut self, selector: &Selector) -> Result<ElementRef, SessionError> {
        let id = self.find(selector).await?;
        Ok(ElementRef {
            id,
            selector: selector.clone(),
        })
    }

    async fn interact(&mut self, element: &ElementRef, action: &Action) -> Result<(), SessionError> {
        let path = |op: &str| format!("/element/{}/{}", element.id, op);
        match action {
            Action::Click => {
                self.session_command(Method::POST, &path("click"), Some(json!({})))
                    .await?;
            }
            Action::FollowLink => {
                let current = self.current_window().await?;
                let handles = self.window_handles().await?;
                if let Some(handle) = opened_window(&handles, &current) {
                    // An earlier attempt clicked, but its window showed up late.
                    self.switch_to_window(handle).await?;
                    debug!(handle = %handle, "Switched to window opened by an earlier click");
                    return Ok(());
                }

                let known: HashSet<String> = handles.into_iter().collect();
                self.session_command(Method::POST, &path("click"), Some(json!({})))
                    .await?;
                let (_, url) = self
                    .wait_for_new_window(&known, None, self.step_timeout)
                    .await?;
                debug!(url = %url, "Switched to new window");
            }
            Action::Clear => {
                self.session_command(Method::POST, &path("clear"), Some(json!({})))
                    .await?;
            }
            Action::Type(text) => {
                self.session_command(Method::POST, &path("value"), Some(json!({ "text": text })))
                    .await?;
            }
        }
        Ok(())
    }

    async fn trigger_download(
        &mut self,
        request: &DownloadRequest,
    ) -> Result<PathBuf, SessionError> {
        let deadline = Instant::now() + request.timeout;
        let origin = self.current_window().await?;
        let known: HashSet<String> = self.window_handles().await?.into_iter().collect();

        let control = self.find(&request.control).await?;
        self.session_command(Method::POST, &format!("/element/{}/click", control), Some(json!({})))
            .await?;

        let pattern = self.portal.artifact_url_pattern.clone();
        let (_, url) = self
            .wait_for_new_window(&known, Some(&pattern), request.timeout)
            .await?;
        debug!(url = %url, "Artifact window opened");

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SessionError::Timeout(
                "download budget spent waiting for the artifact window".to_string(),
            ));
        }
        let bytes = self
            .fetch_artifact(&url, &request.destination, remaining)
            .await?;
        info!(
            path = %request.destination.display(),
            bytes,
            "Artifact downloaded"
        );

        if let Err(e) = self.session_command(Method::DELETE, "/window", None).await {
            warn!("Failed to close artifact window: {}", e);
        }
        self.switch_to_window(&origin).await?;

        Ok(request.destination.clone())
    }

    async fn capture_diagnostic(&mut self) -> Result<PageState, SessionError> {
        let url = self.current_url().await.ok();
        let title = self
            .session_command(Method::GET, "/title", None)
            .await
            .ok()
            .and_then(|v| v.as_str().map(String::from));
        let page_source = self.page_source().await.ok();
        let screenshot = match self.session_command(Method::GET, "/screenshot", None).await {
            Ok(value) => value.as_str().and_then(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|e| warn!("Invalid screenshot encoding: {}", e))
                    .ok()
            }),
            Err(e) => {
                warn!("Screenshot capture failed: {}", e);
                None
            }
        };

        Ok(PageState {
            url,
            title,
            page_source,
            screenshot,
        })
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        let Some(session_id) = self.session_id.take() else {
            return Ok(());
        };
        self.command(Method::DELETE, &format!("/session/{}", session_id), None)
            .await?;
        info!(session_id = %session_id, "WebDriver session closed");
        Ok(())
    }
}

/// Creates one `WebDriverSession` per acquisition run, sharing an HTTP client.
pub struct WebDriverSessionFactory {
    client: Client,
    config: Arc<WebDriverConfig>,
    portal: Arc<PortalConfig>,
    step_timeout: Duration,
}

impl WebDriverSessionFactory {
    pub fn new(
        config: WebDriverConfig,
        portal: PortalConfig,
        step_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(step_timeout)
            .build()
            .map_err(|e| SessionError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            portal: Arc::new(portal),
            step_timeout,
        })
    }
}

impl SessionFactory for WebDriverSessionFactory {
    fn create(&self) -> Box<dyn SessionDriver> {
        Box::new(WebDriverSession::new(
            self.client.clone(),
            Arc::clone(&self.config),
            Arc::clone(&self.portal),
            self.step_timeout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_webdriver_errors() {
        assert!(matches!(
            map_webdriver_error("no such element", "missing".into()),
            SessionError::NotFound(_)
        ));
        assert!(matches!(
            map_webdriver_error("stale element reference", String::new()),
            SessionError::NotFound(_)
        ));
        assert!(matches!(
            map_webdriver_error("script timeout", String::new()),
            SessionError::Timeout(_)
        ));
        assert!(matches!(
            map_webdriver_error("session not created", String::new()),
            SessionError::Transport(_)
        ));
    }

    #[test]
    fn test_opened_window_ignores_current() {
        let handles = vec!["search".to_string(), "case".to_string()];
        assert_eq!(opened_window(&handles, "search"), Some("case"));
        assert_eq!(opened_window(&handles[..1], "search"), None);
        assert_eq!(opened_window(&[], "search"), None);
    }

    #[tokio::test]
    async fn test_commands_require_open_session() {
        let factory = WebDriverSessionFactory::new(
            WebDriverConfig::default(),
            PortalConfig::default(),
            Duration::from_secs(1),
        )
        .unwrap();
        let mut session = factory.create();

        let err = session.navigate("https://example.invalid").await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(_)));

        // closing a never-opened session is a no-op
        assert!(session.close().await.is_ok());
    }
}
