use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dossier.db")
}

/// Where artifacts live on disk and how they are exposed.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for artifacts, staging, recovered files and diagnostics.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Base URL under which `data_dir/cases` is served as `/static/`.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Extension appended to artifact file names (empty = none).
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            public_base_url: default_public_base_url(),
            artifact_extension: default_artifact_extension(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_artifact_extension() -> String {
    "pdf".to_string()
}

/// Retry, timeout and deadline policy for one acquisition run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AcquisitionConfig {
    /// Bound on every wait inside a step, in seconds.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    /// Attempts allowed per step before it escalates to a job failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the second attempt of a step, in milliseconds.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Growth factor applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for the delay between attempts, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Hard limit for a whole run, in seconds.
    #[serde(default = "default_overall_deadline")]
    pub overall_deadline_secs: u64,

    /// How long to wait for the artifact after the download is triggered, in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
}

fn default_step_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    10_000
}

fn default_overall_deadline() -> u64 {
    300 // 5 minutes
}

fn default_download_timeout() -> u64 {
    60
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff(),
            overall_deadline_secs: default_overall_deadline(),
            download_timeout_secs: default_download_timeout(),
        }
    }
}

impl AcquisitionConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.overall_deadline_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.retry_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Concurrency policy for the job dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatcherConfig {
    /// Maximum acquisitions running at the same time across distinct cases.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// How long a finished job stays visible. Successful jobs also keep
    /// answering requests for the same case; failed ones never do.
    #[serde(default = "default_result_retention")]
    pub result_retention_secs: u64,
}

fn default_concurrency_limit() -> usize {
    2
}

fn default_result_retention() -> u64 {
    10
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            result_retention_secs: default_result_retention(),
        }
    }
}

/// Outcome notification delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Default webhook URL; requests may override it with their own callback.
    #[serde(default)]
    pub target: Option<String>,
    /// Per-delivery timeout in seconds.
    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
    /// Delivery attempts before the notification is dropped.
    #[serde(default = "default_notification_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between delivery attempts, in milliseconds.
    #[serde(default = "default_notification_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_notification_timeout() -> u64 {
    30
}

fn default_notification_attempts() -> u32 {
    3
}

fn default_notification_backoff() -> u64 {
    2000
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            target: None,
            timeout_secs: default_notification_timeout(),
            max_attempts: default_notification_attempts(),
            retry_backoff_ms: default_notification_backoff(),
        }
    }
}

/// Remote portal layout and credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_base_url")]
    pub base_url: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Any of these (case-insensitive) in the page after login means success.
    #[serde(default = "default_login_indicators")]
    pub login_success_indicators: Vec<String>,
    /// Substring identifying the URL of the window that serves the artifact.
    #[serde(default = "default_artifact_url_pattern")]
    pub artifact_url_pattern: String,
    #[serde(default)]
    pub selectors: PortalSelectors,
}

impl PortalConfig {
    pub fn login_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.login_path)
    }

    pub fn search_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.search_path)
    }
}

fn default_portal_base_url() -> String {
    "https://pje.tjmg.jus.br".to_string()
}

fn default_login_path() -> String {
    "/pje/login.seam".to_string()
}

fn default_search_path() -> String {
    "/pje/Processo/ConsultaProcesso/listView.seam".to_string()
}

fn default_login_indicators() -> Vec<String> {
    vec![
        "processo".to_string(),
        "consulta".to_string(),
        "quadroaviso".to_string(),
    ]
}

fn default_artifact_url_pattern() -> String {
    "s3-pjedocumentos.tjmg.jus.br".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_portal_base_url(),
            login_path: default_login_path(),
            search_path: default_search_path(),
            username: String::new(),
            password: String::new(),
            login_success_indicators: default_login_indicators(),
            artifact_url_pattern: default_artifact_url_pattern(),
            selectors: PortalSelectors::default(),
        }
    }
}

/// CSS selectors (or element ids, prefixed with `#`) for the portal pages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalSelectors {
    pub sso_frame: String,
    pub username_field: String,
    pub password_field: String,
    pub submit_button: String,
    pub sequential_field: String,
    pub digit_field: String,
    pub year_field: String,
    pub court_field: String,
    pub search_button: String,
    /// Link to the case in the result list; `{case_number}` is substituted.
    pub result_link: String,
    pub download_menu: String,
    pub download_button: String,
}

impl Default for PortalSelectors {
    fn default() -> Self {
        Self {
            sso_frame: "#ssoFrame".to_string(),
            username_field: "#username".to_string(),
            password_field: "#password".to_string(),
            submit_button: "input[type='submit']".to_string(),
            sequential_field: "[id='fPP:numeroProcesso:numeroSequencial']".to_string(),
            digit_field: "[id='fPP:numeroProcesso:numeroDigitoVerificador']".to_string(),
            year_field: "[id='fPP:numeroProcesso:Ano']".to_string(),
            court_field: "[id='fPP:numeroProcesso:NumeroOrgaoJustica']".to_string(),
            search_button: "input[value='Pesquisar']".to_string(),
            result_link: "a[title*='{case_number}']".to_string(),
            download_menu: "a.btn-menu-abas.dropdown-toggle[title*='Download']".to_string(),
            download_button: "[id='navbar:j_id220'], input[value='Download']".to_string(),
        }
    }
}

impl PortalSelectors {
    pub fn result_link_for(&self, case_number: &str) -> String {
        self.result_link.replace("{case_number}", case_number)
    }
}

/// WebDriver endpoint used by the concrete session driver.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebDriverConfig {
    #[serde(default = "default_webdriver_url")]
    pub url: String,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_headless() -> bool {
    true
}

fn default_browser_args() -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-extensions".to_string(),
        "--window-size=1920,1080".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
    ]
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
            headless: default_headless(),
            browser_args: default_browser_args(),
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub acquisition: AcquisitionConfig,
    pub dispatcher: DispatcherConfig,
    pub notification: NotificationConfig,
    pub portal: SanitizedPortalConfig,
    pub webdriver: WebDriverConfig,
}

/// Portal config with the password hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPortalConfig {
    pub base_url: String,
    pub login_path: String,
    pub search_path: String,
    pub username: String,
    pub password_configured: bool,
    pub artifact_url_pattern: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            acquisition: config.acquisition.clone(),
            dispatcher: config.dispatcher.clone(),
            notification: config.notification.clone(),
            portal: SanitizedPortalConfig {
                base_url: config.portal.base_url.clone(),
                login_path: config.portal.login_path.clone(),
                search_path: config.portal.search_path.clone(),
                username: config.portal.username.clone(),
                password_configured: !config.portal.password.is_empty(),
                artifact_url_pattern: config.portal.artifact_url_pattern.clone(),
            },
            webdriver: config.webdriver.clone(),
        }
    }
}
