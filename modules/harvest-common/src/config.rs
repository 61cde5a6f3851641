use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::types::{DateWindow, Source};

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Whether and when the rendered (headless browser) fetch mode may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPolicy {
    /// Never render; static fetches only.
    StaticOnly,
    /// Static first, escalate to rendering per page when the adapter asks for it.
    StaticFirst,
    /// Render from the first request.
    RenderedFirst,
}

/// Which concrete browser backs rendered fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderBackend {
    /// Local headless Chrome/Chromium binary driven with `--dump-dom`.
    Chrome { binary: String },
    /// Remote Browserless instance.
    Browserless {
        base_url: String,
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    Concurrent,
    Sequential,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Per-request timeout for static fetches.
    pub timeout: Duration,
    /// Attempts per page for retriable failures (first try included).
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub user_agent: String,
    pub proxy: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(8),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"
                .to_string(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub backend: Option<RenderBackend>,
    /// Idle period the page gets to settle after load.
    pub settle: Duration,
    /// Hard ceiling for one rendered fetch.
    pub ceiling: Duration,
    /// Browser sessions allowed at once across all adapters.
    pub max_sessions: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            backend: None,
            settle: Duration::from_secs(2),
            ceiling: Duration::from_secs(30),
            max_sessions: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    /// Hard cap on listing pages walked per adapter.
    pub max_pages: u32,
    /// Wall-clock budget per adapter run.
    pub adapter_budget: Duration,
    /// Pause between consecutive page fetches of one adapter.
    pub page_delay: Duration,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            max_pages: 50,
            adapter_budget: Duration::from_secs(600),
            page_delay: Duration::from_millis(800),
        }
    }
}

/// Validated configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub company: String,
    pub window: DateWindow,
    pub sources: Vec<Source>,
    pub output_path: PathBuf,
    pub render_policy: RenderPolicy,
    pub concurrency: Concurrency,
    pub fetch: FetchSettings,
    pub render: RenderSettings,
    pub pagination: PaginationSettings,
}

impl HarvestConfig {
    /// Minimal config with defaults for everything but the run identity.
    pub fn new(company: &str, window: DateWindow, sources: Vec<Source>) -> Result<Self, ConfigError> {
        let company = company.trim();
        if company.is_empty() {
            return Err(ConfigError::EmptyCompany);
        }
        Ok(Self {
            company: company.to_string(),
            window,
            sources,
            output_path: PathBuf::from(crate::types::default_output_file(company)),
            render_policy: RenderPolicy::StaticFirst,
            concurrency: Concurrency::Concurrent,
            fetch: FetchSettings::default(),
            render: RenderSettings::default(),
            pagination: PaginationSettings::default(),
        })
    }

    /// Where the run report is written: next to the output, `<stem>.report.json`.
    pub fn report_path(&self) -> PathBuf {
        report_path_for(&self.output_path)
    }

    pub fn log_summary(&self) {
        info!(
            company = self.company.as_str(),
            start = %self.window.start,
            end = %self.window.end,
            sources = ?self.sources,
            output = %self.output_path.display(),
            render_policy = ?self.render_policy,
            render_backend = ?self.render.backend.as_ref().map(backend_label),
            proxy = self.fetch.proxy.is_some(),
            "Harvest configuration"
        );
    }
}

fn backend_label(backend: &RenderBackend) -> &'static str {
    match backend {
        RenderBackend::Chrome { .. } => "chrome",
        RenderBackend::Browserless { .. } => "browserless",
    }
}

pub fn report_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "reviews".to_string());
    output.with_file_name(format!("{stem}.report.json"))
}

/// Reject anything `reqwest::Proxy` would choke on before the run starts.
pub fn validate_proxy(proxy: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(proxy).map_err(|_| ConfigError::InvalidProxy(proxy.to_string()))?;
    match parsed.scheme() {
        "http" | "https" | "socks5" | "socks5h" if parsed.host_str().is_some() => Ok(proxy.to_string()),
        _ => Err(ConfigError::InvalidProxy(proxy.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Deployment-specific values read from the environment (and `.env`).
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub chrome_bin: Option<String>,
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,
    pub proxy: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            chrome_bin: non_empty_var("CHROME_BIN"),
            browserless_url: non_empty_var("BROWSERLESS_URL"),
            browserless_token: non_empty_var("BROWSERLESS_TOKEN"),
            proxy: non_empty_var("HARVEST_PROXY"),
        }
    }

    /// Browserless wins when configured; otherwise a local Chrome binary
    /// (`CHROME_BIN`, default `chromium`).
    pub fn render_backend(&self) -> RenderBackend {
        match &self.browserless_url {
            Some(base_url) => RenderBackend::Browserless {
                base_url: base_url.clone(),
                token: self.browserless_token.clone(),
            },
            None => RenderBackend::Chrome {
                binary: self.chrome_bin.clone().unwrap_or_else(|| "chromium".to_string()),
            },
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Optional TOML tuning file
// ---------------------------------------------------------------------------

/// Tuning overrides loaded from `--config <path>`. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub pagination: PaginationSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchSection {
    pub timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderSection {
    pub settle_ms: Option<u64>,
    pub ceiling_secs: Option<u64>,
    pub max_sessions: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaginationSection {
    pub max_pages: Option<u32>,
    pub adapter_budget_secs: Option<u64>,
    pub page_delay_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;
        Self::parse(&content).map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay the file's values on an existing config.
    pub fn apply(&self, config: &mut HarvestConfig) -> Result<(), ConfigError> {
        let f = &self.fetch;
        if let Some(secs) = f.timeout_secs {
            config.fetch.timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = f.max_attempts {
            config.fetch.max_attempts = n.max(1);
        }
        if let Some(ms) = f.backoff_base_ms {
            config.fetch.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = f.backoff_max_ms {
            config.fetch.backoff_max = Duration::from_millis(ms);
        }
        if let Some(ref ua) = f.user_agent {
            config.fetch.user_agent = ua.clone();
        }
        if let Some(ref proxy) = f.proxy {
            config.fetch.proxy = Some(validate_proxy(proxy)?);
        }

        let r = &self.render;
        if let Some(ms) = r.settle_ms {
            config.render.settle = Duration::from_millis(ms);
        }
        if let Some(secs) = r.ceiling_secs {
            config.render.ceiling = Duration::from_secs(secs.max(1));
        }
        if let Some(n) = r.max_sessions {
            config.render.max_sessions = n.max(1);
        }

        let p = &self.pagination;
        if let Some(n) = p.max_pages {
            config.pagination.max_pages = n.max(1);
        }
        if let Some(secs) = p.adapter_budget_secs {
            config.pagination.adapter_budget = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = p.page_delay_ms {
            config.pagination.page_delay = Duration::from_millis(ms);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn config() -> HarvestConfig {
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        HarvestConfig::new("Acme", window, vec![Source::G2]).unwrap()
    }

    #[test]
    fn blank_company_is_rejected() {
        let window = config().window;
        assert!(matches!(
            HarvestConfig::new("   ", window, vec![Source::G2]),
            Err(ConfigError::EmptyCompany)
        ));
    }

    #[test]
    fn default_output_and_report_paths() {
        let c = config();
        assert_eq!(c.output_path, PathBuf::from("acme-reviews.json"));
        assert_eq!(c.report_path(), PathBuf::from("acme-reviews.report.json"));
    }

    #[test]
    fn report_path_keeps_directory() {
        let p = report_path_for(Path::new("out/data/reviews.json"));
        assert_eq!(p, PathBuf::from("out/data/reviews.report.json"));
    }

    #[test]
    fn proxy_validation() {
        assert!(validate_proxy("http://127.0.0.1:8080").is_ok());
        assert!(validate_proxy("socks5://proxy.local:1080").is_ok());
        assert!(validate_proxy("not a url").is_err());
        assert!(validate_proxy("ftp://proxy.local").is_err());
    }

    #[test]
    fn file_config_overlays_values() {
        let file = FileConfig::parse(
            r#"
            [fetch]
            timeout_secs = 5
            max_attempts = 0

            [pagination]
            max_pages = 3
            page_delay_ms = 0
            "#,
        )
        .unwrap();
        let mut c = config();
        file.apply(&mut c).unwrap();
        assert_eq!(c.fetch.timeout, Duration::from_secs(5));
        assert_eq!(c.fetch.max_attempts, 1, "attempts are clamped to at least one");
        assert_eq!(c.pagination.max_pages, 3);
        assert_eq!(c.pagination.page_delay, Duration::ZERO);
        assert_eq!(c.render.max_sessions, 1);
    }

    #[test]
    fn file_config_rejects_unknown_keys() {
        assert!(FileConfig::parse("[fetch]\nretries = 4\n").is_err());
    }

    #[test]
    fn file_config_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        std::fs::write(&path, "[render]\nsettle_ms = 500\n").unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.render.settle_ms, Some(500));
    }

    #[test]
    fn browserless_wins_over_chrome() {
        let env = EnvConfig {
            chrome_bin: Some("/usr/bin/chromium".into()),
            browserless_url: Some("http://browserless:3000".into()),
            browserless_token: None,
            proxy: None,
        };
        assert!(matches!(env.render_backend(), RenderBackend::Browserless { .. }));
        let env = EnvConfig::default();
        assert_eq!(
            env.render_backend(),
            RenderBackend::Chrome { binary: "chromium".into() }
        );
    }
}
