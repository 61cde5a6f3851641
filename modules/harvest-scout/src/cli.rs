use std::path::PathBuf;

use clap::Parser;

use harvest_common::config::validate_proxy;
use harvest_common::{
    parse_iso_date, Concurrency, ConfigError, DateWindow, EnvConfig, FileConfig, HarvestConfig,
    RenderPolicy, SourceSelection,
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "review-harvest",
    about = "Collect G2, Capterra and TrustRadius reviews for a company within a date window"
)]
pub struct Cli {
    /// Company or product name to look up on each platform
    #[arg(long)]
    pub company: String,

    /// First day of the window, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub start: String,

    /// Last day of the window, inclusive (YYYY-MM-DD)
    #[arg(long)]
    pub end: String,

    /// g2, capterra, trustradius or all
    #[arg(long, default_value = "all")]
    pub source: String,

    /// Output JSON file [default: <company-slug>-reviews.json]
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Use the headless browser from the first request
    #[arg(long = "use-selenium", visible_alias = "render-first")]
    pub render_first: bool,

    /// Never use the headless browser
    #[arg(long)]
    pub no_render: bool,

    /// Proxy URL for static fetches (overrides HARVEST_PROXY)
    #[arg(long)]
    pub proxy: Option<String>,

    /// Run sources one after another instead of concurrently
    #[arg(long)]
    pub sequential: bool,

    /// Maximum listing pages per source
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// TOML file with fetch/render/pagination tuning
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Validate arguments and layer them over the file config and environment.
    /// Precedence: flags, then environment, then `--config`, then defaults.
    pub fn into_config(self, env: &EnvConfig) -> Result<HarvestConfig, ConfigError> {
        if self.render_first && self.no_render {
            return Err(ConfigError::Conflict(
                "--use-selenium/--render-first and --no-render".to_string(),
            ));
        }

        let start = parse_iso_date("start", &self.start)?;
        let end = parse_iso_date("end", &self.end)?;
        let window = DateWindow::new(start, end)?;
        let selection: SourceSelection = self.source.parse()?;

        let mut config = HarvestConfig::new(&self.company, window, selection.sources())?;

        if let Some(ref path) = self.config {
            FileConfig::load(path)?.apply(&mut config)?;
        }

        if let Some(ref proxy) = env.proxy {
            config.fetch.proxy = Some(validate_proxy(proxy)?);
        }
        if let Some(ref proxy) = self.proxy {
            config.fetch.proxy = Some(validate_proxy(proxy)?);
        }

        if let Some(output) = self.output {
            config.output_path = output;
        }
        if let Some(max_pages) = self.max_pages {
            config.pagination.max_pages = max_pages.max(1);
        }

        config.render_policy = if self.no_render {
            RenderPolicy::StaticOnly
        } else if self.render_first {
            RenderPolicy::RenderedFirst
        } else {
            RenderPolicy::StaticFirst
        };
        config.render.backend = match config.render_policy {
            RenderPolicy::StaticOnly => None,
            _ => Some(env.render_backend()),
        };

        if self.sequential {
            config.concurrency = Concurrency::Sequential;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_common::{RenderBackend, Source};

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["review-harvest"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    fn base() -> Vec<&'static str> {
        vec!["--company", "Acme", "--start", "2024-01-01", "--end", "2024-01-31"]
    }

    #[test]
    fn defaults() {
        let config = parse(&base()).into_config(&EnvConfig::default()).unwrap();
        assert_eq!(config.sources, Source::ALL.to_vec());
        assert_eq!(config.output_path, PathBuf::from("acme-reviews.json"));
        assert_eq!(config.render_policy, RenderPolicy::StaticFirst);
        assert_eq!(
            config.render.backend,
            Some(RenderBackend::Chrome {
                binary: "chromium".into()
            })
        );
        assert_eq!(config.concurrency, Concurrency::Concurrent);
    }

    #[test]
    fn render_flags() {
        let mut args = base();
        args.push("--use-selenium");
        let config = parse(&args).into_config(&EnvConfig::default()).unwrap();
        assert_eq!(config.render_policy, RenderPolicy::RenderedFirst);

        let mut args = base();
        args.push("--render-first");
        let config = parse(&args).into_config(&EnvConfig::default()).unwrap();
        assert_eq!(config.render_policy, RenderPolicy::RenderedFirst);

        let mut args = base();
        args.push("--no-render");
        let config = parse(&args).into_config(&EnvConfig::default()).unwrap();
        assert_eq!(config.render_policy, RenderPolicy::StaticOnly);
        assert!(config.render.backend.is_none());

        args.push("--render-first");
        assert!(matches!(
            parse(&args).into_config(&EnvConfig::default()),
            Err(ConfigError::Conflict(_))
        ));
    }

    #[test]
    fn invalid_inputs_are_config_errors() {
        let cli = parse(&["--company", "Acme", "--start", "2024-02-01", "--end", "2024-01-01"]);
        assert!(matches!(
            cli.into_config(&EnvConfig::default()),
            Err(ConfigError::InvertedWindow { .. })
        ));

        let cli = parse(&["--company", "Acme", "--start", "yesterday", "--end", "2024-01-01"]);
        assert!(matches!(
            cli.into_config(&EnvConfig::default()),
            Err(ConfigError::InvalidDate { field: "start", .. })
        ));

        let mut args = base();
        args.extend_from_slice(&["--source", "yelp"]);
        assert!(matches!(
            parse(&args).into_config(&EnvConfig::default()),
            Err(ConfigError::UnknownSource(_))
        ));

        let cli = parse(&["--company", " ", "--start", "2024-01-01", "--end", "2024-01-31"]);
        assert!(matches!(
            cli.into_config(&EnvConfig::default()),
            Err(ConfigError::EmptyCompany)
        ));
    }

    #[test]
    fn cli_proxy_overrides_env() {
        let env = EnvConfig {
            proxy: Some("http://env-proxy:3128".into()),
            ..Default::default()
        };
        let config = parse(&base()).into_config(&env).unwrap();
        assert_eq!(config.fetch.proxy.as_deref(), Some("http://env-proxy:3128"));

        let mut args = base();
        args.extend_from_slice(&["--proxy", "http://cli-proxy:8080", "--sequential", "--max-pages", "0"]);
        let config = parse(&args).into_config(&env).unwrap();
        assert_eq!(config.fetch.proxy.as_deref(), Some("http://cli-proxy:8080"));
        assert_eq!(config.concurrency, Concurrency::Sequential);
        assert_eq!(config.pagination.max_pages, 1);
    }

    #[test]
    fn single_source_selection() {
        let mut args = base();
        args.extend_from_slice(&["--source", "TrustRadius", "--output", "out/tr.json"]);
        let config = parse(&args).into_config(&EnvConfig::default()).unwrap();
        assert_eq!(config.sources, vec![Source::TrustRadius]);
        assert_eq!(config.report_path(), PathBuf::from("out/tr.report.json"));
    }
}
