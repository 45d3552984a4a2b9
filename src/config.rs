use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const ENV_PREFIX: &str = "JAIL";
pub const DEFAULT_CONFIG_FILE: &str = "scraper.toml";

/// Everything the pipeline needs from its collaborators, passed in explicitly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Progress documents live here, apart from the database.
    pub state_dir: PathBuf,
    pub log_file: PathBuf,

    /// Roster listing pages; every row links to an inmate detail page.
    pub roster_urls: Vec<String>,
    /// Court name search; `{last}` and `{first}` are substituted url-encoded.
    pub court_search_url: String,
    /// Regex an href must match to be treated as an inmate detail link.
    pub detail_link_pattern: String,

    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// The county site serves a broken certificate chain.
    pub accept_invalid_certs: bool,

    pub request_delay_ms: u64,
    pub batch_retry_delay_secs: u64,
    pub save_interval_secs: u64,
    pub idle_interval_secs: u64,
    pub batch_size: usize,
    pub max_attempts: u32,

    pub batch_link_threshold: f64,
    pub request_link_threshold: f64,
    pub link_all_candidates: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: PathBuf::from("data/jail.sqlite"),
            state_dir: PathBuf::from("data/state"),
            log_file: PathBuf::from("data/scraper.log"),
            roster_urls: Vec::new(),
            court_search_url: String::new(),
            detail_link_pattern: r"(?i)detail".to_string(),
            user_agent: "Mozilla/5.0 (compatible; JailRecordsBot/1.0)".to_string(),
            timeout_secs: 30,
            max_redirects: 10,
            accept_invalid_certs: true,
            request_delay_ms: 1500,
            batch_retry_delay_secs: 5,
            save_interval_secs: 60,
            idle_interval_secs: 900,
            batch_size: 50,
            max_attempts: 3,
            batch_link_threshold: 70.0,
            request_link_threshold: 80.0,
            link_all_candidates: false,
        }
    }
}

impl Settings {
    /// Optional TOML file overlaid by `JAIL_*` environment variables.
    pub fn load(path: &Path) -> Result<Settings> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("roster_urls"),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", path))?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;
        Ok(settings)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn batch_retry_delay(&self) -> Duration {
        Duration::from_secs(self.batch_retry_delay_secs)
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}
