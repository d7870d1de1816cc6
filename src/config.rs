use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::FixedOffset;
use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::ListerError;

pub const CONFIG_FILE_NAME: &str = "harbor-lister.json";
pub const DEFAULT_OUTPUT: &str = "harbor_images.xlsx";
pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_UTC_OFFSET: &str = "+08:00";
const API_SUFFIX: &str = "/api/v2.0";

/// On-disk shape of `harbor-lister.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub insecure_ssl: Option<bool>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub utc_offset: Option<String>,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub output: Option<String>,
    pub insecure_ssl: Option<bool>,
    pub concurrency: Option<usize>,
    pub page_size: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub utc_offset: Option<String>,
}

#[derive(Clone)]
pub struct ResolvedConfig {
    pub harbor_url: String,
    pub username: String,
    pub password: String,
    pub output: Utf8PathBuf,
    pub insecure_ssl: bool,
    pub concurrency: usize,
    pub page_size: u32,
    pub timeout: Duration,
    pub utc_offset: FixedOffset,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("harbor_url", &self.harbor_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("output", &self.output)
            .field("insecure_ssl", &self.insecure_ssl)
            .field("concurrency", &self.concurrency)
            .field("page_size", &self.page_size)
            .field("timeout", &self.timeout)
            .field("utc_offset", &self.utc_offset)
            .finish()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(overrides: CliOverrides) -> Result<ResolvedConfig, ListerError> {
        let file = match &overrides.config_path {
            Some(path) => Some(Self::read_file(path)?),
            None => match Self::discover() {
                Some(path) => Some(Self::read_file(&path)?),
                None => None,
            },
        };
        Self::resolve_with(file.unwrap_or_default(), overrides)
    }

    pub fn read_file(path: &Path) -> Result<ConfigFile, ListerError> {
        let content =
            fs::read_to_string(path).map_err(|_| ListerError::ConfigRead(path.to_path_buf()))?;
        serde_json::from_str(&content).map_err(|err| ListerError::ConfigParse(err.to_string()))
    }

    /// Looks in the working directory first, then in the per-user config dir.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        ProjectDirs::from("", "", "harbor-lister")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .filter(|path| path.is_file())
    }

    pub fn resolve_with(
        file: ConfigFile,
        overrides: CliOverrides,
    ) -> Result<ResolvedConfig, ListerError> {
        let url = pick(overrides.url, file.url).ok_or(ListerError::MissingField("url"))?;
        let username =
            pick(overrides.username, file.username).ok_or(ListerError::MissingField("username"))?;
        let password =
            pick(overrides.password, file.password).ok_or(ListerError::MissingField("password"))?;

        let output = overrides
            .output
            .or(file.output)
            .unwrap_or_else(|| DEFAULT_OUTPUT.to_string());
        if output.trim().is_empty() {
            return Err(ListerError::InvalidSetting {
                name: "output",
                message: "path is empty".to_string(),
            });
        }

        let concurrency = overrides
            .concurrency
            .or(file.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ListerError::InvalidSetting {
                name: "concurrency",
                message: "must be at least 1".to_string(),
            });
        }

        let page_size = overrides
            .page_size
            .or(file.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ListerError::InvalidSetting {
                name: "page_size",
                message: format!("must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"),
            });
        }

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ListerError::InvalidSetting {
                name: "timeout",
                message: "must be at least 1 second".to_string(),
            });
        }

        let utc_offset = overrides
            .utc_offset
            .or(file.utc_offset)
            .unwrap_or_else(|| DEFAULT_UTC_OFFSET.to_string());
        let utc_offset = parse_utc_offset(&utc_offset)?;

        Ok(ResolvedConfig {
            harbor_url: normalize_harbor_url(&url)?,
            username,
            password,
            output: Utf8PathBuf::from(output.trim()),
            insecure_ssl: overrides.insecure_ssl.or(file.insecure_ssl).unwrap_or(true),
            concurrency,
            page_size,
            timeout: Duration::from_secs(timeout_secs),
            utc_offset,
        })
    }
}

fn pick(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|value| !value.trim().is_empty())
        .or(fallback.filter(|value| !value.trim().is_empty()))
}

pub fn parse_utc_offset(value: &str) -> Result<FixedOffset, ListerError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(|| invalid_offset(value));
    }
    trimmed
        .parse::<FixedOffset>()
        .map_err(|_| invalid_offset(value))
}

fn invalid_offset(value: &str) -> ListerError {
    ListerError::InvalidSetting {
        name: "utc_offset",
        message: format!("expected +HH:MM, got {value}"),
    }
}

/// Produces `https://host[:port][/prefix]/api/v2.0` from whatever the user typed.
pub fn normalize_harbor_url(raw: &str) -> Result<String, ListerError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let host = if let Some(rest) = trimmed.strip_prefix("https://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        rest
    } else {
        trimmed
    };
    if host.is_empty() {
        return Err(ListerError::InvalidUrl(raw.to_string()));
    }

    let mut url = format!("https://{host}");
    if !url.ends_with(API_SUFFIX) {
        url.push_str(API_SUFFIX);
    }
    Ok(url)
}
