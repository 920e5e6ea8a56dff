use anyhow::{Context, Result, bail};
use std::{env, fs, path::Path, time::Duration};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/tubedesk-env";
pub const DEFAULT_TUBEDESK_PORT: u16 = 8080;
pub const DEFAULT_TUBEDESK_HOST: &str = "127.0.0.1";
pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com";
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Keys recognised both in the env file and as process environment
/// variables. The process environment wins.
const KNOWN_KEYS: [&str; 8] = [
    "API_BASE_URL",
    "UPLOAD_BASE_URL",
    "ACCESS_TOKEN",
    "OAUTH_CLIENT_ID",
    "OAUTH_REDIRECT_URI",
    "TUBEDESK_HOST",
    "TUBEDESK_PORT",
    "REQUEST_TIMEOUT_SECS",
];

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub api_base_url: Option<String>,
    pub upload_base_url: Option<String>,
    pub access_token: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_redirect_uri: Option<String>,
    pub tubedesk_host: Option<String>,
    pub tubedesk_port: Option<u16>,
    pub request_timeout_secs: Option<u64>,
}

/// Fully resolved settings handed to the server and the platform client.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub api_base_url: String,
    pub upload_base_url: String,
    pub access_token: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_redirect_uri: Option<String>,
    pub request_timeout: Duration,
}

impl EnvConfig {
    fn apply(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        let value = value.trim().trim_matches('"');
        let text = (!value.is_empty()).then(|| value.to_string());
        match key {
            "API_BASE_URL" => self.api_base_url = text.map(trim_slash),
            "UPLOAD_BASE_URL" => self.upload_base_url = text.map(trim_slash),
            "ACCESS_TOKEN" => self.access_token = text,
            "OAUTH_CLIENT_ID" => self.oauth_client_id = text,
            "OAUTH_REDIRECT_URI" => self.oauth_redirect_uri = text,
            "TUBEDESK_HOST" => {
                if text.is_some() {
                    self.tubedesk_host = text;
                }
            }
            "TUBEDESK_PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing TUBEDESK_PORT from {origin}"))?;
                self.tubedesk_port = Some(port);
            }
            "REQUEST_TIMEOUT_SECS" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Parsing REQUEST_TIMEOUT_SECS from {origin}"))?;
                if secs == 0 {
                    bail!("REQUEST_TIMEOUT_SECS in {origin} must be greater than zero");
                }
                self.request_timeout_secs = Some(secs);
            }
            _ => {}
        }
        Ok(())
    }
}

fn trim_slash(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            cfg.apply(key.trim(), value_raw, &origin)?;
        }
    }
    Ok(Some(cfg))
}

/// Layers variables from `lookup` over `cfg`.
pub fn apply_overrides<F>(mut cfg: EnvConfig, lookup: F) -> Result<EnvConfig>
where
    F: Fn(&str) -> Option<String>,
{
    for key in KNOWN_KEYS {
        if let Some(value) = lookup(key) {
            cfg.apply(key, &value, "the environment")?;
        }
    }
    Ok(cfg)
}

/// Missing config files are fine: every setting has a default or is
/// optional, and the environment can supply the rest.
pub fn load_settings_from(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let cfg = read_env_config(path)?.unwrap_or_default();
    let cfg = apply_overrides(cfg, |key| env::var(key).ok())?;
    Ok(resolve(cfg))
}

pub fn resolve(cfg: EnvConfig) -> Settings {
    Settings {
        host: cfg
            .tubedesk_host
            .unwrap_or_else(|| DEFAULT_TUBEDESK_HOST.to_string()),
        port: cfg.tubedesk_port.unwrap_or(DEFAULT_TUBEDESK_PORT),
        api_base_url: cfg
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
        upload_base_url: cfg
            .upload_base_url
            .unwrap_or_else(|| DEFAULT_UPLOAD_BASE_URL.to_string()),
        access_token: cfg.access_token,
        oauth_client_id: cfg.oauth_client_id,
        oauth_redirect_uri: cfg.oauth_redirect_uri,
        request_timeout: Duration::from_secs(
            cfg.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        ),
    }
}
