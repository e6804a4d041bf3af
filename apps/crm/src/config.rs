use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use client_core::TransportConfig;

pub const SETTINGS_FILE: &str = "crm.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub token_file: PathBuf,
    pub request_timeout_secs: u64,
    pub import_timeout_secs: u64,
    pub page_size: u32,
    pub poll_interval_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".into(),
            token_file: default_token_file(),
            request_timeout_secs: 30,
            import_timeout_secs: 600,
            page_size: 10,
            poll_interval_ms: 2000,
        }
    }
}

impl Settings {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::new(self.api_url.clone())
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_import_timeout(Duration::from_secs(self.import_timeout_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_token_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crm-dashboard")
        .join("storage.json")
}

/// Defaults, then `crm.toml` in the working directory, then environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(SETTINGS_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

/// Flat `key = value` pairs; an unparseable file leaves `settings` untouched.
fn apply_file(settings: &mut Settings, raw: &str) {
    let Ok(table) = toml::from_str::<toml::Table>(raw) else {
        return;
    };
    let file_cfg: HashMap<String, String> = table
        .into_iter()
        .map(|(key, value)| match value {
            toml::Value::String(s) => (key, s),
            other => (key, other.to_string()),
        })
        .collect();

    if let Some(v) = file_cfg.get("api_url") {
        settings.api_url = v.clone();
    }
    if let Some(v) = file_cfg.get("token_file") {
        settings.token_file = PathBuf::from(v);
    }
    set_parsed(&mut settings.request_timeout_secs, file_cfg.get("request_timeout_secs"));
    set_parsed(&mut settings.import_timeout_secs, file_cfg.get("import_timeout_secs"));
    set_parsed(&mut settings.page_size, file_cfg.get("page_size"));
    set_parsed(&mut settings.poll_interval_ms, file_cfg.get("poll_interval_ms"));
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CRM_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = var("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = var("CRM_TOKEN_FILE") {
        settings.token_file = PathBuf::from(v);
    }
    if let Some(v) = var("APP__TOKEN_FILE") {
        settings.token_file = PathBuf::from(v);
    }

    set_parsed(&mut settings.request_timeout_secs, var("APP__REQUEST_TIMEOUT_SECS").as_ref());
    set_parsed(&mut settings.import_timeout_secs, var("APP__IMPORT_TIMEOUT_SECS").as_ref());
    set_parsed(&mut settings.page_size, var("APP__PAGE_SIZE").as_ref());
    set_parsed(&mut settings.poll_interval_ms, var("APP__POLL_INTERVAL_MS").as_ref());
}

fn set_parsed<T: std::str::FromStr>(target: &mut T, raw: Option<&String>) {
    if let Some(parsed) = raw.and_then(|v| v.trim().parse::<T>().ok()) {
        *target = parsed;
    }
}
