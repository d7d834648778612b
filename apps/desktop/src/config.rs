use std::{collections::HashMap, fs, path::Path};

#[derive(Debug, Clone)]
pub struct Settings {
    pub daemon_url: String,
    pub log_filter: String,
    pub connect_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daemon_url: "ws://127.0.0.1:55400".into(),
            log_filter: "info".into(),
            connect_attempts: 5,
        }
    }
}

/// Defaults, then an optional `desktop.toml`, then env overrides.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new("desktop.toml"));
    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("daemon_url") {
                settings.daemon_url = v.clone();
            }
            if let Some(v) = file_cfg.get("log_filter") {
                settings.log_filter = v.clone();
            }
            if let Some(v) = file_cfg.get("connect_attempts") {
                if let Ok(parsed) = v.parse::<u32>() {
                    settings.connect_attempts = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("DAEMON_URL") {
        settings.daemon_url = v;
    }
    if let Ok(v) = std::env::var("APP__DAEMON_URL") {
        settings.daemon_url = v;
    }

    if let Ok(v) = std::env::var("APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    if let Ok(v) = std::env::var("APP__CONNECT_ATTEMPTS") {
        if let Ok(parsed) = v.parse::<u32>() {
            settings.connect_attempts = parsed;
        }
    }

    settings.daemon_url = normalize_daemon_url(&settings.daemon_url);
    settings
}

/// Accepts bare `host:port` values and upgrades them to `ws://` URLs;
/// anything with an explicit scheme passes through untouched.
pub fn normalize_daemon_url(raw: &str) -> String {
    let raw = raw.trim();

    if raw.is_empty() {
        return Settings::default().daemon_url;
    }

    if raw.contains("://") {
        return raw.to_string();
    }

    format!("ws://{raw}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_gets_ws_scheme() {
        assert_eq!(
            normalize_daemon_url("127.0.0.1:55400"),
            "ws://127.0.0.1:55400"
        );
    }

    #[test]
    fn explicit_scheme_passes_through() {
        assert_eq!(
            normalize_daemon_url("wss://daemon.example:55400"),
            "wss://daemon.example:55400"
        );
    }

    #[test]
    fn empty_url_falls_back_to_default() {
        assert_eq!(normalize_daemon_url("  "), Settings::default().daemon_url);
    }
}
