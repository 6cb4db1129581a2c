use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::backend::SupabaseEndpoint;
use crate::feed::gesture::{GestureConfig, DEFAULT_DOUBLE_TAP_WINDOW_MS, DEFAULT_LONG_PRESS_MS};

pub const CONFIG_FILE: &str = "artisthub_config.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// `artisthub_config.json` in the data dir. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub disable_network: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub double_tap_window_ms: Option<u64>,
    pub long_press_ms: Option<u64>,
}

impl AppConfig {
    pub fn network_enabled(&self) -> bool {
        self.disable_network != Some(true)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            double_tap_window_ms: self
                .double_tap_window_ms
                .unwrap_or(DEFAULT_DOUBLE_TAP_WINDOW_MS),
            long_press_ms: self.long_press_ms.unwrap_or(DEFAULT_LONG_PRESS_MS),
        }
    }

    /// `None` when networking is disabled or the project is not configured.
    pub fn endpoint(&self) -> Option<SupabaseEndpoint> {
        if !self.network_enabled() {
            return None;
        }
        let url = non_empty(self.supabase_url.as_deref())?;
        let anon_key = non_empty(self.supabase_anon_key.as_deref())?;
        Some(SupabaseEndpoint {
            url: url.to_string(),
            anon_key: anon_key.to_string(),
        })
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("ARTISTHUB_SUPABASE_URL").filter(|v| !v.trim().is_empty()) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = var("ARTISTHUB_SUPABASE_ANON_KEY").filter(|v| !v.trim().is_empty()) {
            self.supabase_anon_key = Some(key);
        }
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn read_config_file(path: &Path) -> anyhow::Result<Option<AppConfig>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let cfg = serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let mut cfg = match read_config_file(&path) {
        Ok(Some(cfg)) => cfg,
        Ok(None) => AppConfig::default(),
        Err(e) => {
            tracing::warn!(err = format!("{e:#}"), "config: ignoring unreadable config");
            AppConfig::default()
        }
    };
    cfg.apply_env_overrides(|k| std::env::var(k).ok());
    tracing::info!(
        configured = cfg.endpoint().is_some(),
        network = cfg.network_enabled(),
        "config loaded"
    );
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) {
        std::fs::write(dir.join(CONFIG_FILE), body).unwrap();
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = read_config_file(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, None);

        let cfg = AppConfig::default();
        assert!(cfg.network_enabled());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.gesture_config(), GestureConfig::default());
        assert_eq!(cfg.endpoint(), None);
    }

    #[test]
    fn parses_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            r#"{
                "supabase_url": "https://abc.supabase.co",
                "supabase_anon_key": "anon",
                "request_timeout_secs": 4,
                "double_tap_window_ms": 250,
                "long_press_ms": 650
            }"#,
        );
        let cfg = read_config_file(&dir.path().join(CONFIG_FILE))
            .unwrap()
            .unwrap();
        assert_eq!(
            cfg.endpoint(),
            Some(SupabaseEndpoint {
                url: "https://abc.supabase.co".into(),
                anon_key: "anon".into(),
            })
        );
        assert_eq!(cfg.request_timeout(), Duration::from_secs(4));
        assert_eq!(
            cfg.gesture_config(),
            GestureConfig {
                double_tap_window_ms: 250,
                long_press_ms: 650,
            }
        );
    }

    #[test]
    fn disable_network_hides_endpoint() {
        let cfg = AppConfig {
            supabase_url: Some("https://abc.supabase.co".into()),
            supabase_anon_key: Some("anon".into()),
            disable_network: Some(true),
            ..AppConfig::default()
        };
        assert!(!cfg.network_enabled());
        assert_eq!(cfg.endpoint(), None);
    }

    #[test]
    fn blank_values_are_unconfigured() {
        let cfg = AppConfig {
            supabase_url: Some("  ".into()),
            supabase_anon_key: Some("anon".into()),
            ..AppConfig::default()
        };
        assert_eq!(cfg.endpoint(), None);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = AppConfig {
            supabase_url: Some("https://file.supabase.co".into()),
            supabase_anon_key: Some("file-key".into()),
            ..AppConfig::default()
        };
        cfg.apply_env_overrides(|k| match k {
            "ARTISTHUB_SUPABASE_URL" => Some("https://env.supabase.co".into()),
            "ARTISTHUB_SUPABASE_ANON_KEY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.supabase_url.as_deref(), Some("https://env.supabase.co"));
        assert_eq!(cfg.supabase_anon_key.as_deref(), Some("file-key"));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "{ nope");
        assert!(read_config_file(&dir.path().join(CONFIG_FILE)).is_err());
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.double_tap_window_ms, None);
    }
}
