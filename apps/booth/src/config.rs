use std::{collections::HashMap, fs};

#[derive(Debug)]
pub struct Settings {
    pub server_url: String,
    pub database_url: String,
    pub session_ttl_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8000".into(),
            database_url: "sqlite://./data/booth.db".into(),
            session_ttl_minutes: 30,
        }
    }
}

/// Defaults, overridden by `booth.toml` in the working directory,
/// overridden by environment variables.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("booth.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("database_url") {
                settings.database_url = v.clone();
            }
            if let Some(v) = file_cfg.get("session_ttl_minutes") {
                if let Ok(parsed) = v.parse::<i64>() {
                    settings.session_ttl_minutes = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("BOOTH_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("BOOTH_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("BOOTH_SESSION_TTL_MINUTES") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.session_ttl_minutes = parsed;
        }
    }

    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_backend() {
        let settings = Settings::default();
        assert_eq!(settings.server_url, "http://127.0.0.1:8000");
        assert_eq!(settings.database_url, "sqlite://./data/booth.db");
        assert_eq!(settings.session_ttl_minutes, 30);
    }
}
