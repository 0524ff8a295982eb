use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub seed_count: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            seed_count: 20,
        }
    }
}

/// Defaults, overlaid by `filetrack.toml` when present, overlaid by
/// environment variables (both the bare and the `APP__`-prefixed forms).
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("filetrack.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply_file_values(&mut settings, &file_cfg);
        }
    }

    if let Ok(v) = std::env::var("SERVER_BIND") {
        settings.bind_addr = v;
    }
    if let Ok(v) = std::env::var("APP__BIND_ADDR") {
        settings.bind_addr = v;
    }

    if let Ok(v) = std::env::var("SEED_COUNT") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.seed_count = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__SEED_COUNT") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.seed_count = parsed;
        }
    }

    settings
}

fn apply_file_values(settings: &mut Settings, file_cfg: &HashMap<String, String>) {
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.bind_addr = v.clone();
    }
    if let Some(v) = file_cfg.get("seed_count") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.seed_count = parsed;
        }
    }
}
