use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Context as _, Result},
    schema::BotlineConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["botline.toml", "botline.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BotlineConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./botline.{toml,json}` (project-local)
/// 2. `~/.config/botline/botline.{toml,json}` (user-global)
///
/// Returns `BotlineConfig::default()` if no config file is found.
pub fn discover_and_load() -> BotlineConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    BotlineConfig::default()
}

/// Returns the user-global config directory (`~/.config/botline/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "botline").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    // Project-local
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    // User-global: ~/.config/botline/
    if let Some(dir) = config_dir() {
        for name in CONFIG_FILENAMES {
            let p = dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

fn parse_config(raw: &str, path: &Path) -> Result<BotlineConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).with_context(|| format!("parse {}", path.display())),
        "json" => serde_json::from_str(raw).with_context(|| format!("parse {}", path.display())),
        _ => Err(botline_common::Error::message(format!(
            "unsupported config format: .{ext}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toml_by_extension() {
        let cfg = parse_config(
            "[sessions]\nmax_session_age_days = 14\n",
            Path::new("botline.toml"),
        )
        .unwrap();
        assert_eq!(cfg.sessions.max_session_age_days, 14);
    }

    #[test]
    fn parses_json_by_extension() {
        let cfg = parse_config(
            r#"{"channels": {"api_poll_interval_secs": 30}}"#,
            Path::new("botline.json"),
        )
        .unwrap();
        assert_eq!(cfg.channels.api_poll_interval_secs, 30);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = parse_config("", Path::new("botline.ini")).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn parse_errors_carry_the_path() {
        let err = parse_config("not = [valid", Path::new("botline.toml")).unwrap_err();
        assert!(err.to_string().contains("botline.toml"));
    }
}
