#![forbid(unsafe_code)]

//! Runtime configuration, layered as: explicit override > environment
//! variable > `.env` file > built-in default.

use anyhow::{Context, Result, anyhow};
use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
};

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_DB_PATH: &str = "sync.db";
pub const DEFAULT_OUTPUT_DIR: &str = "downloads";
pub const DEFAULT_SCAN_LIMIT: u32 = 25;
pub const DEFAULT_AUTO_FILTER: bool = true;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub default_scan_limit: u32,
    pub auto_filter: bool,
}

pub fn load_runtime_config() -> Result<RuntimeConfig> {
    resolve_runtime_config(RuntimeOverrides::default())
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub db_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub default_scan_limit: Option<u32>,
    pub auto_filter: Option<bool>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_runtime_config(overrides: RuntimeOverrides) -> Result<RuntimeConfig> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_runtime_config_with_overrides(&file_vars, env_var_string, overrides)
}

#[cfg(test)]
fn build_runtime_config(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<RuntimeConfig> {
    build_runtime_config_with_overrides(file_vars, env_lookup, RuntimeOverrides::default())
}

fn build_runtime_config_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: RuntimeOverrides,
) -> Result<RuntimeConfig> {
    let db_path = overrides
        .db_path
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("SYNC_DB_PATH", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let output_dir = overrides
        .output_dir
        .map(|path| path.to_string_lossy().into_owned())
        .or_else(|| lookup_value("SYNC_OUTPUT_DIR", file_vars, &env_lookup))
        .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string());
    let default_scan_limit = overrides
        .default_scan_limit
        .or_else(|| {
            lookup_value("SYNC_DEFAULT_SCAN_LIMIT", file_vars, &env_lookup)
                .and_then(|value| value.parse::<u32>().ok())
        })
        .unwrap_or(DEFAULT_SCAN_LIMIT);
    let auto_filter = overrides
        .auto_filter
        .or_else(|| {
            lookup_value("SYNC_AUTO_FILTER", file_vars, &env_lookup)
                .and_then(|value| parse_bool(&value))
        })
        .unwrap_or(DEFAULT_AUTO_FILTER);

    if default_scan_limit == 0 {
        return Err(anyhow!("SYNC_DEFAULT_SCAN_LIMIT must be greater than zero"));
    }

    Ok(RuntimeConfig {
        db_path: PathBuf::from(db_path),
        output_dir: PathBuf::from(output_dir),
        default_scan_limit,
        auto_filter,
    })
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_var_string(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn lookup_value(
    key: &str,
    file_vars: &HashMap<String, String>,
    env_lookup: &impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env_lookup(key).or_else(|| file_vars.get(key).cloned())
}

pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    if !path.exists() {
        return Ok(vars);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let line = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value_raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value_raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|value| value.strip_suffix('"'))
            .or_else(|| {
                value
                    .strip_prefix('\'')
                    .and_then(|value| value.strip_suffix('\''))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn runtime_from(contents: &str) -> RuntimeConfig {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_runtime_config(&vars, |_| None).unwrap()
    }

    #[test]
    fn defaults_apply_when_nothing_set() {
        let runtime = runtime_from("");
        assert_eq!(runtime.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(runtime.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(runtime.default_scan_limit, DEFAULT_SCAN_LIMIT);
        assert!(runtime.auto_filter);
    }

    #[test]
    fn reads_values_from_file() {
        let runtime = runtime_from(
            "SYNC_DB_PATH=\"/data/sync.db\"\nSYNC_DEFAULT_SCAN_LIMIT=\"10\"\nSYNC_AUTO_FILTER=\"false\"\n",
        );
        assert_eq!(runtime.db_path, PathBuf::from("/data/sync.db"));
        assert_eq!(runtime.default_scan_limit, 10);
        assert!(!runtime.auto_filter);
    }

    #[test]
    fn env_var_takes_precedence_over_file() {
        let vars = read_env_file(make_config("SYNC_DB_PATH=\"/file.db\"\n").path()).unwrap();
        let runtime = build_runtime_config(&vars, |key| {
            if key == "SYNC_DB_PATH" {
                Some("/env.db".to_string())
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(runtime.db_path, PathBuf::from("/env.db"));
    }

    #[test]
    fn explicit_override_wins_over_everything() {
        let vars = read_env_file(make_config("SYNC_DB_PATH=\"/file.db\"\n").path()).unwrap();
        let runtime = build_runtime_config_with_overrides(
            &vars,
            |_| Some("/env.db".to_string()),
            RuntimeOverrides {
                db_path: Some(PathBuf::from("/override.db")),
                ..RuntimeOverrides::default()
            },
        )
        .unwrap();
        assert_eq!(runtime.db_path, PathBuf::from("/override.db"));
    }

    #[test]
    fn invalid_scan_limit_falls_back_to_default() {
        let runtime = runtime_from("SYNC_DEFAULT_SCAN_LIMIT=\"not-a-number\"\n");
        assert_eq!(runtime.default_scan_limit, DEFAULT_SCAN_LIMIT);
    }

    #[test]
    fn zero_scan_limit_override_is_rejected() {
        let err = build_runtime_config_with_overrides(
            &HashMap::new(),
            |_| None,
            RuntimeOverrides {
                default_scan_limit: Some(0),
                ..RuntimeOverrides::default()
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
