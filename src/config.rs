// Configuration module: resolves where the Open WebUI instance lives, which
// key to authenticate with, which model to talk to by default and which
// local files are acceptable for upload.
//
// Values come from the process environment. `load_env_files` lets the
// binary seed the environment from `.env` files before resolving.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub const API_KEY_ENV: &str = "OPENWEBUI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENWEBUI_BASE_URL";
pub const DEFAULT_MODEL_ENV: &str = "OPENWEBUI_DEFAULT_MODEL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";
pub const DEFAULT_MODEL: &str = "gemma3:1b";

/// 100 MiB.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

pub const ALLOWED_FILE_TYPES: &[&str] = &[
    ".txt", ".pdf", ".docx", ".doc", ".md", ".json", ".csv", ".xml", ".html", ".htm", ".rtf",
    ".odt", ".epub", ".mobi",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key is missing: pass --api-key or set {}", API_KEY_ENV)]
    MissingApiKey,
    #[error("API key contains characters that cannot be sent in a header")]
    InvalidApiKey,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub api_key: String,
    pub default_model: String,
    pub max_file_size: u64,
    pub allowed_extensions: Vec<String>,
}

impl Config {
    /// Resolve the configuration. Explicit overrides (typically CLI flags)
    /// win over the environment. Fails when no API key is available; there
    /// is no built-in fallback key.
    pub fn resolve(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(api_key_from_env)
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Config {
            base_url: normalize_base_url(&base_url.unwrap_or_else(base_url_from_env)),
            api_key: api_key.trim().to_string(),
            default_model: model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(default_model_from_env),
            max_file_size: MAX_FILE_SIZE,
            allowed_extensions: ALLOWED_FILE_TYPES.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn is_file_type_allowed(&self, path: impl AsRef<Path>) -> bool {
        match extension_of(path.as_ref()) {
            Some(ext) => self.allowed_extensions.iter().any(|a| *a == ext),
            None => false,
        }
    }

    pub fn is_file_size_valid(&self, path: impl AsRef<Path>) -> bool {
        file_size(path) <= self.max_file_size
    }
}

pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
}

pub fn base_url_from_env() -> String {
    std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.into())
}

pub fn default_model_from_env() -> String {
    std::env::var(DEFAULT_MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.into())
}

/// Strip trailing slashes so paths can be appended with a leading `/`.
pub fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Check a path against the default allow-list (case-insensitive).
pub fn is_file_type_allowed(path: impl AsRef<Path>) -> bool {
    extension_of(path.as_ref())
        .map(|ext| ALLOWED_FILE_TYPES.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Size of the file in bytes, or 0 when it cannot be read.
pub fn file_size(path: impl AsRef<Path>) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

pub fn is_file_size_valid(path: impl AsRef<Path>) -> bool {
    file_size(path) <= MAX_FILE_SIZE
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
}

/// Seed the process environment from `.env` in the working directory and
/// from `<config dir>/owui-chat/config.env`. Variables that are already set
/// are left alone. Returns the files that were actually loaded.
pub fn load_env_files() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(path) = dotenvy::dotenv() {
        loaded.push(path);
    }
    if let Some(path) = user_env_file() {
        if path.is_file() && dotenvy::from_path(&path).is_ok() {
            loaded.push(path);
        }
    }
    loaded
}

/// Location of the per-user env file.
pub fn user_env_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("owui-chat").join("config.env"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn trailing_slashes_are_stripped_idempotently() {
        assert_eq!(normalize_base_url("http://host:8080/"), "http://host:8080");
        assert_eq!(normalize_base_url("http://host:8080"), "http://host:8080");
        assert_eq!(normalize_base_url("http://host:8080//"), "http://host:8080");
        for url in ["http://host/", "http://host//", "http://host"] {
            let once = normalize_base_url(url);
            assert_eq!(normalize_base_url(&once), once);
        }
    }

    #[test]
    fn file_type_allow_list_is_case_insensitive() {
        assert!(is_file_type_allowed("doc.pdf"));
        assert!(is_file_type_allowed("notes/README.MD"));
        assert!(!is_file_type_allowed("doc.exe"));
        assert!(!is_file_type_allowed("Makefile"));
    }

    #[test]
    fn missing_file_counts_as_valid_size() {
        assert_eq!(file_size("/definitely/not/here.txt"), 0);
        assert!(is_file_size_valid("/definitely/not/here.txt"));
    }

    #[test]
    fn size_limit_is_applied() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 32]).unwrap();
        let cfg = Config {
            base_url: "http://x".into(),
            api_key: "k".into(),
            default_model: "m".into(),
            max_file_size: 16,
            allowed_extensions: vec![".txt".into()],
        };
        assert!(!cfg.is_file_size_valid(file.path()));
        assert!(is_file_size_valid(file.path()));
    }

    #[test]
    fn explicit_overrides_win() {
        let cfg = Config::resolve(
            Some("http://example.org/".into()),
            Some("  sk-test ".into()),
            Some("llama3".into()),
        )
        .unwrap();
        assert_eq!(cfg.base_url, "http://example.org");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.default_model, "llama3");
        assert!(cfg.is_file_type_allowed("a.csv"));
    }

    #[test]
    #[serial]
    fn environment_fills_in_missing_overrides() {
        std::env::set_var(API_KEY_ENV, "sk-env");
        std::env::set_var(BASE_URL_ENV, "http://env-host:3000//");
        std::env::set_var(DEFAULT_MODEL_ENV, "llama3:8b");
        let cfg = Config::resolve(None, None, None).unwrap();
        assert_eq!(cfg.api_key, "sk-env");
        assert_eq!(cfg.base_url, "http://env-host:3000");
        assert_eq!(cfg.default_model, "llama3:8b");

        // A blank flag falls back to the environment.
        let cfg = Config::resolve(None, Some("   ".into()), Some(" ".into())).unwrap();
        assert_eq!(cfg.api_key, "sk-env");
        assert_eq!(cfg.default_model, "llama3:8b");

        std::env::set_var(API_KEY_ENV, "  ");
        assert_eq!(api_key_from_env(), None);
        assert_eq!(
            Config::resolve(None, None, None).unwrap_err(),
            ConfigError::MissingApiKey
        );

        std::env::remove_var(API_KEY_ENV);
        std::env::remove_var(BASE_URL_ENV);
        std::env::remove_var(DEFAULT_MODEL_ENV);
        assert_eq!(base_url_from_env(), DEFAULT_BASE_URL);
        assert_eq!(default_model_from_env(), DEFAULT_MODEL);
        assert_eq!(
            Config::resolve(None, None, None).unwrap_err(),
            ConfigError::MissingApiKey
        );
        assert_eq!(
            Config::resolve(None, Some("".into()), None).unwrap_err(),
            ConfigError::MissingApiKey
        );
    }
}
