//! Static settings record.
//!
//! The sidecar reads one YAML file at startup — `confsig.yml` in the working
//! directory unless overridden — and never re-reads it. Field names on disk
//! are camelCase:
//!
//! ```yaml
//! app: /usr/local/bin/prometheus
//! appConfigPath: /etc/prometheus/prometheus.yml
//! consulKey: prometheus/config
//! consulAddr: consul.service:8500
//! checkIntervalMinutes: 50
//! ```
//!
//! `consulAddr` may be omitted when the `CONSUL_ADDR` environment variable is
//! set.
//!
//! # API pattern
//!
//! - `load_at(path)` — explicit path; used in tests with `TempDir`
//! - `load_default()` — resolves `confsig.yml` in the current directory
//!
//! Tests must always use `load_at`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::SettingsError;

/// Environment variable consulted when the settings file omits `consulAddr`.
pub const STORE_ADDR_ENV: &str = "CONSUL_ADDR";

/// Default settings file name, resolved in the current working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "confsig.yml";

/// Periodic safety-net reconcile interval when the file does not set one.
const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(50 * 60);

// ---------------------------------------------------------------------------
// On-disk shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    app: Option<String>,
    app_config_path: PathBuf,
    consul_key: String,
    #[serde(default)]
    consul_addr: Option<String>,
    #[serde(default)]
    check_interval_minutes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved settings
// ---------------------------------------------------------------------------

/// Fully resolved sidecar settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Executable to supervise when the command line names none.
    pub app: Option<String>,
    /// Local configuration file the reconciler owns.
    pub app_config_path: PathBuf,
    /// Remote KV key holding the raw template text.
    pub consul_key: String,
    /// Store address (`host:port` or full URL), after env fallback.
    pub consul_addr: String,
    /// Periodic safety-net reconcile interval.
    pub check_interval: Duration,
}

impl Settings {
    /// Load and resolve settings from an explicit path.
    pub fn load_at(path: &Path) -> Result<Settings, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SettingsError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(err) => return Err(err.into()),
        };
        let file: SettingsFile =
            serde_yaml::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        resolve(file, path, std::env::var(STORE_ADDR_ENV).ok())
    }

    /// Load settings from `confsig.yml` in the current working directory.
    pub fn load_default() -> Result<Settings, SettingsError> {
        let path = std::env::current_dir()?.join(DEFAULT_SETTINGS_FILE);
        Settings::load_at(&path)
    }
}

fn resolve(
    file: SettingsFile,
    path: &Path,
    env_addr: Option<String>,
) -> Result<Settings, SettingsError> {
    if file.consul_key.trim().is_empty() {
        return Err(SettingsError::MissingKey {
            path: path.to_path_buf(),
        });
    }

    let consul_addr = file
        .consul_addr
        .filter(|addr| !addr.trim().is_empty())
        .or_else(|| env_addr.filter(|addr| !addr.trim().is_empty()))
        .ok_or(SettingsError::MissingStoreAddr {
            env: STORE_ADDR_ENV,
        })?;

    let check_interval = file
        .check_interval_minutes
        .map(|minutes| Duration::from_secs(minutes * 60))
        .unwrap_or(DEFAULT_CHECK_INTERVAL);

    Ok(Settings {
        app: file.app,
        app_config_path: file.app_config_path,
        consul_key: file.consul_key,
        consul_addr,
        check_interval,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_settings(dir: &TempDir, yaml: &str) -> PathBuf {
        let path = dir.path().join(DEFAULT_SETTINGS_FILE);
        std::fs::write(&path, yaml).expect("write settings");
        path
    }

    #[test]
    fn parses_camel_case_fields() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_settings(
            &dir,
            "app: /bin/prometheus\n\
             appConfigPath: /etc/prometheus/prometheus.yml\n\
             consulKey: prometheus/config\n\
             consulAddr: consul.service:8500\n\
             checkIntervalMinutes: 10\n",
        );

        let settings = Settings::load_at(&path).expect("load");
        assert_eq!(settings.app.as_deref(), Some("/bin/prometheus"));
        assert_eq!(
            settings.app_config_path,
            PathBuf::from("/etc/prometheus/prometheus.yml")
        );
        assert_eq!(settings.consul_key, "prometheus/config");
        assert_eq!(settings.consul_addr, "consul.service:8500");
        assert_eq!(settings.check_interval, Duration::from_secs(600));
    }

    #[test]
    fn check_interval_defaults_to_fifty_minutes() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_settings(
            &dir,
            "appConfigPath: /tmp/app.yml\nconsulKey: k\nconsulAddr: localhost:8500\n",
        );

        let settings = Settings::load_at(&path).expect("load");
        assert_eq!(settings.check_interval, Duration::from_secs(50 * 60));
        assert!(settings.app.is_none());
    }

    #[test]
    fn env_fallback_supplies_store_address() {
        let file = SettingsFile {
            app: None,
            app_config_path: PathBuf::from("/tmp/app.yml"),
            consul_key: "k".to_string(),
            consul_addr: None,
            check_interval_minutes: None,
        };

        let settings = resolve(file, Path::new("confsig.yml"), Some("10.0.0.2:8500".into()))
            .expect("resolve");
        assert_eq!(settings.consul_addr, "10.0.0.2:8500");
    }

    #[test]
    fn file_address_wins_over_env() {
        let file = SettingsFile {
            app: None,
            app_config_path: PathBuf::from("/tmp/app.yml"),
            consul_key: "k".to_string(),
            consul_addr: Some("from-file:8500".into()),
            check_interval_minutes: None,
        };

        let settings =
            resolve(file, Path::new("confsig.yml"), Some("from-env:8500".into())).expect("resolve");
        assert_eq!(settings.consul_addr, "from-file:8500");
    }

    #[test]
    fn missing_address_everywhere_is_an_error() {
        let file = SettingsFile {
            app: None,
            app_config_path: PathBuf::from("/tmp/app.yml"),
            consul_key: "k".to_string(),
            consul_addr: None,
            check_interval_minutes: None,
        };

        let err = resolve(file, Path::new("confsig.yml"), None).expect_err("must fail");
        assert!(matches!(err, SettingsError::MissingStoreAddr { .. }));
    }

    #[test]
    fn empty_key_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_settings(
            &dir,
            "appConfigPath: /tmp/app.yml\nconsulKey: \"\"\nconsulAddr: localhost:8500\n",
        );

        let err = Settings::load_at(&path).expect_err("must fail");
        assert!(matches!(err, SettingsError::MissingKey { .. }));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err =
            Settings::load_at(&dir.path().join("nope.yml")).expect_err("must fail");
        assert!(matches!(err, SettingsError::NotFound { .. }));
    }

    #[test]
    fn malformed_yaml_reports_parse_error_with_path() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_settings(&dir, "appConfigPath: [unclosed\n");

        let err = Settings::load_at(&path).expect_err("must fail");
        match err {
            SettingsError::Parse { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected Parse error, got {other:?}"),
        }
    }
}
