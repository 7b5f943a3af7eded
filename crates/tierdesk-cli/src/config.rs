// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_TIMEOUT: &str = "10s";
const DEFAULT_DEBOUNCE: &str = "500ms";
const MAX_DEBOUNCE: Duration = Duration::from_secs(10);
const BACKEND_KEY_ENV: &str = "TIERDESK_BACKEND_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub sheets: Sheets,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub auth: Auth,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            backend: Backend::default(),
            sheets: Sheets::default(),
            ui: Ui::default(),
            auth: Auth::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Backend {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<String>,
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sheets {
    pub spreadsheet_id: Option<String>,
    pub credentials_path: Option<String>,
    pub sheet_name: Option<String>,
    pub api_url: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub debounce: Option<String>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            debounce: Some(DEFAULT_DEBOUNCE.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Auth {
    pub passphrase_sha256: Option<String>,
}

/// Where the screens read and write rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendTarget {
    Local(PathBuf),
    Remote {
        url: String,
        api_key: String,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSettings {
    pub spreadsheet_id: String,
    pub credentials_path: PathBuf,
    pub sheet_name: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TIERDESK_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TIERDESK_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(tierdesk_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [backend], [sheets], [ui], and [auth]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.backend.db_path {
            tierdesk_db::validate_db_path(db_path)?;
        }

        if let Some(url) = &self.backend.url
            && url.trim().is_empty()
        {
            bail!(
                "backend.url in {} is empty; remove it to use the local database",
                path.display()
            );
        }

        for (key, value) in [
            ("backend.timeout", &self.backend.timeout),
            ("sheets.timeout", &self.sheets.timeout),
            ("ui.debounce", &self.ui.debounce),
        ] {
            if let Some(raw) = value {
                let parsed = parse_duration(raw)?;
                if parsed <= Duration::ZERO {
                    bail!(
                        "{key} in {} must be positive, got {raw}",
                        path.display()
                    );
                }
            }
        }
        if self.debounce()? > MAX_DEBOUNCE {
            bail!(
                "ui.debounce in {} must be at most 10s",
                path.display()
            );
        }

        if let Some(digest) = &self.auth.passphrase_sha256 {
            let digest = digest.trim();
            if digest.len() != 64 || !digest.chars().all(|ch| ch.is_ascii_hexdigit()) {
                bail!(
                    "auth.passphrase_sha256 in {} must be a 64 character hex SHA-256 digest",
                    path.display()
                );
            }
        }

        match (&self.sheets.spreadsheet_id, &self.sheets.credentials_path) {
            (Some(_), None) => bail!(
                "sheets.spreadsheet_id is set in {} but sheets.credentials_path is missing",
                path.display()
            ),
            (None, Some(_)) => bail!(
                "sheets.credentials_path is set in {} but sheets.spreadsheet_id is missing",
                path.display()
            ),
            _ => {}
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.backend.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => tierdesk_db::default_db_path(),
        }
    }

    pub fn backend_timeout(&self) -> Result<Duration> {
        parse_duration(self.backend.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    /// A hosted backend when `backend.url` is set, otherwise the local database.
    pub fn backend_target(&self) -> Result<BackendTarget> {
        let Some(url) = &self.backend.url else {
            return Ok(BackendTarget::Local(self.db_path()?));
        };

        let from_env = env::var(BACKEND_KEY_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty());
        let api_key = from_env
            .or_else(|| self.backend.api_key.clone())
            .ok_or_else(|| {
                anyhow!("backend.url is set but no API key was found; set {BACKEND_KEY_ENV} or backend.api_key")
            })?;

        Ok(BackendTarget::Remote {
            url: url.trim().trim_end_matches('/').to_owned(),
            api_key,
            timeout: self.backend_timeout()?,
        })
    }

    pub fn sheets(&self) -> Result<Option<SheetSettings>> {
        let (Some(spreadsheet_id), Some(credentials_path)) =
            (&self.sheets.spreadsheet_id, &self.sheets.credentials_path)
        else {
            return Ok(None);
        };
        Ok(Some(SheetSettings {
            spreadsheet_id: spreadsheet_id.trim().to_owned(),
            credentials_path: PathBuf::from(credentials_path),
            sheet_name: self
                .sheets
                .sheet_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
            api_url: self
                .sheets
                .api_url
                .as_deref()
                .unwrap_or(tierdesk_sheets::DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_owned(),
            timeout: parse_duration(self.sheets.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))?,
        }))
    }

    pub fn debounce(&self) -> Result<Duration> {
        parse_duration(self.ui.debounce.as_deref().unwrap_or(DEFAULT_DEBOUNCE))
    }

    pub fn passphrase_sha256(&self) -> Option<&str> {
        self.auth
            .passphrase_sha256
            .as_deref()
            .map(str::trim)
            .filter(|digest| !digest.is_empty())
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tierdesk config\n# Place this file at: {}\n\nversion = 1\n\n[backend]\n# Leave url unset to use a local SQLite database.\n# url = \"https://project.example.co/rest/v1\"\n# api_key = \"...\"            # or set {BACKEND_KEY_ENV}\ntimeout = \"{DEFAULT_TIMEOUT}\"\n# db_path = \"/absolute/path/to/tierdesk.db\"\n\n[sheets]\n# Mirror CRM edits to a spreadsheet and enable sync.\n# spreadsheet_id = \"1AbC...\"\n# credentials_path = \"/absolute/path/to/service-account.json\"\n# sheet_name = \"CRM Data\"\ntimeout = \"{DEFAULT_TIMEOUT}\"\n\n[ui]\ndebounce = \"{DEFAULT_DEBOUNCE}\"\n\n[auth]\n# Require a passphrase at startup. Generate with: printf %s 'secret' | sha256sum\n# passphrase_sha256 = \"...\"\n",
            path.display(),
        )
    }
}

pub fn parse_duration(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}

#[cfg(test)]
mod tests {
    use super::{BackendTarget, Config, parse_duration};
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    const DIGEST: &str = "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b";

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_local_defaults() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.debounce()?, Duration::from_millis(500));
        assert!(config.sheets()?.is_none());
        assert!(config.passphrase_sha256().is_none());
        assert!(matches!(config.backend_target()?, BackendTarget::Local(_)));
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[backend]\nurl = \"http://localhost\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[backend], [sheets], [ui], and [auth]"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 3\n")?;
        let error = Config::load(&path).expect_err("v3 config should fail");
        assert!(error.to_string().contains("unsupported config version 3"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config(&format!(
            "version = 1\n[backend]\nurl = \"https://db.example.co/rest/v1/\"\napi_key = \"from-file\"\ntimeout = \"3s\"\n[sheets]\nspreadsheet_id = \" sheet-1 \"\ncredentials_path = \"/etc/tierdesk/sa.json\"\nsheet_name = \"CRM Data\"\n[ui]\ndebounce = \"250ms\"\n[auth]\npassphrase_sha256 = \"{DIGEST}\"\n"
        ))?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("TIERDESK_BACKEND_KEY");
        }

        let config = Config::load(&path)?;
        assert_eq!(
            config.backend_target()?,
            BackendTarget::Remote {
                url: "https://db.example.co/rest/v1".to_owned(),
                api_key: "from-file".to_owned(),
                timeout: Duration::from_secs(3),
            }
        );
        let sheets = config.sheets()?.expect("sheets configured");
        assert_eq!(sheets.spreadsheet_id, "sheet-1");
        assert_eq!(sheets.sheet_name.as_deref(), Some("CRM Data"));
        assert_eq!(sheets.api_url, tierdesk_sheets::DEFAULT_API_URL);
        assert_eq!(sheets.timeout, Duration::from_secs(10));
        assert_eq!(config.debounce()?, Duration::from_millis(250));
        assert_eq!(config.passphrase_sha256(), Some(DIGEST));
        Ok(())
    }

    #[test]
    fn backend_key_env_overrides_config() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config(
            "version = 1\n[backend]\nurl = \"https://db.example.co/rest/v1\"\napi_key = \"from-file\"\n",
        )?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TIERDESK_BACKEND_KEY", "from-env");
        }
        let target = Config::load(&path)?.backend_target();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TIERDESK_BACKEND_KEY");
        }
        let BackendTarget::Remote { api_key, .. } = target? else {
            panic!("expected remote backend");
        };
        assert_eq!(api_key, "from-env");
        Ok(())
    }

    #[test]
    fn remote_backend_without_key_is_rejected() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[backend]\nurl = \"https://db.example.co/rest/v1\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("TIERDESK_BACKEND_KEY");
        }
        let error = Config::load(&path)?
            .backend_target()
            .expect_err("missing key should fail");
        assert!(error.to_string().contains("TIERDESK_BACKEND_KEY"));
        Ok(())
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TIERDESK_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path()?;
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TIERDESK_CONFIG_PATH");
        }
        assert_eq!(resolved, override_path);
        Ok(())
    }

    #[test]
    fn db_path_prefers_backend_config_over_env_override() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[backend]\ndb_path = \"/explicit/from-config.db\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TIERDESK_DB_PATH", "/from/env.db");
        }
        let config = Config::load(&path)?;
        let resolved = config.db_path();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TIERDESK_DB_PATH");
        }
        assert_eq!(resolved?, PathBuf::from("/explicit/from-config.db"));
        Ok(())
    }

    #[test]
    fn db_path_uses_env_override_when_unset() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) = write_config("version = 1\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TIERDESK_DB_PATH", "/from/env-only.db");
        }
        let resolved = Config::load(&path)?.db_path();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TIERDESK_DB_PATH");
        }
        assert_eq!(resolved?, PathBuf::from("/from/env-only.db"));
        Ok(())
    }

    #[test]
    fn db_path_rejects_uri_style_value() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[backend]\ndb_path = \"https://evil.example/t.db\"\n")?;
        let error = Config::load(&path).expect_err("URI db_path should fail validation");
        assert!(error.to_string().contains("looks like a URI"));
        Ok(())
    }

    #[test]
    fn half_configured_sheets_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[sheets]\nspreadsheet_id = \"abc\"\n")?;
        let error = Config::load(&path).expect_err("missing credentials should fail");
        assert!(error.to_string().contains("sheets.credentials_path is missing"));
        Ok(())
    }

    #[test]
    fn malformed_passphrase_digest_is_rejected() -> Result<()> {
        let (_temp, path) =
            write_config("version = 1\n[auth]\npassphrase_sha256 = \"not-a-digest\"\n")?;
        let error = Config::load(&path).expect_err("bad digest should fail");
        assert!(error.to_string().contains("64 character hex"));
        Ok(())
    }

    #[test]
    fn durations_parse_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("5s")?, Duration::from_secs(5));
        assert_eq!(parse_duration(" 2m ")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let error = parse_duration("oops").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid duration"));
    }

    #[test]
    fn non_positive_and_oversized_durations_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[backend]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("must be positive"));

        let (_temp, path) = write_config("version = 1\n[ui]\ndebounce = \"1m\"\n")?;
        let error = Config::load(&path).expect_err("huge debounce should fail");
        assert!(error.to_string().contains("at most 10s"));
        Ok(())
    }

    #[test]
    fn example_config_parses_and_names_every_section() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        for section in ["version = 1", "[backend]", "[sheets]", "[ui]", "[auth]"] {
            assert!(example.contains(section), "missing {section}");
        }
        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert!(config.sheets()?.is_none());
        Ok(())
    }
}
