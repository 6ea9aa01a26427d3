//! Session defaults loaded from a config file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqnorm::Session;
use reqnorm::timeout::TimeoutConfig;

/// `key = value` file configuration for session defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Replaces the default `User-Agent`.
    pub user_agent: Option<String>,
    /// Total timeout in seconds.
    pub timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    /// Retries for retryable statuses (0..=10).
    pub retries: Option<u32>,
    /// `false` disables TLS verification.
    pub verify: Option<bool>,
    /// CA bundle used instead of the system trust store.
    pub ca_bundle: Option<PathBuf>,
    pub proxy_http: Option<String>,
    pub proxy_https: Option<String>,
}

impl FileConfig {
    /// Validates config values against the CLI's ranges.
    pub fn validate(&self) -> Result<()> {
        validate_timeout_secs("timeout_secs", self.timeout_secs)?;
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;

        if let Some(retries) = self.retries
            && retries > 10
        {
            bail!("Invalid config value for `retries`: {retries}. Expected range: 0..=10");
        }
        if self.verify == Some(false) && self.ca_bundle.is_some() {
            bail!("Invalid config: `ca_bundle` is set but `verify = false` disables verification");
        }
        if let Some(user_agent) = &self.user_agent
            && user_agent.trim().is_empty()
        {
            bail!("Invalid config value for `user_agent`: must not be empty");
        }
        Ok(())
    }

    /// Applies the configured defaults to `session`.
    pub fn apply_to(&self, session: &mut Session) -> Result<()> {
        if let Some(user_agent) = &self.user_agent {
            session.headers_mut().insert("User-Agent", user_agent.as_str());
        }

        if self.timeout_secs.is_some()
            || self.connect_timeout_secs.is_some()
            || self.read_timeout_secs.is_some()
        {
            let config = TimeoutConfig {
                connect: self.connect_timeout_secs.map(Duration::from_secs),
                read: self.read_timeout_secs.map(Duration::from_secs),
                total: self.timeout_secs.map(Duration::from_secs),
            };
            session
                .set_timeout(config)
                .context("Invalid timeout in config")?;
        }

        if let Some(retries) = self.retries {
            session
                .set_retries(retries)
                .context("Invalid `retries` in config")?;
        }

        if let Some(bundle) = &self.ca_bundle {
            session
                .set_verify(bundle.clone())
                .context("Invalid `ca_bundle` in config")?;
        } else if let Some(verify) = self.verify {
            session
                .set_verify(verify)
                .context("Invalid `verify` in config")?;
        }

        let proxies: Vec<(&str, &str)> = [("http", &self.proxy_http), ("https", &self.proxy_https)]
            .into_iter()
            .filter_map(|(scheme, url)| url.as_deref().map(|url| (scheme, url)))
            .collect();
        if !proxies.is_empty() {
            session
                .set_proxies(proxies)
                .context("Invalid proxy in config")?;
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/reqnorm/config.toml`
/// 2. `$HOME/.config/reqnorm/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home).join("reqnorm").join("config.toml"));
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("reqnorm")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from an explicit path, or from the default path if present.
///
/// An explicit path must exist; a missing default file yields `None`.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let line_number = line_index + 1;
        let invalid = || format!("Invalid `{key}` value on line {line_number}");

        match key {
            "user_agent" => cfg.user_agent = Some(parse_string_literal(value).with_context(invalid)?),
            "timeout_secs" => cfg.timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?),
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "retries" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("retries out of range for u32"))
                    .with_context(invalid)?;
                cfg.retries = Some(n);
            }
            "verify" => cfg.verify = Some(parse_boolean(value).with_context(invalid)?),
            "ca_bundle" => {
                cfg.ca_bundle = Some(PathBuf::from(parse_string_literal(value).with_context(invalid)?));
            }
            "proxy_http" => cfg.proxy_http = Some(parse_string_literal(value).with_context(invalid)?),
            "proxy_https" => cfg.proxy_https = Some(parse_string_literal(value).with_context(invalid)?),
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_number}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let Some(inner) = raw_value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        bail!("Expected double-quoted string");
    };
    Ok(inner.to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use reqnorm::{RequestParams, TrustAnchor};

    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
timeout_secs = 20
user_agent = "probe/1.0"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.timeout_secs, Some(20));
        assert_eq!(cfg.user_agent.as_deref(), Some("probe/1.0"));
        assert!(cfg.retries.is_none());
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
retries = 2 # transient failures only
proxy_https = "http://proxy#1.local:3128" # hash inside quotes is kept
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.retries, Some(2));
        assert_eq!(cfg.proxy_https.as_deref(), Some("http://proxy#1.local:3128"));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_timeout() {
        let err = parse_config_str("connect_timeout_secs = 0").expect_err("zero timeout expected");
        assert!(err.to_string().contains("connect_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_too_many_retries() {
        let err = parse_config_str("retries = 11").expect_err("invalid retries expected");
        assert!(err.to_string().contains("retries"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("colour = \"red\"").expect_err("unknown key expected");
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("verify = yes").expect_err("invalid boolean expected");
        assert!(format!("{err:#}").contains("verify"));
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("user_agent = probe").expect_err("unquoted string expected");
        assert!(format!("{err:#}").contains("double-quoted"));
    }

    #[test]
    fn test_parse_config_rejects_bundle_with_verify_disabled() {
        let err = parse_config_str("verify = false\nca_bundle = \"/etc/ca.pem\"")
            .expect_err("conflicting TLS settings expected");
        assert!(err.to_string().contains("ca_bundle"));
    }

    #[test]
    fn test_apply_to_session() {
        let cfg = parse_config_str(
            r#"
user_agent = "probe/1.0"
timeout_secs = 10
retries = 4
verify = false
proxy_http = "corp:3128"
"#,
        )
        .expect("config should parse");
        let mut session = Session::new();
        cfg.apply_to(&mut session).expect("config should apply");

        assert_eq!(session.timeout().total, Duration::from_secs(10));
        assert_eq!(session.retries().max_retries(), 4);
        assert_eq!(*session.verify(), TrustAnchor::Disabled);

        let prepared = session
            .prepare(RequestParams::get("http://example.com/"))
            .expect("request should normalize");
        assert_eq!(prepared.head.headers.get("user-agent"), Some("probe/1.0"));
        assert_eq!(prepared.proxy().map(|url| url.as_str()), Some("http://corp:3128/"));
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "read_timeout_secs = 90").expect("write config");
        let cfg = load_config(Some(file.path()))
            .expect("config should load")
            .expect("explicit config is always returned");
        assert_eq!(cfg.read_timeout_secs, Some(90));
    }

    #[test]
    fn test_load_config_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = load_config(Some(&dir.path().join("absent.toml"))).expect_err("missing file");
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
