//! Runtime configuration loaded once at startup.
//!
//! Values come from the process environment (after loading `.env` when
//! present) and are frozen into a [`ParleyConfig`] that is passed to the
//! components that need it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;

use crate::error::ParleyError;
use crate::history::DEFAULT_HISTORY_FILE;
use crate::mcp::spec::ServerSpec;
use crate::provider::OpenAiProvider;
use crate::util::retry::RetryPolicy;

pub const MCP_API_TOKEN: &str = "MCP_API_TOKEN";
pub const PHONE_NUMBER_ID: &str = "PHONE_NUMBER_ID";
pub const WABATOKEN: &str = "WABATOKEN";

/// Keys that must be present before any connection is attempted.
pub const REQUIRED_ENV_KEYS: [&str; 3] = [MCP_API_TOKEN, PHONE_NUMBER_ID, WABATOKEN];

pub const DEFAULT_WHATSAPP_API_VERSION: &str = "v18.0";
pub const DEFAULT_MCP_SERVER_URL: &str = "https://whatsapp-mcp-server-xqt4.onrender.com/mcp";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Upper bounds accepted from the environment.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3_600;
pub const MAX_RETRIES_LIMIT: u32 = 10;

#[derive(Clone, Builder)]
pub struct ParleyConfig {
    #[builder(into)]
    pub mcp_api_token: String,
    #[builder(into)]
    pub phone_number_id: String,
    #[builder(into)]
    pub whatsapp_token: String,
    #[builder(into, default = DEFAULT_WHATSAPP_API_VERSION.to_string())]
    pub whatsapp_api_version: String,
    #[builder(into, default = DEFAULT_MCP_SERVER_URL.to_string())]
    pub mcp_server_url: String,
    #[builder(into)]
    pub openai_api_key: Option<String>,
    #[builder(into)]
    pub openai_base_url: Option<String>,
    #[builder(into, default = DEFAULT_MODEL.to_string())]
    pub model: String,
    #[builder(default = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))]
    pub request_timeout: Duration,
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    #[builder(into, default = PathBuf::from(DEFAULT_HISTORY_FILE))]
    pub history_file: PathBuf,
    /// Log a run summary after every successful turn.
    #[builder(default)]
    pub debug: bool,
}

impl fmt::Debug for ParleyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParleyConfig")
            .field("mcp_api_token", &"..")
            .field("phone_number_id", &self.phone_number_id)
            .field("whatsapp_token", &"..")
            .field("whatsapp_api_version", &self.whatsapp_api_version)
            .field("mcp_server_url", &self.mcp_server_url)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| ".."))
            .field("openai_base_url", &self.openai_base_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("max_retries", &self.max_retries)
            .field("history_file", &self.history_file)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ParleyConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ParleyError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// Every missing required key is reported at once. Empty values count as
    /// missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ParleyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_ENV_KEYS
            .iter()
            .filter(|key| get(**key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ParleyError::MissingEnvironment { keys: missing });
        }

        let request_timeout_secs = parse_number(
            "PARLEY_REQUEST_TIMEOUT_SECS",
            get("PARLEY_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
            1..=MAX_REQUEST_TIMEOUT_SECS,
        )?;
        let max_retries = parse_number(
            "PARLEY_MAX_RETRIES",
            get("PARLEY_MAX_RETRIES"),
            DEFAULT_MAX_RETRIES,
            0..=MAX_RETRIES_LIMIT,
        )?;

        Ok(Self {
            mcp_api_token: get(MCP_API_TOKEN).unwrap_or_default(),
            phone_number_id: get(PHONE_NUMBER_ID).unwrap_or_default(),
            whatsapp_token: get(WABATOKEN).unwrap_or_default(),
            whatsapp_api_version: get("WHATSAPP_API_VERSION")
                .unwrap_or_else(|| DEFAULT_WHATSAPP_API_VERSION.to_string()),
            mcp_server_url: get("MCP_SERVER_URL")
                .unwrap_or_else(|| DEFAULT_MCP_SERVER_URL.to_string()),
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL"),
            model: get("PARLEY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_retries,
            history_file: get("PARLEY_HISTORY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_FILE)),
            debug: get("AGENT_DEBUG").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        })
    }

    /// The WhatsApp MCP server, authenticated with the configured tokens.
    pub fn default_servers(&self) -> Vec<ServerSpec> {
        let mut headers = BTreeMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.mcp_api_token),
        );
        headers.insert(
            "x-whatsapp-phone-id".to_string(),
            self.phone_number_id.clone(),
        );
        headers.insert("x-whatsapp-token".to_string(), self.whatsapp_token.clone());
        headers.insert("api_version".to_string(), self.whatsapp_api_version.clone());

        vec![ServerSpec::http("whatsapp", self.mcp_server_url.clone(), headers)]
    }

    /// Bound on one whole turn: every provider attempt may use the full
    /// request timeout. Saturates instead of overflowing.
    pub fn invoke_timeout(&self) -> Duration {
        self.request_timeout
            .saturating_mul(self.max_retries.saturating_add(1))
    }

    /// Build the chat model provider.
    pub fn openai_provider(&self) -> Result<OpenAiProvider, ParleyError> {
        let api_key = self
            .openai_api_key
            .clone()
            .ok_or_else(|| ParleyError::Authentication("Missing OPENAI_API_KEY".into()))?;
        Ok(OpenAiProvider::new(
            self.model.clone(),
            api_key,
            self.openai_base_url.clone(),
            self.request_timeout,
        )?
        .with_retry(RetryPolicy::with_retries(self.max_retries)))
    }
}

fn parse_number<T>(
    key: &str,
    raw: Option<String>,
    default: T,
    allowed: RangeInclusive<T>,
) -> Result<T, ParleyError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    let value: T = raw.trim().parse().map_err(|_| {
        ParleyError::Configuration(format!("{key} must be a non-negative integer, got '{raw}'"))
    })?;
    if !allowed.contains(&value) {
        return Err(ParleyError::Configuration(format!(
            "{key} must be between {} and {}, got {value}",
            allowed.start(),
            allowed.end()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            (MCP_API_TOKEN, "mcp-secret"),
            (PHONE_NUMBER_ID, "1234567890"),
            (WABATOKEN, "wa-secret"),
        ]
    }

    #[test]
    fn missing_keys_are_all_reported() {
        let err = ParleyConfig::from_lookup(lookup(&[(PHONE_NUMBER_ID, "123"), (WABATOKEN, " ")]))
            .expect_err("missing keys should fail");
        match err {
            ParleyError::MissingEnvironment { keys } => {
                assert_eq!(keys, vec![MCP_API_TOKEN.to_string(), WABATOKEN.to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let config = ParleyConfig::from_lookup(lookup(&required())).expect("config should load");
        assert_eq!(config.whatsapp_api_version, "v18.0");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.history_file, PathBuf::from(DEFAULT_HISTORY_FILE));
        assert!(!config.debug);
        assert!(config.openai_api_key.is_none());
    }

    #[test]
    fn optional_keys_override_defaults() {
        let mut pairs = required();
        pairs.extend([
            ("AGENT_DEBUG", "TRUE"),
            ("PARLEY_MAX_RETRIES", "5"),
            ("WHATSAPP_API_VERSION", "v20.0"),
            ("PARLEY_HISTORY_FILE", "/tmp/h.json"),
        ]);
        let config = ParleyConfig::from_lookup(lookup(&pairs)).expect("config should load");
        assert!(config.debug);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.whatsapp_api_version, "v20.0");
        assert_eq!(config.history_file, PathBuf::from("/tmp/h.json"));
    }

    #[test]
    fn malformed_number_is_configuration_error() {
        let mut pairs = required();
        pairs.push(("PARLEY_REQUEST_TIMEOUT_SECS", "soon"));
        let err = ParleyConfig::from_lookup(lookup(&pairs)).expect_err("bad number should fail");
        assert!(matches!(err, ParleyError::Configuration(_)));
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        for (key, value) in [
            ("PARLEY_MAX_RETRIES", "4294967295"),
            ("PARLEY_MAX_RETRIES", "11"),
            ("PARLEY_REQUEST_TIMEOUT_SECS", "0"),
            ("PARLEY_REQUEST_TIMEOUT_SECS", "18446744073709551615"),
        ] {
            let mut pairs = required();
            pairs.push((key, value));
            let err = ParleyConfig::from_lookup(lookup(&pairs))
                .expect_err("out-of-range value should fail");
            assert!(
                matches!(&err, ParleyError::Configuration(msg) if msg.contains(key)),
                "{key}={value}: {err}"
            );
        }
    }

    #[test]
    fn invoke_timeout_covers_every_attempt_and_saturates() {
        let config = ParleyConfig::from_lookup(lookup(&required())).expect("config should load");
        assert_eq!(config.invoke_timeout(), Duration::from_secs(120));

        let extreme = ParleyConfig::builder()
            .mcp_api_token("a")
            .phone_number_id("b")
            .whatsapp_token("c")
            .request_timeout(Duration::MAX)
            .max_retries(u32::MAX)
            .build();
        assert_eq!(extreme.invoke_timeout(), Duration::MAX);
    }

    #[test]
    fn default_servers_carry_auth_headers() {
        let config = ParleyConfig::builder()
            .mcp_api_token("mcp-secret")
            .phone_number_id("1234567890")
            .whatsapp_token("wa-secret")
            .build();
        let servers = config.default_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].name, "whatsapp");
        match &servers[0].transport {
            crate::mcp::spec::ServerTransport::Http { url, headers } => {
                assert_eq!(url, DEFAULT_MCP_SERVER_URL);
                assert_eq!(headers["Authorization"], "Bearer mcp-secret");
                assert_eq!(headers["x-whatsapp-phone-id"], "1234567890");
                assert_eq!(headers["x-whatsapp-token"], "wa-secret");
                assert_eq!(headers["api_version"], "v18.0");
            }
            other => panic!("unexpected transport: {other:?}"),
        }
        assert!(servers[0].validate().is_ok());
    }

    #[test]
    fn provider_requires_api_key() {
        let config = ParleyConfig::builder()
            .mcp_api_token("a")
            .phone_number_id("b")
            .whatsapp_token("c")
            .build();
        assert!(matches!(
            config.openai_provider().err(),
            Some(ParleyError::Authentication(_))
        ));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = ParleyConfig::from_lookup(lookup(&required())).expect("config should load");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("mcp-secret"));
        assert!(!rendered.contains("wa-secret"));
    }
}
