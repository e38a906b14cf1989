//! Configuration handling for the Cloud SQL agent.
//!
//! Configuration comes from CLI arguments with environment-variable fallbacks
//! (a `.env` file is loaded into the environment by `main` before parsing).
//! Everything is validated once, here, and handed to the components as
//! immutable values.

use crate::db::QueryExecutor;
use crate::db::cloudsql::{HostOverride, TunnelOptions};
use crate::engine::gemini::GeminiConfig;
use crate::error::{AgentError, AgentResult};
use crate::models::{Credentials, NetworkMode};
use clap::Parser;
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DB_USER: &str = "root";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_ADMIN_BASE_URL: &str = "https://sqladmin.googleapis.com";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 10;
pub const DEFAULT_SESSION_ID: &str = "sql_session_1";

/// Configuration for the Cloud SQL agent.
#[derive(Clone, Parser)]
#[command(
    name = "cloudsql-agent",
    about = "Chat with a Gemini agent that can run SQL against a Google Cloud SQL for MySQL instance",
    version,
    author
)]
pub struct Config {
    /// Instance connection name (PROJECT:REGION:INSTANCE)
    #[arg(long = "instance", value_name = "PROJECT:REGION:INSTANCE", env = "DB_INSTANCE_NAME")]
    pub instance: Option<String>,

    /// Database user
    #[arg(long, default_value = DEFAULT_DB_USER, env = "DB_USER")]
    pub user: String,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Default database (schema) for statements
    #[arg(long, env = "DB_NAME")]
    pub database: Option<String>,

    /// Which instance address to connect to
    #[arg(
        long = "ip-type",
        value_enum,
        ignore_case = true,
        default_value = "public",
        env = "DB_IP_TYPE"
    )]
    pub ip_type: NetworkMode,

    /// Connect to HOST[:PORT] directly instead of resolving the instance
    /// (e.g. a Cloud SQL Auth Proxy listening on 127.0.0.1). Without it the
    /// instance IP is dialed on 3306 with server-CA TLS, which needs this
    /// host in the instance's authorized networks
    #[arg(long = "db-host", value_name = "HOST[:PORT]", env = "DB_HOST")]
    pub db_host: Option<String>,

    /// OAuth2 access token for the Cloud SQL Admin API.
    /// Falls back to `gcloud auth print-access-token` when unset.
    #[arg(long = "access-token", env = "CLOUDSQL_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Cloud SQL Admin API base URL
    #[arg(long = "admin-url", default_value = DEFAULT_ADMIN_BASE_URL, env = "CLOUDSQL_ADMIN_URL")]
    pub admin_url: Url,

    /// Connection timeout in seconds
    #[arg(
        long = "connect-timeout",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "DB_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Always return BLOB/BINARY values base64-encoded, even when they are valid UTF-8
    #[arg(long = "base64-binary", env = "AGENT_BASE64_BINARY")]
    pub base64_binary: bool,

    /// Gemini API key
    #[arg(long = "api-key", env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model name
    #[arg(long, default_value = DEFAULT_MODEL, env = "GEMINI_MODEL")]
    pub model: String,

    /// Gemini API base URL
    #[arg(long = "gemini-url", default_value = DEFAULT_GEMINI_BASE_URL, env = "GEMINI_BASE_URL")]
    pub gemini_url: Url,

    /// Upper bound on model/tool round trips within one turn
    #[arg(
        long = "max-tool-rounds",
        default_value_t = DEFAULT_MAX_TOOL_ROUNDS,
        env = "AGENT_MAX_TOOL_ROUNDS"
    )]
    pub max_tool_rounds: u32,

    /// Session identifier sent with every turn
    #[arg(long = "session-id", default_value = DEFAULT_SESSION_ID, env = "AGENT_SESSION_ID")]
    pub session_id: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AGENT_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "AGENT_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output on stderr (off by default so logs don't interleave with the chat)
    #[arg(long, env = "AGENT_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("instance", &self.instance)
            .field("user", &self.user)
            .field("password", &redacted(&self.password))
            .field("database", &self.database)
            .field("ip_type", &self.ip_type)
            .field("db_host", &self.db_host)
            .field("access_token", &redacted(&self.access_token))
            .field("admin_url", &self.admin_url.as_str())
            .field("connect_timeout", &self.connect_timeout)
            .field("base64_binary", &self.base64_binary)
            .field("api_key", &redacted(&self.api_key))
            .field("model", &self.model)
            .field("gemini_url", &self.gemini_url.as_str())
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("session_id", &self.session_id)
            .field("log_level", &self.log_level)
            .field("json_logs", &self.json_logs)
            .field("enable_logs", &self.enable_logs)
            .finish()
    }
}

impl Config {
    /// Executor settings for the SQL tool.
    pub fn executor(&self) -> QueryExecutor {
        QueryExecutor::new().decode_binary(!self.base64_binary)
    }

    /// Validated database credentials.
    pub fn credentials(&self) -> AgentResult<Credentials> {
        Credentials::new(
            self.instance.clone(),
            self.user.clone(),
            self.password.clone(),
            self.database.clone(),
            self.ip_type,
        )
    }

    /// Settings for reaching the instance.
    pub fn tunnel_options(&self) -> AgentResult<TunnelOptions> {
        let host_override = self
            .db_host
            .as_deref()
            .map(HostOverride::parse)
            .transpose()?;

        if self.connect_timeout == 0 {
            return Err(AgentError::configuration(
                "connect timeout must be greater than 0",
            ));
        }

        Ok(TunnelOptions {
            host_override,
            access_token: self.access_token.clone().map(SecretString::from),
            admin_base_url: self.admin_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
        })
    }

    /// Settings for the Gemini reasoning engine.
    pub fn gemini(&self) -> AgentResult<GeminiConfig> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AgentError::configuration("GOOGLE_API_KEY not found (set it or pass --api-key)")
            })?;

        if self.max_tool_rounds == 0 {
            return Err(AgentError::configuration(
                "max tool rounds must be greater than 0",
            ));
        }

        Ok(GeminiConfig {
            api_key: SecretString::from(api_key),
            model: self.model.clone(),
            base_url: self.gemini_url.clone(),
            max_tool_rounds: self.max_tool_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["cloudsql-agent"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_full_configuration() {
        let config = parse(&[
            "--instance",
            "proj:us-central1:orders",
            "--user",
            "agent",
            "--password",
            "pw",
            "--database",
            "shop",
            "--ip-type",
            "PRIVATE",
            "--api-key",
            "key",
        ]);

        let creds = config.credentials().unwrap();
        assert_eq!(creds.instance_ref, "proj:us-central1:orders");
        assert_eq!(creds.user, "agent");
        assert_eq!(creds.network_mode, NetworkMode::Private);

        let gemini = config.gemini().unwrap();
        assert_eq!(gemini.max_tool_rounds, config.max_tool_rounds);
    }

    #[test]
    fn test_db_host_override_parsed() {
        let config = parse(&["--db-host", "127.0.0.1:3307"]);
        let tunnel = config.tunnel_options().unwrap();
        let host = tunnel.host_override.unwrap();
        assert_eq!(host.host, "127.0.0.1");
        assert_eq!(host.port, 3307);
    }

    #[test]
    fn test_zero_connect_timeout_rejected() {
        let config = parse(&["--connect-timeout", "0"]);
        assert!(matches!(
            config.tunnel_options(),
            Err(AgentError::Configuration { .. })
        ));
    }

    #[test]
    fn test_zero_tool_rounds_rejected() {
        let config = parse(&["--api-key", "key", "--max-tool-rounds", "0"]);
        assert!(config.gemini().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = parse(&[
            "--password",
            "db-secret",
            "--api-key",
            "gemini-secret",
            "--access-token",
            "ya29.token",
        ]);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("db-secret"));
        assert!(!rendered.contains("gemini-secret"));
        assert!(!rendered.contains("ya29.token"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("root"));
    }

    #[test]
    fn test_base64_binary_flag() {
        assert!(!parse(&[]).base64_binary);
        assert!(parse(&["--base64-binary"]).base64_binary);
    }

    #[test]
    fn test_invalid_ip_type_rejected() {
        let result = Config::try_parse_from(["cloudsql-agent", "--ip-type", "carrier-pigeon"]);
        assert!(result.is_err());
    }
}
