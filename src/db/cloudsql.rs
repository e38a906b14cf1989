//! Cloud SQL for MySQL connectivity.
//!
//! An instance connection name is resolved to a concrete address and server
//! CA through the Cloud SQL Admin API, then a TLS session is opened directly
//! against the MySQL port (3306). This is server-CA TLS, not the connector's
//! ephemeral-certificate tunnel on 3307, so a public IP is only reachable
//! from the instance's authorized networks and a private IP only from its
//! VPC. A host override skips resolution entirely, which is how a local
//! Cloud SQL Auth Proxy (or a plain MySQL server in tests) is reached.

use crate::db::connection::{ConnectionGuard, DbConnection, LiveConnections};
use crate::db::provider::ConnectionProvider;
use crate::error::{AgentError, AgentResult};
use crate::models::{Credentials, DatabaseType, InstanceName, NetworkMode};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::Connection;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlSslMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

/// Where to connect when the Admin API is bypassed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOverride {
    pub host: String,
    pub port: u16,
}

impl HostOverride {
    /// Parse `host`, `host:port` or `[v6addr]:port`.
    pub fn parse(s: &str) -> AgentResult<Self> {
        let s = s.trim();
        let default_port = DatabaseType::MySQL.default_port().unwrap_or(3306);
        let invalid = || {
            AgentError::configuration(format!(
                "Invalid database host '{}': expected HOST or HOST:PORT",
                s
            ))
        };

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else {
            match s.rsplit_once(':') {
                // More than one colon without brackets: a bare IPv6 address
                Some((host, _)) if host.contains(':') => (s, None),
                Some((host, port)) => (host, Some(port)),
                None => (s, None),
            }
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
            None => default_port,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// How the provider reaches the instance.
pub struct TunnelOptions {
    pub host_override: Option<HostOverride>,
    /// Bearer token for the Admin API; `gcloud` is asked when absent.
    pub access_token: Option<SecretString>,
    pub admin_base_url: Url,
    /// Bounds connection establishment only, never statements.
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for TunnelOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelOptions")
            .field("host_override", &self.host_override)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("admin_base_url", &self.admin_base_url.as_str())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// A resolved address to open sessions against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// PEM-encoded server CA; `None` means TLS is opportunistic.
    pub server_ca: Option<String>,
}

// =============================================================================
// Admin API
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectSettings {
    #[serde(default)]
    ip_addresses: Vec<IpMapping>,
    server_ca_cert: Option<SslCert>,
    database_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpMapping {
    #[serde(rename = "type")]
    kind: String,
    ip_address: String,
}

#[derive(Debug, Deserialize)]
struct SslCert {
    cert: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Client for the `connectSettings` endpoint of the Cloud SQL Admin API.
#[derive(Debug)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: Option<SecretString>,
}

impl AdminClient {
    pub fn new(
        base_url: Url,
        access_token: Option<SecretString>,
        request_timeout: Duration,
    ) -> AgentResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AgentError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            access_token,
        })
    }

    /// Look up the address of the requested kind and the server CA.
    pub async fn resolve(&self, name: &InstanceName, mode: NetworkMode) -> AgentResult<Endpoint> {
        let path = format!(
            "sql/v1beta4/projects/{}/instances/{}/connectSettings",
            name.project, name.instance
        );
        let url = self.base_url.join(&path).map_err(|e| {
            AgentError::configuration(format!("Invalid Admin API URL for {}: {}", name, e))
        })?;
        let token = self.token().await?;

        debug!(instance = %name, %url, "Resolving instance");
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                AgentError::connection(
                    format!("Cloud SQL Admin API request failed: {}", e),
                    "Check network connectivity to sqladmin.googleapis.com",
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(match status.as_u16() {
                401 | 403 => AgentError::connection(
                    format!("Not authorized to read {}: {}", name, message),
                    "Refresh the access token and check the Cloud SQL Client role",
                ),
                404 => AgentError::misconfigured(
                    format!("Instance {} not found: {}", name, message),
                    "Check the instance connection name",
                ),
                _ => AgentError::connection(
                    format!("Cloud SQL Admin API returned {}: {}", status, message),
                    "Try again later",
                ),
            });
        }

        let settings: ConnectSettings = response.json().await.map_err(|e| {
            AgentError::connection(
                format!("Unreadable connectSettings response: {}", e),
                "Check the Admin API URL",
            )
        })?;
        select_endpoint(name, settings, mode)
    }

    async fn token(&self) -> AgentResult<String> {
        if let Some(token) = &self.access_token {
            return Ok(token.expose_secret().to_string());
        }

        let output = Command::new("gcloud")
            .args(["auth", "print-access-token"])
            .output()
            .await
            .map_err(|e| {
                AgentError::configuration(format!(
                    "No access token configured and gcloud could not be run: {}",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(AgentError::connection(
                format!(
                    "gcloud auth print-access-token failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                "Run `gcloud auth login` or set CLOUDSQL_ACCESS_TOKEN",
            ));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AgentError::connection(
                "gcloud returned an empty access token",
                "Run `gcloud auth login` or set CLOUDSQL_ACCESS_TOKEN",
            ));
        }
        Ok(token)
    }
}

fn select_endpoint(
    name: &InstanceName,
    settings: ConnectSettings,
    mode: NetworkMode,
) -> AgentResult<Endpoint> {
    if let Some(version) = &settings.database_version {
        if !version.starts_with("MYSQL") {
            return Err(AgentError::misconfigured(
                format!("{} runs {}, not MySQL", name, version),
                "Point DB_INSTANCE_NAME at a Cloud SQL for MySQL instance",
            ));
        }
    }

    let wanted = mode.address_type();
    let address = settings
        .ip_addresses
        .into_iter()
        .find(|ip| ip.kind == wanted)
        .ok_or_else(|| {
            AgentError::misconfigured(
                format!("{} has no {} IP address", name, wanted),
                match mode {
                    NetworkMode::Public => "Enable a public IP or use --ip-type private",
                    NetworkMode::Private => "Enable private IP or use --ip-type public",
                },
            )
        })?;

    Ok(Endpoint {
        host: address.ip_address,
        port: DatabaseType::MySQL.default_port().unwrap_or(3306),
        server_ca: settings.server_ca_cert.map(|c| c.cert),
    })
}

// =============================================================================
// Provider
// =============================================================================

enum Target {
    Direct(Endpoint),
    Managed {
        instance: InstanceName,
        admin: AdminClient,
    },
}

/// Opens TLS sessions on a Cloud SQL for MySQL instance.
pub struct CloudSqlProvider {
    credentials: Arc<Credentials>,
    target: Target,
    connect_timeout: Duration,
    live: LiveConnections,
}

impl CloudSqlProvider {
    /// The instance name is validated here, at startup, unless a host
    /// override makes it a label only.
    pub fn new(credentials: Arc<Credentials>, options: TunnelOptions) -> AgentResult<Self> {
        let target = match options.host_override {
            Some(host) => Target::Direct(Endpoint {
                host: host.host,
                port: host.port,
                server_ca: None,
            }),
            None => Target::Managed {
                instance: InstanceName::parse(&credentials.instance_ref)?,
                admin: AdminClient::new(
                    options.admin_base_url,
                    options.access_token,
                    options.connect_timeout,
                )?,
            },
        };

        Ok(Self {
            credentials,
            target,
            connect_timeout: options.connect_timeout,
            live: LiveConnections::new(),
        })
    }

    async fn resolve_endpoint(&self) -> AgentResult<Endpoint> {
        match &self.target {
            Target::Direct(endpoint) => Ok(endpoint.clone()),
            Target::Managed { instance, admin } => {
                admin.resolve(instance, self.credentials.network_mode).await
            }
        }
    }

    fn connect_options(&self, endpoint: &Endpoint) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .username(&self.credentials.user)
            .password(self.credentials.password());

        if let Some(database) = &self.credentials.database {
            options = options.database(database);
        }

        match &endpoint.server_ca {
            Some(pem) => options
                .ssl_mode(MySqlSslMode::VerifyCa)
                .ssl_ca_from_pem(pem.as_bytes().to_vec()),
            None => options.ssl_mode(MySqlSslMode::Preferred),
        }
    }
}

#[async_trait]
impl ConnectionProvider for CloudSqlProvider {
    async fn open(&self) -> AgentResult<ConnectionGuard> {
        let endpoint = self.resolve_endpoint().await?;
        let options = self.connect_options(&endpoint);
        let limit = self.connect_timeout;

        let conn = timeout(limit, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| AgentError::timeout("connect", limit.as_secs()))??;

        info!(
            instance = %self.credentials.instance_ref,
            host = %endpoint.host,
            port = endpoint.port,
            verified_tls = endpoint.server_ca.is_some(),
            "Opened Cloud SQL session"
        );
        Ok(ConnectionGuard::new(DbConnection::MySql(conn), self.describe()).tracked(&self.live))
    }

    fn describe(&self) -> String {
        self.credentials.instance_ref.clone()
    }

    fn live_connections(&self) -> usize {
        self.live.count()
    }
}
