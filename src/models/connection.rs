//! Connection-related data models.
//!
//! This module defines the credentials the agent connects with and the
//! types that describe where a managed instance lives.

use crate::error::{AgentError, AgentResult};
use clap::ValueEnum;
use secrecy::{ExposeSecret, SecretString};

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseType {
    /// Cloud SQL for MySQL
    MySQL,
    /// File-backed offline database
    SQLite,
}

impl DatabaseType {
    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Which of the instance's addresses the tunnel targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum NetworkMode {
    /// The instance's public IP (`PRIMARY` in the Admin API)
    #[default]
    Public,
    /// The instance's VPC-internal IP
    Private,
}

impl NetworkMode {
    /// Address type as reported by the Cloud SQL Admin API.
    pub fn address_type(&self) -> &'static str {
        match self {
            Self::Public => "PRIMARY",
            Self::Private => "PRIVATE",
        }
    }
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Private => write!(f, "private"),
        }
    }
}

/// A Cloud SQL instance connection name: `project:region:instance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    pub project: String,
    pub region: String,
    pub instance: String,
}

impl InstanceName {
    /// Parse an instance connection name.
    ///
    /// Domain-scoped projects (`example.com:project`) contain a colon of their
    /// own, so the region and instance are taken from the right.
    pub fn parse(s: &str) -> AgentResult<Self> {
        let mut parts = s.trim().rsplitn(3, ':');
        let instance = parts.next().unwrap_or_default();
        let region = parts.next().unwrap_or_default();
        let project = parts.next().unwrap_or_default();

        if project.is_empty() || region.is_empty() || instance.is_empty() {
            return Err(AgentError::misconfigured(
                format!("Invalid instance connection name '{}'", s),
                "Use the form PROJECT:REGION:INSTANCE, as shown on the instance overview page",
            ));
        }

        Ok(Self {
            project: project.to_string(),
            region: region.to_string(),
            instance: instance.to_string(),
        })
    }
}

impl std::fmt::Display for InstanceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.region, self.instance)
    }
}

/// Credentials for the managed instance. Immutable once built.
pub struct Credentials {
    pub instance_ref: String,
    pub user: String,
    /// Contains sensitive data - never log
    password: SecretString,
    /// None connects without a default database (statements must qualify tables).
    pub database: Option<String>,
    pub network_mode: NetworkMode,
}

impl Credentials {
    /// Build credentials, rejecting a missing instance reference or password.
    pub fn new(
        instance_ref: Option<String>,
        user: impl Into<String>,
        password: Option<String>,
        database: Option<String>,
        network_mode: NetworkMode,
    ) -> AgentResult<Self> {
        let instance_ref = instance_ref
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = password.filter(|s| !s.is_empty());

        let (Some(instance_ref), Some(password)) = (instance_ref, password) else {
            return Err(AgentError::configuration(
                "DB credentials missing: set DB_INSTANCE_NAME and DB_PASSWORD (or --instance and --password)",
            ));
        };

        Ok(Self {
            instance_ref,
            user: user.into(),
            password: SecretString::from(password),
            database: database.filter(|s| !s.trim().is_empty()),
            network_mode,
        })
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("instance_ref", &self.instance_ref)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .field("network_mode", &self.network_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(instance: Option<&str>, password: Option<&str>) -> AgentResult<Credentials> {
        Credentials::new(
            instance.map(String::from),
            "root",
            password.map(String::from),
            Some("shop".to_string()),
            NetworkMode::Public,
        )
    }

    #[test]
    fn test_credentials_valid() {
        let c = creds(Some("proj:us-central1:db"), Some("s3cret")).unwrap();
        assert_eq!(c.instance_ref, "proj:us-central1:db");
        assert_eq!(c.password(), "s3cret");
        assert_eq!(c.database.as_deref(), Some("shop"));
    }

    #[test]
    fn test_credentials_missing_instance() {
        let err = creds(None, Some("s3cret")).unwrap_err();
        assert!(matches!(err, AgentError::Configuration { .. }));
    }

    #[test]
    fn test_credentials_missing_password() {
        let err = creds(Some("proj:us-central1:db"), None).unwrap_err();
        assert!(matches!(err, AgentError::Configuration { .. }));
    }

    #[test]
    fn test_credentials_blank_values_count_as_missing() {
        assert!(creds(Some("   "), Some("s3cret")).is_err());
        assert!(creds(Some("proj:us-central1:db"), Some("")).is_err());
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let c = creds(Some("proj:us-central1:db"), Some("hunter2")).unwrap();
        let debug = format!("{:?}", c);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_instance_name_parse() {
        let name = InstanceName::parse("my-proj:europe-west1:orders").unwrap();
        assert_eq!(name.project, "my-proj");
        assert_eq!(name.region, "europe-west1");
        assert_eq!(name.instance, "orders");
        assert_eq!(name.to_string(), "my-proj:europe-west1:orders");
    }

    #[test]
    fn test_instance_name_domain_scoped_project() {
        let name = InstanceName::parse("example.com:analytics:us-east1:warehouse").unwrap();
        assert_eq!(name.project, "example.com:analytics");
        assert_eq!(name.region, "us-east1");
        assert_eq!(name.instance, "warehouse");
    }

    #[test]
    fn test_instance_name_invalid() {
        for bad in ["orders", "proj:orders", "proj::orders", ":us-east1:orders", ""] {
            let err = InstanceName::parse(bad).unwrap_err();
            assert!(!err.is_transient(), "{bad} should be a permanent error");
        }
    }

    #[test]
    fn test_network_mode_address_type() {
        assert_eq!(NetworkMode::Public.address_type(), "PRIMARY");
        assert_eq!(NetworkMode::Private.address_type(), "PRIVATE");
        assert_eq!(NetworkMode::default(), NetworkMode::Public);
    }
}
