//! Connection parameters and their cache fingerprint

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ring::digest::{Context, SHA256};
use serde::{Deserialize, Serialize};

use crate::{DaoError, Result, SshTunnelConfig};

/// The closed set of engines an adapter exists for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Postgres,
    Mysql,
    Mssql,
    Sqlite,
    Clickhouse,
    Cassandra,
    Redis,
}

impl DatabaseType {
    /// Canonical lowercase name, also used as the driver name of its clients
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "postgres",
            DatabaseType::Mysql => "mysql",
            DatabaseType::Mssql => "mssql",
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::Clickhouse => "clickhouse",
            DatabaseType::Cassandra => "cassandra",
            DatabaseType::Redis => "redis",
        }
    }

    /// Port used when the parameters leave it unset
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Postgres => 5432,
            DatabaseType::Mysql => 3306,
            DatabaseType::Mssql => 1433,
            DatabaseType::Sqlite => 0,
            DatabaseType::Clickhouse => 8123,
            DatabaseType::Cassandra => 9042,
            DatabaseType::Redis => 6379,
        }
    }

    /// Whether the engine speaks SQL; CQL does not count
    pub fn is_sql(&self) -> bool {
        !matches!(self, DatabaseType::Cassandra | DatabaseType::Redis)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatabaseType {
    type Err = DaoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DatabaseType::Postgres),
            "mysql" | "mysql2" | "mariadb" => Ok(DatabaseType::Mysql),
            "mssql" | "sqlserver" | "sql_server" => Ok(DatabaseType::Mssql),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "clickhouse" => Ok(DatabaseType::Clickhouse),
            "cassandra" | "scylla" | "scylladb" => Ok(DatabaseType::Cassandra),
            "redis" => Ok(DatabaseType::Redis),
            other => Err(DaoError::Configuration(format!(
                "Unsupported database type: {}",
                other
            ))),
        }
    }
}

/// Identity of a distinct live client; the connection cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to correlate log lines.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// Already-decrypted connection parameters for one logical connection.
///
/// Field names on the wire follow the inbound contract (`sshHost`,
/// `privateSSHKey`, ...). Unknown fields are kept in `extras`.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    #[serde(rename = "type")]
    pub database_type: DatabaseType,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Database name; for SQLite the path of the database file
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub cert: Option<String>,
    #[serde(default)]
    pub ssh: bool,
    #[serde(default)]
    pub ssh_host: Option<String>,
    #[serde(default)]
    pub ssh_port: Option<u16>,
    #[serde(default)]
    pub ssh_username: Option<String>,
    #[serde(default, rename = "privateSSHKey")]
    pub private_ssh_key: Option<String>,
    /// Engine-specific extras
    #[serde(default, flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("type", &self.database_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("ssl", &self.ssl)
            .field("ssh", &self.ssh)
            .field("ssh_host", &self.ssh_host)
            .finish_non_exhaustive()
    }
}

impl ConnectionParams {
    /// Create parameters for a direct connection
    pub fn new(database_type: DatabaseType, host: impl Into<String>) -> Self {
        Self {
            database_type,
            host: host.into(),
            port: None,
            username: None,
            password: None,
            database: None,
            schema: None,
            ssl: false,
            cert: None,
            ssh: false,
            ssh_host: None,
            ssh_port: None,
            ssh_username: None,
            private_ssh_key: None,
            extras: BTreeMap::new(),
        }
    }

    /// Parameters for a SQLite database file
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(DatabaseType::Sqlite, "").with_database(path)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Route the connection through an SSH tunnel
    pub fn with_ssh(
        mut self,
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        self.ssh = true;
        self.ssh_host = Some(host.into());
        self.ssh_port = Some(port);
        self.ssh_username = Some(username.into());
        self.private_ssh_key = Some(private_key.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Port, falling back to the engine default
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or_else(|| self.database_type.default_port())
    }

    /// Get an extra parameter as a string
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extras.get(key).and_then(|v| v.as_str())
    }

    /// Build the tunnel configuration when `ssh = true`.
    ///
    /// Returns `Ok(None)` for direct connections and a configuration error
    /// when `ssh` is set but the tunnel fields are incomplete.
    pub fn ssh_tunnel_config(&self) -> Result<Option<SshTunnelConfig>> {
        if !self.ssh {
            return Ok(None);
        }
        let host = self.ssh_host.clone().ok_or_else(|| {
            DaoError::Configuration("sshHost is required when ssh is enabled".to_string())
        })?;
        let username = self.ssh_username.clone().ok_or_else(|| {
            DaoError::Configuration("sshUsername is required when ssh is enabled".to_string())
        })?;
        let key = self.private_ssh_key.clone().ok_or_else(|| {
            DaoError::Configuration("privateSSHKey is required when ssh is enabled".to_string())
        })?;
        let config = SshTunnelConfig::new(host, self.ssh_port.unwrap_or(22), username, key);
        config.validate()?;
        Ok(Some(config))
    }

    /// Deterministic SHA-256 over every field that determines a distinct client.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut ctx = Context::new(&SHA256);
        let mut feed = |part: &str| {
            ctx.update(part.as_bytes());
            ctx.update(&[0x1f]);
        };
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();

        feed(self.database_type.as_str());
        feed(&self.host);
        feed(&self.port_or_default().to_string());
        feed(&opt(&self.username));
        feed(&opt(&self.password));
        feed(&opt(&self.database));
        feed(&opt(&self.schema));
        feed(if self.ssl { "ssl" } else { "plain" });
        feed(&opt(&self.cert));
        feed(if self.ssh { "ssh" } else { "direct" });
        if self.ssh {
            feed(&opt(&self.ssh_host));
            feed(&self.ssh_port.unwrap_or(22).to_string());
            feed(&opt(&self.ssh_username));
            feed(&opt(&self.private_ssh_key));
        }
        // BTreeMap iterates in key order
        for (key, value) in &self.extras {
            feed(key);
            feed(&value.to_string());
        }

        Fingerprint(hex::encode(ctx.finish().as_ref()))
    }
}

#[cfg(test)]
mod tests;
