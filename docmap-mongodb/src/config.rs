//! MongoDB connection configuration.
//!
//! [`MongoConfig`] is built once, either through [`MongoConfigBuilder`] or
//! from a `docmap.toml` file via [`DocmapConfig`], and stays immutable for
//! the lifetime of a client.
//!
//! ```toml
//! [mongodb]
//! uri = "${MONGODB_URI}"
//! database = "inventory"
//! read_preference = "secondaryPreferred"
//! write_concern = "majority"
//!
//! [mapping]
//! type_key = "_class"
//!
//! [bulk]
//! default_mode = "unordered"
//! max_write_batch_size = 1000
//!
//! [debug]
//! log_level = "debug"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use docmap_core::config::{MappingOptions, expand_env_vars};
use mongodb::options::{Acknowledgment, ClientOptions, SelectionCriteria};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bulk::{BulkMode, DEFAULT_MAX_WRITE_BATCH_SIZE};
use crate::error::{MongoError, MongoResult};

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "docmap.toml";

const DEFAULT_URI: &str = "mongodb://localhost:27017";
const DEFAULT_APP_NAME: &str = "docmap";

/// MongoDB connection configuration.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    /// MongoDB connection URI.
    pub uri: String,
    /// Database name.
    pub database: String,
    /// Application name (shown in server logs).
    pub app_name: Option<String>,
    /// Minimum connection pool size.
    pub min_pool_size: Option<u32>,
    /// Maximum connection pool size.
    pub max_pool_size: Option<u32>,
    /// Maximum idle time for connections.
    pub max_idle_time: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout.
    pub server_selection_timeout: Option<Duration>,
    /// Read preference.
    pub read_preference: Option<ReadPreference>,
    /// Write concern.
    pub write_concern: Option<WriteConcern>,
    /// Retry writes.
    pub retry_writes: Option<bool>,
    /// Retry reads.
    pub retry_reads: Option<bool>,
    /// Direct connection (bypass replica set discovery).
    pub direct_connection: Option<bool>,
    /// Document mapping options.
    pub mapping: MappingOptions,
    /// Bulk write defaults.
    pub bulk: BulkConfig,
}

/// MongoDB read preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// Read from primary only.
    #[default]
    Primary,
    /// Read from primary preferred, fallback to secondary.
    PrimaryPreferred,
    /// Read from secondary only.
    Secondary,
    /// Read from secondary preferred, fallback to primary.
    SecondaryPreferred,
    /// Read from nearest member.
    Nearest,
}

impl ReadPreference {
    /// The URI option spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }

    fn to_selection_criteria(self) -> SelectionCriteria {
        use mongodb::options::ReadPreference as Driver;

        SelectionCriteria::ReadPreference(match self {
            Self::Primary => Driver::Primary,
            Self::PrimaryPreferred => Driver::PrimaryPreferred {
                options: Default::default(),
            },
            Self::Secondary => Driver::Secondary {
                options: Default::default(),
            },
            Self::SecondaryPreferred => Driver::SecondaryPreferred {
                options: Default::default(),
            },
            Self::Nearest => Driver::Nearest {
                options: Default::default(),
            },
        })
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPreference {
    type Err = MongoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace(['_', '-'], "").to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "primarypreferred" => Ok(Self::PrimaryPreferred),
            "secondary" => Ok(Self::Secondary),
            "secondarypreferred" => Ok(Self::SecondaryPreferred),
            "nearest" => Ok(Self::Nearest),
            _ => Err(MongoError::config(format!("unknown read preference '{s}'"))),
        }
    }
}

/// MongoDB write concern.
///
/// Written in TOML as `"majority"`, a node count such as `"2"`, or a tag set
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WriteConcern {
    /// Acknowledge writes from the specified number of nodes.
    W(u32),
    /// Acknowledge writes from majority of nodes.
    Majority,
    /// Custom tag set.
    Custom(String),
}

impl WriteConcern {
    fn to_driver(&self) -> mongodb::options::WriteConcern {
        let w = match self {
            Self::W(n) => Acknowledgment::Nodes(*n),
            Self::Majority => Acknowledgment::Majority,
            Self::Custom(tag) => Acknowledgment::Custom(tag.clone()),
        };
        mongodb::options::WriteConcern::builder().w(w).build()
    }
}

impl fmt::Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::W(n) => write!(f, "{n}"),
            Self::Majority => f.write_str("majority"),
            Self::Custom(tag) => f.write_str(tag),
        }
    }
}

impl FromStr for WriteConcern {
    type Err = MongoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MongoError::config("write concern must not be empty"));
        }
        if s.eq_ignore_ascii_case("majority") {
            return Ok(Self::Majority);
        }
        Ok(s.parse::<u32>()
            .map(Self::W)
            .unwrap_or_else(|_| Self::Custom(s.to_string())))
    }
}

impl TryFrom<String> for WriteConcern {
    type Error = MongoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WriteConcern> for String {
    fn from(value: WriteConcern) -> Self {
        value.to_string()
    }
}

/// Defaults applied to bulk operations created by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkConfig {
    /// Mode used when the caller does not pick one.
    pub default_mode: BulkMode,
    /// Maximum operations per write command.
    pub max_write_batch_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            default_mode: BulkMode::Ordered,
            max_write_batch_size: DEFAULT_MAX_WRITE_BATCH_SIZE,
        }
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_string(),
            database: String::new(),
            app_name: Some(DEFAULT_APP_NAME.to_string()),
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: Some(Duration::from_secs(300)),
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            read_preference: Some(ReadPreference::Primary),
            write_concern: None,
            retry_writes: Some(true),
            retry_reads: Some(true),
            direct_connection: None,
            mapping: MappingOptions::default(),
            bulk: BulkConfig::default(),
        }
    }
}

impl MongoConfig {
    /// Create a new configuration from a MongoDB URI.
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> MongoConfigBuilder {
        MongoConfigBuilder::new()
    }

    /// Convert to MongoDB ClientOptions.
    pub async fn to_client_options(&self) -> MongoResult<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| MongoError::config(format!("failed to parse URI: {e}")))?;

        if let Some(ref app_name) = self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(min_pool) = self.min_pool_size {
            options.min_pool_size = Some(min_pool);
        }
        if let Some(max_pool) = self.max_pool_size {
            options.max_pool_size = Some(max_pool);
        }
        if let Some(max_idle) = self.max_idle_time {
            options.max_idle_time = Some(max_idle);
        }
        if let Some(connect_timeout) = self.connect_timeout {
            options.connect_timeout = Some(connect_timeout);
        }
        if let Some(selection_timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(selection_timeout);
        }
        if let Some(read_pref) = self.read_preference {
            options.selection_criteria = Some(read_pref.to_selection_criteria());
        }
        if let Some(ref wc) = self.write_concern {
            options.write_concern = Some(wc.to_driver());
        }
        if let Some(retry_writes) = self.retry_writes {
            options.retry_writes = Some(retry_writes);
        }
        if let Some(retry_reads) = self.retry_reads {
            options.retry_reads = Some(retry_reads);
        }
        if let Some(direct) = self.direct_connection {
            options.direct_connection = Some(direct);
        }

        Ok(options)
    }
}

/// Builder for MongoDB configuration.
#[derive(Debug, Default)]
pub struct MongoConfigBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    min_pool_size: Option<u32>,
    max_pool_size: Option<u32>,
    max_idle_time: Option<Duration>,
    connect_timeout: Option<Duration>,
    server_selection_timeout: Option<Duration>,
    read_preference: Option<ReadPreference>,
    write_concern: Option<WriteConcern>,
    retry_writes: Option<bool>,
    retry_reads: Option<bool>,
    direct_connection: Option<bool>,
    mapping: Option<MappingOptions>,
    bulk: Option<BulkConfig>,
}

impl MongoConfigBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the MongoDB URI.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the application name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the maximum idle time for connections.
    pub fn max_idle_time(mut self, duration: Duration) -> Self {
        self.max_idle_time = Some(duration);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Set the server selection timeout.
    pub fn server_selection_timeout(mut self, duration: Duration) -> Self {
        self.server_selection_timeout = Some(duration);
        self
    }

    /// Set the read preference.
    pub fn read_preference(mut self, pref: ReadPreference) -> Self {
        self.read_preference = Some(pref);
        self
    }

    /// Set the write concern.
    pub fn write_concern(mut self, wc: WriteConcern) -> Self {
        self.write_concern = Some(wc);
        self
    }

    /// Enable or disable retry writes.
    pub fn retry_writes(mut self, enabled: bool) -> Self {
        self.retry_writes = Some(enabled);
        self
    }

    /// Enable or disable retry reads.
    pub fn retry_reads(mut self, enabled: bool) -> Self {
        self.retry_reads = Some(enabled);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Set the document mapping options.
    pub fn mapping(mut self, options: MappingOptions) -> Self {
        self.mapping = Some(options);
        self
    }

    /// Set the bulk write defaults.
    pub fn bulk(mut self, bulk: BulkConfig) -> Self {
        self.bulk = Some(bulk);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> MongoResult<MongoConfig> {
        let database = self
            .database
            .filter(|name| !name.is_empty())
            .ok_or_else(|| MongoError::config("database name is required"))?;

        Ok(MongoConfig {
            uri: self.uri.unwrap_or_else(|| DEFAULT_URI.to_string()),
            database,
            app_name: self.app_name.or(Some(DEFAULT_APP_NAME.to_string())),
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size.or(Some(10)),
            max_idle_time: self.max_idle_time.or(Some(Duration::from_secs(300))),
            connect_timeout: self.connect_timeout.or(Some(Duration::from_secs(10))),
            server_selection_timeout: self
                .server_selection_timeout
                .or(Some(Duration::from_secs(30))),
            read_preference: self.read_preference.or(Some(ReadPreference::Primary)),
            write_concern: self.write_concern,
            retry_writes: self.retry_writes.or(Some(true)),
            retry_reads: self.retry_reads.or(Some(true)),
            direct_connection: self.direct_connection,
            mapping: self.mapping.unwrap_or_default(),
            bulk: self.bulk.unwrap_or_default(),
        })
    }
}

/// The `[mongodb]` section of `docmap.toml`.
///
/// Durations are given in whole seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSection {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub app_name: Option<String>,
    pub min_pool_size: Option<u32>,
    pub max_pool_size: Option<u32>,
    pub max_idle_time_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub server_selection_timeout_secs: Option<u64>,
    pub read_preference: Option<ReadPreference>,
    pub write_concern: Option<WriteConcern>,
    pub retry_writes: Option<bool>,
    pub retry_reads: Option<bool>,
    pub direct_connection: Option<bool>,
}

/// The `[debug]` section of `docmap.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugSection {
    /// Log level passed to [`docmap_core::logging::init_with_level`].
    pub log_level: Option<String>,
}

/// Parsed `docmap.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocmapConfig {
    pub mongodb: ConnectionSection,
    pub mapping: MappingOptions,
    pub bulk: BulkConfig,
    pub debug: DebugSection,
}

impl DocmapConfig {
    /// Parse TOML, expanding `${VAR}` references first.
    pub fn from_str(content: &str) -> MongoResult<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded)
            .map_err(|e| MongoError::config(format!("invalid configuration: {e}")))
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> MongoResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| {
            MongoError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_str(&content)
    }

    /// Initialize logging at the configured level, if one is set.
    pub fn init_logging(&self) {
        match self.debug.log_level.as_deref() {
            Some(level) => docmap_core::logging::init_with_level(level),
            None => docmap_core::logging::init(),
        }
    }

    /// Build the connection configuration.
    pub fn to_mongo_config(&self) -> MongoResult<MongoConfig> {
        let section = &self.mongodb;
        let mut builder = MongoConfig::builder()
            .mapping(self.mapping.clone())
            .bulk(self.bulk.clone());

        if let Some(ref uri) = section.uri {
            builder = builder.uri(uri.clone());
        }
        if let Some(ref database) = section.database {
            builder = builder.database(database.clone());
        }
        if let Some(ref app_name) = section.app_name {
            builder = builder.app_name(app_name.clone());
        }
        if let Some(size) = section.min_pool_size {
            builder = builder.min_pool_size(size);
        }
        if let Some(size) = section.max_pool_size {
            builder = builder.max_pool_size(size);
        }
        if let Some(secs) = section.max_idle_time_secs {
            builder = builder.max_idle_time(Duration::from_secs(secs));
        }
        if let Some(secs) = section.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = section.server_selection_timeout_secs {
            builder = builder.server_selection_timeout(Duration::from_secs(secs));
        }
        if let Some(pref) = section.read_preference {
            builder = builder.read_preference(pref);
        }
        if let Some(ref wc) = section.write_concern {
            builder = builder.write_concern(wc.clone());
        }
        if let Some(enabled) = section.retry_writes {
            builder = builder.retry_writes(enabled);
        }
        if let Some(enabled) = section.retry_reads {
            builder = builder.retry_reads(enabled);
        }
        if let Some(enabled) = section.direct_connection {
            builder = builder.direct_connection(enabled);
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_uri() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", "mydb");
        assert_eq!(config.uri, "mongodb://localhost:27017");
        assert_eq!(config.database, "mydb");
        assert_eq!(config.app_name.as_deref(), Some("docmap"));
    }

    #[test]
    fn test_config_builder() {
        let config = MongoConfig::builder()
            .uri("mongodb://localhost:27017")
            .database("mydb")
            .app_name("test-app")
            .max_pool_size(20)
            .build()
            .unwrap();

        assert_eq!(config.database, "mydb");
        assert_eq!(config.app_name, Some("test-app".to_string()));
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.bulk, BulkConfig::default());
    }

    #[test]
    fn test_config_builder_missing_database() {
        let result = MongoConfig::builder()
            .uri("mongodb://localhost:27017")
            .build();

        assert!(matches!(result, Err(MongoError::Config(_))));
    }

    #[test]
    fn test_read_preference_parse() {
        assert_eq!(ReadPreference::default(), ReadPreference::Primary);
        assert_eq!(
            "secondaryPreferred".parse::<ReadPreference>().unwrap(),
            ReadPreference::SecondaryPreferred
        );
        assert_eq!(
            "primary_preferred".parse::<ReadPreference>().unwrap(),
            ReadPreference::PrimaryPreferred
        );
        assert!("fastest".parse::<ReadPreference>().is_err());
    }

    #[test]
    fn test_write_concern_parse() {
        assert_eq!("majority".parse::<WriteConcern>().unwrap(), WriteConcern::Majority);
        assert_eq!("2".parse::<WriteConcern>().unwrap(), WriteConcern::W(2));
        assert_eq!(
            "dc-east".parse::<WriteConcern>().unwrap(),
            WriteConcern::Custom("dc-east".to_string())
        );
        assert!("".parse::<WriteConcern>().is_err());
    }

    #[test]
    fn test_docmap_config_sections() {
        let config = DocmapConfig::from_str(
            r#"
            [mongodb]
            uri = "mongodb://db.internal:27017"
            database = "inventory"
            connect_timeout_secs = 5
            read_preference = "nearest"
            write_concern = "majority"

            [mapping]
            type_key = "_type"

            [bulk]
            default_mode = "unordered"
            max_write_batch_size = 500
            "#,
        )
        .unwrap();

        let mongo = config.to_mongo_config().unwrap();
        assert_eq!(mongo.uri, "mongodb://db.internal:27017");
        assert_eq!(mongo.database, "inventory");
        assert_eq!(mongo.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(mongo.read_preference, Some(ReadPreference::Nearest));
        assert_eq!(mongo.write_concern, Some(WriteConcern::Majority));
        assert_eq!(mongo.mapping.type_key.as_deref(), Some("_type"));
        assert_eq!(mongo.bulk.default_mode, BulkMode::Unordered);
        assert_eq!(mongo.bulk.max_write_batch_size, 500);
    }

    #[test]
    fn test_docmap_config_rejects_unknown_keys() {
        let result = DocmapConfig::from_str(
            r#"
            [bulk]
            retries = 3
            "#,
        );
        assert!(matches!(result, Err(MongoError::Config(_))));
    }

    #[test]
    fn test_docmap_config_requires_database() {
        let config = DocmapConfig::from_str("[mongodb]\nuri = \"mongodb://a\"\n").unwrap();
        assert!(config.to_mongo_config().is_err());
    }

    #[test]
    fn test_docmap_config_expands_env() {
        // SAFETY: variable name is unique to this test.
        unsafe {
            std::env::set_var("DOCMAP_TEST_CONFIG_DB", "orders");
        }
        let config =
            DocmapConfig::from_str("[mongodb]\ndatabase = \"${DOCMAP_TEST_CONFIG_DB}\"\n").unwrap();
        assert_eq!(config.mongodb.database.as_deref(), Some("orders"));
    }
}
