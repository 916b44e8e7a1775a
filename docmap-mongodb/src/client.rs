//! MongoDB client wrapper with built-in connection pooling.

use std::sync::Arc;

use bson::{Document, doc};
use docmap_core::convert::DocumentConverter;
use docmap_core::mapping::{EntityDescriptor, MappingContext};
use docmap_core::query_mapper::QueryMapper;
use docmap_core::schema::JsonSchemaCreator;
use futures::TryStreamExt;
use mongodb::options::AggregateOptions;
use mongodb::{Client, Collection, Database};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::aggregation::{AggregationMapper, AggregationOptions, TypedAggregation};
use crate::bulk::{BulkMode, BulkOperationContext, BulkOperations, CollectionTarget};
use crate::config::MongoConfig;
use crate::error::{MongoError, MongoResult};
use crate::reactive::ReactiveBulkOperations;
use crate::translator::MongoExceptionTranslator;

/// A MongoDB client bound to one database and one mapping context.
///
/// The driver pools connections internally, so cloning is cheap and clones
/// share both the pool and the registered entities.
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    database: Database,
    config: Arc<MongoConfig>,
    converter: Arc<DocumentConverter>,
    aggregation_mapper: AggregationMapper,
    translator: MongoExceptionTranslator,
}

impl MongoClient {
    /// Create a new client with an empty mapping context.
    pub async fn new(config: MongoConfig) -> MongoResult<Self> {
        Self::with_context(config, Arc::new(MappingContext::new())).await
    }

    /// Create a new client over an existing mapping context.
    pub async fn with_context(
        config: MongoConfig,
        context: Arc<MappingContext>,
    ) -> MongoResult<Self> {
        let options = config.to_client_options().await?;

        let client = Client::with_options(options)
            .map_err(|e| MongoError::connection(format!("failed to create client: {e}")))?;

        let database = client.database(&config.database);
        let converter = Arc::new(DocumentConverter::with_options(
            context,
            config.mapping.clone(),
        ));

        info!(
            uri = %config.uri,
            database = %config.database,
            entities = converter.context().len(),
            "MongoDB client created"
        );

        Ok(Self {
            client,
            database,
            config: Arc::new(config),
            aggregation_mapper: AggregationMapper::new(QueryMapper::new(converter.clone())),
            converter,
            translator: MongoExceptionTranslator::new(),
        })
    }

    /// Create a builder for the client.
    pub fn builder() -> MongoClientBuilder {
        MongoClientBuilder::new()
    }

    /// Get a typed collection.
    pub fn collection<T>(&self, name: &str) -> Collection<T>
    where
        T: Send + Sync,
    {
        self.database.collection(name)
    }

    /// Get a collection with BSON documents.
    pub fn collection_doc(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    /// Get the underlying database.
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Get the underlying MongoDB client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the configuration.
    pub fn config(&self) -> &MongoConfig {
        &self.config
    }

    /// The mapping context.
    pub fn context(&self) -> &Arc<MappingContext> {
        self.converter.context()
    }

    /// The document converter.
    pub fn converter(&self) -> &Arc<DocumentConverter> {
        &self.converter
    }

    /// The query mapper.
    pub fn query_mapper(&self) -> &QueryMapper {
        self.aggregation_mapper.query_mapper()
    }

    /// The aggregation mapper.
    pub fn aggregation_mapper(&self) -> &AggregationMapper {
        &self.aggregation_mapper
    }

    /// The exception translator.
    pub fn translator(&self) -> &MongoExceptionTranslator {
        &self.translator
    }

    /// Register an entity with the mapping context.
    pub fn register_entity(&self, entity: EntityDescriptor) -> MongoResult<Arc<EntityDescriptor>> {
        Ok(self.context().register(entity)?)
    }

    /// Check if the client is healthy by pinging the server.
    pub async fn is_healthy(&self) -> bool {
        self.database
            .run_command(doc! { "ping": 1 }, None)
            .await
            .is_ok()
    }

    /// List all collection names in the database.
    pub async fn list_collections(&self) -> MongoResult<Vec<String>> {
        self.database
            .list_collection_names(None)
            .await
            .map_err(|e| self.translator.to_mongo_error(e))
    }

    /// Drop a collection.
    pub async fn drop_collection(&self, name: &str) -> MongoResult<()> {
        debug!(collection = %name, "Dropping collection");
        self.database
            .collection::<Document>(name)
            .drop(None)
            .await
            .map_err(|e| self.translator.to_mongo_error(e))
    }

    /// Create an entity's collection with a `$jsonSchema` validator derived
    /// from its metadata.
    pub async fn create_collection_for(&self, entity: &str) -> MongoResult<()> {
        let descriptor = self.context().require(entity)?;
        let validator = JsonSchemaCreator::new(self.context().clone()).create_schema_for(entity)?;

        self.run_command(doc! {
            "create": descriptor.collection(),
            "validator": validator,
        })
        .await?;

        info!(entity = %entity, collection = %descriptor.collection(), "Collection created");
        Ok(())
    }

    /// Run a database command.
    pub async fn run_command(&self, command: Document) -> MongoResult<Document> {
        self.database
            .run_command(command, None)
            .await
            .map_err(|e| self.translator.to_mongo_error(e))
    }

    /// The bulk mode configured as default.
    pub fn default_bulk_mode(&self) -> BulkMode {
        self.config.bulk.default_mode
    }

    /// A bulk against a collection.
    ///
    /// With an entity the collection defaults to the entity's and its
    /// metadata drives the mapping; without one, `collection` is required.
    pub fn bulk_ops<E: Serialize>(
        &self,
        mode: BulkMode,
        entity: Option<&str>,
        collection: Option<&str>,
    ) -> MongoResult<BulkOperations<E>> {
        let (target, context) = self.bulk_parts(mode, entity, collection)?;
        Ok(BulkOperations::new(target, context))
    }

    /// An asynchronous bulk against a collection.
    ///
    /// Resolves the collection the same way as [`MongoClient::bulk_ops`].
    pub fn reactive_bulk_ops<E: Serialize + Send + Sync>(
        &self,
        mode: BulkMode,
        entity: Option<&str>,
        collection: Option<&str>,
    ) -> MongoResult<ReactiveBulkOperations<E>> {
        let (target, context) = self.bulk_parts(mode, entity, collection)?;
        Ok(ReactiveBulkOperations::new(target, context))
    }

    fn bulk_parts(
        &self,
        mode: BulkMode,
        entity: Option<&str>,
        collection: Option<&str>,
    ) -> MongoResult<(CollectionTarget, BulkOperationContext)> {
        let descriptor = entity.map(|name| self.context().require(name)).transpose()?;
        let collection = resolve_collection(descriptor.as_deref(), collection)?;

        let mut context = BulkOperationContext::new(mode, self.converter.clone())
            .max_write_batch_size(self.config.bulk.max_write_batch_size);
        if let Some(descriptor) = descriptor {
            context = context.entity(descriptor);
        }

        debug!(collection = %collection, mode = %mode, "Bulk operations created");
        Ok((CollectionTarget::new(self.database.clone(), collection), context))
    }

    /// Run a typed aggregation against the entity's collection.
    pub async fn aggregate(&self, aggregation: &TypedAggregation) -> MongoResult<Vec<Document>> {
        let entity = self.context().require(aggregation.entity())?;
        let pipeline = self.aggregation_mapper.map_pipeline(aggregation)?;
        let options = aggregate_options(aggregation.aggregation().options())?;

        debug!(
            collection = %entity.collection(),
            stages = pipeline.len(),
            "Running aggregation"
        );

        let cursor = self
            .collection_doc(entity.collection())
            .aggregate(pipeline, options)
            .await
            .map_err(|e| self.translator.to_mongo_error(e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| self.translator.to_mongo_error(e))
    }

    /// Run a typed aggregation and deserialize each result.
    pub async fn aggregate_as<T: DeserializeOwned>(
        &self,
        aggregation: &TypedAggregation,
    ) -> MongoResult<Vec<T>> {
        self.aggregate(aggregation)
            .await?
            .into_iter()
            .map(|document| bson::from_document(document).map_err(MongoError::from))
            .collect()
    }
}

fn resolve_collection(
    entity: Option<&EntityDescriptor>,
    collection: Option<&str>,
) -> MongoResult<String> {
    match (collection, entity) {
        (Some(name), _) if !name.is_empty() => Ok(name.to_string()),
        (_, Some(entity)) => Ok(entity.collection().to_string()),
        _ => Err(MongoError::invalid_argument(
            "a collection name or an entity is required",
        )),
    }
}

fn aggregate_options(options: &AggregationOptions) -> MongoResult<Option<AggregateOptions>> {
    if *options == AggregationOptions::default() {
        return Ok(None);
    }

    let mut driver = AggregateOptions::default();
    driver.allow_disk_use = options.allow_disk_use;
    driver.batch_size = options.batch_size;
    if let Some(ref collation) = options.collation {
        driver.collation = Some(bson::from_document(collation.to_document())?);
    }
    Ok(Some(driver))
}

/// Builder for MongoClient.
#[derive(Debug, Default)]
pub struct MongoClientBuilder {
    uri: Option<String>,
    database: Option<String>,
    app_name: Option<String>,
    max_pool_size: Option<u32>,
    min_pool_size: Option<u32>,
    connect_timeout: Option<std::time::Duration>,
    direct_connection: Option<bool>,
    context: Option<Arc<MappingContext>>,
}

impl MongoClientBuilder {
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

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Set the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.min_pool_size = Some(size);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, duration: std::time::Duration) -> Self {
        self.connect_timeout = Some(duration);
        self
    }

    /// Enable direct connection (bypass replica set discovery).
    pub fn direct_connection(mut self, enabled: bool) -> Self {
        self.direct_connection = Some(enabled);
        self
    }

    /// Share a mapping context with other clients.
    pub fn context(mut self, context: Arc<MappingContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Build the client.
    pub async fn build(self) -> MongoResult<MongoClient> {
        let mut config_builder = MongoConfig::builder();

        if let Some(uri) = self.uri {
            config_builder = config_builder.uri(uri);
        }
        if let Some(database) = self.database {
            config_builder = config_builder.database(database);
        }
        if let Some(app_name) = self.app_name {
            config_builder = config_builder.app_name(app_name);
        }
        if let Some(max_pool) = self.max_pool_size {
            config_builder = config_builder.max_pool_size(max_pool);
        }
        if let Some(min_pool) = self.min_pool_size {
            config_builder = config_builder.min_pool_size(min_pool);
        }
        if let Some(timeout) = self.connect_timeout {
            config_builder = config_builder.connect_timeout(timeout);
        }
        if let Some(direct) = self.direct_connection {
            config_builder = config_builder.direct_connection(direct);
        }

        let config = config_builder.build()?;
        match self.context {
            Some(context) => MongoClient::with_context(config, context).await,
            None => MongoClient::new(config).await,
        }
    }
}
