//! Bulk write batching.
//!
//! [`BulkOperations`] accumulates inserts, updates, replacements and deletes
//! against one collection, mapping every filter and update through the
//! [`QueryMapper`](docmap_core::query_mapper::QueryMapper) and
//! [`UpdateMapper`] as it goes. [`BulkOperations::execute`] splits the
//! accumulated models into `insert`, `update` and `delete` write commands and
//! submits them through a [`CommandTarget`].
//!
//! # Ordering
//!
//! - [`BulkMode::Ordered`] keeps submission order, sending consecutive
//!   operations of the same type as one command, and stops at the first write
//!   error.
//! - [`BulkMode::Unordered`] groups operations by type and attempts every one,
//!   collecting all write errors.
//!
//! Commands are chunked to at most `max_write_batch_size` operations each.
//! Nothing is retried.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut bulk = client.bulk_ops::<Person>(BulkMode::Ordered, Some("Person"), None)?;
//! bulk.insert(ada)?
//!     .update_one(&Query::new(Criteria::new().eq("lastName", "Lovelace")), &Update::new().inc("age", 1))?
//!     .remove(&Query::new(Criteria::new().lt("age", 18)))?;
//! let outcome = bulk.execute().await?;
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use docmap_core::convert::DocumentConverter;
use docmap_core::criteria::Query;
use docmap_core::error::{DataAccessError, DataAccessErrorKind, MappingResult};
use docmap_core::mapping::{EntityDescriptor, ID_FIELD};
use docmap_core::update::Update;
use docmap_core::update_mapper::UpdateMapper;
use mongodb::Database;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{MongoError, MongoResult};
use crate::translator::{DriverFault, FaultKind, MongoExceptionTranslator};

/// Default maximum number of operations per write command.
pub const DEFAULT_MAX_WRITE_BATCH_SIZE: usize = 100_000;

// Largest magnitude below which every integer is an exact double.
const MAX_EXACT_DOUBLE: f64 = 9_007_199_254_740_992.0;

/// How a bulk is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkMode {
    /// Submission order, stop at the first error.
    #[default]
    Ordered,
    /// Any order, attempt every operation.
    Unordered,
}

impl BulkMode {
    /// Whether this is ordered mode.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::Ordered)
    }
}

impl fmt::Display for BulkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordered => write!(f, "ordered"),
            Self::Unordered => write!(f, "unordered"),
        }
    }
}

/// One mapped write operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Insert a stored document.
    Insert {
        /// The document, with its `_id`.
        document: Document,
    },
    /// Apply an update to one or all matches.
    Update {
        /// The mapped filter.
        filter: Document,
        /// The mapped update.
        update: Document,
        /// Update every match instead of the first.
        multi: bool,
        /// Insert when nothing matches.
        upsert: bool,
        /// The collation document.
        collation: Option<Document>,
        /// Mapped array filters.
        array_filters: Vec<Document>,
    },
    /// Replace the first match.
    Replace {
        /// The mapped filter.
        filter: Document,
        /// The stored replacement document.
        replacement: Document,
        /// Insert when nothing matches.
        upsert: bool,
        /// The collation document.
        collation: Option<Document>,
    },
    /// Delete one or all matches.
    Delete {
        /// The mapped filter.
        filter: Document,
        /// Delete every match instead of the first.
        multi: bool,
        /// The collation document.
        collation: Option<Document>,
    },
}

impl WriteModel {
    fn command_kind(&self) -> CommandKind {
        match self {
            Self::Insert { .. } => CommandKind::Insert,
            Self::Update { .. } | Self::Replace { .. } => CommandKind::Update,
            Self::Delete { .. } => CommandKind::Delete,
        }
    }

    /// The entry this model contributes to its write command.
    pub fn to_statement(&self) -> Document {
        let mut statement = Document::new();
        match self {
            Self::Insert { document } => return document.clone(),
            Self::Update {
                filter,
                update,
                multi,
                upsert,
                collation,
                array_filters,
            } => {
                statement.insert("q", filter.clone());
                statement.insert("u", update.clone());
                statement.insert("upsert", *upsert);
                statement.insert("multi", *multi);
                if let Some(collation) = collation {
                    statement.insert("collation", collation.clone());
                }
                if !array_filters.is_empty() {
                    statement.insert("arrayFilters", array_filters.clone());
                }
            }
            Self::Replace {
                filter,
                replacement,
                upsert,
                collation,
            } => {
                statement.insert("q", filter.clone());
                statement.insert("u", replacement.clone());
                statement.insert("upsert", *upsert);
                statement.insert("multi", false);
                if let Some(collation) = collation {
                    statement.insert("collation", collation.clone());
                }
            }
            Self::Delete {
                filter,
                multi,
                collation,
            } => {
                statement.insert("q", filter.clone());
                statement.insert("limit", if *multi { 0 } else { 1 });
                if let Some(collation) = collation {
                    statement.insert("collation", collation.clone());
                }
            }
        }
        statement
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Insert,
    Update,
    Delete,
}

impl CommandKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn statements_key(&self) -> &'static str {
        match self {
            Self::Insert => "documents",
            Self::Update => "updates",
            Self::Delete => "deletes",
        }
    }
}

/// Per-execution command options, reset after every execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkOptions {
    /// Skip schema validation for inserts and updates.
    pub bypass_document_validation: Option<bool>,
    /// A comment attached to every command.
    pub comment: Option<Bson>,
    /// An explicit write concern document.
    pub write_concern: Option<Document>,
}

/// Counts and generated ids of an executed bulk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteOutcome {
    /// Documents inserted.
    pub inserted: u64,
    /// Documents matched by updates and replacements.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// Documents deleted.
    pub deleted: u64,
    /// Documents inserted by upserts.
    pub upserted: u64,
    /// Upserted ids by operation index.
    pub upserted_ids: BTreeMap<usize, Bson>,
    /// Inserted ids by operation index.
    pub inserted_ids: BTreeMap<usize, Bson>,
}

impl BulkWriteOutcome {
    /// Operations that took effect.
    pub fn total(&self) -> u64 {
        self.inserted + self.matched + self.deleted + self.upserted
    }
}

/// One failed operation of a bulk.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteErrorDetail {
    /// Index of the operation in submission order.
    pub index: usize,
    /// The server code.
    pub code: i32,
    /// The server code name, if reported.
    pub code_name: Option<String>,
    /// The server message.
    pub message: String,
}

/// A failed bulk execution.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("bulk write failed: {translated}")]
pub struct BulkOperationError {
    /// The translated cause.
    pub translated: DataAccessError,
    /// What was achieved before or despite the failure.
    pub outcome: BulkWriteOutcome,
    /// Every per-operation error that was reported.
    pub write_errors: Vec<WriteErrorDetail>,
    /// The write concern error, if one was reported.
    pub write_concern_error: Option<WriteErrorDetail>,
}

/// Where write commands are sent.
#[async_trait]
pub trait CommandTarget: Send + Sync {
    /// The collection name.
    fn namespace(&self) -> &str;

    /// Run a command, returning the raw reply.
    async fn run_command(&self, command: Document) -> Result<Document, DriverFault>;
}

#[async_trait]
impl<T: CommandTarget + ?Sized> CommandTarget for Arc<T> {
    fn namespace(&self) -> &str {
        (**self).namespace()
    }

    async fn run_command(&self, command: Document) -> Result<Document, DriverFault> {
        (**self).run_command(command).await
    }
}

/// A collection of a live database.
#[derive(Debug, Clone)]
pub struct CollectionTarget {
    database: Database,
    collection: String,
}

impl CollectionTarget {
    /// Target a collection of the database.
    pub fn new(database: Database, collection: impl Into<String>) -> Self {
        Self {
            database,
            collection: collection.into(),
        }
    }

    /// The database.
    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl CommandTarget for CollectionTarget {
    fn namespace(&self) -> &str {
        &self.collection
    }

    async fn run_command(&self, command: Document) -> Result<Document, DriverFault> {
        self.database
            .run_command(command, None)
            .await
            .map_err(|err| DriverFault::from(&err))
    }
}

/// Hooks around entity conversion for inserts and replacements.
///
/// Updates and deletes never reach these hooks.
pub trait BulkLifecycle<E>: Send + Sync {
    /// Called before the entity is converted.
    fn before_convert(&self, _entity: &mut E, _collection: &str) {}

    /// Called with the converted document before it is queued.
    fn before_save(&self, _entity: &E, _document: &mut Document, _collection: &str) {}

    /// Called after a successful execute, in submission order.
    fn after_save(&self, _entity: &E, _document: &Document, _collection: &str) {}
}

/// Lifecycle that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLifecycle;

impl<E> BulkLifecycle<E> for NoopLifecycle {}

/// Mapping and execution state shared by the bulk builders.
#[derive(Debug, Clone)]
pub struct BulkOperationContext {
    mode: BulkMode,
    entity: Option<Arc<EntityDescriptor>>,
    update_mapper: UpdateMapper,
    translator: MongoExceptionTranslator,
    max_write_batch_size: usize,
}

impl BulkOperationContext {
    /// Create a context without a bound entity.
    pub fn new(mode: BulkMode, converter: Arc<DocumentConverter>) -> Self {
        Self {
            mode,
            entity: None,
            update_mapper: UpdateMapper::new(converter),
            translator: MongoExceptionTranslator::new(),
            max_write_batch_size: DEFAULT_MAX_WRITE_BATCH_SIZE,
        }
    }

    /// Bind an entity whose metadata drives the mapping.
    pub fn entity(mut self, entity: Arc<EntityDescriptor>) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Limit the number of operations per command.
    pub fn max_write_batch_size(mut self, size: usize) -> Self {
        self.max_write_batch_size = size.max(1);
        self
    }

    /// The execution mode.
    pub fn mode(&self) -> BulkMode {
        self.mode
    }

    /// The bound entity.
    pub fn bound_entity(&self) -> Option<&EntityDescriptor> {
        self.entity.as_deref()
    }

    fn converter(&self) -> &DocumentConverter {
        self.update_mapper.query_mapper().converter()
    }

    /// Convert an entity into a stored document, without assigning an id.
    pub(crate) fn write_entity<E: Serialize>(&self, entity: &E) -> MappingResult<Document> {
        self.converter().write(entity, self.bound_entity())
    }

    pub(crate) fn insert_model(&self, document: Document) -> WriteModel {
        WriteModel::Insert {
            document: ensure_id(document),
        }
    }

    fn map_filter(&self, query: &Query) -> MappingResult<(Document, Option<Document>)> {
        let filter = query.filter()?;
        let mapped = self
            .update_mapper
            .query_mapper()
            .map_query(&filter, self.bound_entity());
        Ok((mapped, query.collation().map(|c| c.to_document())))
    }

    pub(crate) fn update_model(
        &self,
        query: &Query,
        update: &Update,
        multi: bool,
        upsert: bool,
    ) -> MappingResult<WriteModel> {
        let (filter, collation) = self.map_filter(query)?;
        let mapped = self.update_mapper.map_update(update, self.bound_entity())?;
        Ok(WriteModel::Update {
            filter,
            update: mapped.update,
            multi,
            upsert,
            collation,
            array_filters: mapped.array_filters,
        })
    }

    pub(crate) fn replace_model(
        &self,
        query: &Query,
        replacement: Document,
        upsert: bool,
    ) -> MappingResult<WriteModel> {
        let (filter, collation) = self.map_filter(query)?;
        Ok(WriteModel::Replace {
            filter,
            replacement,
            upsert,
            collation,
        })
    }

    pub(crate) fn delete_model(&self, query: &Query, multi: bool) -> MappingResult<WriteModel> {
        let (filter, collation) = self.map_filter(query)?;
        Ok(WriteModel::Delete {
            filter,
            multi,
            collation,
        })
    }

    /// Submit the models through the target.
    pub(crate) async fn execute_models<T: CommandTarget + ?Sized>(
        &self,
        target: &T,
        models: &[WriteModel],
        options: &BulkOptions,
    ) -> MongoResult<BulkWriteOutcome> {
        let namespace = target.namespace();
        let runs = plan_runs(models, self.mode, self.max_write_batch_size);
        info!(
            namespace,
            operations = models.len(),
            commands = runs.len(),
            mode = %self.mode,
            "Executing bulk write"
        );

        let mut outcome = BulkWriteOutcome::default();
        let mut write_errors = Vec::new();
        let mut write_concern_error = None;

        for run in &runs {
            let command = self.command_for(namespace, run, models, options);
            debug!(
                namespace,
                command = run.kind.as_str(),
                operations = run.indices.len(),
                "Submitting write command"
            );
            docmap_core::docmap_debug!(command = %command, "Write command body");

            let reply = match target.run_command(command).await {
                Ok(reply) => reply,
                Err(fault) => {
                    return Err(self.failure(&fault, outcome, write_errors, write_concern_error));
                }
            };
            if !reply_ok(&reply) {
                let fault = command_fault(&reply);
                return Err(self.failure(&fault, outcome, write_errors, write_concern_error));
            }

            let run_errors = parse_write_errors(&reply, run);
            apply_reply(&reply, run, models, &run_errors, self.mode, &mut outcome);
            if write_concern_error.is_none() {
                write_concern_error = parse_write_concern_error(&reply);
            }

            let stop = self.mode.is_ordered() && !run_errors.is_empty();
            write_errors.extend(run_errors);
            if stop {
                debug!(namespace, "Ordered bulk stopped at first write error");
                break;
            }
        }

        if write_errors.is_empty() && write_concern_error.is_none() {
            debug!(namespace, total = outcome.total(), "Bulk write complete");
            return Ok(outcome);
        }
        let fault = bulk_fault(&write_errors, write_concern_error.as_ref());
        Err(self.failure(&fault, outcome, write_errors, write_concern_error))
    }

    fn command_for(
        &self,
        namespace: &str,
        run: &Run,
        models: &[WriteModel],
        options: &BulkOptions,
    ) -> Document {
        let statements: Vec<Bson> = run
            .indices
            .iter()
            .filter_map(|&i| models.get(i))
            .map(|model| Bson::Document(model.to_statement()))
            .collect();

        let mut command = Document::new();
        command.insert(run.kind.as_str(), namespace);
        command.insert(run.kind.statements_key(), statements);
        command.insert("ordered", self.mode.is_ordered());
        if run.kind != CommandKind::Delete {
            if let Some(bypass) = options.bypass_document_validation {
                command.insert("bypassDocumentValidation", bypass);
            }
        }
        if let Some(comment) = &options.comment {
            command.insert("comment", comment.clone());
        }
        if let Some(write_concern) = &options.write_concern {
            command.insert("writeConcern", write_concern.clone());
        }
        command
    }

    fn failure(
        &self,
        fault: &DriverFault,
        outcome: BulkWriteOutcome,
        write_errors: Vec<WriteErrorDetail>,
        write_concern_error: Option<WriteErrorDetail>,
    ) -> MongoError {
        let translated = self.translator.translate(fault).unwrap_or_else(|| {
            DataAccessError::new(DataAccessErrorKind::Uncategorized, fault.message.clone())
        });
        warn!(
            kind = %translated.kind,
            write_errors = write_errors.len(),
            completed = outcome.total(),
            "Bulk write failed"
        );
        BulkOperationError {
            translated,
            outcome,
            write_errors,
            write_concern_error,
        }
        .into()
    }
}

/// A builder of bulk writes against one collection.
pub struct BulkOperations<E, T = CollectionTarget> {
    target: T,
    context: BulkOperationContext,
    lifecycle: Arc<dyn BulkLifecycle<E>>,
    options: BulkOptions,
    models: Vec<WriteModel>,
    saved: Vec<(E, Document)>,
}

impl<E, T: CommandTarget> fmt::Debug for BulkOperations<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkOperations")
            .field("namespace", &self.target.namespace())
            .field("mode", &self.context.mode)
            .field("operations", &self.models.len())
            .finish()
    }
}

impl<E: Serialize, T: CommandTarget> BulkOperations<E, T> {
    /// Create an empty bulk.
    pub fn new(target: T, context: BulkOperationContext) -> Self {
        Self {
            target,
            context,
            lifecycle: Arc::new(NoopLifecycle),
            options: BulkOptions::default(),
            models: Vec::new(),
            saved: Vec::new(),
        }
    }

    /// Install lifecycle hooks.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn BulkLifecycle<E>>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// The execution mode.
    pub fn mode(&self) -> BulkMode {
        self.context.mode
    }

    /// The accumulated models.
    pub fn models(&self) -> &[WriteModel] {
        &self.models
    }

    /// Number of accumulated operations.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Whether nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Skip schema validation on the next execute.
    pub fn bypass_document_validation(&mut self, bypass: bool) -> &mut Self {
        self.options.bypass_document_validation = Some(bypass);
        self
    }

    /// Attach a comment to the commands of the next execute.
    pub fn comment(&mut self, comment: impl Into<Bson>) -> &mut Self {
        self.options.comment = Some(comment.into());
        self
    }

    /// Use an explicit write concern for the next execute.
    pub fn write_concern(&mut self, write_concern: Document) -> &mut Self {
        self.options.write_concern = Some(write_concern);
        self
    }

    fn convert(&self, entity: &mut E) -> MappingResult<Document> {
        let collection = self.target.namespace();
        self.lifecycle.before_convert(entity, collection);
        let mut document = self.context.write_entity(entity)?;
        self.lifecycle.before_save(entity, &mut document, collection);
        Ok(document)
    }

    /// Queue an insert.
    pub fn insert(&mut self, mut entity: E) -> MappingResult<&mut Self> {
        let document = self.convert(&mut entity)?;
        let model = self.context.insert_model(document);
        if let WriteModel::Insert { document } = &model {
            self.saved.push((entity, document.clone()));
        }
        self.models.push(model);
        Ok(self)
    }

    /// Queue several inserts.
    pub fn insert_all(&mut self, entities: impl IntoIterator<Item = E>) -> MappingResult<&mut Self> {
        for entity in entities {
            self.insert(entity)?;
        }
        Ok(self)
    }

    /// Queue an update of the first match.
    pub fn update_one(&mut self, query: &Query, update: &Update) -> MappingResult<&mut Self> {
        let model = self.context.update_model(query, update, false, false)?;
        self.models.push(model);
        Ok(self)
    }

    /// Queue an update of every match.
    pub fn update_many(&mut self, query: &Query, update: &Update) -> MappingResult<&mut Self> {
        let model = self.context.update_model(query, update, true, false)?;
        self.models.push(model);
        Ok(self)
    }

    /// Queue an update of every match, inserting when nothing matches.
    pub fn upsert(&mut self, query: &Query, update: &Update) -> MappingResult<&mut Self> {
        let model = self.context.update_model(query, update, true, true)?;
        self.models.push(model);
        Ok(self)
    }

    /// Queue several upserts.
    pub fn upsert_many<'a>(
        &mut self,
        pairs: impl IntoIterator<Item = (&'a Query, &'a Update)>,
    ) -> MappingResult<&mut Self> {
        for (query, update) in pairs {
            self.upsert(query, update)?;
        }
        Ok(self)
    }

    /// Queue a delete of every match.
    pub fn remove(&mut self, query: &Query) -> MappingResult<&mut Self> {
        let model = self.context.delete_model(query, true)?;
        self.models.push(model);
        Ok(self)
    }

    /// Queue a delete of the first match.
    pub fn remove_one(&mut self, query: &Query) -> MappingResult<&mut Self> {
        let model = self.context.delete_model(query, false)?;
        self.models.push(model);
        Ok(self)
    }

    /// Queue deletes for several queries.
    pub fn remove_all<'a>(
        &mut self,
        queries: impl IntoIterator<Item = &'a Query>,
    ) -> MappingResult<&mut Self> {
        for query in queries {
            self.remove(query)?;
        }
        Ok(self)
    }

    /// Queue a replacement of the first match.
    pub fn replace_one(&mut self, query: &Query, replacement: E) -> MappingResult<&mut Self> {
        self.queue_replace(query, replacement, false)
    }

    /// Queue a replacement of the first match, inserting when nothing matches.
    pub fn replace_one_with_upsert(
        &mut self,
        query: &Query,
        replacement: E,
    ) -> MappingResult<&mut Self> {
        self.queue_replace(query, replacement, true)
    }

    fn queue_replace(&mut self, query: &Query, mut replacement: E, upsert: bool) -> MappingResult<&mut Self> {
        let document = self.convert(&mut replacement)?;
        let model = self.context.replace_model(query, document.clone(), upsert)?;
        self.saved.push((replacement, document));
        self.models.push(model);
        Ok(self)
    }

    /// Submit everything accumulated so far.
    ///
    /// The bulk is reset whether or not the execution succeeds. An empty bulk
    /// returns an empty outcome without contacting the server.
    pub async fn execute(&mut self) -> MongoResult<BulkWriteOutcome> {
        let models = std::mem::take(&mut self.models);
        let saved = std::mem::take(&mut self.saved);
        let options = std::mem::take(&mut self.options);

        if models.is_empty() {
            debug!(namespace = self.target.namespace(), "Empty bulk, nothing to execute");
            return Ok(BulkWriteOutcome::default());
        }

        let outcome = self
            .context
            .execute_models(&self.target, &models, &options)
            .await?;

        let collection = self.target.namespace();
        for (entity, document) in &saved {
            self.lifecycle.after_save(entity, document, collection);
        }
        Ok(outcome)
    }
}

/// One write command worth of operations.
#[derive(Debug)]
struct Run {
    kind: CommandKind,
    indices: Vec<usize>,
}

fn plan_runs(models: &[WriteModel], mode: BulkMode, max_batch: usize) -> Vec<Run> {
    let mut groups: Vec<Run> = Vec::new();
    match mode {
        BulkMode::Ordered => {
            for (index, model) in models.iter().enumerate() {
                let kind = model.command_kind();
                match groups.last_mut() {
                    Some(run) if run.kind == kind => run.indices.push(index),
                    _ => groups.push(Run {
                        kind,
                        indices: vec![index],
                    }),
                }
            }
        }
        BulkMode::Unordered => {
            for kind in [CommandKind::Insert, CommandKind::Update, CommandKind::Delete] {
                let indices: Vec<usize> = models
                    .iter()
                    .enumerate()
                    .filter(|(_, model)| model.command_kind() == kind)
                    .map(|(index, _)| index)
                    .collect();
                if !indices.is_empty() {
                    groups.push(Run { kind, indices });
                }
            }
        }
    }

    let max_batch = max_batch.max(1);
    groups
        .into_iter()
        .flat_map(|run| {
            run.indices
                .chunks(max_batch)
                .map(|chunk| Run {
                    kind: run.kind,
                    indices: chunk.to_vec(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn ensure_id(document: Document) -> Document {
    if document.contains_key(ID_FIELD) {
        return document;
    }
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD, ObjectId::new());
    with_id.extend(document);
    with_id
}

fn number(document: &Document, key: &str) -> Option<i64> {
    match document.get(key)? {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        // Only integral doubles within the exact range count as numbers.
        Bson::Double(n) if n.fract() == 0.0 && n.abs() <= MAX_EXACT_DOUBLE => Some(*n as i64),
        _ => None,
    }
}

fn count(document: &Document, key: &str) -> u64 {
    number(document, key).map_or(0, |n| u64::try_from(n).unwrap_or(0))
}

fn reply_index(document: &Document) -> usize {
    number(document, "index").map_or(0, |n| usize::try_from(n).unwrap_or(0))
}

fn code(document: &Document) -> Option<i32> {
    number(document, "code").and_then(|n| i32::try_from(n).ok())
}

fn reply_ok(reply: &Document) -> bool {
    number(reply, "ok") == Some(1)
}

fn error_detail(document: &Document, index: usize) -> WriteErrorDetail {
    WriteErrorDetail {
        index,
        code: code(document).unwrap_or_default(),
        code_name: document.get_str("codeName").ok().map(String::from),
        message: document.get_str("errmsg").unwrap_or_default().to_string(),
    }
}

fn command_fault(reply: &Document) -> DriverFault {
    let message = reply.get_str("errmsg").unwrap_or("command failed");
    let mut fault = DriverFault::new(FaultKind::Command, message);
    if let Some(code) = code(reply) {
        fault = fault.with_code(code);
    }
    if let Ok(name) = reply.get_str("codeName") {
        fault = fault.with_code_name(name);
    }
    if let Ok(labels) = reply.get_array("errorLabels") {
        for label in labels.iter().filter_map(Bson::as_str) {
            fault = fault.with_label(label);
        }
    }
    fault
}

fn parse_write_errors(reply: &Document, run: &Run) -> Vec<WriteErrorDetail> {
    let Ok(errors) = reply.get_array("writeErrors") else {
        return Vec::new();
    };
    errors
        .iter()
        .filter_map(Bson::as_document)
        .map(|error| {
            let local = reply_index(error);
            let index = run.indices.get(local).copied().unwrap_or(local);
            error_detail(error, index)
        })
        .collect()
}

fn parse_write_concern_error(reply: &Document) -> Option<WriteErrorDetail> {
    let error = reply.get_document("writeConcernError").ok()?;
    Some(error_detail(error, 0))
}

fn apply_reply(
    reply: &Document,
    run: &Run,
    models: &[WriteModel],
    run_errors: &[WriteErrorDetail],
    mode: BulkMode,
    outcome: &mut BulkWriteOutcome,
) {
    let n = count(reply, "n");
    match run.kind {
        CommandKind::Insert => {
            outcome.inserted += n;
            let cutoff = if mode.is_ordered() {
                run_errors.iter().map(|e| e.index).min()
            } else {
                None
            };
            for &index in &run.indices {
                if cutoff.is_some_and(|c| index >= c) {
                    break;
                }
                if run_errors.iter().any(|e| e.index == index) {
                    continue;
                }
                if let Some(WriteModel::Insert { document }) = models.get(index) {
                    if let Some(id) = document.get(ID_FIELD) {
                        outcome.inserted_ids.insert(index, id.clone());
                    }
                }
            }
        }
        CommandKind::Update => {
            let mut upserted = 0;
            if let Ok(entries) = reply.get_array("upserted") {
                for entry in entries.iter().filter_map(Bson::as_document) {
                    let local = reply_index(entry);
                    let index = run.indices.get(local).copied().unwrap_or(local);
                    if let Some(id) = entry.get(ID_FIELD) {
                        outcome.upserted_ids.insert(index, id.clone());
                    }
                    upserted += 1;
                }
            }
            outcome.upserted += upserted;
            outcome.matched += n.saturating_sub(upserted);
            outcome.modified += count(reply, "nModified");
        }
        CommandKind::Delete => outcome.deleted += n,
    }
}

fn bulk_fault(errors: &[WriteErrorDetail], concern: Option<&WriteErrorDetail>) -> DriverFault {
    if let Some(first) = errors.first() {
        let message = if errors.len() == 1 {
            first.message.clone()
        } else {
            format!("{} write errors, first: {}", errors.len(), first.message)
        };
        let fault = DriverFault::new(FaultKind::BulkWrite, message)
            .with_code(first.code)
            .with_write_error_codes(errors.iter().map(|e| e.code));
        return match &first.code_name {
            Some(name) => fault.with_code_name(name.clone()),
            None => fault,
        };
    }
    match concern {
        Some(concern) => {
            DriverFault::new(FaultKind::WriteConcern, concern.message.clone()).with_code(concern.code)
        }
        None => DriverFault::new(FaultKind::BulkWrite, "bulk write failed"),
    }
}
