//! Asynchronous bulk writes.
//!
//! [`ReactiveBulkOperations`] defers all mapping to [`execute`]: queries,
//! updates and entities are stored as given, and the lifecycle hooks, which
//! may themselves be asynchronous, run one document after another when the
//! bulk is submitted.
//!
//! [`execute`]: ReactiveBulkOperations::execute

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use docmap_core::criteria::Query;
use docmap_core::update::Update;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::debug;

use crate::bulk::{
    BulkMode, BulkOperationContext, BulkOptions, BulkWriteOutcome, CollectionTarget,
    CommandTarget, NoopLifecycle, WriteModel,
};
use crate::error::MongoResult;

/// Asynchronous hooks around entity conversion.
#[async_trait]
pub trait AsyncBulkLifecycle<E: Send + Sync>: Send + Sync {
    /// Called before the entity is converted.
    async fn before_convert(&self, _entity: &mut E, _collection: &str) {}

    /// Called with the converted document before it is submitted.
    async fn before_save(&self, _entity: &E, _document: &mut Document, _collection: &str) {}

    /// Called after a successful execute, in submission order.
    async fn after_save(&self, _entity: &E, _document: &Document, _collection: &str) {}
}

#[async_trait]
impl<E: Send + Sync> AsyncBulkLifecycle<E> for NoopLifecycle {}

enum Pending<E> {
    Insert(E),
    Update {
        query: Query,
        update: Update,
        multi: bool,
        upsert: bool,
    },
    Replace {
        query: Query,
        replacement: E,
        upsert: bool,
    },
    Delete {
        query: Query,
        multi: bool,
    },
}

/// A bulk whose mapping and hooks run when it is executed.
pub struct ReactiveBulkOperations<E, T = CollectionTarget> {
    target: T,
    context: BulkOperationContext,
    lifecycle: Arc<dyn AsyncBulkLifecycle<E>>,
    options: BulkOptions,
    pending: Vec<Pending<E>>,
}

impl<E, T: CommandTarget> fmt::Debug for ReactiveBulkOperations<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveBulkOperations")
            .field("namespace", &self.target.namespace())
            .field("mode", &self.context.mode())
            .field("operations", &self.pending.len())
            .finish()
    }
}

impl<E, T> ReactiveBulkOperations<E, T>
where
    E: Serialize + Send + Sync,
    T: CommandTarget,
{
    /// Create an empty bulk.
    pub fn new(target: T, context: BulkOperationContext) -> Self {
        Self {
            target,
            context,
            lifecycle: Arc::new(NoopLifecycle),
            options: BulkOptions::default(),
            pending: Vec::new(),
        }
    }

    /// Install lifecycle hooks.
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn AsyncBulkLifecycle<E>>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// The execution mode.
    pub fn mode(&self) -> BulkMode {
        self.context.mode()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing has been queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
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

    /// Queue an insert.
    pub fn insert(&mut self, entity: E) -> &mut Self {
        self.pending.push(Pending::Insert(entity));
        self
    }

    /// Queue several inserts.
    pub fn insert_all(&mut self, entities: impl IntoIterator<Item = E>) -> &mut Self {
        self.pending.extend(entities.into_iter().map(Pending::Insert));
        self
    }

    fn queue_update(&mut self, query: Query, update: Update, multi: bool, upsert: bool) -> &mut Self {
        self.pending.push(Pending::Update {
            query,
            update,
            multi,
            upsert,
        });
        self
    }

    /// Queue an update of the first match.
    pub fn update_one(&mut self, query: Query, update: Update) -> &mut Self {
        self.queue_update(query, update, false, false)
    }

    /// Queue an update of every match.
    pub fn update_many(&mut self, query: Query, update: Update) -> &mut Self {
        self.queue_update(query, update, true, false)
    }

    /// Queue an update of every match, inserting when nothing matches.
    pub fn upsert(&mut self, query: Query, update: Update) -> &mut Self {
        self.queue_update(query, update, true, true)
    }

    /// Queue several upserts.
    pub fn upsert_many(&mut self, pairs: impl IntoIterator<Item = (Query, Update)>) -> &mut Self {
        for (query, update) in pairs {
            self.upsert(query, update);
        }
        self
    }

    /// Queue a delete of every match.
    pub fn remove(&mut self, query: Query) -> &mut Self {
        self.pending.push(Pending::Delete { query, multi: true });
        self
    }

    /// Queue a delete of the first match.
    pub fn remove_one(&mut self, query: Query) -> &mut Self {
        self.pending.push(Pending::Delete {
            query,
            multi: false,
        });
        self
    }

    /// Queue deletes for several queries.
    pub fn remove_all(&mut self, queries: impl IntoIterator<Item = Query>) -> &mut Self {
        self.pending
            .extend(queries.into_iter().map(|query| Pending::Delete { query, multi: true }));
        self
    }

    /// Queue a replacement of the first match.
    pub fn replace_one(&mut self, query: Query, replacement: E) -> &mut Self {
        self.pending.push(Pending::Replace {
            query,
            replacement,
            upsert: false,
        });
        self
    }

    /// Queue a replacement of the first match, inserting when nothing matches.
    pub fn replace_one_with_upsert(&mut self, query: Query, replacement: E) -> &mut Self {
        self.pending.push(Pending::Replace {
            query,
            replacement,
            upsert: true,
        });
        self
    }

    async fn convert(&self, entity: &mut E) -> MongoResult<Document> {
        let collection = self.target.namespace();
        self.lifecycle.before_convert(entity, collection).await;
        let mut document = self.context.write_entity(entity)?;
        self.lifecycle
            .before_save(entity, &mut document, collection)
            .await;
        Ok(document)
    }

    async fn prepare(&self, pending: Pending<E>) -> MongoResult<(WriteModel, Option<(E, Document)>)> {
        match pending {
            Pending::Insert(mut entity) => {
                let document = self.convert(&mut entity).await?;
                let model = self.context.insert_model(document);
                let saved = match &model {
                    WriteModel::Insert { document } => Some((entity, document.clone())),
                    _ => None,
                };
                Ok((model, saved))
            }
            Pending::Replace {
                query,
                mut replacement,
                upsert,
            } => {
                let document = self.convert(&mut replacement).await?;
                let model = self
                    .context
                    .replace_model(&query, document.clone(), upsert)?;
                Ok((model, Some((replacement, document))))
            }
            Pending::Update {
                query,
                update,
                multi,
                upsert,
            } => Ok((
                self.context.update_model(&query, &update, multi, upsert)?,
                None,
            )),
            Pending::Delete { query, multi } => {
                Ok((self.context.delete_model(&query, multi)?, None))
            }
        }
    }

    /// Map everything queued, run the hooks and submit the bulk.
    ///
    /// The bulk is reset whether or not the execution succeeds.
    pub async fn execute(&mut self) -> MongoResult<BulkWriteOutcome> {
        let pending = std::mem::take(&mut self.pending);
        let options = std::mem::take(&mut self.options);
        if pending.is_empty() {
            debug!(namespace = self.target.namespace(), "Empty bulk, nothing to execute");
            return Ok(BulkWriteOutcome::default());
        }

        let this = &*self;
        let prepared: Vec<(WriteModel, Option<(E, Document)>)> = stream::iter(pending)
            .then(|op| this.prepare(op))
            .try_collect()
            .await?;

        let (models, saved): (Vec<WriteModel>, Vec<Option<(E, Document)>>) =
            prepared.into_iter().unzip();
        let outcome = this
            .context
            .execute_models(&this.target, &models, &options)
            .await?;

        let collection = this.target.namespace();
        stream::iter(saved.into_iter().flatten())
            .for_each(|(entity, document)| async move {
                this.lifecycle
                    .after_save(&entity, &document, collection)
                    .await;
            })
            .await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmap_core::convert::DocumentConverter;
    use docmap_core::criteria::Criteria;
    use docmap_core::mapping::{EntityDescriptor, MappingContext, PropertyDescriptor, PropertyKind};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use crate::error::MongoError;
    use crate::translator::DriverFault;

    #[derive(Default)]
    struct RecordingTarget {
        commands: Mutex<Vec<Document>>,
    }

    #[async_trait]
    impl CommandTarget for RecordingTarget {
        fn namespace(&self) -> &str {
            "books"
        }

        async fn run_command(&self, command: Document) -> Result<Document, DriverFault> {
            let n = ["documents", "updates", "deletes"]
                .iter()
                .find_map(|key| command.get_array(*key).ok())
                .map_or(0, |statements| statements.len() as i32);
            self.commands.lock().push(command);
            Ok(doc! { "ok": 1, "n": n, "nModified": n })
        }
    }

    #[derive(Debug, Clone, Serialize)]
    struct Book {
        title: String,
    }

    #[derive(Default)]
    struct Stamping {
        saved: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AsyncBulkLifecycle<Book> for Stamping {
        async fn before_convert(&self, entity: &mut Book, _collection: &str) {
            tokio::task::yield_now().await;
            entity.title = entity.title.trim().to_string();
        }

        async fn before_save(&self, _entity: &Book, document: &mut Document, collection: &str) {
            document.insert("source", collection);
        }

        async fn after_save(&self, entity: &Book, _document: &Document, _collection: &str) {
            self.saved.lock().push(entity.title.clone());
        }
    }

    fn context() -> BulkOperationContext {
        let mapping = Arc::new(MappingContext::new());
        let book = mapping
            .register(
                EntityDescriptor::builder("Book")
                    .collection("books")
                    .property(PropertyDescriptor::new("title", PropertyKind::String).field("t"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        BulkOperationContext::new(BulkMode::Ordered, Arc::new(DocumentConverter::new(mapping)))
            .entity(book)
    }

    #[tokio::test]
    async fn test_mapping_deferred_to_execute() {
        let target = Arc::new(RecordingTarget::default());
        let lifecycle = Arc::new(Stamping::default());
        let mut bulk = ReactiveBulkOperations::<Book, _>::new(Arc::clone(&target), context())
            .with_lifecycle(lifecycle.clone());

        bulk.insert(Book {
            title: "  Dune ".to_string(),
        })
        .update_one(
            Query::new(Criteria::new().eq("title", "Dune")),
            Update::new().set("title", "Dune Messiah"),
        )
        .insert(Book {
            title: "Emma".to_string(),
        });
        assert!(target.commands.lock().is_empty());
        assert_eq!(bulk.len(), 3);

        let outcome = bulk.execute().await.unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.matched, 1);

        let commands = target.commands.lock().clone();
        assert_eq!(commands.len(), 3);
        let inserted = commands[0].get_array("documents").unwrap()[0]
            .as_document()
            .unwrap()
            .clone();
        assert_eq!(inserted.get_str("t").unwrap(), "Dune");
        assert_eq!(inserted.get_str("source").unwrap(), "books");
        assert_eq!(
            commands[1].get_array("updates").unwrap()[0]
                .as_document()
                .unwrap()
                .get_document("q")
                .unwrap(),
            &doc! { "t": "Dune" }
        );
        assert_eq!(
            *lifecycle.saved.lock(),
            vec!["Dune".to_string(), "Emma".to_string()]
        );
        assert!(bulk.is_empty());
    }

    #[tokio::test]
    async fn test_batch_builders_and_options() {
        let target = Arc::new(RecordingTarget::default());
        let mut bulk: ReactiveBulkOperations<Book, _> =
            ReactiveBulkOperations::new(Arc::clone(&target), context());

        let title = |t: &str| Query::new(Criteria::new().eq("title", t));
        bulk.comment("nightly")
            .write_concern(doc! { "w": "majority" })
            .upsert_many([
                (title("Dune"), Update::new().set("title", "Dune")),
                (title("Emma"), Update::new().set("title", "Emma")),
            ])
            .remove_all([title("Ulysses"), title("Walden")]);
        assert_eq!(bulk.len(), 4);

        let outcome = bulk.execute().await.unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.deleted, 2);

        let commands = target.commands.lock().clone();
        assert_eq!(commands.len(), 2);
        for command in &commands {
            assert_eq!(command.get_str("comment").unwrap(), "nightly");
            assert_eq!(command.get_document("writeConcern").unwrap(), &doc! { "w": "majority" });
        }
        let updates = commands[0].get_array("updates").unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[1].as_document().unwrap().get_bool("upsert").unwrap(),
            true
        );
        let deletes = commands[1].get_array("deletes").unwrap();
        assert_eq!(
            deletes[0].as_document().unwrap(),
            &doc! { "q": { "t": "Ulysses" }, "limit": 0 }
        );

        bulk.remove_one(title("Dune"));
        bulk.execute().await.unwrap();
        let last = target.commands.lock().last().cloned().unwrap();
        assert!(!last.contains_key("comment"));
        assert!(!last.contains_key("writeConcern"));
    }

    #[tokio::test]
    async fn test_mapping_errors_surface_at_execute() {
        let target = Arc::new(RecordingTarget::default());
        let mut bulk: ReactiveBulkOperations<Book, _> =
            ReactiveBulkOperations::new(Arc::clone(&target), context());

        bulk.remove(Query::new(Criteria::new().eq("title", "Dune").eq("title", "Emma")));
        let err = bulk.execute().await.unwrap_err();

        assert!(matches!(err, MongoError::Mapping(_)));
        assert!(target.commands.lock().is_empty());
        assert!(bulk.is_empty());
    }
}
