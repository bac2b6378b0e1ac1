//! One content repository: event store, command bus, subscription engine and
//! the projections it keeps current.
//!
//! ```text
//!               handle(command)
//!                     │
//!                     ▼
//!   CommandBus ──commit──> EventStore
//!                              │
//!                              ▼  catch_up_active (same call)
//!   SubscriptionEngine ──apply──> contentGraph ──> ContentGraphReader ──> subgraph queries
//!                      └─apply──> documentUriPaths ──> DocumentUriPathFinder
//! ```
//!
//! ## Consistency
//!
//! `handle` returns once its events are committed and every active projection
//! caught up. A projection that fails to apply an event is put into `ERROR`
//! and reported through [`ContentRepository::status`]; the command itself
//! still succeeds.
//!
//! ## Stores
//!
//! The builder falls back to in-memory stores. `stores_from_env` switches to
//! Postgres when `DATABASE_URL` is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};

use escr_content::{
    ContentCommand, ContentEvent, ContentSubgraph, DimensionSpaceCommandHandler, NodeAggregateCommandHandler,
    NodeMigration, NodeTypeManager, VisibilityConstraints,
};
use escr_core::{ConfigurationError, ContentRepositoryId, SubscriptionId, WorkspaceName};
use escr_dimension::{DimensionSpacePoint, InterDimensionalVariationGraph};
use escr_events::{ProjectionStatus, SequenceNumber};

use crate::command_bus::{CommandBus, CommandError, CommandOutcome};
use crate::config::{CONTENT_GRAPH_PROJECTION, ContentRepositoryConfig, DOCUMENT_URI_PATH_PROJECTION};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore};
use crate::projections::{ContentGraphProjection, ContentGraphReader, DocumentUriPathFinder, DocumentUriPathProjection};
use crate::subscription::{
    InMemorySubscriptionStore, PostgresSubscriptionStore, ProcessedResult, ReplayOptions, ReplayProgress, Subscriber,
    SubscriptionCriteria, SubscriptionEngine, SubscriptionError, SubscriptionStatusReport, SubscriptionStore,
};

#[derive(Debug, Error)]
pub enum ContentRepositoryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error("subscription engine lock poisoned")]
    LockPoisoned,
}

impl ContentRepositoryError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, ContentRepositoryError::Command(e) if e.is_concurrency_conflict())
    }
}

/// Health of the event store and of every subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentRepositoryStatus {
    pub event_store: ProjectionStatus,
    pub subscriptions: Vec<SubscriptionStatusReport>,
}

impl ContentRepositoryStatus {
    pub fn is_ok(&self) -> bool {
        self.event_store.is_ok() && self.subscriptions.iter().all(SubscriptionStatusReport::is_ok)
    }
}

pub struct ContentRepositoryBuilder {
    config: ContentRepositoryConfig,
    event_store: Option<Arc<dyn EventStore>>,
    subscription_store: Option<Arc<dyn SubscriptionStore>>,
    extra_projections: Vec<(SubscriptionId, Subscriber<ContentEvent>)>,
}

impl ContentRepositoryBuilder {
    pub fn new(config: ContentRepositoryConfig) -> Self {
        Self {
            config,
            event_store: None,
            subscription_store: None,
            extra_projections: Vec::new(),
        }
    }

    pub fn event_store(mut self, event_store: Arc<dyn EventStore>) -> Self {
        self.event_store = Some(event_store);
        self
    }

    pub fn subscription_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.subscription_store = Some(store);
        self
    }

    /// Postgres-backed event and subscription stores on one pool.
    pub fn postgres(self, pool: PgPool) -> Result<Self, ConfigurationError> {
        let id = self.config.repository_id()?;
        Ok(self
            .event_store(Arc::new(PostgresEventStore::new(pool.clone(), &id)))
            .subscription_store(Arc::new(PostgresSubscriptionStore::new(pool, &id))))
    }

    /// Postgres stores if `DATABASE_URL` is set; the pool connects lazily.
    pub fn stores_from_env(self) -> Result<Self, ConfigurationError> {
        match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_lazy(&url)
                    .map_err(|e| ConfigurationError::Invalid(format!("DATABASE_URL is not usable: {e}")))?;
                self.postgres(pool)
            }
            Err(_) => Ok(self),
        }
    }

    /// Register a projection in addition to the configured ones.
    pub fn projection(mut self, id: SubscriptionId, projection: Subscriber<ContentEvent>) -> Self {
        self.extra_projections.push((id, projection));
        self
    }

    pub fn build(self) -> Result<ContentRepository, ConfigurationError> {
        let id = self.config.repository_id()?;
        let variation_graph = Arc::new(self.config.variation_graph()?);
        let node_types = Arc::new(self.config.node_type_manager()?);
        let projection_ids = self.config.projection_ids()?;

        let event_store: Arc<dyn EventStore> = match self.event_store {
            Some(store) => store,
            None => Arc::new(InMemoryEventStore::new()),
        };
        let subscription_store: Arc<dyn SubscriptionStore> = match self.subscription_store {
            Some(store) => store,
            None => Arc::new(InMemorySubscriptionStore::new()),
        };

        let content_graph = ContentGraphProjection::new();
        let reader = content_graph.reader();
        let document_uri_paths = DocumentUriPathProjection::new(node_types.clone());
        let finder = document_uri_paths.finder();
        let mut content_graph = Some(content_graph);
        let mut document_uri_paths = Some(document_uri_paths);
        let mut has_uri_paths = false;

        let mut engine = SubscriptionEngine::new(event_store.clone(), subscription_store);
        for projection_id in projection_ids {
            let projection: Subscriber<ContentEvent> = match projection_id.as_str() {
                CONTENT_GRAPH_PROJECTION => match content_graph.take() {
                    Some(p) => Box::new(p),
                    None => continue,
                },
                DOCUMENT_URI_PATH_PROJECTION => match document_uri_paths.take() {
                    Some(p) => {
                        has_uri_paths = true;
                        Box::new(p)
                    }
                    None => continue,
                },
                other => return Err(ConfigurationError::UnknownProjection(other.to_string())),
            };
            register(&mut engine, projection_id, projection)?;
        }
        for (projection_id, projection) in self.extra_projections {
            register(&mut engine, projection_id, projection)?;
        }

        let node_handler = NodeAggregateCommandHandler::new(variation_graph.clone(), node_types.clone());
        let dimension_handler = DimensionSpaceCommandHandler::new(variation_graph.clone());
        let bus = CommandBus::new(event_store.clone(), reader.clone(), node_handler, dimension_handler);

        info!(repository = %id, "content repository built");
        Ok(ContentRepository {
            id,
            event_store,
            bus,
            engine: Mutex::new(engine),
            rebuilt: AtomicBool::new(false),
            content_graph: reader,
            document_uri_paths: has_uri_paths.then_some(finder),
            node_types,
            variation_graph,
        })
    }
}

fn register(
    engine: &mut SubscriptionEngine<ContentEvent>,
    id: SubscriptionId,
    projection: Subscriber<ContentEvent>,
) -> Result<(), ConfigurationError> {
    engine
        .register(id, projection)
        .map_err(|e| ConfigurationError::Invalid(e.to_string()))
}

pub struct ContentRepository {
    id: ContentRepositoryId,
    event_store: Arc<dyn EventStore>,
    bus: CommandBus,
    engine: Mutex<SubscriptionEngine<ContentEvent>>,
    rebuilt: AtomicBool,
    content_graph: ContentGraphReader,
    document_uri_paths: Option<DocumentUriPathFinder>,
    node_types: Arc<NodeTypeManager>,
    variation_graph: Arc<InterDimensionalVariationGraph>,
}

impl ContentRepository {
    pub fn id(&self) -> &ContentRepositoryId {
        &self.id
    }

    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }

    pub fn node_types(&self) -> &NodeTypeManager {
        &self.node_types
    }

    pub fn variation_graph(&self) -> &InterDimensionalVariationGraph {
        &self.variation_graph
    }

    /// Provision the event store and every subscription, then bring the
    /// projections up to date. Safe to run on every start.
    ///
    /// The first call in a process replays every registered projection, since
    /// the built-in ones keep their state in memory while subscription
    /// positions may be durable. Later calls only boot new subscriptions.
    #[tracing::instrument(skip(self), fields(repository = %self.id), err)]
    pub fn setup(&self) -> Result<ProcessedResult, ContentRepositoryError> {
        self.event_store.setup()?;
        let mut engine = self.engine()?;
        engine.setup()?;
        let result = if self.rebuilt.swap(true, Ordering::SeqCst) {
            engine.boot()?
        } else {
            engine.replay_all(&ReplayOptions::default(), |_| {}, |_| {})?
        };
        info!(processed = result.processed(), "content repository set up");
        Ok(result)
    }

    pub fn status(&self) -> Result<ContentRepositoryStatus, ContentRepositoryError> {
        Ok(ContentRepositoryStatus {
            event_store: self.event_store.status(),
            subscriptions: self.engine()?.subscription_statuses()?,
        })
    }

    /// Commit a command, then bring the active projections up to date.
    ///
    /// Once the commit succeeded the command counts as handled: catch-up
    /// failures are logged and left to `status` and the next catch-up.
    pub fn handle(&self, command: &ContentCommand) -> Result<CommandOutcome, ContentRepositoryError> {
        let outcome = self.bus.handle(command)?;
        self.catch_up_after_commit();
        Ok(outcome)
    }

    /// [`ContentRepository::handle`], catching up and retrying after a
    /// concurrency conflict.
    pub fn handle_with_retry(
        &self,
        command: &ContentCommand,
        max_attempts: usize,
    ) -> Result<CommandOutcome, ContentRepositoryError> {
        let mut attempt = 1;
        loop {
            match self.handle(command) {
                Err(err) if err.is_concurrency_conflict() && attempt < max_attempts => {
                    warn!(attempt, error = %err, "command hit a concurrency conflict, retrying");
                    attempt += 1;
                    self.catch_up_active()?;
                }
                result => return result,
            }
        }
    }

    pub fn catch_up_active(&self) -> Result<ProcessedResult, ContentRepositoryError> {
        Ok(self.engine()?.catch_up_active()?)
    }

    pub fn boot(&self) -> Result<ProcessedResult, ContentRepositoryError> {
        Ok(self.engine()?.boot()?)
    }

    pub fn reactivate(&self, criteria: &SubscriptionCriteria) -> Result<ProcessedResult, ContentRepositoryError> {
        Ok(self.engine()?.reactivate(criteria)?)
    }

    pub fn replay_projection(
        &self,
        id: &SubscriptionId,
        options: &ReplayOptions,
        progress: impl FnMut(&ReplayProgress),
    ) -> Result<ProcessedResult, ContentRepositoryError> {
        Ok(self.engine()?.replay(id, options, progress)?)
    }

    pub fn replay_all(
        &self,
        options: &ReplayOptions,
        on_subscription: impl FnMut(&SubscriptionId),
        progress: impl FnMut(&ReplayProgress),
    ) -> Result<ProcessedResult, ContentRepositoryError> {
        Ok(self.engine()?.replay_all(options, on_subscription, progress)?)
    }

    pub fn highest_sequence_number(&self) -> Result<SequenceNumber, ContentRepositoryError> {
        Ok(self.event_store.highest_sequence_number()?)
    }

    /// Query `workspace_name` at one point of the dimension space.
    ///
    /// The subgraph borrows the projected graph, so it is only handed to `f`.
    pub fn subgraph<R>(
        &self,
        workspace_name: &WorkspaceName,
        point: &DimensionSpacePoint,
        visibility: VisibilityConstraints,
        f: impl FnOnce(&ContentSubgraph<'_>) -> R,
    ) -> R {
        self.content_graph
            .read(|graph| f(&graph.subgraph(workspace_name, point, visibility, &self.node_types)))
    }

    pub fn content_graph(&self) -> &ContentGraphReader {
        &self.content_graph
    }

    /// `None` when the URI path projection is not configured.
    pub fn document_uri_paths(&self) -> Option<&DocumentUriPathFinder> {
        self.document_uri_paths.as_ref()
    }

    /// Run a node migration against one workspace, one command at a time.
    pub fn migrate(
        &self,
        workspace_name: &WorkspaceName,
        migration: &NodeMigration,
    ) -> Result<Vec<CommandOutcome>, ContentRepositoryError> {
        let commands = migration
            .commands(workspace_name, &self.content_graph)
            .map_err(CommandError::from)?;
        info!(workspace = %workspace_name, commands = commands.len(), "running node migration");
        commands.iter().map(|command| self.handle(command)).collect()
    }

    fn catch_up_after_commit(&self) {
        let result = match self.catch_up_active() {
            Ok(result) => result,
            Err(err) => {
                error!(repository = %self.id, error = %err, "catch-up after commit failed");
                return;
            }
        };
        for failure in result.errors() {
            warn!(
                subscription = %failure.subscription_id,
                sequence_number = %failure.sequence_number,
                error = %failure.message,
                "projection failed during catch-up"
            );
        }
    }

    fn engine(&self) -> Result<MutexGuard<'_, SubscriptionEngine<ContentEvent>>, ContentRepositoryError> {
        self.engine.lock().map_err(|_| ContentRepositoryError::LockPoisoned)
    }
}
