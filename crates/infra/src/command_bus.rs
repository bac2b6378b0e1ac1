//! Command execution pipeline.
//!
//! ```text
//! ContentCommand
//!   ↓
//! 1. Route: node / dimension handler (one commit) or workspace handler (several)
//!   ↓
//! 2. Decide events against the projected content graph (pure, no IO)
//!   ↓
//! 3. Enrich metadata: correlation id, causation, recorded command
//!   ↓
//! 4. Commit each batch to its stream under the decided expected version
//! ```
//!
//! The bus never applies events itself. Projections only see the new events
//! after the next catch-up, which is the caller's (the repository's) job.
//!
//! ## Error Semantics
//!
//! - **ConstraintViolation**: the command was rejected, nothing was committed
//! - **ConcurrencyConflict**: a commit raced another writer on the same stream;
//!   retry against refreshed state
//! - **Rebase**: a rebase with the `Fail` strategy hit commands that no longer
//!   apply on the new base
//! - **Store**: the event store failed
//!
//! Workspace commands commit several batches in order. A conflict on a later
//! batch leaves the earlier ones committed; the commands are built so that
//! those earlier batches (forks of fresh content streams, node events on the
//! base) are harmless on their own.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use escr_content::{
    CommandThatFailed, ContentCommand, ContentEvent, DimensionSpaceCommandHandler, NodeAggregateCommandHandler,
    SimulatedCommit,
};
use escr_core::{DomainError, EventId, WorkspaceName};
use escr_events::{Command, CommandHandler, EventMetadata, EventsToPublish};

use crate::event_store::{CommitResult, EventNormalizer, EventStore, EventStoreError, UncommittedEvent};
use crate::projections::ContentGraphReader;
use crate::workspace::WorkspaceCommandHandler;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    ConstraintViolation(DomainError),

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error(transparent)]
    Rebase(RebaseFailure),

    #[error(transparent)]
    Store(EventStoreError),
}

impl CommandError {
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, CommandError::ConcurrencyConflict(_))
    }
}

impl From<EventStoreError> for CommandError {
    fn from(value: EventStoreError) -> Self {
        match value {
            conflict @ EventStoreError::Concurrency { .. } => CommandError::ConcurrencyConflict(conflict.to_string()),
            other => CommandError::Store(other),
        }
    }
}

impl From<DomainError> for CommandError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Conflict(msg) => CommandError::ConcurrencyConflict(msg),
            other => CommandError::ConstraintViolation(other),
        }
    }
}

/// Commands of a workspace that no longer apply on its new base.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rebasing workspace '{workspace_name}' failed: {} command(s) could not be applied", failed.len())]
pub struct RebaseFailure {
    pub workspace_name: WorkspaceName,
    pub failed: Vec<CommandThatFailed>,
}

/// One batch to commit, with the command to record on its first event.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommit {
    pub events: EventsToPublish<ContentEvent>,
    pub command: Option<ContentCommand>,
}

impl PendingCommit {
    pub fn new(events: EventsToPublish<ContentEvent>) -> Self {
        Self { events, command: None }
    }

    pub fn recording(events: EventsToPublish<ContentEvent>, command: ContentCommand) -> Self {
        Self {
            events,
            command: Some(command),
        }
    }
}

impl From<SimulatedCommit> for PendingCommit {
    fn from(value: SimulatedCommit) -> Self {
        Self::recording(value.events, value.command)
    }
}

/// What a successful command committed, in commit order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub correlation_id: Option<Uuid>,
    pub commits: Vec<CommitResult>,
}

impl CommandOutcome {
    /// Global position of the last committed event, if anything was committed.
    pub fn last_sequence_number(&self) -> Option<escr_events::SequenceNumber> {
        self.commits.last().map(|commit| commit.sequence_number)
    }
}

pub struct CommandBus {
    event_store: Arc<dyn EventStore>,
    graph: ContentGraphReader,
    node_handler: NodeAggregateCommandHandler,
    dimension_handler: DimensionSpaceCommandHandler,
    workspace_handler: WorkspaceCommandHandler,
    normalizer: EventNormalizer,
}

impl CommandBus {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        graph: ContentGraphReader,
        node_handler: NodeAggregateCommandHandler,
        dimension_handler: DimensionSpaceCommandHandler,
    ) -> Self {
        let workspace_handler =
            WorkspaceCommandHandler::new(event_store.clone(), node_handler.clone(), dimension_handler.clone());
        Self {
            event_store,
            graph,
            node_handler,
            dimension_handler,
            workspace_handler,
            normalizer: EventNormalizer::new(),
        }
    }

    /// Decide and commit one command.
    #[instrument(skip(self, command), fields(command = command.command_type(), workspace = %command.workspace_name()), err)]
    pub fn handle(&self, command: &ContentCommand) -> Result<CommandOutcome, CommandError> {
        let pending = self.decide(command)?;
        let correlation_id = Uuid::now_v7();
        let mut outcome = CommandOutcome {
            correlation_id: Some(correlation_id),
            commits: Vec::with_capacity(pending.len()),
        };
        for commit in pending {
            if commit.events.is_empty() {
                continue;
            }
            outcome.commits.push(self.commit(commit, correlation_id)?);
        }
        debug!(commits = outcome.commits.len(), "command committed");
        Ok(outcome)
    }

    /// [`CommandBus::handle`], retrying concurrency conflicts.
    ///
    /// `refresh` runs before every retry and should bring the content graph
    /// up to date (a catch-up). Other errors are returned immediately.
    pub fn handle_with_retry(
        &self,
        command: &ContentCommand,
        max_attempts: usize,
        mut refresh: impl FnMut() -> Result<(), CommandError>,
    ) -> Result<CommandOutcome, CommandError> {
        let mut attempt = 1;
        loop {
            match self.handle(command) {
                Err(err) if err.is_concurrency_conflict() && attempt < max_attempts => {
                    warn!(attempt, error = %err, "command hit a concurrency conflict, retrying");
                    attempt += 1;
                    refresh()?;
                }
                result => return result,
            }
        }
    }

    fn decide(&self, command: &ContentCommand) -> Result<Vec<PendingCommit>, CommandError> {
        if self.workspace_handler.can_handle(command) {
            return self.workspace_handler.handle(command, &self.graph);
        }
        let events = if self.dimension_handler.can_handle(command) {
            self.dimension_handler.handle(command, &self.graph)?
        } else if self.node_handler.can_handle(command) {
            self.node_handler.handle(command, &self.graph)?
        } else {
            return Err(CommandError::ConstraintViolation(DomainError::validation(format!(
                "no handler for {}",
                command.command_type()
            ))));
        };
        Ok(vec![PendingCommit::recording(events, command.clone())])
    }

    fn commit(&self, commit: PendingCommit, correlation_id: Uuid) -> Result<CommitResult, CommandError> {
        let recorded = commit
            .command
            .as_ref()
            .filter(|command| command.is_rebaseable())
            .map(|command| self.normalizer.record_command(command))
            .transpose()?;

        let EventsToPublish {
            stream_name,
            events,
            expected_version,
        } = commit.events;
        let mut first_event_id: Option<EventId> = None;
        let mut uncommitted = Vec::with_capacity(events.len());
        for event in &events {
            let event_id = EventId::new();
            let mut metadata = EventMetadata::correlated(correlation_id);
            match first_event_id {
                None => {
                    if let Some(recorded) = &recorded {
                        metadata = metadata.with_command(recorded.clone());
                    }
                    first_event_id = Some(event_id);
                }
                Some(cause) => metadata = metadata.with_causation(cause),
            }
            uncommitted.push(UncommittedEvent::from_typed(event_id, event, metadata)?);
        }

        Ok(self.event_store.commit(&stream_name, uncommitted, expected_version)?)
    }
}

#[cfg(test)]
mod tests {
    use escr_core::ExpectedVersion;
    use escr_events::{Projection, StreamName};

    use super::*;
    use crate::event_store::{EventStreamFilter, EventStreamSelector, InMemoryEventStore};
    use crate::projections::ContentGraphProjection;
    use crate::test_support::*;

    struct Harness {
        store: Arc<InMemoryEventStore>,
        projection: ContentGraphProjection,
        bus: CommandBus,
        applied: usize,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryEventStore::new());
            let projection = ContentGraphProjection::new();
            let config = config();
            let graph = Arc::new(config.variation_graph().unwrap());
            let node_types = Arc::new(config.node_type_manager().unwrap());
            let bus = CommandBus::new(
                store.clone(),
                projection.reader(),
                NodeAggregateCommandHandler::new(graph.clone(), node_types),
                DimensionSpaceCommandHandler::new(graph),
            );
            Self {
                store,
                projection,
                bus,
                applied: 0,
            }
        }

        fn handle(&mut self, command: ContentCommand) -> Result<CommandOutcome, CommandError> {
            let outcome = self.bus.handle(&command);
            catch_up(&self.store, &mut self.projection, &mut self.applied);
            outcome
        }
    }

    /// Apply everything committed since `applied`.
    fn catch_up(store: &InMemoryEventStore, projection: &mut ContentGraphProjection, applied: &mut usize) {
        let normalizer = EventNormalizer::new();
        let stored = store
            .load(&EventStreamSelector::All, &EventStreamFilter::new())
            .unwrap();
        for event in &stored[*applied..] {
            let envelope = normalizer.denormalize::<ContentEvent>(event).unwrap();
            projection.apply(&envelope).unwrap();
        }
        *applied = stored.len();
    }

    #[test]
    fn node_commands_record_themselves_on_the_first_event() {
        let mut harness = Harness::new();
        harness.handle(create_root_workspace("cs-live")).unwrap();
        let live = WorkspaceName::live();
        harness.handle(create_root_node(&live, "sites")).unwrap();

        let events = harness
            .store
            .load(
                &EventStreamSelector::Stream(StreamName::for_content_stream(&stream("cs-live"))),
                &EventStreamFilter::new(),
            )
            .unwrap();
        assert_eq!(events.len(), 2);
        // Stream creation is a workspace command and is not recorded.
        assert!(events[0].metadata.command.is_none());
        let recorded = EventNormalizer::new()
            .recorded_command::<ContentCommand>(&events[1])
            .unwrap()
            .unwrap();
        assert_eq!(recorded, create_root_node(&live, "sites"));
    }

    #[test]
    fn commits_of_one_command_share_a_correlation_id() {
        let mut harness = Harness::new();
        let outcome = harness.handle(create_root_workspace("cs-live")).unwrap();
        assert_eq!(outcome.commits.len(), 2);

        let events = harness
            .store
            .load(&EventStreamSelector::All, &EventStreamFilter::new())
            .unwrap();
        assert!(events.iter().all(|e| e.metadata.correlation_id == outcome.correlation_id));
    }

    #[test]
    fn constraint_violations_commit_nothing() {
        let mut harness = Harness::new();
        harness.handle(create_root_workspace("cs-live")).unwrap();
        let before = harness.store.highest_sequence_number().unwrap();

        let err = harness
            .handle(create_node(&WorkspaceName::live(), "page", "missing", "Acme:Page", "page", "page"))
            .unwrap_err();
        assert!(matches!(err, CommandError::ConstraintViolation(_)));
        assert_eq!(harness.store.highest_sequence_number().unwrap(), before);

        let err = harness.handle(create_root_workspace("cs-other")).unwrap_err();
        assert!(matches!(err, CommandError::ConstraintViolation(_)));
    }

    #[test]
    fn a_stale_read_model_surfaces_as_a_conflict_and_retry_succeeds() {
        let mut harness = Harness::new();
        harness.handle(create_root_workspace("cs-live")).unwrap();
        let live = WorkspaceName::live();
        harness.handle(create_root_node(&live, "sites")).unwrap();

        // A second writer commits behind the projection's back.
        harness
            .bus
            .handle(&create_node(&live, "site", "sites", "Cms:Site", "acme", ""))
            .unwrap();
        let err = harness
            .bus
            .handle(&create_node(&live, "other", "sites", "Cms:Site", "other", ""))
            .unwrap_err();
        assert!(err.is_concurrency_conflict());

        let Harness {
            store,
            projection,
            bus,
            applied,
        } = &mut harness;
        let mut refreshes = 0;
        let outcome = bus.handle_with_retry(&create_node(&live, "other", "sites", "Cms:Site", "other", ""), 2, || {
            refreshes += 1;
            catch_up(store, projection, applied);
            Ok(())
        });
        assert_eq!(refreshes, 1);
        assert!(outcome.is_ok());
    }

    #[test]
    fn store_conflicts_map_to_concurrency_conflicts() {
        let err: CommandError = EventStoreError::Concurrency {
            stream: StreamName::new("ContentStream:cs"),
            expected: ExpectedVersion::Exact(1),
            actual: Some(2),
        }
        .into();
        assert!(err.is_concurrency_conflict());

        let err: CommandError = DomainError::constraint("nope").into();
        assert!(matches!(err, CommandError::ConstraintViolation(_)));
    }
}
