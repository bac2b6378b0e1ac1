//! Workspace commands: content stream lifecycle, publish, rebase and discard.
//!
//! ```text
//! publish(user):   recorded commands of user's stream
//!                    └─ simulate on a copy of the base graph (readdressed to base)
//!                  ─> commits on the base stream, Exact(version) each
//!                  ─> fork base into the user's new stream
//!                  ─> WorkspaceWasPublished, remove the old user stream
//!
//! rebase(user):    fork base into the rebased stream (simulated first)
//!                    └─ replay the recorded commands on it
//!                  ─> fork, replayed commits, WorkspaceWasRebased, remove old stream
//! ```
//!
//! Nothing here applies events to the real projections. Each method returns
//! the batches to commit in order; the command bus commits them.

use std::sync::Arc;

use tracing::{info, warn};

use escr_content::commands::*;
use escr_content::events::*;
use escr_content::{
    CommandSimulator, CommandThatFailed, ContentCommand, ContentEvent, ContentGraphReadModel,
    DimensionSpaceCommandHandler, NodeAggregateCommandHandler, Workspace,
};
use escr_core::{ContentStreamId, DomainError, DomainResult, ExpectedVersion, WorkspaceName};
use escr_events::{Command, EventsToPublish, SequenceNumber, StreamName};

use crate::command_bus::{CommandError, PendingCommit, RebaseFailure};
use crate::event_store::{EventNormalizer, EventStore, EventStreamFilter, EventStreamSelector};
use crate::projections::ContentGraphReader;

pub struct WorkspaceCommandHandler {
    event_store: Arc<dyn EventStore>,
    node_handler: NodeAggregateCommandHandler,
    dimension_handler: DimensionSpaceCommandHandler,
    normalizer: EventNormalizer,
}

impl WorkspaceCommandHandler {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        node_handler: NodeAggregateCommandHandler,
        dimension_handler: DimensionSpaceCommandHandler,
    ) -> Self {
        Self {
            event_store,
            node_handler,
            dimension_handler,
            normalizer: EventNormalizer::new(),
        }
    }

    pub fn can_handle(&self, command: &ContentCommand) -> bool {
        !command.is_rebaseable()
    }

    pub fn handle(&self, command: &ContentCommand, graph: &ContentGraphReader) -> Result<Vec<PendingCommit>, CommandError> {
        match command {
            ContentCommand::CreateRootWorkspace(c) => Ok(create_root_workspace(c, graph)?),
            ContentCommand::CreateWorkspace(c) => Ok(create_workspace(c, graph)?),
            ContentCommand::PublishWorkspace(c) => self.publish(c, graph),
            ContentCommand::RebaseWorkspace(c) => self.rebase(c, graph),
            ContentCommand::DiscardWorkspace(c) => Ok(discard(c, graph)?),
            other => Err(CommandError::ConstraintViolation(DomainError::validation(format!(
                "{} is not a workspace command",
                other.command_type()
            )))),
        }
    }

    fn publish(&self, c: &PublishWorkspace, graph: &ContentGraphReader) -> Result<Vec<PendingCommit>, CommandError> {
        let workspace = require_workspace(graph, &c.workspace_name)?;
        let base = require_base_workspace(graph, &workspace)?;
        let previous = workspace.current_content_stream_id.clone();
        let commands = self.recorded_commands(&previous)?;
        if commands.is_empty() {
            info!(workspace = %c.workspace_name, "nothing to publish");
            return Ok(Vec::new());
        }
        require_new_content_stream(graph, &c.new_content_stream_id)?;
        let previous_version = require_content_stream_version(graph, &previous)?;

        let mut simulator = self.simulator(graph);
        for (sequence_number, command) in &commands {
            let readdressed = command.clone().with_workspace_name(&base.name);
            simulator.handle(&readdressed).map_err(|e| {
                CommandError::ConstraintViolation(DomainError::constraint(format!(
                    "{} (event {sequence_number}) cannot be published to '{}': {e}",
                    command.command_type(),
                    base.name
                )))
            })?;
        }
        let base_version = simulator
            .graph()
            .content_stream_version(&base.current_content_stream_id)
            .ok_or_else(|| missing_content_stream(&base.current_content_stream_id))?;

        let mut commits: Vec<PendingCommit> = simulator.into_commits().into_iter().map(PendingCommit::from).collect();
        commits.push(fork(&c.new_content_stream_id, &base.current_content_stream_id, base_version));
        commits.push(workspace_event(
            &c.workspace_name,
            ContentEvent::WorkspaceWasPublished(WorkspaceWasPublished {
                source_workspace_name: c.workspace_name.clone(),
                target_workspace_name: base.name.clone(),
                new_source_content_stream_id: c.new_content_stream_id.clone(),
                previous_source_content_stream_id: previous.clone(),
            }),
            ExpectedVersion::Any,
        ));
        commits.push(remove(&previous, previous_version));
        info!(
            workspace = %c.workspace_name,
            base = %base.name,
            commands = commands.len(),
            "workspace publish decided"
        );
        Ok(commits)
    }

    fn rebase(&self, c: &RebaseWorkspace, graph: &ContentGraphReader) -> Result<Vec<PendingCommit>, CommandError> {
        let workspace = require_workspace(graph, &c.workspace_name)?;
        let base = require_base_workspace(graph, &workspace)?;
        require_new_content_stream(graph, &c.rebased_content_stream_id)?;
        let base_stream = &base.current_content_stream_id;
        let base_version = require_content_stream_version(graph, base_stream)?;
        let previous = workspace.current_content_stream_id.clone();
        let previous_version = require_content_stream_version(graph, &previous)?;
        let commands = self.recorded_commands(&previous)?;

        let forked = ContentEvent::ContentStreamWasForked(ContentStreamWasForked {
            new_content_stream_id: c.rebased_content_stream_id.clone(),
            source_content_stream_id: base_stream.clone(),
            version_of_source: base_version,
        });
        let mut simulator = self.simulator(graph);
        simulator
            .apply_unrecorded(&[
                forked.clone(),
                ContentEvent::WorkspaceWasRebased(WorkspaceWasRebased {
                    workspace_name: c.workspace_name.clone(),
                    new_content_stream_id: c.rebased_content_stream_id.clone(),
                    previous_content_stream_id: previous.clone(),
                    skipped_commands: Vec::new(),
                }),
            ])
            .map_err(|e| CommandError::ConstraintViolation(DomainError::constraint(format!("rebase simulation failed: {e}"))))?;

        let mut failed = Vec::new();
        for (sequence_number, command) in commands {
            let command = command.with_workspace_name(&c.workspace_name);
            if let Err(e) = simulator.handle(&command) {
                warn!(
                    workspace = %c.workspace_name,
                    command = command.command_type(),
                    sequence_number = %sequence_number,
                    error = %e,
                    "recorded command does not apply on the new base"
                );
                failed.push(CommandThatFailed {
                    sequence_number,
                    command,
                    message: e.to_string(),
                });
            }
        }
        if !failed.is_empty() && c.error_handling_strategy == RebaseErrorHandlingStrategy::Fail {
            return Err(CommandError::Rebase(RebaseFailure {
                workspace_name: c.workspace_name.clone(),
                failed,
            }));
        }

        let mut commits = vec![PendingCommit::new(EventsToPublish::new(
            StreamName::for_content_stream(&c.rebased_content_stream_id),
            vec![forked],
            ExpectedVersion::NO_STREAM,
        ))];
        commits.extend(simulator.into_commits().into_iter().map(PendingCommit::from));
        commits.push(workspace_event(
            &c.workspace_name,
            ContentEvent::WorkspaceWasRebased(WorkspaceWasRebased {
                workspace_name: c.workspace_name.clone(),
                new_content_stream_id: c.rebased_content_stream_id.clone(),
                previous_content_stream_id: previous.clone(),
                skipped_commands: failed,
            }),
            ExpectedVersion::Any,
        ));
        commits.push(remove(&previous, previous_version));
        info!(workspace = %c.workspace_name, base = %base.name, "workspace rebase decided");
        Ok(commits)
    }

    /// Commands recorded on the events of one content stream, in commit order.
    fn recorded_commands(&self, content_stream_id: &ContentStreamId) -> Result<Vec<(SequenceNumber, ContentCommand)>, CommandError> {
        let stored = self.event_store.load(
            &EventStreamSelector::Stream(StreamName::for_content_stream(content_stream_id)),
            &EventStreamFilter::new(),
        )?;
        let mut commands = Vec::new();
        for event in &stored {
            if let Some(command) = self.normalizer.recorded_command::<ContentCommand>(event)? {
                commands.push((event.sequence_number, command));
            }
        }
        Ok(commands)
    }

    fn simulator(&self, graph: &ContentGraphReader) -> CommandSimulator {
        CommandSimulator::new(
            self.node_handler.clone(),
            self.dimension_handler.clone(),
            graph.snapshot(),
        )
    }
}

fn create_root_workspace(c: &CreateRootWorkspace, graph: &dyn ContentGraphReadModel) -> DomainResult<Vec<PendingCommit>> {
    require_no_workspace(graph, &c.workspace_name)?;
    require_new_content_stream(graph, &c.new_content_stream_id)?;
    Ok(vec![
        PendingCommit::new(EventsToPublish::new(
            StreamName::for_content_stream(&c.new_content_stream_id),
            vec![ContentEvent::ContentStreamWasCreated(ContentStreamWasCreated {
                content_stream_id: c.new_content_stream_id.clone(),
            })],
            ExpectedVersion::NO_STREAM,
        )),
        workspace_event(
            &c.workspace_name,
            ContentEvent::RootWorkspaceWasCreated(RootWorkspaceWasCreated {
                workspace_name: c.workspace_name.clone(),
                new_content_stream_id: c.new_content_stream_id.clone(),
            }),
            ExpectedVersion::NO_STREAM,
        ),
    ])
}

fn create_workspace(c: &CreateWorkspace, graph: &dyn ContentGraphReadModel) -> DomainResult<Vec<PendingCommit>> {
    require_no_workspace(graph, &c.workspace_name)?;
    let base = require_workspace(graph, &c.base_workspace_name)?;
    require_new_content_stream(graph, &c.new_content_stream_id)?;
    let base_version = require_content_stream_version(graph, &base.current_content_stream_id)?;
    Ok(vec![
        fork(&c.new_content_stream_id, &base.current_content_stream_id, base_version),
        workspace_event(
            &c.workspace_name,
            ContentEvent::WorkspaceWasCreated(WorkspaceWasCreated {
                workspace_name: c.workspace_name.clone(),
                base_workspace_name: c.base_workspace_name.clone(),
                new_content_stream_id: c.new_content_stream_id.clone(),
            }),
            ExpectedVersion::NO_STREAM,
        ),
    ])
}

fn discard(c: &DiscardWorkspace, graph: &dyn ContentGraphReadModel) -> DomainResult<Vec<PendingCommit>> {
    let workspace = require_workspace(graph, &c.workspace_name)?;
    let base = require_base_workspace(graph, &workspace)?;
    require_new_content_stream(graph, &c.new_content_stream_id)?;
    let base_version = require_content_stream_version(graph, &base.current_content_stream_id)?;
    let previous = workspace.current_content_stream_id;
    let previous_version = require_content_stream_version(graph, &previous)?;
    Ok(vec![
        fork(&c.new_content_stream_id, &base.current_content_stream_id, base_version),
        workspace_event(
            &c.workspace_name,
            ContentEvent::WorkspaceWasDiscarded(WorkspaceWasDiscarded {
                workspace_name: c.workspace_name.clone(),
                new_content_stream_id: c.new_content_stream_id.clone(),
                previous_content_stream_id: previous.clone(),
            }),
            ExpectedVersion::Any,
        ),
        remove(&previous, previous_version),
    ])
}

fn fork(new: &ContentStreamId, source: &ContentStreamId, version_of_source: u64) -> PendingCommit {
    PendingCommit::new(EventsToPublish::new(
        StreamName::for_content_stream(new),
        vec![ContentEvent::ContentStreamWasForked(ContentStreamWasForked {
            new_content_stream_id: new.clone(),
            source_content_stream_id: source.clone(),
            version_of_source,
        })],
        ExpectedVersion::NO_STREAM,
    ))
}

fn remove(content_stream_id: &ContentStreamId, version: u64) -> PendingCommit {
    PendingCommit::new(EventsToPublish::new(
        StreamName::for_content_stream(content_stream_id),
        vec![ContentEvent::ContentStreamWasRemoved(ContentStreamWasRemoved {
            content_stream_id: content_stream_id.clone(),
        })],
        ExpectedVersion::Exact(version),
    ))
}

fn workspace_event(name: &WorkspaceName, event: ContentEvent, expected: ExpectedVersion) -> PendingCommit {
    PendingCommit::new(EventsToPublish::new(StreamName::for_workspace(name), vec![event], expected))
}

fn require_workspace(graph: &dyn ContentGraphReadModel, name: &WorkspaceName) -> DomainResult<Workspace> {
    graph
        .find_workspace(name)
        .ok_or_else(|| DomainError::constraint(format!("workspace '{name}' does not exist")))
}

fn require_no_workspace(graph: &dyn ContentGraphReadModel, name: &WorkspaceName) -> DomainResult<()> {
    match graph.find_workspace(name) {
        Some(_) => Err(DomainError::constraint(format!("workspace '{name}' already exists"))),
        None => Ok(()),
    }
}

fn require_base_workspace(graph: &dyn ContentGraphReadModel, workspace: &Workspace) -> DomainResult<Workspace> {
    let base_name = workspace
        .base_workspace_name
        .as_ref()
        .ok_or_else(|| DomainError::constraint(format!("workspace '{}' has no base workspace", workspace.name)))?;
    require_workspace(graph, base_name)
}

fn require_new_content_stream(graph: &dyn ContentGraphReadModel, id: &ContentStreamId) -> DomainResult<()> {
    match graph.content_stream_version(id) {
        Some(_) => Err(DomainError::constraint(format!("content stream '{id}' already exists"))),
        None => Ok(()),
    }
}

fn require_content_stream_version(graph: &dyn ContentGraphReadModel, id: &ContentStreamId) -> DomainResult<u64> {
    graph
        .content_stream_version(id)
        .ok_or_else(|| missing_content_stream(id))
}

fn missing_content_stream(id: &ContentStreamId) -> DomainError {
    DomainError::constraint(format!("content stream '{id}' does not exist"))
}
