//! Dry runs of node commands against a throwaway copy of the content graph.
//!
//! ```text
//! base ContentGraph ──clone──> ProjectionRunner<ContentGraph>
//!                                   ▲            │
//!                       apply each  │            │ read model
//!                       event now   │            ▼
//!                              handler.handle(command)
//! ```
//!
//! Every emitted event is applied before the next command runs, so later
//! commands see the effects of earlier ones exactly as they would after a
//! real commit and catch-up. Nothing is persisted; dropping the simulator
//! discards everything.

use escr_core::{DomainError, DomainResult, EventId};
use escr_events::{Command, CommandHandler, Event, EventEnvelope, EventsToPublish, ProjectionError, ProjectionRunner, StreamName};

use crate::commands::ContentCommand;
use crate::events::ContentEvent;
use crate::graph::ContentGraph;
use crate::handler::{DimensionSpaceCommandHandler, NodeAggregateCommandHandler};

/// Events one simulated command produced, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCommit {
    pub command: ContentCommand,
    pub events: EventsToPublish<ContentEvent>,
}

pub struct CommandSimulator {
    node_handler: NodeAggregateCommandHandler,
    dimension_handler: DimensionSpaceCommandHandler,
    runner: ProjectionRunner<ContentGraph>,
    commits: Vec<SimulatedCommit>,
}

impl CommandSimulator {
    pub fn new(
        node_handler: NodeAggregateCommandHandler,
        dimension_handler: DimensionSpaceCommandHandler,
        base: ContentGraph,
    ) -> Self {
        Self {
            node_handler,
            dimension_handler,
            runner: ProjectionRunner::new(base),
            commits: Vec::new(),
        }
    }

    pub fn graph(&self) -> &ContentGraph {
        self.runner.projection()
    }

    /// Apply events that set the stage (forks, workspace switches) without recording them.
    pub fn apply_unrecorded(&mut self, events: &[ContentEvent]) -> Result<(), ProjectionError> {
        for event in events {
            self.apply(event)?;
        }
        Ok(())
    }

    /// Run one command. On success its events are applied and recorded.
    pub fn handle(&mut self, command: &ContentCommand) -> DomainResult<&SimulatedCommit> {
        let read_model = self.runner.projection();
        let events = if self.dimension_handler.can_handle(command) {
            self.dimension_handler.handle(command, read_model)?
        } else if self.node_handler.can_handle(command) {
            self.node_handler.handle(command, read_model)?
        } else {
            return Err(DomainError::validation(format!(
                "{} cannot be simulated",
                command.command_type()
            )));
        };

        for event in &events.events {
            self.apply(event)
                .map_err(|e| DomainError::conflict(format!("simulation failed: {e}")))?;
        }
        self.commits.push(SimulatedCommit {
            command: command.clone(),
            events,
        });
        Ok(&self.commits[self.commits.len() - 1])
    }

    pub fn commits(&self) -> &[SimulatedCommit] {
        &self.commits
    }

    pub fn into_commits(self) -> Vec<SimulatedCommit> {
        self.commits
    }

    fn apply(&mut self, event: &ContentEvent) -> Result<(), ProjectionError> {
        let graph = self.runner.projection();
        let (stream_name, version) = match event.content_stream_id() {
            Some(id) => (
                StreamName::for_content_stream(id),
                graph.content_stream_version(id).map_or(1, |v| v + 1),
            ),
            None => (StreamName::new("Simulation"), 1),
        };
        let envelope = EventEnvelope::new(EventId::new(), event.event_type(), event.clone())
            .in_stream(stream_name, version)
            .at_sequence(self.runner.cursor().next());
        self.runner.apply(&envelope)
    }
}
