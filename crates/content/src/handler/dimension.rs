use std::sync::Arc;

use escr_core::{DomainError, DomainResult, ExpectedVersion};
use escr_dimension::InterDimensionalVariationGraph;
use escr_events::{Command, CommandHandler, EventsToPublish, StreamName};

use super::constraints::{from_configuration, require_content_stream, require_point};
use crate::commands::{AddDimensionShineThrough, ContentCommand, MoveDimensionSpacePoint};
use crate::events::{ContentEvent, DimensionShineThroughWasAdded, DimensionSpacePointWasMoved};
use crate::read_model::ContentGraphReadModel;

/// Adapts stored content to a changed dimension configuration.
#[derive(Debug, Clone)]
pub struct DimensionSpaceCommandHandler {
    variation_graph: Arc<InterDimensionalVariationGraph>,
}

impl DimensionSpaceCommandHandler {
    pub fn new(variation_graph: Arc<InterDimensionalVariationGraph>) -> Self {
        Self { variation_graph }
    }

    fn move_point(
        &self,
        c: &MoveDimensionSpacePoint,
        read_model: &dyn ContentGraphReadModel,
    ) -> DomainResult<EventsToPublish<ContentEvent>> {
        let (stream, version) = require_content_stream(read_model, &c.workspace_name)?;
        // The source may already be gone from the configuration; the target must exist.
        require_point(&self.variation_graph, &c.target)?;
        if c.source == c.target {
            return Err(DomainError::constraint("source and target dimension space point are the same"));
        }
        let used = read_model.used_dimension_space_points(&stream);
        if used.contains(&c.target) {
            return Err(DomainError::constraint(format!(
                "dimension space point {} already has content",
                c.target
            )));
        }
        Ok(EventsToPublish::new(
            StreamName::for_content_stream(&stream),
            vec![ContentEvent::DimensionSpacePointWasMoved(DimensionSpacePointWasMoved {
                workspace_name: c.workspace_name.clone(),
                content_stream_id: stream,
                source: c.source.clone(),
                target: c.target.clone(),
            })],
            ExpectedVersion::Exact(version),
        ))
    }

    fn add_shine_through(
        &self,
        c: &AddDimensionShineThrough,
        read_model: &dyn ContentGraphReadModel,
    ) -> DomainResult<EventsToPublish<ContentEvent>> {
        let (stream, version) = require_content_stream(read_model, &c.workspace_name)?;
        require_point(&self.variation_graph, &c.source)?;
        require_point(&self.variation_graph, &c.target)?;
        let is_specialization = self
            .variation_graph
            .is_specialization(&c.target, &c.source)
            .map_err(from_configuration)?;
        if !is_specialization {
            return Err(DomainError::constraint(format!(
                "{} is not a specialization of {}",
                c.target, c.source
            )));
        }
        if read_model.used_dimension_space_points(&stream).contains(&c.target) {
            return Err(DomainError::constraint(format!(
                "dimension space point {} already has content",
                c.target
            )));
        }
        Ok(EventsToPublish::new(
            StreamName::for_content_stream(&stream),
            vec![ContentEvent::DimensionShineThroughWasAdded(DimensionShineThroughWasAdded {
                workspace_name: c.workspace_name.clone(),
                content_stream_id: stream,
                source: c.source.clone(),
                target: c.target.clone(),
            })],
            ExpectedVersion::Exact(version),
        ))
    }
}

impl CommandHandler for DimensionSpaceCommandHandler {
    type Cmd = ContentCommand;
    type Ev = ContentEvent;
    type ReadModel = dyn ContentGraphReadModel;
    type Error = DomainError;

    fn can_handle(&self, command: &ContentCommand) -> bool {
        command.is_dimension_space_command()
    }

    fn handle(
        &self,
        command: &Self::Cmd,
        read_model: &Self::ReadModel,
    ) -> DomainResult<EventsToPublish<ContentEvent>> {
        match command {
            ContentCommand::MoveDimensionSpacePoint(c) => self.move_point(c, read_model),
            ContentCommand::AddDimensionShineThrough(c) => self.add_shine_through(c, read_model),
            other => Err(DomainError::validation(format!(
                "{} is not a dimension space command",
                other.command_type()
            ))),
        }
    }
}
