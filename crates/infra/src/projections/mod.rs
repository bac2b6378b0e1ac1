//! Projections of the content event stream.
//!
//! Every projection here is disposable: `reset` followed by a replay from the
//! first event rebuilds exactly the same state.

pub mod content_graph;
pub mod document_uri_path;

pub use content_graph::{ContentGraphProjection, ContentGraphReader};
pub use document_uri_path::{
    DocumentNodeInfo, DocumentUriPathFinder, DocumentUriPathProjection, DocumentUriPathStore, ShortcutTarget,
};
