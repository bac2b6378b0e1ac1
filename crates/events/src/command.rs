/// A request to change state.
///
/// Commands are validated against projected state by a command handler, which
/// answers with events (or a rejection). Commands that can be replayed against
/// a different base state are recorded in the metadata of the events they
/// produced, which is why they must be serialisable by the caller.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable command type identifier (e.g. "TagSubtree").
    fn command_type(&self) -> &'static str;
}
