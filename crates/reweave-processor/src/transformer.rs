//! Transformer contract

use crate::error::Result;
use crate::processor::Processor;

/// A user-supplied unit of work over the class corpus.
///
/// The engine invokes `apply` once, sequentially, before rounds are
/// computed, and `read` once per transformer in its round's parallel
/// fan-out. Write effects are never invoked directly: they are scheduled
/// from `read` via [`Processor::add_write`] and applied by the engine.
pub trait Transformer: Send + Sync {
    /// Stable identifier, referenced by dependency declarations
    fn id(&self) -> &str;

    /// Declaration hook; only the dependency-declaration operations are
    /// legal here
    fn apply(&self, _processor: &Processor) -> Result<()> {
        Ok(())
    }

    /// Observation hook; request classes, create captures and schedule
    /// writes
    fn read(&self, processor: &Processor) -> Result<()>;
}
