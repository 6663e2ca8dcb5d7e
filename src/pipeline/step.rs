use super::TaskContext;
use crate::errors::Result;

/// One unit of the report pipeline.
///
/// Steps run strictly in order on the same [`TaskContext`]. A step reads what
/// earlier steps produced and must not swallow errors: any `Err` stops the
/// whole task.
pub trait ComputationStep: Send + Sync {
    /// Human-readable description, used in logs and timings.
    fn description(&self) -> &'static str;

    fn execute(&self, ctx: &mut TaskContext) -> Result<()>;
}
