/// Pipeline trait
///
/// Every pipeline owns its backends, loads them lazily and runs one request
/// at a time on the calling thread. [`crate::PipelineWorker`] moves that call
/// onto a blocking worker task.
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::types::PipelineType;
use common::CancellationToken;

pub trait Pipeline: Send {
    type Request: Send + 'static;
    type Output: Send + 'static;

    fn pipeline_type(&self) -> PipelineType;

    /// True when every model the pipeline needs is resident.
    fn is_loaded(&self) -> bool;

    /// Loads every model up front instead of on first use.
    fn load(&mut self) -> Result<()>;

    fn unload(&mut self);

    fn run(
        &mut self,
        request: &Self::Request,
        progress: &mut dyn ProgressSink,
        token: &CancellationToken,
    ) -> Result<Self::Output>;
}
