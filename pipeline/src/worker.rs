//! Runs pipeline requests on blocking worker tasks.
//!
//! The caller keeps a [`GenerationHandle`]: it streams progress, cancels the
//! run through its token, and awaits the result without ever blocking the
//! async runtime.

use crate::base::Pipeline;
use crate::error::{PipelineError, Result};
use crate::progress::Progress;
use common::CancellationToken;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

pub struct PipelineWorker<P> {
    pipeline: Arc<Mutex<P>>,
}

impl<P> Clone for PipelineWorker<P> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<P: Pipeline + 'static> PipelineWorker<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// Queues `request` behind any run already holding the pipeline.
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: P::Request) -> GenerationHandle<P::Output> {
        let token = CancellationToken::new();
        let (sender, receiver) = unbounded_channel::<Progress>();
        let pipeline = Arc::clone(&self.pipeline);
        let task_token = token.clone();

        let task = tokio::task::spawn_blocking(move || {
            let mut pipeline = pipeline
                .lock()
                .map_err(|_| PipelineError::Worker("pipeline lock poisoned".to_string()))?;
            log::debug!("Worker picked up {} request", pipeline.pipeline_type());
            // A dropped receiver only means nobody is watching.
            let mut sink = move |progress: Progress| {
                let _ = sender.send(progress);
            };
            let result = pipeline.run(&request, &mut sink, &task_token);
            if let Err(e) = &result {
                if e.is_cancelled() {
                    log::info!("{} request cancelled", pipeline.pipeline_type());
                } else {
                    log::warn!("{} request failed: {}", pipeline.pipeline_type(), e);
                }
            }
            result
        });

        GenerationHandle {
            token,
            progress: receiver,
            task,
        }
    }

    /// Runs `f` against the pipeline once no request holds it.
    pub async fn with_pipeline<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut P) -> R + Send + 'static,
        R: Send + 'static,
    {
        let pipeline = Arc::clone(&self.pipeline);
        tokio::task::spawn_blocking(move || {
            let mut pipeline = pipeline
                .lock()
                .map_err(|_| PipelineError::Worker("pipeline lock poisoned".to_string()))?;
            Ok(f(&mut pipeline))
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?
    }
}

pub struct GenerationHandle<T> {
    token: CancellationToken,
    progress: UnboundedReceiver<Progress>,
    task: JoinHandle<Result<T>>,
}

impl<T> GenerationHandle<T> {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Next progress report; `None` once the run has finished.
    pub async fn next_progress(&mut self) -> Option<Progress> {
        self.progress.recv().await
    }

    pub async fn join(self) -> Result<T> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(PipelineError::Worker(e.to_string())),
        }
    }
}
