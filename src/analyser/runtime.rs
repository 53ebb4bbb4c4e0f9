// src/analyser/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::access::request::Request;
use crate::analyser::core::AnalyserCore;
use crate::dispatch::TaskDispatcher;
use crate::errors::Result;

/// Async IO shell around [`AnalyserCore`].
///
/// Consumes requests from the bounded queue one at a time, feeds them into
/// the pure core, and hands ready batches to the dispatcher. Because the
/// dispatcher's execution plans are recorded before the next request is
/// consumed, completions always find an initialised execution counter.
pub struct Analyser<D: TaskDispatcher> {
    core: AnalyserCore,
    request_rx: mpsc::Receiver<Request>,
    dispatcher: D,
}

impl<D: TaskDispatcher> fmt::Debug for Analyser<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<D: TaskDispatcher> Analyser<D> {
    pub fn new(core: AnalyserCore, request_rx: mpsc::Receiver<Request>, dispatcher: D) -> Self {
        Self {
            core,
            request_rx,
            dispatcher,
        }
    }

    /// Main loop: dequeue, step the core, dispatch, repeat until shut down.
    pub async fn run(mut self) -> Result<()> {
        info!("analyser started");

        loop {
            let request = match self.request_rx.recv().await {
                Some(request) => request,
                None => {
                    info!("request queue closed; stopping analyser");
                    break;
                }
            };
            debug!(kind = ?request.kind(), "request received");

            let step = self.core.step(request);

            if !step.dispatch.is_empty() {
                debug!(count = step.dispatch.len(), "dispatching ready tasks");
                let plans = match self.dispatcher.dispatch(step.dispatch).await {
                    Ok(plans) => plans,
                    Err(err) => {
                        error!(error = %err, "dispatcher rejected ready tasks; aborting");
                        self.core.abort_pending("dispatcher failed");
                        return Err(err);
                    }
                };
                self.core.record_execution_plans(plans);
            }

            if !step.keep_running {
                info!("analyser stop requested");
                break;
            }
        }

        // Whoever is still blocked will never be signalled by a later step.
        self.core.abort_pending("request queue closed");
        info!("analyser exiting");
        Ok(())
    }
}
