//! Worker thread running the round-progress loop.
//!
//! The loop is single-owner state, so it lives on one dedicated thread that
//! ticks it until asked to stop. Shutdown is cooperative: the flag is checked
//! between ticks, the current tick always finishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ebft_consensus::{ConsensusResult, DiagnosticsHandle, SyncManager};
use ebft_core::{BlockEngine, StatusTransport};
use tracing::{error, info};

use crate::error::{NodeError, NodeResult};

/// Handle to a running round-progress thread.
pub struct ValidatorWorker {
    name: String,
    shutdown: Arc<AtomicBool>,
    diagnostics: DiagnosticsHandle,
    handle: Option<JoinHandle<ConsensusResult<()>>>,
}

impl ValidatorWorker {
    /// Moves `sync` onto a new thread named `name` and ticks it every
    /// `tick_interval`.
    pub fn spawn<T, E>(
        name: impl Into<String>,
        mut sync: SyncManager<T, E>,
        tick_interval: Duration,
    ) -> NodeResult<Self>
    where
        T: StatusTransport + 'static,
        E: BlockEngine + 'static,
    {
        let name = name.into();
        let shutdown = Arc::new(AtomicBool::new(false));
        let diagnostics = sync.diagnostics();

        let flag = shutdown.clone();
        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            info!(worker = %thread_name, "Round-progress loop started");
            while !flag.load(Ordering::Acquire) {
                if let Err(e) = sync.tick() {
                    error!(worker = %thread_name, error = %e, "Round-progress loop failed");
                    return Err(e);
                }
                thread::sleep(tick_interval);
            }
            info!(worker = %thread_name, "Round-progress loop stopped");
            Ok(())
        })?;

        Ok(Self {
            name,
            shutdown,
            diagnostics,
            handle: Some(handle),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostics published by the loop.
    pub fn diagnostics(&self) -> DiagnosticsHandle {
        self.diagnostics.clone()
    }

    /// Whether the thread is still ticking.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map_or(false, |h| !h.is_finished())
    }

    /// Asks the loop to stop after the current tick.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Stops the loop and waits for the thread, returning the loop's outcome.
    pub fn stop(mut self) -> NodeResult<()> {
        self.request_shutdown();
        self.join()
    }

    fn join(&mut self) -> NodeResult<()> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result.map_err(NodeError::from),
                Err(_) => Err(NodeError::WorkerPanicked(self.name.clone())),
            },
            None => Ok(()),
        }
    }
}

impl Drop for ValidatorWorker {
    fn drop(&mut self) {
        self.request_shutdown();
        if let Err(e) = self.join() {
            error!(worker = %self.name, error = %e, "Worker ended with an error");
        }
    }
}
