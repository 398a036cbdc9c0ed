//! Runtime wiring the save engine to its background scheduler.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::autosave::AutoSaveScheduler;
use crate::engine::SaveManager;
use crate::error::RuntimeError;

/// Owns the save engine plus its autosave task.
pub struct SaveRuntime {
    /// The engine shared with consumers.
    engine: Arc<SaveManager>,
    /// Handle to the autosave task.
    scheduler_handle: Option<JoinHandle<()>>,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown signal receiver (for cloning to the scheduler).
    shutdown_rx: watch::Receiver<bool>,
    /// Whether the runtime has been started.
    started: bool,
}

impl SaveRuntime {
    pub fn new(engine: Arc<SaveManager>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            engine,
            scheduler_handle: None,
            shutdown_tx,
            shutdown_rx,
            started: false,
        }
    }

    /// Start the runtime (begins autosaving when enabled).
    pub async fn start(&mut self) -> Result<(), RuntimeError> {
        if self.started {
            return Err(RuntimeError::AlreadyStarted);
        }

        info!("starting save runtime");

        if self.engine.config().autosave_enabled {
            let engine = Arc::clone(&self.engine);
            let shutdown_rx = self.shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                let mut scheduler = AutoSaveScheduler::new(engine, shutdown_rx);
                scheduler.run().await;
            });
            self.scheduler_handle = Some(handle);
        }

        self.started = true;
        debug!("save runtime started");

        Ok(())
    }

    /// Stop the scheduler and make a last bounded save.
    ///
    /// Returns whether the shutdown save succeeded.
    pub async fn shutdown(&mut self) -> Result<bool, RuntimeError> {
        if !self.started {
            return Err(RuntimeError::NotStarted);
        }

        info!("shutting down save runtime");

        self.shutdown_tx.send(true).map_err(|e| {
            RuntimeError::Shutdown(format!("failed to send shutdown signal: {}", e))
        })?;

        if let Some(handle) = self.scheduler_handle.take() {
            debug!("waiting for autosave scheduler to stop");
            handle.await.map_err(|e| {
                RuntimeError::Shutdown(format!("scheduler task panicked: {}", e))
            })?;
        }

        let saved = self.engine.shutdown_save().await;
        self.started = false;

        info!(saved, "save runtime stopped");

        Ok(saved)
    }

    pub fn engine(&self) -> Arc<SaveManager> {
        Arc::clone(&self.engine)
    }

    /// Check if the runtime has been started.
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl Drop for SaveRuntime {
    fn drop(&mut self) {
        // Send shutdown signal if still running
        if self.started {
            let _ = self.shutdown_tx.send(true);
        }
    }
}
