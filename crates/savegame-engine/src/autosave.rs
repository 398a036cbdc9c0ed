//! Interval-driven autosave.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, warn};

use crate::engine::SaveManager;

/// Triggers an autosave every `autosave_interval` until shut down.
pub struct AutoSaveScheduler {
    engine: Arc<SaveManager>,
    shutdown: watch::Receiver<bool>,
}

impl AutoSaveScheduler {
    pub fn new(engine: Arc<SaveManager>, shutdown: watch::Receiver<bool>) -> Self {
        Self { engine, shutdown }
    }

    /// Run the autosave loop until the shutdown signal.
    ///
    /// The first tick fires one full interval after start.
    pub async fn run(&mut self) {
        let period = self.engine.config().autosave_interval;
        if period.is_zero() {
            warn!("autosave interval is zero, scheduler not started");
            return;
        }
        let mut ticker = interval_at(Instant::now() + period, period);

        debug!(interval_ms = period.as_millis() as u64, "starting autosave scheduler");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        debug!("autosave scheduler received shutdown signal");
                        break;
                    }
                }
            }
        }

        debug!("autosave scheduler stopped");
    }

    async fn tick(&self) {
        let Some(handle) = self.engine.trigger_auto_save("interval") else {
            return;
        };
        match handle.await {
            Ok(true) => debug!("autosave completed"),
            Ok(false) => warn!("autosave failed"),
            Err(e) => warn!(error = %e, "autosave task panicked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use savegame_models::RecordBuilder;
    use savegame_persistence::FileStorage;
    use savegame_validation::StandardValidator;
    use tempfile::tempdir;

    use crate::config::SaveConfig;

    #[tokio::test]
    async fn test_scheduler_saves_after_interval() {
        let dir = tempdir().unwrap();
        let config = SaveConfig::default().with_autosave(true, Duration::from_millis(200));
        let engine = Arc::new(SaveManager::new(
            config,
            Arc::new(FileStorage::new(dir.path())),
            Arc::new(StandardValidator::new()),
        ));
        assert!(
            engine
                .save_game("career", Some(RecordBuilder::new("career").build()))
                .await
        );
        let rx = engine.events().save.subscribe_channel();

        let (tx, shutdown) = watch::channel(false);
        let task_engine = Arc::clone(&engine);
        let handle = tokio::spawn(async move {
            AutoSaveScheduler::new(task_engine, shutdown).run().await;
        });

        // Nothing before the first full interval
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.try_iter().count(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        let completed = rx
            .try_iter()
            .filter(|e| matches!(e, savegame_events::SaveEvent::Completed { .. }))
            .count();
        assert!(completed >= 1);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let dir = tempdir().unwrap();
        let engine = Arc::new(SaveManager::new(
            SaveConfig::default(),
            Arc::new(FileStorage::new(dir.path())),
            Arc::new(StandardValidator::new()),
        ));

        let (tx, shutdown) = watch::channel(false);
        let handle = tokio::spawn(async move {
            AutoSaveScheduler::new(engine, shutdown).run().await;
        });

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
