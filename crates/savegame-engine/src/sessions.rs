//! Process-wide save and load sessions.
//!
//! At most one save and one load are in flight at a time. A second request
//! of the same kind is rejected, never queued. Each accepted request gets a
//! guard that releases its session on drop; guards carry the session id so
//! a late finisher never clears a newer session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use savegame_models::{LoadOperation, LoadSession, LoadStrategy, SavePhase, SaveSession};

use crate::error::{Result, SaveError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Session state stays consistent even if a holder panicked
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks the in-flight save and load.
#[derive(Default)]
pub struct OperationSessions {
    next_id: AtomicU64,
    save: Mutex<Option<SaveSession>>,
    load: Mutex<Option<LoadSession>>,
}

impl OperationSessions {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Opens the save session, or `None` if one is already open.
    pub fn try_begin_save(&self, slot: &str) -> Option<SaveGuard<'_>> {
        let mut save = lock(&self.save);
        if save.is_some() {
            return None;
        }
        let id = self.next_id();
        *save = Some(SaveSession::new(id, slot));
        Some(SaveGuard { sessions: self, id })
    }

    /// Opens the load session, or `None` if one is already open.
    pub fn try_begin_load(&self, slot: &str, strategy: LoadStrategy) -> Option<LoadGuard<'_>> {
        let mut load = lock(&self.load);
        if load.is_some() {
            return None;
        }
        let id = self.next_id();
        *load = Some(LoadSession::new(id, slot, strategy));
        Some(LoadGuard { sessions: self, id })
    }

    pub fn is_saving(&self) -> bool {
        lock(&self.save).is_some()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.load).is_some()
    }

    /// True while either a save or a load is in flight.
    pub fn is_busy(&self) -> bool {
        self.is_saving() || self.is_loading()
    }

    pub fn save_session(&self) -> Option<SaveSession> {
        lock(&self.save).clone()
    }

    pub fn load_session(&self) -> Option<LoadSession> {
        lock(&self.load).clone()
    }

    /// Soft-cancels the in-flight load.
    ///
    /// The session is marked cancelled and released at once so a new load
    /// may start; the running pipeline notices at its next phase boundary.
    /// Returns the cancelled session (with its operation before
    /// cancellation) or `None` if nothing was loading.
    pub fn cancel_load(&self) -> Option<LoadSession> {
        let mut load = lock(&self.load);
        let mut session = load.take()?;
        if !session.operation.is_in_progress() {
            *load = Some(session);
            return None;
        }
        session.cancelled = true;
        Some(session)
    }
}

/// Releases the save session on drop.
pub struct SaveGuard<'a> {
    sessions: &'a OperationSessions,
    id: u64,
}

impl SaveGuard<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_phase(&self, phase: SavePhase, progress: f32) {
        if let Some(session) = lock(&self.sessions.save).as_mut() {
            if session.id == self.id {
                session.phase = phase;
                session.progress = progress;
            }
        }
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        let mut save = lock(&self.sessions.save);
        if save.as_ref().map(|s| s.id) == Some(self.id) {
            *save = None;
        }
    }
}

/// Releases the load session on drop and drives its state machine.
pub struct LoadGuard<'a> {
    sessions: &'a OperationSessions,
    id: u64,
}

impl LoadGuard<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    fn with_session<R>(&self, f: impl FnOnce(&mut LoadSession) -> R) -> Option<R> {
        let mut load = lock(&self.sessions.load);
        match load.as_mut() {
            Some(session) if session.id == self.id && !session.cancelled => Some(f(session)),
            _ => None,
        }
    }

    /// True once this load was cancelled or its session replaced.
    pub fn is_cancelled(&self) -> bool {
        self.with_session(|_| ()).is_none()
    }

    /// Moves to `to`, returning the previous operation.
    pub fn transition(&self, to: LoadOperation) -> Result<LoadOperation> {
        self.with_session(|session| {
            let from = session.operation;
            if !from.can_transition_to(to) {
                return Err(SaveError::InvalidTransition { from, to });
            }
            session.operation = to;
            Ok(from)
        })
        .unwrap_or(Err(SaveError::Cancelled))
    }

    pub fn set_progress(&self, progress: f32) {
        self.with_session(|session| session.progress = progress);
    }

    pub fn operation(&self) -> LoadOperation {
        self.with_session(|session| session.operation)
            .unwrap_or(LoadOperation::Cancelled)
    }

    /// Records another attempt and returns the retry count.
    pub fn record_retry(&self) -> u32 {
        self.with_session(|session| {
            session.retry_count += 1;
            session.retry_count
        })
        .unwrap_or(0)
    }

    /// Puts a failed attempt back to the idle state so it can be retried.
    pub fn reset(&self) {
        self.with_session(|session| {
            session.operation = LoadOperation::None;
            session.progress = 0.0;
        });
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        let mut load = lock(&self.sessions.load);
        if load.as_ref().map(|s| s.id) == Some(self.id) {
            *load = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_save_rejected() {
        let sessions = OperationSessions::new();
        let guard = sessions.try_begin_save("a").unwrap();
        assert!(sessions.try_begin_save("b").is_none());
        assert!(sessions.is_saving());

        drop(guard);
        assert!(!sessions.is_saving());
        assert!(sessions.try_begin_save("b").is_some());
    }

    #[test]
    fn test_save_and_load_are_independent() {
        let sessions = OperationSessions::new();
        let _save = sessions.try_begin_save("a").unwrap();
        let _load = sessions.try_begin_load("a", LoadStrategy::Full).unwrap();
        assert!(sessions.is_busy());
        assert!(sessions.try_begin_load("b", LoadStrategy::Lazy).is_none());
    }

    #[test]
    fn test_load_transitions_follow_state_machine() {
        let sessions = OperationSessions::new();
        let guard = sessions.try_begin_load("a", LoadStrategy::Full).unwrap();

        assert_eq!(guard.transition(LoadOperation::Initializing).unwrap(), LoadOperation::None);
        assert!(matches!(
            guard.transition(LoadOperation::Completed),
            Err(SaveError::InvalidTransition { .. })
        ));
        assert_eq!(guard.operation(), LoadOperation::Initializing);

        guard.set_progress(0.5);
        assert_eq!(sessions.load_session().unwrap().progress, 0.5);
    }

    #[test]
    fn test_cancel_releases_and_flags_guard() {
        let sessions = OperationSessions::new();
        let guard = sessions.try_begin_load("career", LoadStrategy::Full).unwrap();
        guard.transition(LoadOperation::Initializing).unwrap();

        let cancelled = sessions.cancel_load().unwrap();
        assert_eq!(cancelled.slot_name, "career");
        assert_eq!(cancelled.operation, LoadOperation::Initializing);
        assert!(cancelled.cancelled);

        assert!(guard.is_cancelled());
        assert!(!sessions.is_loading());
        assert!(matches!(
            guard.transition(LoadOperation::Validating),
            Err(SaveError::Cancelled)
        ));
    }

    #[test]
    fn test_cancel_without_progress_is_noop() {
        let sessions = OperationSessions::new();
        assert!(sessions.cancel_load().is_none());

        let _guard = sessions.try_begin_load("a", LoadStrategy::Full).unwrap();
        // Still idle: nothing to cancel yet
        assert!(sessions.cancel_load().is_none());
        assert!(sessions.is_loading());
    }

    #[test]
    fn test_late_guard_does_not_clear_newer_session() {
        let sessions = OperationSessions::new();
        let old = sessions.try_begin_load("a", LoadStrategy::Full).unwrap();
        old.transition(LoadOperation::Initializing).unwrap();
        sessions.cancel_load().unwrap();

        let new = sessions.try_begin_load("b", LoadStrategy::Full).unwrap();
        drop(old);

        assert!(sessions.is_loading());
        assert_eq!(sessions.load_session().unwrap().slot_name, "b");
        assert!(!new.is_cancelled());
    }

    #[test]
    fn test_retry_count() {
        let sessions = OperationSessions::new();
        let guard = sessions.try_begin_load("a", LoadStrategy::Full).unwrap();
        assert_eq!(guard.record_retry(), 1);
        assert_eq!(guard.record_retry(), 2);
        guard.transition(LoadOperation::Initializing).unwrap();
        guard.reset();
        assert_eq!(guard.operation(), LoadOperation::None);
    }
}
