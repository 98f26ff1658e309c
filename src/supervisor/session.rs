//! The single active-child registry.
//!
//! Exactly one build runs at a time. The launcher sets the reference, the
//! cancellation controller and the result collector clear it; both sides
//! go through one mutex so a child-exit racing a cancellation cannot leave
//! a stale handle behind. This is the explicit session object that replaces
//! a process-global mutable singleton: the orchestrator owns it and hands
//! it to whoever needs to observe the child (including the OS signal
//! handler).

use super::child::ChildHandle;
use crate::errors::LaunchError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct BuildSession {
    active: Mutex<Option<Arc<dyn ChildHandle>>>,
    cancelled: AtomicBool,
}

impl BuildSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned child as the active one.
    ///
    /// Rejected up front if a live child is already registered; a stale
    /// handle whose process has exited is replaced silently.
    pub fn register(&self, child: Arc<dyn ChildHandle>) -> Result<(), LaunchError> {
        let mut slot = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slot.as_ref()
            && existing.is_alive()
        {
            return Err(LaunchError::BuildInProgress {
                pid: existing.id(),
            });
        }
        *slot = Some(child);
        Ok(())
    }

    /// Observe the active child without taking ownership of the slot.
    pub fn active(&self) -> Option<Arc<dyn ChildHandle>> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Clear and return the active child in one step.
    pub fn take(&self) -> Option<Arc<dyn ChildHandle>> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Drop the active reference, if any.
    pub fn clear(&self) {
        self.take();
    }

    /// Record that this session's build was cancelled. Sticky for the rest
    /// of the session so the result collector can report the distinct
    /// outcome.
    pub fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::child::ReadOutcome;
    use crate::supervisor::child::fake::FakeChild;

    #[test]
    fn register_then_observe_then_clear() {
        let session = BuildSession::new();
        let child = Arc::new(FakeChild::new(vec![ReadOutcome::Eof], 0));
        session.register(child.clone()).expect("register");
        assert!(session.active().is_some());
        session.clear();
        assert!(session.active().is_none());
    }

    #[test]
    fn second_live_child_is_rejected_up_front() {
        let session = BuildSession::new();
        let first = Arc::new(FakeChild::new(vec![], 0));
        session.register(first).expect("register");

        let second = Arc::new(FakeChild::new(vec![], 0));
        match session.register(second) {
            Err(LaunchError::BuildInProgress { pid }) => assert_eq!(pid, 7777),
            other => panic!("expected BuildInProgress, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn dead_child_is_replaced_silently() {
        let session = BuildSession::new();
        let stale = Arc::new(FakeChild::new(vec![], 0));
        stale.set_alive(false);
        session.register(stale).expect("register");
        let fresh = Arc::new(FakeChild::new(vec![], 0));
        session.register(fresh).expect("stale handle should be replaced");
    }

    #[test]
    fn cancelled_flag_is_sticky() {
        let session = BuildSession::new();
        assert!(!session.is_cancelled());
        session.mark_cancelled();
        assert!(session.is_cancelled());
        session.clear();
        assert!(session.is_cancelled());
    }
}
