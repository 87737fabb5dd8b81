//! Process registry: tracks every live agent child process so the Run
//! Executor can cancel a run by PID even across an executor restart, and
//! so a periodic sweep can reap processes whose owning task has died
//! without cleaning up. Grounded on `worktree/pool.rs`'s in-use handle
//! map, repurposed from worktree checkouts to child-process handles.

use crate::model::{RunId, WorkOrderId};
use std::collections::HashMap;
use std::sync::Mutex;
use sysinfo::{Pid, System};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessKey {
    pub work_order_id: WorkOrderId,
    pub run_id: RunId,
}

struct ProcessEntry {
    pid: u32,
    cancel_tx: watch::Sender<bool>,
}

/// Process-wide map of live agent children, guarded by a plain `Mutex`
/// since registration/lookup is infrequent compared to the streaming
/// reads it sits next to.
#[derive(Default)]
pub struct ProcessRegistry {
    entries: Mutex<HashMap<ProcessKey, ProcessEntry>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: ProcessKey, pid: u32) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.entries
            .lock()
            .expect("process registry mutex poisoned")
            .insert(key, ProcessEntry { pid, cancel_tx: tx });
        rx
    }

    /// Register a cancel channel before the real pid is known — the
    /// executor doesn't hand one back until after spawn. Placeholder pid
    /// `0` never matches a live process, so [`Self::sweep_stale`] leaves a
    /// still-pending entry alone until [`Self::update_pid`] patches it in.
    pub fn register_pending(&self, key: ProcessKey) -> watch::Receiver<bool> {
        self.register(key, 0)
    }

    /// Patch in the real pid for an entry registered via
    /// [`Self::register_pending`]. A no-op if `key` isn't registered
    /// (already unregistered, or never registered).
    pub fn update_pid(&self, key: ProcessKey, pid: u32) {
        if let Some(entry) = self.entries.lock().expect("process registry mutex poisoned").get_mut(&key) {
            entry.pid = pid;
        }
    }

    pub fn unregister(&self, key: ProcessKey) {
        self.entries
            .lock()
            .expect("process registry mutex poisoned")
            .remove(&key);
    }

    /// Request cancellation of a tracked run. A no-op if the run is not
    /// currently registered (already finished, or never started).
    pub fn cancel(&self, key: ProcessKey) -> bool {
        if let Some(entry) = self
            .entries
            .lock()
            .expect("process registry mutex poisoned")
            .get(&key)
        {
            let _ = entry.cancel_tx.send(true);
            true
        } else {
            false
        }
    }

    /// Sweep for registered PIDs that `sysinfo` no longer sees as running
    /// and drop their registry entries. Intended to be called on a slow
    /// timer by the Run Executor's housekeeping loop, not per-iteration.
    pub fn sweep_stale(&self) -> Vec<ProcessKey> {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        let mut guard = self.entries.lock().expect("process registry mutex poisoned");
        let stale: Vec<ProcessKey> = guard
            .iter()
            .filter(|(_, entry)| system.process(Pid::from_u32(entry.pid)).is_none())
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            guard.remove(key);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("process registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_a_no_op_for_unknown_key() {
        let registry = ProcessRegistry::new();
        let key = ProcessKey { work_order_id: WorkOrderId::new(), run_id: RunId::new() };
        assert!(!registry.cancel(key));
    }

    #[test]
    fn register_then_cancel_signals_the_receiver() {
        let registry = ProcessRegistry::new();
        let key = ProcessKey { work_order_id: WorkOrderId::new(), run_id: RunId::new() };
        let mut rx = registry.register(key, std::process::id());
        assert!(registry.cancel(key));
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn pending_registration_can_be_patched_with_the_real_pid() {
        let registry = ProcessRegistry::new();
        let key = ProcessKey { work_order_id: WorkOrderId::new(), run_id: RunId::new() };
        registry.register_pending(key);
        registry.update_pid(key, std::process::id());
        assert!(registry.cancel(key));
    }

    #[test]
    fn sweep_stale_drops_dead_pids() {
        let registry = ProcessRegistry::new();
        let key = ProcessKey { work_order_id: WorkOrderId::new(), run_id: RunId::new() };
        // A pid vanishingly unlikely to be alive.
        registry.register(key, u32::MAX - 1);
        let stale = registry.sweep_stale();
        assert_eq!(stale, vec![key]);
        assert!(registry.is_empty());
    }
}
