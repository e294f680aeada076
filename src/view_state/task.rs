use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;

use super::state::StateHolder;
use crate::model::UiState;

/// Holds at most one running task for a logical source.
///
/// Each start bumps a generation. The bump happens under the state's write
/// lock, and tasks write through [`StateHolder::update_if`] with
/// [`TaskSlot::is_current`], so once a replacement starts the old task can no
/// longer deliver, even if it is mid-poll on another worker.
#[derive(Debug, Default)]
pub struct TaskSlot {
    generation: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub fn is_active(&self) -> bool {
        self.lock_handle()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts a task unless one is still running. Returns the generation of
    /// the started task.
    pub fn start_if_idle<S: UiState>(
        &self,
        state: &StateHolder<S>,
        spawn: impl FnOnce(u64) -> JoinHandle<()>,
    ) -> Option<u64> {
        let mut handle = self.lock_handle();
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return None;
        }
        Some(self.replace_locked(&mut handle, state, spawn))
    }

    /// Cancels the running task, if any, and starts a new one.
    pub fn restart<S: UiState>(
        &self,
        state: &StateHolder<S>,
        spawn: impl FnOnce(u64) -> JoinHandle<()>,
    ) -> u64 {
        let mut handle = self.lock_handle();
        self.replace_locked(&mut handle, state, spawn)
    }

    pub fn cancel<S: UiState>(&self, state: &StateHolder<S>) {
        let mut handle = self.lock_handle();
        self.invalidate(state);
        if let Some(old) = handle.take() {
            old.abort();
        }
    }

    fn replace_locked<S: UiState>(
        &self,
        handle: &mut Option<JoinHandle<()>>,
        state: &StateHolder<S>,
        spawn: impl FnOnce(u64) -> JoinHandle<()>,
    ) -> u64 {
        let generation = self.invalidate(state);
        if let Some(old) = handle.take() {
            old.abort();
        }
        *handle = Some(spawn(generation));
        generation
    }

    fn invalidate<S: UiState>(&self, state: &StateHolder<S>) -> u64 {
        state.fence(|| {
            self.generation.fetch_add(1, Ordering::SeqCst);
        });
        self.generation.load(Ordering::SeqCst)
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
