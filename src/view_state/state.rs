use tokio::sync::watch;

use crate::model::UiState;

/// Single-writer holder of a screen state.
///
/// Every mutation is a reducer applied to the latest value under the channel's
/// write lock, so concurrent producers never overwrite each other's fields.
#[derive(Debug)]
pub struct StateHolder<S> {
    tx: watch::Sender<S>,
}

impl<S: UiState> StateHolder<S> {
    pub fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> S {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    pub fn update(&self, reducer: impl FnOnce(S) -> S) {
        self.tx.send_modify(|state| *state = reducer(state.clone()));
    }

    /// Applies `reducer` only if `still_current` holds at the moment of the
    /// write. Returns whether the state changed.
    pub fn update_if(&self, still_current: impl FnOnce() -> bool, reducer: impl FnOnce(S) -> S) -> bool {
        self.tx.send_if_modified(|state| {
            if !still_current() {
                return false;
            }
            *state = reducer(state.clone());
            true
        })
    }

    /// Runs `f` while holding the write lock without notifying subscribers.
    /// Anything `f` does is ordered against all reducer applications.
    pub fn fence(&self, f: impl FnOnce()) {
        self.tx.send_if_modified(|_| {
            f();
            false
        });
    }

    pub fn set_loading(&self) {
        self.update(|s| s.with_loading(true).with_error(None));
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.with_loading(false).with_error(Some(message)));
    }
}
