use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Timer-reset-on-input debouncer.
///
/// Every [`Debouncer::push`] restarts the quiet period. When it elapses with no
/// newer input, the latest value is published, unless it equals the value
/// published last.
#[derive(Debug)]
pub struct Debouncer<T> {
    input: watch::Sender<T>,
    output: watch::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T> Debouncer<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// `initial` counts as already published. Must be called inside a tokio
    /// runtime.
    pub fn spawn(initial: T, quiet: Duration) -> Self {
        let (input, input_rx) = watch::channel(initial.clone());
        let (output_tx, output) = watch::channel(initial);
        let task = tokio::spawn(run(input_rx, output_tx, quiet));
        Self {
            input,
            output,
            task,
        }
    }

    pub fn push(&self, value: T) {
        self.input.send_replace(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.output.clone()
    }

    pub fn latest(&self) -> T {
        self.output.borrow().clone()
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<T>(mut input: watch::Receiver<T>, output: watch::Sender<T>, quiet: Duration)
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    while input.changed().await.is_ok() {
        loop {
            tokio::select! {
                changed = input.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                () = tokio::time::sleep(quiet) => break,
            }
        }

        let value = input.borrow_and_update().clone();
        output.send_if_modified(|published| {
            if *published == value {
                return false;
            }
            *published = value;
            true
        });
    }
}
