//! Single-writer façade over a [`crate::store::Store`].
//!
//! All store mutations are expected to flow through one [`Serializer`] so
//! that reads-modify-writes against the same JSON files (counters in
//! particular) never race. The implementation is a single dedicated OS
//! thread pulling closures off an unbuffered channel -- a `run()` call
//! blocks until the worker has picked up the job *and* finished running it.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::mpsc::{self, Receiver, SyncSender},
    thread::JoinHandle,
};

use log::error;

use crate::{store::Store, Error, Result};

type Job = Box<dyn FnOnce(&dyn Store) + Send + 'static>;

enum Message {
    Job(Job, SyncSender<()>),
    Shutdown,
}

/// Serializes access to a [`Store`] through one worker thread.
pub struct Serializer {
    tx: SyncSender<Message>,
    handle: Option<JoinHandle<()>>,
}

impl Serializer {
    pub fn new<S: Store + 'static>(store: S) -> Self {
        let (tx, rx): (SyncSender<Message>, Receiver<Message>) = mpsc::sync_channel(0);
        let handle = std::thread::Builder::new()
            .name("flotilla-serializer".into())
            .spawn(move || Self::worker_loop(store, rx))
            .expect("failed to spawn serializer thread");

        Serializer { tx, handle: Some(handle) }
    }

    fn worker_loop<S: Store>(store: S, rx: Receiver<Message>) {
        for msg in rx {
            match msg {
                Message::Job(job, done) => {
                    let store_ref: &dyn Store = &store;
                    // The job itself catches its own panic and reports it
                    // through the result channel (see `run`); this outer
                    // `catch_unwind` is a second line of defense so that even
                    // a panic escaping that (e.g. while sending the result)
                    // cannot take the worker down.
                    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| job(store_ref))) {
                        error!("serializer worker caught an unhandled panic: {}", panic_message(&panic));
                    }
                    // the caller may have stopped waiting; that's fine.
                    let _ = done.send(());
                }
                Message::Shutdown => break,
            }
        }
    }

    /// Run `f` against the underlying store on the worker thread, blocking
    /// the caller until it completes. If `f` panics, the panic is caught on
    /// the worker (which keeps running and serving later jobs) and surfaced
    /// to *this* caller as `Err(Error::JobPanicked(..))` rather than
    /// re-panicking here -- a caller that can't recover is free to
    /// `.unwrap()`, but one that must (e.g. an HTTP handler) can turn it into
    /// a 500 instead of dropping the connection.
    pub fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Store) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::sync_channel::<std::thread::Result<T>>(1);
        let (done_tx, done_rx) = mpsc::sync_channel(0);
        let job: Job = Box::new(move |store| {
            let outcome = catch_unwind(AssertUnwindSafe(|| f(store)));
            let _ = result_tx.send(outcome);
        });
        self.tx
            .send(Message::Job(job, done_tx))
            .expect("serializer worker thread is gone");
        let _ = done_rx.recv();
        match result_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => Err(Error::JobPanicked(panic_message(&panic))),
            Err(_) => Err(Error::JobPanicked("job produced no result".into())),
        }
    }

    /// Async-friendly wrapper around [`Serializer::run`] for call sites
    /// inside the tokio HTTP server / allocator ticker.
    pub async fn run_async<F, T>(self: std::sync::Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&dyn Store) -> T + Send + 'static,
        T: Send + 'static,
    {
        match tokio::task::spawn_blocking(move || self.run(f)).await {
            Ok(result) => result,
            Err(e) => Err(Error::JobPanicked(format!("serializer worker task panicked: {}", e))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

impl Drop for Serializer {
    fn drop(&mut self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
