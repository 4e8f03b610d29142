//! Owning-thread dispatch.
//!
//! The positioning service must only be touched from one thread. That
//! thread runs a [`Looper`]; every other thread holds a [`Dispatcher`] and
//! submits closures which the looper runs in FIFO order.
//!
//! A `Dispatcher` can only be obtained together with its `Looper`, so there
//! is no way to submit work before the owning thread has been chosen.

use std::cell::Cell;
use std::io;
use std::marker::PhantomData;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::Error;

/// Unit of work executed on the owning thread.
pub type Task = Box<dyn FnOnce() -> Result<(), Error> + Send + 'static>;

enum Message {
    Run(Task),
    Quit,
}

thread_local! {
    static LOOPER_BOUND: Cell<bool> = const { Cell::new(false) };
}

/// The owning thread's task queue.
///
/// Not `Send`: a looper stays on the thread that created it.
pub struct Looper {
    rx: mpsc::UnboundedReceiver<Message>,
    owner: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl Looper {
    /// Bind a looper to the current thread.
    ///
    /// # Panics
    ///
    /// Panics if the current thread already has a live looper.
    pub fn prepare() -> (Looper, Dispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let looper = Self::bind(rx);
        let dispatcher = Dispatcher {
            tx,
            owner: looper.owner,
        };
        (looper, dispatcher)
    }

    /// Start a named owning thread running a looper.
    ///
    /// Work can be submitted immediately; it runs once the thread is up.
    /// The join handle yields the result of [`Looper::run`].
    pub fn spawn(
        name: impl Into<String>,
    ) -> io::Result<(Dispatcher, JoinHandle<Result<(), Error>>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || Self::bind(rx).run())?;

        let dispatcher = Dispatcher {
            tx,
            owner: handle.thread().id(),
        };
        Ok((dispatcher, handle))
    }

    fn bind(rx: mpsc::UnboundedReceiver<Message>) -> Looper {
        let owner = thread::current().id();
        LOOPER_BOUND.with(|bound| {
            assert!(
                !bound.get(),
                "a looper is already bound to thread {owner:?}"
            );
            bound.set(true);
        });
        debug!(?owner, "looper bound");

        Looper {
            rx,
            owner,
            _not_send: PhantomData,
        }
    }

    /// Run tasks until [`Dispatcher::quit`] is processed or every dispatcher
    /// is dropped.
    ///
    /// A failing task is logged and the loop keeps running, so later tasks
    /// (a retried provider change, the final unsubscribe) still get their
    /// turn. The first failure is returned once the loop stops.
    ///
    /// Must not be called from inside an async runtime.
    pub fn run(mut self) -> Result<(), Error> {
        info!(owner = ?self.owner, "looper running");
        let mut first_failure = None;
        while let Some(message) = self.rx.blocking_recv() {
            match message {
                Message::Run(task) => {
                    if let Err(e) = task() {
                        error!("owning-thread task failed: {}", e);
                        if first_failure.is_none() {
                            first_failure = Some(e);
                        }
                    }
                }
                Message::Quit => {
                    debug!("looper quit requested");
                    break;
                }
            }
        }
        info!(owner = ?self.owner, "looper stopped");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run every task queued right now, including tasks those tasks queue.
    ///
    /// Returns the number of tasks executed. Stops early at a quit request
    /// or at the first failing task.
    pub fn run_until_idle(&mut self) -> Result<usize, Error> {
        let mut executed = 0;
        while let Ok(message) = self.rx.try_recv() {
            match message {
                Message::Run(task) => {
                    executed += 1;
                    task()?;
                }
                Message::Quit => break,
            }
        }
        Ok(executed)
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        if thread::current().id() == self.owner {
            LOOPER_BOUND.with(|bound| bound.set(false));
        }
    }
}

/// Cloneable handle that marshals work onto the owning thread.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Message>,
    owner: ThreadId,
}

impl Dispatcher {
    /// Queue `task` for the owning thread. Never blocks.
    pub fn submit<F>(&self, task: F) -> Result<(), Error>
    where
        F: FnOnce() -> Result<(), Error> + Send + 'static,
    {
        self.tx
            .send(Message::Run(Box::new(task)))
            .map_err(|_| Error::DispatcherClosed)
    }

    /// Ask the looper to stop after the tasks already queued.
    pub fn quit(&self) -> Result<(), Error> {
        self.tx
            .send(Message::Quit)
            .map_err(|_| Error::DispatcherClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owning_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// # Panics
    ///
    /// Panics when called from any thread other than the owning thread.
    pub fn assert_owning_thread(&self, operation: &str) {
        assert!(
            self.is_owning_thread(),
            "{operation} must run on the owning thread {:?}, called from {:?}",
            self.owner,
            thread::current().id()
        );
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Run(_) => write!(f, "Run(..)"),
            Message::Quit => write!(f, "Quit"),
        }
    }
}
