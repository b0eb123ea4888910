//! Thread affinity for the file chooser.
//!
//! Interactive surfaces may only be built and shown on the UI-owning thread.
//! A [`UiDispatcher`] accepts "show a chooser now" requests from any thread and
//! runs them on that thread at the next opportunity.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, trace, warn};

use crate::error::SelectionError;
use crate::rendezvous::Completion;
use crate::util;

/// Posts file choosers to the thread that owns the user interface
pub trait UiDispatcher: Send + Sync {
    /// Schedules a file chooser browsing from `start_dir` on the UI thread.
    ///
    /// Must not block on the chooser: it returns once the request is queued.
    /// The chooser reports its outcome through `completion`.
    fn post_show_dialog(&self, start_dir: &Path, completion: Completion)
        -> Result<(), SelectionError>;

    /// `true` when called on the UI-owning thread
    fn is_ui_thread(&self) -> bool;
}

impl<D: UiDispatcher + ?Sized> UiDispatcher for Arc<D> {
    fn post_show_dialog(
        &self,
        start_dir: &Path,
        completion: Completion,
    ) -> Result<(), SelectionError> {
        (**self).post_show_dialog(start_dir, completion)
    }

    fn is_ui_thread(&self) -> bool {
        (**self).is_ui_thread()
    }
}

/// The interactive file chooser, always invoked on the UI thread.
///
/// An implementation must eventually complete or drop the `completion`
/// (dropping it reports the chooser as dismissed).
pub trait FileDialog: Send + Sync {
    fn show(&self, start_dir: &Path, completion: Completion);
}

impl<F> FileDialog for F
where
    F: Fn(&Path, Completion) + Send + Sync,
{
    fn show(&self, start_dir: &Path, completion: Completion) {
        self(start_dir, completion)
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

enum LooperMsg {
    Run(Task),
    Quit,
}

/// A cheaply clonable handle for posting work to a [`Looper`] thread
#[derive(Clone, Debug)]
pub struct LooperHandle {
    sender: Sender<LooperMsg>,
    thread_id: ThreadId,
}

impl LooperHandle {
    /// Queues `task` to run on the looper thread after any previously posted tasks
    pub fn post<F>(&self, task: F) -> Result<(), SelectionError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(LooperMsg::Run(Box::new(task)))
            .map_err(|_| SelectionError::DispatcherUnavailable("UI looper has quit".to_string()))
    }

    /// `true` when called on the looper thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

/// A single thread that owns the user interface and runs posted tasks one
/// at a time, in the order they were posted.
///
/// A task that panics is logged and the looper moves on to the next one.
/// Dropping the looper quits it after the tasks already queued have run.
#[derive(Debug)]
pub struct Looper {
    handle: LooperHandle,
    thread: Option<JoinHandle<()>>,
}

impl Looper {
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(receiver))?;
        let handle = LooperHandle {
            sender,
            thread_id: thread.thread().id(),
        };
        debug!("Spawned UI looper {name:?}");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> LooperHandle {
        self.handle.clone()
    }

    /// Runs the already queued tasks, then stops the looper thread and waits for it.
    ///
    /// Posting through an outstanding [`LooperHandle`] fails afterwards.
    pub fn quit(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.handle.sender.send(LooperMsg::Quit);
            if thread.join().is_err() {
                warn!("UI looper thread panicked");
            }
        }
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(receiver: Receiver<LooperMsg>) {
    trace!("UI looper running");
    while let Ok(msg) = receiver.recv() {
        match msg {
            LooperMsg::Run(task) => {
                if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    util::log_panic(panic);
                }
            }
            LooperMsg::Quit => break,
        }
    }
    // Tasks posted after the quit are dropped with the receiver, which in
    // turn dismisses any completions they own.
    trace!("UI looper stopped");
}

/// A [`UiDispatcher`] that shows a [`FileDialog`] on a [`Looper`] thread
#[derive(Clone)]
pub struct LooperDispatcher {
    looper: LooperHandle,
    dialog: Arc<dyn FileDialog>,
}

impl LooperDispatcher {
    pub fn new(looper: LooperHandle, dialog: impl FileDialog + 'static) -> Self {
        Self {
            looper,
            dialog: Arc::new(dialog),
        }
    }

    pub fn looper(&self) -> &LooperHandle {
        &self.looper
    }
}

impl std::fmt::Debug for LooperDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LooperDispatcher")
            .field("looper", &self.looper)
            .finish_non_exhaustive()
    }
}

impl UiDispatcher for LooperDispatcher {
    fn post_show_dialog(
        &self,
        start_dir: &Path,
        completion: Completion,
    ) -> Result<(), SelectionError> {
        let dialog = self.dialog.clone();
        let start_dir: PathBuf = start_dir.to_path_buf();
        self.looper.post(move || {
            trace!("Showing file chooser for {start_dir:?}");
            dialog.show(&start_dir, completion);
        })
    }

    fn is_ui_thread(&self) -> bool {
        self.looper.is_current()
    }
}
