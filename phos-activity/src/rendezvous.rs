//! Blocking handoff of a file selection from the UI thread to the thread that
//! asked for it.
//!
//! A [`SelectionRendezvous`] lets a thread that runs its own blocking loop
//! (such as the emulator thread) ask for a file as though it were a plain
//! function call. The chooser itself is always shown on the UI thread by the
//! [`UiDispatcher`]; the two threads only meet through a single-use request
//! slot created for each call.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::config::ConfigurationRef;
use crate::dispatcher::UiDispatcher;
use crate::error::SelectionError;

/// The value produced by a file chooser once the user is done with it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogOutcome {
    Selected(PathBuf),
    Dismissed,
}

#[derive(Debug)]
enum RequestState {
    Pending,
    Completed(DialogOutcome),
    /// The [`Completion`] was dropped without reporting anything
    Abandoned,
    Aborted,
    TimedOut,
    /// The waiter has consumed the result
    Closed,
}

impl RequestState {
    fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }
}

/// One outstanding ask for a file path.
///
/// Written at most once (by a [`Completion`] or an [`AbortHandle`]) and read
/// once by the waiting caller.
#[derive(Debug)]
pub(crate) struct SelectionRequest {
    state: Mutex<RequestState>,
    cond: Condvar,
}

impl SelectionRequest {
    fn new() -> Self {
        Self {
            state: Mutex::new(RequestState::Pending),
            cond: Condvar::new(),
        }
    }

    /// Moves a pending request into `state` and wakes the waiter.
    ///
    /// Returns `false` if the request had already been resolved.
    fn resolve(&self, state: RequestState) -> bool {
        let mut guard = self.state.lock().unwrap();
        if !guard.is_pending() {
            return false;
        }
        *guard = state;
        self.cond.notify_all();
        true
    }

    fn is_pending(&self) -> bool {
        self.state.lock().unwrap().is_pending()
    }

    fn wait(&self, timeout: Option<Duration>) -> RequestState {
        let mut guard = self.state.lock().unwrap();
        // A timeout too large to express as a deadline never elapses
        match timeout.and_then(|timeout| Instant::now().checked_add(timeout)) {
            None => {
                while guard.is_pending() {
                    guard = self.cond.wait(guard).unwrap();
                }
            }
            Some(deadline) => {
                while guard.is_pending() {
                    let now = Instant::now();
                    if now >= deadline {
                        *guard = RequestState::TimedOut;
                        break;
                    }
                    guard = self.cond.wait_timeout(guard, deadline - now).unwrap().0;
                }
            }
        }
        std::mem::replace(&mut *guard, RequestState::Closed)
    }
}

/// The write half of a selection request, handed to the file chooser.
///
/// Completing consumes the handle so a chooser can report at most one
/// outcome. Dropping a `Completion` without completing it makes the caller
/// return [`SelectionError::Dismissed`], so a chooser that is destroyed
/// (or a UI thread that goes away) never leaves the caller blocked.
#[derive(Debug)]
#[must_use = "dropping a Completion reports the chooser as dismissed"]
pub struct Completion {
    request: Option<Arc<SelectionRequest>>,
}

impl Completion {
    pub(crate) fn new(request: Arc<SelectionRequest>) -> Self {
        Self {
            request: Some(request),
        }
    }

    /// Reports the user's selection back to the waiting caller
    pub fn select(self, path: impl Into<PathBuf>) {
        self.complete(DialogOutcome::Selected(path.into()))
    }

    /// Reports that the chooser was closed without a selection
    pub fn dismiss(self) {
        self.complete(DialogOutcome::Dismissed)
    }

    pub fn complete(mut self, outcome: DialogOutcome) {
        if let Some(request) = self.request.take() {
            trace!("Completing file selection with {outcome:?}");
            if !request.resolve(RequestState::Completed(outcome)) {
                debug!("Discarding file selection outcome; the caller stopped waiting");
            }
        }
    }

    /// `true` once the caller is no longer waiting for this outcome (it was
    /// aborted or timed out)
    pub fn is_abandoned(&self) -> bool {
        match &self.request {
            Some(request) => !request.is_pending(),
            None => true,
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            if request.resolve(RequestState::Abandoned) {
                trace!("File chooser completion dropped without an outcome");
            }
        }
    }
}

type InFlight = Arc<Mutex<Option<Arc<SelectionRequest>>>>;

/// Lets any thread interrupt a blocked [`SelectionRendezvous::request_selection`] call.
#[derive(Clone, Debug)]
pub struct AbortHandle {
    in_flight: InFlight,
}

impl AbortHandle {
    /// Aborts the selection currently in flight, if any.
    ///
    /// The waiting caller returns [`SelectionError::Aborted`]. Returns `true`
    /// if a pending selection was aborted.
    pub fn abort(&self) -> bool {
        let in_flight = self.in_flight.lock().unwrap();
        match in_flight.as_ref() {
            Some(request) => {
                let aborted = request.resolve(RequestState::Aborted);
                if aborted {
                    debug!("Aborted in-flight file selection");
                }
                aborted
            }
            None => false,
        }
    }
}

/// Clears the in-flight slot once the caller stops waiting, even if it unwinds
struct InFlightGuard<'a> {
    in_flight: &'a InFlight,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.in_flight.lock().unwrap() = None;
    }
}

/// Synchronous file selection on top of an asynchronous, UI-thread-bound
/// file chooser.
///
/// Only one selection may be in flight per rendezvous: a concurrent call
/// fails with [`SelectionError::Busy`] instead of racing the first one.
/// Threads that need independent selections should each own a rendezvous.
#[derive(Debug)]
pub struct SelectionRendezvous<D> {
    dispatcher: D,
    config: ConfigurationRef,
    in_flight: InFlight,
}

impl<D: UiDispatcher> SelectionRendezvous<D> {
    pub fn new(dispatcher: D, config: ConfigurationRef) -> Self {
        Self {
            dispatcher,
            config,
            in_flight: Default::default(),
        }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn config(&self) -> &ConfigurationRef {
        &self.config
    }

    /// Creates a handle that can abort a blocked selection from another thread
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            in_flight: self.in_flight.clone(),
        }
    }

    /// `true` while a selection is in flight
    pub fn is_busy(&self) -> bool {
        self.in_flight.lock().unwrap().is_some()
    }

    /// Asks the UI thread to show a file chooser and blocks until it
    /// reports an outcome.
    ///
    /// Returns the selected path exactly as reported by the chooser.
    ///
    /// # Errors
    ///
    /// - [`SelectionError::OnUiThread`] if called on the UI thread, which
    ///   would otherwise wait on itself forever
    /// - [`SelectionError::Busy`] if another selection is in flight
    /// - [`SelectionError::DispatcherUnavailable`] if the chooser couldn't be posted
    /// - [`SelectionError::Dismissed`] if the chooser closed without a selection
    /// - [`SelectionError::Aborted`] if an [`AbortHandle`] interrupted the wait
    /// - [`SelectionError::TimedOut`] if the configured timeout elapsed
    pub fn request_selection(&self) -> Result<PathBuf, SelectionError> {
        if self.dispatcher.is_ui_thread() {
            return Err(SelectionError::OnUiThread);
        }

        let request = Arc::new(SelectionRequest::new());
        let _guard = {
            let mut in_flight = self.in_flight.lock().unwrap();
            if in_flight.is_some() {
                debug!("Rejecting file selection; another one is in flight");
                return Err(SelectionError::Busy);
            }
            *in_flight = Some(request.clone());
            InFlightGuard {
                in_flight: &self.in_flight,
            }
        };

        let start_dir = self.config.start_dir();
        let timeout = self.config.timeout();
        debug!("Requesting file selection from {start_dir:?} (timeout = {timeout:?})");

        self.dispatcher
            .post_show_dialog(&start_dir, Completion::new(request.clone()))?;

        match request.wait(timeout) {
            RequestState::Completed(DialogOutcome::Selected(path)) => {
                debug!("File selected: {path:?}");
                Ok(path)
            }
            RequestState::Completed(DialogOutcome::Dismissed) => Err(SelectionError::Dismissed),
            RequestState::Abandoned => {
                warn!("File chooser went away without an outcome; treating as dismissed");
                Err(SelectionError::Dismissed)
            }
            RequestState::Aborted => Err(SelectionError::Aborted),
            RequestState::TimedOut => {
                warn!("No file selected within {timeout:?}");
                Err(SelectionError::TimedOut)
            }
            RequestState::Pending | RequestState::Closed => {
                unreachable!("file selection wait returned without an outcome")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChooserConfig;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    /// Hands every posted completion to the test instead of a real UI thread
    struct ChannelDispatcher {
        sender: Mutex<mpsc::Sender<(PathBuf, Completion)>>,
        ui_thread: Option<thread::ThreadId>,
    }

    impl UiDispatcher for ChannelDispatcher {
        fn post_show_dialog(
            &self,
            start_dir: &Path,
            completion: Completion,
        ) -> Result<(), SelectionError> {
            self.sender
                .lock()
                .unwrap()
                .send((start_dir.to_path_buf(), completion))
                .map_err(|err| SelectionError::DispatcherUnavailable(err.to_string()))
        }

        fn is_ui_thread(&self) -> bool {
            self.ui_thread == Some(thread::current().id())
        }
    }

    fn rendezvous(
        config: ChooserConfig,
    ) -> (
        Arc<SelectionRendezvous<ChannelDispatcher>>,
        mpsc::Receiver<(PathBuf, Completion)>,
    ) {
        let (sender, receiver) = mpsc::channel();
        let dispatcher = ChannelDispatcher {
            sender: Mutex::new(sender),
            ui_thread: None,
        };
        (
            Arc::new(SelectionRendezvous::new(dispatcher, config.into())),
            receiver,
        )
    }

    #[test]
    fn returns_exact_selected_path() {
        let (rendezvous, requests) =
            rendezvous(ChooserConfig::default().with_start_dir("/storage/emulated/0"));

        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let result = rendezvous.request_selection();
                (result, started.elapsed())
            })
        };

        let (start_dir, completion) = requests.recv().unwrap();
        assert_eq!(start_dir, PathBuf::from("/storage/emulated/0"));
        thread::sleep(Duration::from_millis(20));
        completion.select("/storage/emulated/0/rom.bin");

        let (result, blocked_for) = caller.join().unwrap();
        assert_eq!(result, Ok(PathBuf::from("/storage/emulated/0/rom.bin")));
        assert!(blocked_for >= Duration::from_millis(20));
        assert!(blocked_for < Duration::from_secs(5));
        assert!(!rendezvous.is_busy());
    }

    #[test]
    fn paths_are_not_transformed() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        for path in [
            "/storage/emulated/0/Pokémon Rot (D).gb",
            "relative/rom.gbc",
            "/with trailing space /x ",
            "",
        ] {
            let caller = {
                let rendezvous = rendezvous.clone();
                thread::spawn(move || rendezvous.request_selection())
            };
            let (_, completion) = requests.recv().unwrap();
            completion.select(path);
            assert_eq!(caller.join().unwrap(), Ok(PathBuf::from(path)));
        }
    }

    #[test]
    fn does_not_return_before_completion_runs() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        let completions = Arc::new(AtomicUsize::new(0));

        let caller = {
            let rendezvous = rendezvous.clone();
            let completions = completions.clone();
            thread::spawn(move || {
                let result = rendezvous.request_selection();
                (completions.load(Ordering::SeqCst), result)
            })
        };

        let (_, completion) = requests.recv().unwrap();
        thread::sleep(Duration::from_millis(10));
        completions.fetch_add(1, Ordering::SeqCst);
        completion.select("/rom.gb");

        let (observed, result) = caller.join().unwrap();
        assert!(observed >= 1);
        assert_eq!(result, Ok(PathBuf::from("/rom.gb")));
    }

    #[test]
    fn sequential_requests_do_not_see_stale_results() {
        let (rendezvous, requests) =
            rendezvous(ChooserConfig::default().with_timeout(Duration::from_millis(300)));

        let first = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();
        completion.select("/first.gb");
        assert_eq!(first.join().unwrap(), Ok(PathBuf::from("/first.gb")));

        // The second chooser never answers; the first path must not leak through
        let second = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, pending) = requests.recv().unwrap();
        assert_eq!(second.join().unwrap(), Err(SelectionError::TimedOut));
        assert!(pending.is_abandoned());
        pending.select("/late.gb");
    }

    #[test]
    fn dismissal_resolves_without_hanging() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();
        completion.dismiss();
        assert_eq!(caller.join().unwrap(), Err(SelectionError::Dismissed));
    }

    #[test]
    fn dropped_completion_counts_as_dismissed() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();
        drop(completion);
        assert_eq!(caller.join().unwrap(), Err(SelectionError::Dismissed));
    }

    #[test]
    fn silent_chooser_times_out() {
        let (rendezvous, requests) =
            rendezvous(ChooserConfig::default().with_timeout(Duration::from_millis(50)));
        let started = Instant::now();
        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, _completion) = requests.recv().unwrap();
        assert_eq!(caller.join().unwrap(), Err(SelectionError::TimedOut));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn unrepresentable_timeout_waits_for_the_chooser() {
        let (rendezvous, requests) =
            rendezvous(ChooserConfig::default().with_timeout(Duration::MAX));
        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();
        thread::sleep(Duration::from_millis(10));
        completion.select("/rom.gb");
        assert_eq!(caller.join().unwrap(), Ok(PathBuf::from("/rom.gb")));

        // The request slot must still be usable afterwards
        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();
        completion.dismiss();
        assert_eq!(caller.join().unwrap(), Err(SelectionError::Dismissed));
    }

    #[test]
    fn dropped_completion_is_told_apart_from_dismissal() {
        let dropped = Arc::new(SelectionRequest::new());
        drop(Completion::new(dropped.clone()));
        assert!(matches!(
            dropped.wait(Some(Duration::ZERO)),
            RequestState::Abandoned
        ));

        let dismissed = Arc::new(SelectionRequest::new());
        Completion::new(dismissed.clone()).dismiss();
        assert!(matches!(
            dismissed.wait(Some(Duration::ZERO)),
            RequestState::Completed(DialogOutcome::Dismissed)
        ));
    }

    #[test]
    fn abort_interrupts_wait() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        let abort = rendezvous.abort_handle();
        assert!(!abort.abort());

        let caller = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();
        assert!(abort.abort());
        assert_eq!(caller.join().unwrap(), Err(SelectionError::Aborted));

        assert!(completion.is_abandoned());
        completion.select("/ignored.gb");
        assert!(!rendezvous.is_busy());
    }

    #[test]
    fn concurrent_request_is_rejected() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        let first = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        let (_, completion) = requests.recv().unwrap();

        let second = {
            let rendezvous = rendezvous.clone();
            thread::spawn(move || rendezvous.request_selection())
        };
        assert_eq!(second.join().unwrap(), Err(SelectionError::Busy));

        completion.select("/first.gb");
        assert_eq!(first.join().unwrap(), Ok(PathBuf::from("/first.gb")));
        assert!(requests.try_recv().is_err());
    }

    #[test]
    fn rejects_calls_from_ui_thread() {
        let (sender, _requests) = mpsc::channel();
        let dispatcher = ChannelDispatcher {
            sender: Mutex::new(sender),
            ui_thread: Some(thread::current().id()),
        };
        let rendezvous = SelectionRendezvous::new(dispatcher, ConfigurationRef::default());
        assert_eq!(
            rendezvous.request_selection(),
            Err(SelectionError::OnUiThread)
        );
        assert!(!rendezvous.is_busy());
    }

    #[test]
    fn post_failure_is_reported() {
        let (rendezvous, requests) = rendezvous(ChooserConfig::default());
        drop(requests);
        assert!(matches!(
            rendezvous.request_selection(),
            Err(SelectionError::DispatcherUnavailable(_))
        ));
        assert!(!rendezvous.is_busy());
    }
}
