//! Glue between the Phos Android shell and the native emulator core.
//!
//! The centrepiece is [`SelectionRendezvous`]: it lets the emulator thread,
//! which runs its own blocking loop, ask for a ROM file as though it were a
//! synchronous call, while the file chooser itself is only ever shown on the
//! UI thread (via a [`UiDispatcher`]).
//!
//! ```no_run
//! use std::path::Path;
//! use phos_activity::{
//!     ChooserConfig, Completion, ConfigurationRef, Looper, LooperDispatcher, SelectionRendezvous,
//! };
//!
//! let looper = Looper::spawn("ui").unwrap();
//! let dispatcher = LooperDispatcher::new(looper.handle(), |start_dir: &Path, completion: Completion| {
//!     // Show a chooser for `start_dir`, then report back from its callback
//!     completion.select(start_dir.join("tetris.gb"));
//! });
//! let rendezvous = SelectionRendezvous::new(dispatcher, ConfigurationRef::new(ChooserConfig::default()));
//!
//! // On the emulator thread:
//! let rom = rendezvous.request_selection();
//! ```
//!
//! The rest of the crate covers the remaining shell duties: forwarding
//! on-screen joypad touches to the core ([`input`]), tracking runtime
//! permissions ([`permissions`]) and a headless directory browsing model for
//! chooser implementations ([`browser`]). On Android the `android` module
//! exposes all of it to the Java activity over JNI.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
pub use config::{ChooserConfig, ConfigurationRef, ROM_EXTENSIONS};

mod error;
pub use error::{AppError, Result, SelectionError};

mod dispatcher;
pub use dispatcher::{FileDialog, Looper, LooperDispatcher, LooperHandle, UiDispatcher};

mod rendezvous;
pub use rendezvous::{AbortHandle, Completion, DialogOutcome, SelectionRendezvous};

mod tokens;
pub use tokens::CompletionTokens;

pub mod browser;
pub mod input;
pub mod permissions;

mod util;

#[cfg(target_os = "android")]
mod jni_utils;

#[cfg_attr(docsrs, doc(cfg(target_os = "android")))]
#[cfg(target_os = "android")]
pub mod android;

#[test]
fn test_handles_are_send_sync() {
    fn needs_send_sync<T: Send + Sync>() {}
    needs_send_sync::<SelectionRendezvous<LooperDispatcher>>();
    needs_send_sync::<LooperHandle>();
    needs_send_sync::<AbortHandle>();
    needs_send_sync::<ConfigurationRef>();
    needs_send_sync::<CompletionTokens>();

    fn needs_send<T: Send>() {}
    needs_send::<Completion>();
}
