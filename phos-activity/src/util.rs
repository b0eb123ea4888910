use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Logs the message carried by a caught panic payload
pub(crate) fn log_panic(panic: Box<dyn Any + Send>) {
    if let Some(panic) = panic.downcast_ref::<String>() {
        log::error!(target: "RustPanic", "{}", panic);
    } else if let Some(panic) = panic.downcast_ref::<&str>() {
        log::error!(target: "RustPanic", "{}", panic);
    } else {
        log::error!(target: "RustPanic", "UNKNOWN");
    }
}

/// Run a closure and abort the program if it panics.
///
/// This is generally used to ensure Rust callbacks won't unwind past the JNI boundary, which leads
/// to undefined behaviour.
#[cfg_attr(not(target_os = "android"), allow(dead_code))]
pub(crate) fn abort_on_panic<R>(f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|panic| {
        // Try logging the panic before aborting
        //
        // Just in case our attempt to log a panic could itself cause a panic we use a
        // second catch_unwind here.
        let _ = catch_unwind(AssertUnwindSafe(|| log_panic(panic)));
        std::process::abort();
    })
}
