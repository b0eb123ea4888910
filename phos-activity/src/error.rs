use thiserror::Error;

/// Why a file selection did not produce a path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("The file chooser was dismissed without a selection")]
    Dismissed,

    #[error("The selection wait was aborted")]
    Aborted,

    #[error("No selection was made within the configured timeout")]
    TimedOut,

    #[error("Another file selection is already in progress")]
    Busy,

    #[error("File selection can't be requested from the UI thread (it would wait on itself)")]
    OnUiThread,

    #[error("The UI dispatcher is unavailable: {0}")]
    DispatcherUnavailable(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Java VM or JNI error, including Java exceptions")]
    JavaError(String),

    #[error("Unknown joypad control: {0}")]
    UnknownControl(String),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

pub type Result<T> = std::result::Result<T, AppError>;

// XXX: we don't want to expose jni-rs in the public API
// so we have an internal error type that we can generally
// use in the bridge and then we can strip the error
// in the frontend of the API.
//
// This way we avoid exposing a public trait implementation for
// `From<jni::errors::Error>`
#[cfg(target_os = "android")]
#[derive(Error, Debug)]
pub(crate) enum InternalAppError {
    #[error("A JNI error")]
    JniError(jni::errors::JniError),
    #[error("A Java Exception was thrown via a JNI method call")]
    JniException(String),
    #[error("A Java VM error")]
    JvmError(jni::errors::Error),
}

#[cfg(target_os = "android")]
pub(crate) type InternalResult<T> = std::result::Result<T, InternalAppError>;

#[cfg(target_os = "android")]
impl From<jni::errors::Error> for InternalAppError {
    fn from(value: jni::errors::Error) -> Self {
        InternalAppError::JvmError(value)
    }
}
#[cfg(target_os = "android")]
impl From<jni::errors::JniError> for InternalAppError {
    fn from(value: jni::errors::JniError) -> Self {
        InternalAppError::JniError(value)
    }
}

#[cfg(target_os = "android")]
impl From<InternalAppError> for AppError {
    fn from(value: InternalAppError) -> Self {
        match value {
            InternalAppError::JniError(err) => AppError::JavaError(err.to_string()),
            InternalAppError::JniException(msg) => AppError::JavaError(msg),
            InternalAppError::JvmError(err) => AppError::JavaError(err.to_string()),
        }
    }
}

#[cfg(target_os = "android")]
impl From<InternalAppError> for SelectionError {
    fn from(value: InternalAppError) -> Self {
        SelectionError::DispatcherUnavailable(value.to_string())
    }
}
