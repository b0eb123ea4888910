//! The JNI calls we make from the emulator thread are not part of a Java
//! native method implementation and so we can't assume we have a JNI local
//! frame that is going to unwind and free local references, and we also can't
//! just leave exceptions to get thrown when returning to Java.
//!
//! These utilities help us check + clear exceptions and map them into Rust Errors.

use std::ops::Deref;

use jni::{
    objects::{JObject, JString},
    JavaVM,
};

use crate::error::{InternalAppError, InternalResult};

// TODO: JavaVM should implement Clone
#[derive(Debug)]
pub(crate) struct CloneJavaVM {
    pub jvm: JavaVM,
}
impl Clone for CloneJavaVM {
    fn clone(&self) -> Self {
        Self {
            jvm: unsafe { JavaVM::from_raw(self.jvm.get_java_vm_pointer()).unwrap() },
        }
    }
}
impl CloneJavaVM {
    pub fn new(jvm: JavaVM) -> Self {
        Self { jvm }
    }
}
unsafe impl Send for CloneJavaVM {}
unsafe impl Sync for CloneJavaVM {}

impl Deref for CloneJavaVM {
    type Target = JavaVM;

    fn deref(&self) -> &Self::Target {
        &self.jvm
    }
}

/// Use with `.map_err()` to map `jni::errors::Error::JavaException` into a
/// richer error based on the actual contents of the `JThrowable`
///
/// (The `jni` crate doesn't do that automatically since it's more
/// common to let the exception get thrown when returning to Java)
///
/// This will also clear the exception
pub(crate) fn clear_and_map_exception_to_err(
    env: &mut jni::JNIEnv<'_>,
    err: jni::errors::Error,
) -> InternalAppError {
    if matches!(err, jni::errors::Error::JavaException) {
        let result = env.with_local_frame::<_, _, InternalAppError>(5, |env| {
            let e = env.exception_occurred()?;
            assert!(!e.is_null()); // should only be called after receiving a JavaException Result
            env.exception_clear()?;

            let msg = env
                .call_method(&e, "getMessage", "()Ljava/lang/String;", &[])?
                .l()?;
            if msg.is_null() {
                return Ok(String::from("(no message)"));
            }
            let msg = JString::from(msg);
            let msg: String = env.get_string(&msg)?.into();
            Ok(msg)
        });

        match result {
            Ok(msg) => InternalAppError::JniException(msg),
            Err(err) => InternalAppError::JniException(format!(
                "UNKNOWN (Failed to query JThrowable: {err:?})"
            )),
        }
    } else {
        err.into()
    }
}

/// Runs `f` with a JNI environment attached to the current thread, mapping
/// any Java exception into an [`InternalAppError`]
pub(crate) fn with_attached_env<R>(
    jvm: &CloneJavaVM,
    f: impl FnOnce(&mut jni::JNIEnv<'_>) -> jni::errors::Result<R>,
) -> InternalResult<R> {
    // Attach 'permanently' since the emulator thread keeps calling back into
    // Java for the lifetime of the process
    let mut env = jvm.attach_current_thread_permanently()?;
    env.with_local_frame::<_, _, InternalAppError>(16, |env| {
        f(env).map_err(|err| clear_and_map_exception_to_err(env, err))
    })
}

/// Converts a Java `String[]` into Rust strings, keeping null elements in place
pub(crate) fn string_array(
    env: &mut jni::JNIEnv<'_>,
    array: &jni::objects::JObjectArray<'_>,
) -> jni::errors::Result<Vec<Option<String>>> {
    let len = env.get_array_length(array)?;
    let mut strings = Vec::with_capacity(len as usize);
    for i in 0..len {
        let element: JObject = env.get_object_array_element(array, i)?;
        if element.is_null() {
            strings.push(None);
            continue;
        }
        let element = JString::from(element);
        strings.push(Some(env.get_string(&element)?.into()));
        env.delete_local_ref(element)?;
    }
    Ok(strings)
}
