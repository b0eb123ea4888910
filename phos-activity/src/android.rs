//! JNI bridge to `org.phos.phos.PhosActivity`.
//!
//! The Java activity forwards its lifecycle, joypad touches, permission
//! answers and file chooser outcomes to the native methods below, and shows
//! the file chooser when asked via `showFileChooser(long, String)`.
//!
//! A file chooser request crosses the JNI boundary as an opaque `long` token
//! for the request's [`Completion`], which stays parked on the Rust side. The
//! activity hands a token back through either `nativeOnFileSelected` or
//! `nativeOnFileDismissed`; repeats are ignored. Choosers still open when the
//! activity is destroyed are dismissed.

use std::ffi::c_void;
use std::path::Path;
use std::sync::{Arc, Mutex};

use jni::objects::{GlobalRef, JIntArray, JObject, JObjectArray, JString, JValue};
use jni::sys::{jboolean, jint, jlong, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use log::{debug, error, info, warn, LevelFilter};

use crate::error::{AppError, InternalResult, Result, SelectionError};
use crate::input::{InputDispatcher, JoypadButton, KeySink, TouchAction};
use crate::jni_utils::{self, CloneJavaVM};
use crate::permissions::{
    grant_results, Permission, PermissionBackend, PermissionGate, PERMISSION_GRANTED,
};
use crate::rendezvous::Completion;
use crate::tokens::CompletionTokens;
use crate::util::abort_on_panic;
use crate::UiDispatcher;

/// Runtime permissions only exist from Android 6.0 (Marshmallow)
const RUNTIME_PERMISSIONS_SDK: i32 = 23;

static ACTIVITY: Mutex<Option<ActivityBridge>> = Mutex::new(None);
static INPUT: Mutex<Option<InputDispatcher<Box<dyn KeySink + Send>>>> = Mutex::new(None);

struct ActivityBridge {
    dispatcher: JavaDialogDispatcher,
    permissions: PermissionGate<JavaPermissionBackend>,
}

/// The user-visible SDK version of the framework, if it can be read
pub fn sdk_version() -> Option<i32> {
    let prop = android_properties::getprop("ro.build.version.sdk");
    prop.value()?.parse().ok()
}

/// A [`UiDispatcher`] that asks the Java activity to show its file chooser on
/// the main (UI) thread.
#[derive(Debug, Clone)]
pub struct JavaDialogDispatcher {
    jvm: CloneJavaVM,
    activity: GlobalRef,
    tokens: Arc<CompletionTokens>,
}

impl JavaDialogDispatcher {
    fn call_show_file_chooser(&self, token: jlong, start_dir: &Path) -> InternalResult<()> {
        let start_dir = start_dir.to_string_lossy();
        jni_utils::with_attached_env(&self.jvm, |env| {
            let start_dir = env.new_string(start_dir.as_ref())?;
            env.call_method(
                self.activity.as_obj(),
                "showFileChooser",
                "(JLjava/lang/String;)V",
                &[JValue::Long(token), JValue::Object(&start_dir)],
            )?;
            Ok(())
        })
    }

    fn on_main_looper(&self) -> InternalResult<bool> {
        jni_utils::with_attached_env(&self.jvm, |env| {
            let main = env
                .call_static_method(
                    "android/os/Looper",
                    "getMainLooper",
                    "()Landroid/os/Looper;",
                    &[],
                )?
                .l()?;
            let current = env
                .call_static_method("android/os/Looper", "myLooper", "()Landroid/os/Looper;", &[])?
                .l()?;
            if current.is_null() {
                return Ok(false);
            }
            env.is_same_object(&main, &current)
        })
    }
}

impl UiDispatcher for JavaDialogDispatcher {
    fn post_show_dialog(
        &self,
        start_dir: &Path,
        completion: Completion,
    ) -> std::result::Result<(), SelectionError> {
        let token = self.tokens.park(completion)?;
        if let Err(err) = self.call_show_file_chooser(token, start_dir) {
            // showFileChooser threw, so the token never reached the activity
            drop(self.tokens.take(token));
            error!("Failed to show file chooser: {err}");
            return Err(err.into());
        }
        Ok(())
    }

    fn is_ui_thread(&self) -> bool {
        self.on_main_looper().unwrap_or_else(|err| {
            warn!("Failed to query the current looper: {err}");
            false
        })
    }
}

/// Checks and requests permissions through the activity
#[derive(Debug)]
pub struct JavaPermissionBackend {
    jvm: CloneJavaVM,
    activity: GlobalRef,
    sdk_version: Option<i32>,
}

impl PermissionBackend for JavaPermissionBackend {
    fn is_granted(&self, permission: Permission) -> bool {
        if matches!(self.sdk_version, Some(sdk) if sdk < RUNTIME_PERMISSIONS_SDK) {
            return true;
        }
        let result = jni_utils::with_attached_env(&self.jvm, |env| {
            let name = env.new_string(permission.name())?;
            env.call_method(
                self.activity.as_obj(),
                "checkSelfPermission",
                "(Ljava/lang/String;)I",
                &[JValue::Object(&name)],
            )?
            .i()
        });
        match result {
            Ok(status) => status == PERMISSION_GRANTED,
            Err(err) => {
                warn!("Failed to check {permission}: {err}");
                false
            }
        }
    }

    fn request(&self, permissions: &[Permission], request_code: i32) -> Result<()> {
        jni_utils::with_attached_env(&self.jvm, |env| {
            let names = env.new_object_array(
                permissions.len() as jint,
                "java/lang/String",
                JObject::null(),
            )?;
            for (i, permission) in permissions.iter().enumerate() {
                let name = env.new_string(permission.name())?;
                env.set_object_array_element(&names, i as jint, name)?;
            }
            env.call_method(
                self.activity.as_obj(),
                "requestPermissions",
                "([Ljava/lang/String;I)V",
                &[JValue::Object(&names), JValue::Int(request_code)],
            )?;
            Ok(())
        })
        .map_err(AppError::from)
    }
}

/// Returns a dispatcher for the current activity's file chooser, if the
/// activity has been created.
///
/// Each thread that needs file selections builds its own
/// [`SelectionRendezvous`](crate::SelectionRendezvous) on top of it.
pub fn activity_dispatcher() -> Option<JavaDialogDispatcher> {
    ACTIVITY
        .lock()
        .unwrap()
        .as_ref()
        .map(|bridge| bridge.dispatcher.clone())
}

/// Installs the emulator core's key entry points that joypad touches are forwarded to
pub fn set_key_sink(sink: impl KeySink + Send + 'static) {
    let sink: Box<dyn KeySink + Send> = Box::new(sink);
    *INPUT.lock().unwrap() = Some(InputDispatcher::new(sink));
}

/// `true` once all the required permissions have been granted
pub fn permissions_granted() -> bool {
    ACTIVITY
        .lock()
        .unwrap()
        .as_ref()
        .map(|bridge| bridge.permissions.is_granted())
        .unwrap_or(false)
}

fn take_completion(token: jlong) -> Option<Completion> {
    match ACTIVITY.lock().unwrap().as_ref() {
        Some(bridge) => bridge.dispatcher.tokens.take(token),
        None => {
            warn!("Chooser token {token} returned without an attached activity");
            None
        }
    }
}

fn granted_to_jboolean(granted: bool) -> jboolean {
    if granted {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn create_bridge(env: &mut JNIEnv, activity: &JObject) -> InternalResult<ActivityBridge> {
    let jvm = CloneJavaVM::new(env.get_java_vm()?);
    let activity = env.new_global_ref(activity)?;

    unsafe {
        ndk_context::initialize_android_context(
            jvm.get_java_vm_pointer().cast(),
            activity.as_obj().as_raw().cast(),
        );
    }

    Ok(ActivityBridge {
        dispatcher: JavaDialogDispatcher {
            jvm: jvm.clone(),
            activity: activity.clone(),
            tokens: Arc::new(CompletionTokens::new()),
        },
        permissions: PermissionGate::new(JavaPermissionBackend {
            jvm,
            activity,
            sdk_version: sdk_version(),
        }),
    })
}

#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: *mut jni_sys::JavaVM, _reserved: *mut c_void) -> jint {
    android_logger::init_once(
        android_logger::Config::default()
            .with_max_level(LevelFilter::Info)
            .with_tag("phos"),
    );
    jni_sys::JNI_VERSION_1_6
}

/// Called from `onCreate`; returns whether all permissions are already granted
#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeOnCreate(
    mut env: JNIEnv,
    activity: JObject,
) -> jboolean {
    abort_on_panic(|| {
        let mut bridge = match create_bridge(&mut env, &activity) {
            Ok(bridge) => bridge,
            Err(err) => {
                error!("Failed to attach to activity: {err}");
                return JNI_FALSE;
            }
        };
        let granted = match bridge.permissions.check() {
            Ok(state) => {
                debug!("Permission state: {state:?}");
                bridge.permissions.is_granted()
            }
            Err(err) => {
                error!("Failed to request permissions: {err}");
                false
            }
        };
        *ACTIVITY.lock().unwrap() = Some(bridge);
        info!("Activity attached");
        granted_to_jboolean(granted)
    })
}

#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeOnDestroy(
    _env: JNIEnv,
    _activity: JObject,
) {
    abort_on_panic(|| {
        let bridge = ACTIVITY.lock().unwrap().take();
        if let Some(bridge) = bridge {
            let dismissed = bridge.dispatcher.tokens.close();
            if dismissed > 0 {
                info!("Dismissed {dismissed} file chooser(s) left open by the activity");
            }
            unsafe { ndk_context::release_android_context() };
        }
        if let Some(input) = INPUT.lock().unwrap().as_mut() {
            input.release_all();
        }
        info!("Activity detached");
    })
}

#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeOnFileSelected(
    mut env: JNIEnv,
    _activity: JObject,
    token: jlong,
    path: JString,
) {
    abort_on_panic(|| {
        let Some(completion) = take_completion(token) else {
            return;
        };
        match env.get_string(&path) {
            Ok(path) => completion.select(String::from(path)),
            Err(err) => {
                error!("Failed to read selected path: {err}");
                completion.dismiss();
            }
        }
    })
}

#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeOnFileDismissed(
    _env: JNIEnv,
    _activity: JObject,
    token: jlong,
) {
    abort_on_panic(|| {
        if let Some(completion) = take_completion(token) {
            completion.dismiss();
        }
    })
}

/// Called from the joypad buttons' touch listeners; returns whether the touch was consumed
#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeOnTouch(
    _env: JNIEnv,
    _activity: JObject,
    code: jint,
    action: jint,
) -> jboolean {
    abort_on_panic(|| {
        let button = match u8::try_from(code)
            .ok()
            .and_then(|code| JoypadButton::try_from(code).ok())
        {
            Some(button) => button,
            None => {
                warn!("Touch on unknown joypad code {code}");
                return JNI_FALSE;
            }
        };
        match INPUT.lock().unwrap().as_mut() {
            Some(input) if input.on_touch(button, TouchAction::from(action)) => JNI_TRUE,
            Some(_) => JNI_FALSE,
            None => {
                debug!("No key sink installed; dropping {button} touch");
                JNI_FALSE
            }
        }
    })
}

/// Called from `onRequestPermissionsResult`; returns whether all permissions are now granted
#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeOnPermissionsResult(
    mut env: JNIEnv,
    _activity: JObject,
    request_code: jint,
    permissions: JObjectArray,
    grants: JIntArray,
) -> jboolean {
    abort_on_panic(|| {
        let names = match jni_utils::string_array(&mut env, &permissions) {
            Ok(names) => names,
            Err(err) => {
                error!("Failed to read permission names: {err}");
                Vec::new()
            }
        };
        let mut statuses = vec![0; names.len()];
        if let Err(err) = env.get_int_array_region(&grants, 0, &mut statuses) {
            error!("Failed to read permission grants: {err}");
            statuses.iter_mut().for_each(|status| *status = -1);
        }

        let mut activity = ACTIVITY.lock().unwrap();
        let Some(bridge) = activity.as_mut() else {
            warn!("Permission result without an attached activity");
            return JNI_FALSE;
        };
        bridge
            .permissions
            .on_request_result(request_code, grant_results(&names, &statuses));
        granted_to_jboolean(bridge.permissions.is_granted())
    })
}

/// Asks again for permissions the user denied; returns whether all permissions are granted
#[no_mangle]
pub extern "system" fn Java_org_phos_phos_PhosActivity_nativeRetryPermissions(
    _env: JNIEnv,
    _activity: JObject,
) -> jboolean {
    abort_on_panic(|| {
        let mut activity = ACTIVITY.lock().unwrap();
        let Some(bridge) = activity.as_mut() else {
            warn!("Permission retry without an attached activity");
            return JNI_FALSE;
        };
        match bridge.permissions.retry() {
            Ok(state) => debug!("Permission state after retry: {state:?}"),
            Err(err) => error!("Failed to request permissions: {err}"),
        }
        granted_to_jboolean(bridge.permissions.is_granted())
    })
}
