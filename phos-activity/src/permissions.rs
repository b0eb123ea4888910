//! Runtime permission state, driven by the platform's asynchronous grant
//! callbacks instead of a blocking retry loop.

use std::fmt;

use log::{debug, info, warn};

use crate::error::Result;

/// The request code used for the permission request issued by a [`PermissionGate`]
pub const PERMISSION_REQUEST_CODE: i32 = 100;

/// The grant status the platform reports for a granted permission
pub const PERMISSION_GRANTED: i32 = 0;

/// Pairs the platform's parallel name / status arrays for
/// [`PermissionGate::on_request_result`].
///
/// Pairing is by position; a missing name drops only its own status.
pub fn grant_results<'a>(names: &'a [Option<String>], statuses: &[i32]) -> Vec<(&'a str, bool)> {
    names
        .iter()
        .zip(statuses)
        .filter_map(|(name, status)| Some((name.as_deref()?, *status == PERMISSION_GRANTED)))
        .collect()
}

/// The runtime permissions needed to load ROMs and drive the rumble motor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadExternalStorage,
    WriteExternalStorage,
    Vibrate,
}

impl Permission {
    pub const REQUIRED: [Permission; 3] = [
        Permission::ReadExternalStorage,
        Permission::WriteExternalStorage,
        Permission::Vibrate,
    ];

    /// The Android manifest name of the permission
    pub fn name(self) -> &'static str {
        match self {
            Permission::ReadExternalStorage => "android.permission.READ_EXTERNAL_STORAGE",
            Permission::WriteExternalStorage => "android.permission.WRITE_EXTERNAL_STORAGE",
            Permission::Vibrate => "android.permission.VIBRATE",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Permission::REQUIRED
            .into_iter()
            .find(|permission| permission.name() == name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The platform's permission check / request pair
pub trait PermissionBackend {
    fn is_granted(&self, permission: Permission) -> bool;

    /// Asks the user for `permissions`. The answer is delivered later through
    /// [`PermissionGate::on_request_result`] with the same `request_code`.
    fn request(&self, permissions: &[Permission], request_code: i32) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionState {
    Unchecked,
    /// Waiting for the user to answer a request for these permissions
    Pending(Vec<Permission>),
    Granted,
    /// The user refused these permissions
    Denied(Vec<Permission>),
}

/// Tracks whether the required permissions have been granted.
#[derive(Debug)]
pub struct PermissionGate<B> {
    backend: B,
    required: Vec<Permission>,
    state: PermissionState,
}

impl<B: PermissionBackend> PermissionGate<B> {
    pub fn new(backend: B) -> Self {
        Self::with_permissions(backend, Permission::REQUIRED)
    }

    pub fn with_permissions(backend: B, required: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            backend,
            required: required.into_iter().collect(),
            state: PermissionState::Unchecked,
        }
    }

    pub fn state(&self) -> &PermissionState {
        &self.state
    }

    pub fn is_granted(&self) -> bool {
        self.state == PermissionState::Granted
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Checks the required permissions and requests the missing ones.
    ///
    /// Does nothing while a request is already pending.
    pub fn check(&mut self) -> Result<&PermissionState> {
        if let PermissionState::Pending(_) = self.state {
            debug!("Permission request already pending");
            return Ok(&self.state);
        }

        let missing: Vec<Permission> = self
            .required
            .iter()
            .copied()
            .filter(|permission| !self.backend.is_granted(*permission))
            .collect();

        if missing.is_empty() {
            debug!("All required permissions granted");
            self.state = PermissionState::Granted;
        } else {
            info!("Requesting permissions: {missing:?}");
            self.backend.request(&missing, PERMISSION_REQUEST_CODE)?;
            self.state = PermissionState::Pending(missing);
        }
        Ok(&self.state)
    }

    /// Applies the user's answer to a pending request.
    ///
    /// `results` pairs permission names with whether they were granted. An
    /// empty result (the request was interrupted) counts as a refusal.
    /// Answers to other request codes, or when nothing is pending, are ignored.
    pub fn on_request_result<'a>(
        &mut self,
        request_code: i32,
        results: impl IntoIterator<Item = (&'a str, bool)>,
    ) -> &PermissionState {
        if request_code != PERMISSION_REQUEST_CODE {
            debug!("Ignoring result for permission request {request_code}");
            return &self.state;
        }
        let pending = match &self.state {
            PermissionState::Pending(pending) => pending.clone(),
            state => {
                warn!("Ignoring permission result while {state:?}");
                return &self.state;
            }
        };

        let granted: Vec<Permission> = results
            .into_iter()
            .filter(|(_, granted)| *granted)
            .filter_map(|(name, _)| Permission::from_name(name))
            .collect();
        let denied: Vec<Permission> = pending
            .into_iter()
            .filter(|permission| !granted.contains(permission))
            .collect();

        self.state = if denied.is_empty() {
            info!("Permissions granted");
            PermissionState::Granted
        } else {
            warn!("Permissions denied: {denied:?}");
            PermissionState::Denied(denied)
        };
        &self.state
    }

    /// Asks again after the user refused
    pub fn retry(&mut self) -> Result<&PermissionState> {
        if let PermissionState::Denied(_) = self.state {
            self.state = PermissionState::Unchecked;
        }
        self.check()
    }
}
