/// Permission status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (device policy, parental controls)
    Restricted,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Camera permission as seen by the core.
///
/// The request/prompt flow lives with the host application; the session
/// controller only reads the gate before opening hardware.
pub trait PermissionGate: Send + Sync {
    fn camera_permission(&self) -> PermissionStatus;

    fn camera_permission_granted(&self) -> bool {
        self.camera_permission().is_granted()
    }
}

/// Gate backed by a fixed or externally updated status.
#[derive(Debug)]
pub struct StaticPermission {
    status: std::sync::Mutex<PermissionStatus>,
}

impl StaticPermission {
    pub fn new(status: PermissionStatus) -> Self {
        Self {
            status: std::sync::Mutex::new(status),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionStatus::Granted)
    }

    /// Record the outcome of the host's permission prompt.
    pub fn set(&self, status: PermissionStatus) {
        match self.status.lock() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }
}

impl PermissionGate for StaticPermission {
    fn camera_permission(&self) -> PermissionStatus {
        match self.status.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
