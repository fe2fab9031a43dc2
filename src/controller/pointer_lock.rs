use crate::model::LockState;

/// Host side of the exclusive-input protocol (browser pointer lock, native cursor grab).
///
/// Both calls are requests only: the outcome arrives later as an
/// `InputEvent::PointerLockChanged` or `InputEvent::PointerLockError`.
pub trait PointerLockHost {
    fn request_pointer_lock(&mut self);
    fn exit_pointer_lock(&mut self);
}

/// Tracks the lock state as reported by the host.
#[derive(Debug, Default)]
pub struct PointerLockSession {
    state: LockState,
}

impl PointerLockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked
    }

    /// Ask the host for the lock. Returns `false` without contacting the host if already locked.
    pub fn request(&mut self, host: &mut dyn PointerLockHost) -> bool {
        if self.is_locked() {
            return false;
        }
        host.request_pointer_lock();
        tracing::debug!("pointer lock requested");
        true
    }

    pub fn release(&mut self, host: &mut dyn PointerLockHost) {
        if self.is_locked() {
            host.exit_pointer_lock();
        }
    }

    /// Host confirmed a grant or a revocation (including user-initiated escape).
    pub fn on_change(&mut self, locked: bool) {
        self.state = if locked { LockState::Locked } else { LockState::Unlocked };
        tracing::info!(state = ?self.state, "pointer lock changed");
    }

    pub fn on_error(&mut self) {
        self.state = LockState::Unlocked;
        tracing::warn!("pointer lock denied by host");
    }
}
