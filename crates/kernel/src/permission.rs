use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::WorldError;

/// Capability to mutate a world or read it with on-demand loading.
///
/// At most one permission per world exists at a time. It is released when dropped.
#[derive(Debug)]
pub struct EditPermission {
    gate: Arc<AtomicBool>,
}

impl Drop for EditPermission {
    fn drop(&mut self) {
        self.gate.store(false, Ordering::Release);
    }
}

/// Hands out the single permission of one world.
#[derive(Debug, Default)]
pub(crate) struct PermissionGate {
    held: Arc<AtomicBool>,
}

impl PermissionGate {
    pub fn acquire(&self) -> Result<EditPermission, WorldError> {
        if self.held.swap(true, Ordering::AcqRel) {
            return Err(WorldError::PermissionAlreadyGranted);
        }
        Ok(EditPermission {
            gate: Arc::clone(&self.held),
        })
    }

    pub fn check(&self, permission: &EditPermission) -> Result<(), WorldError> {
        if Arc::ptr_eq(&self.held, &permission.gate) {
            Ok(())
        } else {
            Err(WorldError::ForeignPermission)
        }
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_holder_released_on_drop() {
        let gate = PermissionGate::default();
        let perm = gate.acquire().unwrap();
        assert!(gate.is_held());
        assert_eq!(gate.acquire().unwrap_err(), WorldError::PermissionAlreadyGranted);
        gate.check(&perm).unwrap();
        drop(perm);
        assert!(!gate.is_held());
        assert!(gate.acquire().is_ok());
    }

    #[test]
    fn foreign_permission_rejected() {
        let a = PermissionGate::default();
        let b = PermissionGate::default();
        let perm = b.acquire().unwrap();
        assert_eq!(a.check(&perm), Err(WorldError::ForeignPermission));
    }
}
