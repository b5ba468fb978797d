use std::sync::{Arc, RwLock};

/// The bearer credential attached to outbound calls. Shared between the
/// facade (which clears it on a remote 401) and whoever logged the user in.
#[derive(Clone, Default)]
pub struct CredentialSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl CredentialSlot {
    pub fn new(token: Option<String>) -> Self {
        CredentialSlot {
            inner: Arc::new(RwLock::new(token)),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, token: impl Into<String>) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.into());
    }

    pub fn clear(&self) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn is_present(&self) -> bool {
        self.get().is_some()
    }
}

impl std::fmt::Debug for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSlot")
            .field("present", &self.is_present())
            .finish()
    }
}
