//! The single in-memory session slot.
//!
//! All access goes through short closures so the lock is never held across
//! an await. Mutations are keyed by session id: once a session has been
//! cancelled (taken out of the slot) a stale driver can no longer touch its
//! successor.

use parking_lot::Mutex;

use columbus_core::ids::ScanSessionId;
use columbus_core::scan::ScanSession;

use crate::error::ScanError;

#[derive(Default)]
pub struct SessionSlot {
    inner: Mutex<Option<ScanSession>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `session` iff the slot is empty.
    pub fn try_create(&self, session: ScanSession) -> Result<ScanSessionId, ScanError> {
        let mut slot = self.inner.lock();
        if slot.is_some() {
            return Err(ScanError::AlreadyRunning);
        }
        let id = session.scan_session_id.clone();
        *slot = Some(session);
        Ok(id)
    }

    pub fn is_occupied(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Read whatever session is present.
    pub fn read<R>(&self, f: impl FnOnce(&ScanSession) -> R) -> Option<R> {
        self.inner.lock().as_ref().map(f)
    }

    /// Read the session only if it is still `id`.
    pub fn read_session<R>(&self, id: &ScanSessionId, f: impl FnOnce(&ScanSession) -> R) -> Option<R> {
        self.inner
            .lock()
            .as_ref()
            .filter(|s| &s.scan_session_id == id)
            .map(f)
    }

    /// Mutate the session only if it is still `id`.
    pub fn update<R>(&self, id: &ScanSessionId, f: impl FnOnce(&mut ScanSession) -> R) -> Option<R> {
        self.inner
            .lock()
            .as_mut()
            .filter(|s| &s.scan_session_id == id)
            .map(f)
    }

    /// Mutate whatever session is present.
    pub fn update_any<R>(&self, f: impl FnOnce(&mut ScanSession) -> R) -> Option<R> {
        self.inner.lock().as_mut().map(f)
    }

    /// True while `id` occupies the slot with status `running`.
    pub fn is_running(&self, id: &ScanSessionId) -> bool {
        self.read_session(id, ScanSession::is_running).unwrap_or(false)
    }

    /// Clear the slot if it still holds `id`.
    pub fn take(&self, id: &ScanSessionId) -> Option<ScanSession> {
        let mut slot = self.inner.lock();
        if slot.as_ref().is_some_and(|s| &s.scan_session_id == id) {
            slot.take()
        } else {
            None
        }
    }

    pub fn take_any(&self) -> Option<ScanSession> {
        self.inner.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use columbus_core::backend::Product;
    use columbus_core::ids::ProductId;
    use columbus_core::scan::ScanStatus;

    fn session() -> ScanSession {
        let product = Product {
            id: ProductId::from_raw("prod"),
            name: "Acme".into(),
            brand: "Acme".into(),
            domain: None,
        };
        ScanSession::new(ProductId::from_raw("prod"), product, vec![], BTreeMap::new(), 1)
    }

    #[test]
    fn second_create_is_rejected_without_mutation() {
        let slot = SessionSlot::new();
        let first = slot.try_create(session()).unwrap();
        let err = slot.try_create(session()).unwrap_err();
        assert!(matches!(err, ScanError::AlreadyRunning));
        assert_eq!(slot.read(|s| s.scan_session_id.clone()), Some(first));
    }

    #[test]
    fn updates_are_keyed_by_id() {
        let slot = SessionSlot::new();
        let id = slot.try_create(session()).unwrap();
        let stale = ScanSessionId::from_raw("stale");

        assert!(slot.update(&stale, |s| s.skip_wait = true).is_none());
        assert_eq!(slot.read(|s| s.skip_wait), Some(false));
        assert!(slot.update(&id, |s| s.skip_wait = true).is_some());
        assert_eq!(slot.read(|s| s.skip_wait), Some(true));
    }

    #[test]
    fn running_requires_matching_id_and_status() {
        let slot = SessionSlot::new();
        let id = slot.try_create(session()).unwrap();
        assert!(slot.is_running(&id));
        slot.update(&id, |s| s.status = ScanStatus::Error);
        assert!(!slot.is_running(&id));
        assert!(!slot.is_running(&ScanSessionId::from_raw("other")));
    }

    #[test]
    fn take_clears_only_matching_session() {
        let slot = SessionSlot::new();
        let id = slot.try_create(session()).unwrap();
        assert!(slot.take(&ScanSessionId::from_raw("other")).is_none());
        assert!(slot.is_occupied());
        assert!(slot.take(&id).is_some());
        assert!(!slot.is_occupied());
        assert!(slot.take_any().is_none());
    }
}
