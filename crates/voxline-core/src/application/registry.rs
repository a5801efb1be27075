//! Connection registry: maps each identity to its live link.
//!
//! One registry per channel. Last registration for an identity wins; the
//! link it replaces is closed rather than left dangling.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::domain::identity::{LinkId, PeerIdentity};

use super::ports::PeerLink;

pub type SharedLink = Arc<dyn PeerLink>;

/// Snapshot of registry entries, detached from the registry.
pub type Snapshot = std::vec::IntoIter<(PeerIdentity, SharedLink)>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("registry is shut down")]
    ShutDown,
}

#[derive(Debug, Default)]
struct RegistryState {
    links: HashMap<PeerIdentity, SharedLink>,
    shut_down: bool,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    name: &'static str,
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    /// `name` labels log lines (`"audio"`, `"signal"`).
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Insert or replace the link for `identity`.
    ///
    /// Returns the superseded link, already closed. After [`shutdown`] the
    /// new link is closed and refused.
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn register(
        &self,
        identity: PeerIdentity,
        link: SharedLink,
    ) -> Result<Option<SharedLink>, RegistryError> {
        let link_id = link.id();
        let previous = {
            let mut state = self.write();
            if state.shut_down {
                drop(state);
                link.close();
                return Err(RegistryError::ShutDown);
            }
            state.links.insert(identity.clone(), link)
        };

        match &previous {
            Some(old) if old.id() != link_id => {
                info!(registry = self.name, %identity, old = ?old.id(), new = ?link_id, "Identity re-registered, closing superseded link");
                old.close();
            }
            _ => debug!(registry = self.name, %identity, link = ?link_id, "Registered"),
        }
        Ok(previous)
    }

    /// Remove whatever link `identity` holds. No-op when absent.
    pub fn unregister(&self, identity: &PeerIdentity) -> Option<SharedLink> {
        let removed = self.write().links.remove(identity);
        if removed.is_some() {
            debug!(registry = self.name, %identity, "Unregistered");
        }
        removed
    }

    /// Remove `identity` only if it is still held by `link_id`.
    ///
    /// Returns false when the identity has since been taken by a newer link
    /// (or was never registered).
    pub fn unregister_link(&self, identity: &PeerIdentity, link_id: LinkId) -> bool {
        let mut state = self.write();
        let owned = state
            .links
            .get(identity)
            .is_some_and(|link| link.id() == link_id);
        if owned {
            state.links.remove(identity);
            debug!(registry = self.name, %identity, link = ?link_id, "Unregistered");
        }
        owned
    }

    pub fn lookup(&self, identity: &PeerIdentity) -> Option<SharedLink> {
        self.read().links.get(identity).cloned()
    }

    /// Every registered link except the one owned by `identity`.
    ///
    /// The snapshot is taken now; registrations made while iterating are
    /// not observed.
    pub fn all_except(&self, identity: &PeerIdentity) -> Snapshot {
        let entries: Vec<_> = self
            .read()
            .links
            .iter()
            .filter(|(id, _)| *id != identity)
            .map(|(id, link)| (id.clone(), Arc::clone(link)))
            .collect();
        entries.into_iter()
    }

    /// Registered identities, sorted.
    pub fn identities(&self) -> Vec<PeerIdentity> {
        let mut ids: Vec<_> = self.read().links.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().links.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.read().shut_down
    }

    /// Close and remove every link; refuse registrations from now on.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.write();
            state.shut_down = true;
            state.links.drain().collect()
        };
        for (_, link) in &drained {
            link.close();
        }
        info!(registry = self.name, closed = drained.len(), "Registry shut down");
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
