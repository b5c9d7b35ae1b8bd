//! Which playbook version new analyses run against.
//!
//! The version list always comes fresh from the service. The persisted id is
//! only a hint used when resolving; it never supplies content.

use clauselens_core::{PlaybookVersion, resolve_active};
use clauselens_store::KeyValueStore;
use tracing::{debug, info, warn};

use crate::{PlaybookService, SessionError};

/// Storage key holding the last activated version id.
pub const ACTIVE_VERSION_KEY: &str = "activePlaybookVersionId";

type ChangeListener = Box<dyn Fn(&str) + Send + Sync>;

pub struct VersionResolver<P, K> {
    service: P,
    store: K,
    versions: Vec<PlaybookVersion>,
    active: Option<usize>,
    listener: Option<ChangeListener>,
}

impl<P: PlaybookService, K: KeyValueStore> VersionResolver<P, K> {
    /// Create a resolver with no versions loaded. Call [`load`](Self::load)
    /// before reading the active version.
    pub fn new(service: P, store: K) -> Self {
        Self {
            service,
            store,
            versions: Vec::new(),
            active: None,
            listener: None,
        }
    }

    /// Register the listener told about every activation. Replaces any
    /// previous listener.
    pub fn on_change(&mut self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.listener = Some(Box::new(listener));
    }

    pub fn versions(&self) -> &[PlaybookVersion] {
        &self.versions
    }

    pub fn active(&self) -> Option<&PlaybookVersion> {
        self.active.and_then(|i| self.versions.get(i))
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active().map(|v| v.id.as_str())
    }

    /// Fetch the version list and resolve the active version.
    ///
    /// `preferred` wins if listed, then the persisted id, then the first
    /// version. With an empty list nothing is active and storage is left
    /// alone. A failed fetch changes nothing.
    pub async fn load(&mut self, preferred: Option<&str>) -> Result<(), SessionError> {
        let versions = self.service.list_versions().await?;
        self.versions = versions;
        self.active = None;

        if self.versions.is_empty() {
            info!("no playbook versions available");
            return Ok(());
        }

        let stored = match self.store.get(ACTIVE_VERSION_KEY) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "could not read persisted playbook version");
                None
            }
        };
        let resolved = resolve_active(&self.versions, preferred, stored.as_deref())
            .map(|v| v.id.clone());
        debug!(
            preferred = preferred.unwrap_or("-"),
            stored = stored.as_deref().unwrap_or("-"),
            resolved = resolved.as_deref().unwrap_or("-"),
            "resolved playbook version"
        );
        if let Some(id) = resolved {
            self.activate(&id);
        }
        Ok(())
    }

    /// Make `version_id` active, persist it and notify the listener.
    ///
    /// An id not in the current list is ignored and `false` is returned.
    pub fn activate(&mut self, version_id: &str) -> bool {
        let Some(index) = self.versions.iter().position(|v| v.id == version_id) else {
            debug!(version_id, "ignoring activation of unknown playbook version");
            return false;
        };
        self.active = Some(index);
        if let Err(e) = self.store.set(ACTIVE_VERSION_KEY, version_id) {
            warn!(version_id, error = %e, "could not persist active playbook version");
        }
        info!(version_id, "playbook version activated");
        if let Some(listener) = &self.listener {
            listener(version_id);
        }
        true
    }

    /// Save new playbook content, then reload with the new version preferred.
    ///
    /// If the save succeeds but the reload fails, the error is
    /// [`SessionError::Reload`] and still carries the new id.
    pub async fn create_version(
        &mut self,
        content: &str,
        change_note: Option<&str>,
    ) -> Result<String, SessionError> {
        let version_id = self.service.create_version(content, change_note).await?;
        match self.load(Some(&version_id)).await {
            Ok(()) => Ok(version_id),
            Err(SessionError::Request(source)) => Err(SessionError::Reload { version_id, source }),
            Err(e) => Err(e),
        }
    }

    /// Reindex a version, then reload keeping it active.
    pub async fn reindex(&mut self, version_id: &str) -> Result<(), SessionError> {
        self.service.reindex(version_id).await?;
        self.load(Some(version_id)).await
    }
}
