//! The working set of one document.
//!
//! A session is created per request, loads every model object of its document
//! from the store, and can prune, serialize or mutate them. Mutations are
//! write-through: the store is updated before the working set.
//!
//! ```text
//! Unloaded → Loading → Loaded ⇄ Pruned
//!               ↓
//!             Error (terminal)
//! ```
//!
//! Sessions are not synchronized with each other. Two sessions saving the
//! same document race and the last write wins.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use model_store::{keys, ModelStore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::access::Access;
use crate::types::{BroadcastModel, Document, ModelId, ModelObject, ModelRef, StoredModel};
use crate::{DocError, DocResult};

/// Lifecycle state of a [`DocumentSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Loading,
    Loaded,
    Pruned,
    Error,
}

/// Outcome of a [`DocumentSession::prune`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Objects that were unreachable from the root and left the working set.
    pub removed: Vec<ModelId>,
    /// References to objects absent from the working set, as `(holder, target)`.
    pub dangling: Vec<(ModelId, ModelRef)>,
    /// Removed objects whose store record could not be deleted.
    pub delete_failures: usize,
}

/// Per-request view of a document's model graph.
pub struct DocumentSession<S> {
    store: Arc<S>,
    document: Document,
    access: Access,
    state: SessionState,
    models: BTreeMap<ModelId, ModelObject>,
}

impl<S: ModelStore> DocumentSession<S> {
    /// Creates an unloaded session for `document` with the caller's granted access.
    pub fn new(store: Arc<S>, document: Document, access: Access) -> Self {
        Self {
            store,
            document,
            access,
            state: SessionState::Unloaded,
            models: BTreeMap::new(),
        }
    }

    /// Creates a loaded session for a brand-new document holding only `root`.
    ///
    /// Nothing is persisted until [`save`](Self::save) is called.
    pub(crate) fn fresh(store: Arc<S>, document: Document, root: ModelObject) -> Self {
        let mut models = BTreeMap::new();
        models.insert(root.id.clone(), root);
        Self {
            store,
            document,
            access: Access::Write,
            state: SessionState::Loaded,
            models,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn root(&self) -> &ModelRef {
        &self.document.plot_context_ref
    }

    /// Object in the working set.
    pub fn get(&self, id: &ModelId) -> Option<&ModelObject> {
        self.models.get(id)
    }

    /// Every object in the working set, ordered by id.
    pub fn models(&self) -> impl Iterator<Item = &ModelObject> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Populate the working set from the store.
    ///
    /// Undecodable records are skipped with a warning. Any store failure moves
    /// the session to [`SessionState::Error`] for good. Loading again discards
    /// the current working set.
    pub fn load(&mut self) -> DocResult<usize> {
        if self.state == SessionState::Error {
            return Err(DocError::InvalidState(self.state));
        }
        self.state = SessionState::Loading;
        self.models.clear();

        match self.read_models() {
            Ok(models) => {
                self.models = models;
                self.state = SessionState::Loaded;
            }
            Err(e) => {
                warn!(docid = %self.document.docid, error = %e, "document load failed");
                self.state = SessionState::Error;
                return Err(e.into());
            }
        }

        for (holder, target) in self.dangling_edges() {
            warn!(
                docid = %self.document.docid,
                holder = %holder,
                target = %target.id,
                "dangling reference"
            );
        }

        debug!(docid = %self.document.docid, count = self.models.len(), "document loaded");
        Ok(self.models.len())
    }

    fn read_models(&self) -> model_store::StoreResult<BTreeMap<ModelId, ModelObject>> {
        let docid = self.document.docid.as_str();
        let mut models = BTreeMap::new();

        for key in self.store.keys_with_prefix(&keys::model_prefix(docid))? {
            let Some(object_id) = keys::object_id_from_model_key(docid, &key) else {
                continue;
            };
            // Deleted between listing and reading.
            let Some(bytes) = self.store.get(&key)? else {
                continue;
            };
            match serde_json::from_slice::<StoredModel>(&bytes) {
                Ok(stored) => {
                    let id = ModelId::from_string(object_id);
                    models.insert(id.clone(), stored.into_object(id));
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping undecodable model record");
                }
            }
        }
        Ok(models)
    }

    fn dangling_edges(&self) -> Vec<(ModelId, ModelRef)> {
        let mut dangling = Vec::new();
        for object in self.models.values() {
            for target in object.refs() {
                if !self.models.contains_key(&target.id) {
                    dangling.push((object.id.clone(), target.clone()));
                }
            }
        }
        dangling
    }

    /// Drop every object not reachable from the document root.
    ///
    /// Removed objects are also deleted from the store; a failed delete is
    /// logged and counted but does not fail the prune. The root is never
    /// removed. If the root itself is missing nothing is removed.
    pub fn prune(&mut self) -> DocResult<PruneReport> {
        self.require_loaded()?;
        let docid = self.document.docid.clone();
        let root_id = self.document.plot_context_ref.id.clone();
        let mut report = PruneReport::default();

        if !self.models.contains_key(&root_id) {
            warn!(docid = %docid, root = %root_id, "plot context missing, skipping prune");
            report.dangling = self.dangling_edges();
            self.state = SessionState::Pruned;
            return Ok(report);
        }

        let mut visited: HashSet<ModelId> = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(root_id.clone());
        queue.push_back(root_id);

        while let Some(id) = queue.pop_front() {
            let Some(object) = self.models.get(&id) else {
                continue;
            };
            for target in object.refs() {
                if !self.models.contains_key(&target.id) {
                    report.dangling.push((id.clone(), target.clone()));
                } else if visited.insert(target.id.clone()) {
                    queue.push_back(target.id.clone());
                }
            }
        }

        report.removed = self
            .models
            .keys()
            .filter(|id| !visited.contains(*id))
            .cloned()
            .collect();

        for id in &report.removed {
            self.models.remove(id);
            let key = keys::model(docid.as_str(), id.as_str());
            if let Err(e) = self.store.delete(&key) {
                warn!(key = %key, error = %e, "failed to delete pruned model");
                report.delete_failures += 1;
            }
        }

        for (holder, target) in &report.dangling {
            warn!(docid = %docid, holder = %holder, target = %target.id, "dangling reference");
        }
        if !report.removed.is_empty() {
            info!(docid = %docid, removed = report.removed.len(), "pruned unreachable models");
        }

        self.state = SessionState::Pruned;
        Ok(report)
    }

    /// Externally-shaped form of every object in the working set.
    pub fn broadcast_all(&self) -> DocResult<Vec<BroadcastModel>> {
        self.require_loaded()?;
        Ok(broadcast_attrs(self.models.values()))
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add a new object and persist it. Returns a pointer to it.
    pub fn insert(&mut self, object: ModelObject) -> DocResult<ModelRef> {
        self.require_writable()?;
        if self.models.contains_key(&object.id) {
            return Err(DocError::Conflict(format!(
                "model {} already exists",
                object.id
            )));
        }
        self.persist(&object)?;
        let reference = object.reference();
        self.models.insert(object.id.clone(), object);
        self.touch();
        Ok(reference)
    }

    /// Modify an object in place and persist it before returning.
    ///
    /// The object's id cannot be changed. On a store failure the working set
    /// keeps the previous version.
    pub fn update<F>(&mut self, id: &ModelId, f: F) -> DocResult<()>
    where
        F: FnOnce(&mut ModelObject),
    {
        self.require_writable()?;
        let mut updated = self
            .models
            .get(id)
            .cloned()
            .ok_or_else(|| DocError::NotFound(format!("model {id}")))?;
        f(&mut updated);
        updated.id = id.clone();

        self.persist(&updated)?;
        self.models.insert(id.clone(), updated);
        self.touch();
        Ok(())
    }

    /// Persist an object that was changed through other means.
    pub fn mark_changed(&mut self, id: &ModelId) -> DocResult<()> {
        self.require_writable()?;
        let object = self
            .models
            .get(id)
            .ok_or_else(|| DocError::NotFound(format!("model {id}")))?;
        self.persist(object)?;
        self.touch();
        Ok(())
    }

    /// Delete an object from the store and the working set.
    pub fn remove(&mut self, id: &ModelId) -> DocResult<ModelObject> {
        self.require_writable()?;
        if id == &self.document.plot_context_ref.id {
            return Err(DocError::Conflict("cannot remove the plot context".to_string()));
        }
        if !self.models.contains_key(id) {
            return Err(DocError::NotFound(format!("model {id}")));
        }

        self.store
            .delete(&keys::model(self.document.docid.as_str(), id.as_str()))?;
        let removed = self
            .models
            .remove(id)
            .ok_or_else(|| DocError::NotFound(format!("model {id}")))?;
        self.touch();
        Ok(removed)
    }

    /// Persist every object in the working set. Returns how many were written.
    pub fn save(&mut self) -> DocResult<usize> {
        self.require_writable()?;
        for object in self.models.values() {
            self.persist(object)?;
        }
        debug!(docid = %self.document.docid, count = self.models.len(), "document saved");
        Ok(self.models.len())
    }

    fn persist(&self, object: &ModelObject) -> DocResult<()> {
        let bytes = StoredModel::encode(object)?;
        self.store.set(
            &keys::model(self.document.docid.as_str(), object.id.as_str()),
            &bytes,
        )?;
        Ok(())
    }

    fn touch(&mut self) {
        // Reachability is no longer guaranteed after a change.
        if self.state == SessionState::Pruned {
            self.state = SessionState::Loaded;
        }
    }

    fn require_loaded(&self) -> DocResult<()> {
        match self.state {
            SessionState::Loaded | SessionState::Pruned => Ok(()),
            other => Err(DocError::InvalidState(other)),
        }
    }

    fn require_writable(&self) -> DocResult<()> {
        self.require_loaded()?;
        if self.access != Access::Write {
            return Err(DocError::Unauthorized);
        }
        Ok(())
    }
}

/// Externally-shaped form of the given objects.
///
/// References inside attribute values stay `{type, id}` pointers.
pub fn broadcast_attrs<'a>(
    objects: impl IntoIterator<Item = &'a ModelObject>,
) -> Vec<BroadcastModel> {
    objects
        .into_iter()
        .map(|object| BroadcastModel {
            id: object.id.clone(),
            type_name: object.type_name.clone(),
            attrs: object
                .attrs
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        })
        .collect()
}

/// Encode any broadcast structure as JSON text.
///
/// Non-finite floats inside [`Value`](crate::Value)s come out as `null`.
pub fn serialize<T: Serialize + ?Sized>(value: &T) -> DocResult<String> {
    Ok(serde_json::to_string(value)?)
}
