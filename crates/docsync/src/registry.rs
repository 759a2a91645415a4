//! Document and user lifecycle.
//!
//! Writes follow one order: model objects, then the document record, then the
//! user record that lists the document. A crash part-way leaves at worst an
//! unlisted document or stray model records, which
//! [`DocumentRegistry::sweep_orphaned_documents`] removes later.
//!
//! Changes to a user's document list re-read the stored user record under a
//! registry-wide lock, so a caller holding an outdated `User` never writes
//! back a list that drops another caller's document.

use std::collections::{BTreeSet, HashSet};

use model_store::{keys, ModelStore};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::access::{self, Access};
use crate::context::ServerContext;
use crate::notifier::{user_topic, ChangeEvent, ChangeNotifier};
use crate::session::DocumentSession;
use crate::types::{
    ApiKeyGrant, DocId, DocRef, Document, DocumentState, ModelObject, PublicUser, User,
};
use crate::{DocError, DocResult};

/// Creates, finds and deletes documents on behalf of users.
pub struct DocumentRegistry<S, N> {
    ctx: ServerContext<S, N>,
    /// Held across read-modify-write of a user's document list.
    owner_writes: Mutex<()>,
}

impl<S: ModelStore, N: ChangeNotifier> DocumentRegistry<S, N> {
    pub fn new(ctx: ServerContext<S, N>) -> Self {
        Self {
            ctx,
            owner_writes: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &ServerContext<S, N> {
        &self.ctx
    }

    // ========================================================================
    // Users
    // ========================================================================

    /// Register a user and issue their API key.
    ///
    /// Names must be non-empty and free of `:`, the key separator.
    pub fn create_user(&self, username: &str) -> DocResult<User> {
        validate_username(username)?;
        let key = keys::user(username);
        if self.ctx.store().has(&key)? {
            return Err(DocError::Conflict(format!("user {username} already exists")));
        }

        let user = User {
            username: username.to_string(),
            apikey: access::generate_api_key(),
            docs: Vec::new(),
        };
        self.ctx.store().set(&key, &serde_json::to_vec(&user)?)?;
        info!(username = %username, "user created");
        Ok(user)
    }

    pub fn load_user(&self, username: &str) -> DocResult<User> {
        self.read_record(&keys::user(username))?
            .ok_or_else(|| DocError::NotFound(format!("user {username}")))
    }

    /// Load a user after checking their API key.
    ///
    /// Unknown users fail the same way as wrong keys.
    pub fn authenticate_user(&self, username: &str, apikey: &str) -> DocResult<User> {
        let user = match self.load_user(username) {
            Ok(user) => user,
            Err(DocError::NotFound(_)) => return Err(DocError::Unauthorized),
            Err(e) => return Err(e),
        };
        if !access::keys_match(apikey, &user.apikey) {
            return Err(DocError::Unauthorized);
        }
        Ok(user)
    }

    pub fn user_info(&self, user: &User) -> PublicUser {
        user.to_public()
    }

    fn save_user(&self, user: &User) -> DocResult<()> {
        let bytes = serde_json::to_vec(user)?;
        self.ctx.store().set(&keys::user(&user.username), &bytes)?;
        Ok(())
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Create a document owned by `owner`, with an empty plot context as root.
    ///
    /// Titles are not unique. The document is added to the stored user record,
    /// and `owner` is replaced with that record on success. On a persistence
    /// failure `owner` is left as it was.
    pub fn create_document(&self, owner: &mut User, title: &str) -> DocResult<Document> {
        let guard = self.owner_writes.lock();
        let mut current = self.load_user(&owner.username)?;

        let docid = DocId::new();
        let doc_key = keys::doc(docid.as_str());
        if self.ctx.store().has(&doc_key)? {
            return Err(DocError::Conflict(format!("document {docid} already exists")));
        }

        let root = ModelObject::plot_context();
        let document = Document {
            docid: docid.clone(),
            title: title.to_string(),
            owners: vec![owner.username.clone()],
            write_key: access::generate_api_key(),
            read_key: access::generate_api_key(),
            plot_context_ref: root.reference(),
        };

        let mut session =
            DocumentSession::fresh(self.ctx.store().clone(), document.clone(), root);
        session.save().map_err(integrity)?;

        let bytes = serde_json::to_vec(&document)?;
        self.ctx
            .store()
            .set(&doc_key, &bytes)
            .map_err(|e| integrity(e.into()))?;

        current.add_doc(docid.clone(), title);
        self.save_user(&current).map_err(integrity)?;
        drop(guard);
        *owner = current;

        info!(docid = %docid, owner = %owner.username, title = %title, "document created");
        self.notify_doc_change(&owner.username);
        Ok(document)
    }

    /// Remove `docid` from the owner's document list.
    ///
    /// The document record and its models stay in the store until the next
    /// orphan sweep. Like [`Self::create_document`], works on the stored user
    /// record and replaces `owner` with it on success.
    pub fn delete_document(&self, owner: &mut User, docid: &DocId) -> DocResult<()> {
        let guard = self.owner_writes.lock();
        let mut current = self.load_user(&owner.username)?;
        if current.remove_doc(docid).is_none() {
            return Err(DocError::NotFound(format!("document {docid}")));
        }

        self.save_user(&current).map_err(integrity)?;
        drop(guard);
        *owner = current;

        info!(docid = %docid, owner = %owner.username, "document deleted");
        self.notify_doc_change(&owner.username);
        Ok(())
    }

    /// First document of `owner` titled `title`, in creation order.
    pub fn find_by_title(&self, owner: &User, title: &str) -> Option<DocRef> {
        owner.find_doc_by_title(title).cloned()
    }

    /// Find the owner's document titled `title`, creating it if there is none.
    ///
    /// Returns the entry and whether it was just created.
    pub fn find_or_create_by_title(
        &self,
        owner: &mut User,
        title: &str,
    ) -> DocResult<(DocRef, bool)> {
        *owner = self.load_user(&owner.username)?;
        if let Some(found) = self.find_by_title(owner, title) {
            return Ok((found, false));
        }
        let document = self.create_document(owner, title)?;
        Ok((
            DocRef {
                docid: document.docid,
                title: document.title,
            },
            true,
        ))
    }

    pub fn load_document(&self, docid: &DocId) -> DocResult<Document> {
        self.read_record(&keys::doc(docid.as_str()))?
            .ok_or_else(|| DocError::NotFound(format!("document {docid}")))
    }

    /// Load and prune a document and describe it to a client holding `token`.
    ///
    /// The returned `apikey` is the write key only if `token` grants write.
    pub fn get_state(&self, docid: &DocId, token: &str) -> DocResult<DocumentState> {
        let mut session = self.open_session(docid, token, Access::Read)?;
        session.prune()?;
        let all_models = session.broadcast_all()?;

        let document = session.document();
        let apikey = match session.access() {
            Access::Write => document.write_key.clone(),
            Access::Read => document.read_key.clone(),
        };

        Ok(DocumentState {
            plot_context_ref: document.plot_context_ref.clone(),
            docid: document.docid.clone(),
            all_models,
            apikey,
        })
    }

    /// The strongest document key `token` entitles its holder to.
    pub fn document_api_key(&self, docid: &DocId, token: &str) -> DocResult<ApiKeyGrant> {
        let document = self.load_document(docid)?;
        match access::access_level(&document, token) {
            Some(Access::Write) => Ok(ApiKeyGrant::Write {
                apikey: document.write_key,
            }),
            Some(Access::Read) => Ok(ApiKeyGrant::ReadOnly {
                readonlyapikey: document.read_key,
            }),
            None => Err(DocError::Unauthorized),
        }
    }

    /// Open and load a session after checking `token` grants `wanted`.
    ///
    /// The session carries the strongest access the token grants.
    pub fn open_session(
        &self,
        docid: &DocId,
        token: &str,
        wanted: Access,
    ) -> DocResult<DocumentSession<S>> {
        let document = self.load_document(docid)?;
        access::authorize(&document, token, wanted)?;
        let granted = access::access_level(&document, token).ok_or(DocError::Unauthorized)?;

        let mut session = DocumentSession::new(self.ctx.store().clone(), document, granted);
        session.load()?;
        Ok(session)
    }

    /// Delete documents that no user lists anymore, with their models, and
    /// model records whose document was never written.
    ///
    /// Aborts without deleting anything if a user record cannot be decoded.
    /// Runs under the owner-write lock; documents and models are listed
    /// before users so a create finishing on another registry over the same
    /// store is never seen half-written. Sweeping while another process
    /// creates documents is still unsafe.
    pub fn sweep_orphaned_documents(&self) -> DocResult<Vec<DocId>> {
        let _guard = self.owner_writes.lock();
        let store = self.ctx.store();
        let doc_keys = store.keys_with_prefix(keys::DOC_PREFIX)?;
        let model_keys = store.keys_with_prefix(keys::MODEL_PREFIX)?;

        let mut listed: HashSet<DocId> = HashSet::new();
        for user_key in store.keys_with_prefix(keys::USER_PREFIX)? {
            if let Some(user) = self.read_record::<User>(&user_key)? {
                listed.extend(user.docs.into_iter().map(|d| d.docid));
            }
        }

        let mut removed = Vec::new();
        let mut recorded: HashSet<DocId> = HashSet::new();
        for doc_key in doc_keys {
            let Some(docid) = keys::docid_from_doc_key(&doc_key).map(DocId::from_string) else {
                continue;
            };
            recorded.insert(docid.clone());
            if listed.contains(&docid) {
                continue;
            }

            for model_key in store.keys_with_prefix(&keys::model_prefix(docid.as_str()))? {
                store.delete(&model_key)?;
            }
            store.delete(&doc_key)?;
            debug!(docid = %docid, "swept orphaned document");
            removed.push(docid);
        }

        // Models left behind by a create that failed before its document record.
        let mut strays: BTreeSet<DocId> = BTreeSet::new();
        for model_key in model_keys {
            let Some(docid) = keys::docid_from_model_key(&model_key).map(DocId::from_string) else {
                continue;
            };
            if recorded.contains(&docid) || listed.contains(&docid) {
                continue;
            }
            store.delete(&model_key)?;
            strays.insert(docid);
        }
        for docid in strays {
            debug!(docid = %docid, "swept models without a document");
            removed.push(docid);
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "swept orphaned documents");
        }
        Ok(removed)
    }

    fn read_record<T: DeserializeOwned>(&self, key: &str) -> DocResult<Option<T>> {
        match self.ctx.store().get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn notify_doc_change(&self, username: &str) {
        let topic = user_topic(username);
        if let Err(e) = self
            .ctx
            .notifier()
            .publish(&topic, &ChangeEvent::DocChange.payload())
        {
            warn!(topic = %topic, error = %e, "failed to publish doc change");
        }
    }
}

fn validate_username(username: &str) -> DocResult<()> {
    if username.is_empty() {
        return Err(DocError::Invalid("username must not be empty".to_string()));
    }
    if username.contains(':') {
        return Err(DocError::Invalid(format!(
            "username {username:?} must not contain ':'"
        )));
    }
    Ok(())
}

/// A failed write during a multi-record change.
fn integrity(error: DocError) -> DocError {
    match error {
        DocError::Store(e) => DocError::Conflict(format!("data integrity: {e}")),
        other => other,
    }
}
