//! Logical key layout.
//!
//! ```text
//! user:{username}              -> user record
//! doc:{docid}                  -> document record
//! model:{docid}:{object_id}    -> model object record
//! ```

/// Prefix shared by every user record.
pub const USER_PREFIX: &str = "user:";

/// Prefix shared by every document record.
pub const DOC_PREFIX: &str = "doc:";

/// Prefix shared by every model object record.
pub const MODEL_PREFIX: &str = "model:";

/// Key of a user record.
pub fn user(username: &str) -> String {
    format!("{USER_PREFIX}{username}")
}

/// Key of a document record.
pub fn doc(docid: &str) -> String {
    format!("{DOC_PREFIX}{docid}")
}

/// Key of one model object belonging to a document.
pub fn model(docid: &str, object_id: &str) -> String {
    format!("{MODEL_PREFIX}{docid}:{object_id}")
}

/// Prefix under which all model objects of a document live.
pub fn model_prefix(docid: &str) -> String {
    format!("{MODEL_PREFIX}{docid}:")
}

/// Extract the object id from a model key of the given document.
pub fn object_id_from_model_key<'a>(docid: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(MODEL_PREFIX)?
        .strip_prefix(docid)?
        .strip_prefix(':')
        .filter(|id| !id.is_empty())
}

/// Extract the document id from a document key.
pub fn docid_from_doc_key(key: &str) -> Option<&str> {
    key.strip_prefix(DOC_PREFIX).filter(|id| !id.is_empty())
}

/// Extract the document id from any model key.
pub fn docid_from_model_key(key: &str) -> Option<&str> {
    let (docid, _) = key.strip_prefix(MODEL_PREFIX)?.split_once(':')?;
    Some(docid).filter(|id| !id.is_empty())
}
