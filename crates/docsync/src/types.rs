//! Core types for the document session engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Creates an ID from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a document (UUID string).
    DocId
);

string_id!(
    /// Unique identifier for a model object (UUID string).
    ModelId
);

/// Lightweight pointer to a model object: `{"type": ..., "id": ...}` on the wire.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    #[serde(rename = "type")]
    pub type_name: String,
    pub id: ModelId,
}

impl ModelRef {
    pub fn new(type_name: impl Into<String>, id: ModelId) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

// ============================================================================
// Attribute values
// ============================================================================

/// An attribute value of a model object.
///
/// References to other objects are always held as [`ModelRef`] pointers, never
/// inlined, so a value tree is finite even when the object graph has cycles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "serde_json::Value", from = "serde_json::Value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ref(ModelRef),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the reference if this value is one.
    pub fn as_model_ref(&self) -> Option<&ModelRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the list items if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the string if this value is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Every reference contained in this value, depth-first, in order.
    pub fn refs(&self) -> Vec<&ModelRef> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Value::Ref(r) => found.push(r),
                Value::List(items) => stack.extend(items.iter().rev()),
                Value::Map(entries) => stack.extend(entries.values().rev()),
                Value::Null
                | Value::Bool(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::String(_) => {}
            }
        }
        found
    }

    /// Encode into the wire-safe JSON form.
    ///
    /// Non-finite floats have no JSON representation and encode as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Ref(r) => serde_json::json!({ "type": r.type_name, "id": r.id.as_str() }),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Decode from the wire form.
    ///
    /// An object with exactly the string keys `type` and `id` is a reference.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => {
                if entries.len() == 2 {
                    if let (
                        Some(serde_json::Value::String(t)),
                        Some(serde_json::Value::String(id)),
                    ) = (entries.get("type"), entries.get("id"))
                    {
                        let id = ModelId::from_string(id.clone());
                        return Value::Ref(ModelRef::new(t.clone(), id));
                    }
                }
                Value::Map(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ModelRef> for Value {
    fn from(r: ModelRef) -> Self {
        Value::Ref(r)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ============================================================================
// Model objects
// ============================================================================

/// Type tag of a document's root object.
pub const PLOT_CONTEXT_TYPE: &str = "PlotContext";

/// An identified, typed node of a document's object graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: ModelId,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
}

impl ModelObject {
    /// Creates an object with a fresh id and no attributes.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self::with_id(ModelId::new(), type_name)
    }

    /// Creates an object with the given id and no attributes.
    pub fn with_id(id: ModelId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Creates an empty plot context, the root of every document.
    pub fn plot_context() -> Self {
        Self::new(PLOT_CONTEXT_TYPE).with_attr("children", Value::List(Vec::new()))
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attr(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.attrs.insert(name.into(), value.into())
    }

    /// Returns an attribute value.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    /// A pointer to this object.
    pub fn reference(&self) -> ModelRef {
        ModelRef::new(self.type_name.clone(), self.id.clone())
    }

    /// Every object this one references through its attributes.
    pub fn refs(&self) -> Vec<&ModelRef> {
        self.attrs.values().flat_map(Value::refs).collect()
    }
}

/// The persisted form of a [`Value`].
///
/// Tagged, so a map that happens to look like `{type, id}` is still a map
/// after a store round-trip. Non-finite floats persist as `null`, matching
/// the wire form.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub(crate) enum StoredValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Ref(ModelRef),
    List(Vec<StoredValue>),
    Map(BTreeMap<String, StoredValue>),
}

impl From<&Value> for StoredValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => StoredValue::Null,
            Value::Bool(b) => StoredValue::Bool(*b),
            Value::Int(i) => StoredValue::Int(*i),
            Value::Float(f) if f.is_finite() => StoredValue::Float(*f),
            Value::Float(_) => StoredValue::Null,
            Value::String(s) => StoredValue::String(s.clone()),
            Value::Ref(r) => StoredValue::Ref(r.clone()),
            Value::List(items) => StoredValue::List(items.iter().map(StoredValue::from).collect()),
            Value::Map(entries) => StoredValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), StoredValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<StoredValue> for Value {
    fn from(stored: StoredValue) -> Self {
        match stored {
            StoredValue::Null => Value::Null,
            StoredValue::Bool(b) => Value::Bool(b),
            StoredValue::Int(i) => Value::Int(i),
            StoredValue::Float(f) => Value::Float(f),
            StoredValue::String(s) => Value::String(s),
            StoredValue::Ref(r) => Value::Ref(r),
            StoredValue::List(items) => Value::List(items.into_iter().map(Value::from).collect()),
            StoredValue::Map(entries) => {
                Value::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// The persisted form of a model object: `model:{docid}:{id} -> {type, attrs}`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredModel {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, StoredValue>,
}

impl StoredModel {
    pub(crate) fn encode(object: &ModelObject) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&StoredModel {
            type_name: object.type_name.clone(),
            attrs: object
                .attrs
                .iter()
                .map(|(name, value)| (name.clone(), StoredValue::from(value)))
                .collect(),
        })
    }

    pub(crate) fn into_object(self, id: ModelId) -> ModelObject {
        ModelObject {
            id,
            type_name: self.type_name,
            attrs: self
                .attrs
                .into_iter()
                .map(|(name, value)| (name, value.into()))
                .collect(),
        }
    }
}

/// The externally-shaped form of a model object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BroadcastModel {
    pub id: ModelId,
    #[serde(rename = "type")]
    pub type_name: String,
    pub attrs: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Users and documents
// ============================================================================

/// Entry in a user's document list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DocRef {
    pub docid: DocId,
    pub title: String,
}

/// A server user: identity, owned documents and a capability secret.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub apikey: String,
    #[serde(default)]
    pub docs: Vec<DocRef>,
}

impl User {
    /// Appends a document reference.
    ///
    /// Returns false (and keeps the existing entry) if `docid` is already listed.
    pub fn add_doc(&mut self, docid: DocId, title: impl Into<String>) -> bool {
        if self.has_doc(&docid) {
            return false;
        }
        self.docs.push(DocRef {
            docid,
            title: title.into(),
        });
        true
    }

    /// Removes a document reference, returning its former position.
    pub fn remove_doc(&mut self, docid: &DocId) -> Option<(usize, DocRef)> {
        let index = self.docs.iter().position(|d| &d.docid == docid)?;
        Some((index, self.docs.remove(index)))
    }

    /// Returns true if the user lists `docid`.
    pub fn has_doc(&self, docid: &DocId) -> bool {
        self.docs.iter().any(|d| &d.docid == docid)
    }

    /// First document with the given title, in insertion order.
    pub fn find_doc_by_title(&self, title: &str) -> Option<&DocRef> {
        self.docs.iter().find(|d| d.title == title)
    }

    /// The user's public view (no secret).
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            username: self.username.clone(),
            docs: self.docs.clone(),
        }
    }
}

/// What other parties may see of a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub username: String,
    pub docs: Vec<DocRef>,
}

/// A titled, access-controlled container for a model graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub docid: DocId,
    pub title: String,
    #[serde(rename = "rw_users")]
    pub owners: Vec<String>,
    #[serde(rename = "apikey")]
    pub write_key: String,
    #[serde(rename = "readonlyapikey")]
    pub read_key: String,
    pub plot_context_ref: ModelRef,
}

/// Client-visible state of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentState {
    pub plot_context_ref: ModelRef,
    pub docid: DocId,
    pub all_models: Vec<BroadcastModel>,
    pub apikey: String,
}

/// The strongest document key a caller is entitled to see.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiKeyGrant {
    Write { apikey: String },
    ReadOnly { readonlyapikey: String },
}
