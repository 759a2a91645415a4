//! Session load, prune, serialization and mutation tests.

use std::sync::Arc;

use model_store::{keys, MemoryModelStore, ModelStore};

use crate::access::Access;
use crate::session::{broadcast_attrs, serialize, DocumentSession, SessionState};
use crate::types::{DocId, Document, ModelId, ModelObject, ModelRef, Value};
use crate::DocError;

fn document_with_root(root: &ModelObject) -> Document {
    Document {
        docid: DocId::from_string("d1"),
        title: "Plot".to_string(),
        owners: vec!["alice".to_string()],
        write_key: "w".to_string(),
        read_key: "r".to_string(),
        plot_context_ref: root.reference(),
    }
}

/// A saved document: root -> a -> b, plus an unreachable `stray`.
fn seeded() -> (Arc<MemoryModelStore>, Document, [ModelId; 4]) {
    let store = Arc::new(MemoryModelStore::new());
    let b = ModelObject::new("Glyph");
    let a = ModelObject::new("Plot")
        .with_attr("renderers", Value::List(vec![b.reference().into()]));
    let stray = ModelObject::new("Range");
    let root = ModelObject::plot_context()
        .with_attr("children", Value::List(vec![a.reference().into()]));

    let document = document_with_root(&root);
    let ids = [
        root.id.clone(),
        a.id.clone(),
        b.id.clone(),
        stray.id.clone(),
    ];

    let mut session = DocumentSession::fresh(store.clone(), document.clone(), root);
    session.insert(a).unwrap();
    session.insert(b).unwrap();
    session.insert(stray).unwrap();
    session.save().unwrap();
    (store, document, ids)
}

fn open(
    store: &Arc<MemoryModelStore>,
    document: &Document,
    access: Access,
) -> DocumentSession<MemoryModelStore> {
    let mut session = DocumentSession::new(store.clone(), document.clone(), access);
    session.load().unwrap();
    session
}

#[test]
fn load_reads_every_model() {
    let (store, document, ids) = seeded();
    let mut session = DocumentSession::new(store, document, Access::Read);
    assert_eq!(session.state(), SessionState::Unloaded);

    assert_eq!(session.load().unwrap(), 4);
    assert_eq!(session.state(), SessionState::Loaded);
    for id in &ids {
        assert!(session.get(id).is_some());
    }
}

#[test]
fn load_skips_undecodable_records() {
    let (store, document, _) = seeded();
    store
        .set(&keys::model(document.docid.as_str(), "garbage"), b"{not json")
        .unwrap();

    let mut session = DocumentSession::new(store, document, Access::Read);
    assert_eq!(session.load().unwrap(), 4);
}

#[test]
fn load_ignores_other_documents() {
    let (store, document, _) = seeded();
    store
        .set(&keys::model("d10", "x"), br#"{"type":"Plot","attrs":{}}"#)
        .unwrap();

    let session = open(&store, &document, Access::Read);
    assert_eq!(session.len(), 4);
}

#[test]
fn prune_removes_unreachable_and_keeps_root() {
    let (store, document, [root, a, b, stray]) = seeded();
    let mut session = open(&store, &document, Access::Read);

    let report = session.prune().unwrap();
    assert_eq!(report.removed, vec![stray.clone()]);
    assert!(report.dangling.is_empty());
    assert_eq!(report.delete_failures, 0);
    assert_eq!(session.state(), SessionState::Pruned);

    assert!(session.get(&root).is_some());
    assert!(session.get(&a).is_some());
    assert!(session.get(&b).is_some());
    assert!(!store
        .has(&keys::model(document.docid.as_str(), stray.as_str()))
        .unwrap());
}

#[test]
fn prune_is_idempotent() {
    let (store, document, _) = seeded();
    let mut session = open(&store, &document, Access::Read);

    let first = session.prune().unwrap();
    assert_eq!(first.removed.len(), 1);
    let second = session.prune().unwrap();
    assert!(second.removed.is_empty());
    assert_eq!(session.len(), 3);
}

#[test]
fn prune_handles_cycles() {
    let store = Arc::new(MemoryModelStore::new());
    let a_id = ModelId::new();
    let b_id = ModelId::new();
    let a = ModelObject::with_id(a_id.clone(), "Node")
        .with_attr("next", ModelRef::new("Node", b_id.clone()));
    let b = ModelObject::with_id(b_id, "Node").with_attr("next", ModelRef::new("Node", a_id));
    let root = ModelObject::plot_context();
    let root = root
        .clone()
        .with_attr("children", Value::List(vec![a.reference().into()]))
        .with_attr("self", root.reference());
    let document = document_with_root(&root);

    let mut session = DocumentSession::fresh(store.clone(), document.clone(), root);
    session.insert(a).unwrap();
    session.insert(b).unwrap();
    session.save().unwrap();

    let mut session = open(&store, &document, Access::Read);
    let report = session.prune().unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(session.len(), 3);
}

#[test]
fn prune_records_dangling_references() {
    let store = Arc::new(MemoryModelStore::new());
    let ghost = ModelRef::new("Plot", ModelId::from_string("ghost"));
    let root = ModelObject::plot_context()
        .with_attr("children", Value::List(vec![ghost.clone().into()]));
    let root_id = root.id.clone();
    let document = document_with_root(&root);
    DocumentSession::fresh(store.clone(), document.clone(), root)
        .save()
        .unwrap();

    let mut session = open(&store, &document, Access::Read);
    let report = session.prune().unwrap();
    assert_eq!(report.dangling, vec![(root_id, ghost)]);
    assert_eq!(session.len(), 1);
}

#[test]
fn reference_shaped_map_reloads_as_a_map() {
    let (store, document, [root, ..]) = seeded();
    let style = Value::Map(
        [
            ("type".to_string(), Value::from("dashed")),
            ("id".to_string(), Value::from("style-1")),
        ]
        .into_iter()
        .collect(),
    );

    let mut session = open(&store, &document, Access::Write);
    session
        .update(&root, |object| {
            object.set_attr("line", style.clone());
        })
        .unwrap();

    let mut session = open(&store, &document, Access::Read);
    assert_eq!(session.get(&root).unwrap().attr("line"), Some(&style));
    let report = session.prune().unwrap();
    assert!(report.dangling.is_empty());
    assert_eq!(report.removed.len(), 1);
}

#[test]
fn prune_without_root_removes_nothing() {
    let (store, document, [root, ..]) = seeded();
    store
        .delete(&keys::model(document.docid.as_str(), root.as_str()))
        .unwrap();
    let mut session = open(&store, &document, Access::Read);
    let report = session.prune().unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(session.len(), 3);
}

#[test]
fn prune_before_load_is_invalid() {
    let (store, document, _) = seeded();
    let mut session = DocumentSession::new(store, document, Access::Read);
    assert!(matches!(
        session.prune(),
        Err(DocError::InvalidState(SessionState::Unloaded))
    ));
}

#[test]
fn broadcast_keeps_references_as_pointers() {
    let child = ModelRef::new("Plot", ModelId::from_string("p1"));
    let root = ModelObject::with_id(ModelId::from_string("root"), "PlotContext")
        .with_attr("children", Value::List(vec![child.into()]))
        .with_attr("width", 600i64);

    let shaped = broadcast_attrs([&root]);
    assert_eq!(shaped.len(), 1);
    let json = serde_json::to_value(&shaped[0]).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "id": "root",
            "type": "PlotContext",
            "attrs": {
                "children": [{"type": "Plot", "id": "p1"}],
                "width": 600
            }
        })
    );
}

#[test]
fn serialize_writes_null_for_non_finite() {
    let object = ModelObject::with_id(ModelId::from_string("x"), "Range")
        .with_attr("start", f64::NEG_INFINITY)
        .with_attr("end", 1.0f64);
    let text = serialize(&broadcast_attrs([&object])).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json[0]["attrs"]["start"], serde_json::Value::Null);
    assert_eq!(json[0]["attrs"]["end"], serde_json::json!(1.0));
}

#[test]
fn update_persists_before_returning() {
    let (store, document, [_, a, ..]) = seeded();
    let mut session = open(&store, &document, Access::Write);

    session
        .update(&a, |plot| {
            plot.set_attr("title", "renamed");
        })
        .unwrap();

    let reloaded = open(&store, &document, Access::Read);
    assert_eq!(
        reloaded.get(&a).unwrap().attr("title"),
        Some(&Value::from("renamed"))
    );
}

#[test]
fn update_cannot_change_id() {
    let (store, document, [_, a, ..]) = seeded();
    let mut session = open(&store, &document, Access::Write);
    session
        .update(&a, |plot| {
            plot.id = ModelId::from_string("hijacked");
        })
        .unwrap();
    assert!(session.get(&a).is_some());
    assert!(session.get(&ModelId::from_string("hijacked")).is_none());
}

#[test]
fn mutation_after_prune_returns_to_loaded() {
    let (store, document, [_, a, ..]) = seeded();
    let mut session = open(&store, &document, Access::Write);
    session.prune().unwrap();
    assert_eq!(session.state(), SessionState::Pruned);

    session.mark_changed(&a).unwrap();
    assert_eq!(session.state(), SessionState::Loaded);
}

#[test]
fn read_only_session_cannot_mutate() {
    let (store, document, [_, a, ..]) = seeded();
    let mut session = open(&store, &document, Access::Read);

    assert!(matches!(
        session.insert(ModelObject::new("Plot")),
        Err(DocError::Unauthorized)
    ));
    assert!(matches!(
        session.update(&a, |_| {}),
        Err(DocError::Unauthorized)
    ));
    assert!(matches!(session.save(), Err(DocError::Unauthorized)));
}

#[test]
fn remove_refuses_root_and_unknown_ids() {
    let store = Arc::new(MemoryModelStore::new());
    let root = ModelObject::plot_context();
    let root_id = root.id.clone();
    let document = document_with_root(&root);
    let mut session = DocumentSession::fresh(store.clone(), document, root);
    let extra = session.insert(ModelObject::new("Plot")).unwrap();

    assert!(matches!(session.remove(&root_id), Err(DocError::Conflict(_))));
    assert!(matches!(
        session.remove(&ModelId::from_string("nope")),
        Err(DocError::NotFound(_))
    ));

    let removed = session.remove(&extra.id).unwrap();
    assert_eq!(removed.id, extra.id);
    assert!(!store
        .has(&keys::model("d1", extra.id.as_str()))
        .unwrap());
}

#[test]
fn insert_rejects_existing_id() {
    let store = Arc::new(MemoryModelStore::new());
    let root = ModelObject::plot_context();
    let document = document_with_root(&root);
    let mut session = DocumentSession::fresh(store, document, root.clone());
    assert!(matches!(session.insert(root), Err(DocError::Conflict(_))));
}
