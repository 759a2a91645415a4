//! End-to-end flows through the registry.

use super::registry;
use crate::notifier::{user_topic, ChangeEvent};
use crate::types::{DocId, ModelObject, Value};
use crate::{Access, DocError};

#[test]
fn create_plot_for_alice() {
    let registry = registry();
    let mut alice = registry.create_user("alice").unwrap();
    let before = alice.docs.len();

    let doc = registry.create_document(&mut alice, "Plot A").unwrap();

    assert_eq!(alice.docs.len(), before + 1);
    assert_eq!(alice.docs.last().unwrap().docid, doc.docid);
    assert_eq!(doc.owners, vec!["alice".to_string()]);

    // The persisted user agrees with the in-memory one.
    let stored = registry.load_user("alice").unwrap();
    assert_eq!(stored.docs, alice.docs);

    let notifier = registry.context().notifier();
    assert_eq!(
        notifier.payloads_for(&user_topic("alice")),
        vec![ChangeEvent::DocChange.payload()]
    );
}

#[test]
fn delete_of_unowned_document_changes_nothing() {
    let registry = registry();
    let mut alice = registry.create_user("alice").unwrap();
    let mut bob = registry.create_user("bob").unwrap();
    let doc = registry.create_document(&mut alice, "Plot A").unwrap();
    registry.context().notifier().clear();

    let snapshot = registry.context().store().keys();
    let result = registry.delete_document(&mut bob, &doc.docid);

    assert!(matches!(result, Err(DocError::NotFound(_))));
    assert_eq!(registry.context().store().keys(), snapshot);
    assert_eq!(registry.load_user("alice").unwrap().docs.len(), 1);
    assert!(registry.context().notifier().is_empty());
}

#[test]
fn read_only_key_sees_every_model() {
    let registry = registry();
    let mut alice = registry.create_user("alice").unwrap();
    let doc = registry.create_document(&mut alice, "Plot A").unwrap();
    assert_ne!(doc.read_key, doc.write_key);

    let mut session = registry
        .open_session(&doc.docid, &doc.write_key, Access::Write)
        .unwrap();
    let plot = session
        .insert(ModelObject::new("Plot").with_attr("title", "sales"))
        .unwrap();
    let root_id = doc.plot_context_ref.id.clone();
    session
        .update(&root_id, |root| {
            root.set_attr("children", Value::List(vec![Value::Ref(plot.clone())]));
        })
        .unwrap();

    let state = registry.get_state(&doc.docid, &doc.read_key).unwrap();
    assert_eq!(state.all_models.len(), 2);
    assert_eq!(state.docid, doc.docid);
    assert_eq!(state.plot_context_ref, doc.plot_context_ref);
    assert_eq!(state.apikey, doc.read_key);
}

#[test]
fn same_title_twice_makes_two_documents() {
    let registry = registry();
    let mut alice = registry.create_user("alice").unwrap();

    let first = registry.create_document(&mut alice, "X").unwrap();
    let second = registry.create_document(&mut alice, "X").unwrap();

    assert_ne!(first.docid, second.docid);
    assert_eq!(alice.docs.len(), 2);
    assert!(alice.docs.iter().all(|d| d.title == "X"));
    assert_eq!(
        registry.find_by_title(&alice, "X").unwrap().docid,
        first.docid
    );
}

#[test]
fn full_lifecycle() {
    let registry = registry();
    let mut alice = registry.create_user("alice").unwrap();
    let doc = registry.create_document(&mut alice, "Plot A").unwrap();

    registry.delete_document(&mut alice, &doc.docid).unwrap();
    assert!(alice.docs.is_empty());
    // Still readable until swept.
    assert!(registry.load_document(&doc.docid).is_ok());

    let swept = registry.sweep_orphaned_documents().unwrap();
    assert_eq!(swept, vec![doc.docid.clone()]);
    assert!(matches!(
        registry.load_document(&doc.docid),
        Err(DocError::NotFound(_))
    ));
    assert!(matches!(
        registry.get_state(&DocId::from_string("missing"), "x"),
        Err(DocError::NotFound(_))
    ));
    assert_eq!(registry.context().notifier().len(), 2);
}
