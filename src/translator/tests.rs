use std::sync::{Arc, Mutex};

use mongodb::bson::{Bson, doc};

use super::*;
use crate::bridge::RegexLiteral;
use crate::transport::MemoryTransport;

fn obj(entries: Vec<(&str, ShellValue)>) -> ShellValue {
    ShellValue::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn num(n: f64) -> ShellValue {
    ShellValue::Number(n)
}

fn translator() -> (Arc<MemoryTransport>, CommandTranslator) {
    let transport = Arc::new(MemoryTransport::new("mem"));
    let translator = CommandTranslator::new(transport.clone(), Some("shop".into()), 20);
    (transport, translator)
}

#[test]
fn test_wrap_update() {
    assert_eq!(wrap_update(doc! { "a": 1 }), doc! { "$set": { "a": 1 } });
    assert_eq!(wrap_update(doc! { "$inc": { "a": 1 } }), doc! { "$inc": { "a": 1 } });
}

#[tokio::test]
async fn test_no_database_selected_is_a_notice() {
    let transport = Arc::new(MemoryTransport::new("mem"));
    let translator = CommandTranslator::new(transport, None, 20);

    let reply = translator.count_documents("orders", &ShellValue::Null).await.unwrap();
    assert_eq!(reply, Reply::Notice(Notice::NoDatabaseSelected));
    assert_eq!(
        translator.open_cursor(QueryDescriptor::default()).notice(),
        Some(&Notice::NoDatabaseSelected)
    );
    assert_eq!(Notice::NoDatabaseSelected.to_string(), "No database selected");
}

#[tokio::test]
async fn test_insert_find_count() {
    let (_, translator) = translator();
    let reply = translator
        .insert_one("orders", &obj(vec![("a", num(1.0))]))
        .await
        .unwrap()
        .value()
        .unwrap();
    assert_eq!(reply.get_bool("acknowledged").unwrap(), true);
    let id = reply.get("insertedId").cloned().unwrap();

    let docs = translator
        .find(translator.build_query("orders", &ShellValue::Null, None))
        .await
        .unwrap()
        .value()
        .unwrap();
    assert_eq!(docs, vec![doc! { "_id": id, "a": 1 }]);

    let count = translator.count_documents("orders", &obj(vec![])).await.unwrap();
    assert_eq!(count, Reply::Value(1));
}

#[tokio::test]
async fn test_update_without_operators_sets_fields() {
    let (_, translator) = translator();
    translator.insert_one("orders", &obj(vec![("a", num(1.0))])).await.unwrap();

    let reply = translator
        .update("orders", &obj(vec![("a", num(1.0))]), &obj(vec![("b", num(2.0))]), UpdateMode::default())
        .await
        .unwrap()
        .value()
        .unwrap();
    assert_eq!(reply.get_i64("matchedCount").unwrap(), 1);
    assert_eq!(reply.get_i64("modifiedCount").unwrap(), 1);
    assert!(reply.get("upsertedId").is_none());

    let found = translator
        .find_one("orders", &ShellValue::Null, None)
        .await
        .unwrap()
        .value()
        .flatten()
        .unwrap();
    assert_eq!(found.get_i32("a").unwrap(), 1);
    assert_eq!(found.get_i32("b").unwrap(), 2);
}

#[tokio::test]
async fn test_upsert_reports_id() {
    let (_, translator) = translator();
    let reply = translator
        .update(
            "orders",
            &obj(vec![("sku", ShellValue::string("x"))]),
            &obj(vec![("qty", num(3.0))]),
            UpdateMode { many: false, upsert: true },
        )
        .await
        .unwrap()
        .value()
        .unwrap();
    assert_eq!(reply.get_i64("matchedCount").unwrap(), 0);
    assert!(matches!(reply.get("upsertedId"), Some(Bson::ObjectId(_))));
}

#[tokio::test]
async fn test_regex_filter_reaches_transport_canonical() {
    let (_, translator) = translator();
    for name in ["Alice", "bob", "alison"] {
        translator
            .insert_one("people", &obj(vec![("name", ShellValue::string(name))]))
            .await
            .unwrap();
    }
    let filter = obj(vec![("name", ShellValue::Regex(RegexLiteral::from_text("/^al/i")))]);
    let reply = translator.count_documents("people", &filter).await.unwrap();
    assert_eq!(reply, Reply::Value(2));
}

#[tokio::test]
async fn test_count_primitives() {
    let (transport, translator) = translator();
    assert_eq!(translator.estimated_document_count("empty").await.unwrap(), Reply::Value(0));
    assert_eq!(translator.count_documents("empty", &ShellValue::Null).await.unwrap(), Reply::Value(0));
    assert_eq!(transport.stats().estimated(), 1);
    assert_eq!(transport.stats().exact(), 1);
}

#[tokio::test]
async fn test_verbose_count_emits_diagnostics_without_changing_result() {
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink_lines = lines.clone();
    let transport = Arc::new(MemoryTransport::new("mem"));
    let translator = CommandTranslator::new(transport, Some("shop".into()), 20)
        .with_diagnostics(Arc::new(move |line: &str| {
            sink_lines.lock().unwrap().push(line.to_string());
        }));

    translator.insert_one("orders", &obj(vec![("a", num(1.0))])).await.unwrap();
    let quiet = translator.count_documents("orders", &obj(vec![("a", num(1.0))])).await.unwrap();
    assert!(lines.lock().unwrap().is_empty());

    translator.set_verbose(true);
    let loud = translator.count_documents("orders", &obj(vec![("a", num(1.0))])).await.unwrap();
    assert_eq!(quiet, loud);

    let lines = lines.lock().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("VERBOSE: countDocuments query:"));
    assert!(lines[0].contains("  Collection: shop.orders"));
    assert!(lines[0].contains("  Filter: {\"a\":1}"));
}

#[tokio::test]
async fn test_insert_many_requires_array() {
    let (_, translator) = translator();
    let reply = translator.insert_many("orders", &obj(vec![("a", num(1.0))])).await.unwrap();
    assert_eq!(
        reply.notice().map(|n| n.to_string()),
        Some("Documents array required".to_string())
    );

    let reply = translator
        .insert_many(
            "orders",
            &ShellValue::Array(vec![obj(vec![("a", num(1.0))]), obj(vec![("a", num(2.0))])]),
        )
        .await
        .unwrap()
        .value()
        .unwrap();
    assert_eq!(reply.get_array("insertedIds").unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_reports_count() {
    let (_, translator) = translator();
    for n in [1.0, 1.0, 2.0] {
        translator.insert_one("orders", &obj(vec![("a", num(n))])).await.unwrap();
    }
    let one = translator.delete("orders", &obj(vec![("a", num(1.0))]), false).await.unwrap();
    assert_eq!(one.value().unwrap().get_i64("deletedCount").unwrap(), 1);
    let all = translator.delete("orders", &ShellValue::Null, true).await.unwrap();
    assert_eq!(all.value().unwrap().get_i64("deletedCount").unwrap(), 2);
}

#[tokio::test]
async fn test_create_index_recognizes_known_options_only() {
    let (_, translator) = translator();
    translator.create_collection("orders").await.unwrap();
    let name = translator
        .create_index(
            "orders",
            &obj(vec![("sku", num(1.0))]),
            Some(&obj(vec![
                ("unique", ShellValue::Bool(true)),
                ("name", ShellValue::string("by_sku")),
                ("expireAfterSeconds", num(10.0)),
            ])),
        )
        .await
        .unwrap();
    assert_eq!(name, Reply::Value("by_sku".to_string()));

    let indexes = translator.get_indexes("orders").await.unwrap().value().unwrap();
    let created = indexes.iter().find(|i| i.get_str("name").ok() == Some("by_sku")).unwrap();
    assert_eq!(created.get_bool("unique").unwrap(), true);
    assert!(created.get("expireAfterSeconds").is_none());
}

#[tokio::test]
async fn test_show_aliases() {
    let (_, translator) = translator();
    translator.create_collection("b").await.unwrap();
    translator.create_collection("a").await.unwrap();

    let collections = translator.execute_show_command("TABLES").await.unwrap();
    assert_eq!(collections, Reply::Value(ShowOutput::Names(vec!["a".into(), "b".into()])));

    let dbs = translator.execute_show_command("databases").await.unwrap();
    assert_eq!(dbs, Reply::Value(ShowOutput::Names(vec!["shop".into()])));

    let users = translator.execute_show_command("users").await.unwrap();
    assert_eq!(users, Reply::Value(ShowOutput::Documents(vec![])));

    let unknown = translator.execute_show_command("widgets").await.unwrap();
    assert_eq!(
        unknown.notice().map(|n| n.to_string()),
        Some("Unknown show command: widgets".to_string())
    );
}

#[tokio::test]
async fn test_messages_for_collection_lifecycle() {
    let (_, translator) = translator();
    assert_eq!(
        translator.create_collection("logs").await.unwrap(),
        Reply::Value("Collection created: logs".to_string())
    );
    assert_eq!(
        translator.drop_collection("logs").await.unwrap(),
        Reply::Value("Collection dropped: logs".to_string())
    );
    assert_eq!(
        translator.drop_database().await.unwrap(),
        Reply::Value("Database dropped: shop".to_string())
    );
    assert_eq!(translator.use_database("other"), "switched to db other");
    assert_eq!(translator.database_name().as_deref(), Some("other"));
}
