use std::sync::Arc;

use volt_memory::{KvBackend, MemoryError, MemoryStore, NullBackend, SqliteBackend};
use volt_schema::{MemoryRecord, SaveConversationRequest};

fn conversation(title: &str, content: &str) -> SaveConversationRequest {
    SaveConversationRequest {
        title: title.into(),
        content: content.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn save_context_writes_versioned_key_and_latest() {
    let backend = Arc::new(NullBackend::new());
    let store = MemoryStore::new(backend.clone());

    let ack = store.save_context("working on the relay").await.unwrap();
    assert!(ack.key.starts_with("context/"));
    assert!(ack.key.ends_with(".json"));
    assert_ne!(ack.key, "context/latest.json");

    let versioned = backend.get(&ack.key).await.unwrap().unwrap();
    let latest = backend.get("context/latest.json").await.unwrap().unwrap();
    assert_eq!(versioned, latest);
    assert_eq!(
        backend.metadata("context/latest.json").await,
        Some(serde_json::json!({"type": "context"}))
    );

    let record: serde_json::Value = serde_json::from_str(&latest).unwrap();
    assert_eq!(record["type"], "context");
    assert_eq!(record["content"], "working on the relay");
    assert!(record["savedAt"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn latest_context_follows_most_recent_save() {
    let store = MemoryStore::new(Arc::new(NullBackend::new()));
    assert!(store.fetch_latest_context().await.unwrap().is_none());

    store.save_context("first").await.unwrap();
    store.save_context("second").await.unwrap();

    let latest = store.fetch_latest_context().await.unwrap().unwrap();
    assert_eq!(latest.content(), "second");

    let keys: Vec<String> = store
        .list_entries()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.key)
        .collect();
    assert_eq!(keys.len(), 3);
    assert!(keys.contains(&"context/latest.json".to_string()));
}

#[tokio::test]
async fn blank_inputs_are_rejected_without_writes() {
    let backend = Arc::new(NullBackend::new());
    let store = MemoryStore::new(backend.clone());

    let err = store.save_context("   ").await.unwrap_err();
    assert!(err.is_validation());

    let err = store
        .save_conversation(conversation("", "content"))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Validation(_)));

    let err = store
        .save_conversation(conversation("Title", "\n"))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    assert!(backend.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn save_conversation_applies_defaults_and_slug() {
    let backend = Arc::new(NullBackend::new());
    let store = MemoryStore::new(backend.clone());

    let ack = store
        .save_conversation(conversation("My Trip!", "Packing list"))
        .await
        .unwrap();
    assert!(ack.key.starts_with("conversations/"));
    assert!(ack.key.ends_with("-my-trip.json"));

    let raw = backend.get(&ack.key).await.unwrap().unwrap();
    let record: MemoryRecord = serde_json::from_str(&raw).unwrap();
    match record {
        MemoryRecord::Conversation {
            title,
            category,
            importance,
            tags,
            ..
        } => {
            assert_eq!(title, "My Trip!");
            assert_eq!(category, "general");
            assert_eq!(importance, "medium");
            assert!(tags.is_empty());
        }
        other => panic!("unexpected record: {other:?}"),
    }
}

#[tokio::test]
async fn save_conversation_keeps_explicit_fields() {
    let backend = Arc::new(NullBackend::new());
    let store = MemoryStore::new(backend.clone());

    let ack = store
        .save_conversation(SaveConversationRequest {
            title: "###".into(),
            content: "body".into(),
            category: Some("work".into()),
            importance: Some("high".into()),
            tags: Some(vec!["rust".into(), "volt".into()]),
        })
        .await
        .unwrap();
    assert!(ack.key.ends_with("-untitled.json"));

    let raw = backend.get(&ack.key).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "conversation");
    assert_eq!(value["category"], "work");
    assert_eq!(value["importance"], "high");
    assert_eq!(value["tags"], serde_json::json!(["rust", "volt"]));
}

#[tokio::test]
async fn generate_context_uses_three_most_recent_conversations() {
    let store = MemoryStore::new(Arc::new(NullBackend::new()));
    store.save_context("Project summary").await.unwrap();
    for title in ["Alpha", "Beta", "Gamma", "Delta"] {
        store
            .save_conversation(conversation(title, &format!("{title} notes")))
            .await
            .unwrap();
    }

    let prompt = store.generate_context().await.unwrap();
    assert!(prompt.contains("Project summary"));
    assert!(!prompt.contains("Alpha"));
    assert!(prompt.contains("Beta"));
    assert!(prompt.contains("Gamma"));
    assert!(prompt.contains("Delta notes"));
}

#[tokio::test]
async fn sqlite_backend_serves_the_same_facade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");

    {
        let store = MemoryStore::new(Arc::new(SqliteBackend::open(&path).unwrap()));
        store.save_context("persisted").await.unwrap();
        store
            .save_conversation(conversation("Kept", "across restarts"))
            .await
            .unwrap();
    }

    let store = MemoryStore::new(Arc::new(SqliteBackend::open(&path).unwrap()));
    let latest = store.fetch_latest_context().await.unwrap().unwrap();
    assert_eq!(latest.content(), "persisted");
    assert_eq!(store.list_entries().await.unwrap().len(), 3);
}

#[tokio::test]
async fn back_to_back_saves_never_overwrite_each_other() {
    let store = MemoryStore::new(Arc::new(NullBackend::new()));

    let mut context_keys = Vec::new();
    for i in 0..50 {
        context_keys.push(store.save_context(&format!("c{i}")).await.unwrap().key);
    }
    let mut conversation_keys = Vec::new();
    for i in 0..20 {
        let ack = store
            .save_conversation(conversation("Same Title", &format!("n{i}")))
            .await
            .unwrap();
        conversation_keys.push(ack.key);
    }

    let distinct: std::collections::HashSet<_> = context_keys.iter().collect();
    assert_eq!(distinct.len(), 50);
    let distinct: std::collections::HashSet<_> = conversation_keys.iter().collect();
    assert_eq!(distinct.len(), 20);

    let mut sorted = context_keys.clone();
    sorted.sort();
    assert_eq!(sorted, context_keys);
    let mut sorted = conversation_keys.clone();
    sorted.sort();
    assert_eq!(sorted, conversation_keys);

    // 50 versioned contexts + latest pointer + 20 conversations
    assert_eq!(store.list_entries().await.unwrap().len(), 71);

    let latest = store.fetch_latest_context().await.unwrap().unwrap();
    assert_eq!(latest.content(), "c49");
    let prompt = store.generate_context().await.unwrap();
    assert!(prompt.contains("n19"));
    assert!(prompt.contains("n17"));
    assert!(!prompt.contains("n16"));
}

#[tokio::test]
async fn keys_already_in_backend_are_skipped() {
    let backend = Arc::new(NullBackend::new());
    let now = chrono::Utc::now().timestamp_millis();
    let planted: Vec<String> = (now..now + 500)
        .map(|millis| format!("context/{millis}.json"))
        .collect();
    for key in &planted {
        backend.set(key, "{}", None).await.unwrap();
    }

    let store = MemoryStore::new(backend.clone());
    let ack = store.save_context("fresh").await.unwrap();
    assert!(!planted.contains(&ack.key));
    for key in &planted {
        assert_eq!(backend.get(key).await.unwrap().unwrap(), "{}");
    }
    assert_eq!(store.list_entries().await.unwrap().len(), 502);
}
