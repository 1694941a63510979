use crate::db::*;
use serde_json::json;

#[tokio::test]
async fn test_memory_store_round_trip() {
    let store = MemoryStore::new();

    assert!(store.get("Queue").await.unwrap().is_none());
    store.store("Queue", json!([1])).await.unwrap();
    assert_eq!(store.get("Queue").await.unwrap(), Some(json!([1])));

    store.delete("Queue").await.unwrap();
    store.delete("Queue").await.unwrap();
    assert_eq!(store.get_or("Queue", json!([])).await.unwrap(), json!([]));
}
