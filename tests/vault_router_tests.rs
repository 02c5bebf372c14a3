use archivist::{
    AdapterError, ArchivistConfig, ArchivistError, Encoding, GetOptions, InMemoryVault,
    ListOptions, PersistenceAdapter, Query, Record, TopicDescriptor, TopicRegistry,
    VaultRouteConfig, VaultRouter, raw_index,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

fn record(data: Value) -> Record {
    Record {
        data,
        media_type: "application/json".to_string(),
        encoding: Encoding::Live,
        expiration: None,
    }
}

fn two_tier() -> (InMemoryVault, InMemoryVault, VaultRouter) {
    let cache = InMemoryVault::new("cache");
    let store = InMemoryVault::new("store");
    let router = VaultRouter::new()
        .with_vault("cache", Arc::new(cache.clone()))
        .with_vault("store", Arc::new(store.clone()))
        .with_route(VaultRouteConfig {
            topic: "Player".to_string(),
            read_order: vec!["cache".to_string(), "store".to_string()],
            write_order: vec!["store".to_string(), "cache".to_string()],
        })
        .unwrap();
    (cache, store, router)
}

#[tokio::test]
async fn writes_reach_every_write_vault() {
    let (cache, store, router) = two_tier();
    let index = raw_index(json!({ "playerId": "p1" })).unwrap();

    router
        .set("Player", &index, record(json!({ "name": "Ann" })))
        .await
        .unwrap();

    assert_eq!(cache.count("Player").await, 1);
    assert_eq!(store.count("Player").await, 1);

    router.del("Player", &index).await.unwrap();
    assert_eq!(cache.count("Player").await, 0);
    assert_eq!(store.count("Player").await, 0);
}

#[tokio::test]
async fn reads_fall_through_read_order() {
    let (cache, store, router) = two_tier();
    let index = raw_index(json!({ "playerId": "p1" })).unwrap();

    store
        .set("Player", &index, record(json!({ "name": "from store" })))
        .await
        .unwrap();
    let data = router
        .get("Player", &index, &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(data, Some(json!({ "name": "from store" })));

    cache
        .set("Player", &index, record(json!({ "name": "from cache" })))
        .await
        .unwrap();
    let data = router
        .get("Player", &index, &GetOptions::default())
        .await
        .unwrap();
    assert_eq!(data, Some(json!({ "name": "from cache" })));
}

#[tokio::test]
async fn missing_everywhere_honours_optional() {
    let (_cache, _store, router) = two_tier();
    let index = raw_index(json!({ "playerId": "ghost" })).unwrap();

    let data = router
        .get("Player", &index, &GetOptions::optional())
        .await
        .unwrap();
    assert!(data.is_none());

    let err = router
        .get("Player", &index, &GetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::NotFound { .. }));
}

#[tokio::test]
async fn mget_answers_every_query_in_order() {
    let (_cache, store, router) = two_tier();
    let p1 = raw_index(json!({ "playerId": "p1" })).unwrap();
    let p2 = raw_index(json!({ "playerId": "p2" })).unwrap();
    store
        .set("Player", &p2, record(json!({ "name": "Bea" })))
        .await
        .unwrap();

    let results = router
        .mget(
            &[Query::new("Player", p1), Query::new("Player", p2)],
            &GetOptions::optional(),
        )
        .await
        .unwrap();

    assert_eq!(results, vec![None, Some(json!({ "name": "Bea" }))]);
}

#[tokio::test]
async fn list_uses_first_read_vault() {
    let (cache, store, router) = two_tier();
    let index = raw_index(json!({ "playerId": "p1" })).unwrap();
    store
        .set("Player", &index, record(json!({ "name": "Ann" })))
        .await
        .unwrap();

    let listed = router
        .list("Player", &Default::default(), &ListOptions::default())
        .await
        .unwrap();
    assert!(listed.is_empty());

    cache
        .set("Player", &index, record(json!({ "name": "Ann" })))
        .await
        .unwrap();
    let listed = router
        .list("Player", &Default::default(), &ListOptions::default())
        .await
        .unwrap();
    assert_eq!(listed, vec![index]);
}

#[tokio::test]
async fn unrouted_topic_is_an_adapter_error() {
    let (_cache, _store, router) = two_tier();
    let index = raw_index(json!({ "guildId": "g1" })).unwrap();

    let err = router
        .set("Guild", &index, record(json!({})))
        .await
        .unwrap_err();
    assert_eq!(err, AdapterError::NoRoute("Guild".to_string()));
}

#[test]
fn route_to_unknown_vault_is_rejected() {
    let err = VaultRouter::new()
        .with_vault("cache", Arc::new(InMemoryVault::new("cache")))
        .with_route(VaultRouteConfig::symmetric("Player", &["cache", "store"]))
        .err()
        .unwrap();
    assert!(matches!(err, ArchivistError::Config(_)));

    let err = VaultRouter::new()
        .with_vault("cache", Arc::new(InMemoryVault::new("cache")))
        .with_route(VaultRouteConfig {
            topic: "Player".to_string(),
            read_order: vec!["cache".to_string()],
            write_order: Vec::new(),
        })
        .err()
        .unwrap();
    assert!(matches!(err, ArchivistError::Config(_)));
}

#[tokio::test]
async fn router_built_from_topic_routes() {
    let mut topics = TopicRegistry::new();
    topics
        .register(TopicDescriptor::new("Player", &["playerId"]).with_vaults(&["memory"]))
        .unwrap();

    let config = topics
        .routes()
        .into_iter()
        .fold(ArchivistConfig::new(), ArchivistConfig::route);

    let memory = InMemoryVault::new("memory");
    let mut vaults: HashMap<String, Arc<dyn PersistenceAdapter>> = HashMap::new();
    vaults.insert("memory".to_string(), Arc::new(memory.clone()));
    let router = VaultRouter::from_config(&config, vaults).unwrap();

    let index = raw_index(json!({ "playerId": "p1" })).unwrap();
    router
        .add("Player", &index, record(json!({ "name": "Ann" })))
        .await
        .unwrap();
    assert_eq!(memory.count("Player").await, 1);

    let err = router
        .add("Player", &index, record(json!({ "name": "Ann" })))
        .await
        .unwrap_err();
    assert!(matches!(err, AdapterError::AlreadyExists { .. }));
}
