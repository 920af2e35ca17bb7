// Integration tests for zindex
use std::io::Write;
use std::sync::Arc;
use zindex::prelude::*;
use zindex::{IndexConfig, PartitionConfig, SimpleIndex, SortedSetStore};

fn restaurants() -> Vec<Document> {
    vec![
        Document::new("r1").set("name", "Pizza Napoli").set("price", 40).set("loc", (32.0667, 34.8000)),
        Document::new("r2").set("name", "Pizza Roma").set("price", 80).set("loc", (32.0680, 34.7990)),
        Document::new("r3").set("name", "Sushi Bar").set("price", 30).set("loc", (32.0670, 34.8005)),
        Document::new("r4").set("name", "Pizza Haifa").set("price", 30).set("loc", (32.7940, 34.9896)),
    ]
}

fn sorted_ids(docs: &[Document]) -> Vec<String> {
    let mut ids: Vec<String> = docs.iter().map(|d| d.id().to_string()).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_engine_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "stores": [{{"url": "memory://"}}, {{"url": "memory://"}}],
            "partitions": {{"num_partitions": 3, "timeout_ms": 1000}}
        }}"#
    )
    .unwrap();

    let config = EngineConfig::from_file(file.path()).unwrap();
    assert_eq!(config.partitions.num_partitions, 3);
    let engine = Engine::connect(config).await.unwrap();

    let spec = Spec::new(vec![Field::prefix("title", true)]).unwrap();
    engine.create_index("books", spec, IndexKind::Simple).unwrap();
    engine
        .put(
            "books",
            vec![
                Document::with_score("b1", 4.0).set("title", "The Rust Programming Language"),
                Document::with_score("b2", 5.0).set("title", "Programming Rust"),
                Document::with_score("b3", 3.0).set("title", "Learning Go"),
            ],
        )
        .await
        .unwrap();

    let found = engine.search(&Query::new("books").filter_prefix("title", "rust")).await.unwrap();
    assert_eq!(sorted_ids(&found), vec!["b1", "b2"]);

    let found = engine.search(&Query::new("books").filter_prefix("title", "programming")).await.unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].id(), "b2");
}

#[tokio::test]
async fn test_faceted_search_over_partitions() {
    let stores: Vec<Arc<dyn SortedSetStore>> = vec![Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new())];
    let documents = Arc::new(zindex::JsonDocumentStore::new(Arc::new(MemoryStore::new())));
    let config = EngineConfig {
        partitions: PartitionConfig {
            num_partitions: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = Engine::new(stores, documents, config).unwrap();

    let spec = Spec::new(vec![
        Field::fulltext("text", ["name"]),
        Field::numeric("price"),
        Field::geo("loc", 6),
    ])
    .unwrap();
    engine.create_index("places", spec, IndexKind::FullText).unwrap();
    assert_eq!(engine.put("places", restaurants()).await.unwrap(), 4);

    let pizza = Query::new("places").filter_matches("name", "pizza");
    assert_eq!(sorted_ids(&engine.search(&pizza).await.unwrap()), vec!["r1", "r2", "r4"]);

    let nearby = pizza.clone().filter_radius("loc", 32.0667, 34.8000, 2000.0);
    assert_eq!(sorted_ids(&engine.search(&nearby).await.unwrap()), vec!["r1", "r2"]);

    let cheap = nearby.filter_less_equal("price", 50);
    assert_eq!(sorted_ids(&engine.search(&cheap).await.unwrap()), vec!["r1"]);

    let anything_close = Query::new("places").filter_radius("loc", 32.0667, 34.8000, 2000.0);
    assert_eq!(
        sorted_ids(&engine.search(&anything_close).await.unwrap()),
        vec!["r1", "r2", "r3"]
    );
}

#[tokio::test]
async fn test_query_from_json() {
    let engine = Engine::connect(EngineConfig::default()).await.unwrap();
    let spec = Spec::new(vec![Field::prefix("foo", false), Field::numeric("n")]).unwrap();
    engine.create_index("things", spec, IndexKind::Simple).unwrap();
    engine
        .index(
            "things",
            vec![
                Document::new("t1").set("foo", "hello").set("n", 1),
                Document::new("t2").set("foo", "help").set("n", 2),
            ],
        )
        .await
        .unwrap();

    let query: Query = serde_json::from_str(
        r#"{"index_name": "things", "filters": [{"property": "foo", "op": "Prefix", "values": ["hel"]}]}"#,
    )
    .unwrap();
    assert_eq!(query.sort.limit, 10);
    let ids = engine.search_ids(&query).await.unwrap();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn test_stream_in_chunks() {
    let engine = Engine::connect(EngineConfig::default()).await.unwrap();
    let spec = Spec::new(vec![Field::numeric("n")]).unwrap();
    engine.create_index("numbers", spec, IndexKind::Simple).unwrap();

    let stream = (0..1000i64).map(|i| Document::new(format!("n{}", i)).set("n", i));
    assert_eq!(engine.put_stream("numbers", stream, 128).await.unwrap(), 1000);

    let found = engine
        .search(&Query::new("numbers").filter_between("n", 10, 19).limit(0, 100))
        .await
        .unwrap();
    assert_eq!(found.len(), 10);
    assert_eq!(found[0].id(), "n10");
}

#[tokio::test]
async fn test_negative_floats_sort_after_positive() {
    let store: Arc<dyn SortedSetStore> = Arc::new(MemoryStore::new());
    let spec = Spec::new(vec![Field::numeric("temp")]).unwrap();
    let index = SimpleIndex::new("temps", spec, store, &IndexConfig::default()).unwrap();
    index
        .index(vec![
            Document::new("cold").set("temp", -1.5),
            Document::new("warm").set("temp", 2.0),
        ])
        .await
        .unwrap();

    // raw IEEE-754 bits put the sign bit first, so -1.5 ranks above 2.0
    let found = index.get(&Query::new("temps").filter_greater_than("temp", 0.0)).await.unwrap();
    let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["warm", "cold"]);
}

#[tokio::test]
async fn test_drop_index() {
    let engine = Engine::connect(EngineConfig::default()).await.unwrap();
    let spec = Spec::new(vec![Field::prefix("foo", false)]).unwrap();
    engine.create_index("tmp", spec, IndexKind::Simple).unwrap();
    engine.index("tmp", vec![Document::new("x").set("foo", "bar")]).await.unwrap();

    assert!(engine.drop_index("tmp").await.unwrap());
    assert!(matches!(
        engine.search_ids(&Query::new("tmp")).await,
        Err(Error::IndexNotFound(_))
    ));
}
