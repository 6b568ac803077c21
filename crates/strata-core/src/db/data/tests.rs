use super::*;
use crate::{
    db::{
        index::{CompositeIndexDefinition, IndexProperty},
        store::{KvStore, MemoryStore},
    },
    error::ErrorClass,
    test_support::{PROJECT, entity, memory_env, root_key},
};

fn data_env(config: &StrataConfig) -> (Arc<MemoryStore>, DataManager) {
    let (store, directories) = memory_env();
    let definitions = Arc::new(IndexDefinitions::new(Arc::clone(&directories)));

    (store, DataManager::new(directories, definitions, config))
}

async fn put_committed(store: &MemoryStore, data: &DataManager, entity: &Entity) -> Versionstamp {
    let tr = store.create_transaction().expect("transaction should open");
    data.put(&tr, entity).await.expect("put should succeed");
    tr.commit().await.expect("commit should succeed")
}

#[tokio::test]
async fn latest_version_is_the_last_committed_put() {
    let (store, data) = data_env(&StrataConfig::default());
    let key = root_key("Greeting", 7);

    put_committed(&store, &data, &entity(key.clone(), &[("text", "hi".into())])).await;
    let second = entity(key.clone(), &[("text", "hello".into())]);
    let stamp = put_committed(&store, &data, &second).await;

    let tr = store.create_transaction().expect("transaction should open");
    let latest = data.get_latest(&tr, &key).await.expect("read should succeed");
    assert_eq!(latest.commit_vs, Some(stamp));
    assert_eq!(latest.entity(), Some(&second));
}

#[tokio::test]
async fn unwritten_entities_have_no_version() {
    let (store, data) = data_env(&StrataConfig::default());
    let key = root_key("Greeting", 1);

    let tr = store.create_transaction().expect("transaction should open");
    data.put(&tr, &entity(key.clone(), &[])).await.expect("put should succeed");

    // versionstamped writes stay invisible until commit
    let latest = data.get_latest(&tr, &key).await.expect("read should succeed");
    assert_eq!(latest.commit_vs, None);
    assert!(!latest.present());
}

#[tokio::test]
async fn delete_leaves_a_tombstone_version() {
    let (store, data) = data_env(&StrataConfig::default());
    let key = root_key("Greeting", 3);
    put_committed(&store, &data, &entity(key.clone(), &[("n", 1_i64.into())])).await;

    let tr = store.create_transaction().expect("transaction should open");
    assert!(data.delete(&tr, &key).await.expect("delete should succeed"));
    let stamp = tr.commit().await.expect("commit should succeed");

    let tr = store.create_transaction().expect("transaction should open");
    let latest = data.get_latest(&tr, &key).await.expect("read should succeed");
    assert_eq!(latest.commit_vs, Some(stamp));
    assert!(!latest.present());
    assert!(!data.delete(&tr, &key).await.expect("second delete should succeed"));
}

#[tokio::test]
async fn oversized_entities_are_rejected_before_writing() {
    let config = StrataConfig {
        max_entity_bytes: 64,
        ..StrataConfig::default()
    };
    let (store, data) = data_env(&config);
    let big = entity(root_key("Greeting", 1), &[("text", "x".repeat(200).into())]);

    let tr = store.create_transaction().expect("transaction should open");
    let err = data.put(&tr, &big).await.expect_err("entity should be too large");
    assert_eq!(err.class, ErrorClass::Validation);
    assert_eq!(err.origin, ErrorOrigin::Data);
}

#[tokio::test]
async fn dangling_index_entries_are_corruption() {
    let (store, data) = data_env(&StrataConfig::default());
    let dangling = IndexEntry {
        key: root_key("Greeting", 9),
        properties: Vec::new(),
        commit_vs: Versionstamp::from_parts(42, 0),
        deleted_vs: None,
    };

    let tr = store.create_transaction().expect("transaction should open");
    let err = data.get_entry(&tr, &dangling).await.expect_err("no such version");
    assert_eq!(err.class, ErrorClass::Corruption);
    assert_eq!(err.origin, ErrorOrigin::Index);
}

#[tokio::test]
async fn rewrites_mark_previous_kind_entries_deleted() {
    let (store, data) = data_env(&StrataConfig::default());
    let key = root_key("Greeting", 5);
    let first = put_committed(&store, &data, &entity(key.clone(), &[("n", 1_i64.into())])).await;
    let second = put_committed(&store, &data, &entity(key.clone(), &[("n", 2_i64.into())])).await;

    let tr = store.create_transaction().expect("transaction should open");
    let kind_index = data
        .indexes()
        .kind_index(&tr, PROJECT, "", "Greeting")
        .await
        .expect("kind index should open");
    let rows = ResultIterator::from_range(&tr, kind_index.subspace().range())
        .list()
        .await
        .expect("scan should succeed");
    let entries: Vec<IndexEntry> = rows
        .iter()
        .map(|kv| kind_index.decode(kv).expect("entry should decode"))
        .collect();

    assert_eq!(entries.len(), 2);
    assert_eq!((entries[0].commit_vs, entries[0].deleted_vs), (first, Some(second)));
    assert_eq!((entries[1].commit_vs, entries[1].deleted_vs), (second, None));

    let version = data.get_entry(&tr, &entries[0]).await.expect("old version exists");
    assert_eq!(version.entity().map(|e| e.values("n").count()), Some(1));
}

#[tokio::test]
async fn writes_maintain_pending_composite_indexes() {
    let (store, data) = data_env(&StrataConfig::default());
    let tr = store.create_transaction().expect("transaction should open");
    let added = data
        .indexes()
        .definitions()
        .merge(
            &tr,
            PROJECT,
            vec![CompositeIndexDefinition::new(
                PROJECT,
                "Greeting",
                false,
                vec![IndexProperty::asc("author"), IndexProperty::desc("n")],
            )],
        )
        .await
        .expect("merge should succeed");
    tr.commit().await.expect("commit should succeed");
    let definition = added.into_iter().next().expect("definition should be added");

    let key = root_key("Greeting", 11);
    let tagged = Entity::new(
        key.clone(),
        vec![
            Property::new("author", "ana"),
            Property::new("n", 1_i64),
            Property::new("n", 2_i64),
        ],
    );
    let stamp = put_committed(&store, &data, &tagged).await;

    let tr = store.create_transaction().expect("transaction should open");
    assert!(data.delete(&tr, &key).await.expect("delete should succeed"));
    let deleted = tr.commit().await.expect("commit should succeed");

    let tr = store.create_transaction().expect("transaction should open");
    let index = data
        .indexes()
        .composite_index(&tr, &definition, "")
        .await
        .expect("composite index should open");
    let rows = ResultIterator::from_range(&tr, index.subspace().range())
        .list()
        .await
        .expect("scan should succeed");
    let entries: Vec<IndexEntry> = rows
        .iter()
        .map(|kv| index.decode(kv).expect("entry should decode"))
        .collect();

    // one row per value of the multi-valued property, descending
    let values: Vec<&Value> = entries.iter().map(|e| &e.properties[1].1).collect();
    assert_eq!(values, vec![&Value::Int64(2), &Value::Int64(1)]);
    assert!(entries.iter().all(|e| e.key == key && e.commit_vs == stamp));
    assert!(entries.iter().all(|e| e.deleted_vs == Some(deleted)));
}
