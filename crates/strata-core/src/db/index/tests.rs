use super::*;
use crate::{
    KEY_PROPERTY,
    db::{
        data::{Entity, Property},
        query::{FilterOp, FilterProperty},
        store::{KvStore, MemoryStore, Subspace, Transaction, metadata_version},
    },
    error::{ErrorClass, ErrorOrigin},
    key::{IdOrName, PathElement},
    test_support::{PROJECT, entity, memory_env, root_key},
};
use std::{sync::Arc, time::Duration};

fn greeting_index(ancestor: bool, properties: Vec<IndexProperty>) -> CompositeIndex {
    let mut definition = CompositeIndexDefinition::new(PROJECT, "Greeting", ancestor, properties);
    definition.id = Some(7);

    CompositeIndex::new(Subspace::from_prefix(b"ci".to_vec()), "", definition)
}

fn child_key(depth: usize) -> EntityKey {
    let pairs = (0..depth).map(|level| {
        let kind = if level + 1 == depth { "Greeting" } else { "Book" };
        (kind, IdOrName::Id(i64::try_from(level).unwrap_or(0) + 1))
    });

    EntityKey::new(PROJECT, "", KeyPath::from_pairs(pairs))
}

async fn merge_one(
    store: &MemoryStore,
    definitions: &IndexDefinitions,
    definition: CompositeIndexDefinition,
) -> Vec<CompositeIndexDefinition> {
    let tr = store.create_transaction().expect("transaction should open");
    let added = definitions
        .merge(&tr, PROJECT, vec![definition])
        .await
        .expect("merge should succeed");
    tr.commit().await.expect("commit should succeed");

    added
}

//
// composite keys
//

#[test]
fn ancestor_indexes_hold_one_row_per_proper_ancestor() {
    let index = greeting_index(true, vec![IndexProperty::asc("n")]);

    for (depth, rows) in [(1, 0), (2, 1), (3, 2)] {
        let subject = entity(child_key(depth), &[("n", 1_i64.into())]);
        let keys = index.encode_keys(&subject, None).expect("keys should encode");
        assert_eq!(keys.len(), rows, "depth {depth}");
    }
}

#[test]
fn entities_without_an_indexed_property_are_skipped() {
    let index = greeting_index(false, vec![IndexProperty::asc("n"), IndexProperty::asc("tag")]);
    let subject = entity(root_key("Greeting", 1), &[("n", 1_i64.into())]);

    assert!(index.encode_keys(&subject, None).expect("keys should encode").is_empty());
}

#[test]
fn multi_valued_properties_index_every_combination() {
    let index = greeting_index(false, vec![IndexProperty::asc("tag"), IndexProperty::desc("n")]);
    let subject = Entity::new(
        root_key("Greeting", 1),
        vec![
            Property::new("tag", "a"),
            Property::new("tag", "b"),
            Property::new("n", 1_i64),
            Property::new("n", 2_i64),
            Property::new("n", 3_i64),
        ],
    );

    let keys = index.encode_keys(&subject, None).expect("keys should encode");
    assert_eq!(keys.len(), 6);
    assert!(keys.iter().all(|key| index.subspace().contains(key)));
}

#[test]
fn ancestor_rows_decode_back_to_the_full_key() {
    let index = greeting_index(true, vec![IndexProperty::desc("n")]);
    let key = child_key(3);
    let subject = entity(key.clone(), &[("n", 5_i64.into())]);
    let stamp = Versionstamp::from_parts(9, 1);

    for encoded in index.encode_keys(&subject, Some(stamp)).expect("keys should encode") {
        let entry = index
            .decode(&KeyValue {
                key: encoded,
                value: Vec::new(),
            })
            .expect("row should decode");
        assert_eq!(entry.key, key);
        assert_eq!(entry.properties, vec![("n".to_string(), Value::Int64(5))]);
        assert_eq!(entry.commit_vs, stamp);
        assert_eq!(entry.deleted_vs, None);
    }
}

#[test]
fn truncated_rows_are_index_corruption() {
    let index = greeting_index(false, vec![IndexProperty::asc("n")]);
    let err = index
        .decode(&KeyValue {
            key: b"ci\x01".to_vec(),
            value: Vec::new(),
        })
        .expect_err("row is too short");

    assert_eq!(err.class, ErrorClass::Corruption);
    assert_eq!(err.origin, ErrorOrigin::Index);
}

#[test]
fn visibility_follows_commit_and_delete_stamps() {
    let entry = IndexEntry {
        key: root_key("Greeting", 1),
        properties: Vec::new(),
        commit_vs: Versionstamp::from_parts(5, 0),
        deleted_vs: Some(Versionstamp::from_parts(8, 0)),
    };

    assert!(!entry.is_visible(None));
    assert!(!entry.is_visible(Some(Versionstamp::from_parts(5, 0))));
    assert!(entry.is_visible(Some(Versionstamp::from_parts(6, 0))));
    assert!(!entry.is_visible(Some(Versionstamp::from_parts(8, 0))));
}

//
// slices
//

fn filter(name: &str, filters: Vec<(FilterOp, Value)>) -> FilterProperty {
    FilterProperty {
        name: name.to_string(),
        filters,
    }
}

#[test]
fn repeated_inequalities_keep_the_tightest_bounds() {
    let index = greeting_index(false, vec![IndexProperty::asc("n")]);
    let slice = |filters: Vec<(FilterOp, Value)>| {
        index
            .get_slice(&[filter("n", filters)], None, None, None, false)
            .expect("slice should plan")
    };

    let both = slice(vec![
        (FilterOp::GreaterThan, 5_i64.into()),
        (FilterOp::GreaterThan, 3_i64.into()),
    ]);
    assert_eq!(both, slice(vec![(FilterOp::GreaterThan, 5_i64.into())]));

    let stops = slice(vec![
        (FilterOp::LessThan, 9_i64.into()),
        (FilterOp::LessThanOrEqual, 20_i64.into()),
    ]);
    assert_eq!(stops, slice(vec![(FilterOp::LessThan, 9_i64.into())]));
}

#[test]
fn descending_columns_keep_the_tightest_bounds() {
    let index = greeting_index(false, vec![IndexProperty::desc("n")]);
    let slice = |filters: Vec<(FilterOp, Value)>| {
        index
            .get_slice(&[filter("n", filters)], None, None, None, false)
            .expect("slice should plan")
    };

    let both = slice(vec![
        (FilterOp::GreaterThan, 3_i64.into()),
        (FilterOp::GreaterThan, 5_i64.into()),
    ]);
    assert_eq!(both, slice(vec![(FilterOp::GreaterThan, 5_i64.into())]));
}

#[test]
fn key_ranges_stay_inside_the_ancestor() {
    let index = KindIndex::new(Subspace::from_prefix(b"ki".to_vec()), PROJECT, "", "Greeting");
    let book = |id| KeyPath::from_pairs([("Book", IdOrName::Id(id))]);
    let greeting_under = |parent, id| {
        let mut path = book(parent);
        path.push(PathElement::with_id("Greeting", id));
        Value::Reference(EntityKey::new(PROJECT, "", path))
    };
    let ancestor = book(2);
    let scoped = index
        .get_slice(&[], Some(&ancestor), None, None, false)
        .expect("slice should plan");

    // bounds outside the ancestor leave its range untouched
    let wider = filter(
        KEY_PROPERTY,
        vec![
            (FilterOp::GreaterThan, greeting_under(1, 1)),
            (FilterOp::LessThan, greeting_under(9, 1)),
        ],
    );
    let slice = index
        .get_slice(&[wider], Some(&ancestor), None, None, false)
        .expect("slice should plan");
    assert_eq!(slice, scoped);

    // a bound inside it narrows only its own side
    let inside = filter(KEY_PROPERTY, vec![(FilterOp::GreaterThan, greeting_under(2, 4))]);
    let (start, stop) = index
        .get_slice(&[inside], Some(&ancestor), None, None, false)
        .expect("slice should plan");
    assert!(start.key() > scoped.0.key());
    assert_eq!(stop, scoped.1);
}

//
// definitions
//

#[tokio::test]
async fn merge_adds_each_structure_once() {
    let (store, directories) = memory_env();
    let definitions = IndexDefinitions::new(directories);
    let shape = || {
        CompositeIndexDefinition::new(
            PROJECT,
            "Greeting",
            false,
            vec![IndexProperty::asc("author"), IndexProperty::desc("date")],
        )
    };

    let added = merge_one(&store, &definitions, shape()).await;
    assert_eq!(added.len(), 1);
    let id = added[0].id.expect("merged definitions get an id");
    assert!(id > 0 && id < 1 << 63);
    assert!(!added[0].ready);

    assert!(merge_one(&store, &definitions, shape()).await.is_empty());

    let reordered = CompositeIndexDefinition::new(
        PROJECT,
        "Greeting",
        false,
        vec![IndexProperty::desc("date"), IndexProperty::asc("author")],
    );
    let added = merge_one(&store, &definitions, reordered).await;
    assert_eq!(added.len(), 1);
    assert_ne!(added[0].id, Some(id));

    let tr = store.create_transaction().expect("transaction should open");
    let all = definitions
        .get_definitions(&tr, PROJECT)
        .await
        .expect("definitions should load");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn definition_changes_refresh_cached_reads() {
    let (store, directories) = memory_env();
    let definitions = IndexDefinitions::new(directories);
    let added = merge_one(
        &store,
        &definitions,
        CompositeIndexDefinition::new(PROJECT, "Greeting", true, vec![IndexProperty::asc("n")]),
    )
    .await;

    let tr = store.create_transaction().expect("transaction should open");
    let before = definitions
        .get_definitions(&tr, PROJECT)
        .await
        .expect("definitions should load");
    assert!(before.iter().all(|def| !def.ready));
    let version = metadata_version(&tr).await.expect("metadata read");

    let mut ready = added[0].clone();
    ready.ready = true;
    definitions
        .put_definition(&tr, &ready)
        .await
        .expect("put should succeed");
    definitions.mark_schema_change(&tr).expect("mark should succeed");
    tr.commit().await.expect("commit should succeed");

    let tr = store.create_transaction().expect("transaction should open");
    assert_ne!(metadata_version(&tr).await.expect("metadata read"), version);
    let after = definitions
        .get_definitions(&tr, PROJECT)
        .await
        .expect("definitions should load");
    assert_eq!(after, vec![ready]);
}

#[tokio::test]
async fn definition_changes_fire_the_trigger_watch() {
    let (store, directories) = memory_env();
    let definitions = IndexDefinitions::new(directories);

    let watcher = store.create_transaction().expect("transaction should open");
    let watch = watcher
        .watch(&definitions.trigger_key())
        .await
        .expect("watch should register");
    watcher.commit().await.expect("commit should succeed");

    merge_one(
        &store,
        &definitions,
        CompositeIndexDefinition::new(PROJECT, "Greeting", false, vec![IndexProperty::asc("n")]),
    )
    .await;

    tokio::time::timeout(Duration::from_secs(1), watch.changed())
        .await
        .expect("watch should fire")
        .expect("watch should not be cancelled");
}

//
// leader lock
//

fn lock(store: &Arc<MemoryStore>) -> Arc<PollingLock<MemoryStore>> {
    Arc::new(PollingLock::new(
        Arc::clone(store),
        b"lock".to_vec(),
        Duration::from_millis(100),
        Duration::from_secs(1),
    ))
}

#[tokio::test(start_paused = true)]
async fn lock_moves_to_a_contender_only_after_the_lease_lapses() {
    let store = Arc::new(MemoryStore::new());
    let leader = lock(&store);
    let contender = lock(&store);

    leader.start();
    leader.acquire().await.expect("free lock should be taken");
    contender.start();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(leader.is_acquired());
    assert!(!contender.is_acquired());

    leader.stop();
    tokio::time::timeout(Duration::from_secs(5), contender.acquire())
        .await
        .expect("contender should take over")
        .expect("lock channel should stay open");
    assert!(!leader.is_acquired());

    contender.stop();
}

#[tokio::test]
async fn kind_namespaces_lists_only_namespaces_with_the_kind() {
    let (store, directories) = memory_env();
    let definitions = Arc::new(IndexDefinitions::new(Arc::clone(&directories)));
    let manager = IndexManager::new(Arc::clone(&directories), definitions);

    let tr = store.create_transaction().expect("transaction should open");
    for (namespace, kind) in [("b", "Greeting"), ("a", "Greeting"), ("c", "Book")] {
        manager
            .kind_index(&tr, PROJECT, namespace, kind)
            .await
            .expect("kind index should open");
    }
    tr.commit().await.expect("commit should succeed");

    let tr = store.create_transaction().expect("transaction should open");
    let namespaces = manager
        .kind_namespaces(&tr, PROJECT, "Greeting")
        .await
        .expect("namespaces should list");
    assert_eq!(namespaces, vec!["a".to_string(), "b".to_string()]);
}
