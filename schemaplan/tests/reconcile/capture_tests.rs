use super::support::*;
use schemaplan::{FieldMeta, RelationMeta, RepositoryError};

fn system_collection(name: &str) -> Collection {
    Collection::new(name).with_meta(CollectionMeta {
        system: true,
        ..CollectionMeta::default()
    })
}

fn system_field(collection: &str, name: &str) -> Field {
    let mut field = Field::new(collection, name, FieldType::Uuid);
    field.meta = Some(FieldMeta {
        system: true,
        ..FieldMeta::default()
    });
    field
}

/// `blog` plus a system users table, a system field on posts and a user
/// relation that points at the system table.
fn repository_with_system_entities() -> MemoryRepository {
    let mut repository = MemoryRepository::from_snapshot(&blog());
    repository.insert_collection(system_collection("directus_users"));
    repository.insert_field(system_field("directus_users", "id").primary_key());
    repository.insert_field(system_field("posts", "user_created"));

    let mut system_relation = Relation::new("posts", "user_created", "directus_users");
    system_relation.meta = Some(RelationMeta {
        system: true,
        ..RelationMeta::default()
    });
    repository.insert_relation(system_relation);

    repository.insert_field(Field::new("posts", "editor_id", FieldType::Uuid));
    repository.insert_relation(Relation::new("posts", "editor_id", "directus_users"));
    repository
}

#[tokio::test]
async fn system_entities_are_left_out() {
    let repository = repository_with_system_entities();
    let snapshot = captured(&repository).await;

    assert!(snapshot.collection("directus_users").is_none());
    assert!(snapshot.field("directus_users", "id").is_none());
    assert!(snapshot.field("posts", "user_created").is_none());
    assert!(snapshot.relation("posts", "user_created").is_none());

    let editor = snapshot.relation("posts", "editor_id").expect("user relation kept");
    assert_eq!(editor.related_collection.as_deref(), Some("directus_users"));
    assert!(schemaplan::validate_snapshot(&snapshot, "captured").is_ok());
}

#[tokio::test]
async fn relation_into_system_collection_diffs_cleanly() {
    let repository = repository_with_system_entities();
    let snapshot = captured(&repository).await;

    let operations = diff(&snapshot, &snapshot).expect("diff");
    assert!(operations.is_empty());

    let mut without_editor = snapshot.clone();
    without_editor.relations.clear();
    let operations = diff(&snapshot, &without_editor).expect("diff");
    assert_eq!(rendered(&operations), vec!["drop relation posts.editor_id -> directus_users"]);
}

#[tokio::test]
async fn instance_ids_are_stripped() {
    let repository = repository_with_system_entities();
    assert!(
        repository
            .field("posts", "editor_id")
            .and_then(|f| f.meta.as_ref())
            .and_then(|m| m.id)
            .is_some()
    );

    let snapshot = captured(&repository).await;
    let field = snapshot.field("posts", "editor_id").expect("field captured");
    assert_eq!(field.meta.as_ref().and_then(|m| m.id), None);
    let json = snapshot.to_json_pretty().expect("serialize");
    assert!(!json.contains("\"id\": "), "ids leaked into {json}");
}

#[tokio::test]
async fn capture_can_be_limited_to_one_collection() {
    let repository = MemoryRepository::from_snapshot(&blog_v2());
    let snapshot = capture(&repository, Some("posts")).await.expect("capture posts");

    assert_eq!(snapshot.collections.len(), 1);
    assert_eq!(snapshot.collections[0].collection, "posts");
    assert!(snapshot.fields.iter().all(|f| f.collection == "posts"));
    assert_eq!(snapshot.fields.len(), 3);
    assert_eq!(snapshot.relations.len(), 1);
    assert_eq!(snapshot.relations[0].field, "author_id");

    let missing = capture(&repository, Some("nope")).await.expect("capture missing");
    assert!(missing.is_empty());
}

#[tokio::test]
async fn read_failure_yields_no_snapshot() {
    let mut repository = MemoryRepository::from_snapshot(&blog());
    repository.fail_reads_with(RepositoryError::Unavailable {
        message: "connection refused".to_string(),
    });

    let err = capture(&repository, None).await.expect_err("capture should fail");
    assert!(
        matches!(err, SchemaError::Repository(RepositoryError::Unavailable { .. })),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn snapshot_survives_a_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("schema").join("snapshot.json");
    let (repository, _) = live(&blog_v2());
    let snapshot = captured(&repository).await;

    schemaplan::loader::save_snapshot(&path, &snapshot).expect("save");
    let loaded = schemaplan::loader::load_snapshot(&path).expect("load");

    assert_eq!(loaded.hash(), snapshot.hash());
    assert!(diff(&loaded, &blog_v2()).expect("diff").is_empty());
}

#[tokio::test]
async fn names_outside_ascii_identifiers_round_trip() {
    let snapshot = Snapshot::new(
        vec![Collection::new("café"), Collection::new("2fa_codes")],
        vec![
            Field::new("café", "id", FieldType::Uuid).primary_key(),
            Field::new("café", "plat du jour", FieldType::Text),
            Field::new("2fa_codes", "id", FieldType::Uuid).primary_key(),
            Field::new("2fa_codes", "café_id", FieldType::Uuid),
        ],
        vec![Relation::new("2fa_codes", "café_id", "café")],
    );
    let (repository, _) = live(&snapshot);
    let live_schema = captured(&repository).await;

    assert!(live_schema.schema_eq(&snapshot));
    assert!(diff(&live_schema, &snapshot).expect("diff").is_empty());
    assert!(diff(&live_schema, &live_schema).expect("diff").is_empty());
}

#[test]
fn unsupported_version_is_rejected_before_parsing() {
    let document = r#"{"version": 2, "sourceVersion": "9.0.0", "collections": "not even a list"}"#;
    let err = Snapshot::from_json(document).expect_err("version 2");
    assert!(
        matches!(err, SchemaError::UnsupportedVersion { found: 2, supported: 1 }),
        "unexpected error: {err}"
    );

    let err = Snapshot::from_json(r#"{"collections": []}"#).expect_err("no version");
    assert!(matches!(err, SchemaError::Validation(ref e) if e.has_code("missing_version")));
}
