use super::support::*;

fn blog_with_author() -> Snapshot {
    let mut snapshot = blog();
    snapshot.fields.push(Field::new("posts", "author_id", FieldType::Uuid));
    snapshot.relations.push(Relation::new("posts", "author_id", "users"));
    snapshot
}

fn blog_with_tags() -> Snapshot {
    let mut snapshot = blog();
    snapshot.collections.push(Collection::new("tags"));
    snapshot
        .fields
        .push(Field::new("tags", "id", FieldType::Integer).primary_key());
    snapshot.fields.push(Field::new("tags", "post_id", FieldType::Uuid));
    snapshot.relations.push(Relation::new("tags", "post_id", "posts"));
    snapshot
}

fn triangle() -> Snapshot {
    Snapshot::new(
        vec![Collection::new("a"), Collection::new("b"), Collection::new("c")],
        vec![
            Field::new("a", "id", FieldType::Uuid).primary_key(),
            Field::new("a", "b_id", FieldType::Uuid),
            Field::new("b", "id", FieldType::Uuid).primary_key(),
            Field::new("b", "c_id", FieldType::Uuid),
            Field::new("c", "id", FieldType::Uuid).primary_key(),
            Field::new("c", "a_id", FieldType::Uuid),
        ],
        vec![
            Relation::new("a", "b_id", "b"),
            Relation::new("b", "c_id", "c"),
            Relation::new("c", "a_id", "a"),
        ],
    )
}

#[tokio::test]
async fn adding_a_foreign_key_creates_field_then_relation() {
    let operations = diff(&blog(), &blog_with_author()).expect("diff");
    assert_eq!(
        rendered(&operations),
        vec!["create field posts.author_id", "create relation posts.author_id -> users"]
    );

    let (mut repository, mut executor) = live(&blog());
    orchestrator::apply(
        &mut repository,
        &mut executor,
        &schemaplan::plan(&blog(), &blog_with_author()).expect("plan"),
        &ApplyOptions::default(),
    )
    .await
    .expect("apply");

    assert!(executor.has_foreign_key("posts", "author_id"));
    assert_eq!(
        executor.calls(),
        ["add_column posts.author_id", "add_foreign_key posts.author_id"]
    );
    assert!(captured(&repository).await.schema_eq(&blog_with_author()));
}

#[tokio::test]
async fn dropping_a_collection_tears_down_relation_fields_then_table() {
    let operations = diff(&blog_with_tags(), &blog()).expect("diff");
    assert_eq!(
        rendered(&operations),
        vec![
            "drop relation tags.post_id -> posts",
            "drop field tags.id",
            "drop field tags.post_id",
            "drop collection tags",
        ]
    );

    let (mut repository, mut executor) = live(&blog_with_tags());
    schemaplan::applier::apply(&mut repository, &mut executor, &operations, &ApplyOptions::default())
        .await
        .expect("apply");

    assert!(executor.table("tags").is_none());
    assert!(captured(&repository).await.schema_eq(&blog()));
}

#[tokio::test]
async fn mutual_references_defer_both_relations() {
    let operations = diff(&Snapshot::default(), &cycle_pair()).expect("diff");
    assert_eq!(operations.len(), 8);

    let first_relation = operations
        .iter()
        .position(|op| matches!(op, DiffOperation::CreateRelation { .. }))
        .expect("relations planned");
    assert_eq!(first_relation, 6);
    assert!(
        operations[..6]
            .iter()
            .all(|op| !matches!(op, DiffOperation::CreateRelation { .. }))
    );
    assert!(position(&operations, "create collection a") < position(&operations, "create field a.b_id"));
    assert!(position(&operations, "create collection b") < position(&operations, "create field b.a_id"));

    let mut repository = MemoryRepository::new();
    let mut executor = MemoryExecutor::new();
    schemaplan::applier::apply(&mut repository, &mut executor, &operations, &ApplyOptions::default())
        .await
        .expect("apply");

    assert!(executor.has_foreign_key("a", "b_id"));
    assert!(executor.has_foreign_key("b", "a_id"));
    assert!(captured(&repository).await.schema_eq(&cycle_pair()));
}

#[tokio::test]
async fn three_way_cycle_applies_from_empty() {
    let desired = triangle();
    let operations = diff(&Snapshot::default(), &desired).expect("diff");

    let relations: Vec<usize> = operations
        .iter()
        .enumerate()
        .filter(|(_, op)| matches!(op, DiffOperation::CreateRelation { .. }))
        .map(|(index, _)| index)
        .collect();
    assert_eq!(relations, vec![9, 10, 11]);

    let mut repository = MemoryRepository::new();
    let mut executor = MemoryExecutor::new();
    let reconciliation = schemaplan::reconcile(&mut repository, &mut executor, &desired, &ApplyOptions::default())
        .await
        .expect("reconcile");

    assert_eq!(reconciliation.report.applied.len(), 12);
    for (table, column) in [("a", "b_id"), ("b", "c_id"), ("c", "a_id")] {
        assert!(executor.has_foreign_key(table, column), "missing fk {table}.{column}");
    }

    let again = schemaplan::reconcile(&mut repository, &mut executor, &desired, &ApplyOptions::default())
        .await
        .expect("second reconcile");
    assert!(again.plan.is_empty());
    assert!(again.report.is_noop());
}

#[tokio::test]
async fn relation_to_dropped_collection_is_rejected_before_apply() {
    let mut desired = blog_with_tags();
    desired.collections.retain(|c| c.collection != "posts");
    desired.fields.retain(|f| f.collection != "posts");

    let err = diff(&blog_with_tags(), &desired).expect_err("dangling relation");
    assert!(matches!(err, SchemaError::Dependency { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn folder_is_created_before_the_collections_it_groups() {
    let (mut repository, mut executor) = live(&blog_with_legacy());
    let desired = blog_v2();

    let reconciliation = schemaplan::reconcile(&mut repository, &mut executor, &desired, &ApplyOptions::default())
        .await
        .expect("reconcile");
    let operations = &reconciliation.plan.operations;

    assert!(position(operations, "create collection content") < position(operations, "alter collection posts"));
    assert!(executor.table("content").is_none());
    assert!(!executor.calls().iter().any(|call| call.contains("users.posts")));
}
