use super::support::*;

fn fixtures() -> Vec<(&'static str, Snapshot)> {
    vec![
        ("empty", Snapshot::default()),
        ("blog", blog()),
        ("blog_with_legacy", blog_with_legacy()),
        ("blog_v2", blog_v2()),
        ("cycle_pair", cycle_pair()),
    ]
}

#[tokio::test]
async fn capture_then_diff_against_itself_is_empty() {
    for (name, snapshot) in fixtures() {
        let (repository, _) = live(&snapshot);
        let captured = captured(&repository).await;

        assert!(captured.schema_eq(&snapshot), "{name}: capture changed the schema");
        let operations = diff(&captured, &snapshot).expect("diff");
        assert!(operations.is_empty(), "{name}: {:#?}", rendered(&operations));
    }
}

#[tokio::test]
async fn capture_is_deterministic() {
    let (repository, _) = live(&blog_v2());
    let first = captured(&repository).await;
    let second = captured(&repository).await;

    assert_eq!(first, second);
    assert_eq!(first.hash(), second.hash());
    assert!(first.fields.iter().all(|f| f.meta.as_ref().is_none_or(|m| m.id.is_none())));
    assert!(first.relations.iter().all(|r| r.meta.as_ref().is_none_or(|m| m.id.is_none())));
}

#[tokio::test]
async fn applying_a_diff_reaches_the_desired_schema() {
    for (from_name, from) in fixtures() {
        for (to_name, to) in fixtures() {
            let (mut repository, mut executor) = live(&from);
            let operations = diff(&captured(&repository).await, &to).expect("diff");

            schemaplan::applier::apply(&mut repository, &mut executor, &operations, &ApplyOptions::default())
                .await
                .unwrap_or_else(|err| panic!("{from_name} -> {to_name}: {err}"));

            let live_schema = captured(&repository).await;
            assert!(live_schema.schema_eq(&to), "{from_name} -> {to_name}: schema mismatch");
            assert_eq!(
                executor.tables(),
                MemoryExecutor::from_snapshot(&to).tables(),
                "{from_name} -> {to_name}: catalog mismatch"
            );

            let leftover = diff(&live_schema, &to).expect("re-diff");
            assert!(leftover.is_empty(), "{from_name} -> {to_name}: {:#?}", rendered(&leftover));
        }
    }
}

#[tokio::test]
async fn forward_then_backward_restores_the_original() {
    let original = blog_with_legacy();
    let target = blog_v2();
    let (mut repository, mut executor) = live(&original);
    let original_tables = executor.tables().clone();

    let forward = diff(&original, &target).expect("forward diff");
    schemaplan::applier::apply(&mut repository, &mut executor, &forward, &ApplyOptions::default())
        .await
        .expect("forward apply");

    let backward = diff(&target, &original).expect("backward diff");
    schemaplan::applier::apply(&mut repository, &mut executor, &backward, &ApplyOptions::default())
        .await
        .expect("backward apply");

    assert!(captured(&repository).await.schema_eq(&original));
    assert_eq!(executor.tables(), &original_tables);
}

#[test]
fn every_create_follows_what_it_depends_on() {
    let operations = diff(&blog_with_legacy(), &blog_v2()).expect("diff");

    for (index, operation) in operations.iter().enumerate() {
        let before = &operations[..index];
        let created_earlier = |text: String| before.iter().any(|op| op.to_string() == text);

        match operation {
            DiffOperation::CreateField { field } if blog_v2().collection(&field.collection).is_some() => {
                if blog_with_legacy().collection(&field.collection).is_none() {
                    assert!(
                        created_earlier(format!("create collection {}", field.collection)),
                        "{operation} before its collection"
                    );
                }
            }
            DiffOperation::CreateRelation { relation } => {
                if blog_with_legacy().field(&relation.collection, &relation.field).is_none() {
                    assert!(
                        created_earlier(format!("create field {}", relation.path())),
                        "{operation} before its field"
                    );
                }
            }
            DiffOperation::DropCollection { collection } => {
                let name = collection.collection.as_str();
                assert!(
                    operations[index + 1..]
                        .iter()
                        .all(|op| op.collection() != name || !matches!(op, DiffOperation::DropField { .. })),
                    "{operation} before its fields were dropped"
                );
            }
            _ => {}
        }
    }
}

#[test]
fn diff_is_antisymmetric_in_kind() {
    let forward = diff(&blog_with_legacy(), &blog_v2()).expect("forward");
    let backward = diff(&blog_v2(), &blog_with_legacy()).expect("backward");

    let mut forward_inverted: Vec<String> = forward.iter().map(|op| op.inverse().to_string()).collect();
    let mut backward_rendered = rendered(&backward);
    forward_inverted.sort();
    backward_rendered.sort();
    assert_eq!(forward_inverted, backward_rendered);
}
