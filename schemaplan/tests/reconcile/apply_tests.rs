use super::support::*;

fn blog_with_comments() -> Snapshot {
    let mut snapshot = blog();
    snapshot.collections.push(Collection::new("comments"));
    snapshot.fields.extend([
        Field::new("comments", "id", FieldType::Uuid).primary_key(),
        Field::new("comments", "body", FieldType::Text),
        Field::new("comments", "post_id", FieldType::Uuid),
    ]);
    snapshot
        .relations
        .push(Relation::new("comments", "post_id", "posts").on_delete(OnDelete::Cascade));
    snapshot
}

const COMMENT_PLAN: [&str; 5] = [
    "create collection comments",
    "create field comments.id",
    "create field comments.body",
    "create field comments.post_id",
    "create relation comments.post_id -> posts",
];

#[tokio::test]
async fn plan_for_new_collection_is_ordered() {
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");
    assert_eq!(rendered(&plan.operations), COMMENT_PLAN);
    assert_eq!(plan.base_hash.as_deref(), Some(blog().hash().as_str()));
}

#[tokio::test]
async fn failure_in_transaction_rolls_back_everything() {
    let (mut repository, executor) = live(&blog());
    let mut executor = executor.fail_on("add_foreign_key comments.post_id");
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect_err("injected failure");

    let (operation, cause) = match err {
        SchemaError::Execution { operation, cause } => (operation, cause),
        other => panic!("expected Execution, got {other}"),
    };
    assert_eq!(operation.to_string(), COMMENT_PLAN[4]);
    assert!(matches!(cause, ApplyFailure::Executor(_)));

    assert_eq!(executor.tables(), MemoryExecutor::from_snapshot(&blog()).tables());
    assert!(!repository.in_transaction());
    assert!(captured(&repository).await.schema_eq(&blog()));
}

#[tokio::test]
async fn failure_without_transactions_reports_high_water_mark() {
    let (mut repository, executor) = live_non_transactional(&blog());
    let mut executor = executor.fail_on("add_column comments.post_id");
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect_err("injected failure");
    assert!(err.left_residual_changes());

    let (completed, failed, remaining, cause) = match err {
        SchemaError::PartialApply {
            completed,
            failed,
            remaining,
            cause,
        } => (completed, failed, remaining, cause),
        other => panic!("expected PartialApply, got {other}"),
    };
    assert_eq!(rendered(&completed), COMMENT_PLAN[..3]);
    assert_eq!(failed.to_string(), COMMENT_PLAN[3]);
    assert_eq!(rendered(&remaining), COMMENT_PLAN[4..]);
    assert!(matches!(cause, ApplyFailure::Executor(_)));

    let comments = executor.table("comments").expect("completed DDL kept");
    assert_eq!(comments.columns.keys().collect::<Vec<_>>(), ["body", "id"]);

    // Re-planning picks up exactly where the batch stopped.
    let live_schema = captured(&repository).await;
    let rest = diff(&live_schema, &blog_with_comments()).expect("re-diff");
    assert_eq!(rendered(&rest), COMMENT_PLAN[3..]);
}

#[tokio::test(start_paused = true)]
async fn timeout_rolls_back_the_batch() {
    let (mut repository, executor) = live(&blog());
    let mut executor = executor.with_delay(Duration::from_secs(1));
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");
    let options = ApplyOptions::default().with_timeout(Duration::from_millis(1500));

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &options)
        .await
        .expect_err("timeout");

    let (operation, cause) = match err {
        SchemaError::Execution { operation, cause } => (operation, cause),
        other => panic!("expected Execution, got {other}"),
    };
    assert_eq!(operation.to_string(), COMMENT_PLAN[1]);
    assert!(matches!(cause, ApplyFailure::Timeout(limit) if limit == Duration::from_millis(1500)));
    assert!(executor.table("comments").is_none());
    assert!(captured(&repository).await.schema_eq(&blog()));
}

#[tokio::test(start_paused = true)]
async fn timeout_without_transactions_keeps_finished_operations() {
    let (mut repository, executor) = live_non_transactional(&blog());
    let mut executor = executor.with_delay(Duration::from_secs(1));
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");
    let options = ApplyOptions::default().with_timeout(Duration::from_millis(1500));

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &options)
        .await
        .expect_err("timeout");

    let (completed, failed, cause) = match err {
        SchemaError::PartialApply {
            completed,
            failed,
            cause,
            ..
        } => (completed, failed, cause),
        other => panic!("expected PartialApply, got {other}"),
    };
    assert_eq!(rendered(&completed), COMMENT_PLAN[..1]);
    assert_eq!(failed.to_string(), COMMENT_PLAN[1]);
    assert!(matches!(cause, ApplyFailure::Timeout(_)));
    assert!(executor.table("comments").is_some());
}

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let (mut repository, mut executor) = live(&blog());
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let err = orchestrator::apply(
        &mut repository,
        &mut executor,
        &plan,
        &ApplyOptions::default().with_cancel(signal),
    )
    .await
    .expect_err("cancelled");

    assert!(matches!(err, SchemaError::Cancelled));
    assert!(executor.calls().is_empty());
    assert!(!err.left_residual_changes());
}

#[tokio::test(start_paused = true)]
async fn cancel_mid_batch_rolls_back() {
    let (mut repository, executor) = live(&blog());
    let mut executor = executor.with_delay(Duration::from_secs(1));
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");
    let (handle, signal) = cancel_pair();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1500)).await;
        handle.cancel();
    });

    let err = orchestrator::apply(
        &mut repository,
        &mut executor,
        &plan,
        &ApplyOptions::default().with_cancel(signal),
    )
    .await
    .expect_err("cancelled");
    canceller.await.expect("canceller task");

    let (operation, cause) = match err {
        SchemaError::Execution { operation, cause } => (operation, cause),
        other => panic!("expected Execution, got {other}"),
    };
    assert_eq!(operation.to_string(), COMMENT_PLAN[1]);
    assert!(matches!(cause, ApplyFailure::Cancelled));
    assert_eq!(executor.tables(), MemoryExecutor::from_snapshot(&blog()).tables());
}

#[tokio::test]
async fn dry_run_reports_plan_without_executing() {
    let (mut repository, mut executor) = live(&blog());
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");

    let report = orchestrator::apply(
        &mut repository,
        &mut executor,
        &plan,
        &ApplyOptions::default().with_dry_run(true),
    )
    .await
    .expect("dry run");

    assert!(report.dry_run);
    assert_eq!(rendered(&report.applied), COMMENT_PLAN);
    assert!(executor.calls().is_empty());
    assert!(captured(&repository).await.schema_eq(&blog()));
}

#[tokio::test]
async fn drift_after_planning_is_detected() {
    let (mut repository, mut executor) = live(&blog());
    let plan = schemaplan::plan(&blog(), &blog_with_comments()).expect("plan");

    repository.insert_field(Field::new("posts", "subtitle", FieldType::Text));

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect_err("stale plan");
    let (expected, actual) = match err {
        SchemaError::StaleDiff { expected, actual } => (expected, actual),
        other => panic!("expected StaleDiff, got {other}"),
    };
    assert_eq!(expected, blog().hash());
    assert_ne!(expected, actual);
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn empty_plan_is_a_no_op() {
    let (mut repository, mut executor) = live(&blog());
    let plan = schemaplan::plan(&blog(), &blog()).expect("plan");
    assert!(plan.is_empty());
    assert_eq!(plan.summary.total(), 0);

    let report = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect("apply");
    assert!(report.is_noop());
    assert!(report.transactional);
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn reconcile_reports_executor_mode() {
    let (mut repository, mut executor) = live_non_transactional(&blog());

    let reconciliation = schemaplan::reconcile(
        &mut repository,
        &mut executor,
        &blog_with_comments(),
        &ApplyOptions::default(),
    )
    .await
    .expect("reconcile");

    assert!(!reconciliation.report.transactional);
    assert_eq!(rendered(&reconciliation.report.applied), COMMENT_PLAN);
    assert!(reconciliation.plan.base_hash.is_none());
    assert!(executor.has_foreign_key("comments", "post_id"));
}

#[tokio::test]
async fn invalid_desired_snapshot_is_rejected_before_apply() {
    let (mut repository, mut executor) = live(&blog());
    let mut desired = blog_with_comments();
    desired.fields.push(Field::new("comments", "id", FieldType::Text));

    let err = schemaplan::reconcile(&mut repository, &mut executor, &desired, &ApplyOptions::default())
        .await
        .expect_err("duplicate field");

    assert!(matches!(err, SchemaError::Validation(ref e) if e.has_code("duplicate_field")));
    assert!(executor.calls().is_empty());
}
