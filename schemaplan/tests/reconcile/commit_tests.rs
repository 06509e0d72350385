use super::support::*;
use schemaplan::{MetadataRepository, MetadataWrite, RepositoryError};

/// Metadata store whose transaction boundaries can stall or fail.
struct Unreliable {
    inner: MemoryRepository,
    begin_delay: Option<Duration>,
    commit_delay: Option<Duration>,
    commit_fails: bool,
}

impl Unreliable {
    fn new(snapshot: &Snapshot) -> Self {
        Self {
            inner: MemoryRepository::from_snapshot(snapshot),
            begin_delay: None,
            commit_delay: None,
            commit_fails: false,
        }
    }
}

impl MetadataRepository for Unreliable {
    async fn list_collections(&self, filter: Option<&str>) -> Result<Vec<Collection>, RepositoryError> {
        self.inner.list_collections(filter).await
    }

    async fn list_fields(&self, filter: Option<&str>) -> Result<Vec<Field>, RepositoryError> {
        self.inner.list_fields(filter).await
    }

    async fn list_relations(&self, filter: Option<&str>) -> Result<Vec<Relation>, RepositoryError> {
        self.inner.list_relations(filter).await
    }

    async fn write_collection(&mut self, write: MetadataWrite<'_, Collection>) -> Result<(), RepositoryError> {
        self.inner.write_collection(write).await
    }

    async fn write_field(&mut self, write: MetadataWrite<'_, Field>) -> Result<(), RepositoryError> {
        self.inner.write_field(write).await
    }

    async fn write_relation(&mut self, write: MetadataWrite<'_, Relation>) -> Result<(), RepositoryError> {
        self.inner.write_relation(write).await
    }

    async fn begin(&mut self) -> Result<(), RepositoryError> {
        if let Some(delay) = self.begin_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.begin().await
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        if self.commit_fails {
            return Err(RepositoryError::Unavailable {
                message: "commit lost".to_string(),
            });
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.inner.rollback().await
    }
}

fn blog_with_body() -> Snapshot {
    let mut snapshot = blog();
    snapshot.fields.push(Field::new("posts", "body", FieldType::Text));
    snapshot
}

#[tokio::test]
async fn failed_metadata_commit_reports_committed_schema() {
    let mut repository = Unreliable::new(&blog());
    repository.commit_fails = true;
    let mut executor = MemoryExecutor::from_snapshot(&blog());
    let plan = schemaplan::plan(&blog(), &blog_with_body()).expect("plan");

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect_err("commit failure");
    assert!(err.left_residual_changes());

    let (applied, cause) = match err {
        SchemaError::MetadataCommit { applied, cause } => (applied, cause),
        other => panic!("expected MetadataCommit, got {other}"),
    };
    assert_eq!(rendered(&applied), ["create field posts.body"]);
    assert!(matches!(cause, ApplyFailure::Metadata(RepositoryError::Unavailable { .. })));

    let posts = executor.table("posts").expect("posts table");
    assert_eq!(posts.columns.keys().collect::<Vec<_>>(), ["body", "id", "title"]);
    assert!(!repository.inner.in_transaction());
    assert!(captured(&repository.inner).await.schema_eq(&blog()));
}

#[tokio::test(start_paused = true)]
async fn timeout_covers_begin() {
    let mut repository = Unreliable::new(&blog());
    repository.begin_delay = Some(Duration::from_secs(5));
    let mut executor = MemoryExecutor::from_snapshot(&blog());
    let plan = schemaplan::plan(&blog(), &blog_with_body()).expect("plan");
    let options = ApplyOptions::default().with_timeout(Duration::from_secs(1));

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &options)
        .await
        .expect_err("timeout");

    let (operation, cause) = match err {
        SchemaError::Execution { operation, cause } => (operation, cause),
        other => panic!("expected Execution, got {other}"),
    };
    assert_eq!(operation.to_string(), "create field posts.body");
    assert!(matches!(cause, ApplyFailure::Timeout(_)));
    assert!(executor.calls().is_empty());
    assert_eq!(executor.tables(), MemoryExecutor::from_snapshot(&blog()).tables());
}

#[tokio::test(start_paused = true)]
async fn timeout_covers_commit() {
    let mut repository = Unreliable::new(&blog());
    repository.commit_delay = Some(Duration::from_secs(5));
    let mut executor = MemoryExecutor::from_snapshot(&blog());
    let plan = schemaplan::plan(&blog(), &blog_with_body()).expect("plan");
    let options = ApplyOptions::default().with_timeout(Duration::from_secs(1));

    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &options)
        .await
        .expect_err("timeout");

    let (applied, cause) = match err {
        SchemaError::MetadataCommit { applied, cause } => (applied, cause),
        other => panic!("expected MetadataCommit, got {other}"),
    };
    assert_eq!(applied.len(), 1);
    assert!(matches!(cause, ApplyFailure::Timeout(limit) if limit == Duration::from_secs(1)));
    assert!(!repository.inner.in_transaction());
}

#[tokio::test]
async fn scoped_plan_checks_drift_in_its_own_scope() {
    let (mut repository, mut executor) = live(&blog());
    let current = schemaplan::snapshot(&repository, Some("posts"))
        .await
        .expect("scoped capture");
    let mut desired = current.clone();
    desired.fields.push(Field::new("posts", "body", FieldType::Text));

    let plan = schemaplan::plan_scoped(&current, &desired, Some("posts")).expect("plan");
    assert_eq!(plan.base_scope.as_deref(), Some("posts"));

    // Changes outside the scope do not make the plan stale.
    repository.insert_field(Field::new("users", "name", FieldType::Text));
    let report = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect("scoped apply");
    assert_eq!(rendered(&report.applied), ["create field posts.body"]);

    let current = schemaplan::snapshot(&repository, Some("posts"))
        .await
        .expect("scoped capture");
    let mut desired = current.clone();
    desired.fields.retain(|f| f.field != "body");
    let plan = schemaplan::plan_scoped(&current, &desired, Some("posts")).expect("plan");

    repository.insert_field(Field::new("posts", "subtitle", FieldType::Text));
    let err = orchestrator::apply(&mut repository, &mut executor, &plan, &ApplyOptions::default())
        .await
        .expect_err("drift inside scope");
    assert!(matches!(err, SchemaError::StaleDiff { .. }), "unexpected error: {err}");
}
