//! Session behaviour over the in-memory driver: shared connections,
//! commit cadence and partition routing.

use std::sync::Arc;

use futures::future::join_all;
use sqlbridge::config::PartitionDescriptor;
use sqlbridge::core::credentials::ObfuscatedPasswords;
use sqlbridge::{
    ConnectionConfig, ConnectionsConfig, DbError, DriverCatalog, MemoryDatabase, SessionContext,
    SessionState, SqlValue, StatementRole, Variables,
};
use tokio::sync::Barrier;

fn context(db: &MemoryDatabase) -> Arc<SessionContext> {
    let mut catalog = DriverCatalog::with_builtins();
    catalog.register_driver("postgresql", Arc::new(db.driver()));
    catalog.register_driver("mysql", Arc::new(db.driver()));
    SessionContext::builder(catalog)
        .variables(Variables::new().with("PG_PORT", "5433"))
        .credentials(ObfuscatedPasswords)
        .build()
}

fn warehouse() -> ConnectionConfig {
    ConnectionConfig::new("warehouse", "postgres")
        .with_host("pg.internal", "${PG_PORT}", "dw")
        .with_credentials("etl", "secret")
}

fn order(id: i64) -> Vec<SqlValue> {
    vec![SqlValue::Integer(id), SqlValue::Text(format!("order {id}"))]
}

#[tokio::test]
async fn test_grouped_steps_commit_as_one_unit() {
    let db = MemoryDatabase::new();
    let ctx = context(&db);
    let barrier = Arc::new(Barrier::new(2));

    let steps = (0..2i64).map(|step| {
        let ctx = ctx.clone();
        let barrier = barrier.clone();
        async move {
            let mut session = ctx.session(warehouse())?;
            session.set_commit_size(2).await?;
            session.connect(Some("G"), None).await?;
            barrier.wait().await;

            session.prepare_insert(None, "orders", &["id", "name"], false).await?;
            for n in 0..5 {
                session
                    .insert_row(StatementRole::Insert, &order(step * 10 + n), true, true)
                    .await?;
            }
            session.empty_and_commit(StatementRole::Insert, true, 1).await?;
            let copy = session.copy();
            session.disconnect().await?;
            Ok::<_, DbError>((copy, session.state()))
        }
    });

    let mut copies = Vec::new();
    for outcome in join_all(steps).await {
        let (copy, state) = outcome.unwrap();
        assert_eq!(state, SessionState::Closed);
        copies.push(copy);
    }
    copies.sort_unstable();
    assert_eq!(copies, vec![1, 2]);

    let stats = db.stats();
    assert_eq!(stats.connections_opened, 1);
    assert_eq!(stats.connections_closed, 1);
    assert_eq!(stats.commits, 1);
    assert_eq!(db.committed().len(), 10);
    assert_eq!(db.open_connections(), 0);
    assert!(ctx.registry().is_empty().await);
}

#[tokio::test]
async fn test_commit_cadence_is_floor_of_rows_over_commit_size() {
    for (rows, commit_size) in [(10i64, 3i64), (9, 3), (4, 5), (7, 1)] {
        let db = MemoryDatabase::new();
        let ctx = context(&db);
        let mut session = ctx.session(warehouse()).unwrap();
        session.set_commit_size(commit_size).await.unwrap();
        session.connect(None, None).await.unwrap();
        session
            .prepare_insert(None, "orders", &["id", "name"], false)
            .await
            .unwrap();

        let mut signalled = 0;
        for id in 0..rows {
            if session
                .insert_row(StatementRole::Insert, &order(id), true, true)
                .await
                .unwrap()
            {
                signalled += 1;
            }
        }

        let expected = rows / commit_size;
        assert_eq!(signalled, expected, "{rows} rows, commit size {commit_size}");
        assert_eq!(db.stats().commits as i64, expected);
        assert_eq!(db.committed().len() as i64, expected * commit_size);

        session
            .empty_and_commit(StatementRole::Insert, true, 1)
            .await
            .unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(db.committed().len() as i64, rows);
    }
}

#[tokio::test]
async fn test_partitioned_definition_from_yaml() {
    let yaml = r#"
connections:
  - name: shards
    type: mysql
    username: app
    password: apppw
    extra_options:
      mysql.useSSL: "false"
    cluster:
      enabled: true
      partitions:
        - id: p0
          host: shard0
          port: "3306"
          database: orders
        - id: p1
          host: shard1
          port: "3307"
          database: orders
          username: reporting
          password: other
"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, yaml.as_bytes()).unwrap();
    let definitions = ConnectionsConfig::load(file.path()).unwrap();
    let shards = definitions.require("SHARDS").unwrap().clone();

    let db = MemoryDatabase::new();
    let ctx = context(&db);

    let mut first = ctx.session(shards.clone()).unwrap();
    first.connect(None, Some("p1")).await.unwrap();
    let request = db.last_connect().unwrap();
    assert!(request.url.starts_with("mysql://shard1:3307/orders?"));
    assert!(request.url.ends_with("useSSL=false"));
    assert_eq!(request.username, "reporting");
    assert_eq!(request.password, "other");
    assert_eq!(first.partition_id(), Some("p1"));

    let mut second = ctx.session(shards).unwrap();
    second.connect(None, Some("p0")).await.unwrap();
    let request = db.last_connect().unwrap();
    assert!(request.url.starts_with("mysql://shard0:3306/orders"));
    assert_eq!(request.username, "app");

    let mut third = ctx.session(definitions.require("shards").unwrap().clone()).unwrap();
    let err = third.connect(None, Some("p7")).await.unwrap_err();
    assert!(matches!(err, DbError::PartitionNotFound { .. }));
    assert_eq!(third.state(), SessionState::Closed);

    first.disconnect().await.unwrap();
    second.disconnect().await.unwrap();
    assert_eq!(db.open_connections(), 0);
}

#[tokio::test]
async fn test_obfuscated_password_reaches_driver() {
    let db = MemoryDatabase::new();
    let ctx = context(&db);
    let stored = ObfuscatedPasswords.encode("s3cret!");

    let mut cfg = warehouse().with_credentials("etl", stored);
    cfg.cluster.enabled = true;
    cfg.cluster.partitions = vec![PartitionDescriptor::new("east", "pg-east", "5432", "dw")];

    let mut session = ctx.session(cfg).unwrap();
    session.connect(None, Some("east")).await.unwrap();
    let request = db.last_connect().unwrap();
    assert_eq!(request.url, "postgresql://pg-east:5432/dw");
    assert_eq!(request.password, "s3cret!");
    session.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_script_runs_statement_by_statement() {
    let db = MemoryDatabase::new();
    let ctx = context(&db);
    let mut session = ctx.session(warehouse()).unwrap();
    session.connect(None, None).await.unwrap();

    let result = session
        .exec_statements(
            "INSERT INTO audit VALUES ('a;b');\n\
             UPDATE audit SET seen = 1; /* tidy up; */\n\
             -- nothing to do here;\n",
        )
        .await
        .unwrap();
    assert_eq!(result.lines_output, 1);
    assert_eq!(result.lines_updated, 1);

    let executed = db.executed();
    assert!(executed.contains(&"INSERT INTO audit VALUES ('a;b')".to_string()));
    assert!(executed.contains(&"UPDATE audit SET seen = 1".to_string()));
    assert!(!executed.iter().any(|sql| sql.contains("nothing to do")));
    session.disconnect().await.unwrap();
}
