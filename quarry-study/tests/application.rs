use quarry_core::test_utils::TestDatabase;
use quarry_core::{Quarry, Session};
use quarry_study::{Hello, QHello, create_schema};

#[tokio::test]
async fn context_loads() {
    let db = TestDatabase::sqlite().await.expect("pool");
    create_schema(db.pool()).await.expect("schema");
    let session = db.session().await.expect("session");

    let mut hello = Hello::default();
    session.persist(&mut hello).await.expect("persist");

    let query = session.query();
    let q_hello = QHello::hello();
    let found = query
        .select_from(&q_hello)
        .fetch_one()
        .await
        .expect("hello");

    assert_eq!(found, hello);
    assert!(session.contains(&found).await);
}

#[tokio::test]
async fn sync_creates_a_single_table() {
    let pool = Quarry::sqlite_pool("sqlite::memory:").await.expect("pool");
    Quarry::sync::<Hello>(&pool).await.expect("sync");

    let session = Session::begin(&pool).await.expect("session");
    let q_hello = QHello::hello();
    let count = session
        .query()
        .select_from(&q_hello)
        .fetch_count()
        .await
        .expect("count");
    assert_eq!(count, 0);
}
