//! Tests for database initialization and the songs table schema

use sqlx::Row;
use tunecraft_common::db::init_database;

#[tokio::test]
async fn test_init_creates_database_file_and_schema() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tunecraft.db");

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists());

    let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'songs'")
        .fetch_optional(&pool)
        .await
        .unwrap();
    assert!(row.is_some());
}

#[tokio::test]
async fn test_init_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tunecraft.db");

    let pool = init_database(&db_path).await.unwrap();
    drop(pool);

    // Second startup against the same file must not fail or lose data
    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO songs DEFAULT VALUES")
        .execute(&pool)
        .await
        .unwrap();
    drop(pool);

    let pool = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_new_rows_get_safe_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tunecraft.db");
    let pool = init_database(&db_path).await.unwrap();

    sqlx::query("INSERT INTO songs DEFAULT VALUES")
        .execute(&pool)
        .await
        .unwrap();

    let row = sqlx::query(
        "SELECT status, variants, status_check_count, provider_task_id FROM songs WHERE id = 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();

    assert_eq!(row.get::<String, _>("status"), "PENDING");
    assert_eq!(row.get::<String, _>("variants"), "[]");
    assert_eq!(row.get::<i64, _>("status_check_count"), 0);
    assert_eq!(row.get::<Option<String>, _>("provider_task_id"), None);
}
