use serde_json::json;
use tempfile::tempdir;

use tradex_store::audit::{AuditFilter, AuditRecord};
use tradex_store::config::{Config, RuntimeEnv};
use tradex_store::models::Role;
use tradex_store::users::verify_password;
use tradex_store::Store;

fn record(actor: &str) -> AuditRecord {
    AuditRecord {
        actor: actor.to_string(),
        ip: "127.0.0.1".to_string(),
        user_agent: "tests".to_string(),
        action: "update".to_string(),
        object: "user".to_string(),
        before: None,
        after: None,
    }
}

#[cfg(unix)]
fn file_mode(path: &std::path::Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[tokio::test]
async fn open_creates_schema_and_seeds_demo_users() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));

    let store = Store::open(&config).await.unwrap();
    let users = store.all_users().await.unwrap();
    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["demo2@fixhub.es", "demo@fixhub.es"]);

    let owner = store.get_user("demo@fixhub.es").await.unwrap().unwrap();
    assert_eq!(owner.role, "Owner");
    assert!(verify_password("demo123!", &owner.hashed_password).unwrap());
    store.close().await;

    // Re-opening must not duplicate the seed.
    let store = Store::open(&config).await.unwrap();
    assert_eq!(store.all_users().await.unwrap().len(), 2);
    store.close().await;
}

#[tokio::test]
async fn production_open_seeds_nothing() {
    let dir = tempdir().unwrap();
    let mut config = Config::with_db_path(dir.path().join("users.db"));
    config.env = RuntimeEnv::Production;

    let store = Store::open(&config).await.unwrap();
    assert!(store.all_users().await.unwrap().is_empty());
    store.close().await;
}

#[cfg(unix)]
#[tokio::test]
async fn open_enforces_owner_only_permissions() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("data").join("users.db");
    let config = Config::with_db_path(&db_path);

    let store = Store::open(&config).await.unwrap();
    assert_eq!(file_mode(&db_path), 0o600);
    assert_eq!(file_mode(dir.path().join("data").as_path()), 0o700);
    store.close().await;
}

#[tokio::test]
async fn add_user_enforces_the_password_policy() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));
    let store = Store::open(&config).await.unwrap();

    let err = store.add_user("ana@fixhub.es", "short", Role::User).await;
    assert!(matches!(
        err,
        Err(tradex_store::StoreError::InvalidPassword(_))
    ));
    assert!(store.get_user("ana@fixhub.es").await.unwrap().is_none());

    store
        .add_user("ana@fixhub.es", "s3cure-pass!", Role::User)
        .await
        .unwrap();
    let user = store.get_user("ana@fixhub.es").await.unwrap().unwrap();
    assert!(verify_password("s3cure-pass!", &user.hashed_password).unwrap());
    store.close().await;
}

#[tokio::test]
async fn device_usage_upserts_a_counter() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));
    let store = Store::open(&config).await.unwrap();

    store.record_login("demo@fixhub.es", "device-1").await.unwrap();
    store
        .increment_device_usage("demo@fixhub.es", "device-1")
        .await
        .unwrap();
    store
        .increment_device_usage("demo@fixhub.es", "device-1")
        .await
        .unwrap();

    let usage = store
        .device_usage("demo@fixhub.es", "device-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.quote_count, 2);

    assert!(store
        .device_usage("demo@fixhub.es", "device-2")
        .await
        .unwrap()
        .is_none());
    store.close().await;
}

#[tokio::test]
async fn audit_snapshots_are_redacted() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));
    let store = Store::open(&config).await.unwrap();

    let mut rec = record("admin");
    rec.before = Some(json!({"username": "demo@fixhub.es", "role": "User"}));
    rec.after = Some(json!({"password": "demo123!", "role": "Owner"}));
    store.append_audit(&rec).await.unwrap();

    let entries = store.query_audit(&AuditFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let before = entries[0].before.as_deref().unwrap();
    let after = entries[0].after.as_deref().unwrap();
    assert!(before.contains("[REDACTED]"));
    assert!(!before.contains("demo@fixhub.es"));
    assert!(after.contains("[REDACTED]"));
    assert!(!after.contains("demo123!"));
    assert!(after.contains("Owner"));
    store.close().await;
}

#[tokio::test]
async fn audit_retention_purges_old_entries_on_insert() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));
    let store = Store::open(&config).await.unwrap();

    sqlx::query(
        "INSERT INTO audit_log (timestamp, actor, action) \
         VALUES (datetime('now', '-40 days'), 'ancient', 'login')",
    )
    .execute(store.pool())
    .await
    .unwrap();

    store.append_audit(&record("recent")).await.unwrap();

    let entries = store.query_audit(&AuditFilter::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor.as_deref(), Some("recent"));
    store.close().await;
}

#[tokio::test]
async fn audit_query_filters_by_actor() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));
    let store = Store::open(&config).await.unwrap();

    store.append_audit(&record("alice")).await.unwrap();
    store.append_audit(&record("bob")).await.unwrap();
    store.append_audit(&record("alice")).await.unwrap();

    let filter = AuditFilter {
        actor: Some("alice".to_string()),
        ..Default::default()
    };
    let entries = store.query_audit(&filter).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|entry| entry.actor.as_deref() == Some("alice")));
    store.close().await;
}

#[tokio::test]
async fn csv_export_quotes_formula_prefixes() {
    let dir = tempdir().unwrap();
    let config = Config::with_db_path(dir.path().join("users.db"));
    let store = Store::open(&config).await.unwrap();

    store.append_audit(&record("=cmd()|whoami")).await.unwrap();

    let csv = store
        .export_audit_csv(&AuditFilter::default())
        .await
        .unwrap();
    assert!(csv.starts_with("id,timestamp,actor"));
    assert!(csv.contains("'=cmd()|whoami"));
    store.close().await;
}
