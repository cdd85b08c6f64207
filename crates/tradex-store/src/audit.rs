//! Append-only audit log with PII redaction and retention.

use chrono::NaiveDateTime;
use serde_json::Value;

use crate::db::Store;
use crate::error::StoreError;
use crate::models::AuditEntry;

/// Keys whose values are never persisted verbatim in audit snapshots.
const SENSITIVE_KEYS: [&str; 8] = [
    "password",
    "hashed_password",
    "email",
    "nif",
    "receptor_nif",
    "emisor_nif",
    "username",
    "phone",
];

const REDACTED: &str = "[REDACTED]";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A new audit event. `before`/`after` are free-form JSON snapshots of
/// the touched object and are redacted before they hit the database.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub actor: String,
    pub ip: String,
    pub user_agent: String,
    pub action: String,
    pub object: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

/// Return a copy of `value` with every sensitive key redacted,
/// recursing through objects and arrays.
pub fn redact_pii(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                if SENSITIVE_KEYS.contains(&key.to_lowercase().as_str()) {
                    out.insert(key.clone(), Value::String(REDACTED.into()));
                } else {
                    out.insert(key.clone(), redact_pii(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_pii).collect()),
        other => other.clone(),
    }
}

/// Guard against CSV formula injection: spreadsheet software treats a
/// leading `=`, `+`, `-` or `@` as executable.
fn sanitize_cell(value: &str) -> String {
    match value.chars().next() {
        Some('=') | Some('+') | Some('-') | Some('@') => format!("'{value}"),
        _ => value.to_string(),
    }
}

fn snapshot_json(snapshot: &Option<Value>) -> Result<Option<String>, StoreError> {
    match snapshot {
        Some(value) => {
            let redacted = redact_pii(value);
            Ok(Some(serde_json::to_string(&redacted).map_err(|e| {
                StoreError::Export(format!("cannot serialize audit snapshot: {e}"))
            })?))
        }
        None => Ok(None),
    }
}

impl Store {
    /// Insert an audit record and purge entries older than the
    /// configured retention window.
    pub async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let before = snapshot_json(&record.before)?;
        let after = snapshot_json(&record.after)?;

        sqlx::query(
            "INSERT INTO audit_log (actor, ip, user_agent, action, object, before, after) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.actor)
        .bind(&record.ip)
        .bind(&record.user_agent)
        .bind(&record.action)
        .bind(&record.object)
        .bind(&before)
        .bind(&after)
        .execute(self.pool())
        .await?;

        sqlx::query("DELETE FROM audit_log WHERE timestamp < datetime('now', ?)")
            .bind(format!("-{} days", self.config().audit_retention_days))
            .execute(self.pool())
            .await?;

        Ok(())
    }

    /// Audit entries matching the filter, oldest first.
    pub async fn query_audit(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let mut sql = String::from(
            "SELECT id, timestamp, actor, ip, user_agent, action, object, before, after \
             FROM audit_log WHERE 1=1",
        );
        if filter.actor.is_some() {
            sql.push_str(" AND actor = ?");
        }
        if filter.start.is_some() {
            sql.push_str(" AND timestamp >= ?");
        }
        if filter.end.is_some() {
            sql.push_str(" AND timestamp <= ?");
        }
        sql.push_str(" ORDER BY id");

        let mut query = sqlx::query_as::<_, AuditEntry>(&sql);
        if let Some(actor) = &filter.actor {
            query = query.bind(actor);
        }
        if let Some(start) = &filter.start {
            query = query.bind(start.format(TIMESTAMP_FORMAT).to_string());
        }
        if let Some(end) = &filter.end {
            query = query.bind(end.format(TIMESTAMP_FORMAT).to_string());
        }

        let entries = query.fetch_all(self.pool()).await?;
        Ok(entries)
    }

    /// Matching audit entries as CSV, with the injection guard applied
    /// to every cell.
    pub async fn export_audit_csv(&self, filter: &AuditFilter) -> Result<String, StoreError> {
        let entries = self.query_audit(filter).await?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record([
                "id",
                "timestamp",
                "actor",
                "ip",
                "user_agent",
                "action",
                "object",
                "before",
                "after",
            ])
            .map_err(|e| StoreError::Export(e.to_string()))?;

        for entry in &entries {
            let cell = |value: &Option<String>| sanitize_cell(value.as_deref().unwrap_or(""));
            writer
                .write_record([
                    entry.id.to_string(),
                    sanitize_cell(&entry.timestamp),
                    cell(&entry.actor),
                    cell(&entry.ip),
                    cell(&entry.user_agent),
                    cell(&entry.action),
                    cell(&entry.object),
                    cell(&entry.before),
                    cell(&entry.after),
                ])
                .map_err(|e| StoreError::Export(e.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| StoreError::Export(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| StoreError::Export(e.to_string()))
    }
}
