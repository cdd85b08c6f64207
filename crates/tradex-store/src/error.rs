use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Source database not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid backup {path}: {reason}")]
    InvalidBackup { path: String, reason: String },

    #[error("Permission denied on {path}: {source}")]
    Permission {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Password rejected: {0}")]
    InvalidPassword(String),

    #[error("Password hash error: {0}")]
    Hash(String),

    #[error("Audit export error: {0}")]
    Export(String),
}
