use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// Column mapping invalid or missing required logical fields. Aborts the
    /// whole import before any row is processed.
    SchemaMismatch(String),
    /// A required field is absent on one row. Never escalates past the row.
    Validation(String),
    /// An asset with the same name already exists. Never escalates past the row.
    Duplicate(String),
    /// Recoverable store failure. Aborts the current batch only.
    TransientStore(String),
    /// Any other store failure. Fatal to the job.
    Store(String),
    /// Failure moving/resizing/updating images after the record was persisted.
    MediaPipeline(String),
    Parse(String),
    Io(String),
    Config(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::SchemaMismatch(msg) => write!(f, "Schema mismatch: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Duplicate(msg) => write!(f, "Duplicate record: {}", msg),
            AppError::TransientStore(msg) => write!(f, "Transient store error: {}", msg),
            AppError::Store(msg) => write!(f, "Store error: {}", msg),
            AppError::MediaPipeline(msg) => write!(f, "Media pipeline error: {}", msg),
            AppError::Parse(msg) => write!(f, "Parse error: {}", msg),
            AppError::Io(msg) => write!(f, "IO error: {}", msg),
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl AppError {
    /// Classify a sqlx failure into transient (batch-abort) vs fatal (job-abort).
    /// I/O failures, pool exhaustion and SQLITE_BUSY/SQLITE_LOCKED are worth
    /// retrying on the next batch; everything else stops the import.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        if is_transient(&err) {
            AppError::TransientStore(format!("{}: {}", context, err))
        } else {
            AppError::Store(format!("{}: {}", context, err))
        }
    }

    pub fn is_transient_store(&self) -> bool {
        matches!(self, AppError::TransientStore(_))
    }

    /// Same variant, message prefixed with locating context (batch/row index).
    pub fn with_context(self, context: &str) -> Self {
        match self {
            AppError::SchemaMismatch(msg) => {
                AppError::SchemaMismatch(format!("{}: {}", context, msg))
            }
            AppError::Validation(msg) => AppError::Validation(format!("{}: {}", context, msg)),
            AppError::Duplicate(msg) => AppError::Duplicate(format!("{}: {}", context, msg)),
            AppError::TransientStore(msg) => {
                AppError::TransientStore(format!("{}: {}", context, msg))
            }
            AppError::Store(msg) => AppError::Store(format!("{}: {}", context, msg)),
            AppError::MediaPipeline(msg) => {
                AppError::MediaPipeline(format!("{}: {}", context, msg))
            }
            AppError::Parse(msg) => AppError::Parse(format!("{}: {}", context, msg)),
            AppError::Io(msg) => AppError::Io(format!("{}: {}", context, msg)),
            AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
        }
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db) => {
            // SQLite primary result codes: 5 = SQLITE_BUSY, 6 = SQLITE_LOCKED.
            // Extended codes keep the primary code in the low byte ("261",
            // "517", ...), so match the common extended forms as well.
            match db.code().as_deref() {
                Some("5") | Some("6") | Some("261") | Some("262") | Some("517") => true,
                _ => {
                    let msg = db.message();
                    msg.contains("database is locked") || msg.contains("database table is locked")
                }
            }
        }
        _ => false,
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
