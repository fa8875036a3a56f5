use std::fmt;

/// Classified database failure. The kind matters to callers: a unique
/// constraint violation on insert is how idempotent create detects a
/// concurrent duplicate, and must be distinguishable from an outage.
#[derive(Debug)]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    ConnectionFailed { message: String },
    UniqueConstraintViolation { constraint: String },
    RowNotFound,
    QueryFailed { message: String },
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::UniqueConstraintViolation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, DatabaseErrorKind::RowNotFound)
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::RowNotFound,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseErrorKind::ConnectionFailed {
                    message: err.to_string(),
                }
            }
            sqlx::Error::Database(db_err) => {
                // Postgres 23505: unique_violation
                if db_err.code().as_deref() == Some("23505") {
                    DatabaseErrorKind::UniqueConstraintViolation {
                        constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                    }
                } else {
                    DatabaseErrorKind::QueryFailed {
                        message: db_err.to_string(),
                    }
                }
            }
            _ => DatabaseErrorKind::Unknown {
                message: err.to_string(),
            },
        };
        Self { kind }
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DatabaseErrorKind::ConnectionFailed { message } => {
                write!(f, "database connection failed: {}", message)
            }
            DatabaseErrorKind::UniqueConstraintViolation { constraint } => {
                write!(f, "unique constraint violated: {}", constraint)
            }
            DatabaseErrorKind::RowNotFound => write!(f, "row not found"),
            DatabaseErrorKind::QueryFailed { message } => write!(f, "query failed: {}", message),
            DatabaseErrorKind::Unknown { message } => write!(f, "database error: {}", message),
        }
    }
}

impl std::error::Error for DatabaseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_is_classified() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(err.is_not_found());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn pool_timeout_is_a_connection_failure() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(matches!(
            err.kind(),
            DatabaseErrorKind::ConnectionFailed { .. }
        ));
    }
}
