use thiserror::Error;

/// Catalog store errors.
///
/// `Connect` is fatal at run start; `Schema` means the configured table or
/// columns don't match the store; `Query` covers everything else.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot reach the catalog store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("catalog schema mismatch: {0}")]
    Schema(String),

    #[error("catalog query failed: {0}")]
    Query(#[source] sqlx::Error),
}

/// Map a sqlx error onto the catalog taxonomy.
///
/// SQLSTATE classes: 42S02 (missing table) and 42S22 (missing column) are
/// schema mismatches; 28000 (access denied) and HY000 transport-level
/// failures surface as connection errors.
pub(crate) fn classify(e: sqlx::Error) -> CatalogError {
    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => CatalogError::Connect(e),
        sqlx::Error::ColumnNotFound(col) => CatalogError::Schema(format!("no column '{col}'")),
        sqlx::Error::ColumnDecode { index, .. } => {
            CatalogError::Schema(format!("cannot decode column {index}"))
        }
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("42S02") | Some("42S22") => CatalogError::Schema(db.message().to_string()),
            Some("28000") | Some("08S01") | Some("3D000") => CatalogError::Connect(e),
            _ => CatalogError::Query(e),
        },
        _ => CatalogError::Query(e),
    }
}
