//! SQLite error mapping.
//!
//! Maps `tokio_rusqlite::Error`, `rusqlite::Error` and JSON body errors to
//! `StoreError` from `routebook_core::store`.

use routebook_core::store::StoreError;

/// Maps a rusqlite error to a StoreError.
///
/// # Error Mapping
///
/// - Busy or locked database → `StoreError::Unavailable`
/// - Connection errors → `StoreError::Unavailable`
/// - All other errors → `StoreError::QueryFailed`
fn map_rusqlite_error(err: &rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if matches!(
                sqlite_err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ) =>
        {
            StoreError::Unavailable(format!("Database busy: {err}"))
        }

        rusqlite::Error::SqliteFailure(sqlite_err, _)
            if sqlite_err.code == rusqlite::ErrorCode::CannotOpen =>
        {
            StoreError::Unavailable(format!("Cannot open database: {err}"))
        }

        _ => StoreError::QueryFailed(err.to_string()),
    }
}

/// Maps a tokio_rusqlite error to a StoreError.
///
/// This is the main entry point for error mapping in async code. JSON errors
/// raised inside a connection closure arrive boxed in `Error::Other` and map
/// to `StoreError::Serialization`.
pub fn map_tokio_rusqlite_error(err: tokio_rusqlite::Error) -> StoreError {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite_err) => map_rusqlite_error(&rusqlite_err),
        tokio_rusqlite::Error::ConnectionClosed | tokio_rusqlite::Error::Close(_) => {
            StoreError::Unavailable("Connection closed unexpectedly".to_string())
        }
        tokio_rusqlite::Error::Other(other) => match other.downcast::<serde_json::Error>() {
            Ok(json_err) => map_json_error(*json_err),
            Err(other) => StoreError::QueryFailed(other.to_string()),
        },
        other => StoreError::QueryFailed(other.to_string()),
    }
}

/// Maps a JSON (de)serialization error on a document body.
pub fn map_json_error(err: serde_json::Error) -> StoreError {
    StoreError::Serialization(err.to_string())
}

/// Wraps a JSON error so it can leave a `tokio_rusqlite` closure.
pub fn wrap_json(err: serde_json::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(err))
}
