//! Advertisement model and persistence for the adboard service.
//!
//! Every function here takes a plain [`Connection`]. Callers that need a
//! scoped transaction pass a `rusqlite::Transaction`, which dereferences to
//! a connection, and decide themselves whether to commit.

pub mod validation;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;

pub use validation::{validate_create, validate_patch, AdvertPatch, FieldError, NewAdvert};

/// Storage format of `advertisements.create_time`.
const CREATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Character limits enforced by the `<column>_len` CHECK constraints.
const COLUMN_LIMITS: &[(&str, usize)] = &[("title", 32), ("description", 200), ("owner", 50)];

/// Errors that can occur during advertisement operations.
#[derive(Debug, Error)]
pub enum AdvertError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("advertisement not found: {0}")]
    NotFound(i64),
    #[error("title already taken: {0}")]
    TitleTaken(String),
    #[error("value for column '{column}' exceeds {limit} characters")]
    ValueTooLong { column: String, limit: usize },
}

/// A persisted advertisement.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Advertisement {
    /// Store-generated primary key.
    pub id: i64,
    /// Unique title, at most 32 characters.
    pub title: String,
    pub description: Option<String>,
    /// Set by the store on insert, never updated.
    pub create_time: NaiveDateTime,
    pub owner: Option<String>,
}

impl Advertisement {
    /// Renders `create_time` as an ISO-8601 string without a UTC offset.
    pub fn creation_time_iso(&self) -> String {
        self.create_time.format(CREATE_TIME_FORMAT).to_string()
    }
}

/// Fetches a single advertisement by primary key.
pub fn get_by_id(conn: &Connection, id: i64) -> Result<Advertisement, AdvertError> {
    conn.query_row(
        "SELECT id, title, description, create_time, owner
         FROM advertisements WHERE id = ?1",
        [id],
        map_row_to_advert,
    )
    .optional()?
    .ok_or(AdvertError::NotFound(id))
}

/// Inserts a new advertisement and returns its generated id.
pub fn create(conn: &Connection, advert: &NewAdvert) -> Result<i64, AdvertError> {
    conn.execute(
        "INSERT INTO advertisements (title) VALUES (?1)",
        params![advert.title],
    )
    .map_err(|e| classify_write_error(e, &advert.title))?;

    let id = conn.last_insert_rowid();
    tracing::debug!(id, "advertisement inserted");
    Ok(id)
}

/// Applies every field present in `changes` to an existing advertisement.
///
/// All assignments go out in a single UPDATE, so they land together or not
/// at all. Fields that are `None` keep their stored value.
pub fn patch(conn: &Connection, id: i64, changes: &AdvertPatch) -> Result<(), AdvertError> {
    get_by_id(conn, id)?;

    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1usize;

    if let Some(title) = &changes.title {
        set_parts.push(format!("title = ?{}", idx));
        values.push(Box::new(title.clone()));
        idx += 1;
    }
    if let Some(description) = &changes.description {
        set_parts.push(format!("description = ?{}", idx));
        values.push(Box::new(description.clone()));
        idx += 1;
    }
    if let Some(owner) = &changes.owner {
        set_parts.push(format!("owner = ?{}", idx));
        values.push(Box::new(owner.clone()));
        idx += 1;
    }

    if set_parts.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "UPDATE advertisements SET {} WHERE id = ?{}",
        set_parts.join(", "),
        idx
    );
    values.push(Box::new(id));

    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let title = changes.title.as_deref().unwrap_or_default();
    conn.execute(&sql, params.as_slice())
        .map_err(|e| classify_write_error(e, title))?;
    Ok(())
}

/// Deletes an advertisement.
pub fn delete(conn: &Connection, id: i64) -> Result<(), AdvertError> {
    get_by_id(conn, id)?;
    conn.execute("DELETE FROM advertisements WHERE id = ?1", [id])?;
    Ok(())
}

/// Maps constraint violations raised by an INSERT or UPDATE to domain errors.
///
/// The only UNIQUE constraint on the table is `title`; CHECK constraints are
/// named `<column>_len`.
fn classify_write_error(err: rusqlite::Error, title: &str) -> AdvertError {
    if let rusqlite::Error::SqliteFailure(code, message) = &err {
        if code.code == rusqlite::ErrorCode::ConstraintViolation {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                return AdvertError::TitleTaken(title.to_string());
            }
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_CHECK {
                let limit = message
                    .as_deref()
                    .and_then(|m| m.strip_prefix("CHECK constraint failed: "))
                    .and_then(|name| name.strip_suffix("_len"))
                    .and_then(|column| COLUMN_LIMITS.iter().find(|(c, _)| *c == column));
                if let Some((column, limit)) = limit {
                    return AdvertError::ValueTooLong {
                        column: column.to_string(),
                        limit: *limit,
                    };
                }
            }
        }
    }
    AdvertError::Database(err)
}

fn map_row_to_advert(row: &Row) -> rusqlite::Result<Advertisement> {
    let create_time: String = row.get(3)?;
    let create_time = NaiveDateTime::parse_from_str(&create_time, CREATE_TIME_FORMAT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Advertisement {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        create_time,
        owner: row.get(4)?,
    })
}
