//! Registered events, persisted in SQLite.
//!
//! The connection sits behind a mutex that is held for one statement at a
//! time, never across a remote call. The primary key on `identifier` is what
//! turns a second registration of the same event into a conflict.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::contract::EventEndpoints;
use crate::error::ServiceError;

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        identifier TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        token TEXT NOT NULL,
        endpoints TEXT NOT NULL
    )
"#;

/// One registered event.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub identifier: String,
    pub title: String,
    pub url: String,
    /// Bearer token shared with the platform.
    pub token: String,
    pub endpoints: EventEndpoints,
}

impl std::fmt::Debug for EventRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("identifier", &self.identifier)
            .field("title", &self.title)
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        info!("Event store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, ServiceError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE_SQL)?;
        debug!("In-memory event store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ServiceError> {
        self.conn
            .lock()
            .map_err(|_| ServiceError::Store("event store lock poisoned".to_string()))
    }

    /// Insert a new event; [`ServiceError::Conflict`] if the identifier exists.
    #[instrument(skip(self, record), fields(identifier = %record.identifier))]
    pub fn insert(&self, record: &EventRecord) -> Result<(), ServiceError> {
        let endpoints = serde_json::to_string(&record.endpoints)
            .map_err(|e| ServiceError::Store(format!("serialize endpoints: {e}")))?;

        let result = self.conn()?.execute(
            "INSERT INTO events (identifier, title, url, token, endpoints)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.identifier,
                record.title,
                record.url,
                record.token,
                endpoints
            ],
        );

        match result {
            Ok(_) => {
                debug!("Event record inserted");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(ServiceError::Conflict("Event already exists".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, identifier: &str) -> Result<Option<EventRecord>, ServiceError> {
        let row = self
            .conn()?
            .query_row(
                "SELECT identifier, title, url, token, endpoints FROM events WHERE identifier = ?1",
                params![identifier],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((identifier, title, url, token, endpoints)) = row else {
            return Ok(None);
        };
        let endpoints = serde_json::from_str(&endpoints)
            .map_err(|e| ServiceError::Store(format!("corrupt endpoints for {identifier}: {e}")))?;

        Ok(Some(EventRecord {
            identifier,
            title,
            url,
            token,
            endpoints,
        }))
    }

    /// Delete an event; returns whether a row was removed.
    #[instrument(skip(self))]
    pub fn delete(&self, identifier: &str) -> Result<bool, ServiceError> {
        let rows = self
            .conn()?
            .execute("DELETE FROM events WHERE identifier = ?1", params![identifier])?;
        debug!(rows, "Event record deleted");
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ListEndpoints;
    use std::collections::BTreeMap;

    fn record(identifier: &str) -> EventRecord {
        EventRecord {
            identifier: identifier.to_string(),
            title: "Conference".to_string(),
            url: "https://events.example.org/event/1".to_string(),
            token: "s3cret".to_string(),
            endpoints: EventEndpoints {
                tags: ListEndpoints {
                    create: "https://events.example.org/tags/create".to_string(),
                    list: "https://events.example.org/tags".to_string(),
                },
                editable_types: "https://events.example.org/editable-types".to_string(),
                file_types: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn insert_then_get_returns_the_record() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&record("evt-1")).unwrap();
        assert_eq!(store.get("evt-1").unwrap(), Some(record("evt-1")));
        assert_eq!(store.get("evt-2").unwrap(), None);
    }

    #[test]
    fn second_insert_of_same_identifier_conflicts() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&record("evt-1")).unwrap();
        let err = store.insert(&record("evt-1")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn delete_reports_whether_a_row_went_away() {
        let store = EventStore::open_in_memory().unwrap();
        store.insert(&record("evt-1")).unwrap();
        assert!(store.delete("evt-1").unwrap());
        assert!(!store.delete("evt-1").unwrap());
        assert_eq!(store.get("evt-1").unwrap(), None);
    }

    #[test]
    fn records_survive_reopening_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.sqlite3");
        EventStore::open(&path).unwrap().insert(&record("evt-1")).unwrap();
        let reopened = EventStore::open(&path).unwrap();
        assert_eq!(reopened.get("evt-1").unwrap(), Some(record("evt-1")));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let rendered = format!("{:?}", record("evt-1"));
        assert!(!rendered.contains("s3cret"));
    }
}
