//! Database module - SQLite storage for profiles and plan documents
//!
//! Plans are stored as one JSON document per student. Listeners registered
//! through `subscribe` get a snapshot after every write from this process;
//! `refresh` picks up writes made by other processes on the same file.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, types::Type};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::identity::{Profile, Role, StudentLink};
use crate::plan::PlanDocument;
use crate::store::{PlanStore, ProfileStore, Snapshot, Subscription};

struct Listener {
    subject_id: String,
    tx: UnboundedSender<Snapshot>,
    /// last revision delivered
    revision: i64,
}

type Listeners = Rc<RefCell<HashMap<u64, Listener>>>;

/// Database wrapper
pub struct Database {
    conn: Connection,
    listeners: Listeners,
    next_listener: Cell<u64>,
}

/// Deep-merge `patch` into `target`: objects merge key by key, anything else replaces
pub fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

impl Database {
    /// Open or create database
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            listeners: Rc::new(RefCell::new(HashMap::new())),
            next_listener: Cell::new(0),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                role TEXT NOT NULL,
                display_name TEXT NOT NULL,
                trainer_id TEXT
            );
            CREATE TABLE IF NOT EXISTS trainers (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS students (
                trainer_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (trainer_id, student_id)
            );
            CREATE TABLE IF NOT EXISTS plans (
                subject_id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Raw stored document and its revision
    fn read(&self, subject_id: &str) -> Result<Option<(String, i64)>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT document, revision FROM plans WHERE subject_id = ?1",
                params![subject_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn revision(&self, subject_id: &str) -> Result<i64, StoreError> {
        Ok(self.read(subject_id)?.map(|(_, revision)| revision).unwrap_or(0))
    }

    fn snapshot(&self, subject_id: &str) -> Result<(Snapshot, i64), StoreError> {
        let (document, revision) = match self.read(subject_id)? {
            Some((text, revision)) => (Some(serde_json::from_str(&text)?), revision),
            None => (None, 0),
        };
        let snapshot = Snapshot {
            subject_id: subject_id.to_string(),
            document,
        };
        Ok((snapshot, revision))
    }

    /// Deliver the current document to every listener on `subject_id`
    fn notify(&self, subject_id: &str) -> Result<usize, StoreError> {
        let (snapshot, revision) = self.snapshot(subject_id)?;
        let mut listeners = self.listeners.borrow_mut();
        let mut delivered = 0;
        listeners.retain(|id, listener| {
            if listener.subject_id != subject_id {
                return true;
            }
            listener.revision = revision;
            if listener.tx.send(snapshot.clone()).is_err() {
                debug!("Dropping listener {} with closed receiver", id);
                return false;
            }
            delivered += 1;
            true
        });
        Ok(delivered)
    }

    /// Deliver snapshots for watched documents changed by someone else.
    /// Returns the number of snapshots delivered.
    pub fn refresh(&self) -> Result<usize, StoreError> {
        let watched: Vec<(String, i64)> = self
            .listeners
            .borrow()
            .values()
            .map(|l| (l.subject_id.clone(), l.revision))
            .collect();

        let mut delivered = 0;
        let mut seen: Vec<String> = Vec::new();
        for (subject_id, last_revision) in watched {
            if seen.contains(&subject_id) {
                continue;
            }
            if self.revision(&subject_id)? != last_revision {
                delivered += self.notify(&subject_id)?;
                seen.push(subject_id);
            }
        }
        Ok(delivered)
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl PlanStore for Database {
    fn get(&self, subject_id: &str) -> Result<Option<PlanDocument>, StoreError> {
        Ok(self.snapshot(subject_id)?.0.document)
    }

    fn subscribe(&self, subject_id: &str) -> Result<Subscription, StoreError> {
        let (snapshot, revision) = self.snapshot(subject_id)?;
        let (tx, rx) = mpsc::unbounded_channel();
        // receiver is alive, first send can't fail
        let _ = tx.send(snapshot);

        let id = self.next_listener.get();
        self.next_listener.set(id + 1);
        self.listeners.borrow_mut().insert(
            id,
            Listener {
                subject_id: subject_id.to_string(),
                tx,
                revision,
            },
        );
        debug!("Listener {} watching plan {}", id, subject_id);

        let listeners = Rc::downgrade(&self.listeners);
        Ok(Subscription::new(subject_id, rx, move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.borrow_mut().remove(&id);
                debug!("Listener {} removed", id);
            }
        }))
    }

    fn upsert(&self, subject_id: &str, document: &PlanDocument, merge: bool) -> Result<(), StoreError> {
        let incoming = serde_json::to_value(document)?;
        let stored = match (merge, self.read(subject_id)?) {
            (true, Some((text, _))) => {
                let mut existing: Value = serde_json::from_str(&text)?;
                merge_json(&mut existing, incoming);
                existing
            }
            _ => incoming,
        };

        self.conn.execute(
            "INSERT INTO plans (subject_id, document, revision, updated_at) VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(subject_id) DO UPDATE SET
                document = excluded.document,
                revision = plans.revision + 1,
                updated_at = excluded.updated_at",
            params![subject_id, serde_json::to_string(&stored)?, Utc::now().to_rfc3339()],
        )?;

        let delivered = self.notify(subject_id)?;
        debug!("Saved plan {} (merge: {}, {} listener(s))", subject_id, merge, delivered);
        Ok(())
    }
}

impl ProfileStore for Database {
    fn profile(&self, principal_id: &str) -> Result<Option<Profile>, StoreError> {
        let profile = self
            .conn
            .query_row(
                "SELECT role, display_name, trainer_id FROM profiles WHERE id = ?1",
                params![principal_id],
                |row| {
                    let role: String = row.get(0)?;
                    let role = role
                        .parse::<Role>()
                        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, e.into()))?;
                    Ok(Profile {
                        role,
                        display_name: row.get(1)?,
                        trainer_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn put_profile(&self, principal_id: &str, profile: &Profile) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO profiles (id, role, display_name, trainer_id) VALUES (?1, ?2, ?3, ?4)",
            params![principal_id, profile.role.as_str(), profile.display_name, profile.trainer_id],
        )?;
        Ok(())
    }

    fn trainer_exists(&self, trainer_id: &str) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM trainers WHERE id = ?1", params![trainer_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn put_trainer(&self, trainer_id: &str, display_name: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO trainers (id, display_name) VALUES (?1, ?2)",
            params![trainer_id, display_name],
        )?;
        Ok(())
    }

    fn link_student(&self, trainer_id: &str, student_id: &str, name: &str) -> Result<(), StoreError> {
        let moved = self.conn.execute(
            "DELETE FROM students WHERE student_id = ?1 AND trainer_id != ?2",
            params![student_id, trainer_id],
        )?;
        if moved > 0 {
            warn!("Student {} moved to trainer {}", student_id, trainer_id);
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO students (trainer_id, student_id, name) VALUES (?1, ?2, ?3)",
            params![trainer_id, student_id, name],
        )?;
        Ok(())
    }

    fn students(&self, trainer_id: &str) -> Result<Vec<StudentLink>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT student_id, name FROM students WHERE trainer_id = ?1 ORDER BY name COLLATE NOCASE",
        )?;

        let students = stmt
            .query_map(params![trainer_id], |row| {
                Ok(StudentLink {
                    student_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(students)
    }
}
