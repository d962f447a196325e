//! SQLite storage layer for SafeVoice.
//!
//! Owns the schema and all CRUD for panic events, reports, safehouses,
//! bookings, contacts, messages, and NGOs.  Booking workflow steps are
//! applied here so that a status change and its bed-counter effect commit
//! as a single transaction; the legality of each step comes from
//! [`crate::workflow`].

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::workflow::{self, BookingStatus, TransportStatus, WorkflowError};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotFound(String),
    AlreadyExists(String),
    /// A conditional update found the row in a state that forbids the change
    /// (e.g. locating a resolved panic event).
    StateConflict(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
            StorageError::StateConflict(msg) => write!(f, "state conflict: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

/// Generate a random entity id (16 bytes, hex).
pub fn new_entity_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// NGO row.  The plan gates how many safehouses the NGO may register:
/// free = 1, standard = 5, plus = unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgoRow {
    pub id: String,
    pub name: String,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    /// "free", "standard", "plus"
    pub plan: String,
    pub active: bool,
    pub created_at: u64,
}

/// Safehouse limit for a subscription plan, if any.
pub fn plan_safehouse_limit(plan: &str) -> Option<u32> {
    match plan {
        "free" => Some(1),
        "standard" => Some(5),
        _ => None,
    }
}

/// Safehouse row.  Invariant, enforced by a table CHECK and by routing all
/// counter mutation through the booking transitions:
/// `available_beds + reserved_beds + occupied_beds == total_beds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafehouseRow {
    pub id: String,
    pub ngo_id: String,
    pub name: String,
    pub phone: String,
    /// "emergency", "transitional", "long_term"
    pub house_type: String,
    /// Street address sealed with [`crate::crypto`]; never stored in clear.
    pub sealed_address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub total_beds: u32,
    pub available_beds: u32,
    pub reserved_beds: u32,
    pub occupied_beds: u32,
    /// Resource availability flags as a JSON object
    /// (medical/legal/childcare/counseling).
    pub resources: String,
    /// Staff roster as a JSON array.
    pub staff: String,
    pub accepts_children: bool,
    pub accepts_pets: bool,
    pub created_at: u64,
}

/// Booking row.  Exactly one of `user_id` / `anonymous_session_id` is set
/// (table CHECK).  `status` and `transport_status` hold the string forms of
/// the workflow enums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRow {
    pub id: String,
    pub safehouse_id: String,
    pub user_id: Option<String>,
    pub anonymous_session_id: Option<String>,
    /// "pending", "approved", "checked_in", "checked_out", "rejected", "cancelled"
    pub status: String,
    /// "standard", "urgent", "immediate"
    pub urgency: String,
    pub party_size: u32,
    pub special_needs: Option<String>,
    /// "not_required", "requested", "arranged", "in_transit", "completed"
    pub transport_status: String,
    /// Pickup details as JSON, set while arranging transport.
    pub transport: Option<String>,
    /// Intake record as JSON.
    pub intake: Option<String>,
    /// Safety assessment as JSON.
    pub assessment: Option<String>,
    pub assessment_completed: bool,
    /// Activated support services as JSON.
    pub services: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    pub decided_at: Option<u64>,
    pub checked_in_at: Option<u64>,
    pub checked_out_at: Option<u64>,
    pub cancel_reason: Option<String>,
}

/// Panic event row.  Exactly one of `user_id` / `anonymous_session_id` is
/// set.  Terminal statuses are "resolved", "false_alarm", "aborted".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanicEventRow {
    pub id: String,
    pub user_id: Option<String>,
    pub anonymous_session_id: Option<String>,
    /// "active", "resolved", "false_alarm", "aborted"
    pub status: String,
    /// "button", "shake", "voice", "timer"
    pub trigger_type: String,
    /// "low", "moderate", "high", "critical"
    pub risk_level: String,
    pub countdown_seconds: u32,
    pub created_at: u64,
    pub updated_at: u64,
    pub resolved_at: Option<u64>,
    pub resolution_note: Option<String>,
}

/// One location sample in a panic event's history (append-only; the latest
/// sample is the current location).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanicLocationRow {
    pub event_id: String,
    pub lat: f64,
    pub lon: f64,
    pub accuracy_m: Option<f64>,
    pub recorded_at: u64,
}

/// Notification fan-out record for one emergency contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanicNotificationRow {
    pub id: i64,
    pub event_id: String,
    pub contact_id: String,
    /// "sms", "call", "email"
    pub method: String,
    /// "queued", "sent", "delivered", "failed"
    pub status: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Evidence attached to a panic event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub id: String,
    pub event_id: String,
    /// "audio", "video", "photo", "note"
    pub kind: String,
    /// Content hash or storage URL for media evidence.
    pub content_ref: Option<String>,
    /// Free-text note; sealed with [`crate::crypto`] when `sealed` is true.
    pub note: Option<String>,
    pub sealed: bool,
    pub created_at: u64,
}

/// Incident report row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: String,
    pub user_id: Option<String>,
    pub anonymous_session_id: Option<String>,
    pub content: String,
    /// "submitted", "under_review", "assigned", "in_progress", "resolved", "archived"
    pub status: String,
    /// "low", "normal", "high"
    pub priority: String,
    pub assignee: Option<String>,
    /// Serialized [`crate::risk::RiskAssessment`].
    pub risk_json: Option<String>,
    pub location_json: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Case-worker note on a report (append-only log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportNoteRow {
    pub id: i64,
    pub report_id: String,
    pub author: String,
    pub body: String,
    pub created_at: u64,
}

/// Emergency contact row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRow {
    pub id: String,
    pub user_id: Option<String>,
    pub anonymous_session_id: Option<String>,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub relationship: Option<String>,
    /// Lower value = notified first.
    pub priority: u32,
    pub notify_on_panic: bool,
    pub created_at: u64,
}

/// Conversation message row.  Append-only except for the delivery/read/
/// deleted flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub delivered: bool,
    pub delivered_at: Option<u64>,
    pub read: bool,
    pub read_at: Option<u64>,
    pub deleted: bool,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Booking statuses that hold a bed (reserved or occupied).
const LIVE_BOOKING_STATUSES: &str = "('pending', 'approved', 'checked_in')";

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database (tests, demo mode).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ngos (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                contact_email   TEXT NOT NULL,
                contact_phone   TEXT,
                plan            TEXT NOT NULL DEFAULT 'free',
                active          INTEGER NOT NULL DEFAULT 1,
                created_at      INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS safehouses (
                id              TEXT PRIMARY KEY,
                ngo_id          TEXT NOT NULL REFERENCES ngos(id),
                name            TEXT NOT NULL,
                phone           TEXT NOT NULL,
                house_type      TEXT NOT NULL,
                sealed_address  TEXT,
                lat             REAL,
                lon             REAL,
                total_beds      INTEGER NOT NULL,
                available_beds  INTEGER NOT NULL,
                reserved_beds   INTEGER NOT NULL DEFAULT 0,
                occupied_beds   INTEGER NOT NULL DEFAULT 0,
                resources       TEXT NOT NULL DEFAULT '{}',
                staff           TEXT NOT NULL DEFAULT '[]',
                accepts_children INTEGER NOT NULL DEFAULT 1,
                accepts_pets    INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                CHECK (available_beds >= 0 AND reserved_beds >= 0 AND occupied_beds >= 0),
                CHECK (available_beds + reserved_beds + occupied_beds = total_beds)
            );

            CREATE TABLE IF NOT EXISTS bookings (
                id                  TEXT PRIMARY KEY,
                safehouse_id        TEXT NOT NULL REFERENCES safehouses(id),
                user_id             TEXT,
                anonymous_session_id TEXT,
                status              TEXT NOT NULL DEFAULT 'pending',
                urgency             TEXT NOT NULL DEFAULT 'standard',
                party_size          INTEGER NOT NULL DEFAULT 1,
                special_needs       TEXT,
                transport_status    TEXT NOT NULL DEFAULT 'not_required',
                transport           TEXT,
                intake              TEXT,
                assessment          TEXT,
                assessment_completed INTEGER NOT NULL DEFAULT 0,
                services            TEXT,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL,
                decided_at          INTEGER,
                checked_in_at       INTEGER,
                checked_out_at      INTEGER,
                cancel_reason       TEXT,
                CHECK ((user_id IS NULL) <> (anonymous_session_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_bookings_safehouse
                ON bookings(safehouse_id, status);
            CREATE INDEX IF NOT EXISTS idx_bookings_user
                ON bookings(user_id, status);
            CREATE INDEX IF NOT EXISTS idx_bookings_session
                ON bookings(anonymous_session_id, status);

            CREATE TABLE IF NOT EXISTS panic_events (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT,
                anonymous_session_id TEXT,
                status              TEXT NOT NULL DEFAULT 'active',
                trigger_type        TEXT NOT NULL,
                risk_level          TEXT NOT NULL DEFAULT 'high',
                countdown_seconds   INTEGER NOT NULL,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL,
                resolved_at         INTEGER,
                resolution_note     TEXT,
                CHECK ((user_id IS NULL) <> (anonymous_session_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_panic_events_status
                ON panic_events(status, created_at);

            CREATE TABLE IF NOT EXISTS panic_locations (
                event_id    TEXT NOT NULL REFERENCES panic_events(id),
                lat         REAL NOT NULL,
                lon         REAL NOT NULL,
                accuracy_m  REAL,
                recorded_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_panic_locations_event
                ON panic_locations(event_id, recorded_at);

            CREATE TABLE IF NOT EXISTS panic_notifications (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id    TEXT NOT NULL REFERENCES panic_events(id),
                contact_id  TEXT NOT NULL,
                method      TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'queued',
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_panic_notifications_event
                ON panic_notifications(event_id);

            CREATE TABLE IF NOT EXISTS evidence (
                id          TEXT PRIMARY KEY,
                event_id    TEXT NOT NULL REFERENCES panic_events(id),
                kind        TEXT NOT NULL,
                content_ref TEXT,
                note        TEXT,
                sealed      INTEGER NOT NULL DEFAULT 0,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_evidence_event
                ON evidence(event_id, created_at);

            CREATE TABLE IF NOT EXISTS reports (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT,
                anonymous_session_id TEXT,
                content             TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'submitted',
                priority            TEXT NOT NULL DEFAULT 'normal',
                assignee            TEXT,
                risk_json           TEXT,
                location_json       TEXT,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL,
                CHECK ((user_id IS NULL) <> (anonymous_session_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_reports_status
                ON reports(status, created_at);

            CREATE TABLE IF NOT EXISTS report_notes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                report_id   TEXT NOT NULL REFERENCES reports(id),
                author      TEXT NOT NULL,
                body        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_report_notes_report
                ON report_notes(report_id, created_at);

            CREATE TABLE IF NOT EXISTS contacts (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT,
                anonymous_session_id TEXT,
                name                TEXT NOT NULL,
                phone               TEXT NOT NULL,
                email               TEXT,
                relationship        TEXT,
                priority            INTEGER NOT NULL DEFAULT 1,
                notify_on_panic     INTEGER NOT NULL DEFAULT 1,
                created_at          INTEGER NOT NULL,
                CHECK ((user_id IS NULL) <> (anonymous_session_id IS NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_user
                ON contacts(user_id, priority);
            CREATE INDEX IF NOT EXISTS idx_contacts_session
                ON contacts(anonymous_session_id, priority);

            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender          TEXT NOT NULL,
                recipient       TEXT NOT NULL,
                body            TEXT NOT NULL,
                delivered       INTEGER NOT NULL DEFAULT 0,
                delivered_at    INTEGER,
                read            INTEGER NOT NULL DEFAULT 0,
                read_at         INTEGER,
                deleted         INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, created_at);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // NGO CRUD
    // -----------------------------------------------------------------------

    pub fn insert_ngo(&self, row: &NgoRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO ngos (id, name, contact_email, contact_phone, plan, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id,
                row.name,
                row.contact_email,
                row.contact_phone,
                row.plan,
                row.active as i32,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_ngo(&self, id: &str) -> Result<Option<NgoRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, contact_email, contact_phone, plan, active, created_at
             FROM ngos WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id], |row| {
                Ok(NgoRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    contact_email: row.get(2)?,
                    contact_phone: row.get(3)?,
                    plan: row.get(4)?,
                    active: row.get::<_, i32>(5)? != 0,
                    created_at: row.get::<_, i64>(6)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn count_safehouses_for_ngo(&self, ngo_id: &str) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM safehouses WHERE ngo_id = ?1",
            params![ngo_id],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Safehouse CRUD
    // -----------------------------------------------------------------------

    /// Register a safehouse.  Fails with `StateConflict` when the owning
    /// NGO is inactive or its plan's safehouse limit is reached.
    pub fn insert_safehouse(&self, row: &SafehouseRow) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;

        let ngo = self
            .get_ngo(&row.ngo_id)?
            .ok_or_else(|| StorageError::NotFound(format!("ngo {}", row.ngo_id)))?;
        if !ngo.active {
            return Err(StorageError::StateConflict(format!(
                "ngo {} is inactive",
                ngo.id
            )));
        }
        if let Some(limit) = plan_safehouse_limit(&ngo.plan) {
            let count = self.count_safehouses_for_ngo(&ngo.id)?;
            if count >= limit {
                return Err(StorageError::StateConflict(format!(
                    "plan '{}' allows at most {} safehouse(s)",
                    ngo.plan, limit
                )));
            }
        }

        tx.execute(
            "INSERT INTO safehouses
             (id, ngo_id, name, phone, house_type, sealed_address, lat, lon,
              total_beds, available_beds, reserved_beds, occupied_beds,
              resources, staff, accepts_children, accepts_pets, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                row.id,
                row.ngo_id,
                row.name,
                row.phone,
                row.house_type,
                row.sealed_address,
                row.lat,
                row.lon,
                row.total_beds as i64,
                row.available_beds as i64,
                row.reserved_beds as i64,
                row.occupied_beds as i64,
                row.resources,
                row.staff,
                row.accepts_children as i32,
                row.accepts_pets as i32,
                row.created_at as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn map_safehouse(row: &rusqlite::Row<'_>) -> rusqlite::Result<SafehouseRow> {
        Ok(SafehouseRow {
            id: row.get(0)?,
            ngo_id: row.get(1)?,
            name: row.get(2)?,
            phone: row.get(3)?,
            house_type: row.get(4)?,
            sealed_address: row.get(5)?,
            lat: row.get(6)?,
            lon: row.get(7)?,
            total_beds: row.get::<_, i64>(8)? as u32,
            available_beds: row.get::<_, i64>(9)? as u32,
            reserved_beds: row.get::<_, i64>(10)? as u32,
            occupied_beds: row.get::<_, i64>(11)? as u32,
            resources: row.get(12)?,
            staff: row.get(13)?,
            accepts_children: row.get::<_, i32>(14)? != 0,
            accepts_pets: row.get::<_, i32>(15)? != 0,
            created_at: row.get::<_, i64>(16)? as u64,
        })
    }

    const SAFEHOUSE_COLUMNS: &'static str =
        "id, ngo_id, name, phone, house_type, sealed_address, lat, lon,
         total_beds, available_beds, reserved_beds, occupied_beds,
         resources, staff, accepts_children, accepts_pets, created_at";

    pub fn get_safehouse(&self, id: &str) -> Result<Option<SafehouseRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM safehouses WHERE id = ?1",
            Self::SAFEHOUSE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt
            .query_row(params![id], Self::map_safehouse)
            .optional()?;
        Ok(row)
    }

    /// List safehouses with optional filters.
    pub fn list_safehouses(
        &self,
        house_type: Option<&str>,
        only_available: bool,
        limit: u32,
    ) -> Result<Vec<SafehouseRow>, StorageError> {
        let mut sql = format!("SELECT {} FROM safehouses WHERE 1=1", Self::SAFEHOUSE_COLUMNS);
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(t) = house_type {
            sql.push_str(" AND house_type = ?");
            bind_values.push(Box::new(t.to_string()));
        }
        if only_available {
            sql.push_str(" AND available_beds > 0");
        }
        sql.push_str(" ORDER BY created_at LIMIT ?");
        bind_values.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), Self::map_safehouse)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Booking workflow
    // -----------------------------------------------------------------------

    fn map_booking(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookingRow> {
        Ok(BookingRow {
            id: row.get(0)?,
            safehouse_id: row.get(1)?,
            user_id: row.get(2)?,
            anonymous_session_id: row.get(3)?,
            status: row.get(4)?,
            urgency: row.get(5)?,
            party_size: row.get::<_, i64>(6)? as u32,
            special_needs: row.get(7)?,
            transport_status: row.get(8)?,
            transport: row.get(9)?,
            intake: row.get(10)?,
            assessment: row.get(11)?,
            assessment_completed: row.get::<_, i32>(12)? != 0,
            services: row.get(13)?,
            created_at: row.get::<_, i64>(14)? as u64,
            updated_at: row.get::<_, i64>(15)? as u64,
            decided_at: row.get::<_, Option<i64>>(16)?.map(|t| t as u64),
            checked_in_at: row.get::<_, Option<i64>>(17)?.map(|t| t as u64),
            checked_out_at: row.get::<_, Option<i64>>(18)?.map(|t| t as u64),
            cancel_reason: row.get(19)?,
        })
    }

    const BOOKING_COLUMNS: &'static str =
        "id, safehouse_id, user_id, anonymous_session_id, status, urgency,
         party_size, special_needs, transport_status, transport, intake,
         assessment, assessment_completed, services, created_at, updated_at,
         decided_at, checked_in_at, checked_out_at, cancel_reason";

    pub fn get_booking(&self, id: &str) -> Result<Option<BookingRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE id = ?1",
            Self::BOOKING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row(params![id], Self::map_booking).optional()?;
        Ok(row)
    }

    /// Bookings holding a bed at the given safehouse.
    pub fn list_live_bookings(&self, safehouse_id: &str) -> Result<Vec<BookingRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM bookings
             WHERE safehouse_id = ?1 AND status IN {}
             ORDER BY created_at",
            Self::BOOKING_COLUMNS,
            LIVE_BOOKING_STATUSES
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![safehouse_id], Self::map_booking)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Apply a signed delta to the safehouse bed counters, guarded so no
    /// counter can go negative.  Returns false when the guard fails.
    fn apply_bed_delta(
        &self,
        safehouse_id: &str,
        delta: workflow::BedDelta,
    ) -> Result<bool, StorageError> {
        if delta.is_noop() {
            return Ok(true);
        }
        let affected = self.conn.execute(
            "UPDATE safehouses SET
                available_beds = available_beds + ?1,
                reserved_beds  = reserved_beds + ?2,
                occupied_beds  = occupied_beds + ?3
             WHERE id = ?4
               AND available_beds + ?1 >= 0
               AND reserved_beds + ?2 >= 0
               AND occupied_beds + ?3 >= 0",
            params![delta.available, delta.reserved, delta.occupied, safehouse_id],
        )?;
        Ok(affected > 0)
    }

    /// Create a reservation: decrement an available bed and insert the
    /// booking as one transaction.  The row's `status` must be "pending".
    pub fn reserve_booking(&self, row: &BookingRow) -> Result<(), WorkflowError> {
        let tx = self.conn.unchecked_transaction().map_err(StorageError::from)?;

        if self.get_safehouse(&row.safehouse_id)?.is_none() {
            return Err(WorkflowError::NotFound(format!(
                "safehouse {}",
                row.safehouse_id
            )));
        }

        // One live booking per identity per safehouse.
        let identity = row
            .user_id
            .as_deref()
            .or(row.anonymous_session_id.as_deref())
            .unwrap_or("");
        let live: i64 = self
            .conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM bookings
                     WHERE safehouse_id = ?1
                       AND (user_id = ?2 OR anonymous_session_id = ?2)
                       AND status IN {}",
                    LIVE_BOOKING_STATUSES
                ),
                params![row.safehouse_id, identity],
                |r| r.get(0),
            )
            .map_err(StorageError::from)?;
        if live > 0 {
            return Err(WorkflowError::AlreadyBooked);
        }

        if !self.apply_bed_delta(&row.safehouse_id, workflow::reserve_delta())? {
            return Err(WorkflowError::NoCapacity);
        }

        self.conn
            .execute(
                "INSERT INTO bookings
                 (id, safehouse_id, user_id, anonymous_session_id, status, urgency,
                  party_size, special_needs, transport_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.id,
                    row.safehouse_id,
                    row.user_id,
                    row.anonymous_session_id,
                    row.urgency,
                    row.party_size as i64,
                    row.special_needs,
                    row.transport_status,
                    row.created_at as i64,
                    row.updated_at as i64,
                ],
            )
            .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Advance a booking to `to`, adjusting bed counters atomically.
    ///
    /// Validates the move against the workflow transition table, requires a
    /// completed safety assessment for check-in, and stamps the step's
    /// lifecycle timestamp.
    pub fn transition_booking(
        &self,
        booking_id: &str,
        to: BookingStatus,
        reason: Option<&str>,
        now: u64,
    ) -> Result<BookingRow, WorkflowError> {
        let tx = self.conn.unchecked_transaction().map_err(StorageError::from)?;

        let booking = self
            .get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))?;
        let from: BookingStatus = booking
            .status
            .parse()
            .map_err(|_| StorageError::StateConflict(format!(
                "booking {booking_id} has unknown status {}",
                booking.status
            )))?;

        if !from.allows(to) {
            return Err(WorkflowError::InvalidTransition { from, to });
        }
        if to == BookingStatus::CheckedIn && !booking.assessment_completed {
            return Err(WorkflowError::AssessmentRequired);
        }

        if !self.apply_bed_delta(&booking.safehouse_id, workflow::bed_delta(from, to))? {
            // Guarded update refused: counters would go negative.  The
            // transition table should make this unreachable.
            return Err(WorkflowError::Storage(StorageError::StateConflict(
                format!("bed counters out of sync for safehouse {}", booking.safehouse_id),
            )));
        }

        let decided_at = match to {
            BookingStatus::Approved | BookingStatus::Rejected => Some(now as i64),
            _ => booking.decided_at.map(|t| t as i64),
        };
        let checked_in_at = match to {
            BookingStatus::CheckedIn => Some(now as i64),
            _ => booking.checked_in_at.map(|t| t as i64),
        };
        let checked_out_at = match to {
            BookingStatus::CheckedOut => Some(now as i64),
            _ => booking.checked_out_at.map(|t| t as i64),
        };
        let cancel_reason = match to {
            BookingStatus::Cancelled | BookingStatus::Rejected => {
                reason.map(|r| r.to_string()).or(booking.cancel_reason.clone())
            }
            _ => booking.cancel_reason.clone(),
        };

        self.conn
            .execute(
                "UPDATE bookings SET status = ?1, updated_at = ?2, decided_at = ?3,
                        checked_in_at = ?4, checked_out_at = ?5, cancel_reason = ?6
                 WHERE id = ?7",
                params![
                    to.to_string(),
                    now as i64,
                    decided_at,
                    checked_in_at,
                    checked_out_at,
                    cancel_reason,
                    booking_id,
                ],
            )
            .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;

        self.get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))
    }

    fn booking_for_admission_update(
        &self,
        booking_id: &str,
    ) -> Result<BookingRow, WorkflowError> {
        let booking = self
            .get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))?;
        let status: BookingStatus = booking
            .status
            .parse()
            .map_err(|_| StorageError::StateConflict(format!(
                "booking {booking_id} has unknown status {}",
                booking.status
            )))?;
        if !status.accepts_admission_updates() {
            return Err(WorkflowError::AdmissionClosed(status));
        }
        Ok(booking)
    }

    /// Record the intake interview on a pre-check-in booking.
    pub fn record_booking_intake(
        &self,
        booking_id: &str,
        intake_json: &str,
        now: u64,
    ) -> Result<BookingRow, WorkflowError> {
        self.booking_for_admission_update(booking_id)?;
        self.conn
            .execute(
                "UPDATE bookings SET intake = ?1, updated_at = ?2 WHERE id = ?3",
                params![intake_json, now as i64, booking_id],
            )
            .map_err(StorageError::from)?;
        self.get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))
    }

    /// Record the safety assessment.  `completed` unlocks check-in.
    pub fn record_booking_assessment(
        &self,
        booking_id: &str,
        assessment_json: &str,
        completed: bool,
        now: u64,
    ) -> Result<BookingRow, WorkflowError> {
        self.booking_for_admission_update(booking_id)?;
        self.conn
            .execute(
                "UPDATE bookings SET assessment = ?1, assessment_completed = ?2,
                        updated_at = ?3
                 WHERE id = ?4",
                params![assessment_json, completed as i32, now as i64, booking_id],
            )
            .map_err(StorageError::from)?;
        self.get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))
    }

    /// Record activated support services (counseling, legal aid, etc).
    pub fn activate_booking_services(
        &self,
        booking_id: &str,
        services_json: &str,
        now: u64,
    ) -> Result<BookingRow, WorkflowError> {
        self.booking_for_admission_update(booking_id)?;
        self.conn
            .execute(
                "UPDATE bookings SET services = ?1, updated_at = ?2 WHERE id = ?3",
                params![services_json, now as i64, booking_id],
            )
            .map_err(StorageError::from)?;
        self.get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))
    }

    /// Advance the transport sub-state, strictly forward.
    pub fn update_booking_transport(
        &self,
        booking_id: &str,
        to: TransportStatus,
        details_json: Option<&str>,
        now: u64,
    ) -> Result<BookingRow, WorkflowError> {
        let booking = self
            .get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))?;
        let status: BookingStatus = booking
            .status
            .parse()
            .map_err(|_| StorageError::StateConflict(format!(
                "booking {booking_id} has unknown status {}",
                booking.status
            )))?;
        if !status.accepts_transport_updates() {
            return Err(WorkflowError::AdmissionClosed(status));
        }
        let from: TransportStatus = booking
            .transport_status
            .parse()
            .map_err(|_| StorageError::StateConflict(format!(
                "booking {booking_id} has unknown transport status {}",
                booking.transport_status
            )))?;
        if !from.allows(to) {
            return Err(WorkflowError::InvalidTransportTransition { from, to });
        }

        self.conn
            .execute(
                "UPDATE bookings SET transport_status = ?1,
                        transport = COALESCE(?2, transport), updated_at = ?3
                 WHERE id = ?4",
                params![to.to_string(), details_json, now as i64, booking_id],
            )
            .map_err(StorageError::from)?;
        self.get_booking(booking_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("booking {booking_id}")))
    }

    // -----------------------------------------------------------------------
    // Panic events
    // -----------------------------------------------------------------------

    pub fn insert_panic_event(&self, row: &PanicEventRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO panic_events
             (id, user_id, anonymous_session_id, status, trigger_type, risk_level,
              countdown_seconds, created_at, updated_at, resolved_at, resolution_note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.id,
                row.user_id,
                row.anonymous_session_id,
                row.status,
                row.trigger_type,
                row.risk_level,
                row.countdown_seconds as i64,
                row.created_at as i64,
                row.updated_at as i64,
                row.resolved_at.map(|t| t as i64),
                row.resolution_note,
            ],
        )?;
        Ok(())
    }

    pub fn get_panic_event(&self, id: &str) -> Result<Option<PanicEventRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, anonymous_session_id, status, trigger_type, risk_level,
                    countdown_seconds, created_at, updated_at, resolved_at, resolution_note
             FROM panic_events WHERE id = ?1",
        )?;
        let row = stmt
            .query_row(params![id], |row| {
                Ok(PanicEventRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    anonymous_session_id: row.get(2)?,
                    status: row.get(3)?,
                    trigger_type: row.get(4)?,
                    risk_level: row.get(5)?,
                    countdown_seconds: row.get::<_, i64>(6)? as u32,
                    created_at: row.get::<_, i64>(7)? as u64,
                    updated_at: row.get::<_, i64>(8)? as u64,
                    resolved_at: row.get::<_, Option<i64>>(9)?.map(|t| t as u64),
                    resolution_note: row.get(10)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Append a location sample.  Only legal while the event is active.
    pub fn append_panic_location(&self, loc: &PanicLocationRow) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let event = self
            .get_panic_event(&loc.event_id)?
            .ok_or_else(|| StorageError::NotFound(format!("panic event {}", loc.event_id)))?;
        if event.status != "active" {
            return Err(StorageError::StateConflict(format!(
                "panic event {} is {}",
                event.id, event.status
            )));
        }
        self.conn.execute(
            "INSERT INTO panic_locations (event_id, lat, lon, accuracy_m, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                loc.event_id,
                loc.lat,
                loc.lon,
                loc.accuracy_m,
                loc.recorded_at as i64,
            ],
        )?;
        self.conn.execute(
            "UPDATE panic_events SET updated_at = ?1 WHERE id = ?2",
            params![loc.recorded_at as i64, loc.event_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_panic_locations(
        &self,
        event_id: &str,
    ) -> Result<Vec<PanicLocationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, lat, lon, accuracy_m, recorded_at
             FROM panic_locations WHERE event_id = ?1 ORDER BY recorded_at",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(PanicLocationRow {
                event_id: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
                accuracy_m: row.get(3)?,
                recorded_at: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn insert_panic_notification(
        &self,
        event_id: &str,
        contact_id: &str,
        method: &str,
        now: u64,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO panic_notifications
             (event_id, contact_id, method, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'queued', ?4, ?4)",
            params![event_id, contact_id, method, now as i64],
        )?;
        Ok(())
    }

    pub fn list_panic_notifications(
        &self,
        event_id: &str,
    ) -> Result<Vec<PanicNotificationRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_id, contact_id, method, status, created_at, updated_at
             FROM panic_notifications WHERE event_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(PanicNotificationRow {
                id: row.get(0)?,
                event_id: row.get(1)?,
                contact_id: row.get(2)?,
                method: row.get(3)?,
                status: row.get(4)?,
                created_at: row.get::<_, i64>(5)? as u64,
                updated_at: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Close a panic event.  `resolution` must be one of "resolved",
    /// "false_alarm", "aborted"; only an active event can be closed.
    pub fn resolve_panic_event(
        &self,
        id: &str,
        resolution: &str,
        note: Option<&str>,
        now: u64,
    ) -> Result<PanicEventRow, StorageError> {
        let affected = self.conn.execute(
            "UPDATE panic_events SET status = ?1, resolution_note = ?2,
                    resolved_at = ?3, updated_at = ?3
             WHERE id = ?4 AND status = 'active'",
            params![resolution, note, now as i64, id],
        )?;
        if affected == 0 {
            return match self.get_panic_event(id)? {
                None => Err(StorageError::NotFound(format!("panic event {id}"))),
                Some(event) => Err(StorageError::StateConflict(format!(
                    "panic event {} is already {}",
                    event.id, event.status
                ))),
            };
        }
        self.get_panic_event(id)?
            .ok_or_else(|| StorageError::NotFound(format!("panic event {id}")))
    }

    pub fn count_active_panics(&self) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM panic_events WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    pub fn count_safehouses(&self) -> Result<u32, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM safehouses",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    // -----------------------------------------------------------------------
    // Evidence
    // -----------------------------------------------------------------------

    /// Attach evidence to an active panic event.
    pub fn insert_evidence(&self, row: &EvidenceRow) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let event = self
            .get_panic_event(&row.event_id)?
            .ok_or_else(|| StorageError::NotFound(format!("panic event {}", row.event_id)))?;
        if event.status != "active" {
            return Err(StorageError::StateConflict(format!(
                "panic event {} is {}",
                event.id, event.status
            )));
        }
        self.conn.execute(
            "INSERT INTO evidence (id, event_id, kind, content_ref, note, sealed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id,
                row.event_id,
                row.kind,
                row.content_ref,
                row.note,
                row.sealed as i32,
                row.created_at as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn list_evidence(&self, event_id: &str) -> Result<Vec<EvidenceRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_id, kind, content_ref, note, sealed, created_at
             FROM evidence WHERE event_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![event_id], |row| {
            Ok(EvidenceRow {
                id: row.get(0)?,
                event_id: row.get(1)?,
                kind: row.get(2)?,
                content_ref: row.get(3)?,
                note: row.get(4)?,
                sealed: row.get::<_, i32>(5)? != 0,
                created_at: row.get::<_, i64>(6)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------------

    fn map_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReportRow> {
        Ok(ReportRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            anonymous_session_id: row.get(2)?,
            content: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            assignee: row.get(6)?,
            risk_json: row.get(7)?,
            location_json: row.get(8)?,
            created_at: row.get::<_, i64>(9)? as u64,
            updated_at: row.get::<_, i64>(10)? as u64,
        })
    }

    const REPORT_COLUMNS: &'static str =
        "id, user_id, anonymous_session_id, content, status, priority,
         assignee, risk_json, location_json, created_at, updated_at";

    pub fn insert_report(&self, row: &ReportRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO reports
             (id, user_id, anonymous_session_id, content, status, priority,
              assignee, risk_json, location_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.id,
                row.user_id,
                row.anonymous_session_id,
                row.content,
                row.status,
                row.priority,
                row.assignee,
                row.risk_json,
                row.location_json,
                row.created_at as i64,
                row.updated_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>, StorageError> {
        let sql = format!("SELECT {} FROM reports WHERE id = ?1", Self::REPORT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row(params![id], Self::map_report).optional()?;
        Ok(row)
    }

    pub fn list_reports(
        &self,
        status: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ReportRow>, StorageError> {
        let mut sql = format!("SELECT {} FROM reports WHERE 1=1", Self::REPORT_COLUMNS);
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(s) = status {
            sql.push_str(" AND status = ?");
            bind_values.push(Box::new(s.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        bind_values.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), Self::map_report)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Legal report status moves, forward only; "archived" is terminal.
    fn report_status_allows(from: &str, to: &str) -> bool {
        matches!(
            (from, to),
            ("submitted", "under_review")
                | ("submitted", "archived")
                | ("under_review", "assigned")
                | ("under_review", "archived")
                | ("assigned", "in_progress")
                | ("assigned", "archived")
                | ("in_progress", "resolved")
                | ("resolved", "archived")
        )
    }

    /// Move a report through its workflow, optionally (re)assigning and
    /// repriorizing in the same step.
    pub fn update_report_status(
        &self,
        id: &str,
        to: &str,
        assignee: Option<&str>,
        priority: Option<&str>,
        now: u64,
    ) -> Result<ReportRow, StorageError> {
        let report = self
            .get_report(id)?
            .ok_or_else(|| StorageError::NotFound(format!("report {id}")))?;
        if !Self::report_status_allows(&report.status, to) {
            return Err(StorageError::StateConflict(format!(
                "invalid report transition: {} -> {}",
                report.status, to
            )));
        }
        self.conn.execute(
            "UPDATE reports SET status = ?1, assignee = COALESCE(?2, assignee),
                    priority = COALESCE(?3, priority), updated_at = ?4
             WHERE id = ?5",
            params![to, assignee, priority, now as i64, id],
        )?;
        self.get_report(id)?
            .ok_or_else(|| StorageError::NotFound(format!("report {id}")))
    }

    pub fn set_report_risk(&self, id: &str, risk_json: &str, now: u64) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "UPDATE reports SET risk_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![risk_json, now as i64, id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("report {id}")));
        }
        Ok(())
    }

    pub fn insert_report_note(
        &self,
        report_id: &str,
        author: &str,
        body: &str,
        now: u64,
    ) -> Result<(), StorageError> {
        if self.get_report(report_id)?.is_none() {
            return Err(StorageError::NotFound(format!("report {report_id}")));
        }
        self.conn.execute(
            "INSERT INTO report_notes (report_id, author, body, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![report_id, author, body, now as i64],
        )?;
        Ok(())
    }

    pub fn list_report_notes(&self, report_id: &str) -> Result<Vec<ReportNoteRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, report_id, author, body, created_at
             FROM report_notes WHERE report_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![report_id], |row| {
            Ok(ReportNoteRow {
                id: row.get(0)?,
                report_id: row.get(1)?,
                author: row.get(2)?,
                body: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Emergency contacts
    // -----------------------------------------------------------------------

    fn map_contact(row: &rusqlite::Row<'_>) -> rusqlite::Result<ContactRow> {
        Ok(ContactRow {
            id: row.get(0)?,
            user_id: row.get(1)?,
            anonymous_session_id: row.get(2)?,
            name: row.get(3)?,
            phone: row.get(4)?,
            email: row.get(5)?,
            relationship: row.get(6)?,
            priority: row.get::<_, i64>(7)? as u32,
            notify_on_panic: row.get::<_, i32>(8)? != 0,
            created_at: row.get::<_, i64>(9)? as u64,
        })
    }

    const CONTACT_COLUMNS: &'static str =
        "id, user_id, anonymous_session_id, name, phone, email, relationship,
         priority, notify_on_panic, created_at";

    pub fn insert_contact(&self, row: &ContactRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO contacts
             (id, user_id, anonymous_session_id, name, phone, email, relationship,
              priority, notify_on_panic, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                row.id,
                row.user_id,
                row.anonymous_session_id,
                row.name,
                row.phone,
                row.email,
                row.relationship,
                row.priority as i64,
                row.notify_on_panic as i32,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    /// All contacts belonging to the given identity key, highest priority
    /// first.
    pub fn list_contacts(&self, identity: &str) -> Result<Vec<ContactRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM contacts
             WHERE user_id = ?1 OR anonymous_session_id = ?1
             ORDER BY priority, created_at",
            Self::CONTACT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![identity], Self::map_contact)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Contacts to notify on panic activation, highest priority first.
    pub fn list_notifiable_contacts(&self, identity: &str) -> Result<Vec<ContactRow>, StorageError> {
        let sql = format!(
            "SELECT {} FROM contacts
             WHERE (user_id = ?1 OR anonymous_session_id = ?1) AND notify_on_panic = 1
             ORDER BY priority, created_at",
            Self::CONTACT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![identity], Self::map_contact)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn delete_contact(&self, id: &str) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
        Ok(MessageRow {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender: row.get(2)?,
            recipient: row.get(3)?,
            body: row.get(4)?,
            delivered: row.get::<_, i32>(5)? != 0,
            delivered_at: row.get::<_, Option<i64>>(6)?.map(|t| t as u64),
            read: row.get::<_, i32>(7)? != 0,
            read_at: row.get::<_, Option<i64>>(8)?.map(|t| t as u64),
            deleted: row.get::<_, i32>(9)? != 0,
            created_at: row.get::<_, i64>(10)? as u64,
        })
    }

    const MESSAGE_COLUMNS: &'static str =
        "id, conversation_id, sender, recipient, body, delivered, delivered_at,
         read, read_at, deleted, created_at";

    pub fn insert_message(&self, row: &MessageRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO messages
             (id, conversation_id, sender, recipient, body, delivered, delivered_at,
              read, read_at, deleted, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                row.id,
                row.conversation_id,
                row.sender,
                row.recipient,
                row.body,
                row.delivered as i32,
                row.delivered_at.map(|t| t as i64),
                row.read as i32,
                row.read_at.map(|t| t as i64),
                row.deleted as i32,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>, StorageError> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?1", Self::MESSAGE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let row = stmt.query_row(params![id], Self::map_message).optional()?;
        Ok(row)
    }

    /// List a conversation's messages, oldest first, excluding soft-deleted
    /// ones.  `before` (exclusive) and `limit` page through history.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        before: Option<u64>,
        limit: u32,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let mut sql = format!(
            "SELECT {} FROM messages
             WHERE conversation_id = ? AND deleted = 0",
            Self::MESSAGE_COLUMNS
        );
        let mut bind_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        bind_values.push(Box::new(conversation_id.to_string()));

        if let Some(b) = before {
            sql.push_str(" AND created_at < ?");
            bind_values.push(Box::new(b as i64));
        }
        sql.push_str(" ORDER BY created_at LIMIT ?");
        bind_values.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            bind_values.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_ref.as_slice(), Self::map_message)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn mark_message_delivered(&self, id: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET delivered = 1, delivered_at = ?1
             WHERE id = ?2 AND delivered = 0",
            params![now as i64, id],
        )?;
        Ok(affected > 0)
    }

    pub fn mark_message_read(&self, id: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET read = 1, read_at = ?1,
                    delivered = 1, delivered_at = COALESCE(delivered_at, ?1)
             WHERE id = ?2 AND deleted = 0",
            params![now as i64, id],
        )?;
        Ok(affected > 0)
    }

    /// Soft-delete: the row stays, the body is no longer listed.
    pub fn soft_delete_message(&self, id: &str) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE messages SET deleted = 1 WHERE id = ?1 AND deleted = 0",
            params![id],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn sample_ngo(id: &str, plan: &str) -> NgoRow {
        NgoRow {
            id: id.to_string(),
            name: "Test NGO".to_string(),
            contact_email: "ngo@test.example".to_string(),
            contact_phone: None,
            plan: plan.to_string(),
            active: true,
            created_at: 1_000,
        }
    }

    fn sample_safehouse(id: &str, ngo_id: &str, beds: u32) -> SafehouseRow {
        SafehouseRow {
            id: id.to_string(),
            ngo_id: ngo_id.to_string(),
            name: "Test House".to_string(),
            phone: "+1-555-0199".to_string(),
            house_type: "emergency".to_string(),
            sealed_address: None,
            lat: None,
            lon: None,
            total_beds: beds,
            available_beds: beds,
            reserved_beds: 0,
            occupied_beds: 0,
            resources: "{}".to_string(),
            staff: "[]".to_string(),
            accepts_children: true,
            accepts_pets: false,
            created_at: 1_000,
        }
    }

    fn sample_booking(id: &str, safehouse_id: &str, user_id: &str) -> BookingRow {
        BookingRow {
            id: id.to_string(),
            safehouse_id: safehouse_id.to_string(),
            user_id: Some(user_id.to_string()),
            anonymous_session_id: None,
            status: "pending".to_string(),
            urgency: "standard".to_string(),
            party_size: 1,
            special_needs: None,
            transport_status: "not_required".to_string(),
            transport: None,
            intake: None,
            assessment: None,
            assessment_completed: false,
            services: None,
            created_at: 1_000,
            updated_at: 1_000,
            decided_at: None,
            checked_in_at: None,
            checked_out_at: None,
            cancel_reason: None,
        }
    }

    fn counters(storage: &Storage, id: &str) -> (u32, u32, u32, u32) {
        let h = storage.get_safehouse(id).unwrap().unwrap();
        (h.total_beds, h.available_beds, h.reserved_beds, h.occupied_beds)
    }

    #[test]
    fn free_plan_allows_one_safehouse() {
        let storage = test_storage();
        storage.insert_ngo(&sample_ngo("n1", "free")).unwrap();
        storage.insert_safehouse(&sample_safehouse("h1", "n1", 4)).unwrap();
        let second = storage.insert_safehouse(&sample_safehouse("h2", "n1", 4));
        assert!(matches!(second, Err(StorageError::StateConflict(_))));
    }

    #[test]
    fn safehouse_requires_active_ngo() {
        let storage = test_storage();
        let mut ngo = sample_ngo("n1", "plus");
        ngo.active = false;
        storage.insert_ngo(&ngo).unwrap();
        let result = storage.insert_safehouse(&sample_safehouse("h1", "n1", 4));
        assert!(matches!(result, Err(StorageError::StateConflict(_))));
    }

    #[test]
    fn reserve_moves_a_bed_and_blocks_duplicates() {
        let storage = test_storage();
        storage.insert_ngo(&sample_ngo("n1", "plus")).unwrap();
        storage.insert_safehouse(&sample_safehouse("h1", "n1", 2)).unwrap();

        storage.reserve_booking(&sample_booking("b1", "h1", "u1")).unwrap();
        assert_eq!(counters(&storage, "h1"), (2, 1, 1, 0));

        let dup = storage.reserve_booking(&sample_booking("b2", "h1", "u1"));
        assert!(matches!(dup, Err(WorkflowError::AlreadyBooked)));

        storage.reserve_booking(&sample_booking("b3", "h1", "u2")).unwrap();
        let full = storage.reserve_booking(&sample_booking("b4", "h1", "u3"));
        assert!(matches!(full, Err(WorkflowError::NoCapacity)));
        assert_eq!(counters(&storage, "h1"), (2, 0, 2, 0));
    }

    #[test]
    fn lifecycle_restores_counters() {
        let storage = test_storage();
        storage.insert_ngo(&sample_ngo("n1", "plus")).unwrap();
        storage.insert_safehouse(&sample_safehouse("h1", "n1", 3)).unwrap();
        storage.reserve_booking(&sample_booking("b1", "h1", "u1")).unwrap();

        storage.transition_booking("b1", BookingStatus::Approved, None, 2_000).unwrap();
        assert_eq!(counters(&storage, "h1"), (3, 2, 1, 0));

        // Check-in gated on the assessment.
        let early = storage.transition_booking("b1", BookingStatus::CheckedIn, None, 2_100);
        assert!(matches!(early, Err(WorkflowError::AssessmentRequired)));

        storage
            .record_booking_assessment("b1", r#"{"danger":"high"}"#, true, 2_200)
            .unwrap();
        let checked_in = storage
            .transition_booking("b1", BookingStatus::CheckedIn, None, 2_300)
            .unwrap();
        assert_eq!(checked_in.status, "checked_in");
        assert_eq!(checked_in.checked_in_at, Some(2_300));
        assert_eq!(counters(&storage, "h1"), (3, 2, 0, 1));

        // Admission records close at check-in.
        let late_intake = storage.record_booking_intake("b1", "{}", 2_400);
        assert!(matches!(late_intake, Err(WorkflowError::AdmissionClosed(_))));

        let out = storage
            .transition_booking("b1", BookingStatus::CheckedOut, None, 2_500)
            .unwrap();
        assert_eq!(out.checked_out_at, Some(2_500));
        assert_eq!(counters(&storage, "h1"), (3, 3, 0, 0));

        // Terminal.
        let after = storage.transition_booking("b1", BookingStatus::Approved, None, 2_600);
        assert!(matches!(after, Err(WorkflowError::InvalidTransition { .. })));
    }

    #[test]
    fn reject_records_reason_and_frees_bed() {
        let storage = test_storage();
        storage.insert_ngo(&sample_ngo("n1", "plus")).unwrap();
        storage.insert_safehouse(&sample_safehouse("h1", "n1", 1)).unwrap();
        storage.reserve_booking(&sample_booking("b1", "h1", "u1")).unwrap();

        let rejected = storage
            .transition_booking("b1", BookingStatus::Rejected, Some("full review"), 2_000)
            .unwrap();
        assert_eq!(rejected.status, "rejected");
        assert_eq!(rejected.cancel_reason.as_deref(), Some("full review"));
        assert_eq!(rejected.decided_at, Some(2_000));
        assert_eq!(counters(&storage, "h1"), (1, 1, 0, 0));

        // The freed bed is available to someone else.
        storage.reserve_booking(&sample_booking("b2", "h1", "u2")).unwrap();
    }

    #[test]
    fn transport_state_is_forward_only() {
        let storage = test_storage();
        storage.insert_ngo(&sample_ngo("n1", "plus")).unwrap();
        storage.insert_safehouse(&sample_safehouse("h1", "n1", 1)).unwrap();
        let mut booking = sample_booking("b1", "h1", "u1");
        booking.transport_status = "requested".to_string();
        storage.reserve_booking(&booking).unwrap();

        let arranged = storage
            .update_booking_transport("b1", TransportStatus::Arranged, Some(r#"{"car":1}"#), 2_000)
            .unwrap();
        assert_eq!(arranged.transport_status, "arranged");
        assert_eq!(arranged.transport.as_deref(), Some(r#"{"car":1}"#));

        // Details persist when the next step sends none.
        let in_transit = storage
            .update_booking_transport("b1", TransportStatus::InTransit, None, 2_100)
            .unwrap();
        assert_eq!(in_transit.transport.as_deref(), Some(r#"{"car":1}"#));

        let back = storage.update_booking_transport("b1", TransportStatus::Requested, None, 2_200);
        assert!(matches!(
            back,
            Err(WorkflowError::InvalidTransportTransition { .. })
        ));
    }

    #[test]
    fn panic_event_resolution_is_final() {
        let storage = test_storage();
        let event = PanicEventRow {
            id: "e1".to_string(),
            user_id: Some("u1".to_string()),
            anonymous_session_id: None,
            status: "active".to_string(),
            trigger_type: "button".to_string(),
            risk_level: "high".to_string(),
            countdown_seconds: 30,
            created_at: 1_000,
            updated_at: 1_000,
            resolved_at: None,
            resolution_note: None,
        };
        storage.insert_panic_event(&event).unwrap();

        let resolved = storage
            .resolve_panic_event("e1", "false_alarm", Some("test drill"), 2_000)
            .unwrap();
        assert_eq!(resolved.status, "false_alarm");
        assert_eq!(resolved.resolved_at, Some(2_000));

        let again = storage.resolve_panic_event("e1", "resolved", None, 2_100);
        assert!(matches!(again, Err(StorageError::StateConflict(_))));

        let loc = storage.append_panic_location(&PanicLocationRow {
            event_id: "e1".to_string(),
            lat: 0.0,
            lon: 0.0,
            accuracy_m: None,
            recorded_at: 2_200,
        });
        assert!(matches!(loc, Err(StorageError::StateConflict(_))));

        let missing = storage.resolve_panic_event("nope", "resolved", None, 2_300);
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn report_risk_can_be_rescored() {
        let storage = test_storage();
        let report = ReportRow {
            id: "r1".to_string(),
            user_id: Some("u1".to_string()),
            anonymous_session_id: None,
            content: "incident description".to_string(),
            status: "submitted".to_string(),
            priority: "normal".to_string(),
            assignee: None,
            risk_json: None,
            location_json: None,
            created_at: 1_000,
            updated_at: 1_000,
        };
        storage.insert_report(&report).unwrap();

        storage.set_report_risk("r1", r#"{"score":42}"#, 2_000).unwrap();
        let stored = storage.get_report("r1").unwrap().unwrap();
        assert_eq!(stored.risk_json.as_deref(), Some(r#"{"score":42}"#));
        assert_eq!(stored.updated_at, 2_000);

        let missing = storage.set_report_risk("nope", "{}", 2_100);
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn message_delivery_and_read_flags() {
        let storage = test_storage();
        let message = MessageRow {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender: "u1".to_string(),
            recipient: "w1".to_string(),
            body: "hello".to_string(),
            delivered: false,
            delivered_at: None,
            read: false,
            read_at: None,
            deleted: false,
            created_at: 1_000,
        };
        storage.insert_message(&message).unwrap();

        assert!(storage.mark_message_delivered("m1", 2_000).unwrap());
        // Second delivery attempt is a no-op.
        assert!(!storage.mark_message_delivered("m1", 2_100).unwrap());

        assert!(storage.mark_message_read("m1", 2_200).unwrap());
        let stored = storage.get_message("m1").unwrap().unwrap();
        assert!(stored.delivered && stored.read);
        assert_eq!(stored.delivered_at, Some(2_000));
        assert_eq!(stored.read_at, Some(2_200));

        assert!(storage.soft_delete_message("m1").unwrap());
        assert!(storage.list_messages("c1", None, 10).unwrap().is_empty());
        assert!(!storage.soft_delete_message("m1").unwrap());
    }
}
