//! Clinic database
//!
//! Doctor directory, schedule directory and booking writer behind one
//! SQLite handle. The orchestrator treats these as collaborators with
//! fixed contracts; slot ordering and the booking transaction live here.

use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("slot already booked: doctor {doctor_id} on {date} at {time}")]
    SlotTaken {
        doctor_id: i64,
        date: String,
        time: String,
    },
}

pub type DbResult<T> = Result<T, DbError>;

/// A directory entry.
#[derive(Debug, Clone)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub speciality: String,
}

/// An open appointment interval for a doctor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS doctors (
    doctor_id   INTEGER PRIMARY KEY,
    name        TEXT NOT NULL,
    speciality  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS doctor_schedules (
    doctor_id      INTEGER NOT NULL REFERENCES doctors(doctor_id),
    schedule_date  TEXT NOT NULL,
    start_time     TEXT NOT NULL,
    end_time       TEXT NOT NULL,
    is_available   INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (doctor_id, schedule_date, start_time)
);

CREATE TABLE IF NOT EXISTS patients (
    patient_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    phone       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS appointments (
    appointment_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id       INTEGER NOT NULL REFERENCES doctors(doctor_id),
    patient_id      INTEGER NOT NULL REFERENCES patients(patient_id),
    schedule_date   TEXT NOT NULL,
    start_time      TEXT NOT NULL,
    UNIQUE (doctor_id, schedule_date, start_time)
);
";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Doctor Directory ====================

    /// Doctors offering the given speciality, in directory order.
    pub fn doctors_by_speciality(&self, speciality: &str) -> DbResult<Vec<Doctor>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT doctor_id, name, speciality FROM doctors
             WHERE speciality = ?1 ORDER BY doctor_id",
        )?;

        let rows = stmt.query_map(params![speciality], |row| {
            Ok(Doctor {
                id: row.get(0)?,
                name: row.get(1)?,
                speciality: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    // ==================== Schedule Directory ====================

    /// Open slots for a doctor, earliest (date, start time) first.
    pub fn available_slots(&self, doctor_id: i64) -> DbResult<Vec<Slot>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT schedule_date, start_time, end_time
             FROM doctor_schedules
             WHERE doctor_id = ?1 AND is_available = 1
             ORDER BY schedule_date, start_time",
        )?;

        let rows = stmt.query_map(params![doctor_id], |row| {
            Ok(Slot {
                date: row.get(0)?,
                start_time: row.get(1)?,
                end_time: row.get(2)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Whether the doctor has at least one open slot.
    pub fn has_open_slots(&self, doctor_id: i64) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM doctor_schedules
             WHERE doctor_id = ?1 AND is_available = 1",
            params![doctor_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ==================== Booking Writer ====================

    /// Atomically create the patient and appointment records and flip the
    /// matching slot to unavailable.
    ///
    /// A second booking of the same (doctor, date, time) triplet fails with
    /// [`DbError::SlotTaken`] rather than silently succeeding.
    pub fn book_appointment(
        &self,
        doctor_id: i64,
        patient_name: &str,
        phone: &str,
        date: &str,
        time: &str,
    ) -> DbResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO patients (name, phone) VALUES (?1, ?2)",
            params![patient_name, phone],
        )?;
        let patient_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO appointments (doctor_id, patient_id, schedule_date, start_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![doctor_id, patient_id, date, time],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation => {
                DbError::SlotTaken {
                    doctor_id,
                    date: date.to_string(),
                    time: time.to_string(),
                }
            }
            other => DbError::Sqlite(other),
        })?;

        tx.execute(
            "UPDATE doctor_schedules SET is_available = 0
             WHERE doctor_id = ?1 AND schedule_date = ?2 AND start_time = ?3",
            params![doctor_id, date, time],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ==================== Seeding ====================

    /// Add a doctor to the directory. Returns the new doctor id.
    pub fn insert_doctor(&self, name: &str, speciality: &str) -> DbResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO doctors (name, speciality) VALUES (?1, ?2)",
            params![name, speciality],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Add an open slot to a doctor's schedule.
    pub fn insert_slot(
        &self,
        doctor_id: i64,
        date: &str,
        start_time: &str,
        end_time: &str,
    ) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO doctor_schedules (doctor_id, schedule_date, start_time, end_time)
             VALUES (?1, ?2, ?3, ?4)",
            params![doctor_id, date, start_time, end_time],
        )?;
        Ok(())
    }

    /// Seed a small demo directory if the doctors table is empty.
    pub fn seed_demo_data(&self) -> DbResult<()> {
        {
            let conn = self.conn.lock().unwrap();
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM doctors", [], |row| row.get(0))?;
            if count > 0 {
                return Ok(());
            }
        }

        let dr_smith = self.insert_doctor("Dr Smith", "Orthopedics")?;
        let dr_patel = self.insert_doctor("Dr Patel", "Orthopedics")?;
        let dr_jones = self.insert_doctor("Dr Jones", "Dermatology")?;
        let dr_wong = self.insert_doctor("Dr Wong", "General Medicine")?;

        self.insert_slot(dr_smith, "2026-09-01", "09:00", "09:30")?;
        self.insert_slot(dr_smith, "2026-09-01", "10:00", "10:30")?;
        self.insert_slot(dr_smith, "2026-09-02", "09:00", "09:30")?;
        self.insert_slot(dr_patel, "2026-09-01", "11:00", "11:30")?;
        self.insert_slot(dr_jones, "2026-09-03", "14:00", "14:30")?;
        self.insert_slot(dr_wong, "2026-09-01", "09:00", "09:30")?;
        self.insert_slot(dr_wong, "2026-09-04", "15:00", "15:30")?;

        tracing::info!("Seeded demo doctors and schedules");
        Ok(())
    }
}
