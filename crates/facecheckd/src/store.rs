//! SQLite persistence: employees, their single face profile, attendance.
//!
//! All access goes through one `tokio_rusqlite::Connection`, which runs
//! every call on a dedicated thread; a call is therefore atomic with
//! respect to the others.

use std::future::Future;
use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use facecheck_core::encoding;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::attendance::{day_bounds, local_day_bounds, CheckoutSummary, PeriodStarts};

const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS employees (
    id          TEXT PRIMARY KEY,
    full_name   TEXT NOT NULL,
    email       TEXT UNIQUE,
    department  TEXT,
    position    TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS face_profiles (
    id          TEXT PRIMARY KEY,
    employee_id TEXT NOT NULL UNIQUE REFERENCES employees(id) ON DELETE CASCADE,
    encoding    BLOB NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendances (
    id          TEXT PRIMARY KEY,
    employee_id TEXT NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
    check_in    TEXT NOT NULL,
    check_out   TEXT,
    notes       TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS attendances_employee_day
    ON attendances(employee_id, check_in);
";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),
    #[error("cannot create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEmployee {
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub id: String,
    pub employee_id: String,
    pub check_in: DateTime<Utc>,
    pub check_out: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of an employee. `None` leaves a field unchanged; a blank
/// email clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeUpdate {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

/// 1-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }

    fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Listing<T> {
    fn new(items: Vec<T>, total: i64, page: PageRequest) -> Self {
        Self {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            page: page.page,
            limit: page.limit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub employee_id: Option<String>,
    /// Local calendar day of the check-in.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub total_attendances: u64,
    pub today_attendances: u64,
    pub this_week_attendances: u64,
    pub this_month_attendances: u64,
    /// Checked in today and not yet out.
    pub active_attendances: u64,
    /// Checked in and out today.
    pub completed_attendances: u64,
}

/// A stored face profile as exposed over the API, encoding in wire form.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceProfileRecord {
    pub id: String,
    pub employee_id: String,
    pub employee_name: String,
    pub encoding: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A face profile as stored: the still-encoded bytes plus who it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub employee_id: String,
    pub employee_name: String,
    pub encoding: Vec<u8>,
}

/// Result of writing an employee's face profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileWrite {
    pub id: String,
    pub employee_id: String,
    /// True when an existing profile was overwritten.
    pub replaced: bool,
    pub updated_at: DateTime<Utc>,
}

/// Read-only access to the candidate set for face matching.
pub trait ProfileSource: Send + Sync {
    fn face_profiles(&self) -> impl Future<Output = Result<Vec<StoredProfile>, StoreError>> + Send;
}

#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|c| {
            c.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn create_employee(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        let full_name = new.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(StoreError::InvalidInput("fullName must not be empty".into()));
        }
        let employee = Employee {
            id: uuid::Uuid::new_v4().to_string(),
            full_name,
            email: new.email.filter(|e| !e.trim().is_empty()),
            department: new.department,
            position: new.position,
            created_at: Utc::now(),
        };

        let row = employee.clone();
        self.conn
            .call(move |c| {
                if let Some(email) = &row.email {
                    let taken: bool = c.query_row(
                        "SELECT EXISTS(SELECT 1 FROM employees WHERE email = ?1)",
                        params![email],
                        |r| r.get(0),
                    )?;
                    if taken {
                        return Ok(Err(StoreError::Conflict("email already exists".into())));
                    }
                }
                c.execute(
                    "INSERT INTO employees (id, full_name, email, department, position, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        row.id,
                        row.full_name,
                        row.email,
                        row.department,
                        row.position,
                        encode_ts(row.created_at),
                    ],
                )?;
                Ok(Ok(()))
            })
            .await??;

        tracing::info!(employee_id = %employee.id, "employee created");
        Ok(employee)
    }

    pub async fn employee(&self, id: &str) -> Result<Employee, StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |c| {
                let employee = c
                    .query_row(
                        "SELECT id, full_name, email, department, position, created_at
                         FROM employees WHERE id = ?1",
                        params![id],
                        employee_from_row,
                    )
                    .optional()?;
                Ok(employee)
            })
            .await?
            .ok_or_else(|| StoreError::NotFound("employee".into()))
    }

    /// Employees, newest first, optionally narrowed by a substring of name,
    /// email, department or position.
    pub async fn employees(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Listing<Employee>, StoreError> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));
        let (items, total) = self
            .conn
            .call(move |c| {
                let total: i64 = c.query_row(
                    "SELECT COUNT(*) FROM employees
                     WHERE ?1 IS NULL OR full_name LIKE ?1 OR email LIKE ?1
                        OR department LIKE ?1 OR position LIKE ?1",
                    params![pattern],
                    |r| r.get(0),
                )?;
                let mut stmt = c.prepare(
                    "SELECT id, full_name, email, department, position, created_at
                     FROM employees
                     WHERE ?1 IS NULL OR full_name LIKE ?1 OR email LIKE ?1
                        OR department LIKE ?1 OR position LIKE ?1
                     ORDER BY created_at DESC, id
                     LIMIT ?2 OFFSET ?3",
                )?;
                let items = stmt
                    .query_map(
                        params![pattern, page.limit, page.offset()],
                        employee_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((items, total))
            })
            .await?;
        Ok(Listing::new(items, total, page))
    }

    pub async fn update_employee(
        &self,
        id: &str,
        update: EmployeeUpdate,
    ) -> Result<Employee, StoreError> {
        let full_name = update.full_name.map(|n| n.trim().to_string());
        if full_name.as_deref() == Some("") {
            return Err(StoreError::InvalidInput("fullName must not be empty".into()));
        }
        let id = id.to_string();

        let employee = self
            .conn
            .call(move |c| {
                let tx = c.transaction()?;
                let existing = tx
                    .query_row(
                        "SELECT id, full_name, email, department, position, created_at
                         FROM employees WHERE id = ?1",
                        params![id],
                        employee_from_row,
                    )
                    .optional()?;
                let Some(existing) = existing else {
                    return Ok(Err(StoreError::NotFound("employee".into())));
                };

                let email = match update.email {
                    Some(e) if e.trim().is_empty() => None,
                    Some(e) => Some(e),
                    None => existing.email,
                };
                if let Some(email) = &email {
                    let taken: bool = tx.query_row(
                        "SELECT EXISTS(SELECT 1 FROM employees WHERE email = ?1 AND id != ?2)",
                        params![email, id],
                        |r| r.get(0),
                    )?;
                    if taken {
                        return Ok(Err(StoreError::Conflict("email already exists".into())));
                    }
                }

                let employee = Employee {
                    id: existing.id,
                    full_name: full_name.unwrap_or(existing.full_name),
                    email,
                    department: update.department.or(existing.department),
                    position: update.position.or(existing.position),
                    created_at: existing.created_at,
                };
                tx.execute(
                    "UPDATE employees SET full_name = ?1, email = ?2, department = ?3, position = ?4
                     WHERE id = ?5",
                    params![
                        employee.full_name,
                        employee.email,
                        employee.department,
                        employee.position,
                        employee.id,
                    ],
                )?;
                tx.commit()?;
                Ok(Ok(employee))
            })
            .await??;

        tracing::info!(employee_id = %employee.id, "employee updated");
        Ok(employee)
    }

    /// Delete an employee together with their face profile and attendance.
    pub async fn delete_employee(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let (id, removed) = self
            .conn
            .call(move |c| {
                let n = c.execute("DELETE FROM employees WHERE id = ?1", params![id])?;
                Ok((id, n))
            })
            .await?;
        if removed == 0 {
            return Err(StoreError::NotFound("employee".into()));
        }
        tracing::info!(employee_id = %id, "employee deleted");
        Ok(())
    }

    /// Store an employee's face encoding, replacing any previous one.
    pub async fn upsert_profile(
        &self,
        employee_id: &str,
        encoding: Vec<u8>,
    ) -> Result<ProfileWrite, StoreError> {
        let employee_id = employee_id.to_string();
        let now = Utc::now();
        let write = self
            .conn
            .call(move |c| {
                let tx = c.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM employees WHERE id = ?1)",
                    params![employee_id],
                    |r| r.get(0),
                )?;
                if !exists {
                    return Ok(Err(StoreError::NotFound("employee".into())));
                }

                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM face_profiles WHERE employee_id = ?1",
                        params![employee_id],
                        |r| r.get(0),
                    )
                    .optional()?;

                let ts = encode_ts(now);
                let (id, replaced) = match existing {
                    Some(id) => {
                        tx.execute(
                            "UPDATE face_profiles SET encoding = ?1, updated_at = ?2 WHERE id = ?3",
                            params![encoding, ts, id],
                        )?;
                        (id, true)
                    }
                    None => {
                        let id = uuid::Uuid::new_v4().to_string();
                        tx.execute(
                            "INSERT INTO face_profiles (id, employee_id, encoding, created_at, updated_at)
                             VALUES (?1, ?2, ?3, ?4, ?4)",
                            params![id, employee_id, encoding, ts],
                        )?;
                        (id, false)
                    }
                };
                tx.commit()?;

                Ok(Ok(ProfileWrite {
                    id,
                    employee_id,
                    replaced,
                    updated_at: now,
                }))
            })
            .await??;

        tracing::info!(
            employee_id = %write.employee_id,
            replaced = write.replaced,
            "face profile stored"
        );
        Ok(write)
    }

    /// Delete an employee's face profile. Returns whether one existed.
    pub async fn remove_profile_for(&self, employee_id: &str) -> Result<bool, StoreError> {
        let employee_id = employee_id.to_string();
        let removed = self
            .conn
            .call(move |c| {
                let n = c.execute(
                    "DELETE FROM face_profiles WHERE employee_id = ?1",
                    params![employee_id],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    pub async fn profile_exists(&self, employee_id: &str) -> Result<bool, StoreError> {
        let employee_id = employee_id.to_string();
        let exists = self
            .conn
            .call(move |c| {
                let exists: bool = c.query_row(
                    "SELECT EXISTS(SELECT 1 FROM face_profiles WHERE employee_id = ?1)",
                    params![employee_id],
                    |r| r.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    /// Stored face profiles, most recently written first.
    pub async fn profile_records(
        &self,
        employee_id: Option<&str>,
        page: PageRequest,
    ) -> Result<Listing<FaceProfileRecord>, StoreError> {
        let employee_id = employee_id.map(str::to_string);
        let (items, total) = self
            .conn
            .call(move |c| {
                let total: i64 = c.query_row(
                    "SELECT COUNT(*) FROM face_profiles WHERE ?1 IS NULL OR employee_id = ?1",
                    params![employee_id],
                    |r| r.get(0),
                )?;
                let mut stmt = c.prepare(
                    "SELECT p.id, p.employee_id, e.full_name, p.encoding, p.created_at, p.updated_at
                     FROM face_profiles p JOIN employees e ON e.id = p.employee_id
                     WHERE ?1 IS NULL OR p.employee_id = ?1
                     ORDER BY p.updated_at DESC, p.employee_id
                     LIMIT ?2 OFFSET ?3",
                )?;
                let items = stmt
                    .query_map(
                        params![employee_id, page.limit, page.offset()],
                        profile_record_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((items, total))
            })
            .await?;
        Ok(Listing::new(items, total, page))
    }

    pub async fn profile_record_for(
        &self,
        employee_id: &str,
    ) -> Result<Option<FaceProfileRecord>, StoreError> {
        let listing = self
            .profile_records(Some(employee_id), PageRequest::default())
            .await?;
        Ok(listing.items.into_iter().next())
    }

    /// Open an attendance record. At most one per employee per local day.
    pub async fn check_in(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Attendance, StoreError> {
        let employee_id = employee_id.to_string();
        let (day_start, day_end) = local_day_bounds(at);
        let now = Utc::now();

        let attendance = self
            .conn
            .call(move |c| {
                let tx = c.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM employees WHERE id = ?1)",
                    params![employee_id],
                    |r| r.get(0),
                )?;
                if !exists {
                    return Ok(Err(StoreError::NotFound("employee".into())));
                }

                let already: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM attendances
                     WHERE employee_id = ?1 AND check_in >= ?2 AND check_in < ?3)",
                    params![employee_id, encode_ts(day_start), encode_ts(day_end)],
                    |r| r.get(0),
                )?;
                if already {
                    return Ok(Err(StoreError::Conflict(
                        "employee already has attendance for today".into(),
                    )));
                }

                let attendance = Attendance {
                    id: uuid::Uuid::new_v4().to_string(),
                    employee_id,
                    check_in: at,
                    check_out: None,
                    notes,
                    created_at: now,
                    updated_at: now,
                };
                tx.execute(
                    "INSERT INTO attendances (id, employee_id, check_in, check_out, notes, created_at, updated_at)
                     VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?5)",
                    params![
                        attendance.id,
                        attendance.employee_id,
                        encode_ts(attendance.check_in),
                        attendance.notes,
                        encode_ts(now),
                    ],
                )?;
                tx.commit()?;
                Ok(Ok(attendance))
            })
            .await??;

        tracing::info!(
            employee_id = %attendance.employee_id,
            attendance_id = %attendance.id,
            "checked in"
        );
        Ok(attendance)
    }

    /// Today's attendance for `employee_id` that has not been checked out.
    pub async fn active_today(
        &self,
        employee_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Attendance>, StoreError> {
        let employee_id = employee_id.to_string();
        let (day_start, day_end) = local_day_bounds(now);
        let active = self
            .conn
            .call(move |c| {
                let attendance = c
                    .query_row(
                        "SELECT id, employee_id, check_in, check_out, notes, created_at, updated_at
                         FROM attendances
                         WHERE employee_id = ?1 AND check_in >= ?2 AND check_in < ?3
                           AND check_out IS NULL
                         ORDER BY check_in DESC LIMIT 1",
                        params![employee_id, encode_ts(day_start), encode_ts(day_end)],
                        attendance_from_row,
                    )
                    .optional()?;
                Ok(attendance)
            })
            .await?;
        Ok(active)
    }

    /// Close today's open attendance at `at`.
    pub async fn checkout_today(
        &self,
        employee_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(Attendance, CheckoutSummary), StoreError> {
        let mut attendance = self
            .active_today(employee_id, at)
            .await?
            .ok_or_else(|| StoreError::NotFound("active attendance for today".into()))?;

        let summary = CheckoutSummary::new(attendance.check_in, at).ok_or_else(|| {
            StoreError::InvalidInput("check-out time must be after check-in time".into())
        })?;

        attendance.check_out = Some(at);
        attendance.notes = Some(summary.annotate(attendance.notes.as_deref()));
        attendance.updated_at = Utc::now();

        let row = attendance.clone();
        let updated = self
            .conn
            .call(move |c| {
                let n = c.execute(
                    "UPDATE attendances SET check_out = ?1, notes = ?2, updated_at = ?3
                     WHERE id = ?4 AND check_out IS NULL",
                    params![
                        row.check_out.map(encode_ts),
                        row.notes,
                        encode_ts(row.updated_at),
                        row.id,
                    ],
                )?;
                Ok(n)
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::Conflict("employee already checked out".into()));
        }

        tracing::info!(
            employee_id = %attendance.employee_id,
            attendance_id = %attendance.id,
            hours = summary.hours,
            status = ?summary.status,
            "checked out"
        );
        Ok((attendance, summary))
    }

    pub async fn attendance(&self, id: &str) -> Result<Attendance, StoreError> {
        let id = id.to_string();
        self.conn
            .call(move |c| {
                let attendance = c
                    .query_row(
                        "SELECT id, employee_id, check_in, check_out, notes, created_at, updated_at
                         FROM attendances WHERE id = ?1",
                        params![id],
                        attendance_from_row,
                    )
                    .optional()?;
                Ok(attendance)
            })
            .await?
            .ok_or_else(|| StoreError::NotFound("attendance".into()))
    }

    /// Attendance records, latest check-in first.
    pub async fn attendances(
        &self,
        filter: AttendanceFilter,
        page: PageRequest,
    ) -> Result<Listing<Attendance>, StoreError> {
        let (from, until) = match filter.date.map(day_bounds) {
            Some((start, end)) => (Some(encode_ts(start)), Some(encode_ts(end))),
            None => (None, None),
        };
        let employee_id = filter.employee_id;

        let (items, total) = self
            .conn
            .call(move |c| {
                let total: i64 = c.query_row(
                    "SELECT COUNT(*) FROM attendances
                     WHERE (?1 IS NULL OR employee_id = ?1)
                       AND (?2 IS NULL OR check_in >= ?2)
                       AND (?3 IS NULL OR check_in < ?3)",
                    params![employee_id, from, until],
                    |r| r.get(0),
                )?;
                let mut stmt = c.prepare(
                    "SELECT id, employee_id, check_in, check_out, notes, created_at, updated_at
                     FROM attendances
                     WHERE (?1 IS NULL OR employee_id = ?1)
                       AND (?2 IS NULL OR check_in >= ?2)
                       AND (?3 IS NULL OR check_in < ?3)
                     ORDER BY check_in DESC, id
                     LIMIT ?4 OFFSET ?5",
                )?;
                let items = stmt
                    .query_map(
                        params![employee_id, from, until, page.limit, page.offset()],
                        attendance_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((items, total))
            })
            .await?;
        Ok(Listing::new(items, total, page))
    }

    /// Counts for the local day, week and month containing `now`.
    pub async fn attendance_stats(
        &self,
        now: DateTime<Utc>,
    ) -> Result<AttendanceStats, StoreError> {
        let starts = PeriodStarts::at(now);
        let (day, week, month) = (
            encode_ts(starts.day),
            encode_ts(starts.week),
            encode_ts(starts.month),
        );

        let counts = self
            .conn
            .call(move |c| {
                let counts = c.query_row(
                    "SELECT COUNT(*),
                            COUNT(CASE WHEN check_in >= ?1 THEN 1 END),
                            COUNT(CASE WHEN check_in >= ?2 THEN 1 END),
                            COUNT(CASE WHEN check_in >= ?3 THEN 1 END),
                            COUNT(CASE WHEN check_in >= ?1 AND check_out IS NULL THEN 1 END),
                            COUNT(CASE WHEN check_in >= ?1 AND check_out IS NOT NULL THEN 1 END)
                     FROM attendances",
                    params![day, week, month],
                    |r| {
                        let mut counts = [0i64; 6];
                        for (i, slot) in counts.iter_mut().enumerate() {
                            *slot = r.get(i)?;
                        }
                        Ok(counts)
                    },
                )?;
                Ok(counts)
            })
            .await?;

        let [total, today, this_week, this_month, active, completed] =
            counts.map(|n| u64::try_from(n).unwrap_or_default());
        Ok(AttendanceStats {
            total_attendances: total,
            today_attendances: today,
            this_week_attendances: this_week,
            this_month_attendances: this_month,
            active_attendances: active,
            completed_attendances: completed,
        })
    }
}

impl ProfileSource for Store {
    async fn face_profiles(&self) -> Result<Vec<StoredProfile>, StoreError> {
        let profiles = self
            .conn
            .call(|c| {
                let mut stmt = c.prepare(
                    "SELECT p.employee_id, e.full_name, p.encoding
                     FROM face_profiles p JOIN employees e ON e.id = p.employee_id
                     ORDER BY p.employee_id",
                )?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok(StoredProfile {
                            employee_id: r.get(0)?,
                            employee_name: r.get(1)?,
                            encoding: r.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(profiles)
    }
}

/// Fixed-width UTC timestamps so that text comparison orders chronologically.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn decode_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(_) => decode_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn employee_from_row(r: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: r.get(0)?,
        full_name: r.get(1)?,
        email: r.get(2)?,
        department: r.get(3)?,
        position: r.get(4)?,
        created_at: decode_ts(r, 5)?,
    })
}

fn attendance_from_row(r: &Row<'_>) -> rusqlite::Result<Attendance> {
    Ok(Attendance {
        id: r.get(0)?,
        employee_id: r.get(1)?,
        check_in: decode_ts(r, 2)?,
        check_out: decode_opt_ts(r, 3)?,
        notes: r.get(4)?,
        created_at: decode_ts(r, 5)?,
        updated_at: decode_ts(r, 6)?,
    })
}

fn profile_record_from_row(r: &Row<'_>) -> rusqlite::Result<FaceProfileRecord> {
    let stored: Vec<u8> = r.get(3)?;
    Ok(FaceProfileRecord {
        id: r.get(0)?,
        employee_id: r.get(1)?,
        employee_name: r.get(2)?,
        encoding: encoding::to_base64(&stored),
        created_at: decode_ts(r, 4)?,
        updated_at: decode_ts(r, 5)?,
    })
}
