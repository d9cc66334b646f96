use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::leave::WorkSchedule;

const SCHEDULE_COLUMNS: &str = r#"
            monday INTEGER NOT NULL,
            tuesday INTEGER NOT NULL,
            wednesday INTEGER NOT NULL,
            thursday INTEGER NOT NULL,
            friday INTEGER NOT NULL,
            saturday INTEGER NOT NULL,
            sunday INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            break_minutes INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))"#;

/// Opens the pool with the per-connection pragmas every writer relies on.
pub async fn connect_pool(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let _ = sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA temp_store=MEMORY;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(url)
        .await?;
    Ok(pool)
}

/// A write transaction opened with `BEGIN IMMEDIATE`.
///
/// The write lock is taken before the first read, so concurrent writers wait
/// on `busy_timeout` instead of failing with SQLITE_BUSY when a deferred read
/// transaction cannot be upgraded. Dropping it without [`WriteTx::commit`]
/// rolls back.
pub struct WriteTx {
    // Some until committed or dropped
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    pub async fn begin(pool: &SqlitePool) -> Result<Self, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    pub async fn commit(mut self) -> Result<(), sqlx::Error> {
        if let Some(conn) = self.conn.as_mut() {
            sqlx::query("COMMIT").execute(&mut **conn).await?;
        }
        // back to the pool outside any transaction
        self.conn = None;
        Ok(())
    }
}

impl Deref for WriteTx {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match &self.conn {
            Some(conn) => &**conn,
            None => unreachable!("write transaction used after commit"),
        }
    }
}

impl DerefMut for WriteTx {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match &mut self.conn {
            Some(conn) => &mut **conn,
            None => unreachable!("write transaction used after commit"),
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else { return };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        tracing::warn!("rollback failed, discarding connection: {}", e);
                        let _ = conn.close().await;
                    }
                });
            }
            // no runtime to roll back on; closing the connection discards the transaction
            Err(_) => drop(conn.detach()),
        }
    }
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Cascading deletes of employees depend on this
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS employees (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL DEFAULT 'employee' CHECK (role IN ('admin','employee')),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    // company-wide schedule, a single row
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS work_schedules (
            id INTEGER PRIMARY KEY CHECK (id = 1),{SCHEDULE_COLUMNS}
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS employee_work_schedules (
            employee_id TEXT PRIMARY KEY,{SCHEDULE_COLUMNS},
            FOREIGN KEY(employee_id) REFERENCES employees(id) ON DELETE CASCADE
        )"
    ))
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS holidays (
            id TEXT PRIMARY KEY,
            date TEXT NOT NULL,
            name TEXT NOT NULL,
            is_recurring INTEGER NOT NULL DEFAULT 0
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS leave_requests (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('vacation','permission')),
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','approved','rejected')),
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            time_from TEXT NULL,
            time_to TEXT NULL,
            note TEXT NULL,
            review_note TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            reviewed_at TEXT NULL,
            CHECK (start_date <= end_date),
            FOREIGN KEY(employee_id) REFERENCES employees(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS leave_balances (
            employee_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            vacation_days_total REAL NOT NULL,
            vacation_days_used REAL NOT NULL DEFAULT 0,
            permission_hours_total REAL NOT NULL,
            permission_hours_used REAL NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            PRIMARY KEY (employee_id, year),
            FOREIGN KEY(employee_id) REFERENCES employees(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS business_trips (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL,
            destination TEXT NOT NULL,
            purpose TEXT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending','approved','rejected')),
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            reviewed_at TEXT NULL,
            CHECK (start_date <= end_date),
            FOREIGN KEY(employee_id) REFERENCES employees(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS sick_leaves (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL,
            start_date TEXT NOT NULL,
            end_date TEXT NOT NULL,
            certificate_code TEXT NULL,
            note TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            CHECK (start_date <= end_date),
            FOREIGN KEY(employee_id) REFERENCES employees(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS unified_attendances (
            id TEXT PRIMARY KEY,
            employee_id TEXT NOT NULL,
            date TEXT NOT NULL,
            check_in_time TEXT NULL,
            check_out_time TEXT NULL,
            is_sick_leave INTEGER NOT NULL DEFAULT 0,
            is_business_trip INTEGER NOT NULL DEFAULT 0,
            business_trip_id TEXT NULL,
            sick_leave_id TEXT NULL,
            note TEXT NULL,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            UNIQUE (employee_id, date),
            FOREIGN KEY(employee_id) REFERENCES employees(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_holidays_date", "CREATE INDEX IF NOT EXISTS idx_holidays_date ON holidays(date)"),
        (
            "idx_leave_requests_employee_range",
            "CREATE INDEX IF NOT EXISTS idx_leave_requests_employee_range ON leave_requests(employee_id, start_date, end_date)",
        ),
        ("idx_leave_requests_status", "CREATE INDEX IF NOT EXISTS idx_leave_requests_status ON leave_requests(status)"),
        (
            "idx_business_trips_employee_range",
            "CREATE INDEX IF NOT EXISTS idx_business_trips_employee_range ON business_trips(employee_id, start_date, end_date)",
        ),
        (
            "idx_sick_leaves_employee_range",
            "CREATE INDEX IF NOT EXISTS idx_sick_leaves_employee_range ON sick_leaves(employee_id, start_date, end_date)",
        ),
        ("idx_attendance_trip", "CREATE INDEX IF NOT EXISTS idx_attendance_trip ON unified_attendances(business_trip_id)"),
        ("idx_attendance_sick", "CREATE INDEX IF NOT EXISTS idx_attendance_sick ON unified_attendances(sick_leave_id)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            match &e {
                sqlx::Error::Database(db_err) => {
                    let msg = db_err.message().to_lowercase();
                    if msg.contains("already exists") || msg.contains("duplicate") {
                        tracing::debug!("Index {} already exists, skipping", name);
                    } else {
                        tracing::warn!("Failed to create index {}: {}", name, e);
                    }
                }
                _ => {
                    tracing::warn!("Failed to create index {}: {}", name, e);
                }
            }
        }
    }

    Ok(())
}

/// Inserts the configured company schedule unless one is already stored.
pub async fn seed_company_schedule(pool: &SqlitePool, s: &WorkSchedule) -> anyhow::Result<bool> {
    let res = sqlx::query(
        r#"INSERT OR IGNORE INTO work_schedules
             (id, monday, tuesday, wednesday, thursday, friday, saturday, sunday, start_time, end_time, break_minutes)
           VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
    )
    .bind(s.monday)
    .bind(s.tuesday)
    .bind(s.wednesday)
    .bind(s.thursday)
    .bind(s.friday)
    .bind(s.saturday)
    .bind(s.sunday)
    .bind(s.start_time)
    .bind(s.end_time)
    .bind(i64::from(s.break_minutes))
    .execute(pool)
    .await?;
    let seeded = res.rows_affected() > 0;
    if seeded {
        tracing::info!("Seeded company work schedule from configuration");
    }
    Ok(seeded)
}
