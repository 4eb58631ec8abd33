// ==========================================
// 语言学校课时账本 - SQLite 连接初始化
// ==========================================
// 所有连接都经由本模块打开: 外键级联 + busy 等待
// 建表语句可重复执行,启动时直接调用
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 写锁等待上限 (毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 共享连接类型
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 连接级设置,每个新连接都要执行一次 (学员删除依赖外键级联)
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表并包装为共享连接
pub fn open_shared(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 内存库 (测试用)
pub fn open_in_memory_shared() -> rusqlite::Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 初始化全部表结构 (幂等)
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS student (
            student_id TEXT PRIMARY KEY,
            student_name TEXT NOT NULL,
            credits REAL NOT NULL DEFAULT 0,
            total_hours REAL NOT NULL DEFAULT 0,
            used_hours REAL NOT NULL DEFAULT 0,
            scholarship_status TEXT NOT NULL DEFAULT 'none',
            free_hours_total REAL NOT NULL DEFAULT 0,
            free_hours_used REAL NOT NULL DEFAULT 0,
            member_status TEXT NOT NULL DEFAULT 'Member',
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_student_name ON student(student_name);

        CREATE TABLE IF NOT EXISTS credit_package (
            package_id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
            hours_purchased REAL NOT NULL,
            hours_remaining REAL NOT NULL CHECK (hours_remaining >= 0),
            purchased_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_package_student ON credit_package(student_id, purchased_at);

        CREATE TABLE IF NOT EXISTS makeup_credit (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id TEXT NOT NULL REFERENCES student(student_id) ON DELETE CASCADE,
            ticket_id TEXT NOT NULL,
            status TEXT NOT NULL,
            missed_class TEXT NOT NULL,
            missed_coach TEXT NOT NULL,
            assigned_day TEXT,
            assigned_time TEXT,
            assigned_coach TEXT,
            assigned_date TEXT,
            assigned_note TEXT,
            created_at TEXT NOT NULL,
            expiry TEXT NOT NULL,
            updated_at TEXT,
            used_at TEXT,
            UNIQUE (student_id, ticket_id)
        );

        CREATE TABLE IF NOT EXISTS class_session (
            class_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            day TEXT NOT NULL,
            time TEXT NOT NULL,
            coach TEXT NOT NULL DEFAULT '',
            capacity INTEGER NOT NULL DEFAULT 8
        );

        CREATE TABLE IF NOT EXISTS class_enrollment (
            class_id TEXT NOT NULL REFERENCES class_session(class_id) ON DELETE CASCADE,
            student_name TEXT NOT NULL,
            student_id TEXT,
            enrolled_at TEXT NOT NULL,
            PRIMARY KEY (class_id, student_name)
        );

        CREATE TABLE IF NOT EXISTS class_waitlist (
            class_id TEXT NOT NULL REFERENCES class_session(class_id) ON DELETE CASCADE,
            student_name TEXT NOT NULL,
            student_id TEXT,
            joined_at TEXT NOT NULL,
            PRIMARY KEY (class_id, student_name)
        );

        CREATE TABLE IF NOT EXISTS attendance_log (
            log_id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            attendance_date TEXT NOT NULL,
            records_json TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_attendance_class ON attendance_log(class_id, attendance_date);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 已写入的最高 schema 版本; 未建表的库返回 None
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let initialized = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .is_some();

    if initialized {
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_schema_version_absent_on_empty_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
