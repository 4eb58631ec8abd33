// ==========================================
// 语言学校课时账本 - 考勤审计数据仓储
// ==========================================
// 存储: attendance_log 表 (只追加)
// 红线: 审计记录只追加,不修改不删除
// ==========================================

use crate::db::SharedConnection;
use crate::domain::{AttendanceLog, AttendanceStatus, StudentAttendance};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{date_from_sql, date_to_sql, ts_from_sql, ts_to_sql};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

// ==========================================
// AttendanceSink Trait
// ==========================================
// 用途: 考勤处理器写审计记录的出口
// 约定: 调用方不重试,失败仅记录日志
pub trait AttendanceSink: Send + Sync {
    /// 追加一个班级当天的考勤记录,返回日志 ID
    fn record_attendance(
        &self,
        class_id: &str,
        date: NaiveDate,
        records: &[StudentAttendance],
    ) -> RepositoryResult<String>;
}

fn map_log_row(row: &Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_log(raw: (String, String, String, String, String)) -> RepositoryResult<AttendanceLog> {
    let (log_id, class_id, date_raw, records_json, recorded_raw) = raw;
    Ok(AttendanceLog {
        log_id,
        class_id,
        date: date_from_sql(2, &date_raw)?,
        records: serde_json::from_str(&records_json)?,
        recorded_at: ts_from_sql(4, &recorded_raw)?,
    })
}

pub struct AttendanceLogRepository {
    conn: SharedConnection,
}

impl AttendanceLogRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(RepositoryError::lock)
    }

    pub fn insert(&self, log: &AttendanceLog) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO attendance_log (log_id, class_id, attendance_date, records_json, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                log.log_id,
                log.class_id,
                date_to_sql(&log.date),
                serde_json::to_string(&log.records)?,
                ts_to_sql(&log.recorded_at),
            ],
        )?;
        Ok(log.log_id.clone())
    }

    /// 某班级的历史考勤 (按日期倒序)
    pub fn list_by_class(&self, class_id: &str) -> RepositoryResult<Vec<AttendanceLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT log_id, class_id, attendance_date, records_json, recorded_at
            FROM attendance_log
            WHERE class_id = ?1
            ORDER BY attendance_date DESC, recorded_at DESC
            "#,
        )?;
        let rows = stmt
            .query_map(params![class_id], map_log_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_log).collect()
    }

    /// 某一天的全部考勤
    pub fn list_by_date(&self, date: NaiveDate) -> RepositoryResult<Vec<AttendanceLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT log_id, class_id, attendance_date, records_json, recorded_at
            FROM attendance_log
            WHERE attendance_date = ?1
            ORDER BY recorded_at
            "#,
        )?;
        let rows = stmt
            .query_map(params![date_to_sql(&date)], map_log_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_log).collect()
    }

    /// 某学员最近 limit 次考勤状态 (按时间升序)
    pub fn recent_for_student(
        &self,
        student_id: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<AttendanceStatus>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT log_id, class_id, attendance_date, records_json, recorded_at
            FROM attendance_log
            WHERE records_json LIKE ?1
            ORDER BY attendance_date DESC, recorded_at DESC
            "#,
        )?;
        let pattern = format!("%{}%", student_id);
        let rows = stmt
            .query_map(params![pattern], map_log_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut history = Vec::new();
        for raw in rows {
            let log = decode_log(raw)?;
            history.extend(
                log.records
                    .iter()
                    .filter(|r| r.student_id.as_deref() == Some(student_id))
                    .map(|r| r.status),
            );
            if history.len() >= limit {
                break;
            }
        }
        history.truncate(limit);
        history.reverse();
        Ok(history)
    }
}

impl AttendanceSink for AttendanceLogRepository {
    fn record_attendance(
        &self,
        class_id: &str,
        date: NaiveDate,
        records: &[StudentAttendance],
    ) -> RepositoryResult<String> {
        let log = AttendanceLog {
            log_id: Uuid::new_v4().to_string(),
            class_id: class_id.to_string(),
            date,
            records: records.to_vec(),
            recorded_at: Utc::now(),
        };
        self.insert(&log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;

    #[test]
    fn test_record_and_list_by_class() {
        let repo = AttendanceLogRepository::new(open_in_memory_shared().unwrap());
        let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let records = vec![StudentAttendance {
            student_id: Some("s1".into()),
            student_name: "Anny".into(),
            status: AttendanceStatus::Absent,
            reason: "Sick".into(),
        }];

        repo.record_attendance("c1", date, &records).unwrap();

        let logs = repo.list_by_class("c1").unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].records, records);
        assert_eq!(repo.list_by_date(date).unwrap().len(), 1);
        assert!(repo.list_by_class("c2").unwrap().is_empty());
    }

    #[test]
    fn test_recent_for_student_ascending_and_limited() {
        let repo = AttendanceLogRepository::new(open_in_memory_shared().unwrap());
        let record = |status| StudentAttendance {
            student_id: Some("s1".into()),
            student_name: "Anny".into(),
            status,
            reason: String::new(),
        };
        for (day, status) in [
            (1, AttendanceStatus::Absent),
            (2, AttendanceStatus::Present),
            (3, AttendanceStatus::Absent),
        ] {
            let date = NaiveDate::from_ymd_opt(2026, 10, day).unwrap();
            repo.record_attendance("c1", date, &[record(status)]).unwrap();
        }

        let history = repo.recent_for_student("s1", 2).unwrap();
        assert_eq!(history, vec![AttendanceStatus::Present, AttendanceStatus::Absent]);
        assert!(repo.recent_for_student("s2", 5).unwrap().is_empty());
    }
}
