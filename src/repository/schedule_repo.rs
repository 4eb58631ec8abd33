// ==========================================
// 语言学校课时账本 - 排课/选课数据仓储
// ==========================================
// 存储: class_session / class_enrollment / class_waitlist
// 协作者: 考勤核心只通过 ScheduleSource 读取花名册
// ==========================================

use crate::db::SharedConnection;
use crate::domain::{ClassSession, RosterEntry, WaitlistEntry};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{ts_from_sql, ts_to_sql};
use chrono::{DateTime, Utc, Weekday};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

// ==========================================
// ScheduleSource Trait
// ==========================================
// 用途: 考勤处理器读取当天班级与花名册
pub trait ScheduleSource: Send + Sync {
    fn list_classes_for_day(&self, weekday: Weekday) -> RepositoryResult<Vec<ClassSession>>;
}

/// 姓名 → ID 回填结果 (数据迁移)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentBackfillReport {
    pub resolved: usize,
    /// 同名学员多于一个,需人工确认
    pub ambiguous: Vec<String>,
    /// 找不到同名学员
    pub unmatched: Vec<String>,
}

pub struct ScheduleRepository {
    conn: SharedConnection,
}

impl ScheduleRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(RepositoryError::lock)
    }

    /// 新建或更新班级基本信息 (不动花名册)
    pub fn upsert_class(&self, class: &ClassSession) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO class_session (class_id, name, day, time, coach, capacity)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(class_id) DO UPDATE SET
                name = ?2, day = ?3, time = ?4, coach = ?5, capacity = ?6
            "#,
            params![
                class.class_id,
                class.name,
                class.day,
                class.time,
                class.coach,
                class.capacity,
            ],
        )?;
        Ok(())
    }

    /// 直接选课 (不校验容量,历史数据存在超员)
    pub fn enroll(&self, class_id: &str, entry: &RosterEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        require_class(&conn, class_id)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO class_enrollment (class_id, student_name, student_id, enrolled_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![class_id, entry.student_name, entry.student_id, ts_to_sql(&Utc::now())],
        )?;
        Ok(())
    }

    pub fn join_waitlist(
        &self,
        class_id: &str,
        entry: &RosterEntry,
        joined_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        require_class(&conn, class_id)?;
        conn.execute(
            r#"
            INSERT OR IGNORE INTO class_waitlist (class_id, student_name, student_id, joined_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![class_id, entry.student_name, entry.student_id, ts_to_sql(&joined_at)],
        )?;
        Ok(())
    }

    /// 候补转正: 按加入时间先后填满空位
    ///
    /// # 返回
    /// - 本次转正的学员
    pub fn promote_from_waitlist(&self, class_id: &str) -> RepositoryResult<Vec<RosterEntry>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let class = load_class(&tx, class_id)?
            .ok_or_else(|| RepositoryError::not_found("class_session", class_id))?;
        let free_seats = (class.capacity as usize).saturating_sub(class.enrolled.len());

        let now = ts_to_sql(&Utc::now());
        let mut promoted = Vec::new();
        for waiting in class.waitlist.into_iter().take(free_seats) {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO class_enrollment (class_id, student_name, student_id, enrolled_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![class_id, waiting.student_name, waiting.student_id, now],
            )?;
            tx.execute(
                "DELETE FROM class_waitlist WHERE class_id = ?1 AND student_name = ?2",
                params![class_id, waiting.student_name],
            )?;
            promoted.push(RosterEntry {
                student_id: waiting.student_id,
                student_name: waiting.student_name,
            });
        }

        tx.commit()?;
        Ok(promoted)
    }

    pub fn find_class(&self, class_id: &str) -> RepositoryResult<Option<ClassSession>> {
        let conn = self.get_conn()?;
        load_class(&conn, class_id)
    }

    pub fn list_classes(&self) -> RepositoryResult<Vec<ClassSession>> {
        let conn = self.get_conn()?;
        let ids = {
            let mut stmt = conn.prepare("SELECT class_id FROM class_session ORDER BY time, class_id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        let mut classes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(class) = load_class(&conn, &id)? {
                classes.push(class);
            }
        }
        Ok(classes)
    }

    /// 回填选课记录中缺失的 student_id
    ///
    /// 仅当同名学员唯一时回填;同名多人或无人匹配只报告,不猜测
    pub fn backfill_enrollment_ids(&self) -> RepositoryResult<EnrollmentBackfillReport> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let names: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT student_name FROM class_enrollment WHERE student_id IS NULL ORDER BY student_name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
        };

        let mut report = EnrollmentBackfillReport::default();
        for name in names {
            let ids: Vec<String> = {
                let mut stmt = tx.prepare("SELECT student_id FROM student WHERE student_name = ?1")?;
                let ids = stmt
                    .query_map(params![name], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            match ids.as_slice() {
                [id] => {
                    report.resolved += tx.execute(
                        "UPDATE class_enrollment SET student_id = ?1 WHERE student_name = ?2 AND student_id IS NULL",
                        params![id, name],
                    )?;
                }
                [] => report.unmatched.push(name),
                _ => report.ambiguous.push(name),
            }
        }

        tx.commit()?;
        Ok(report)
    }
}

fn require_class(conn: &Connection, class_id: &str) -> RepositoryResult<()> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM class_session WHERE class_id = ?1",
            params![class_id],
            |_row| Ok(()),
        )
        .optional()?;
    exists.ok_or_else(|| RepositoryError::not_found("class_session", class_id))
}

fn load_class(conn: &Connection, class_id: &str) -> RepositoryResult<Option<ClassSession>> {
    let base = conn
        .query_row(
            "SELECT class_id, name, day, time, coach, capacity FROM class_session WHERE class_id = ?1",
            params![class_id],
            |row| {
                Ok(ClassSession {
                    class_id: row.get(0)?,
                    name: row.get(1)?,
                    day: row.get(2)?,
                    time: row.get(3)?,
                    coach: row.get(4)?,
                    capacity: row.get(5)?,
                    enrolled: Vec::new(),
                    waitlist: Vec::new(),
                })
            },
        )
        .optional()?;

    let mut class = match base {
        Some(c) => c,
        None => return Ok(None),
    };

    let mut stmt = conn.prepare(
        "SELECT student_id, student_name FROM class_enrollment WHERE class_id = ?1 ORDER BY enrolled_at, student_name",
    )?;
    class.enrolled = stmt
        .query_map(params![class_id], |row| {
            Ok(RosterEntry {
                student_id: row.get(0)?,
                student_name: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT student_id, student_name, joined_at FROM class_waitlist WHERE class_id = ?1 ORDER BY joined_at, student_name",
    )?;
    class.waitlist = stmt
        .query_map(params![class_id], |row| {
            Ok(WaitlistEntry {
                student_id: row.get(0)?,
                student_name: row.get(1)?,
                joined_at: ts_from_sql(2, &row.get::<_, String>(2)?)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(class))
}

impl ScheduleSource for ScheduleRepository {
    fn list_classes_for_day(&self, weekday: Weekday) -> RepositoryResult<Vec<ClassSession>> {
        Ok(self
            .list_classes()?
            .into_iter()
            .filter(|c| c.runs_on(weekday))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use chrono::Duration;

    fn class(id: &str, day: &str, capacity: u32) -> ClassSession {
        ClassSession {
            class_id: id.into(),
            name: format!("Class {}", id),
            day: day.into(),
            time: "09:00 - 11:00".into(),
            coach: "Kier".into(),
            capacity,
            enrolled: vec![],
            waitlist: vec![],
        }
    }

    #[test]
    fn test_promotion_respects_capacity_and_order() {
        let repo = ScheduleRepository::new(open_in_memory_shared().unwrap());
        repo.upsert_class(&class("c1", "Sat", 2)).unwrap();
        repo.enroll("c1", &RosterEntry::new("s1", "Anny")).unwrap();

        let t0 = Utc::now();
        repo.join_waitlist("c1", &RosterEntry::new("s3", "Cara"), t0 + Duration::minutes(5))
            .unwrap();
        repo.join_waitlist("c1", &RosterEntry::new("s2", "Ben"), t0).unwrap();

        let promoted = repo.promote_from_waitlist("c1").unwrap();
        assert_eq!(promoted, vec![RosterEntry::new("s2", "Ben")]);

        let c = repo.find_class("c1").unwrap().unwrap();
        assert_eq!(c.enrolled.len(), 2);
        assert_eq!(c.waitlist.len(), 1);
        assert_eq!(c.waitlist[0].student_name, "Cara");
    }

    #[test]
    fn test_enroll_unknown_class_is_not_found() {
        let repo = ScheduleRepository::new(open_in_memory_shared().unwrap());
        let err = repo.enroll("nope", &RosterEntry::new("s1", "Anny")).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_list_classes_for_compound_day() {
        let repo = ScheduleRepository::new(open_in_memory_shared().unwrap());
        repo.upsert_class(&class("c1", "TTh", 8)).unwrap();
        repo.upsert_class(&class("c2", "Sat", 8)).unwrap();

        let thursday = repo.list_classes_for_day(Weekday::Thu).unwrap();
        assert_eq!(thursday.len(), 1);
        assert_eq!(thursday[0].class_id, "c1");
    }
}
