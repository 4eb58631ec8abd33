// ==========================================
// 语言学校课时账本 - 学员余额数据仓储
// ==========================================
// 存储: student 表
// 红线: 余额变更只走增量 UPDATE (col = col + ?),不做整值覆写
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::SharedConnection;
use crate::domain::{
    BalanceDelta, MakeupCredit, MembershipStatus, ScholarshipTier, StudentBalance, StudentStatus,
};
use crate::repository::balance_store::{BalanceStore, BalanceUpdate};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::makeup_repo::{insert_ticket, list_for_student};
use crate::repository::sql_time::{ts_from_sql, ts_to_sql};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

const STUDENT_COLUMNS: &str = r#"
    student_id, student_name, credits, total_hours, used_hours,
    scholarship_status, free_hours_total, free_hours_used,
    member_status, status, created_at, updated_at
"#;

fn map_student_row(row: &Row<'_>) -> rusqlite::Result<StudentBalance> {
    let tier_raw: String = row.get(5)?;
    let free_total: f64 = row.get(6)?;
    let free_used: f64 = row.get(7)?;
    let tier = ScholarshipTier::from_parts(&tier_raw, free_total, free_used).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("未知奖学金等级: {}", tier_raw).into(),
        )
    })?;

    let status_raw: String = row.get(9)?;
    let status = StudentStatus::from_code(&status_raw).unwrap_or(StudentStatus::Active);

    Ok(StudentBalance {
        student_id: row.get(0)?,
        student_name: row.get(1)?,
        credits: row.get(2)?,
        total_hours: row.get(3)?,
        used_hours: row.get(4)?,
        tier,
        membership: MembershipStatus::from_code(&row.get::<_, String>(8)?),
        status,
        created_at: ts_from_sql(10, &row.get::<_, String>(10)?)?,
        updated_at: ts_from_sql(11, &row.get::<_, String>(11)?)?,
    })
}

fn select_student(conn: &Connection, student_id: &str) -> RepositoryResult<Option<StudentBalance>> {
    let sql = format!("SELECT {} FROM student WHERE student_id = ?1", STUDENT_COLUMNS);
    let student = conn
        .query_row(&sql, params![student_id], map_student_row)
        .optional()?;
    Ok(student)
}

pub(crate) fn require_student(conn: &Connection, student_id: &str) -> RepositoryResult<StudentBalance> {
    select_student(conn, student_id)?.ok_or_else(|| RepositoryError::not_found("student", student_id))
}

fn insert_student(conn: &Connection, s: &StudentBalance) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO student (
            student_id, student_name, credits, total_hours, used_hours,
            scholarship_status, free_hours_total, free_hours_used,
            member_status, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            s.student_id,
            s.student_name,
            s.credits,
            s.total_hours,
            s.used_hours,
            s.tier.code(),
            s.free_hours_total(),
            s.free_hours_used(),
            s.membership.code(),
            s.status.code(),
            ts_to_sql(&s.created_at),
            ts_to_sql(&s.updated_at),
        ],
    )?;
    Ok(())
}

/// 增量 UPDATE,返回受影响行数
pub(crate) fn increment_balance(conn: &Connection, student_id: &str, delta: &BalanceDelta) -> RepositoryResult<usize> {
    let affected = conn.execute(
        r#"
        UPDATE student SET
            credits = credits + ?1,
            total_hours = total_hours + ?2,
            used_hours = used_hours + ?3,
            free_hours_used = free_hours_used + ?4,
            updated_at = ?5
        WHERE student_id = ?6
        "#,
        params![
            delta.credits,
            delta.total_hours,
            delta.used_hours,
            delta.free_hours_used,
            ts_to_sql(&Utc::now()),
            student_id,
        ],
    )?;
    Ok(affected)
}

// ==========================================
// StudentRepository - 学员仓储
// ==========================================
pub struct StudentRepository {
    conn: SharedConnection,
}

impl StudentRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(RepositoryError::lock)
    }

    /// 新建学员
    pub fn insert(&self, student: &StudentBalance) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_student(&conn, student)
    }

    /// 批量导入学员 (单事务,按 student_id upsert)
    ///
    /// 已存在的学员覆盖姓名/课时/会员身份,保留奖学金等级与补课券
    pub fn upsert_batch(&self, students: &[StudentBalance]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for s in students {
            tx.execute(
                r#"
                INSERT INTO student (
                    student_id, student_name, credits, total_hours, used_hours,
                    scholarship_status, free_hours_total, free_hours_used,
                    member_status, status, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(student_id) DO UPDATE SET
                    student_name = excluded.student_name,
                    credits = excluded.credits,
                    total_hours = excluded.total_hours,
                    used_hours = excluded.used_hours,
                    member_status = excluded.member_status,
                    status = excluded.status,
                    updated_at = excluded.updated_at
                "#,
                params![
                    s.student_id,
                    s.student_name,
                    s.credits,
                    s.total_hours,
                    s.used_hours,
                    s.tier.code(),
                    s.free_hours_total(),
                    s.free_hours_used(),
                    s.membership.code(),
                    s.status.code(),
                    ts_to_sql(&s.created_at),
                    ts_to_sql(&s.updated_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(students.len())
    }

    /// 批量删除学员 (单事务)
    ///
    /// 补课券与课时包随外键级联删除
    pub fn delete_batch(&self, student_ids: &[String]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        for id in student_ids {
            deleted += tx.execute("DELETE FROM student WHERE student_id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(deleted)
    }

    pub fn find_by_id(&self, student_id: &str) -> RepositoryResult<Option<StudentBalance>> {
        let conn = self.get_conn()?;
        select_student(&conn, student_id)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<StudentBalance>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM student ORDER BY student_name", STUDENT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let students = stmt
            .query_map([], map_student_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(students)
    }

    pub fn list_ids(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT student_id FROM student ORDER BY student_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// 设置奖学金等级与赠送课时额度
    ///
    /// 非 Reward 等级会把赠送课时清零
    pub fn set_tier(&self, student_id: &str, tier: ScholarshipTier) -> RepositoryResult<StudentBalance> {
        let conn = self.get_conn()?;
        let (total, used) = match tier {
            ScholarshipTier::Reward {
                free_hours_total,
                free_hours_used,
            } => (free_hours_total, free_hours_used),
            _ => (0.0, 0.0),
        };
        if used > total {
            return Err(RepositoryError::field(
                "free_hours_used",
                format!("已用赠送课时 {} 超过额度 {}", used, total),
            ));
        }

        let affected = conn.execute(
            r#"
            UPDATE student SET scholarship_status = ?1, free_hours_total = ?2,
                free_hours_used = ?3, updated_at = ?4
            WHERE student_id = ?5
            "#,
            params![tier.code(), total, used, ts_to_sql(&Utc::now()), student_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("student", student_id));
        }
        require_student(&conn, student_id)
    }

    pub fn set_status(&self, student_id: &str, status: StudentStatus) -> RepositoryResult<StudentBalance> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE student SET status = ?1, updated_at = ?2 WHERE student_id = ?3",
            params![status.code(), ts_to_sql(&Utc::now()), student_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("student", student_id));
        }
        require_student(&conn, student_id)
    }

    pub fn set_membership(
        &self,
        student_id: &str,
        membership: MembershipStatus,
    ) -> RepositoryResult<StudentBalance> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE student SET member_status = ?1, updated_at = ?2 WHERE student_id = ?3",
            params![membership.code(), ts_to_sql(&Utc::now()), student_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::not_found("student", student_id));
        }
        require_student(&conn, student_id)
    }
}

// ==========================================
// BalanceStore 实现
// ==========================================
impl BalanceStore for StudentRepository {
    fn get_balance(&self, student_id: &str) -> RepositoryResult<StudentBalance> {
        let conn = self.get_conn()?;
        require_student(&conn, student_id)
    }

    fn apply_balance_delta(
        &self,
        student_id: &str,
        delta: &BalanceDelta,
    ) -> RepositoryResult<StudentBalance> {
        let conn = self.get_conn()?;
        if increment_balance(&conn, student_id, delta)? == 0 {
            return Err(RepositoryError::not_found("student", student_id));
        }
        require_student(&conn, student_id)
    }

    fn update_balance(
        &self,
        student_id: &str,
        compute: &dyn Fn(&StudentBalance) -> BalanceDelta,
    ) -> RepositoryResult<BalanceUpdate> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let before = require_student(&tx, student_id)?;
        let delta = compute(&before);
        let after = if delta.is_empty() {
            before.clone()
        } else {
            increment_balance(&tx, student_id, &delta)?;
            require_student(&tx, student_id)?
        };

        tx.commit()?;
        Ok(BalanceUpdate { before, after, delta })
    }

    fn get_makeup_credits(&self, student_id: &str) -> RepositoryResult<Vec<MakeupCredit>> {
        let conn = self.get_conn()?;
        require_student(&conn, student_id)?;
        list_for_student(&conn, student_id)
    }

    fn replace_makeup_credits(
        &self,
        student_id: &str,
        credits: &[MakeupCredit],
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        require_student(&tx, student_id)?;

        tx.execute(
            "DELETE FROM makeup_credit WHERE student_id = ?1",
            params![student_id],
        )?;
        for credit in credits {
            if credit.student_id != student_id {
                return Err(RepositoryError::field(
                    "student_id",
                    format!("补课券 {} 不属于学员 {}", credit.ticket_id, student_id),
                ));
            }
            insert_ticket(&tx, credit)?;
        }

        tx.commit()?;
        Ok(())
    }
}
