// ==========================================
// 语言学校课时账本 - 补课券数据仓储
// ==========================================
// 存储: makeup_credit 表,以 (student_id, ticket_id) 为键
// 红线: 单张券的读改写在同一事务内完成,不做整集合替换
// 红线: Repository 不含业务逻辑 (状态机校验由调用方闭包完成)
// ==========================================

use crate::db::SharedConnection;
use crate::domain::{AssignedClass, MakeupCredit, MakeupStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{opt_ts_from_sql, ts_from_sql, ts_to_sql};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

const MAKEUP_COLUMNS: &str = r#"
    ticket_id, student_id, status, missed_class, missed_coach,
    assigned_day, assigned_time, assigned_coach, assigned_date, assigned_note,
    created_at, expiry, updated_at, used_at
"#;

fn map_makeup_row(row: &Row<'_>) -> rusqlite::Result<MakeupCredit> {
    let status_raw: String = row.get(2)?;
    let status = MakeupStatus::from_code(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("未知补课券状态: {}", status_raw).into(),
        )
    })?;

    let assigned_day: Option<String> = row.get(5)?;
    let assigned_class = match assigned_day {
        Some(day) => Some(AssignedClass {
            day,
            time: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            coach: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            date: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            note: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(MakeupCredit {
        ticket_id: row.get(0)?,
        student_id: row.get(1)?,
        status,
        missed_class: row.get(3)?,
        missed_coach: row.get(4)?,
        assigned_class,
        created_at: ts_from_sql(10, &row.get::<_, String>(10)?)?,
        expiry: ts_from_sql(11, &row.get::<_, String>(11)?)?,
        updated_at: opt_ts_from_sql(12, row.get(12)?)?,
        used_at: opt_ts_from_sql(13, row.get(13)?)?,
    })
}

// ==========================================
// 连接级函数 (供 StudentRepository 复用)
// ==========================================

pub(crate) fn insert_ticket(conn: &Connection, credit: &MakeupCredit) -> RepositoryResult<()> {
    let assigned = credit.assigned_class.as_ref();
    conn.execute(
        r#"
        INSERT INTO makeup_credit (
            ticket_id, student_id, status, missed_class, missed_coach,
            assigned_day, assigned_time, assigned_coach, assigned_date, assigned_note,
            created_at, expiry, updated_at, used_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
        params![
            credit.ticket_id,
            credit.student_id,
            credit.status.code(),
            credit.missed_class,
            credit.missed_coach,
            assigned.map(|a| a.day.clone()),
            assigned.map(|a| a.time.clone()),
            assigned.map(|a| a.coach.clone()),
            assigned.map(|a| a.date.clone()),
            assigned.map(|a| a.note.clone()),
            ts_to_sql(&credit.created_at),
            ts_to_sql(&credit.expiry),
            credit.updated_at.as_ref().map(ts_to_sql),
            credit.used_at.as_ref().map(ts_to_sql),
        ],
    )?;
    Ok(())
}

pub(crate) fn list_for_student(
    conn: &Connection,
    student_id: &str,
) -> RepositoryResult<Vec<MakeupCredit>> {
    let sql = format!(
        "SELECT {} FROM makeup_credit WHERE student_id = ?1 ORDER BY seq",
        MAKEUP_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let credits = stmt
        .query_map(params![student_id], map_makeup_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(credits)
}

fn find_in(
    conn: &Connection,
    student_id: &str,
    ticket_id: &str,
) -> RepositoryResult<Option<MakeupCredit>> {
    let sql = format!(
        "SELECT {} FROM makeup_credit WHERE student_id = ?1 AND ticket_id = ?2",
        MAKEUP_COLUMNS
    );
    let credit = conn
        .query_row(&sql, params![student_id, ticket_id], map_makeup_row)
        .optional()?;
    Ok(credit)
}

// ==========================================
// MakeupCreditRepository - 补课券仓储
// ==========================================
pub struct MakeupCreditRepository {
    conn: SharedConnection,
}

impl MakeupCreditRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(RepositoryError::lock)
    }

    /// 追加一张补课券
    pub fn insert(&self, credit: &MakeupCredit) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_ticket(&conn, credit)
    }

    /// 按键查询单张补课券
    pub fn find(&self, student_id: &str, ticket_id: &str) -> RepositoryResult<Option<MakeupCredit>> {
        let conn = self.get_conn()?;
        find_in(&conn, student_id, ticket_id)
    }

    /// 按创建顺序列出学员全部补课券
    pub fn list_by_student(&self, student_id: &str) -> RepositoryResult<Vec<MakeupCredit>> {
        let conn = self.get_conn()?;
        list_for_student(&conn, student_id)
    }

    /// 列出所有未核销的补课券 (AVAILABLE / ASSIGNED)
    pub fn list_open(&self) -> RepositoryResult<Vec<MakeupCredit>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM makeup_credit WHERE status IN ('AVAILABLE', 'ASSIGNED') ORDER BY expiry, seq",
            MAKEUP_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let credits = stmt
            .query_map([], map_makeup_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(credits)
    }

    /// 单券原子更新
    ///
    /// 在 IMMEDIATE 事务内读取当前券 → 交给闭包计算新值 → 写回。
    ///
    /// # 返回
    /// - Ok(None): 券已不存在 (可能被并发删除)
    /// - Ok(Some(updated)): 写回后的券
    /// - Err(e): 闭包拒绝或数据库错误,不做任何写入
    pub fn update_ticket<E, F>(
        &self,
        student_id: &str,
        ticket_id: &str,
        apply: F,
    ) -> Result<Option<MakeupCredit>, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(MakeupCredit) -> Result<MakeupCredit, E>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        let current = match find_in(&tx, student_id, ticket_id)? {
            Some(c) => c,
            None => return Ok(None),
        };

        let updated = apply(current)?;
        let assigned = updated.assigned_class.as_ref();

        tx.execute(
            r#"
            UPDATE makeup_credit SET
                status = ?1,
                assigned_day = ?2, assigned_time = ?3, assigned_coach = ?4,
                assigned_date = ?5, assigned_note = ?6,
                updated_at = ?7, used_at = ?8
            WHERE student_id = ?9 AND ticket_id = ?10
            "#,
            params![
                updated.status.code(),
                assigned.map(|a| a.day.clone()),
                assigned.map(|a| a.time.clone()),
                assigned.map(|a| a.coach.clone()),
                assigned.map(|a| a.date.clone()),
                assigned.map(|a| a.note.clone()),
                updated.updated_at.as_ref().map(ts_to_sql),
                updated.used_at.as_ref().map(ts_to_sql),
                student_id,
                ticket_id,
            ],
        )
        .map_err(RepositoryError::from)?;

        tx.commit().map_err(RepositoryError::from)?;
        Ok(Some(updated))
    }

    /// 永久删除单张补课券
    ///
    /// # 返回
    /// - Ok(true): 已删除
    /// - Ok(false): 券不存在
    pub fn delete(&self, student_id: &str, ticket_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "DELETE FROM makeup_credit WHERE student_id = ?1 AND ticket_id = ?2",
            params![student_id, ticket_id],
        )?;
        Ok(affected > 0)
    }
}
