// ==========================================
// 语言学校课时账本 - 课时包数据仓储
// ==========================================
// 存储: credit_package 表
// 红线: hours_remaining 有 CHECK >= 0 约束
// 红线: 购课的课时包与聚合余额在同一事务内写入
// ==========================================

use crate::db::SharedConnection;
use crate::domain::{BalanceDelta, CreditPackage, FifoDeduction, StudentBalance};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_time::{ts_from_sql, ts_to_sql};
use crate::repository::student_repo::{increment_balance, require_student};
use rusqlite::{params, Connection, Row, TransactionBehavior};

fn map_package_row(row: &Row<'_>) -> rusqlite::Result<CreditPackage> {
    Ok(CreditPackage {
        package_id: row.get(0)?,
        student_id: row.get(1)?,
        hours_purchased: row.get(2)?,
        hours_remaining: row.get(3)?,
        purchased_at: ts_from_sql(4, &row.get::<_, String>(4)?)?,
    })
}

fn select_active(conn: &Connection, student_id: &str) -> RepositoryResult<Vec<CreditPackage>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT package_id, student_id, hours_purchased, hours_remaining, purchased_at
        FROM credit_package
        WHERE student_id = ?1 AND hours_remaining > 0
        ORDER BY purchased_at, package_id
        "#,
    )?;
    let packages = stmt
        .query_map(params![student_id], map_package_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(packages)
}

fn insert_package(conn: &Connection, package: &CreditPackage) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO credit_package (
            package_id, student_id, hours_purchased, hours_remaining, purchased_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            package.package_id,
            package.student_id,
            package.hours_purchased,
            package.hours_remaining,
            ts_to_sql(&package.purchased_at),
        ],
    )?;
    Ok(())
}

pub struct PackageRepository {
    conn: SharedConnection,
}

impl PackageRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(RepositoryError::lock)
    }

    /// 购课: 新增课时包,同时 total_hours += h, credits += h
    ///
    /// # 返回
    /// - Ok(StudentBalance): 提交后的学员余额
    /// - Err(NotFound): 学员不存在,未写入任何数据
    pub fn insert_with_balance(&self, package: &CreditPackage) -> RepositoryResult<StudentBalance> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let delta = BalanceDelta {
            credits: package.hours_purchased,
            total_hours: package.hours_purchased,
            ..BalanceDelta::default()
        };
        if increment_balance(&tx, &package.student_id, &delta)? == 0 {
            return Err(RepositoryError::not_found("student", &package.student_id));
        }
        insert_package(&tx, package)?;
        let balance = require_student(&tx, &package.student_id)?;

        tx.commit()?;
        Ok(balance)
    }

    /// 学员全部课时包 (含已用完)
    pub fn list_by_student(&self, student_id: &str) -> RepositoryResult<Vec<CreditPackage>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT package_id, student_id, hours_purchased, hours_remaining, purchased_at
            FROM credit_package
            WHERE student_id = ?1
            ORDER BY purchased_at, package_id
            "#,
        )?;
        let packages = stmt
            .query_map(params![student_id], map_package_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(packages)
    }

    /// 课时包余量合计
    pub fn sum_remaining(&self, student_id: &str) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(hours_remaining), 0) FROM credit_package WHERE student_id = ?1",
            params![student_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// 在同一事务内读取有余量的课时包 → 由调用方生成扣减计划 → 写回
    ///
    /// 计划中的每一笔按 remaining_after 落库
    pub fn consume<E, F>(&self, student_id: &str, planner: F) -> Result<FifoDeduction, E>
    where
        E: From<RepositoryError>,
        F: FnOnce(Vec<CreditPackage>) -> Result<FifoDeduction, E>,
    {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(RepositoryError::from)?;

        let active = select_active(&tx, student_id)?;
        let plan = planner(active)?;

        for take in &plan.takes {
            tx.execute(
                "UPDATE credit_package SET hours_remaining = ?1 WHERE package_id = ?2 AND student_id = ?3",
                params![take.remaining_after, take.package_id, student_id],
            )
            .map_err(RepositoryError::from)?;
        }

        tx.commit().map_err(RepositoryError::from)?;
        Ok(plan)
    }
}
