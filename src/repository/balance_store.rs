// ==========================================
// 语言学校课时账本 - 余额存储 Trait
// ==========================================
// 职责: 定义学员余额的原子读改写接口（不包含业务逻辑）
// 红线: 只接受字段级增量,不做整值覆写
// 红线: 未知学员一律 NotFound,绝不隐式建档
// ==========================================

use crate::domain::{BalanceDelta, MakeupCredit, StudentBalance};
use crate::repository::error::RepositoryResult;

/// 一次余额更新的前后对照
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceUpdate {
    pub before: StudentBalance,
    pub after: StudentBalance,
    pub delta: BalanceDelta,
}

// ==========================================
// BalanceStore Trait
// ==========================================
// 实现者: StudentRepository（使用 rusqlite）
// 并发: 同一学员的增量串行化,不同字段的增量可任意交错且结果可交换
pub trait BalanceStore: Send + Sync {
    /// 读取学员余额
    ///
    /// # 返回
    /// - Err(NotFound): 学员不存在
    fn get_balance(&self, student_id: &str) -> RepositoryResult<StudentBalance>;

    /// 应用字段级增量并返回更新后的余额
    ///
    /// # 返回
    /// - Err(NotFound): 学员不存在 (不会新建记录)
    fn apply_balance_delta(
        &self,
        student_id: &str,
        delta: &BalanceDelta,
    ) -> RepositoryResult<StudentBalance>;

    /// 在同一事务内: 读取余额 → 计算增量 → 应用增量
    ///
    /// 用于依赖当前值计算的扣减 (赠送课时上限),避免并发扣减越界
    fn update_balance(
        &self,
        student_id: &str,
        compute: &dyn Fn(&StudentBalance) -> BalanceDelta,
    ) -> RepositoryResult<BalanceUpdate>;

    /// 读取学员的补课券集合 (按创建顺序)
    fn get_makeup_credits(&self, student_id: &str) -> RepositoryResult<Vec<MakeupCredit>>;

    /// 整体替换补课券集合 (导入/迁移用,日常操作走按券更新)
    fn replace_makeup_credits(
        &self,
        student_id: &str,
        credits: &[MakeupCredit],
    ) -> RepositoryResult<()>;
}
