// ==========================================
// 语言学校课时账本 - 课时扣减引擎
// ==========================================
// 职责: 把一次出勤扣减转换为余额增量,按奖学金等级路由
// 路由顺序:
// 1. Scholarship / Special: 不扣减
// 2. Reward: 先扣赠送课时,超出部分扣付费课时
// 3. None: 全部扣付费课时
// 红线: 学员视角的消耗 = 赠送部分 + 付费部分 = amount,不重复不遗漏
// 红线: free_hours_used 不超过 free_hours_total
// ==========================================

use crate::domain::{BalanceDelta, CreditPackage, FifoDeduction, PackageTake, ScholarshipTier, StudentBalance};
use crate::engine::clock::Clock;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::repository::{BalanceStore, BalanceUpdate, PackageRepository};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 校验扣减/充值数量
fn validate_amount(amount: f64) -> LedgerResult<()> {
    if !amount.is_finite() {
        return Err(LedgerError::InvalidArgument(format!("课时数量非法: {}", amount)));
    }
    if amount < 0.0 {
        return Err(LedgerError::InvalidArgument(format!("课时数量不能为负: {}", amount)));
    }
    Ok(())
}

/// 计算一次扣减的余额增量 (纯函数)
///
/// 调用方需保证 amount >= 0
pub fn plan_deduction(balance: &StudentBalance, amount: f64) -> BalanceDelta {
    if amount <= 0.0 {
        return BalanceDelta::default();
    }

    match balance.tier {
        ScholarshipTier::Scholarship | ScholarshipTier::Special => BalanceDelta::default(),
        ScholarshipTier::Reward { .. } => {
            let remaining_free = balance.tier.remaining_free_hours();
            if remaining_free > 0.0 {
                let free_deduction = remaining_free.min(amount);
                let normal_deduction = amount - free_deduction;
                let free = BalanceDelta {
                    free_hours_used: free_deduction,
                    ..BalanceDelta::default()
                };
                if normal_deduction > 0.0 {
                    free.merge(BalanceDelta::paid_deduction(normal_deduction))
                } else {
                    free
                }
            } else {
                BalanceDelta::paid_deduction(amount)
            }
        }
        ScholarshipTier::None => BalanceDelta::paid_deduction(amount),
    }
}

/// FIFO 课时包扣减计划 (纯函数)
///
/// 按 purchased_at 升序 (相同则 package_id 升序) 依次消耗;
/// 课时包耗尽仍有剩余时照常成功,剩余计入 uncovered
pub fn plan_fifo_deduction(
    student_id: &str,
    mut packages: Vec<CreditPackage>,
    amount: f64,
) -> LedgerResult<FifoDeduction> {
    packages.retain(CreditPackage::is_active);
    if packages.is_empty() {
        return Err(LedgerError::NoActiveCredit {
            student_id: student_id.to_string(),
        });
    }
    packages.sort_by(|a, b| a.fifo_cmp(b));

    let mut remaining_to_deduct = amount;
    let mut takes = Vec::new();
    for package in &packages {
        if remaining_to_deduct <= 0.0 {
            break;
        }
        let take = package.hours_remaining.min(remaining_to_deduct);
        remaining_to_deduct -= take;
        takes.push(PackageTake {
            package_id: package.package_id.clone(),
            hours: take,
            remaining_after: package.hours_remaining - take,
        });
    }

    Ok(FifoDeduction {
        student_id: student_id.to_string(),
        requested: amount,
        takes,
        uncovered: remaining_to_deduct.max(0.0),
    })
}

/// 购课结果: 新课时包与提交后的学员余额
#[derive(Debug, Clone, PartialEq)]
pub struct PackagePurchase {
    pub package: CreditPackage,
    pub balance: StudentBalance,
}

// ==========================================
// LedgerEngine - 课时账本引擎
// ==========================================
pub struct LedgerEngine {
    store: Arc<dyn BalanceStore>,
    packages: Arc<PackageRepository>,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        packages: Arc<PackageRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            packages,
            clock,
        }
    }

    /// 扣减课时
    ///
    /// # 返回
    /// - Ok(BalanceUpdate): 扣减前后余额与实际增量
    /// - Err(InvalidArgument): amount 为负或非有限数,未做任何写入
    /// - Err(NotFound): 学员不存在
    pub fn deduct(&self, student_id: &str, amount: f64) -> LedgerResult<BalanceUpdate> {
        validate_amount(amount)?;

        if amount == 0.0 {
            let balance = self.store.get_balance(student_id)?;
            return Ok(BalanceUpdate {
                before: balance.clone(),
                after: balance,
                delta: BalanceDelta::default(),
            });
        }

        let update = self
            .store
            .update_balance(student_id, &|balance| plan_deduction(balance, amount))?;

        info!(
            student_id = %student_id,
            tier = %update.before.tier,
            amount,
            free_hours = update.delta.free_hours_used,
            paid_hours = update.delta.used_hours,
            credits_after = update.after.credits,
            "课时扣减完成"
        );
        if update.after.is_overdrawn() {
            warn!(student_id = %student_id, credits = update.after.credits, "学员课时已透支");
        }

        Ok(update)
    }

    /// 购买课时包: 新增课时包,同时 total_hours += hours, credits += hours (单事务)
    pub fn purchase_package(&self, student_id: &str, hours: f64) -> LedgerResult<PackagePurchase> {
        validate_amount(hours)?;
        if hours == 0.0 {
            return Err(LedgerError::InvalidArgument("课时包课时数必须大于 0".to_string()));
        }

        let package = CreditPackage {
            package_id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            hours_purchased: hours,
            hours_remaining: hours,
            purchased_at: self.clock.now(),
        };
        let balance = self.packages.insert_with_balance(&package)?;

        info!(
            student_id = %student_id,
            package_id = %package.package_id,
            hours,
            credits_after = balance.credits,
            "课时包购买完成"
        );
        Ok(PackagePurchase { package, balance })
    }

    /// FIFO 课时包扣减
    ///
    /// # 返回
    /// - Ok(FifoDeduction): 扣减明细; uncovered > 0 表示课时包不足 (仅告警)
    /// - Err(NoActiveCredit): 扣减前没有任何有余量的课时包,余额未变动
    /// - Err(NotFound): 学员不存在
    pub fn deduct_packages(&self, student_id: &str, amount: f64) -> LedgerResult<FifoDeduction> {
        validate_amount(amount)?;
        self.store.get_balance(student_id)?;

        if amount == 0.0 {
            return Ok(FifoDeduction {
                student_id: student_id.to_string(),
                requested: 0.0,
                takes: Vec::new(),
                uncovered: 0.0,
            });
        }

        let plan = self.packages.consume(student_id, |active| {
            plan_fifo_deduction(student_id, active, amount)
        })?;

        debug!(student_id = %student_id, takes = plan.takes.len(), "课时包扣减明细已写入");
        if plan.is_under_covered() {
            warn!(
                student_id = %student_id,
                requested = amount,
                uncovered = plan.uncovered,
                "课时包余量不足,部分课时未被覆盖"
            );
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn balance(tier: ScholarshipTier, credits: f64, used: f64) -> StudentBalance {
        let mut b = StudentBalance::new_enrollment("s1", "Anny", credits, Utc::now());
        b.used_hours = used;
        b.tier = tier;
        b
    }

    fn package(id: &str, offset_days: i64, remaining: f64) -> CreditPackage {
        CreditPackage {
            package_id: id.to_string(),
            student_id: "s1".to_string(),
            hours_purchased: remaining,
            hours_remaining: remaining,
            purchased_at: Utc::now() - Duration::days(100 - offset_days),
        }
    }

    #[test]
    fn test_standard_deduction() {
        let delta = plan_deduction(&balance(ScholarshipTier::None, 10.0, 5.0), 2.0);
        assert_eq!(delta, BalanceDelta::paid_deduction(2.0));
    }

    #[test]
    fn test_reward_splits_free_and_paid() {
        let tier = ScholarshipTier::Reward {
            free_hours_total: 5.0,
            free_hours_used: 4.0,
        };
        let delta = plan_deduction(&balance(tier, 10.0, 0.0), 3.0);
        assert_eq!(delta.free_hours_used, 1.0);
        assert_eq!(delta.credits, -2.0);
        assert_eq!(delta.used_hours, 2.0);
        assert_eq!(delta.consumed_hours(), 3.0);
    }

    #[test]
    fn test_reward_fully_covered_by_free_hours() {
        let tier = ScholarshipTier::Reward {
            free_hours_total: 5.0,
            free_hours_used: 0.0,
        };
        let delta = plan_deduction(&balance(tier, 10.0, 0.0), 2.0);
        assert_eq!(delta.free_hours_used, 2.0);
        assert_eq!(delta.credits, 0.0);
        assert_eq!(delta.used_hours, 0.0);
    }

    #[test]
    fn test_reward_exhausted_falls_back_to_paid() {
        let tier = ScholarshipTier::Reward {
            free_hours_total: 5.0,
            free_hours_used: 5.0,
        };
        let delta = plan_deduction(&balance(tier, 10.0, 0.0), 1.5);
        assert_eq!(delta, BalanceDelta::paid_deduction(1.5));
    }

    #[test]
    fn test_subsidized_tiers_consume_nothing() {
        for tier in [ScholarshipTier::Scholarship, ScholarshipTier::Special] {
            assert!(plan_deduction(&balance(tier, 10.0, 0.0), 5.0).is_empty());
        }
    }

    #[test]
    fn test_conservation_across_tiers() {
        let tiers = [
            ScholarshipTier::None,
            ScholarshipTier::Reward {
                free_hours_total: 3.0,
                free_hours_used: 1.0,
            },
            ScholarshipTier::Reward {
                free_hours_total: 0.0,
                free_hours_used: 0.0,
            },
        ];
        for tier in tiers {
            for amount in [0.0, 0.5, 1.0, 2.0, 3.5, 10.0] {
                let b = balance(tier, 4.0, 0.0);
                let delta = plan_deduction(&b, amount);
                assert_eq!(delta.consumed_hours(), amount, "tier={:?} amount={}", tier, amount);
                assert!(b.free_hours_used() + delta.free_hours_used <= b.free_hours_total());
            }
        }
    }

    #[test]
    fn test_fifo_consumes_oldest_first() {
        let plan = plan_fifo_deduction(
            "s1",
            vec![package("B", 2, 5.0), package("A", 1, 3.0)],
            4.0,
        )
        .unwrap();
        assert_eq!(plan.takes.len(), 2);
        assert_eq!(plan.takes[0].package_id, "A");
        assert_eq!(plan.takes[0].remaining_after, 0.0);
        assert_eq!(plan.takes[1].package_id, "B");
        assert_eq!(plan.takes[1].remaining_after, 4.0);
        assert!(!plan.is_under_covered());
    }

    #[test]
    fn test_fifo_tie_breaks_on_package_id() {
        let ts = Utc::now();
        let mut a = package("pkg-a", 0, 1.0);
        let mut b = package("pkg-b", 0, 1.0);
        a.purchased_at = ts;
        b.purchased_at = ts;
        let plan = plan_fifo_deduction("s1", vec![b, a], 1.0).unwrap();
        assert_eq!(plan.takes.len(), 1);
        assert_eq!(plan.takes[0].package_id, "pkg-a");
    }

    #[test]
    fn test_fifo_overdraft_is_reported_not_failed() {
        let plan = plan_fifo_deduction("s1", vec![package("A", 1, 2.0)], 5.0).unwrap();
        assert_eq!(plan.covered(), 2.0);
        assert_eq!(plan.uncovered, 3.0);
        assert!(plan.takes.iter().all(|t| t.remaining_after >= 0.0));
    }

    #[test]
    fn test_fifo_without_active_packages_fails() {
        let err = plan_fifo_deduction("s1", vec![package("A", 1, 0.0)], 1.0).unwrap_err();
        assert!(matches!(err, LedgerError::NoActiveCredit { .. }));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(matches!(validate_amount(-1.0), Err(LedgerError::InvalidArgument(_))));
        assert!(matches!(validate_amount(f64::NAN), Err(LedgerError::InvalidArgument(_))));
        assert!(validate_amount(0.0).is_ok());
    }
}
