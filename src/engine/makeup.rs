// ==========================================
// 语言学校课时账本 - 补课券生命周期
// ==========================================
// 状态机: AVAILABLE --assign--> ASSIGNED --redeem--> USED
//         ASSIGNED --assign--> ASSIGNED (覆盖安排)
//         任意状态 --delete--> 移除 (不可恢复)
// 红线: 单券按 ticket_id 原子更新,不做“移除旧值 + 追加新值”
// 红线: USED 不可回到 ASSIGNED; 已删除的券不可再被操作
// ==========================================

use crate::config::LedgerConfig;
use crate::domain::{AssignedClass, MakeupCredit, MakeupStatus};
use crate::engine::clock::Clock;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::repository::{BalanceStore, MakeupCreditRepository};
use std::sync::Arc;
use tracing::info;

pub struct MakeupLifecycle {
    store: Arc<dyn BalanceStore>,
    tickets: Arc<MakeupCreditRepository>,
    clock: Arc<dyn Clock>,
    validity_days: i64,
    strict_redeem: bool,
}

impl MakeupLifecycle {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        tickets: Arc<MakeupCreditRepository>,
        clock: Arc<dyn Clock>,
        config: &LedgerConfig,
    ) -> Self {
        Self {
            store,
            tickets,
            clock,
            validity_days: config.makeup_validity_days,
            strict_redeem: config.makeup_strict_redeem,
        }
    }

    /// 缺课生成补课券 (不去重,每次缺课独立发券)
    ///
    /// # 返回
    /// - Err(NotFound): 学员不存在
    pub fn create(
        &self,
        student_id: &str,
        missed_coach: &str,
        missed_class: &str,
    ) -> LedgerResult<MakeupCredit> {
        self.store.get_balance(student_id)?;

        let credit = MakeupCredit::issue(
            student_id,
            missed_coach,
            missed_class,
            self.clock.now(),
            self.validity_days,
        );
        self.tickets.insert(&credit)?;

        info!(
            student_id = %student_id,
            ticket_id = %credit.ticket_id,
            missed_class = %missed_class,
            missed_coach = %missed_coach,
            expiry = %credit.expiry,
            "补课券已生成"
        );
        Ok(credit)
    }

    /// 安排补课班级
    ///
    /// 对已安排的券再次调用会覆盖 assigned_class
    pub fn assign(
        &self,
        student_id: &str,
        ticket_id: &str,
        class_details: AssignedClass,
    ) -> LedgerResult<MakeupCredit> {
        class_details
            .validate()
            .map_err(LedgerError::InvalidArgument)?;

        let now = self.clock.now();
        let updated = self.tickets.update_ticket(student_id, ticket_id, |mut credit| {
            if credit.status == MakeupStatus::Used {
                return Err(LedgerError::InvalidStateTransition {
                    from: credit.status.to_string(),
                    to: MakeupStatus::Assigned.to_string(),
                });
            }
            if credit.is_expired(now) {
                return Err(LedgerError::TicketExpired {
                    ticket_id: credit.ticket_id.clone(),
                    expiry: credit.expiry,
                });
            }
            credit.status = MakeupStatus::Assigned;
            credit.assigned_class = Some(class_details);
            credit.updated_at = Some(now);
            Ok(credit)
        })?;

        let credit = updated.ok_or_else(|| LedgerError::ticket_not_found(student_id, ticket_id))?;
        info!(student_id = %student_id, ticket_id = %ticket_id, "补课券已安排");
        Ok(credit)
    }

    /// 核销补课券 (保留为历史记录,不删除)
    ///
    /// 默认允许 AVAILABLE 直接核销; makeup_strict_redeem 开启时必须先安排
    pub fn redeem(&self, student_id: &str, ticket_id: &str) -> LedgerResult<MakeupCredit> {
        let now = self.clock.now();
        let strict = self.strict_redeem;
        let updated = self.tickets.update_ticket(student_id, ticket_id, |mut credit| {
            let allowed = match credit.status {
                MakeupStatus::Assigned => true,
                MakeupStatus::Available => !strict,
                MakeupStatus::Used => false,
            };
            if !allowed {
                return Err(LedgerError::InvalidStateTransition {
                    from: credit.status.to_string(),
                    to: MakeupStatus::Used.to_string(),
                });
            }
            if credit.is_expired(now) {
                return Err(LedgerError::TicketExpired {
                    ticket_id: credit.ticket_id.clone(),
                    expiry: credit.expiry,
                });
            }
            credit.status = MakeupStatus::Used;
            credit.used_at = Some(now);
            credit.updated_at = Some(now);
            Ok(credit)
        })?;

        let credit = updated.ok_or_else(|| LedgerError::ticket_not_found(student_id, ticket_id))?;
        info!(student_id = %student_id, ticket_id = %ticket_id, "补课券已核销");
        Ok(credit)
    }

    /// 永久删除补课券,不论状态
    pub fn delete(&self, student_id: &str, ticket_id: &str) -> LedgerResult<()> {
        if !self.tickets.delete(student_id, ticket_id)? {
            return Err(LedgerError::ticket_not_found(student_id, ticket_id));
        }
        info!(student_id = %student_id, ticket_id = %ticket_id, "补课券已删除");
        Ok(())
    }

    /// 学员全部补课券 (按创建顺序); 读取不改变任何状态
    pub fn list(&self, student_id: &str) -> LedgerResult<Vec<MakeupCredit>> {
        Ok(self.store.get_makeup_credits(student_id)?)
    }

    /// 学员当前可核销的补课券 (未使用且未过期)
    pub fn list_redeemable(&self, student_id: &str) -> LedgerResult<Vec<MakeupCredit>> {
        let now = self.clock.now();
        Ok(self
            .list(student_id)?
            .into_iter()
            .filter(|c| c.is_redeemable(now))
            .collect())
    }
}
