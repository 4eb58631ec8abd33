// ==========================================
// 语言学校课时账本 - 学员余额领域模型
// ==========================================
// 红线: free_hours_used <= free_hours_total
// 红线: used_hours 只增不减
// ==========================================

use crate::domain::types::{MembershipStatus, ScholarshipTier, StudentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// StudentBalance - 学员余额
// ==========================================
// credits 允许为负 (透支),当前不做拦截
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentBalance {
    pub student_id: String,
    pub student_name: String,

    // ===== 付费课时 =====
    pub credits: f64,     // 剩余付费课时 (可为负)
    pub total_hours: f64, // 累计购买课时
    pub used_hours: f64,  // 累计已消耗付费课时

    // ===== 等级与身份 =====
    pub tier: ScholarshipTier,
    pub membership: MembershipStatus,
    pub status: StudentStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentBalance {
    /// 入学/导入时的初始余额: credits = total_hours, used_hours = 0
    pub fn new_enrollment(
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        total_hours: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            student_name: student_name.into(),
            credits: total_hours,
            total_hours,
            used_hours: 0.0,
            tier: ScholarshipTier::None,
            membership: MembershipStatus::Member,
            status: StudentStatus::New,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn free_hours_total(&self) -> f64 {
        match self.tier {
            ScholarshipTier::Reward { free_hours_total, .. } => free_hours_total,
            _ => 0.0,
        }
    }

    pub fn free_hours_used(&self) -> f64 {
        match self.tier {
            ScholarshipTier::Reward { free_hours_used, .. } => free_hours_used,
            _ => 0.0,
        }
    }

    /// 是否已透支
    pub fn is_overdrawn(&self) -> bool {
        self.credits < 0.0
    }
}

// ==========================================
// BalanceDelta - 字段级增量
// ==========================================
// 用途: 余额存储只接受增量,不接受整值覆写
// 语义: 每个字段独立累加,两次 apply 等价于一次合并 apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub credits: f64,
    pub total_hours: f64,
    pub used_hours: f64,
    pub free_hours_used: f64,
}

impl BalanceDelta {
    pub fn credits(amount: f64) -> Self {
        Self {
            credits: amount,
            ..Self::default()
        }
    }

    pub fn used_hours(amount: f64) -> Self {
        Self {
            used_hours: amount,
            ..Self::default()
        }
    }

    /// 付费扣减: credits -= amount, used_hours += amount
    pub fn paid_deduction(amount: f64) -> Self {
        Self {
            credits: -amount,
            used_hours: amount,
            ..Self::default()
        }
    }

    /// 合并两个增量
    pub fn merge(self, other: BalanceDelta) -> Self {
        Self {
            credits: self.credits + other.credits,
            total_hours: self.total_hours + other.total_hours,
            used_hours: self.used_hours + other.used_hours,
            free_hours_used: self.free_hours_used + other.free_hours_used,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.credits == 0.0
            && self.total_hours == 0.0
            && self.used_hours == 0.0
            && self.free_hours_used == 0.0
    }

    /// 学员视角下本次消耗的课时 (赠送 + 付费)
    pub fn consumed_hours(&self) -> f64 {
        self.free_hours_used + self.used_hours
    }
}

// ==========================================
// StudentSnapshot - 学员快照 (顾问分析输入)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub balance: StudentBalance,
    pub open_makeups: usize,
    /// 最近出勤记录,按时间升序
    pub recent_attendance: Vec<crate::domain::types::AttendanceStatus>,
    pub notes: Option<String>,
}
