// ==========================================
// 语言学校课时账本 - 课时包领域模型
// ==========================================
// 红线: hours_remaining 永不为负
// 排序: purchased_at 升序, 相同时按 package_id 升序 (FIFO)
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditPackage {
    pub package_id: String,
    pub student_id: String,
    pub hours_purchased: f64,
    pub hours_remaining: f64,
    pub purchased_at: DateTime<Utc>,
}

impl CreditPackage {
    pub fn is_active(&self) -> bool {
        self.hours_remaining > 0.0
    }

    /// FIFO 排序比较
    pub fn fifo_cmp(&self, other: &CreditPackage) -> Ordering {
        self.purchased_at
            .cmp(&other.purchased_at)
            .then_with(|| self.package_id.cmp(&other.package_id))
    }
}

// ==========================================
// FifoDeduction - FIFO 扣减计划
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageTake {
    pub package_id: String,
    pub hours: f64,
    pub remaining_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FifoDeduction {
    pub student_id: String,
    pub requested: f64,
    pub takes: Vec<PackageTake>,
    /// 课时包耗尽后未覆盖的课时 (> 0 表示透支,仅告警)
    pub uncovered: f64,
}

impl FifoDeduction {
    pub fn covered(&self) -> f64 {
        self.takes.iter().map(|t| t.hours).sum()
    }

    pub fn is_under_covered(&self) -> bool {
        self.uncovered > 0.0
    }
}
