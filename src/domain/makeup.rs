// ==========================================
// 语言学校课时账本 - 补课券领域模型
// ==========================================
// 状态机: AVAILABLE --assign--> ASSIGNED --redeem--> USED
//         AVAILABLE|ASSIGNED --delete--> (移除)
//         ASSIGNED --assign--> ASSIGNED (覆盖 assigned_class)
// 过期: 仅作为信息字段,读取时不改变状态
// ==========================================

use crate::domain::types::MakeupStatus;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 补课券默认有效期 (天)
pub const DEFAULT_MAKEUP_VALIDITY_DAYS: i64 = 30;

// ==========================================
// AssignedClass - 已安排的补课班级
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedClass {
    pub day: String,
    pub time: String,
    pub coach: String,
    pub date: String,
    #[serde(default)]
    pub note: String,
}

impl AssignedClass {
    /// 校验必填字段
    pub fn validate(&self) -> Result<(), String> {
        let missing: Vec<&str> = [
            ("day", &self.day),
            ("time", &self.time),
            ("coach", &self.coach),
            ("date", &self.date),
        ]
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("缺少字段: {}", missing.join(",")))
        }
    }
}

// ==========================================
// MakeupCredit - 补课券
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MakeupCredit {
    pub ticket_id: String,
    pub student_id: String,
    pub status: MakeupStatus,
    pub missed_class: String,
    pub missed_coach: String,
    pub assigned_class: Option<AssignedClass>,
    pub created_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub used_at: Option<DateTime<Utc>>,
}

impl MakeupCredit {
    /// 缺课生成新补课券
    pub fn issue(
        student_id: impl Into<String>,
        missed_coach: impl Into<String>,
        missed_class: impl Into<String>,
        now: DateTime<Utc>,
        validity_days: i64,
    ) -> Self {
        Self {
            ticket_id: new_ticket_id(now),
            student_id: student_id.into(),
            status: MakeupStatus::Available,
            missed_class: missed_class.into(),
            missed_coach: missed_coach.into(),
            assigned_class: None,
            created_at: now,
            expiry: now + Duration::days(validity_days),
            updated_at: None,
            used_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry
    }

    /// 可核销: 未使用且未过期
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && !self.is_expired(now)
    }
}

/// 生成补课券 ID
///
/// 格式: {毫秒时间戳}-{随机后缀}; 同一毫秒内多次生成也不会冲突
pub fn new_ticket_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.timestamp_millis(), &suffix[..8])
}
