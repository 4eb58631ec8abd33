// ==========================================
// 语言学校课时账本 - 领域类型定义
// ==========================================
// 红线: 奖学金等级是封闭枚举,扣减路由必须穷举处理
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 奖学金等级 (Scholarship Tier)
// ==========================================
// 决定扣减路由:
// - Scholarship / Special: 全额减免,不消耗课时
// - Reward: 先消耗赠送课时,超出部分走付费课时
// - None: 标准付费
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScholarshipTier {
    None,
    Scholarship,
    Reward {
        free_hours_total: f64,
        free_hours_used: f64,
    },
    Special,
}

impl ScholarshipTier {
    /// 数据库存储代码
    pub fn code(&self) -> &'static str {
        match self {
            ScholarshipTier::None => "none",
            ScholarshipTier::Scholarship => "scholarship",
            ScholarshipTier::Reward { .. } => "reward",
            ScholarshipTier::Special => "special",
        }
    }

    /// 从存储列还原等级
    ///
    /// 空字符串视为 none (历史数据中该字段可能缺失)
    pub fn from_parts(code: &str, free_hours_total: f64, free_hours_used: f64) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Some(ScholarshipTier::None),
            "scholarship" => Some(ScholarshipTier::Scholarship),
            "reward" => Some(ScholarshipTier::Reward {
                free_hours_total,
                free_hours_used,
            }),
            "special" => Some(ScholarshipTier::Special),
            _ => None,
        }
    }

    /// 剩余赠送课时 (非 Reward 等级恒为 0)
    pub fn remaining_free_hours(&self) -> f64 {
        match self {
            ScholarshipTier::Reward {
                free_hours_total,
                free_hours_used,
            } => (free_hours_total - free_hours_used).max(0.0),
            _ => 0.0,
        }
    }
}

impl Default for ScholarshipTier {
    fn default() -> Self {
        ScholarshipTier::None
    }
}

impl fmt::Display for ScholarshipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// 学员状态 (Student Status)
// ==========================================
// 软删除: 学员不做物理删除,只做状态流转
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    New,
    Drop,
}

impl StudentStatus {
    pub fn code(&self) -> &'static str {
        match self {
            StudentStatus::Active => "active",
            StudentStatus::New => "new",
            StudentStatus::Drop => "drop",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "active" => Some(StudentStatus::Active),
            "new" => Some(StudentStatus::New),
            "drop" => Some(StudentStatus::Drop),
            _ => None,
        }
    }
}

impl fmt::Display for StudentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// 会员身份 (Membership)
// ==========================================
// 非会员缺课不发补课券
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Member,
    NonMember,
}

impl MembershipStatus {
    pub fn code(&self) -> &'static str {
        match self {
            MembershipStatus::Member => "Member",
            MembershipStatus::NonMember => "Not Member",
        }
    }

    /// 解析会员标记
    ///
    /// 只有明确的 "Not Member" 才算非会员,其余一律视为会员
    pub fn from_code(code: &str) -> Self {
        let normalized = code.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        if normalized == "not member" || normalized == "non member" {
            MembershipStatus::NonMember
        } else {
            MembershipStatus::Member
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// 补课券状态 (Makeup Status)
// ==========================================
// 状态机: AVAILABLE → ASSIGNED → USED
// 删除为物理移除,不保留状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MakeupStatus {
    Available,
    Assigned,
    Used,
}

impl MakeupStatus {
    pub fn code(&self) -> &'static str {
        match self {
            MakeupStatus::Available => "AVAILABLE",
            MakeupStatus::Assigned => "ASSIGNED",
            MakeupStatus::Used => "USED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => Some(MakeupStatus::Available),
            "ASSIGNED" => Some(MakeupStatus::Assigned),
            "USED" => Some(MakeupStatus::Used),
            _ => None,
        }
    }

    /// 是否仍处于可操作 (未核销) 状态
    pub fn is_open(&self) -> bool {
        matches!(self, MakeupStatus::Available | MakeupStatus::Assigned)
    }
}

impl fmt::Display for MakeupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// 出勤结果 (Attendance Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "present"),
            AttendanceStatus::Absent => write!(f, "absent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_parts() {
        assert_eq!(ScholarshipTier::from_parts("", 0.0, 0.0), Some(ScholarshipTier::None));
        assert_eq!(
            ScholarshipTier::from_parts("Reward", 5.0, 4.0),
            Some(ScholarshipTier::Reward {
                free_hours_total: 5.0,
                free_hours_used: 4.0
            })
        );
        assert_eq!(ScholarshipTier::from_parts("vip", 0.0, 0.0), None);
    }

    #[test]
    fn test_remaining_free_hours_never_negative() {
        let tier = ScholarshipTier::Reward {
            free_hours_total: 2.0,
            free_hours_used: 3.0,
        };
        assert_eq!(tier.remaining_free_hours(), 0.0);
        assert_eq!(ScholarshipTier::Special.remaining_free_hours(), 0.0);
    }

    #[test]
    fn test_membership_parsing() {
        assert_eq!(MembershipStatus::from_code("Not Member"), MembershipStatus::NonMember);
        assert_eq!(MembershipStatus::from_code("non-member"), MembershipStatus::NonMember);
        assert_eq!(MembershipStatus::from_code("Member"), MembershipStatus::Member);
        assert_eq!(MembershipStatus::from_code(""), MembershipStatus::Member);
    }
}
