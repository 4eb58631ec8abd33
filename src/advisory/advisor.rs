// ==========================================
// 语言学校课时账本 - 续费/流失建议接口
// ==========================================
// 红线: 建议仅供参考,账本决策不依赖其输出
// ==========================================

use crate::domain::StudentSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        write!(f, "{}", s)
    }
}

/// 续费档位 (按剩余课时)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenewalTier {
    /// <= 8 小时
    Tier1,
    /// 9-16 小时
    MidTier,
    /// > 16 小时
    Tier2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenewalUrgency {
    None,
    RecommendFollowUp,
    ImmediateAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryFlags {
    pub low_hours: bool,
    pub high_absences: bool,
    pub performance_concerns: bool,
    pub suggest_coach_followup: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryReport {
    pub summary: String,
    pub risk_level: RiskLevel,
    pub renewal_tier: RenewalTier,
    pub renewal_urgency: RenewalUrgency,
    pub action_item: String,
    pub talking_points: Vec<String>,
    pub flags: AdvisoryFlags,
}

impl AdvisoryReport {
    /// 分析失败时的保底结果,避免调用方崩溃
    pub fn fallback() -> Self {
        Self {
            summary: "暂时无法分析该学员,请人工核对".to_string(),
            risk_level: RiskLevel::Medium,
            renewal_tier: RenewalTier::MidTier,
            renewal_urgency: RenewalUrgency::RecommendFollowUp,
            action_item: "人工核对剩余课时与出勤记录".to_string(),
            talking_points: vec![
                "确认剩余课时".to_string(),
                "了解家长满意度".to_string(),
            ],
            flags: AdvisoryFlags::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AdvisoryError {
    #[error("建议服务不可用: {0}")]
    Unavailable(String),

    #[error("建议结果无法解析: {0}")]
    InvalidResponse(String),
}

// ==========================================
// StudentAdvisor Trait
// ==========================================
#[async_trait]
pub trait StudentAdvisor: Send + Sync {
    async fn analyze(&self, snapshot: &StudentSnapshot) -> Result<AdvisoryReport, AdvisoryError>;
}
