// ==========================================
// 语言学校课时账本 - 学员建议 (可选协作者)
// ==========================================
// 红线: 只读学员快照,不写账本
// ==========================================

pub mod advisor;
pub mod rule_based;
pub mod service;

pub use advisor::{
    AdvisoryError, AdvisoryFlags, AdvisoryReport, RenewalTier, RenewalUrgency, RiskLevel,
    StudentAdvisor,
};
pub use rule_based::{recent_absences, RuleBasedAdvisor};
pub use service::AdvisoryService;
