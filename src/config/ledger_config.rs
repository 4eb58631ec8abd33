// ==========================================
// 语言学校课时账本 - 账本运行参数
// ==========================================
// 来源: config_kv (global),启动时加载一次
// ==========================================

use crate::domain::DEFAULT_MAKEUP_VALIDITY_DAYS;
use serde::{Deserialize, Serialize};

/// 单批次写入上限 (存储侧限制)
pub const MAX_IMPORT_BATCH_SIZE: usize = 450;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// 补课券有效期 (天)
    pub makeup_validity_days: i64,
    /// 考勤批次默认扣减课时
    pub default_deduction_hours: f64,
    /// 导入/删除每批条数,1..=450
    pub import_batch_size: usize,
    pub student_cache_ttl_secs: i64,
    /// true: 只有 ASSIGNED 的券可核销
    pub makeup_strict_redeem: bool,
    /// 建议生成的并发上限
    pub advisory_concurrency: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            makeup_validity_days: DEFAULT_MAKEUP_VALIDITY_DAYS,
            default_deduction_hours: 2.0,
            import_batch_size: MAX_IMPORT_BATCH_SIZE,
            student_cache_ttl_secs: 300,
            makeup_strict_redeem: false,
            advisory_concurrency: 4,
        }
    }
}

impl LedgerConfig {
    /// 批次大小收敛到 1..=450
    pub fn clamp_batch_size(size: usize) -> usize {
        size.clamp(1, MAX_IMPORT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_clamped() {
        assert_eq!(LedgerConfig::clamp_batch_size(0), 1);
        assert_eq!(LedgerConfig::clamp_batch_size(100), 100);
        assert_eq!(LedgerConfig::clamp_batch_size(10_000), 450);
    }
}
