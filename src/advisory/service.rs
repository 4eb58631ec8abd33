// ==========================================
// 语言学校课时账本 - 批量建议生成
// ==========================================
// 并发: 有上限的并发分析 (buffer_unordered),结果按输入顺序返回
// 失败: 单个学员失败降级为保底结果,不影响其他学员
// ==========================================

use crate::advisory::advisor::{AdvisoryReport, StudentAdvisor};
use crate::domain::StudentSnapshot;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct AdvisoryService {
    advisor: Arc<dyn StudentAdvisor>,
    concurrency: usize,
}

impl AdvisoryService {
    pub fn new(advisor: Arc<dyn StudentAdvisor>, concurrency: usize) -> Self {
        Self {
            advisor,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn analyze(&self, snapshot: &StudentSnapshot) -> AdvisoryReport {
        match self.advisor.analyze(snapshot).await {
            Ok(report) => report,
            Err(e) => {
                warn!(student_id = %snapshot.balance.student_id, error = %e, "建议生成失败,使用保底结果");
                AdvisoryReport::fallback()
            }
        }
    }

    /// 批量分析,返回 (student_id, report),顺序与输入一致
    pub async fn analyze_many(&self, snapshots: &[StudentSnapshot]) -> Vec<(String, AdvisoryReport)> {
        let mut results: Vec<(usize, String, AdvisoryReport)> = stream::iter(snapshots.iter().enumerate())
            .map(|(idx, snapshot)| async move {
                let report = self.analyze(snapshot).await;
                (idx, snapshot.balance.student_id.clone(), report)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(idx, _, _)| *idx);
        debug!(count = results.len(), concurrency = self.concurrency, "批量建议生成完成");
        results.into_iter().map(|(_, id, report)| (id, report)).collect()
    }
}
