// ==========================================
// 语言学校课时账本 - 规则版续费建议
// ==========================================
// 档位: 剩余 <= 8 → Tier1 / 高风险 / 立即跟进
//       9-16 → MidTier / 中风险 / 建议跟进
//       > 16 → Tier2 / 低风险
// 标记: low_hours (<= 16), high_absences (最近 5 次缺勤 >= 2)
// ==========================================

use crate::advisory::advisor::{
    AdvisoryError, AdvisoryFlags, AdvisoryReport, RenewalTier, RenewalUrgency, RiskLevel,
    StudentAdvisor,
};
use crate::domain::{AttendanceStatus, StudentSnapshot};
use async_trait::async_trait;

const TIER1_MAX_HOURS: f64 = 8.0;
const MID_TIER_MAX_HOURS: f64 = 16.0;
const ABSENCE_WINDOW: usize = 5;
const HIGH_ABSENCE_COUNT: usize = 2;

const REGRESSION_KEYWORDS: [&str; 3] = ["regress", "struggl", "退步"];

/// 最近 N 次课中的缺勤数
pub fn recent_absences(history: &[AttendanceStatus], window: usize) -> usize {
    history
        .iter()
        .rev()
        .take(window)
        .filter(|s| **s == AttendanceStatus::Absent)
        .count()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedAdvisor;

impl RuleBasedAdvisor {
    pub fn evaluate(snapshot: &StudentSnapshot) -> AdvisoryReport {
        let hours = snapshot.balance.credits;
        let absences = recent_absences(&snapshot.recent_attendance, ABSENCE_WINDOW);

        let performance_concerns = snapshot
            .notes
            .as_deref()
            .map(|n| {
                let lower = n.to_lowercase();
                REGRESSION_KEYWORDS.iter().any(|k| lower.contains(k))
            })
            .unwrap_or(false);

        let flags = AdvisoryFlags {
            low_hours: hours <= MID_TIER_MAX_HOURS,
            high_absences: absences >= HIGH_ABSENCE_COUNT,
            performance_concerns,
            suggest_coach_followup: absences >= HIGH_ABSENCE_COUNT || performance_concerns,
        };

        let (renewal_tier, renewal_urgency) = if hours <= TIER1_MAX_HOURS {
            (RenewalTier::Tier1, RenewalUrgency::ImmediateAction)
        } else if hours <= MID_TIER_MAX_HOURS {
            (RenewalTier::MidTier, RenewalUrgency::RecommendFollowUp)
        } else {
            (RenewalTier::Tier2, RenewalUrgency::None)
        };

        let risk_level = if hours <= TIER1_MAX_HOURS || flags.high_absences || performance_concerns {
            RiskLevel::High
        } else if hours <= MID_TIER_MAX_HOURS {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let action_item = match renewal_urgency {
            RenewalUrgency::ImmediateAction => "48 小时内联系家长讨论续费".to_string(),
            RenewalUrgency::RecommendFollowUp => "本周内跟进续费意向".to_string(),
            RenewalUrgency::None if flags.high_absences => "联系家长了解缺勤原因".to_string(),
            RenewalUrgency::None => "保持常规沟通".to_string(),
        };

        let mut talking_points = vec![format!("剩余课时 {:.1} 小时", hours)];
        if flags.high_absences {
            talking_points.push(format!("最近 {} 次课缺勤 {} 次", ABSENCE_WINDOW, absences));
        }
        if snapshot.open_makeups > 0 {
            talking_points.push(format!("有 {} 张补课券待安排", snapshot.open_makeups));
        }

        AdvisoryReport {
            summary: format!(
                "{}: 剩余 {:.1} 小时,已用 {:.1} 小时,风险 {}",
                snapshot.balance.student_name, hours, snapshot.balance.used_hours, risk_level
            ),
            risk_level,
            renewal_tier,
            renewal_urgency,
            action_item,
            talking_points,
            flags,
        }
    }
}

#[async_trait]
impl StudentAdvisor for RuleBasedAdvisor {
    async fn analyze(&self, snapshot: &StudentSnapshot) -> Result<AdvisoryReport, AdvisoryError> {
        Ok(Self::evaluate(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StudentBalance;
    use chrono::Utc;

    fn snapshot(hours: f64, history: Vec<AttendanceStatus>) -> StudentSnapshot {
        StudentSnapshot {
            balance: StudentBalance::new_enrollment("s1", "Anny", hours, Utc::now()),
            open_makeups: 0,
            recent_attendance: history,
            notes: None,
        }
    }

    #[test]
    fn test_hour_tiers() {
        let r = RuleBasedAdvisor::evaluate(&snapshot(8.0, vec![]));
        assert_eq!(r.risk_level, RiskLevel::High);
        assert_eq!(r.renewal_tier, RenewalTier::Tier1);
        assert!(r.flags.low_hours);

        let r = RuleBasedAdvisor::evaluate(&snapshot(12.0, vec![]));
        assert_eq!(r.risk_level, RiskLevel::Medium);
        assert_eq!(r.renewal_urgency, RenewalUrgency::RecommendFollowUp);

        let r = RuleBasedAdvisor::evaluate(&snapshot(16.5, vec![]));
        assert_eq!(r.risk_level, RiskLevel::Low);
        assert!(!r.flags.low_hours);
    }

    #[test]
    fn test_absences_only_count_last_five() {
        use AttendanceStatus::{Absent, Present};
        // 最早的两次缺勤在窗口之外
        let history = vec![Absent, Absent, Present, Present, Present, Present, Absent];
        assert_eq!(recent_absences(&history, 5), 1);

        let r = RuleBasedAdvisor::evaluate(&snapshot(30.0, history));
        assert!(!r.flags.high_absences);

        let r = RuleBasedAdvisor::evaluate(&snapshot(30.0, vec![Present, Absent, Absent]));
        assert!(r.flags.high_absences);
        assert_eq!(r.risk_level, RiskLevel::High);
    }
}
