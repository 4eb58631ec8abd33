// ==========================================
// 语言学校课时账本 - 考勤批次处理器
// ==========================================
// 流程 (逐班级、逐学员):
//   1. 出勤标记 (未操作按缺勤)
//   2. 按花名册中的 student_id 定位学员 (不按姓名查找)
//   3. 出勤 → 扣减课时
//   4. 缺勤且非 Not Member → 生成补课券
//   5. 班级处理完后追加审计记录 (成功/失败都写)
// 红线: 单个学员失败只记为跳过,批次继续
// 红线: 汇总区分成功与跳过
// ==========================================

use crate::domain::schedule::{group_classes_by_time_and_coach, normalize_time_key, UNASSIGNED_COACH};
use crate::domain::{
    AttendanceMark, AttendanceSession, AttendanceStatus, ClassAttendance, MembershipStatus,
    SessionSummary, SkippedStudent, StudentAttendance,
};
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::ledger::LedgerEngine;
use crate::engine::makeup::MakeupLifecycle;
use crate::repository::{AttendanceSink, BalanceStore, ScheduleSource};
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 单个学员的处理结果
enum MarkOutcome {
    Deducted,
    MakeupCreated,
    NonMemberAbsence,
}

pub struct AttendanceProcessor {
    ledger: Arc<LedgerEngine>,
    makeups: Arc<MakeupLifecycle>,
    store: Arc<dyn BalanceStore>,
    sink: Arc<dyn AttendanceSink>,
}

impl AttendanceProcessor {
    pub fn new(
        ledger: Arc<LedgerEngine>,
        makeups: Arc<MakeupLifecycle>,
        store: Arc<dyn BalanceStore>,
        sink: Arc<dyn AttendanceSink>,
    ) -> Self {
        Self {
            ledger,
            makeups,
            store,
            sink,
        }
    }

    /// 处理一个考勤批次
    ///
    /// # 返回
    /// - Ok(SessionSummary): 成功/跳过分别计数
    /// - Err(InvalidArgument): deduction_hours 非法,未做任何写入
    pub fn process(&self, session: &AttendanceSession) -> LedgerResult<SessionSummary> {
        if !session.deduction_hours.is_finite() || session.deduction_hours < 0.0 {
            return Err(LedgerError::InvalidArgument(format!(
                "deduction_hours 非法: {}",
                session.deduction_hours
            )));
        }

        let mut summary = SessionSummary::default();

        for class in &session.classes {
            let mut records = Vec::with_capacity(class.marks.len());

            for mark in &class.marks {
                let status = mark.status();
                let reason = match self.apply_mark(class, mark, session.deduction_hours) {
                    Ok(outcome) => {
                        summary.processed += 1;
                        match outcome {
                            MarkOutcome::Deducted => summary.credits_deducted += 1,
                            MarkOutcome::MakeupCreated => summary.makeups_created += 1,
                            MarkOutcome::NonMemberAbsence => summary.non_member_absences += 1,
                        }
                        mark.reason.clone().unwrap_or_default()
                    }
                    Err(err) => {
                        warn!(
                            class_id = %class.class_id,
                            student_name = %mark.entry.student_name,
                            error = %err,
                            "考勤处理跳过学员"
                        );
                        summary.skipped.push(SkippedStudent {
                            class_id: class.class_id.clone(),
                            student_name: mark.entry.student_name.clone(),
                            status,
                            reason: err.to_string(),
                        });
                        mark.reason.clone().unwrap_or_default()
                    }
                };

                records.push(StudentAttendance {
                    student_id: mark.entry.student_id.clone(),
                    student_name: mark.entry.student_name.clone(),
                    status,
                    reason,
                });
            }

            if let Err(e) = self
                .sink
                .record_attendance(&class.class_id, session.date, &records)
            {
                error!(class_id = %class.class_id, error = %e, "考勤审计记录写入失败");
                summary.audit_failures.push(class.class_id.clone());
            }
        }

        info!(
            date = %session.date,
            processed = summary.successes(),
            skipped = summary.skips(),
            credits_deducted = summary.credits_deducted,
            makeups_created = summary.makeups_created,
            audit_failures = summary.audit_failures.len(),
            "考勤批次处理完成"
        );
        Ok(summary)
    }

    fn apply_mark(
        &self,
        class: &ClassAttendance,
        mark: &AttendanceMark,
        deduction_hours: f64,
    ) -> LedgerResult<MarkOutcome> {
        let student_id = mark.entry.student_id.as_deref().ok_or_else(|| {
            LedgerError::InvalidArgument(format!(
                "花名册条目缺少 student_id (unresolved): {}",
                mark.entry.student_name
            ))
        })?;

        match mark.status() {
            AttendanceStatus::Present => {
                self.ledger.deduct(student_id, deduction_hours)?;
                Ok(MarkOutcome::Deducted)
            }
            AttendanceStatus::Absent => {
                let balance = self.store.get_balance(student_id)?;
                if balance.membership == MembershipStatus::NonMember {
                    debug!(student_id = %student_id, "非会员缺勤,不发补课券");
                    return Ok(MarkOutcome::NonMemberAbsence);
                }
                self.makeups
                    .create(student_id, &class.coach, &class.class_name)?;
                Ok(MarkOutcome::MakeupCreated)
            }
        }
    }
}

/// 由排课数据组装一个考勤批次 (同一天、同一时段、同一教练)
///
/// coach 为空时匹配 Unassigned 分组
pub fn build_session(
    schedule: &dyn ScheduleSource,
    date: NaiveDate,
    time_key: &str,
    coach: &str,
    deduction_hours: f64,
) -> LedgerResult<AttendanceSession> {
    let classes = schedule.list_classes_for_day(date.weekday())?;
    let mut groups = group_classes_by_time_and_coach(&classes);

    let time_key = normalize_time_key(time_key);
    let coach_key = if coach.trim().is_empty() {
        UNASSIGNED_COACH
    } else {
        coach.trim()
    };

    let group = groups
        .get_mut(&time_key)
        .and_then(|by_coach| by_coach.remove(coach_key))
        .ok_or_else(|| LedgerError::NotFound {
            entity: "class_group".to_string(),
            id: format!("{} {} {}", date, time_key, coach_key),
        })?;

    Ok(AttendanceSession {
        date,
        deduction_hours,
        classes: group.iter().map(ClassAttendance::from_class).collect(),
    })
}
