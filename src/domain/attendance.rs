// ==========================================
// 语言学校课时账本 - 考勤领域模型
// ==========================================
// 红线: 批次汇总必须区分成功与跳过,不得虚报全部成功
// ==========================================

use crate::domain::schedule::{ClassSession, RosterEntry};
use crate::domain::types::AttendanceStatus;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// 输入: 考勤批次
// ==========================================

/// 单个学员的考勤标记
///
/// present 为 None 表示界面未操作,按缺勤处理
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceMark {
    pub entry: RosterEntry,
    pub present: Option<bool>,
    pub reason: Option<String>,
}

impl AttendanceMark {
    pub fn present(entry: RosterEntry) -> Self {
        Self {
            entry,
            present: Some(true),
            reason: None,
        }
    }

    pub fn absent(entry: RosterEntry, reason: Option<&str>) -> Self {
        Self {
            entry,
            present: Some(false),
            reason: reason.map(str::to_string),
        }
    }

    pub fn status(&self) -> AttendanceStatus {
        if self.present.unwrap_or(false) {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::Absent
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAttendance {
    pub class_id: String,
    pub class_name: String,
    pub coach: String,
    pub marks: Vec<AttendanceMark>,
}

impl ClassAttendance {
    /// 由班级花名册生成考勤表,全部默认未操作
    pub fn from_class(class: &ClassSession) -> Self {
        Self {
            class_id: class.class_id.clone(),
            class_name: class.name.clone(),
            coach: class.coach.clone(),
            marks: class
                .enrolled
                .iter()
                .cloned()
                .map(|entry| AttendanceMark {
                    entry,
                    present: None,
                    reason: None,
                })
                .collect(),
        }
    }

    /// 设置某学员的出勤标记 (按姓名定位,仅用于界面勾选)
    pub fn mark(&mut self, student_name: &str, present: bool, reason: Option<&str>) -> bool {
        match self
            .marks
            .iter_mut()
            .find(|m| m.entry.student_name == student_name)
        {
            Some(m) => {
                m.present = Some(present);
                m.reason = reason.map(str::to_string);
                true
            }
            None => false,
        }
    }
}

/// 同一时段+教练的考勤批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub date: NaiveDate,
    /// 本批次出勤扣减课时 (操作员选择,如 1/2/3)
    pub deduction_hours: f64,
    pub classes: Vec<ClassAttendance>,
}

// ==========================================
// 审计记录
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentAttendance {
    pub student_id: Option<String>,
    pub student_name: String,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceLog {
    pub log_id: String,
    pub class_id: String,
    pub date: NaiveDate,
    pub records: Vec<StudentAttendance>,
    pub recorded_at: DateTime<Utc>,
}

// ==========================================
// 输出: 批次汇总
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStudent {
    pub class_id: String,
    pub student_name: String,
    pub status: AttendanceStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// 成功扣减课时的出勤人数
    pub credits_deducted: usize,
    /// 成功生成的补课券数量
    pub makeups_created: usize,
    /// 缺勤但为非会员,不发券
    pub non_member_absences: usize,
    /// 处理成功的学员数
    pub processed: usize,
    /// 跳过的学员 (含原因)
    pub skipped: Vec<SkippedStudent>,
    /// 写入失败的班级审计记录
    pub audit_failures: Vec<String>,
}

impl SessionSummary {
    pub fn successes(&self) -> usize {
        self.processed
    }

    pub fn skips(&self) -> usize {
        self.skipped.len()
    }

    pub fn total(&self) -> usize {
        self.processed + self.skipped.len()
    }

    /// 是否完全成功 (无跳过且审计全部写入)
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.audit_failures.is_empty()
    }
}
