// ==========================================
// 语言学校课时账本 - 排课/选课领域模型
// ==========================================
// 协作者: 为考勤处理提供花名册,核心只读
// 软约束: enrolled.len() <= capacity 仅在候补转正时执行
// ==========================================

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 未指定教练时的分组键
pub const UNASSIGNED_COACH: &str = "Unassigned";

// ==========================================
// RosterEntry - 花名册条目
// ==========================================
// student_id 为空表示历史数据只有姓名,需要迁移回填
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: Option<String>,
    pub student_name: String,
}

impl RosterEntry {
    pub fn new(student_id: impl Into<String>, student_name: impl Into<String>) -> Self {
        Self {
            student_id: Some(student_id.into()),
            student_name: student_name.into(),
        }
    }

    pub fn name_only(student_name: impl Into<String>) -> Self {
        Self {
            student_id: None,
            student_name: student_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub student_id: Option<String>,
    pub student_name: String,
    pub joined_at: DateTime<Utc>,
}

// ==========================================
// ClassSession - 班级
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSession {
    pub class_id: String,
    pub name: String,
    pub day: String,
    pub time: String,
    pub coach: String,
    pub capacity: u32,
    pub enrolled: Vec<RosterEntry>,
    pub waitlist: Vec<WaitlistEntry>,
}

impl ClassSession {
    pub fn has_free_seat(&self) -> bool {
        (self.enrolled.len() as u32) < self.capacity
    }

    pub fn is_over_capacity(&self) -> bool {
        (self.enrolled.len() as u32) > self.capacity
    }

    /// 是否在指定星期开课 (支持 TTh / WF 等复合代码)
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        expand_day_code(&self.day).contains(&weekday)
    }
}

// ==========================================
// 星期代码
// ==========================================

/// 展开星期代码
///
/// 复合代码: TTh → 周二+周四, WF → 周三+周五; Sa/Su 为周六/周日缩写
pub fn expand_day_code(code: &str) -> Vec<Weekday> {
    match code.trim() {
        "Mon" => vec![Weekday::Mon],
        "Tue" => vec![Weekday::Tue],
        "Wed" => vec![Weekday::Wed],
        "Thu" => vec![Weekday::Thu],
        "Fri" => vec![Weekday::Fri],
        "Sat" | "Sa" => vec![Weekday::Sat],
        "Sun" | "Su" => vec![Weekday::Sun],
        "TTh" => vec![Weekday::Tue, Weekday::Thu],
        "WF" => vec![Weekday::Wed, Weekday::Fri],
        "MW" => vec![Weekday::Mon, Weekday::Wed],
        _ => Vec::new(),
    }
}

/// 日期对应的星期缩写 (Mon..Sun)
pub fn weekday_code(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

// ==========================================
// 时段与课时换算
// ==========================================

/// 归一化时段键: "09.00 - 11.00" → "09:00-11:00"
pub fn normalize_time_key(time: &str) -> String {
    time.replace('.', ":").chars().filter(|c| !c.is_whitespace()).collect()
}

/// 计算时段时长 (分钟)
///
/// 输入格式 "HH:MM - HH:MM",无法解析或结束早于开始时返回 None
pub fn slot_duration_minutes(time: &str) -> Option<i64> {
    let normalized = normalize_time_key(time);
    let (start, end) = normalized.split_once('-')?;
    let start = NaiveTime::parse_from_str(start, "%H:%M").ok()?;
    let end = NaiveTime::parse_from_str(end, "%H:%M").ok()?;
    let minutes = (end - start).num_minutes();
    (minutes > 0).then_some(minutes)
}

/// 时长换算课时: <=60 分钟 → 1, <=90 分钟 → 1.5, 其余 → 2
pub fn credits_for_duration(duration_minutes: i64) -> f64 {
    if duration_minutes <= 60 {
        1.0
    } else if duration_minutes <= 90 {
        1.5
    } else {
        2.0
    }
}

/// 按 时段 → 教练 分组
///
/// 返回 { "09:00-11:00": { "Jared": [班级A, 班级B] } }
pub fn group_classes_by_time_and_coach(
    classes: &[ClassSession],
) -> BTreeMap<String, BTreeMap<String, Vec<ClassSession>>> {
    let mut groups: BTreeMap<String, BTreeMap<String, Vec<ClassSession>>> = BTreeMap::new();

    for class in classes {
        let time_key = normalize_time_key(&class.time);
        let coach_key = if class.coach.trim().is_empty() {
            UNASSIGNED_COACH.to_string()
        } else {
            class.coach.trim().to_string()
        };

        groups
            .entry(time_key)
            .or_default()
            .entry(coach_key)
            .or_default()
            .push(class.clone());
    }

    groups
}
