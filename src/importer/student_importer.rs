// ==========================================
// 语言学校课时账本 - 学员 CSV 导入 / 删除清理
// ==========================================
// 流程: CSV 解析 → 行清洗 → 分批 upsert (每批 <= 450,单事务)
// 删除清理同样分批,补课券/课时包随外键级联删除
// 约定: 行级错误只拒绝该行,批次级错误中止导入 (已提交批次保留)
// ==========================================

use crate::config::LedgerConfig;
use crate::domain::{MembershipStatus, StudentBalance, StudentStatus};
use crate::engine::Clock;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::StudentRepository;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// CSV 原始行 (表头名即字段名,全部按字符串读入后再清洗)
#[derive(Debug, Default, Deserialize)]
struct RawStudentRow {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    student_name: Option<String>,
    #[serde(default)]
    member_status: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total_hours: Option<String>,
    #[serde(default)]
    credits: Option<String>,
    #[serde(default)]
    used_hours: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// 数据行总数 (不含表头)
    pub total_rows: usize,
    pub imported: usize,
    /// 姓名为空或只有一个字符的行,静默忽略
    pub skipped_blank: usize,
    /// 被拒绝的行及原因
    pub rejected: Vec<String>,
    pub batches: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub requested: usize,
    pub deleted: usize,
    pub batches: usize,
}

/// 数字清洗: 去掉千分位逗号与空白,空值返回 None
fn clean_number(row: usize, field: &str, raw: Option<&str>) -> ImportResult<Option<f64>> {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Ok(None);
    }
    let value = cleaned
        .parse::<f64>()
        .map_err(|e| ImportError::TypeConversionError {
            row,
            field: field.to_string(),
            message: format!("{}: {}", cleaned, e),
        })?;
    if !value.is_finite() || value < 0.0 {
        return Err(ImportError::InvalidHours {
            row,
            field: field.to_string(),
            value: cleaned,
        });
    }
    Ok(Some(value))
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub struct StudentImporter {
    students: Arc<StudentRepository>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
}

impl StudentImporter {
    pub fn new(students: Arc<StudentRepository>, clock: Arc<dyn Clock>, batch_size: usize) -> Self {
        Self {
            students,
            clock,
            batch_size: LedgerConfig::clamp_batch_size(batch_size),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 从 .csv 文件导入
    pub fn import_file(&self, path: &Path) -> ImportResult<ImportSummary> {
        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(path).map_err(|e| ImportError::FileReadError(e.to_string()))?;
        self.import_reader(file)
    }

    /// 从任意 CSV 输入导入
    pub fn import_reader<R: Read>(&self, input: R) -> ImportResult<ImportSummary> {
        let mut summary = ImportSummary::default();
        let students = self.parse_rows(input, &mut summary)?;

        for (idx, chunk) in students.chunks(self.batch_size).enumerate() {
            let written = self
                .students
                .upsert_batch(chunk)
                .map_err(|source| ImportError::BatchWriteError {
                    batch: idx + 1,
                    source,
                })?;
            summary.imported += written;
            summary.batches += 1;
        }

        info!(
            total_rows = summary.total_rows,
            imported = summary.imported,
            rejected = summary.rejected.len(),
            skipped_blank = summary.skipped_blank,
            batches = summary.batches,
            "学员导入完成"
        );
        Ok(summary)
    }

    fn parse_rows<R: Read>(
        &self,
        input: R,
        summary: &mut ImportSummary,
    ) -> ImportResult<Vec<StudentBalance>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(input);

        let now = self.clock.now();
        let mut students = Vec::new();

        for (idx, result) in reader.deserialize::<RawStudentRow>().enumerate() {
            // 行号从 2 开始 (第 1 行是表头)
            let row_no = idx + 2;
            summary.total_rows += 1;

            let raw = match result {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(row = row_no, error = %e, "CSV 行解析失败");
                    summary.rejected.push(format!("行 {}: {}", row_no, e));
                    continue;
                }
            };

            match self.row_to_student(row_no, raw, now) {
                Ok(Some(student)) => students.push(student),
                Ok(None) => summary.skipped_blank += 1,
                Err(e) => {
                    warn!(row = row_no, error = %e, "学员行被拒绝");
                    summary.rejected.push(e.to_string());
                }
            }
        }

        Ok(students)
    }

    fn row_to_student(
        &self,
        row: usize,
        raw: RawStudentRow,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ImportResult<Option<StudentBalance>> {
        let name = match non_empty(raw.student_name) {
            Some(name) if name.chars().count() > 1 => name,
            _ => return Ok(None),
        };
        let student_id = non_empty(raw.student_id).ok_or(ImportError::PrimaryKeyMissing(row))?;

        let total_hours = clean_number(row, "total_hours", raw.total_hours.as_deref())?.unwrap_or(0.0);
        let credits = clean_number(row, "credits", raw.credits.as_deref())?;
        let used_hours = clean_number(row, "used_hours", raw.used_hours.as_deref())?;

        let mut student = StudentBalance::new_enrollment(student_id, name, total_hours, now);
        // 历史数据可直接带入剩余/已用课时
        if let Some(credits) = credits {
            student.credits = credits;
        }
        if let Some(used) = used_hours {
            student.used_hours = used;
        }
        student.membership = raw
            .member_status
            .as_deref()
            .map(MembershipStatus::from_code)
            .unwrap_or(MembershipStatus::Member);
        student.status = raw
            .status
            .as_deref()
            .and_then(|s| StudentStatus::from_code(s.trim()))
            .unwrap_or(StudentStatus::New);

        Ok(Some(student))
    }

    /// 分批删除指定学员
    pub fn delete_sweep(&self, student_ids: &[String]) -> ImportResult<SweepSummary> {
        let mut summary = SweepSummary {
            requested: student_ids.len(),
            ..SweepSummary::default()
        };

        for (idx, chunk) in student_ids.chunks(self.batch_size).enumerate() {
            let deleted = self
                .students
                .delete_batch(chunk)
                .map_err(|source| ImportError::BatchWriteError {
                    batch: idx + 1,
                    source,
                })?;
            summary.deleted += deleted;
            summary.batches += 1;
        }

        info!(
            requested = summary.requested,
            deleted = summary.deleted,
            batches = summary.batches,
            "学员删除清理完成"
        );
        Ok(summary)
    }

    /// 清空全部学员 (重新导入前使用)
    pub fn purge_all(&self) -> ImportResult<SweepSummary> {
        let ids = self.students.list_ids()?;
        self.delete_sweep(&ids)
    }
}
