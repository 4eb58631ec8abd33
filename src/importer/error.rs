// ==========================================
// 语言学校课时账本 - 学员导入错误类型
// ==========================================
// 行级错误 (主键/数值) 只拒绝该行; 文件级与批次级错误终止导入
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件 =====
    #[error("导入文件不存在: {0}")]
    FileNotFound(String),

    #[error("不支持的导入格式: {0} (学员名单只接受 .csv)")]
    UnsupportedFormat(String),

    #[error("导入文件无法打开: {0}")]
    FileReadError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 行 =====
    #[error("行 {0}: 缺少 student_id")]
    PrimaryKeyMissing(usize),

    #[error("行 {row}: {field} 不是数字 ({message})")]
    TypeConversionError {
        row: usize,
        field: String,
        message: String,
    },

    #[error("行 {row}: {field} 不能为负数或无穷大 ({value})")]
    InvalidHours {
        row: usize,
        field: String,
        value: String,
    },

    // ===== 写入 =====
    /// 批次为单个事务,失败时该批次整体未写入
    #[error("第 {batch} 批写入失败: {source}")]
    BatchWriteError {
        batch: usize,
        #[source]
        source: RepositoryError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

pub type ImportResult<T> = Result<T, ImportError>;
