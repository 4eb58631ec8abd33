// ==========================================
// 语言学校课时账本 - 导入层
// ==========================================
// 职责: 外部学员数据批量导入与删除清理
// 支持: CSV
// ==========================================

pub mod error;
pub mod student_importer;

pub use error::{ImportError, ImportResult};
pub use student_importer::{ImportSummary, StudentImporter, SweepSummary};
