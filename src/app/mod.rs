// ==========================================
// 语言学校课时账本 - 应用层
// ==========================================
// 职责: 组件装配与进程级共享状态
// ==========================================

pub mod state;
pub mod student_cache;

pub use state::{get_default_db_path, AppState};
pub use student_cache::StudentCache;
