// ==========================================
// 语言学校课时账本 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 并发: 以“单个学员”为原子单位,同一学员的写入串行化
// ==========================================

pub mod attendance_log_repo;
pub mod balance_store;
pub mod error;
pub mod makeup_repo;
pub mod package_repo;
pub mod schedule_repo;
pub mod sql_time;
pub mod student_repo;

// 重导出核心仓储
pub use attendance_log_repo::{AttendanceLogRepository, AttendanceSink};
pub use balance_store::{BalanceStore, BalanceUpdate};
pub use error::{RepositoryError, RepositoryResult};
pub use makeup_repo::MakeupCreditRepository;
pub use package_repo::PackageRepository;
pub use schedule_repo::{EnrollmentBackfillReport, ScheduleRepository, ScheduleSource};
pub use student_repo::StudentRepository;
