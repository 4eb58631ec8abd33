// ==========================================
// 语言学校课时账本 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、纯业务计算
// 红线: 不含数据访问逻辑
// ==========================================

pub mod attendance;
pub mod makeup;
pub mod package;
pub mod schedule;
pub mod student;
pub mod types;

// 重导出核心类型
pub use attendance::{
    AttendanceLog, AttendanceMark, AttendanceSession, ClassAttendance, SessionSummary,
    SkippedStudent, StudentAttendance,
};
pub use makeup::{AssignedClass, MakeupCredit, DEFAULT_MAKEUP_VALIDITY_DAYS};
pub use package::{CreditPackage, FifoDeduction, PackageTake};
pub use schedule::{ClassSession, RosterEntry, WaitlistEntry};
pub use student::{BalanceDelta, StudentBalance, StudentSnapshot};
pub use types::{
    AttendanceStatus, MakeupStatus, MembershipStatus, ScholarshipTier, StudentStatus,
};
