// ==========================================
// 语言学校课时账本 - 核心库
// ==========================================
// 范围: 课时扣减、课时包 FIFO、补课券生命周期、考勤批次处理
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 导入层 - 外部数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施 (连接初始化/PRAGMA 统一)
pub mod db;

// 日志系统
pub mod logging;

// 建议层 - 只读协作者
pub mod advisory;

// 应用层 - 组件装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AttendanceStatus, MakeupStatus, MembershipStatus, ScholarshipTier, StudentStatus,
};

// 领域实体
pub use domain::{
    AssignedClass, AttendanceSession, BalanceDelta, ClassAttendance, ClassSession, CreditPackage,
    FifoDeduction, MakeupCredit, RosterEntry, SessionSummary, StudentBalance, StudentSnapshot,
};

// 引擎
pub use engine::{
    AttendanceProcessor, Clock, FixedClock, LedgerEngine, LedgerError, LedgerResult,
    MakeupLifecycle, SystemClock,
};

// 应用
pub use app::{AppState, StudentCache};

// ==========================================
// 系统常量
// ==========================================

/// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 系统名称
pub const APP_NAME: &str = "语言学校课时账本";
