// ==========================================
// 语言学校课时账本 - 引擎层
// ==========================================
// 职责: 课时扣减、补课券生命周期、考勤批次处理
// 依赖: 仅通过 repository 层访问数据
// ==========================================

pub mod attendance;
pub mod clock;
pub mod error;
pub mod ledger;
pub mod makeup;

// 重导出核心引擎
pub use attendance::{build_session, AttendanceProcessor};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{plan_deduction, plan_fifo_deduction, LedgerEngine, PackagePurchase};
pub use makeup::MakeupLifecycle;
