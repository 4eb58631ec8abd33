// ==========================================
// 语言学校课时账本 - 引擎层错误类型
// ==========================================
// 职责: 账本/补课券操作的错误分类,调用方据此决定跳过或上报
// 红线: 引擎层不吞错误; 只有考勤批处理把单个学员的错误降级为跳过
// ==========================================

use crate::repository::error::RepositoryError;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// 学员/班级不存在
    #[error("记录未找到: {entity}(id={id})")]
    NotFound { entity: String, id: String },

    /// 参数非法 (负数扣减、班级信息缺失等),在任何写入之前拒绝
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// FIFO 扣减时学员没有任何有余量的课时包
    #[error("学员 {student_id} 没有可扣减的课时包")]
    NoActiveCredit { student_id: String },

    /// 补课券已不在当前集合中 (并发删除或引用过期)
    #[error("补课券不存在: student={student_id}, ticket={ticket_id}")]
    TicketNotFound { student_id: String, ticket_id: String },

    /// 补课券已过期,不可安排/核销
    #[error("补课券已过期: ticket={ticket_id}, expiry={expiry}")]
    TicketExpired {
        ticket_id: String,
        expiry: DateTime<Utc>,
    },

    /// 状态机不允许的转换
    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    /// 存储暂时不可用,不在账本层重试
    #[error("存储不可用: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    pub fn ticket_not_found(student_id: &str, ticket_id: &str) -> Self {
        LedgerError::TicketNotFound {
            student_id: student_id.to_string(),
            ticket_id: ticket_id.to_string(),
        }
    }

    /// 是否属于“记录不存在”类错误
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound { .. } | LedgerError::TicketNotFound { .. }
        )
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for LedgerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            RepositoryError::ValidationError(msg) => LedgerError::InvalidArgument(msg),
            RepositoryError::FieldValueError { field, message } => {
                LedgerError::InvalidArgument(format!("{}: {}", field, message))
            }
            RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => LedgerError::InvalidArgument(msg),
            RepositoryError::LockError(msg)
            | RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::InternalError(msg) => LedgerError::StoreUnavailable(msg),
            RepositoryError::Other(e) => LedgerError::StoreUnavailable(e.to_string()),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
