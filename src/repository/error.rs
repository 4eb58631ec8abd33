// ==========================================
// 语言学校课时账本 - 仓储层错误类型
// ==========================================
// 约束冲突按 SQLite 扩展错误码区分,不解析错误文本
// BUSY / LOCKED 归为事务失败,由调用方决定是否重试
// ==========================================

use rusqlite::ffi;
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{entity} 不存在: {id}")]
    NotFound { entity: String, id: String },

    #[error("共享连接锁不可用: {0}")]
    LockError(String),

    #[error("账本事务未完成: {0}")]
    DatabaseTransactionError(String),

    #[error("账本查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("记录重复: {0}")]
    UniqueConstraintViolation(String),

    /// 关联学员/班级不存在
    #[error("关联记录缺失: {0}")]
    ForeignKeyViolation(String),

    #[error("写入被拒绝: {0}")]
    ValidationError(String),

    #[error("{field} 取值非法: {message}")]
    FieldValueError { field: String, message: String },

    #[error("存储内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        RepositoryError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        RepositoryError::FieldValueError {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// 锁中毒统一转换
    pub fn lock<E: std::fmt::Display>(err: E) -> Self {
        RepositoryError::LockError(err.to_string())
    }
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        let rusqlite::Error::SqliteFailure(ref failure, ref msg) = err else {
            return match err {
                rusqlite::Error::QueryReturnedNoRows => RepositoryError::not_found("row", "-"),
                other => RepositoryError::DatabaseQueryError(other.to_string()),
            };
        };
        let detail = msg.clone().unwrap_or_else(|| failure.to_string());

        match failure.code {
            ErrorCode::ConstraintViolation => match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    RepositoryError::UniqueConstraintViolation(detail)
                }
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RepositoryError::ForeignKeyViolation(detail),
                _ => RepositoryError::ValidationError(detail),
            },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                RepositoryError::DatabaseTransactionError(detail)
            }
            _ => RepositoryError::DatabaseQueryError(detail),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::InternalError(format!("审计载荷序列化失败: {}", err))
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
