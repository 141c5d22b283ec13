// ==========================================
// 产线运行引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository错误为调用方可处理的分类
// 分类: Conflict（前置条件冲突）/ Domain（领域规则）/ NotFound / ExternalSyncWarning
// ==========================================

use crate::domain::types::TransitionRejected;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 引擎错误分类
    // ==========================================
    /// 前置条件冲突: 重复开始、重复停止、运行中重置周期、并发修改
    #[error("冲突: {0}")]
    Conflict(String),

    /// 领域规则违反: 重复完成维修、无效休息时段
    #[error("领域规则违反: {0}")]
    Domain(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 外部同步失败（设备 / 通知），只记录日志，不作为用户操作的返回值
    #[error("外部同步失败: {0}")]
    ExternalSyncWarning(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict(_))
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                entity,
                id,
                expected,
                actual,
            } => ApiError::Conflict(format!(
                "{}(id={})已被其他操作修改（期望revision={}，实际revision={}）",
                entity, id, expected, actual
            )),
            RepositoryError::VersionConflict { message } => ApiError::Conflict(message),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::Conflict(format!("唯一约束违反: {}", msg))
            }

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::NotFound(format!("关联记录不存在: {}", msg))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),

            // 业务规则错误
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::Domain(format!("无效的状态转换: from={} to={}", from, to))
            }

            // 数据质量错误
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<TransitionRejected> for ApiError {
    fn from(err: TransitionRejected) -> Self {
        ApiError::Domain(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
