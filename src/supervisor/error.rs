//! 编排器错误类型
//!
//! 可恢复错误（协作方超时、抽取落空）在组件边界被记日志吞掉；
//! 这里只保留必须上抛给调用方的结构性/前置条件错误。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::MemoryError;

/// 调查编排过程中上抛的错误
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// 记忆启用时 session_id 缺失是硬性前置条件失败：宁可失败也不能串错命名空间
    #[error("session_id is required for memory operations but was empty")]
    MissingSessionId,

    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("No worker registered for '{0}'")]
    WorkerNotRegistered(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// 收到关闭信号，调查被放弃（不写摘要，已完成步骤的写入不回滚）
    #[error("Investigation cancelled by shutdown signal")]
    Cancelled,
}
