//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式完成）。
//! 编排器只做单发请求，不需要流式输出。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// LLM 层错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned empty completion")]
    EmptyCompletion,

    #[error("Structured output parse error: {0}")]
    StructuredParse(String),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
