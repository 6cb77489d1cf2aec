//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 支持脚本化回复队列：每次 complete 依次出队；队列空时回显最后一条 User 消息。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// Mock 客户端：脚本化回复，耗尽后回显用户输入
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一串回复，按 complete 调用顺序出队
    pub fn scripted(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::memory::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("Echo from Mock: {}", last_user))
    }
}
