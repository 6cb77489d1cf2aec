//! 结构化输出：从 LLM 文本中提取 JSON 并反序列化为值对象
//!
//! LLM 被要求返回 JSON（计划 / 路由决策）；实际输出常夹带 ```json 围栏或说明文字，
//! 这里先定位 JSON 块（围栏优先，否则首个 `{` 到末个 `}`），再交给 serde。

use serde::de::DeserializeOwned;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 从文本中提取 JSON 块并解析为 T
pub fn parse_structured<T: DeserializeOwned>(output: &str) -> Result<T, LlmError> {
    let trimmed = output.trim();

    // 尝试提取 JSON 块（```json ... ``` 或纯 JSON）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        match trimmed.rfind('}') {
            Some(end) => &trimmed[start..=end],
            None => trimmed,
        }
    } else {
        trimmed
    };

    serde_json::from_str(json_str)
        .map_err(|e| LlmError::StructuredParse(format!("{}: {}", e, json_str)))
}

/// 请求一次结构化完成：发送消息并把回复解析为 T
pub async fn complete_structured<T: DeserializeOwned>(
    llm: &dyn LlmClient,
    messages: &[Message],
) -> Result<T, LlmError> {
    let output = llm.complete(messages).await?;
    parse_structured(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Decision {
        next: String,
    }

    #[test]
    fn test_plain_json() {
        let d: Decision = parse_structured(r#"{"next": "logs_agent"}"#).unwrap();
        assert_eq!(d.next, "logs_agent");
    }

    #[test]
    fn test_fenced_json() {
        let text = "Here is the decision:\n```json\n{\"next\": \"FINISH\"}\n```\nDone.";
        let d: Decision = parse_structured(text).unwrap();
        assert_eq!(d.next, "FINISH");
    }

    #[test]
    fn test_embedded_json() {
        let text = "reasoning first {\"next\": \"metrics_agent\"} trailing";
        let d: Decision = parse_structured(text).unwrap();
        assert_eq!(d.next, "metrics_agent");
    }

    #[test]
    fn test_garbage_is_error() {
        let err = parse_structured::<Decision>("no json here").unwrap_err();
        assert!(matches!(err, LlmError::StructuredParse(_)));
    }
}
