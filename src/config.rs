//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRIAGE__*` 覆盖（双下划线表示嵌套，
//! 如 `TRIAGE__LLM__PROVIDER=openai`、`TRIAGE__MEMORY__ENABLED=false`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub supervisor: SupervisorSection,
}

/// [app] 段：应用名与默认身份
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 未指定 --user-id 时的默认用户
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_user_id: default_user_id(),
        }
    }
}

fn default_user_id() -> String {
    "default-sre-user".to_string()
}

/// [llm] 段：后端选择、模型与端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；有 OPENAI_API_KEY 时默认 openai
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点（自建代理 / 网关），未设置时用官方端点
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

/// [memory] 段：记忆系统开关、快照目录与检索上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    #[serde(default = "default_memory_enabled")]
    pub enabled: bool,
    /// 快照文件目录；未设置时记忆仅存于进程内
    pub snapshot_dir: Option<PathBuf>,
    /// 计划阶段检索的用户偏好上限
    #[serde(default = "default_max_preferences")]
    pub max_preferences: usize,
    /// 计划阶段检索的基础设施知识上限（跨全部工作者）
    #[serde(default = "default_max_knowledge")]
    pub max_knowledge: usize,
    /// 计划阶段检索的历史调查摘要上限
    #[serde(default = "default_max_investigations")]
    pub max_investigations: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            enabled: default_memory_enabled(),
            snapshot_dir: None,
            max_preferences: default_max_preferences(),
            max_knowledge: default_max_knowledge(),
            max_investigations: default_max_investigations(),
        }
    }
}

fn default_memory_enabled() -> bool {
    true
}

fn default_max_preferences() -> usize {
    5
}

fn default_max_knowledge() -> usize {
    50
}

fn default_max_investigations() -> usize {
    5
}

/// [supervisor] 段：计划审批与提示词
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorSection {
    /// 复杂计划是否跳过人工审批直接执行
    #[serde(default)]
    pub auto_approve_plan: bool,
    /// 系统提示词文件；不存在时用内置默认
    #[serde(default = "default_prompt_path")]
    pub prompt_path: PathBuf,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            auto_approve_plan: false,
            prompt_path: default_prompt_path(),
        }
    }
}

fn default_prompt_path() -> PathBuf {
    PathBuf::from("config/prompts/supervisor.txt")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            memory: MemorySection::default(),
            supervisor: SupervisorSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TRIAGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRIAGE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRIAGE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.memory.enabled);
        assert_eq!(cfg.memory.max_preferences, 5);
        assert_eq!(cfg.memory.max_knowledge, 50);
        assert!(!cfg.supervisor.auto_approve_plan);
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
    }

    #[test]
    fn test_missing_llm_section_gets_defaults() {
        let cfg: AppConfig = toml::from_str("[memory]\nenabled = false\n").unwrap();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4o-mini");
        assert!(cfg.llm.base_url.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.toml");
        std::fs::write(
            &path,
            "[llm]\nprovider = \"mock\"\n\n[memory]\nenabled = false\nmax_preferences = 3\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert!(!cfg.memory.enabled);
        assert_eq!(cfg.memory.max_preferences, 3);
        // 未覆盖的键保持默认
        assert_eq!(cfg.memory.max_knowledge, 50);
    }
}
