//! Triage - Rust SRE 调查编排智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、结构化输出解析
//! - **memory**: 记忆模型、存储抽象、调查钩子与正则抽取、对话记录
//! - **workers**: 固定枚举的领域工作者（K8s / 日志 / 指标 / 手册）
//! - **supervisor**: 计划构建、路由状态机、结果聚合与主控循环
//! - **observability**: tracing 初始化

pub mod config;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod supervisor;
pub mod workers;
