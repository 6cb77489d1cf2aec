//! triage 命令行入口
//!
//! 子命令：
//! - `run`: 跑一次 SRE 调查（复杂计划会先停下来等审批）
//! - `memories`: 查看 / 写入 / 清除长期记忆

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use triage::config::{load_config, AppConfig};
use triage::llm::{LlmClient, MockLlmClient, OpenAiClient};
use triage::memory::{
    ConversationManager, InMemoryStore, MemoryHookProvider, MemoryKind, MemoryStore,
    RegexExtractor, RetrievalLimits, UserPreference,
};
use triage::supervisor::{
    load_supervisor_prompt, InvestigationRequest, MemoryHandles, Supervisor,
};
use triage::workers::{ScriptedWorker, WorkerKind, WorkerRegistry};

#[derive(Parser)]
#[command(name = "triage", version, about = "SRE 调查编排智能体")]
struct Cli {
    /// 额外配置文件（叠加在 config/default.toml 之上）
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 运行一次调查
    Run {
        /// 要调查的问题
        #[arg(long)]
        query: String,
        #[arg(long)]
        user_id: Option<String>,
        /// 会话 ID；缺省自动生成
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        incident_id: Option<String>,
        /// 复杂计划不等审批直接执行
        #[arg(long)]
        auto_approve: bool,
    },
    /// 管理长期记忆
    Memories {
        #[command(subcommand)]
        action: MemoriesAction,
    },
}

#[derive(Subcommand)]
enum MemoriesAction {
    /// 列出记忆，按 actor 分组
    List {
        /// preferences / infrastructure / investigations / conversations；缺省全部
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        actor_id: Option<String>,
    },
    /// 从 TOML 文件写入用户偏好
    Update {
        #[arg(long)]
        actor_id: Option<String>,
        /// 含 [[preferences]] 条目的 TOML 文件
        #[arg(long)]
        file: PathBuf,
    },
    /// 清除记忆；不带 --kind 时必须显式 --all
    Delete {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        actor_id: Option<String>,
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    triage::observability::init();
    let cli = Cli::parse();
    let config = load_config(cli.config_file.clone()).context("加载配置失败")?;

    match cli.command {
        Command::Run {
            query,
            user_id,
            session_id,
            incident_id,
            auto_approve,
        } => {
            run_investigation(&config, query, user_id, session_id, incident_id, auto_approve)
                .await
        }
        Command::Memories { action } => run_memories(&config, action).await,
    }
}

/// 按配置建存储；设置了快照目录时记忆跨进程存活
fn build_store(config: &AppConfig) -> anyhow::Result<Arc<InMemoryStore>> {
    match &config.memory.snapshot_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("创建快照目录失败: {}", dir.display()))?;
            let store = InMemoryStore::with_snapshot(dir.join("memories.json"))
                .context("加载记忆快照失败")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn build_llm(config: &AppConfig) -> Arc<dyn LlmClient> {
    match config.llm.provider.as_str() {
        "mock" => Arc::new(MockLlmClient::new()),
        _ => Arc::new(OpenAiClient::new(
            config.llm.base_url.as_deref(),
            &config.llm.model,
            None,
        )),
    }
}

/// 演示用工作者：真实部署时替换为各领域智能体的客户端
fn demo_registry() -> WorkerRegistry {
    WorkerRegistry::new()
        .register(
            WorkerKind::Kubernetes,
            Arc::new(ScriptedWorker::fixed(
                "checkout-service deployment has 3/5 pods in CrashLoopBackOff; \
                 last restart reason OOMKilled; memory limit 512Mi.",
            )),
        )
        .register(
            WorkerKind::Logs,
            Arc::new(ScriptedWorker::fixed(
                "Error rate spiked at 14:02 UTC: repeated 'java.lang.OutOfMemoryError' \
                 in checkout-service logs, correlated with cart payload growth.",
            )),
        )
        .register(
            WorkerKind::Metrics,
            Arc::new(ScriptedWorker::fixed(
                "checkout-service memory usage climbed from baseline 300Mi to 510Mi \
                 over 30 minutes; p99 latency normal value is 250ms, now 1900ms.",
            )),
        )
        .register(
            WorkerKind::Runbooks,
            Arc::new(ScriptedWorker::fixed(
                "Runbook 'checkout-oom' recommends raising memory limit to 1Gi and \
                 enabling cart payload pagination; escalate to ops@example.com if \
                 the spike persists after rollout.",
            )),
        )
}

async fn run_investigation(
    config: &AppConfig,
    query: String,
    user_id: Option<String>,
    session_id: Option<String>,
    incident_id: Option<String>,
    auto_approve: bool,
) -> anyhow::Result<()> {
    let user_id = user_id.unwrap_or_else(|| config.app.default_user_id.clone());
    let session_id =
        session_id.unwrap_or_else(|| format!("cli-{}", chrono::Utc::now().timestamp()));

    let llm = build_llm(config);
    let prompt = load_supervisor_prompt(&config.supervisor.prompt_path);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("收到 Ctrl-C，中止调查");
                shutdown.cancel();
            }
        });
    }

    let mut supervisor =
        Supervisor::new(llm, prompt, demo_registry()).with_shutdown(shutdown.clone());
    if config.memory.enabled {
        let store = build_store(config)?;
        supervisor = supervisor.with_memory(MemoryHandles {
            hooks: MemoryHookProvider::new(
                store.clone(),
                Arc::new(RegexExtractor::new()),
                RetrievalLimits {
                    max_preferences: config.memory.max_preferences,
                    max_knowledge: config.memory.max_knowledge,
                    max_investigations: config.memory.max_investigations,
                },
            ),
            conversation: ConversationManager::new(store),
        });
    }

    let mut request = InvestigationRequest::new(query, user_id, session_id);
    request.incident_id = incident_id;
    request.auto_approve_plan = auto_approve || config.supervisor.auto_approve_plan;

    let mut state = supervisor.investigate(request).await?;

    if let Some(response) = &state.final_response {
        println!("{}", response);
    }

    // 复杂计划挂起：终端里问一次是否放行
    if state.metadata.plan_pending_approval {
        print!("\nProceed with this plan? [y/N] ");
        std::io::stdout().flush().ok();
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer).ok();
        if answer.trim().eq_ignore_ascii_case("y") {
            supervisor.resume(&mut state).await?;
            if let Some(response) = &state.final_response {
                println!("{}", response);
            }
        } else {
            println!("Investigation plan discarded.");
        }
    }
    Ok(())
}

fn parse_kind(s: &str) -> anyhow::Result<MemoryKind> {
    MemoryKind::parse(s).with_context(|| {
        format!(
            "未知记忆类别 '{}'，可选: preferences / infrastructure / investigations / conversations",
            s
        )
    })
}

#[derive(serde::Deserialize)]
struct PreferenceEntry {
    preference_type: String,
    preference_value: serde_json::Value,
    #[serde(default)]
    context: Option<String>,
}

#[derive(serde::Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    preferences: Vec<PreferenceEntry>,
}

async fn run_memories(config: &AppConfig, action: MemoriesAction) -> anyhow::Result<()> {
    let store = build_store(config)?;

    match action {
        MemoriesAction::List { kind, actor_id } => {
            let kinds: Vec<MemoryKind> = match kind {
                Some(name) => vec![parse_kind(&name)?],
                None => vec![
                    MemoryKind::Preferences,
                    MemoryKind::Infrastructure,
                    MemoryKind::Investigations,
                    MemoryKind::Conversations,
                ],
            };
            for kind in kinds {
                let records = store.list_events(kind, actor_id.as_deref()).await?;
                println!("== {} ({} records)", kind.as_str(), records.len());
                // 按 actor 分组展示
                let mut by_actor: std::collections::BTreeMap<String, Vec<&serde_json::Value>> =
                    std::collections::BTreeMap::new();
                for record in &records {
                    let actor = kind
                        .actor_from_namespace(&record.namespace)
                        .unwrap_or_else(|| "unknown".to_string());
                    by_actor.entry(actor).or_default().push(&record.payload);
                }
                for (actor, payloads) in by_actor {
                    println!("  actor: {}", actor);
                    for payload in payloads {
                        println!("    {}", payload);
                    }
                }
            }
        }
        MemoriesAction::Update { actor_id, file } => {
            let actor = actor_id.unwrap_or_else(|| config.app.default_user_id.clone());
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("读取偏好文件失败: {}", file.display()))?;
            let parsed: PreferencesFile =
                toml::from_str(&text).context("偏好文件不是合法 TOML")?;
            anyhow::ensure!(
                !parsed.preferences.is_empty(),
                "偏好文件没有 [[preferences]] 条目"
            );
            for entry in parsed.preferences {
                let preference = UserPreference {
                    user_id: actor.clone(),
                    preference_type: entry.preference_type,
                    preference_value: entry.preference_value,
                    context: entry.context,
                    timestamp: chrono::Utc::now(),
                };
                store
                    .save_event(
                        MemoryKind::Preferences,
                        &actor,
                        serde_json::to_value(&preference)?,
                        "manual-update",
                    )
                    .await?;
                println!("Saved preference '{}' for {}", preference.preference_type, actor);
            }
        }
        MemoriesAction::Delete {
            kind,
            actor_id,
            all,
        } => {
            let kinds: Vec<MemoryKind> = match kind {
                Some(name) => vec![parse_kind(&name)?],
                None => {
                    anyhow::ensure!(all, "不带 --kind 的删除必须显式传 --all");
                    vec![
                        MemoryKind::Preferences,
                        MemoryKind::Infrastructure,
                        MemoryKind::Investigations,
                        MemoryKind::Conversations,
                    ]
                }
            };
            for kind in kinds {
                let removed = store.clear(kind, actor_id.as_deref()).await?;
                println!("Cleared {} records from {}", removed, kind.as_str());
            }
        }
    }
    Ok(())
}
