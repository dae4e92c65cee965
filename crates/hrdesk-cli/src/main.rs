use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hrdesk_core::{
    CallOptions, DeskError, KnowledgeBaseClient, LlmProvider, OpenAiProvider, Query, RoutedAnswer,
    Router, Settings, Specialization, Turn,
};

mod config;

use config::{HrdeskConfig, LlmProviderKind, Overrides};

const DEMO_QUERIES: &[&str] = &[
    "What's the difference between Northwind Health Plus and Standard plans?",
    "What is the company's policy on remote work?",
    "What wellness benefits does the company offer?",
    "How much vacation time do senior employees get?",
    "What's the deductible for the health insurance?",
];

#[derive(Parser)]
#[command(name = "hrdesk")]
#[command(version)]
#[command(about = "Routes HR questions to benefits, policy and perks specialists")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Knowledge base variant (base, with-sharepoint, with-web, with-web-and-sharepoint)
    #[arg(long, global = true)]
    kb: Option<String>,

    /// Retrieval mode (agentic, semantic)
    #[arg(long, global = true)]
    mode: Option<String>,

    /// Reasoning effort for agentic retrieval (low, medium, high)
    #[arg(long, global = true)]
    effort: Option<String>,

    /// Per-call timeout in seconds, overriding [query] timeout_secs
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,
    },

    /// Interactive session; type quit, exit or q to leave
    Chat {
        /// Print the routing decision before each answer
        #[arg(long)]
        show_routing: bool,
    },

    /// Run the sample questions
    Demo {
        /// Seconds to wait between questions
        #[arg(long, default_value_t = 2)]
        pause: u64,
    },

    /// Resolve the configuration and check endpoints without querying
    Validate,

    /// List the specialist agents
    Agents,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let flags = Overrides {
        variant: cli.kb.clone(),
        mode: cli.mode.clone(),
        reasoning_effort: cli.effort.clone(),
    };

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Agents => cmd_agents(),
        Commands::Config => cmd_config(&cli.config, &flags),
        Commands::Validate => cmd_validate(&cli.config, &flags),
        Commands::Ask { question } => cmd_ask(&cli.config, &flags, cli.timeout, &question).await,
        Commands::Chat { show_routing } => {
            cmd_chat(&cli.config, &flags, cli.timeout, show_routing).await
        }
        Commands::Demo { pause } => cmd_demo(&cli.config, &flags, cli.timeout, pause).await,
    }
}

fn load_config(config_path: &Option<PathBuf>, flags: &Overrides) -> Result<HrdeskConfig> {
    let mut cfg = HrdeskConfig::load(config_path)?;
    cfg.apply_overrides(&Overrides::from_env(), flags);
    Ok(cfg)
}

struct Session {
    router: Router,
    timeout: Duration,
    max_history_turns: usize,
}

fn build_session(cfg: &HrdeskConfig, timeout_override: Option<u64>) -> Result<Session> {
    let settings = Arc::new(Settings::resolve(&cfg.to_settings_request()?)?);
    let router_config = cfg.router_config()?;

    if let Some(problem) = cfg.endpoint_problems().into_iter().next() {
        bail!("{}. Run `hrdesk validate` for details.", problem);
    }

    let retriever = KnowledgeBaseClient::new(
        &cfg.knowledge.endpoint,
        Some(cfg.knowledge.api_key.clone()),
    )?
    .with_api_version(cfg.knowledge.api_version.clone());

    let llm = build_llm(cfg)?;
    info!(
        "Using {} model {} with knowledge base {}",
        llm.provider_name(),
        llm.model(),
        settings.sources.knowledge_base
    );

    let router = Router::new(settings, Arc::new(retriever), llm, router_config)?;
    let timeout = timeout_override
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| cfg.query_timeout());

    Ok(Session {
        router,
        timeout,
        max_history_turns: cfg.query.max_history_turns,
    })
}

fn build_llm(cfg: &HrdeskConfig) -> Result<Arc<dyn LlmProvider>> {
    let llm = &cfg.llm;
    let provider = OpenAiProvider::new(
        llm.api_key.clone(),
        llm.effective_model(),
        llm.effective_endpoint(),
        llm.max_tokens,
        Duration::from_secs(llm.timeout_secs.max(1)),
    )?;
    let provider = match llm.provider {
        LlmProviderKind::OpenAi => provider,
        LlmProviderKind::AzureOpenAi => provider.with_azure(llm.api_version.clone()),
    };
    Ok(Arc::new(provider))
}

/// Run one query; Ctrl-C cancels it without ending the process
async fn run_query(session: &Session, query: &Query) -> Result<RoutedAnswer, DeskError> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let opts = CallOptions::new(session.timeout).with_cancel(cancel);
    let result = session.router.handle(query, &opts).await;
    watcher.abort();
    result
}

fn print_routing(routed: &RoutedAnswer) {
    let d = &routed.decision;
    println!(
        "→ {} ({}, confidence {:.2}): {}",
        routed.answer.specialization, d.method, d.confidence, d.rationale
    );
}

fn print_answer(routed: &RoutedAnswer) {
    println!("\n{}", routed.answer.text);
    if !routed.answer.citations.is_empty() {
        println!("\nSources:");
        for c in &routed.answer.citations {
            println!("  - {} ({})", c.source_id, c.origin);
        }
    }
}

fn describe_error(err: &DeskError) -> String {
    match err {
        DeskError::RoutingAmbiguous { .. } => {
            format!("{}\nTry rephrasing the question to mention the topic.", err)
        }
        e if e.is_retryable() => format!("{}\nThe service may be busy; try again.", e),
        e => e.to_string(),
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("hrdesk initialized at {}", config_dir.display());
    println!(
        "Edit {} or set AZURE_SEARCH_ENDPOINT / AZURE_OPENAI_ENDPOINT to point at your services.",
        config_path.display()
    );
    Ok(())
}

fn cmd_agents() -> Result<()> {
    for s in Specialization::ALL {
        let descriptor = hrdesk_core::AgentDescriptor::builtin(s);
        println!("{:<10} {:<14} {}", s.id(), descriptor.name, descriptor.description);
    }
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>, flags: &Overrides) -> Result<()> {
    let cfg = load_config(config_path, flags)?;
    println!("{}", toml::to_string_pretty(&cfg.masked())?);
    Ok(())
}

fn cmd_validate(config_path: &Option<PathBuf>, flags: &Overrides) -> Result<()> {
    let cfg = load_config(config_path, flags)?;
    let mut failures = 0;

    match cfg
        .to_settings_request()
        .and_then(|request| Settings::resolve(&request))
    {
        Ok(settings) => {
            println!("✓ Knowledge base: {} ({})", settings.sources.knowledge_base, settings.sources.variant);
            println!("  {}", settings.sources.description);
            let sources: Vec<String> = settings.sources.sources.iter().map(|s| s.to_string()).collect();
            println!("  Sources: {}", sources.join(", "));
            match settings.retrieval.reasoning_effort {
                Some(effort) => println!(
                    "✓ Retrieval: {} (reasoning effort {}), top_k {}",
                    settings.retrieval.mode, effort, settings.retrieval.top_k
                ),
                None => println!(
                    "✓ Retrieval: {}, top_k {}",
                    settings.retrieval.mode, settings.retrieval.top_k
                ),
            }
        }
        Err(e) => {
            println!("✗ {}", e);
            failures += 1;
        }
    }

    match cfg.router_config() {
        Ok(router) => println!(
            "✓ Router: {:?} classifier, threshold {:.2}, {:?} when ambiguous",
            router.classifier, router.threshold, router.on_ambiguous
        ),
        Err(e) => {
            println!("✗ {:#}", e);
            failures += 1;
        }
    }

    for problem in cfg.endpoint_problems() {
        println!("✗ {}", problem);
        failures += 1;
    }

    if failures > 0 {
        bail!("{} configuration problem(s) found", failures);
    }
    println!("Configuration OK.");
    Ok(())
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    flags: &Overrides,
    timeout: Option<u64>,
    question: &str,
) -> Result<()> {
    let cfg = load_config(config_path, flags)?;
    let session = build_session(&cfg, timeout)?;

    let query = Query::new(question)?;
    match run_query(&session, &query).await {
        Ok(routed) => {
            print_routing(&routed);
            print_answer(&routed);
            Ok(())
        }
        Err(e) => bail!("{}", describe_error(&e)),
    }
}

async fn cmd_chat(
    config_path: &Option<PathBuf>,
    flags: &Overrides,
    timeout: Option<u64>,
    show_routing: bool,
) -> Result<()> {
    let cfg = load_config(config_path, flags)?;
    let session = build_session(&cfg, timeout)?;

    println!("HR Assistant. Ask about benefits, policies or perks (quit, exit or q to leave).");
    let mut history: Vec<Turn> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        if input.is_empty() {
            continue;
        }

        let query = Query::new(input)?.with_history(history.clone());
        match run_query(&session, &query).await {
            Ok(routed) => {
                if show_routing {
                    print_routing(&routed);
                }
                print_answer(&routed);
                history.push(Turn {
                    query: query.text().to_string(),
                    response: routed.answer.text.clone(),
                });
                if history.len() > session.max_history_turns {
                    let excess = history.len() - session.max_history_turns;
                    history.drain(..excess);
                }
            }
            Err(e) => println!("\nError: {}", describe_error(&e)),
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn cmd_demo(
    config_path: &Option<PathBuf>,
    flags: &Overrides,
    timeout: Option<u64>,
    pause: u64,
) -> Result<()> {
    let cfg = load_config(config_path, flags)?;
    let session = build_session(&cfg, timeout)?;

    println!("Using knowledge base variant: {}", cfg.knowledge.variant);
    let mut failures = 0;
    for (i, text) in DEMO_QUERIES.iter().enumerate() {
        println!("\n[{}/{}] {}", i + 1, DEMO_QUERIES.len(), text);
        let query = Query::new(*text)?;
        match run_query(&session, &query).await {
            Ok(routed) => {
                print_routing(&routed);
                print_answer(&routed);
            }
            Err(e) => {
                failures += 1;
                println!("\nError: {}", describe_error(&e));
            }
        }
        if i + 1 < DEMO_QUERIES.len() && pause > 0 {
            tokio::time::sleep(Duration::from_secs(pause)).await;
        }
    }

    if failures > 0 {
        bail!("{} of {} demo queries failed", failures, DEMO_QUERIES.len());
    }
    println!("\nDemo complete.");
    Ok(())
}
