// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use docs_kb::gateway::{FileParams, QueryParams, TreeParams};
use docs_kb::utils::logging::{
    format_error, format_info, format_step, format_success, format_warning,
};
use docs_kb::{
    Config, ConcurrentFileFetcher, DocsKbMcp, GitHubClient, HealthCheck, HealthReport, HealthStatus,
    JsonStore, KnowledgeBase, LanceKnowledgeBase, RepoCoordinate, RetrievalGateway, SyncEngine,
    SyncLocks, SyncOptions, SyncReport,
};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "docs_kb")]
#[command(author = "cipher")]
#[command(version)]
#[command(about = "Incrementally synchronized documentation knowledge base for GitHub repositories", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a repository and index all of its documentation
    Ingest {
        /// Repository in owner/repo form
        repository: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(long, value_name = "NUM")]
        concurrency: Option<usize>,
    },

    /// Bring tracked repositories up to date with their remote branch
    Sync {
        /// Repository in owner/repo form; omit with --all
        repository: Option<String>,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(long, conflicts_with = "repository")]
        all: bool,

        /// Report planned changes without fetching or writing
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_name = "NUM")]
        concurrency: Option<usize>,
    },

    /// List tracked repositories
    List,

    /// Search a tracked repository
    Query {
        repository: String,

        /// Query text; required unless --interactive
        text: Option<String>,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(short, long)]
        interactive: bool,
    },

    /// List documentation files of a remote repository
    Tree {
        repository: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,

        #[arg(long)]
        prefix: Option<String>,
    },

    /// Print one file from a remote repository
    Get {
        repository: String,

        path: String,

        #[arg(short, long, default_value = "main")]
        branch: String,
    },

    /// Stop tracking a repository and drop its knowledge base
    Delete {
        repository: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        #[arg(long)]
        yes: bool,
    },

    /// Check GitHub credentials and knowledge base reachability
    Verify,

    /// Start MCP (Model Context Protocol) server on stdio
    Mcp,
}

/// Long-lived collaborators shared by every command.
struct Components {
    github: Arc<GitHubClient>,
    knowledge: Arc<LanceKnowledgeBase>,
    store: Arc<JsonStore>,
    show_progress: bool,
}

impl Components {
    async fn build(config: &Config, show_progress: bool) -> Result<Self> {
        let github = GitHubClient::new(&config.github).context("Failed to create GitHub client")?;
        let knowledge = LanceKnowledgeBase::new(&config.knowledge)
            .await
            .context("Failed to open knowledge base")?;
        let store = JsonStore::new(config.repositories_dir())
            .await
            .context("Failed to open repository store")?;

        Ok(Self {
            github: Arc::new(github),
            knowledge: Arc::new(knowledge),
            store: Arc::new(store),
            show_progress,
        })
    }

    fn engine(&self, config: &Config) -> SyncEngine {
        SyncEngine::new(
            self.github.clone(),
            self.github.clone(),
            self.knowledge.clone(),
            self.store.clone(),
            self.store.clone(),
            SyncLocks::with_lock_dir(config.locks_dir(), config.sync.lock_stale_after()),
            config.sync.clone(),
        )
        .with_progress(self.show_progress)
    }

    fn gateway(&self, config: &Config) -> RetrievalGateway {
        RetrievalGateway::new(
            self.github.clone(),
            ConcurrentFileFetcher::new(self.github.clone(), config.sync.fetch_timeout()),
            self.knowledge.clone(),
            self.store.clone(),
            config.server.clone(),
            &config.sync,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    docs_kb::utils::logging::init_logger(cli.color, cli.verbose);

    info!("Loading configuration from: {}", cli.config.display());

    let config = if cli.config.exists() {
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    // progress bars would interleave with debug logging
    let components = Components::build(&config, !cli.verbose).await?;

    match cli.command {
        Commands::Ingest {
            repository,
            branch,
            concurrency,
        } => {
            let options = SyncOptions {
                dry_run: false,
                max_concurrency: concurrency,
            };
            cmd_ingest(&config, &components, &repository, &branch, options).await?;
        }
        Commands::Sync {
            repository,
            branch,
            all,
            dry_run,
            concurrency,
        } => {
            let options = SyncOptions {
                dry_run,
                max_concurrency: concurrency,
            };
            cmd_sync(&config, &components, repository.as_deref(), &branch, all, options).await?;
        }
        Commands::List => {
            cmd_list(&config, &components).await?;
        }
        Commands::Query {
            repository,
            text,
            branch,
            limit,
            interactive,
        } => {
            cmd_query(
                &config,
                &components,
                &repository,
                &branch,
                text,
                limit,
                interactive,
            )
            .await?;
        }
        Commands::Tree {
            repository,
            branch,
            extensions,
            prefix,
        } => {
            cmd_tree(&config, &components, &repository, &branch, extensions, prefix).await?;
        }
        Commands::Get {
            repository,
            path,
            branch,
        } => {
            cmd_get(&config, &components, &repository, &path, &branch).await?;
        }
        Commands::Delete {
            repository,
            branch,
            yes,
        } => {
            cmd_delete(&config, &components, &repository, &branch, yes).await?;
        }
        Commands::Verify => {
            cmd_verify(&components).await?;
        }
        Commands::Mcp => {
            cmd_mcp(&config, &components).await?;
        }
    }

    Ok(())
}

/// Sets the engine's cancel flag on Ctrl-C; in-flight batches drain first.
fn cancel_on_interrupt(engine: &SyncEngine) {
    let flag = engine.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            flag.store(true, Ordering::SeqCst);
        }
    });
}

fn print_report(report: &SyncReport) {
    let line = report.summary_line();
    if report.is_clean() {
        println!("{}", format_success(&line));
    } else {
        println!("{}", format_warning(&line));
    }

    for failure in &report.failures {
        println!(
            "  {} {} ({}): {}",
            format_error("failed"),
            failure.path,
            failure.kind,
            failure.message
        );
    }

    if !report.cancelled_paths.is_empty() {
        println!(
            "{}",
            format_warning(&format!(
                "{} paths not fetched before cancellation; run sync again to pick them up",
                report.cancelled_paths.len()
            ))
        );
    }
}

async fn cmd_ingest(
    config: &Config,
    components: &Components,
    repository: &str,
    branch: &str,
    options: SyncOptions,
) -> Result<()> {
    let repo = RepoCoordinate::parse(repository)?;
    info!("Starting ingestion of {}@{}", repo, branch);
    let start_time = Instant::now();

    let engine = components.engine(config);
    cancel_on_interrupt(&engine);

    let report = engine
        .ingest(&repo, branch, options)
        .await
        .with_context(|| format!("Ingestion of {}@{} failed", repo, branch))?;

    print_report(&report);
    info!(
        "Ingestion finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}

async fn cmd_sync(
    config: &Config,
    components: &Components,
    repository: Option<&str>,
    branch: &str,
    all: bool,
    options: SyncOptions,
) -> Result<()> {
    let engine = components.engine(config);
    cancel_on_interrupt(&engine);

    let target = repository.filter(|_| !all);
    let Some(repository) = target else {
        let outcomes = engine
            .sync_all(options)
            .await
            .context("Failed to list tracked repositories")?;

        if outcomes.is_empty() {
            println!("{}", format_info("No repositories are tracked yet"));
            return Ok(());
        }

        let mut failed = 0;
        for (index, outcome) in outcomes.iter().enumerate() {
            println!(
                "{}",
                format_step(index + 1, outcomes.len(), &outcome.repository.label())
            );
            match &outcome.result {
                Ok(report) => print_report(report),
                Err(e) => {
                    failed += 1;
                    println!(
                        "{}",
                        format_error(&format!("{}: {}", outcome.repository.label(), e))
                    );
                }
            }
        }

        if failed > 0 {
            return Err(anyhow::anyhow!(
                "{} of {} repositories failed to sync",
                failed,
                outcomes.len()
            ));
        }
        return Ok(());
    };

    let repo = RepoCoordinate::parse(repository)?;
    let report = engine
        .sync(&repo, branch, options)
        .await
        .with_context(|| format!("Sync of {}@{} failed", repo, branch))?;
    print_report(&report);
    Ok(())
}

async fn cmd_list(config: &Config, components: &Components) -> Result<()> {
    let list = components.gateway(config).list_repositories().await?;

    if list.repositories.is_empty() {
        println!("{}", format_info("No repositories are tracked yet"));
        return Ok(());
    }

    for repo in &list.repositories {
        println!(
            "{}@{}  files={}  kb={}  last_sync={}",
            repo.name,
            repo.branch,
            repo.file_count,
            repo.knowledge_base,
            repo.last_synced_at.as_deref().unwrap_or("never")
        );
    }
    println!("{}", format_info(&format!("{} repositories", list.total)));
    Ok(())
}

async fn cmd_query(
    config: &Config,
    components: &Components,
    repository: &str,
    branch: &str,
    text: Option<String>,
    limit: Option<usize>,
    interactive: bool,
) -> Result<()> {
    let gateway = components.gateway(config);

    if let Some(text) = text {
        run_query(&gateway, repository, branch, &text, limit).await?;
    } else if !interactive {
        return Err(anyhow::anyhow!("Provide query text or use --interactive"));
    }

    if !interactive {
        return Ok(());
    }

    println!(
        "{}",
        format_info(&format!(
            "Querying {}@{}; type 'exit' to quit",
            repository, branch
        ))
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_lowercase().as_str(), "exit" | "quit" | "bye") {
            break;
        }

        if let Err(e) = run_query(&gateway, repository, branch, line, limit).await {
            println!("{}", format_error(&e.to_string()));
        }
    }

    Ok(())
}

async fn run_query(
    gateway: &RetrievalGateway,
    repository: &str,
    branch: &str,
    text: &str,
    limit: Option<usize>,
) -> Result<()> {
    let response = gateway
        .query_repository(QueryParams {
            repository: repository.to_string(),
            branch: Some(branch.to_string()),
            query: text.to_string(),
            limit,
        })
        .await?;

    if response.results.is_empty() {
        println!("{}", format_info("No matching documents"));
        return Ok(());
    }

    for (rank, hit) in response.results.iter().enumerate() {
        println!("{}. {}", rank + 1, hit.format_summary(200));
    }
    Ok(())
}

async fn cmd_tree(
    config: &Config,
    components: &Components,
    repository: &str,
    branch: &str,
    extensions: Vec<String>,
    prefix: Option<String>,
) -> Result<()> {
    let tree = components
        .gateway(config)
        .get_repository_tree(TreeParams {
            repository: repository.to_string(),
            branch: Some(branch.to_string()),
            extensions: Some(extensions),
            path_prefix: prefix,
        })
        .await?;

    for file in &tree.files {
        println!("{:>8}  {}", file.size, file.path);
    }
    println!(
        "{}",
        format_info(&format!(
            "{} files matching {}",
            tree.total,
            tree.extensions.join(", ")
        ))
    );
    if tree.truncated {
        println!(
            "{}",
            format_warning("GitHub truncated the listing; some files are missing")
        );
    }
    Ok(())
}

async fn cmd_get(
    config: &Config,
    components: &Components,
    repository: &str,
    path: &str,
    branch: &str,
) -> Result<()> {
    let file = components
        .gateway(config)
        .get_file(FileParams {
            repository: repository.to_string(),
            path: path.to_string(),
            branch: Some(branch.to_string()),
        })
        .await
        .with_context(|| format!("Failed to load {}", path))?;

    println!("{}", file.content);
    Ok(())
}

async fn cmd_delete(
    config: &Config,
    components: &Components,
    repository: &str,
    branch: &str,
    yes: bool,
) -> Result<()> {
    if !yes {
        error!("This removes the repository and its knowledge base. Use --yes to proceed");
        return Ok(());
    }

    let repo = RepoCoordinate::parse(repository)?;
    let deleted = components
        .engine(config)
        .delete(&repo, branch)
        .await
        .with_context(|| format!("Failed to delete {}@{}", repo, branch))?;

    println!(
        "{}",
        format_success(&format!(
            "Deleted {} ({} files, knowledge base {})",
            deleted.label(),
            deleted.file_count,
            deleted.id
        ))
    );
    Ok(())
}

async fn cmd_verify(components: &Components) -> Result<()> {
    let mut checks = Vec::new();

    let started = Instant::now();
    checks.push(match components.github.validate_token().await {
        Ok(login) => {
            info!("GitHub token belongs to {}", login);
            HealthCheck::healthy("github", started.elapsed())
        }
        Err(e) => HealthCheck::degraded("github", e.to_string(), started.elapsed()),
    });

    let started = Instant::now();
    checks.push(match components.knowledge.ping().await {
        Ok(()) => HealthCheck::healthy("knowledge_base", started.elapsed()),
        Err(e) => HealthCheck::unhealthy("knowledge_base", e.to_string(), started.elapsed()),
    });

    let report = HealthReport::new(checks, env!("CARGO_PKG_VERSION").to_string());
    println!("{}", report.format());
    if report.is_healthy() {
        println!("{}", format_success("All checks passed"));
    }

    // a missing token only degrades the report; anonymous GitHub access still works
    if report.overall_status == HealthStatus::Unhealthy {
        return Err(anyhow::anyhow!("Health check failed"));
    }
    Ok(())
}

async fn cmd_mcp(config: &Config, components: &Components) -> Result<()> {
    info!("Starting MCP server (transport: stdio)");

    let server = DocsKbMcp::new(Arc::new(components.gateway(config)));

    info!("MCP server ready. Available tools:");
    for tool in server.get_tool_router().list_all() {
        info!(
            "  - {}: {}",
            tool.name,
            tool.description.as_deref().unwrap_or("No description")
        );
    }

    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("Failed to start MCP stdio transport")?;
    service.waiting().await?;

    Ok(())
}
