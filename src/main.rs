//! `sift` command-line interface.
//!
//! ```bash
//! sift index ./my-service            # index one repository
//! sift index ./my-service --force    # re-chunk every file, changed or not
//! sift index-all ~/src --max-repos 5 # index every git repository in a folder
//! sift stats                         # file/chunk counts per repository
//! sift info my-service               # languages and sample files of one repository
//! sift delete my-service             # drop a repository from the index
//! sift config                        # print the effective configuration
//! sift check                         # database integrity and counts
//! sift reset --yes                   # drop every repository from the index
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sift_core::{Config, discover_repositories, repo_name_for};
use sift_index::{
    CollectionKind, HashCache, IndexReport, IndexStore, RepoIndexer, SqliteStore,
    repository_info,
};
use tokio::sync::{mpsc, watch};

/// Incremental repository indexer.
#[derive(Parser)]
#[command(name = "sift", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    ///
    /// Defaults to `$SIFT_CONFIG`, then `./sift.toml`. A missing file means
    /// built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print reports as JSON instead of progress lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one repository.
    Index {
        path: PathBuf,
        /// Repository name in the index (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Re-chunk and rewrite every file, even unchanged ones.
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Index every git repository directly under a folder.
    IndexAll {
        /// Folder to scan (defaults to `repos.source_folder`).
        dir: Option<PathBuf>,
        #[arg(long, short = 'm')]
        max_repos: Option<usize>,
        /// Re-chunk and rewrite every file, even unchanged ones.
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Show file and chunk counts.
    Stats,
    /// Show languages, sizes and sample files of one indexed repository.
    Info { repo: String },
    /// Remove a repository and all of its chunks from the index.
    Delete { repo: String },
    /// Print the effective configuration after env overrides.
    Config,
    /// Run an integrity check on the index database.
    Check,
    /// Remove every repository from the index.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

/// Sample files listed by `info`.
const INFO_SAMPLE_FILES: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());
    let config = Config::load(&config_path)?;
    config.validate()?;

    if matches!(cli.command, Commands::Config) {
        return print_config(&config, &config_path, cli.json);
    }

    let store = Arc::new(
        SqliteStore::new(&config.storage.sqlite_path)
            .await
            .context("failed to open index database")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal, stopping after current commits");
        let _ = shutdown_tx.send(true);
    });

    match cli.command {
        Commands::Index { path, name, force } => {
            let name = match name {
                Some(name) => name,
                None => repo_name_for(&path)?,
            };
            let report =
                run_index(&config, &store, &path, &name, shutdown_rx, force, cli.json).await?;
            print_report(&report, cli.json)?;
        }
        Commands::IndexAll {
            dir,
            max_repos,
            force,
        } => {
            let Some(dir) = dir.or_else(|| config.repos.source_folder.clone()) else {
                bail!("no folder given and repos.source_folder is not configured");
            };
            let repos = discover_repositories(&dir, max_repos.or(config.repos.max_repos))?;
            if repos.is_empty() {
                bail!("no git repositories found in {}", dir.display());
            }
            if !cli.json {
                println!("Indexing {} repositories in {}", repos.len(), dir.display());
                println!("Legend: + added, * modified, = unchanged, - removed, ! error");
            }

            let total = repos.len();
            for (i, repo) in repos.iter().enumerate() {
                if *shutdown_rx.borrow() {
                    break;
                }
                if !cli.json {
                    println!("\n[{}/{total}] {}", i + 1, repo.name);
                }
                match run_index(
                    &config,
                    &store,
                    &repo.path,
                    &repo.name,
                    shutdown_rx.clone(),
                    force,
                    cli.json,
                )
                .await
                {
                    Ok(report) => print_report(&report, cli.json)?,
                    Err(e) => {
                        tracing::error!(repo = %repo.name, "indexing failed: {e:#}");
                        eprintln!("{}: {e:#}", repo.name);
                    }
                }
            }
        }
        Commands::Stats => print_stats(&*store, cli.json).await?,
        Commands::Info { repo } => print_info(&*store, &repo, cli.json).await?,
        Commands::Delete { repo } => {
            store
                .delete_repository(&repo)
                .await
                .with_context(|| format!("failed to delete repository {repo}"))?;
            println!("Deleted {repo}");
        }
        Commands::Check => print_check(&store, &config.storage.sqlite_path, cli.json).await?,
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset removes every repository from the index; rerun with --yes");
            }
            let (files, chunks) = store.reset().await.context("failed to reset index")?;
            println!("Removed {files} files and {chunks} chunks");
        }
        Commands::Config => {}
    }

    Ok(())
}

async fn run_index(
    config: &Config,
    store: &Arc<SqliteStore>,
    path: &Path,
    name: &str,
    shutdown_rx: watch::Receiver<bool>,
    force: bool,
    quiet: bool,
) -> anyhow::Result<IndexReport> {
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let indexer = RepoIndexer::new(
        Arc::clone(store) as Arc<dyn IndexStore>,
        Arc::new(HashCache::new()),
        config.indexer_config(),
    )?
    .with_progress(progress_tx)
    .with_shutdown(shutdown_rx)
    .with_force(force);

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = progress_rx.recv().await {
            if !quiet {
                let _ = write!(stdout, "{}", event.outcome.tag());
                let _ = stdout.flush();
            }
        }
    });

    let result = indexer.index_repository(path, name).await;
    drop(indexer);
    let _ = printer.await;
    if !quiet {
        println!();
    }
    Ok(result?)
}

fn print_report(report: &IndexReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}", report.summary());
    for error in &report.errors {
        println!("  ! {}: {}", error.path, error.message);
    }
    if report.oversized_chunks > 0 {
        println!("  {} oversized chunks kept whole", report.oversized_chunks);
    }
    if report.cancelled {
        println!("  cancelled before all files were processed");
    }
    Ok(())
}

async fn print_stats(store: &dyn IndexStore, json: bool) -> anyhow::Result<()> {
    let files = store.count(CollectionKind::Files).await?;
    let chunks = store.count(CollectionKind::Chunks).await?;
    let repos = store.repositories().await?;

    if json {
        let repos: Vec<_> = repos
            .iter()
            .map(|(name, files)| serde_json::json!({ "name": name, "files": files }))
            .collect();
        let stats = serde_json::json!({ "files": files, "chunks": chunks, "repositories": repos });
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("files:  {files}");
    println!("chunks: {chunks}");
    for (name, count) in repos {
        println!("  {name}: {count} files");
    }
    Ok(())
}

async fn print_info(store: &dyn IndexStore, repo: &str, json: bool) -> anyhow::Result<()> {
    let Some(info) = repository_info(store, repo, INFO_SAMPLE_FILES).await? else {
        let similar: Vec<String> = store
            .repositories()
            .await?
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name.contains(repo))
            .collect();
        if similar.is_empty() {
            bail!("repository {repo} is not indexed");
        }
        bail!(
            "repository {repo} is not indexed; did you mean: {}",
            similar.join(", ")
        );
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{}", info.name);
    println!(
        "  language: {}",
        info.primary_language().unwrap_or("unknown")
    );
    println!(
        "  files: {}, chunks: {}, bytes: {}",
        info.files, info.chunks, info.total_bytes
    );
    for (language, count) in &info.languages {
        println!("  {language}: {count} files");
    }
    println!("  sample files:");
    for file in &info.sample_files {
        println!(
            "    {} ({}, {} bytes, {} chunks)",
            file.path,
            file.language.display_name(),
            file.size,
            file.chunks
        );
    }
    Ok(())
}

fn print_config(config: &Config, path: &Path, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
        return Ok(());
    }
    println!("# {}", path.display());
    print!("{}", config.to_toml()?);

    if let Some(folder) = &config.repos.source_folder {
        match discover_repositories(folder, config.repos.max_repos) {
            Ok(repos) => {
                println!("\n# {} repositories in {}", repos.len(), folder.display());
                for repo in repos.iter().take(10) {
                    println!("#   {}", repo.name);
                }
            }
            Err(e) => println!("\n# cannot list {}: {e:#}", folder.display()),
        }
    }
    Ok(())
}

async fn print_check(store: &SqliteStore, db_path: &str, json: bool) -> anyhow::Result<()> {
    let problems = store.integrity_check().await?;
    let files = store.count(CollectionKind::Files).await?;
    let chunks = store.count(CollectionKind::Chunks).await?;
    let db_bytes = std::fs::metadata(db_path).map(|m| m.len()).ok();

    if json {
        let check = serde_json::json!({
            "path": db_path,
            "bytes": db_bytes,
            "ok": problems.is_empty(),
            "problems": problems,
            "files": files,
            "chunks": chunks,
        });
        println!("{}", serde_json::to_string_pretty(&check)?);
    } else {
        println!("database: {db_path}");
        if let Some(bytes) = db_bytes {
            println!("size:     {bytes} bytes");
        }
        println!("files:    {files}");
        println!("chunks:   {chunks}");
        if problems.is_empty() {
            println!("integrity: ok");
        } else {
            for problem in &problems {
                println!("integrity: {problem}");
            }
        }
    }

    if !problems.is_empty() {
        bail!("integrity check reported {} problems", problems.len());
    }
    Ok(())
}

fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("SIFT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("sift.toml")
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
