//! apidex CLI — plan manifests, compute scores, export and apply documents.

use anyhow::{bail, Context};
use apidex_controller::{PatternEngine, Planner};
use apidex_core::{Manifest, ResourceName};
use apidex_patch::{apply_api, export_api};
use apidex_registry::{load_fixture, RegistryLister, RemoteConfig, RemoteRegistry};
use apidex_scoring::ScoringEngine;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(
    name = "apidex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Declarative controller for a hierarchical API registry"
)]
struct Cli {
    /// Remote registry base URL (token from APIDEX_TOKEN)
    #[arg(long, global = true)]
    registry: Option<String>,

    /// YAML fixture file backing an offline in-memory registry
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Concurrent in-flight registry operations
    #[arg(long, global = true, default_value_t = 10)]
    jobs: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the actions a manifest implies for a project
    Resolve {
        /// Manifest file
        manifest: PathBuf,

        /// Project id the manifest applies to
        #[arg(short, long)]
        project: String,

        /// Upper bound on emitted actions
        #[arg(long, default_value_t = 100)]
        max_actions: usize,
    },

    /// Evaluate a score definition against matching resources
    Score {
        /// Full name of the score definition artifact
        #[arg(long)]
        definition: String,

        /// Resource pattern to score (relative patterns allowed)
        #[arg(long)]
        pattern: String,

        /// Project id for relative patterns
        #[arg(short, long)]
        project: String,

        /// Print scores instead of uploading them
        #[arg(long)]
        dry_run: bool,
    },

    /// Print an API as a declarative YAML document
    Export {
        /// Full name of the API
        name: String,

        /// Embed versions, specs, deployments, and artifacts
        #[arg(long)]
        nested: bool,
    },

    /// Apply a declarative YAML document
    Apply {
        /// Document file
        #[arg(short, long)]
        file: PathBuf,

        /// Parent project (used when the document names none)
        #[arg(long)]
        parent: String,
    },
}

async fn build_lister(cli: &Cli) -> anyhow::Result<Arc<dyn RegistryLister>> {
    if let Some(url) = &cli.registry {
        let token = std::env::var("APIDEX_TOKEN").ok();
        return Ok(Arc::new(RemoteRegistry::new(RemoteConfig {
            base_url: url.clone(),
            token,
            max_inflight: cli.jobs,
            ..Default::default()
        })));
    }
    if let Some(path) = &cli.fixture {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixture {}", path.display()))?;
        return Ok(Arc::new(load_fixture(&yaml).await?));
    }
    bail!("pass --registry URL or --fixture FILE");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apidex=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let lister = build_lister(&cli).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            ctrl_c.cancel();
        }
    });

    match cli.command {
        Command::Resolve {
            manifest,
            project,
            max_actions,
        } => {
            let text = std::fs::read_to_string(&manifest)
                .with_context(|| format!("reading manifest {}", manifest.display()))?;
            let manifest = Manifest::from_yaml(&text)?;
            let planner = Planner::new(lister);
            let plan = planner.plan(&manifest, &project, max_actions, &cancel).await;
            for entry_error in &plan.errors {
                eprintln!("error: {}: {}", entry_error.pattern, entry_error.error);
            }
            for action in &plan.actions {
                println!("{}", action.command);
            }
        }
        Command::Score {
            definition,
            pattern,
            project,
            dry_run,
        } => {
            let definition = ResourceName::parse(&definition)?;
            let engine = PatternEngine::new(lister.clone());
            let scoring = ScoringEngine::new(lister);
            let resources = engine
                .expand(&project, &pattern, None, None, &cancel)
                .await?;
            if resources.is_empty() {
                bail!("no resources match {:?}", pattern);
            }
            for resource in resources {
                match scoring
                    .evaluate(&definition, &resource.name, dry_run, &cancel)
                    .await?
                {
                    Some(score) if dry_run => {
                        println!("# {}", resource.name);
                        println!("{}", score.to_yaml()?);
                    }
                    Some(score) => {
                        println!("{}: {} ({})", resource.name, score.id, score.severity);
                    }
                    None => {
                        println!("{}: current", resource.name);
                    }
                }
            }
        }
        Command::Export { name, nested } => {
            let api_name = ResourceName::parse(&name)?;
            let doc = export_api(lister.as_ref(), &api_name, nested, &cancel).await?;
            print!("{}", serde_yaml::to_string(&doc)?);
        }
        Command::Apply { file, parent } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading document {}", file.display()))?;
            let parent = ResourceName::parse(&parent)?;
            let applied = apply_api(lister.as_ref(), &bytes, &parent, &cancel).await?;
            println!("applied {}", applied);
        }
    }

    Ok(())
}
