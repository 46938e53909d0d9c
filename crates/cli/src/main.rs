use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forge_engine::Workstream;
use forge_pipeline::Pipeline;
use forge_registry::RegistryTarget;
use forge_tui::ProgressRenderer;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod config;
mod scan;

/// Build, push and deploy the containerized services below the current directory.
#[derive(Debug, Parser)]
#[command(name = "forge", version, about)]
struct Cli {
    /// Path to forge.yaml; defaults to FORGE_CONFIG, then the nearest forge.yaml above the
    /// current directory.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Always show command output.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build container images that are neither local nor pushed.
    Bake,
    /// Push built images the registry does not have yet.
    Push,
    /// Render deployment manifests.
    Yaml,
    /// Bake, push and render manifests.
    Build,
    /// Build and apply manifests to the cluster.
    Deploy {
        /// Ask the cluster tool to validate without changing anything.
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    debug!(
        config = %config.path.display(),
        organization = config.organization.as_deref().unwrap_or("-"),
        token = config.token.is_some(),
        "configuration loaded"
    );

    let workstream = Workstream::system()?.with_verbose(cli.verbose);
    let target = RegistryTarget::new(&config.registry, &config.repo, &config.user, config.password.clone());
    let pipeline = Pipeline::new(workstream.clone(), target, &config.workdir);

    let cwd = std::env::current_dir().context("read current directory")?;
    let mut roots = vec![cwd];
    if !roots.contains(&config.workdir) {
        roots.push(config.workdir.clone());
    }

    let renderer = ProgressRenderer::spawn(workstream.clone());
    let outcome = run(&pipeline, &workstream, &roots, &cli.command).await;
    renderer.stop().await?;

    if let Ok(manifests) = &outcome {
        for dir in manifests {
            println!("{}", dir.display());
        }
    }
    let items = workstream.items();
    let errors = items.iter().filter(|item| item.is_finished() && !item.is_ok()).count();
    println!("{} tasks run, {} errors", items.len(), errors);

    outcome.map(|_| ())
}

/// Runs one stage; returns the manifest directories it produced, if any.
async fn run(pipeline: &Pipeline, workstream: &Workstream, roots: &[PathBuf], command: &Commands) -> Result<Vec<PathBuf>> {
    let services = scan::scan(workstream, roots).await?;
    debug!(services = services.len(), "services discovered");

    let manifests = match command {
        Commands::Bake => {
            pipeline.bake(&services).await?;
            Vec::new()
        }
        Commands::Push => {
            pipeline.push(&services).await?;
            Vec::new()
        }
        Commands::Yaml => pipeline.yaml(&services).await?,
        Commands::Build => pipeline.build(&services).await?,
        Commands::Deploy { dry_run } => {
            pipeline.deploy(&services, *dry_run).await?;
            Vec::new()
        }
    };
    Ok(manifests)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
