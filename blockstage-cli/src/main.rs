use blockstage_core::StageConfig;
use blockstage_runtime::Stage;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod scene;

use scene::{Scene, SceneError};

#[derive(Parser, Debug)]
#[command(name = "blockstage", version)]
#[command(about = "Blockstage CLI - run block scripts for up to two actors")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scene until playback stops and print the final stage
    Run {
        /// Scene file (JSON)
        scene: PathBuf,
        /// Enable collision-triggered script swapping
        #[arg(long)]
        hero: bool,
    },
    /// Validate a scene file and list its actors
    Check {
        /// Scene file (JSON)
        scene: PathBuf,
    },
}

fn init_logging(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn run_scene(path: PathBuf, hero: bool) -> Result<(), SceneError> {
    let scene = Scene::load(&path)?;
    let config = StageConfig::from_env().map_err(blockstage_core::StageError::from)?;
    let stage = Stage::new(config)?;
    scene.install(&stage).await?;
    if hero {
        stage.set_hero(true);
    }

    tracing::info!(scene = %path.display(), actors = scene.actors.len(), hero = stage.hero_enabled(), "Running scene");
    stage.play();
    stage.settled().await;

    let reports = stage.take_reports().await;
    for failure in reports.iter().flat_map(|r| &r.failures) {
        tracing::warn!(actor = %failure.actor(), error = %failure, "Actor did not finish");
    }

    let output = serde_json::json!({
        "actors": stage.snapshot().actors,
        "runs": reports.len(),
        "swaps": stage.swap_stats().await,
        "swap_history": stage.swap_history().await,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn check_scene(path: PathBuf) -> Result<(), SceneError> {
    let scene = Scene::load(&path)?;
    println!("{}: {} actor(s), hero {}", path.display(), scene.actors.len(), if scene.hero { "on" } else { "off" });
    for actor in &scene.actors {
        println!(
            "  {} - {} block(s): {}",
            actor.name,
            actor.script.len(),
            actor.script.summary()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let result = match cli.command {
        Commands::Run { scene, hero } => run_scene(scene, hero).await,
        Commands::Check { scene } => check_scene(scene),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
