//! Kolosal Trainer - inspect saved trainers from the command line

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use kolosal_trainer::data::TimeSeriesFrame;
use kolosal_trainer::logging;
use kolosal_trainer::trainer::Trainer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kolosal-trainer", version, about = "Inspect saved training runs")]
struct Cli {
    /// Log verbosity (0 = errors only .. 4 = trace)
    #[arg(short, long, default_value_t = 2, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the trainer info record
    Info {
        /// Trainer directory
        #[arg(short, long)]
        path: PathBuf,

        /// Include every model's info record
        #[arg(long)]
        models: bool,

        /// Use the directory even if it was moved since saving
        #[arg(long)]
        reset_paths: bool,
    },
    /// Print the leaderboard
    Leaderboard {
        /// Trainer directory
        #[arg(short, long)]
        path: PathBuf,

        /// JSON frame to compute test scores on
        #[arg(short, long)]
        data: Option<PathBuf>,

        #[arg(long)]
        reset_paths: bool,
    },
}

fn load_trainer(path: &PathBuf, reset_paths: bool) -> anyhow::Result<Trainer> {
    Trainer::load(path, reset_paths).with_context(|| format!("loading trainer from {}", path.display()))
}

fn cmd_info(path: &PathBuf, models: bool, reset_paths: bool) -> anyhow::Result<()> {
    let trainer = load_trainer(path, reset_paths)?;
    let info = trainer.get_info(models)?;
    println!("  {}", "Trainer".white().bold());
    println!("  {:<22} {}", "Path".dimmed(), trainer.path().display());
    println!(
        "  {:<22} {}",
        "Best model".dimmed(),
        info.best_model.as_deref().unwrap_or("-")
    );
    if let Some(score) = info.best_model_score_val {
        println!("  {:<22} {:.4}", "Best validation score".dimmed(), score);
    }
    println!("  {:<22} {}", "Models trained".dimmed(), info.num_models_trained);
    println!("  {:<22} {}", "Metric".dimmed(), info.eval_metric);
    println!("  {:<22} {}", "Prediction length".dimmed(), info.prediction_length);
    if models {
        println!();
        println!("{}", serde_json::to_string_pretty(&info.model_info)?);
    }
    Ok(())
}

fn cmd_leaderboard(path: &PathBuf, data: Option<&PathBuf>, reset_paths: bool) -> anyhow::Result<()> {
    let trainer = load_trainer(path, reset_paths)?;
    let frame: Option<TimeSeriesFrame> = match data {
        Some(file) => {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            Some(serde_json::from_str(&content).context("parsing the data frame")?)
        }
        None => None,
    };
    let board = trainer.leaderboard(frame.as_ref())?;
    print!("{}", board);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbosity);

    match &cli.command {
        Commands::Info {
            path,
            models,
            reset_paths,
        } => cmd_info(path, *models, *reset_paths)?,
        Commands::Leaderboard {
            path,
            data,
            reset_paths,
        } => cmd_leaderboard(path, data.as_ref(), *reset_paths)?,
    }

    Ok(())
}
