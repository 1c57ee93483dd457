use std::{fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use linemap_pipeline::io::SESSION_FILE;
use linemap_pipeline::{
    resume_fitnmerge, run_fitnmerge, FitnmergeConfig, FitnmergeInput, FitnmergeProblem,
    FitnmergeStats, PipelineSession, Stage,
};
use log::{debug, info};

/// Fit-and-merge 3D line reconstruction from segments and depth maps.
#[derive(Debug, Parser)]
#[command(author, version, about = "Fit-and-merge 3D line reconstruction")]
struct Args {
    /// Path to JSON file containing FitnmergeInput.
    #[arg(long, required_unless_present = "resume")]
    input: Option<PathBuf>,

    /// Continue from a session checkpoint instead of starting from `--input`.
    #[arg(long, conflicts_with = "input")]
    resume: Option<PathBuf>,

    /// With `--resume`, redo this stage and every later one.
    #[arg(long, requires = "resume")]
    rerun_from: Option<Stage>,

    /// Optional path to JSON FitnmergeConfig. Defaults, or the checkpoint's
    /// config when resuming, are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory; overrides `dir_save` from the config.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Fitting worker threads; overrides `fitting.n_jobs`.
    #[arg(long)]
    n_jobs: Option<usize>,

    /// Reuse an existing fit cache.
    #[arg(long)]
    skip_exists: bool,

    /// Only load fits from the cache, never fit.
    #[arg(long)]
    load_fit: bool,

    /// Run joint line refinement after merging.
    #[arg(long)]
    refine: bool,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn build_config(args: &Args, base: FitnmergeConfig) -> Result<FitnmergeConfig> {
    let mut config = match &args.config {
        Some(path) => load_json_file::<FitnmergeConfig>(path)?,
        None => base,
    };
    if let Some(dir) = &args.output {
        config.dir_save = dir.clone();
    }
    if let Some(n_jobs) = args.n_jobs {
        config.fitting.n_jobs = n_jobs;
    }
    config.skip_exists |= args.skip_exists;
    config.load_fit |= args.load_fit;
    if args.refine {
        config.refinement.disable = false;
    }
    Ok(config)
}

fn run_fitnmerge_from_files(args: &Args) -> Result<FitnmergeStats> {
    let mut session = match &args.resume {
        Some(path) => {
            let mut session = PipelineSession::<FitnmergeProblem>::load(path)?;
            let config = build_config(args, session.config.clone())?;
            if let Some(stage) = args.rerun_from {
                session.state.invalidate_from(stage);
            }
            info!("resuming {}", path.display());
            resume_fitnmerge(&mut session, Some(config))?;
            session
        }
        None => {
            let path = args
                .input
                .as_ref()
                .ok_or_else(|| anyhow!("either --input or --resume is required"))?;
            let input: FitnmergeInput = load_json_file(path)?;
            let config = build_config(args, FitnmergeConfig::default())?;
            let mut session = PipelineSession::<FitnmergeProblem>::with_description(format!(
                "fit-and-merge of {}",
                path.display()
            ));
            session.set_input(input)?;
            run_fitnmerge(&mut session, Some(config))?;
            session
        }
    };

    for entry in &session.log {
        debug!("{entry}");
    }
    let stats = session.export()?.stats;
    info!(
        "session written to {}",
        session.config.dir_save.join(SESSION_FILE).display()
    );
    Ok(stats)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let stats = run_fitnmerge_from_files(&args)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
