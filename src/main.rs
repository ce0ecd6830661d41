use anyhow::Context;
use clap::Parser;
use motree::run::experiments;

/// run a named multi-objective planning experiment
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// experiment id from the built-in table, e.g. 000_debug
    experiment: String,
    /// directory result files are written under
    #[arg(long, default_value = "results")]
    out: std::path::PathBuf,
}

fn main() -> anyhow::Result<()> {
    motree::init();
    let args = Args::parse();
    let configs = experiments::experiment(&args.experiment)
        .with_context(|| format!("resolving experiment {}", args.experiment))?;
    log::info!("experiment {} with {} runs", args.experiment, configs.len());
    for config in &configs {
        let outcomes = experiments::run(config)
            .with_context(|| format!("running {} on {}", config.alg_id, config.env_id))?;
        for outcome in &outcomes {
            let path = outcome.save(&args.out).context("writing result file")?;
            log::info!("{} -> {}", outcome, path.display());
        }
    }
    Ok(())
}
