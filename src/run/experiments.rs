use super::config::RunConfig;
use super::outcome::RunOutcome;
use super::outcome::TimedEvaluation;
use crate::alg::AlgId;
use crate::alg::Chmcts;
use crate::alg::Czt;
use crate::alg::Planner;
use crate::alg::SmBts;
use crate::alg::SmDents;
use crate::env::fruit::FruitTree;
use crate::env::treasure::DeepSeaTreasure;
use crate::env::walk::Walk;
use crate::env::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::weight::Weight;
use crate::search::eval::MoMcEvaluator;
use crate::search::policy::EvalPolicy;
use crate::search::stats::TreeStats;
use crate::search::Manager;
use crate::search::TrialPool;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// the named experiment table. each entry expands to the run
/// configurations it sweeps over.
pub fn experiment(name: &str) -> Result<Vec<RunConfig>> {
    match name {
        // quick smoke run on the treasure grid
        "000_debug" => {
            let mut config = RunConfig::new("dst", AlgId::Smbts);
            config.search_runtime_seconds = 5.;
            config.num_repeats = 3;
            config.num_threads = 1;
            config.eval_threads = 1;
            config.smbts_search_temp = 100.;
            config.smbts_epsilon = 0.1;
            Ok(vec![config])
        }
        // one debug walk per flavour, all four algorithms each
        "001_debug" => Ok(sweep("walk")),
        "002_debug" => Ok(sweep("walk-stochastic")),
        "003_debug" => Ok(sweep("walk-4d")),
        "004_debug" => Ok(sweep("walk-4d-stochastic")),
        // proof of concept on deep sea treasure
        "009_poc_dst" => {
            let mut configs = sweep("dst");
            for config in configs.iter_mut() {
                config.search_runtime_seconds = 30.;
                config.eval_delta = Some(1.);
                config.rollouts_per_mc_eval = 1000;
                config.sm_split_visit_thresh = 10;
                config.smbts_search_temp = 10.;
                config.smbts_epsilon = 0.01;
            }
            Ok(configs)
        }
        // proof of concept on the six-objective fruit tree
        "010_poc_ft" => {
            let mut configs = sweep("fruit-tree");
            for config in configs.iter_mut() {
                config.search_runtime_seconds = 10.;
                config.eval_delta = Some(0.5);
                config.rollouts_per_mc_eval = 1000;
                config.max_trial_length = 50;
                config.sm_split_visit_thresh = 10;
                config.smbts_search_temp = 10.;
                config.smbts_epsilon = 0.01;
            }
            Ok(configs)
        }
        other => Err(Error::config(format!("unknown experiment id: {}", other))),
    }
}

fn sweep(env_id: &str) -> Vec<RunConfig> {
    [AlgId::Smbts, AlgId::Smdents, AlgId::Czt, AlgId::Chmcts]
        .into_iter()
        .map(|alg| {
            let mut config = RunConfig::new(env_id, alg);
            config.search_runtime_seconds = 15.;
            config.num_repeats = 3;
            config.smbts_epsilon = 0.1;
            config
        })
        .collect()
}

/// run every repeat of one configuration, building the environment
/// and the planner the configuration names
pub fn run(config: &RunConfig) -> Result<Vec<RunOutcome>> {
    config.validate()?;
    match config.env_id.as_str() {
        "dst" => run_env(Arc::new(DeepSeaTreasure), config),
        "fruit-tree" => run_env(Arc::new(FruitTree::new(6, config.seed)), config),
        "walk" => run_env(Arc::new(Walk::new(10, 0., false)), config),
        "walk-stochastic" => run_env(Arc::new(Walk::new(10, 0.25, false)), config),
        "walk-4d" => run_env(Arc::new(Walk::new(10, 0., true)), config),
        "walk-4d-stochastic" => run_env(Arc::new(Walk::new(10, 0.25, true)), config),
        other => Err(Error::config(format!("unknown environment id: {}", other))),
    }
}

fn run_env<E: Environment>(env: Arc<E>, config: &RunConfig) -> Result<Vec<RunOutcome>> {
    let dim = env.reward_dim();
    if dim != config.reward_dim()? {
        return Err(Error::config(format!(
            "environment reports dimension {}, configuration expects {}",
            dim,
            config.reward_dim()?
        )));
    }
    (0..config.num_repeats)
        .map(|repeat| match config.alg_id {
            AlgId::Czt => search(env.clone(), czt(config, dim), config, repeat),
            AlgId::Chmcts => search(env.clone(), Chmcts::new(czt(config, dim)), config, repeat),
            AlgId::Smbts => search(env.clone(), smbts(config, dim)?, config, repeat),
            AlgId::Smdents => {
                let mut dents = SmDents::new(smbts(config, dim)?);
                dents.entropy_temp_init = config.smdents_entropy_temp_init;
                dents.entropy_temp_visits_scale = config.smdents_entropy_temp_visits_scale;
                search(env.clone(), dents, config, repeat)
            }
        })
        .collect()
}

fn czt(config: &RunConfig, dim: usize) -> Czt {
    Czt::new(dim, config.czt_bias, config.czt_ball_split_visit_thresh)
}

fn smbts(config: &RunConfig, dim: usize) -> Result<SmBts> {
    let (lo, _) = config.value_bounds()?;
    let mut bts = SmBts::new(dim, lo);
    bts.temp = config.smbts_search_temp;
    bts.epsilon = config.smbts_epsilon;
    bts.temp_decay_scale = config
        .smbts_use_search_temp_decay
        .then_some(config.smbts_search_temp_decay_visits_scale);
    bts.l_inf_thresh = config.sm_l_inf_thresh;
    bts.split_visit_thresh = config.sm_split_visit_thresh;
    bts.max_depth = config.sm_max_depth;
    bts.triangulation = config.sm_triangulation;
    Ok(bts)
}

/// one repeat: search for the configured wall clock budget,
/// evaluating the recommendation policy by Monte-Carlo rollouts
/// either once at the end or periodically along the way
fn search<E: Environment, P: Planner<E>>(
    env: Arc<E>,
    planner: P,
    config: &RunConfig,
    repeat: usize,
) -> Result<RunOutcome> {
    let seed = config.seed.wrapping_add(repeat as u64);
    let mut manager = Manager::new(
        env,
        planner,
        seed,
        config.max_trial_length,
        config.num_threads,
    );
    if let Some(weight) = &config.fixed_weight {
        manager = manager.with_fixed_weight(Weight::new(weight.clone())?);
    }
    let manager = Arc::new(manager);
    let root = manager.root()?;
    let pool = TrialPool::new(manager.clone(), root.clone());
    let bounds = config.value_bounds()?;
    let evaluate = || {
        let policy = EvalPolicy::new(root.clone(), manager.clone());
        MoMcEvaluator::new(policy, Some(bounds.clone()))
            .run_rollouts(config.rollouts_per_mc_eval, config.eval_threads)
    };

    let budget = Duration::from_secs_f64(config.search_runtime_seconds);
    let started = Instant::now();
    let mut trials = 0;
    let mut series = Vec::new();
    match config.eval_delta {
        None => trials = pool.run_trials_for(budget)?,
        Some(delta) => {
            while started.elapsed() < budget {
                let chunk = Duration::from_secs_f64(delta).min(budget.saturating_sub(started.elapsed()));
                trials += pool.run_trials_for(chunk)?;
                series.push(TimedEvaluation {
                    at_seconds: started.elapsed().as_secs_f64(),
                    evaluation: evaluate()?,
                });
            }
        }
    }
    let search_seconds = started.elapsed().as_secs_f64();
    log::info!(
        "{} on {} repeat {}: {} trials in {:.2}s",
        config.alg_id,
        config.env_id,
        repeat,
        trials,
        search_seconds
    );
    log::debug!("tree after search: {}", TreeStats::measure(&root));
    let evaluation = evaluate()?;
    Ok(RunOutcome {
        env_id: config.env_id.clone(),
        alg_id: config.alg_id,
        repeat,
        seed,
        trials,
        search_seconds,
        evaluation,
        series,
        config: config.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_experiments_are_config_errors() {
        assert!(experiment("042_mystery").is_err());
        assert!(experiment("000_debug").is_ok());
    }

    #[test]
    fn experiment_tables_produce_valid_configs() {
        for name in ["000_debug", "001_debug", "004_debug", "009_poc_dst", "010_poc_ft"] {
            for config in experiment(name).unwrap() {
                assert!(config.validate().is_ok());
            }
        }
    }

    #[test]
    fn a_tiny_run_completes_end_to_end() {
        let mut config = RunConfig::new("walk", AlgId::Czt);
        config.search_runtime_seconds = 0.2;
        config.rollouts_per_mc_eval = 16;
        config.num_repeats = 1;
        config.num_threads = 2;
        config.eval_threads = 2;
        let outcomes = run(&config).unwrap();
        assert!(outcomes.len() == 1);
        assert!(outcomes[0].trials > 0);
        assert!(outcomes[0].evaluation.rollouts == 16);
        assert!(outcomes[0].evaluation.mean_return.len() == 2);
        assert!(outcomes[0].series.is_empty());
    }

    #[test]
    fn periodic_evaluation_builds_a_time_series() {
        let mut config = RunConfig::new("walk", AlgId::Czt);
        config.search_runtime_seconds = 0.3;
        config.eval_delta = Some(0.1);
        config.rollouts_per_mc_eval = 8;
        config.num_repeats = 1;
        config.num_threads = 2;
        config.eval_threads = 2;
        let outcomes = run(&config).unwrap();
        let series = &outcomes[0].series;
        assert!(series.len() >= 2);
        assert!(series.windows(2).all(|w| w[0].at_seconds <= w[1].at_seconds));
    }
}
