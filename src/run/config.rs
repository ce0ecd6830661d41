use crate::alg::AlgId;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::simplex::Triangulation;
use crate::geometry::value::Value;
use crate::Probability;
use crate::Scalar;
use serde::Deserialize;
use serde::Serialize;

/// the built-in environments
pub const ENV_IDS: [&str; 6] = [
    "dst",
    "fruit-tree",
    "walk",
    "walk-stochastic",
    "walk-4d",
    "walk-4d-stochastic",
];

/// everything that identifies one experimental run: the environment,
/// the algorithm, the shared search knobs, and every per-algorithm
/// knob with its default. unknown ids and malformed parameters are
/// fatal at validation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub env_id: String,
    pub alg_id: AlgId,
    pub seed: u64,
    pub search_runtime_seconds: Scalar,
    /// evaluate the policy every this many seconds during the
    /// search, building a time series; a single final evaluation
    /// otherwise
    pub eval_delta: Option<Scalar>,
    pub max_trial_length: usize,
    pub rollouts_per_mc_eval: usize,
    pub num_repeats: usize,
    pub num_threads: usize,
    pub eval_threads: usize,
    /// pin all trials to one scalarising weight instead of sampling
    pub fixed_weight: Option<Vec<Scalar>>,
    /// left disabled; convex hull search cannot share nodes across
    /// differently-stored views and rejects this outright
    pub use_transposition_table: bool,
    pub czt_bias: Scalar,
    pub czt_ball_split_visit_thresh: u64,
    pub sm_l_inf_thresh: Scalar,
    pub sm_max_depth: u32,
    pub sm_split_visit_thresh: u64,
    pub sm_triangulation: Triangulation,
    pub smbts_search_temp: Scalar,
    pub smbts_epsilon: Probability,
    pub smbts_use_search_temp_decay: bool,
    pub smbts_search_temp_decay_visits_scale: Scalar,
    pub smdents_entropy_temp_init: Scalar,
    pub smdents_entropy_temp_visits_scale: Scalar,
}

impl RunConfig {
    pub fn new(env_id: &str, alg_id: AlgId) -> Self {
        Self {
            env_id: env_id.to_string(),
            alg_id,
            seed: 60415,
            search_runtime_seconds: 5.,
            eval_delta: None,
            max_trial_length: 50,
            rollouts_per_mc_eval: 250,
            num_repeats: 1,
            num_threads: num_cpus::get(),
            eval_threads: num_cpus::get(),
            fixed_weight: None,
            use_transposition_table: false,
            czt_bias: crate::CZT_BIAS,
            czt_ball_split_visit_thresh: crate::CZT_BALL_SPLIT_VISIT_THRESH,
            sm_l_inf_thresh: crate::SM_L_INF_THRESH,
            sm_max_depth: crate::SM_MAX_DEPTH,
            sm_split_visit_thresh: crate::SM_SPLIT_VISIT_THRESH,
            sm_triangulation: Triangulation::Barycentric,
            smbts_search_temp: crate::SMBTS_SEARCH_TEMP,
            smbts_epsilon: crate::SMBTS_EPSILON,
            smbts_use_search_temp_decay: false,
            smbts_search_temp_decay_visits_scale: crate::SMBTS_TEMP_DECAY_VISITS_SCALE,
            smdents_entropy_temp_init: crate::SMDENTS_ENTROPY_TEMP_INIT,
            smdents_entropy_temp_visits_scale: crate::SMDENTS_ENTROPY_TEMP_VISITS_SCALE,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !ENV_IDS.contains(&self.env_id.as_str()) {
            return Err(Error::config(format!("unknown environment id: {}", self.env_id)));
        }
        if self.num_threads == 0 || self.eval_threads == 0 {
            return Err(Error::config("thread counts must be positive"));
        }
        if self.search_runtime_seconds <= 0. {
            return Err(Error::config("search runtime must be positive"));
        }
        if self.eval_delta.map(|d| d <= 0.).unwrap_or(false) {
            return Err(Error::config("evaluation interval must be positive"));
        }
        if self.max_trial_length == 0 {
            return Err(Error::config("max trial length must be positive"));
        }
        if self.rollouts_per_mc_eval == 0 || self.num_repeats == 0 {
            return Err(Error::config("rollout and repeat counts must be positive"));
        }
        if !(0. ..=1.).contains(&self.smbts_epsilon) {
            return Err(Error::config("epsilon must lie in [0, 1]"));
        }
        if self.use_transposition_table && self.alg_id == AlgId::Chmcts {
            return Err(Error::config(
                "transposition tables are incompatible with convex hull search",
            ));
        }
        if let Some(weight) = &self.fixed_weight {
            let expected = self.reward_dim()?;
            if weight.len() != expected {
                return Err(Error::config(format!(
                    "fixed weight has dimension {}, environment expects {}",
                    weight.len(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// the reward dimension the configured environment exposes
    pub fn reward_dim(&self) -> Result<usize> {
        match self.env_id.as_str() {
            "dst" | "walk" | "walk-stochastic" => Ok(2),
            "walk-4d" | "walk-4d-stochastic" => Ok(4),
            "fruit-tree" => Ok(6),
            other => Err(Error::config(format!("unknown environment id: {}", other))),
        }
    }

    /// per-objective value bounds of the configured environment,
    /// used to seed pessimistic defaults and normalise evaluations
    pub fn value_bounds(&self) -> Result<(Value, Value)> {
        let bounds = match self.env_id.as_str() {
            "dst" => (
                vec![0., -(self.max_trial_length as Scalar)],
                vec![crate::env::treasure::DeepSeaTreasure::max_treasure(), 0.],
            ),
            "walk" | "walk-stochastic" => (vec![-10., -10.], vec![-5., -5.]),
            "walk-4d" | "walk-4d-stochastic" => {
                (vec![-10., -10., 0., 0.], vec![-5., -5., 2., 2.])
            }
            "fruit-tree" => (vec![0.; 6], vec![10.; 6]),
            other => return Err(Error::config(format!("unknown environment id: {}", other))),
        };
        let (lo, hi) = bounds;
        if lo.len() != self.reward_dim()? || hi.len() != lo.len() {
            return Err(Error::config(
                "value bounds do not match the environment reward dimension",
            ));
        }
        Ok((Value::from(lo), Value::from(hi)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        for env in ENV_IDS {
            for alg in [AlgId::Czt, AlgId::Chmcts, AlgId::Smbts, AlgId::Smdents] {
                assert!(RunConfig::new(env, alg).validate().is_ok());
            }
        }
    }

    #[test]
    fn unknown_environments_are_fatal() {
        let config = RunConfig::new("lunar-lander", AlgId::Czt);
        assert!(config.validate().is_err());
        assert!(config.value_bounds().is_err());
    }

    #[test]
    fn transposition_tables_are_rejected_for_hull_search() {
        let mut config = RunConfig::new("dst", AlgId::Chmcts);
        config.use_transposition_table = true;
        assert!(config.validate().is_err());
        let mut config = RunConfig::new("dst", AlgId::Czt);
        config.use_transposition_table = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn fixed_weights_must_match_the_reward_dimension() {
        let mut config = RunConfig::new("walk-4d", AlgId::Smbts);
        config.fixed_weight = Some(vec![0.5, 0.5]);
        assert!(config.validate().is_err());
        config.fixed_weight = Some(vec![0.25; 4]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bounds_share_the_reward_dimension() {
        let config = RunConfig::new("walk-4d", AlgId::Smbts);
        let (lo, hi) = config.value_bounds().unwrap();
        assert!(lo.dim() == 4);
        assert!(hi.dim() == 4);
    }

    #[test]
    fn configs_round_trip_through_serde() {
        let config = RunConfig::new("dst", AlgId::Smdents);
        let json = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert!(back.env_id == config.env_id);
        assert!(back.alg_id == config.alg_id);
        assert!(back.czt_bias == config.czt_bias);
    }
}
