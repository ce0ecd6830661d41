use super::policy::EvalPolicy;
use crate::alg::Planner;
use crate::env::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::Scalar;
use crate::Utility;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;

/// what a batch of evaluation rollouts produced
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub rollouts: usize,
    /// mean vector return across rollouts
    pub mean_return: Vec<Scalar>,
    /// mean of each rollout's return scalarised by its own weight
    pub mean_utility: Utility,
    /// mean return rescaled into [0, 1] per objective when value
    /// bounds are known
    pub normalized_return: Option<Vec<Scalar>>,
}

/// Monte-Carlo evaluation of a recommendation policy: replay the
/// greedy tree many times under fresh contexts and average the
/// vector returns. rollouts are data parallel, one rayon task each.
pub struct MoMcEvaluator<E: Environment, P: Planner<E>> {
    policy: EvalPolicy<E, P>,
    bounds: Option<(Value, Value)>,
}

impl<E: Environment, P: Planner<E>> MoMcEvaluator<E, P> {
    pub fn new(policy: EvalPolicy<E, P>, bounds: Option<(Value, Value)>) -> Self {
        Self { policy, bounds }
    }

    pub fn run_rollouts(&self, rollouts: usize, threads: usize) -> Result<Evaluation> {
        if rollouts == 0 {
            return Err(Error::config("evaluation needs at least one rollout"));
        }
        let seed = self.policy.manager().seed();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .build()
            .map_err(|e| Error::config(format!("evaluation pool: {}", e)))?;
        let progress = crate::progress(rollouts);
        let outcomes = pool.install(|| {
            (0..rollouts)
                .into_par_iter()
                .map(|i| {
                    let mut rng =
                        SmallRng::seed_from_u64(seed ^ (0x9e3779b97f4a7c15u64.wrapping_mul(i as u64 + 1)));
                    self.policy.rollout(i, &mut rng)
                })
                .inspect(|_| progress.inc(1))
                .collect::<Result<Vec<_>>>()
        });
        progress.finish_and_clear();
        let outcomes = outcomes?;
        let dim = self
            .policy
            .manager()
            .env()
            .reward_dim();
        let mut mean = Value::zeros(dim);
        let mut utility = 0.;
        for (n, (weight, along)) in outcomes.iter().enumerate() {
            mean.nudge(along, n as u64 + 1);
            utility += (weight.dot(along) - utility) / (n as Scalar + 1.);
        }
        let normalized_return = self.bounds.as_ref().map(|(lo, hi)| {
            mean.components()
                .iter()
                .zip(lo.components())
                .zip(hi.components())
                .map(|((m, l), h)| match h - l {
                    range if range.abs() < 1e-12 => 0.,
                    range => (m - l) / range,
                })
                .collect()
        });
        Ok(Evaluation {
            rollouts,
            mean_return: mean.into_components(),
            mean_utility: utility,
            normalized_return,
        })
    }
}
