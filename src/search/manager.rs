use super::decision::DecisionNode;
use crate::alg::Planner;
use crate::env::Environment;
use crate::env::TrialCtx;
use crate::error::Result;
use crate::geometry::weight::Weight;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// ties an environment to a planner and the run-wide knobs the
/// search needs: seeding, trial length, worker count, and an
/// optional fixed scalarising weight. node ids are handed out here
/// so every node in a tree is uniquely addressable.
pub struct Manager<E: Environment, P: Planner<E>> {
    env: Arc<E>,
    planner: P,
    seed: u64,
    max_trial_length: usize,
    num_threads: usize,
    fixed_weight: Option<Weight>,
    ids: AtomicU64,
}

impl<E: Environment, P: Planner<E>> Manager<E, P> {
    pub fn new(
        env: Arc<E>,
        planner: P,
        seed: u64,
        max_trial_length: usize,
        num_threads: usize,
    ) -> Self {
        Self {
            env,
            planner,
            seed,
            max_trial_length,
            num_threads,
            fixed_weight: None,
            ids: AtomicU64::new(0),
        }
    }

    /// pin every trial to one scalarising weight instead of sampling
    pub fn with_fixed_weight(mut self, weight: Weight) -> Self {
        self.fixed_weight = Some(weight);
        self
    }

    pub fn env(&self) -> &E {
        &self.env
    }
    pub fn planner(&self) -> &P {
        &self.planner
    }
    pub fn seed(&self) -> u64 {
        self.seed
    }
    pub fn max_trial_length(&self) -> usize {
        self.max_trial_length
    }
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.ids.fetch_add(1, Ordering::Relaxed)
    }

    /// a fresh trial context, weight pinned if configured
    pub fn sample_context(&self, tid: usize, rng: &mut SmallRng) -> Result<TrialCtx> {
        let mut ctx = self.env.sample_context(tid, rng)?;
        if let Some(weight) = &self.fixed_weight {
            ctx.weight = weight.clone();
        }
        Ok(ctx)
    }

    /// build the root decision node over the environment's initial state
    pub fn root(&self) -> Result<Arc<DecisionNode<E, P>>> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let ctx = self.sample_context(0, &mut rng)?;
        let state = self.env.initial_state()?;
        Ok(Arc::new(DecisionNode::new(self, state, 0, &ctx)?))
    }
}
