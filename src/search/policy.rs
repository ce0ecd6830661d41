use super::decision::DecisionNode;
use super::manager::Manager;
use super::trial::Trial;
use crate::alg::Planner;
use crate::env::Environment;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::geometry::weight::Weight;
use rand::Rng;
use rand::rngs::SmallRng;
use std::sync::Arc;

/// binds a searched tree to its environment so a finished search can
/// be played as a policy: recommend while the rollout stays on the
/// tree, act uniformly at random once it falls off.
pub struct EvalPolicy<E: Environment, P: Planner<E>> {
    root: Arc<DecisionNode<E, P>>,
    manager: Arc<Manager<E, P>>,
}

impl<E: Environment, P: Planner<E>> EvalPolicy<E, P> {
    pub fn new(root: Arc<DecisionNode<E, P>>, manager: Arc<Manager<E, P>>) -> Self {
        Self { root, manager }
    }

    pub fn manager(&self) -> &Arc<Manager<E, P>> {
        &self.manager
    }

    /// one episode under the recommended policy. returns the
    /// context weight it played under and the vector return.
    pub fn rollout(&self, tid: usize, rng: &mut SmallRng) -> Result<(Weight, Value)> {
        let manager = self.manager.as_ref();
        let env = manager.env();
        let ctx = manager.sample_context(tid, rng)?;
        let mut trial = Trial::<E>::new(ctx);
        let mut cursor = Some(self.root.clone());
        let mut state = env.initial_state()?;
        let mut along = Value::zeros(env.reward_dim());
        let mut steps = 0;
        while steps < manager.max_trial_length() && !env.is_sink(&state, &trial.ctx)? {
            let action = match &cursor {
                Some(node) if node.backups() > 0 => node.recommend_action(manager, &mut trial)?,
                _ => {
                    let actions = env.valid_actions(&state, &trial.ctx)?;
                    actions[trial.ctx.rng.random_range(0..actions.len())].clone()
                }
            };
            along += &env.mo_reward(&state, &action, &trial.ctx)?;
            let next = env.sample_transition(&state, &action, &mut trial.ctx)?;
            cursor = cursor
                .and_then(|node| node.child(&action))
                .and_then(|chance| chance.child(&next));
            state = next;
            steps += 1;
        }
        Ok((trial.ctx.weight.clone(), along))
    }
}
