use super::context::TrialCtx;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::geometry::weight::Weight;
use crate::Probability;
use rand::rngs::SmallRng;
use std::fmt::Debug;
use std::hash::Hash;

/// the contract a sequential decision problem exposes to the search.
///
/// implementations are pure and thread safe with respect to tree
/// search: all mutation lives behind the interface (a remote adapter
/// may do I/O per call, a grid world does none). observations equal
/// next states, so the tree is built over states directly. every
/// operation that an adapter could fail is fallible; environment
/// errors abort the trial and surface through the pool.
pub trait Environment: Send + Sync + 'static {
    type State: Clone + Eq + Hash + Debug + Send + Sync + 'static;
    type Action: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// number of reward objectives, fixed per environment, >= 2
    fn reward_dim(&self) -> usize;

    fn initial_state(&self) -> Result<Self::State>;

    fn is_sink(&self, state: &Self::State, ctx: &TrialCtx) -> Result<bool>;

    /// the ordered action set; empty exactly at sink states
    fn valid_actions(&self, state: &Self::State, ctx: &TrialCtx) -> Result<Vec<Self::Action>>;

    /// the full successor distribution, for exact tests only; not
    /// every adapter can enumerate it
    fn transition_distribution(
        &self,
        _state: &Self::State,
        _action: &Self::Action,
        _ctx: &TrialCtx,
    ) -> Result<Option<Vec<(Self::State, Probability)>>> {
        Ok(None)
    }

    fn sample_transition(
        &self,
        state: &Self::State,
        action: &Self::Action,
        ctx: &mut TrialCtx,
    ) -> Result<Self::State>;

    /// the vector reward for taking this action in this state
    fn mo_reward(&self, state: &Self::State, action: &Self::Action, ctx: &TrialCtx)
        -> Result<Value>;

    /// a fresh per-trial context. draws the scalarising weight
    /// uniformly from the simplex unless an adapter overrides it.
    fn sample_context(&self, tid: usize, rng: &mut SmallRng) -> Result<TrialCtx> {
        let weight = Weight::sample(self.reward_dim(), rng);
        Ok(TrialCtx::new(tid, weight, rng))
    }
}
