use super::decision::DecisionNode;
use super::manager::Manager;
use super::trial::Backup;
use super::trial::Trial;
use crate::alg::Planner;
use crate::env::Environment;
use crate::env::TrialCtx;
use crate::error::Result;
use crate::geometry::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// a chance point of the search tree, identified by state, action
/// and decision depth. holds the local vector reward for its
/// state-action pair, sampled once at creation.
pub struct ChanceNode<E: Environment, P: Planner<E>> {
    id: u64,
    state: E::State,
    action: E::Action,
    depth: usize,
    local_reward: Value,
    inner: Mutex<ChanceInner<E, P>>,
}

pub struct ChanceInner<E: Environment, P: Planner<E>> {
    pub visits: u64,
    pub backups: u64,
    /// append-only, keyed by observed next state
    pub children: HashMap<E::State, Arc<DecisionNode<E, P>>>,
    pub store: P::ChanceStore,
}

impl<E: Environment, P: Planner<E>> ChanceNode<E, P> {
    pub fn new(
        manager: &Manager<E, P>,
        state: E::State,
        action: E::Action,
        depth: usize,
        ctx: &TrialCtx,
    ) -> Result<Self> {
        let local_reward = manager.env().mo_reward(&state, &action, ctx)?;
        if local_reward.dim() != manager.env().reward_dim() {
            return Err(crate::error::Error::env(format!(
                "reward dimension {} does not match environment dimension {}",
                local_reward.dim(),
                manager.env().reward_dim()
            )));
        }
        Ok(Self {
            id: manager.next_id(),
            state,
            action,
            depth,
            local_reward,
            inner: Mutex::new(ChanceInner {
                visits: 0,
                backups: 0,
                children: HashMap::new(),
                store: manager.planner().chance_store(),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn state(&self) -> &E::State {
        &self.state
    }
    pub fn action(&self) -> &E::Action {
        &self.action
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn local_reward(&self) -> &Value {
        &self.local_reward
    }

    pub fn lock(&self) -> MutexGuard<ChanceInner<E, P>> {
        self.inner.lock().expect("chance node lock")
    }
    pub fn visits(&self) -> u64 {
        self.lock().visits
    }
    pub fn backups(&self) -> u64 {
        self.lock().backups
    }

    pub fn visit(&self) {
        self.lock().visits += 1;
    }

    pub fn child(&self, state: &E::State) -> Option<Arc<DecisionNode<E, P>>> {
        self.lock().children.get(state).cloned()
    }

    pub fn children(&self) -> Vec<(E::State, Arc<DecisionNode<E, P>>)> {
        self.lock()
            .children
            .iter()
            .map(|(s, c)| (s.clone(), c.clone()))
            .collect()
    }

    /// sample a next state from the environment and return the
    /// matching decision child, creating it on first observation.
    /// the candidate is built outside the lock and double-checked
    /// under it.
    pub fn sample_observation(
        &self,
        manager: &Manager<E, P>,
        trial: &mut Trial<E>,
    ) -> Result<Arc<DecisionNode<E, P>>> {
        let next = manager
            .env()
            .sample_transition(&self.state, &self.action, &mut trial.ctx)?;
        if let Some(child) = self.child(&next) {
            return Ok(child);
        }
        let candidate = Arc::new(DecisionNode::new(
            manager,
            next.clone(),
            self.depth + 1,
            &trial.ctx,
        )?);
        let mut inner = self.lock();
        Ok(inner.children.entry(next).or_insert(candidate).clone())
    }

    pub fn backup(
        &self,
        manager: &Manager<E, P>,
        backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        self.lock().backups += 1;
        manager.planner().backup_chance(self, backup, trial)
    }
}

impl<E: Environment, P: Planner<E>> std::fmt::Display for ChanceNode<E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "C{}@{}", self.id, self.depth)
    }
}
