use super::chance::ChanceNode;
use super::manager::Manager;
use super::trial::Backup;
use super::trial::Trial;
use crate::alg::Planner;
use crate::env::Environment;
use crate::env::TrialCtx;
use crate::error::Error;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// a decision point of the search tree, identified by state and
/// decision depth. the node owns a mutex over its mutable interior;
/// traversal locks one node at a time, parent before child.
pub struct DecisionNode<E: Environment, P: Planner<E>> {
    id: u64,
    state: E::State,
    depth: usize,
    sink: bool,
    actions: Vec<E::Action>,
    inner: Mutex<DecisionInner<E, P>>,
}

pub struct DecisionInner<E: Environment, P: Planner<E>> {
    /// advanced on the downward pass; selection reads this so
    /// exploration sees in-flight trials before their backups land
    pub visits: u64,
    /// advanced on the upward pass
    pub backups: u64,
    /// append-only: a child, once inserted, is never removed
    pub children: HashMap<E::Action, Arc<ChanceNode<E, P>>>,
    pub store: P::DecisionStore,
}

impl<E: Environment, P: Planner<E>> DecisionNode<E, P> {
    pub fn new(
        manager: &Manager<E, P>,
        state: E::State,
        depth: usize,
        ctx: &TrialCtx,
    ) -> Result<Self> {
        let sink = manager.env().is_sink(&state, ctx)?;
        let actions = manager.env().valid_actions(&state, ctx)?;
        if !sink && actions.is_empty() {
            return Err(Error::env(format!(
                "no valid actions at non-sink state {:?}",
                state
            )));
        }
        Ok(Self {
            id: manager.next_id(),
            state,
            depth,
            sink,
            actions,
            inner: Mutex::new(DecisionInner {
                visits: 0,
                backups: 0,
                children: HashMap::new(),
                store: manager.planner().decision_store(),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn state(&self) -> &E::State {
        &self.state
    }
    pub fn depth(&self) -> usize {
        self.depth
    }
    pub fn is_sink(&self) -> bool {
        self.sink
    }
    /// the ordered action set, fixed at creation
    pub fn actions(&self) -> &[E::Action] {
        &self.actions
    }

    pub fn lock(&self) -> MutexGuard<DecisionInner<E, P>> {
        self.inner.lock().expect("decision node lock")
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

    pub fn child(&self, action: &E::Action) -> Option<Arc<ChanceNode<E, P>>> {
        self.lock().children.get(action).cloned()
    }

    /// an owned snapshot of the children map; the arcs stay valid
    /// without the lock because children are append-only
    pub fn children(&self) -> Vec<(E::Action, Arc<ChanceNode<E, P>>)> {
        self.lock()
            .children
            .iter()
            .map(|(a, c)| (a.clone(), c.clone()))
            .collect()
    }

    /// get or create the chance child for an action. the candidate
    /// is built outside the lock and double-checked under it, so at
    /// most one child ever exists per action.
    pub fn child_or_create(
        &self,
        action: &E::Action,
        manager: &Manager<E, P>,
        ctx: &TrialCtx,
    ) -> Result<Arc<ChanceNode<E, P>>> {
        if let Some(child) = self.child(action) {
            return Ok(child);
        }
        let candidate = Arc::new(ChanceNode::new(
            manager,
            self.state.clone(),
            action.clone(),
            self.depth,
            ctx,
        )?);
        let mut inner = self.lock();
        Ok(inner
            .children
            .entry(action.clone())
            .or_insert(candidate)
            .clone())
    }

    pub fn select_action(
        &self,
        manager: &Manager<E, P>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action> {
        manager.planner().select_action(self, trial)
    }

    pub fn recommend_action(
        &self,
        manager: &Manager<E, P>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action> {
        manager.planner().recommend_action(self, trial)
    }

    pub fn backup(
        &self,
        manager: &Manager<E, P>,
        backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        self.lock().backups += 1;
        manager.planner().backup_decision(self, backup, trial)
    }
}

impl<E: Environment, P: Planner<E>> std::fmt::Display for DecisionNode<E, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "D{}@{}", self.id, self.depth)
    }
}
