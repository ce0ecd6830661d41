use super::czt;
use super::czt::Czt;
use super::Planner;
use crate::env::Environment;
use crate::error::Result;
use crate::geometry::ball::BallPartition;
use crate::geometry::hull::Hull;
use crate::geometry::value::Value;
use crate::search::chance::ChanceNode;
use crate::search::decision::DecisionNode;
use crate::search::trial::Backup;
use crate::search::trial::Trial;

/// chance-side store of convex hull search: the zooming partition
/// that drives selection plus the Pareto front that backs
/// recommendation, updated side by side
pub struct ChanceFront<E: Environment> {
    pub partition: BallPartition,
    pub front: Hull<E::State>,
}

/// convex hull MCTS. runs the Chebyshev-zoom selection rule
/// unchanged and additionally maintains convex-hull stores so the
/// final recommendation can answer any scalarising weight from the
/// Pareto front rather than from a single ball.
///
/// transposition tables are rejected at configuration time: sharing
/// nodes between the zoom-only view and the hull-augmented view
/// would lose the hull information.
pub struct Chmcts {
    czt: Czt,
}

impl Chmcts {
    pub fn new(czt: Czt) -> Self {
        Self { czt }
    }
}

impl<E: Environment> Planner<E> for Chmcts {
    type DecisionStore = Hull<E::Action>;
    type ChanceStore = ChanceFront<E>;

    fn decision_store(&self) -> Hull<E::Action> {
        Hull::new(self.czt.dim())
    }

    fn chance_store(&self) -> ChanceFront<E> {
        ChanceFront {
            partition: self.czt.partition(),
            front: Hull::new(self.czt.dim()),
        }
    }

    fn select_action(&self, node: &DecisionNode<E, Self>, trial: &mut Trial<E>) -> Result<E::Action> {
        czt::select_ucb(node, trial, self.czt.bias(), |store| &store.partition)
    }

    /// recommendation queries the hull at the context weight
    fn recommend_action(
        &self,
        node: &DecisionNode<E, Self>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action> {
        let weight = trial.ctx.weight.clone();
        let best = node.lock().store.best(&weight).cloned();
        match best {
            Some(action) => Ok(action),
            None => czt::fallback_action(node, trial),
        }
    }

    /// the zoom backup feeds selection; the hull backup rebuilds
    /// this node's front as the pruned union of its children's
    /// fronts, retagged by the action that leads to them
    fn backup_decision(
        &self,
        node: &DecisionNode<E, Self>,
        backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        czt::backup_active_ball(node, backup, trial, |store| &mut store.partition)?;
        let mut front = Hull::new(self.czt.dim());
        for (action, chance) in node.children() {
            let snapshot = {
                let inner = chance.lock();
                match inner.backups {
                    0 => continue,
                    _ => inner.store.front.clone(),
                }
            };
            front.union(&snapshot.retagged(&action))?;
        }
        node.lock().store = front;
        Ok(())
    }

    /// the chance front is the pruned union of the child fronts
    /// shifted by the local reward. a child that has backed up but
    /// holds no points yet (a sink) contributes the zero return.
    fn backup_chance(
        &self,
        node: &ChanceNode<E, Self>,
        _backup: &Backup,
        _trial: &mut Trial<E>,
    ) -> Result<()> {
        let mut merged: Hull<E::State> = Hull::new(self.czt.dim());
        for (state, child) in node.children() {
            let snapshot = {
                let inner = child.lock();
                match inner.backups {
                    0 => continue,
                    _ => inner.store.clone(),
                }
            };
            match snapshot.is_empty() {
                true => merged.insert(Value::zeros(self.czt.dim()), state)?,
                false => merged.union(&snapshot.retagged(&state))?,
            }
        }
        let front = merged.translate(node.local_reward());
        node.lock().store.front = front;
        Ok(())
    }
}
