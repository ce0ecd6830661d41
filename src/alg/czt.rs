use super::Planner;
use crate::env::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::ball::BallPartition;
use crate::search::chance::ChanceNode;
use crate::search::decision::DecisionNode;
use crate::search::trial::Backup;
use crate::search::trial::Trial;
use crate::Scalar;
use crate::Utility;
use rand::Rng;

/// Chebyshev-zoom trees. each chance node carries a ball partition
/// of weight space; selection is UCB over the active ball under the
/// trial's weight, and backups zoom the partition onto the weights
/// the trials actually carry.
#[derive(Debug, Clone)]
pub struct Czt {
    dim: usize,
    bias: Scalar,
    ball_split_visit_thresh: u64,
}

impl Czt {
    pub fn new(dim: usize, bias: Scalar, ball_split_visit_thresh: u64) -> Self {
        Self { dim, bias, ball_split_visit_thresh }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
    pub fn bias(&self) -> Scalar {
        self.bias
    }
    pub fn partition(&self) -> BallPartition {
        BallPartition::new(self.dim, self.ball_split_visit_thresh)
    }
}

impl<E: Environment> Planner<E> for Czt {
    type DecisionStore = ();
    type ChanceStore = BallPartition;

    fn decision_store(&self) {}

    fn chance_store(&self) -> BallPartition {
        self.partition()
    }

    fn select_action(&self, node: &DecisionNode<E, Self>, trial: &mut Trial<E>) -> Result<E::Action> {
        select_ucb(node, trial, self.bias, |store| store)
    }

    fn recommend_action(
        &self,
        node: &DecisionNode<E, Self>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action> {
        recommend_greedy(node, trial, |store| store)
    }

    fn backup_decision(
        &self,
        node: &DecisionNode<E, Self>,
        backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        backup_active_ball(node, backup, trial, |store| store)
    }

    /// the partition is updated from the decision side; the chance
    /// node only advances its counters
    fn backup_chance(
        &self,
        _node: &ChanceNode<E, Self>,
        _backup: &Backup,
        _trial: &mut Trial<E>,
    ) -> Result<()> {
        Ok(())
    }
}

/// UCB over active balls. actions without a visited ball count as
/// infinitely promising; ties break uniformly at random. records the
/// chosen action in the trial scratch for the matching backup.
pub(crate) fn select_ucb<E, P, F>(
    node: &DecisionNode<E, P>,
    trial: &mut Trial<E>,
    bias: Scalar,
    partition: F,
) -> Result<E::Action>
where
    E: Environment,
    P: Planner<E>,
    F: Fn(&P::ChanceStore) -> &BallPartition,
{
    let weight = trial.ctx.weight.clone();
    let explore = (node.visits().max(1) as Scalar).ln();
    let mut unvisited = Vec::new();
    let mut scored: Vec<(E::Action, Utility)> = Vec::new();
    for action in node.actions() {
        match node.child(action) {
            None => unvisited.push(action.clone()),
            Some(chance) => {
                let inner = chance.lock();
                let store = partition(&inner.store);
                let ball = store.ball(store.active_index(&weight)?);
                match ball.visits {
                    0 => unvisited.push(action.clone()),
                    n => {
                        let ucb = weight.dot(&ball.value) + bias * (explore / n as Scalar).sqrt();
                        scored.push((action.clone(), ucb));
                    }
                }
            }
        }
    }
    let chosen = match unvisited.is_empty() {
        false => unvisited.swap_remove(trial.ctx.rng.random_range(0..unvisited.len())),
        true => pick_argmax(scored, trial)?,
    };
    trial.note_selection(node.id(), chosen.clone());
    Ok(chosen)
}

/// greedy scalarised recommendation over active balls; an unsearched
/// node falls back to a uniformly random valid action
pub(crate) fn recommend_greedy<E, P, F>(
    node: &DecisionNode<E, P>,
    trial: &mut Trial<E>,
    partition: F,
) -> Result<E::Action>
where
    E: Environment,
    P: Planner<E>,
    F: Fn(&P::ChanceStore) -> &BallPartition,
{
    let weight = trial.ctx.weight.clone();
    let mut scored: Vec<(E::Action, Utility)> = Vec::new();
    for action in node.actions() {
        if let Some(chance) = node.child(action) {
            let inner = chance.lock();
            let store = partition(&inner.store);
            let ball = store.ball(store.active_index(&weight)?);
            if ball.visits > 0 {
                scored.push((action.clone(), weight.dot(&ball.value)));
            }
        }
    }
    match scored.is_empty() {
        true => fallback_action(node, trial),
        false => pick_argmax(scored, trial),
    }
}

/// fold the return below the node into the active ball of the chance
/// child the trial actually selected
pub(crate) fn backup_active_ball<E, P, F>(
    node: &DecisionNode<E, P>,
    backup: &Backup,
    trial: &mut Trial<E>,
    partition: F,
) -> Result<()>
where
    E: Environment,
    P: Planner<E>,
    F: Fn(&mut P::ChanceStore) -> &mut BallPartition,
{
    let Some(action) = trial.selection(node.id()).cloned() else {
        // sink and depth-limit leaves select nothing
        return Ok(());
    };
    let chance = node
        .child(&action)
        .ok_or_else(|| Error::invariant("selected action has no chance child"))?;
    let mut inner = chance.lock();
    partition(&mut inner.store).observe(&trial.ctx.weight, backup.cumulative_after)?;
    Ok(())
}

pub(crate) fn pick_argmax<E: Environment>(
    scored: Vec<(E::Action, Utility)>,
    trial: &mut Trial<E>,
) -> Result<E::Action> {
    let best = scored
        .iter()
        .map(|(_, u)| *u)
        .fold(Utility::NEG_INFINITY, Utility::max);
    let mut ties = scored
        .into_iter()
        .filter(|(_, u)| *u >= best - 1e-12)
        .map(|(a, _)| a)
        .collect::<Vec<_>>();
    match ties.is_empty() {
        true => Err(Error::invariant("argmax over no scored actions")),
        false => Ok(ties.swap_remove(trial.ctx.rng.random_range(0..ties.len()))),
    }
}

pub(crate) fn fallback_action<E, P>(
    node: &DecisionNode<E, P>,
    trial: &mut Trial<E>,
) -> Result<E::Action>
where
    E: Environment,
    P: Planner<E>,
{
    let actions = node.actions();
    match actions.is_empty() {
        true => Err(Error::invariant("recommendation requested at a sink node")),
        false => Ok(actions[trial.ctx.rng.random_range(0..actions.len())].clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::walk::Step;
    use crate::env::walk::Walk;
    use crate::search::Manager;
    use crate::search::TrialPool;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn manager() -> Arc<Manager<Walk, Czt>> {
        Arc::new(Manager::new(
            Arc::new(Walk::new(3, 0., false)),
            Czt::new(2, 4., 10),
            17,
            50,
            1,
        ))
    }

    #[test]
    fn selection_tries_every_action_before_exploiting() {
        let manager = manager();
        let root = manager.root().unwrap();
        let pool = TrialPool::new(manager.clone(), root.clone());
        pool.run_trials(2).unwrap();
        // with two actions and infinite UCB on the unvisited one,
        // two trials must have opened both chance children
        assert!(root.children().len() == 2);
    }

    #[test]
    fn selection_leaves_a_record_for_the_backup() {
        let manager = manager();
        let root = manager.root().unwrap();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(0);
        let ctx = manager.sample_context(0, &mut rng).unwrap();
        let mut trial = Trial::new(ctx);
        root.visit();
        let action = root.select_action(&manager, &mut trial).unwrap();
        assert!(root.actions().contains(&action));
        assert!(trial.selection(root.id()) == Some(&action));
    }

    #[test]
    fn backups_move_the_active_ball_value() {
        let manager = manager();
        let root = manager.root().unwrap();
        let pool = TrialPool::new(manager.clone(), root.clone());
        pool.run_trials(200).unwrap();
        for (_, chance) in root.children() {
            let inner = chance.lock();
            assert!(inner.store.iter().map(|b| b.visits).sum::<u64>() > 0);
            // every searched ball carries a finite estimate
            assert!(inner
                .store
                .iter()
                .all(|b| b.value.components().iter().all(|x| x.is_finite())));
        }
    }

    #[test]
    fn unsearched_nodes_recommend_any_legal_action() {
        let manager = manager();
        let root = manager.root().unwrap();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(1);
        let ctx = manager.sample_context(0, &mut rng).unwrap();
        let mut trial = Trial::new(ctx);
        let action = root.recommend_action(&manager, &mut trial).unwrap();
        assert!(matches!(action, Step::Right | Step::Down));
    }
}
