use super::smbts;
use super::smbts::SmBts;
use super::Planner;
use crate::env::Environment;
use crate::error::Result;
use crate::geometry::simplex::SimplexMap;
use crate::search::chance::ChanceNode;
use crate::search::decision::DecisionNode;
use crate::search::trial::Backup;
use crate::search::trial::Trial;
use crate::Entropy;
use crate::Probability;
use crate::Scalar;

/// simplex-map DENTS: Boltzmann tree search with a decaying entropy
/// bonus. vertices additionally carry entropy estimates, and
/// selection rewards actions whose subtrees are still uncertain,
/// with the reward fading as the node accumulates visits.
#[derive(Debug, Clone)]
pub struct SmDents {
    pub bts: SmBts,
    pub entropy_temp_init: Scalar,
    pub entropy_temp_visits_scale: Scalar,
}

impl SmDents {
    pub fn new(bts: SmBts) -> Self {
        Self {
            bts,
            entropy_temp_init: crate::SMDENTS_ENTROPY_TEMP_INIT,
            entropy_temp_visits_scale: crate::SMDENTS_ENTROPY_TEMP_VISITS_SCALE,
        }
    }

    /// the entropy bonus coefficient after a number of visits,
    /// decaying logarithmically from its initial value
    pub fn entropy_temp(&self, visits: u64) -> Scalar {
        self.entropy_temp_init
            / ((1. + visits as Scalar / self.entropy_temp_visits_scale).ln() + 1.)
    }
}

impl<E: Environment> Planner<E> for SmDents {
    type DecisionStore = SimplexMap;
    type ChanceStore = SimplexMap;

    fn decision_store(&self) -> SimplexMap {
        self.bts.map()
    }
    fn chance_store(&self) -> SimplexMap {
        self.bts.map()
    }

    fn select_action(&self, node: &DecisionNode<E, Self>, trial: &mut Trial<E>) -> Result<E::Action> {
        let stats = smbts::action_stats(node, &trial.ctx.weight, &self.bts.default_value)?;
        let temp = self.bts.search_temp(node.visits());
        let tau = self.entropy_temp(node.visits());
        let policy = smbts::boltzmann(&stats, &trial.ctx.weight, temp, self.bts.epsilon, |s| {
            tau * s.entropy
        });
        smbts::sample_action(stats, policy, trial)
    }

    fn recommend_action(
        &self,
        node: &DecisionNode<E, Self>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action> {
        smbts::recommend_greedy(node, trial, &self.bts.default_value)
    }

    /// value backup as in plain Boltzmann search; the entropy
    /// estimate becomes the entropy of the current action
    /// distribution plus the policy-weighted child entropies
    fn backup_decision(
        &self,
        node: &DecisionNode<E, Self>,
        _backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        let weight = trial.ctx.weight.clone();
        let (average, _) = smbts::children_average(node, &weight)?;
        let stats = smbts::action_stats(node, &weight, &self.bts.default_value)?;
        let temp = self.bts.search_temp(node.visits());
        let tau = self.entropy_temp(node.visits());
        let policy = smbts::boltzmann(&stats, &weight, temp, self.bts.epsilon, |s| tau * s.entropy);
        let entropy = policy_entropy(&policy)
            + policy
                .iter()
                .zip(stats.iter())
                .map(|(p, s)| p * s.entropy)
                .sum::<Entropy>();
        node.lock().store.record(&weight, average, entropy)?;
        Ok(())
    }

    /// like the value backup one level down, carrying the backup
    /// weighted average of the child entropies alongside
    fn backup_chance(
        &self,
        node: &ChanceNode<E, Self>,
        _backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        let weight = trial.ctx.weight.clone();
        let (mut average, entropy) = smbts::observations_average(node, &weight)?;
        average += node.local_reward();
        node.lock().store.record(&weight, average, entropy)?;
        Ok(())
    }
}

/// shannon entropy of a distribution, in nats
fn policy_entropy(policy: &[Probability]) -> Entropy {
    policy
        .iter()
        .filter(|p| **p > 0.)
        .map(|p| -p * p.ln())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::walk::Walk;
    use crate::geometry::value::Value;
    use crate::search::Manager;
    use crate::search::TrialPool;
    use rand::SeedableRng;
    use std::sync::Arc;

    #[test]
    fn entropy_estimates_stay_bounded_and_non_negative() {
        let mut dents = SmDents::new(SmBts::new(2, Value::from(vec![-10., -10.])));
        dents.bts.epsilon = 0.1;
        let manager = Arc::new(Manager::new(
            Arc::new(Walk::new(5, 0., false)),
            dents,
            60415,
            50,
            4,
        ));
        let root = manager.root().unwrap();
        let pool = TrialPool::new(manager.clone(), root);
        pool.run_trials(5_000).unwrap();
        let map = {
            let inner = pool.root().lock();
            inner.store.clone()
        };
        // a five-step walk over two actions can carry at most
        // 5 ln 2 nats of policy entropy through the backup
        for ngv in map.ngvs() {
            assert!(ngv.entropy.is_finite());
            assert!(ngv.entropy >= 0.);
            assert!(ngv.entropy <= 5. * (2. as Scalar).ln() + 1.);
        }
        // and the recommendation it produces is a legal action
        let mut rng = rand::rngs::SmallRng::seed_from_u64(8);
        let ctx = manager.sample_context(0, &mut rng).unwrap();
        let mut trial = crate::search::Trial::new(ctx);
        let action = pool.root().recommend_action(&manager, &mut trial).unwrap();
        assert!(pool.root().actions().contains(&action));
    }

    #[test]
    fn entropy_temperature_decays_from_its_initial_value() {
        let dents = SmDents::new(SmBts::new(2, Value::zeros(2)));
        assert!((dents.entropy_temp(0) - dents.entropy_temp_init).abs() < 1e-12);
        assert!(dents.entropy_temp(10) < dents.entropy_temp(1));
        assert!(dents.entropy_temp(1_000_000) > 0.);
    }

    #[test]
    fn uniform_policies_have_maximal_entropy() {
        let uniform = policy_entropy(&[0.25; 4]);
        let sharp = policy_entropy(&[1., 0., 0., 0.]);
        assert!((uniform - (4. as Scalar).ln()).abs() < 1e-12);
        assert!(sharp == 0.);
    }
}
