use super::czt;
use super::Planner;
use crate::env::Environment;
use crate::error::Result;
use crate::geometry::simplex::SimplexMap;
use crate::geometry::simplex::Triangulation;
use crate::geometry::value::Value;
use crate::geometry::weight::Weight;
use crate::search::chance::ChanceNode;
use crate::search::decision::DecisionNode;
use crate::search::trial::Backup;
use crate::search::trial::Trial;
use crate::Entropy;
use crate::Probability;
use crate::Scalar;
use crate::Utility;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;

/// simplex-map Boltzmann tree search. every node carries a simplex
/// map; selection softmax-samples over the scalarised vertex
/// estimates of the chance children, and backups write visit
/// weighted averages back into the maps.
#[derive(Debug, Clone)]
pub struct SmBts {
    pub dim: usize,
    pub temp: Scalar,
    pub epsilon: Probability,
    /// inverse square root temperature decay when set; the value is
    /// the visit scale of the decay
    pub temp_decay_scale: Option<Scalar>,
    pub default_value: Value,
    pub l_inf_thresh: Scalar,
    pub split_visit_thresh: u64,
    pub max_depth: u32,
    pub triangulation: Triangulation,
}

impl SmBts {
    /// pessimistic-default construction: unexplored weight regions
    /// report the environment's minimum value
    pub fn new(dim: usize, default_value: Value) -> Self {
        Self {
            dim,
            temp: crate::SMBTS_SEARCH_TEMP,
            epsilon: crate::SMBTS_EPSILON,
            temp_decay_scale: None,
            default_value,
            l_inf_thresh: crate::SM_L_INF_THRESH,
            split_visit_thresh: crate::SM_SPLIT_VISIT_THRESH,
            max_depth: crate::SM_MAX_DEPTH,
            triangulation: Triangulation::Barycentric,
        }
    }

    /// the search temperature after a number of visits
    pub fn search_temp(&self, visits: u64) -> Scalar {
        match self.temp_decay_scale {
            None => self.temp,
            Some(scale) => self.temp / (1. + visits as Scalar / scale).sqrt(),
        }
    }

    pub fn map(&self) -> SimplexMap {
        SimplexMap::new(
            self.dim,
            self.triangulation,
            &self.default_value,
            self.l_inf_thresh,
            self.split_visit_thresh,
            self.max_depth,
        )
    }
}

impl<E: Environment> Planner<E> for SmBts {
    type DecisionStore = SimplexMap;
    type ChanceStore = SimplexMap;

    fn decision_store(&self) -> SimplexMap {
        self.map()
    }
    fn chance_store(&self) -> SimplexMap {
        self.map()
    }

    fn select_action(&self, node: &DecisionNode<E, Self>, trial: &mut Trial<E>) -> Result<E::Action> {
        let stats = action_stats(node, &trial.ctx.weight, &self.default_value)?;
        let temp = self.search_temp(node.visits());
        let policy = boltzmann(&stats, &trial.ctx.weight, temp, self.epsilon, |_| 0.);
        sample_action(stats, policy, trial)
    }

    fn recommend_action(
        &self,
        node: &DecisionNode<E, Self>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action> {
        recommend_greedy(node, trial, &self.default_value)
    }

    /// pull the chance children's estimates together under this
    /// trial's weight, then write the average into our own map
    fn backup_decision(
        &self,
        node: &DecisionNode<E, Self>,
        _backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        let weight = trial.ctx.weight.clone();
        let (average, _) = children_average(node, &weight)?;
        node.lock().store.record(&weight, average, 0.)?;
        Ok(())
    }

    /// average the child decision estimates, add the local reward,
    /// write, and let the map subdivide and push
    fn backup_chance(
        &self,
        node: &ChanceNode<E, Self>,
        _backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()> {
        let weight = trial.ctx.weight.clone();
        let (mut average, _) = observations_average(node, &weight)?;
        average += node.local_reward();
        node.lock().store.record(&weight, average, 0.)?;
        Ok(())
    }
}

/// per-action view of the chance children under one weight
pub(crate) struct ActionStat<A> {
    pub action: A,
    pub q: Value,
    pub entropy: Entropy,
    pub visited: bool,
}

/// q estimates for every action: the value at the vertex closest to
/// the weight on the chance child's map, or the pessimistic default
/// where no backup has landed yet
pub(crate) fn action_stats<E, P>(
    node: &DecisionNode<E, P>,
    weight: &Weight,
    default: &Value,
) -> Result<Vec<ActionStat<E::Action>>>
where
    E: Environment,
    P: Planner<E, ChanceStore = SimplexMap>,
{
    node.actions()
        .iter()
        .map(|action| {
            let stat = match node.child(action) {
                Some(chance) => {
                    let inner = chance.lock();
                    match inner.backups {
                        0 => None,
                        _ => {
                            let (value, entropy) = inner.store.estimate(weight)?;
                            Some((value.clone(), entropy))
                        }
                    }
                }
                None => None,
            };
            Ok(match stat {
                Some((q, entropy)) => ActionStat { action: action.clone(), q, entropy, visited: true },
                None => ActionStat {
                    action: action.clone(),
                    q: default.clone(),
                    entropy: 0.,
                    visited: false,
                },
            })
        })
        .collect()
}

/// the softmax-with-exploration action distribution: weights
/// exp(<w, q>/T + bonus - C) normalised, then mixed with the uniform
/// distribution by epsilon
pub(crate) fn boltzmann<A>(
    stats: &[ActionStat<A>],
    weight: &Weight,
    temp: Scalar,
    epsilon: Probability,
    bonus: impl Fn(&ActionStat<A>) -> Scalar,
) -> Vec<Probability> {
    let scaled = stats
        .iter()
        .map(|s| weight.dot(&s.q) / temp + bonus(s))
        .collect::<Vec<_>>();
    let shift = scaled.iter().copied().fold(Scalar::NEG_INFINITY, Scalar::max);
    let exps = scaled.iter().map(|u| (u - shift).exp()).collect::<Vec<_>>();
    let total = exps.iter().sum::<Scalar>();
    let uniform = 1. / stats.len() as Probability;
    exps.into_iter()
        .map(|e| (1. - epsilon) * e / total + epsilon * uniform)
        .collect()
}

pub(crate) fn sample_action<E: Environment>(
    stats: Vec<ActionStat<E::Action>>,
    policy: Vec<Probability>,
    trial: &mut Trial<E>,
) -> Result<E::Action> {
    let index = WeightedIndex::new(&policy)
        .expect("softmax weights are positive")
        .sample(&mut trial.ctx.rng);
    Ok(stats.into_iter().nth(index).expect("sampled in range").action)
}

/// greedy scalarised recommendation over visited actions
pub(crate) fn recommend_greedy<E, P>(
    node: &DecisionNode<E, P>,
    trial: &mut Trial<E>,
    default: &Value,
) -> Result<E::Action>
where
    E: Environment,
    P: Planner<E, ChanceStore = SimplexMap>,
{
    let weight = trial.ctx.weight.clone();
    let scored = action_stats(node, &weight, default)?
        .into_iter()
        .filter(|s| s.visited)
        .map(|s| {
            let u: Utility = weight.dot(&s.q);
            (s.action, u)
        })
        .collect::<Vec<_>>();
    match scored.is_empty() {
        true => czt::fallback_action(node, trial),
        false => czt::pick_argmax(scored, trial),
    }
}

/// backup-count weighted average of the chance children's estimates
/// at this weight, with the mass that produced it
pub(crate) fn children_average<E, P>(
    node: &DecisionNode<E, P>,
    weight: &Weight,
) -> Result<(Value, Entropy)>
where
    E: Environment,
    P: Planner<E, ChanceStore = SimplexMap>,
{
    let dim = weight.dim();
    let mut average = Value::zeros(dim);
    let mut entropy = 0.;
    let mut mass = 0u64;
    for (_, chance) in node.children() {
        let snapshot = {
            let inner = chance.lock();
            match inner.backups {
                0 => None,
                backups => {
                    let (value, entropy) = inner.store.estimate(weight)?;
                    Some((value.clone(), entropy, backups))
                }
            }
        };
        if let Some((value, child_entropy, backups)) = snapshot {
            mass += backups;
            average.blend(&value, backups, mass);
            let kept = (mass - backups) as Scalar / mass as Scalar;
            entropy = entropy * kept + child_entropy * backups as Scalar / mass as Scalar;
        }
    }
    Ok((average, entropy))
}

/// same as children_average but one level down: over the decision
/// children of a chance node
pub(crate) fn observations_average<E, P>(
    node: &ChanceNode<E, P>,
    weight: &Weight,
) -> Result<(Value, Entropy)>
where
    E: Environment,
    P: Planner<E, DecisionStore = SimplexMap>,
{
    let dim = weight.dim();
    let mut average = Value::zeros(dim);
    let mut entropy = 0.;
    let mut mass = 0u64;
    for (_, child) in node.children() {
        let snapshot = {
            let inner = child.lock();
            match inner.backups {
                0 => None,
                backups => {
                    let (value, entropy) = inner.store.estimate(weight)?;
                    Some((value.clone(), entropy, backups))
                }
            }
        };
        if let Some((value, child_entropy, backups)) = snapshot {
            mass += backups;
            average.blend(&value, backups, mass);
            let kept = (mass - backups) as Scalar / mass as Scalar;
            entropy = entropy * kept + child_entropy * backups as Scalar / mass as Scalar;
        }
    }
    Ok((average, entropy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::walk::Walk;
    use crate::search::Manager;
    use crate::search::TrialPool;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn searched(bts: SmBts, walk: Walk, trials: usize) -> TrialPool<Walk, SmBts> {
        let manager = Arc::new(Manager::new(Arc::new(walk), bts, 60415, 50, 4));
        let root = manager.root().unwrap();
        let pool = TrialPool::new(manager, root);
        pool.run_trials(trials).unwrap();
        pool
    }

    #[test]
    fn four_objective_search_refines_the_root_simplex_map() {
        let mut bts = SmBts::new(4, Value::from(vec![-10., -10., 0., 0.]));
        bts.l_inf_thresh = 0.05;
        bts.max_depth = 40;
        let pool = searched(bts, Walk::new(10, 0., true), 10_000);
        let map = {
            let inner = pool.root().lock();
            inner.store.clone()
        };
        assert!(map.subdivisions() >= 1);
        assert!(map.subdivisions() <= (1usize << 40) - 1);
        for ngv in map.ngvs() {
            assert!(ngv.value.dim() == 4);
        }
    }

    #[test]
    fn greedy_recommendation_tracks_the_weighted_objective() {
        let mut bts = SmBts::new(2, Value::from(vec![-10., -10.]));
        bts.epsilon = 0.1;
        let pool = searched(bts, Walk::new(5, 0., false), 10_000);
        let manager = pool.manager().clone();
        let mut rng = rand::rngs::SmallRng::seed_from_u64(3);
        let mut ctx = manager.sample_context(0, &mut rng).unwrap();
        ctx.weight = Weight::from(vec![1., 0.]);
        let mut trial = Trial::new(ctx);
        let action = pool.root().recommend_action(&manager, &mut trial).unwrap();
        assert!(pool.root().actions().contains(&action));
        assert!(action == crate::env::walk::Step::Right);
    }

    #[test]
    fn maps_tile_the_simplex_at_every_searched_node() {
        let mut bts = SmBts::new(2, Value::from(vec![-10., -10.]));
        bts.triangulation = Triangulation::BinaryTree;
        let pool = searched(bts, Walk::new(4, 0., false), 2_000);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(4);
        let map = {
            let inner = pool.root().lock();
            inner.store.clone()
        };
        for _ in 0..50 {
            let w = Weight::sample(2, &mut rng);
            assert!(map.leaf(&w).is_ok());
        }
    }

    #[test]
    fn undecayed_temperature_is_constant() {
        let bts = SmBts::new(2, Value::zeros(2));
        assert!(bts.search_temp(0) == bts.temp);
        assert!(bts.search_temp(10_000) == bts.temp);
    }

    #[test]
    fn decayed_temperature_starts_at_the_initial_value() {
        let mut bts = SmBts::new(2, Value::zeros(2));
        bts.temp_decay_scale = Some(1.);
        assert!((bts.search_temp(0) - bts.temp).abs() < 1e-12);
        assert!(bts.search_temp(100) < bts.temp);
        assert!((bts.search_temp(3) - bts.temp / 2.).abs() < 1e-12);
    }

    #[test]
    fn boltzmann_mixes_toward_uniform_with_epsilon() {
        let stats = vec![
            ActionStat { action: 0u8, q: Value::from(vec![10., 10.]), entropy: 0., visited: true },
            ActionStat { action: 1u8, q: Value::from(vec![0., 0.]), entropy: 0., visited: true },
        ];
        let w = Weight::from(vec![0.5, 0.5]);
        let sharp = boltzmann(&stats, &w, 0.1, 0., |_| 0.);
        assert!(sharp[0] > 0.999);
        let mixed = boltzmann(&stats, &w, 0.1, 1., |_| 0.);
        assert!((mixed[0] - 0.5).abs() < 1e-9);
        let policy = boltzmann(&stats, &w, 1., 0.5, |_| 0.);
        assert!((policy.iter().sum::<Probability>() - 1.).abs() < 1e-9);
        assert!(policy[1] >= 0.25 - 1e-9);
    }
}
