use super::context::TrialCtx;
use super::environment::Environment;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::Scalar;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

const OBJECTIVES: usize = 6;

/// a full binary tree of depth `depth`. descending left or right is
/// free; the leaf reached pays a six-objective fruit vector with
/// components in [0, 10]. fruits are fixed at construction from a
/// seed so every trial sees the same tree.
#[derive(Debug, Clone)]
pub struct FruitTree {
    depth: u32,
    fruits: Vec<Value>,
}

/// position in the tree: level and index within the level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Branch {
    pub level: u32,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fork {
    Left,
    Right,
}

impl FruitTree {
    pub fn new(depth: u32, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        let fruits = (0..1u32 << depth)
            .map(|_| {
                Value::from(
                    (0..OBJECTIVES)
                        .map(|_| rng.random::<Scalar>() * 10.)
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        Self { depth, fruits }
    }

    fn fruit(&self, leaf: &Branch) -> &Value {
        &self.fruits[leaf.index as usize]
    }
}

impl Environment for FruitTree {
    type State = Branch;
    type Action = Fork;

    fn reward_dim(&self) -> usize {
        OBJECTIVES
    }

    fn initial_state(&self) -> Result<Branch> {
        Ok(Branch { level: 0, index: 0 })
    }

    fn is_sink(&self, state: &Branch, _: &TrialCtx) -> Result<bool> {
        Ok(state.level == self.depth)
    }

    fn valid_actions(&self, state: &Branch, _: &TrialCtx) -> Result<Vec<Fork>> {
        if state.level == self.depth {
            Ok(vec![])
        } else {
            Ok(vec![Fork::Left, Fork::Right])
        }
    }

    fn transition_distribution(
        &self,
        state: &Branch,
        action: &Fork,
        _: &TrialCtx,
    ) -> Result<Option<Vec<(Branch, crate::Probability)>>> {
        Ok(Some(vec![(step(state, action), 1.)]))
    }

    fn sample_transition(&self, state: &Branch, action: &Fork, _: &mut TrialCtx) -> Result<Branch> {
        Ok(step(state, action))
    }

    fn mo_reward(&self, state: &Branch, action: &Fork, _: &TrialCtx) -> Result<Value> {
        let landed = step(state, action);
        if landed.level == self.depth {
            Ok(self.fruit(&landed).clone())
        } else {
            Ok(Value::zeros(OBJECTIVES))
        }
    }
}

fn step(state: &Branch, action: &Fork) -> Branch {
    Branch {
        level: state.level + 1,
        index: state.index * 2
            + match action {
                Fork::Left => 0,
                Fork::Right => 1,
            },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::weight::Weight;

    fn ctx() -> TrialCtx {
        let mut rng = SmallRng::seed_from_u64(0);
        TrialCtx::new(0, Weight::centroid(OBJECTIVES), &mut rng)
    }

    #[test]
    fn the_tree_pays_out_only_at_its_leaves() {
        let tree = FruitTree::new(3, 7);
        let mut ctx = ctx();
        let mut state = tree.initial_state().unwrap();
        for level in 0..3 {
            assert!(!tree.is_sink(&state, &ctx).unwrap());
            let reward = tree.mo_reward(&state, &Fork::Right, &ctx).unwrap();
            match level {
                2 => assert!(reward.components().iter().any(|x| *x > 0.)),
                _ => assert!(reward == Value::zeros(OBJECTIVES)),
            }
            state = tree.sample_transition(&state, &Fork::Right, &mut ctx).unwrap();
        }
        assert!(tree.is_sink(&state, &ctx).unwrap());
        assert!(state.index == 7);
    }

    #[test]
    fn fruits_are_stable_across_constructions_with_one_seed() {
        let a = FruitTree::new(4, 99);
        let b = FruitTree::new(4, 99);
        let ctx = ctx();
        let leaf = Branch { level: 3, index: 5 };
        let ra = a.mo_reward(&leaf, &Fork::Left, &ctx).unwrap();
        let rb = b.mo_reward(&leaf, &Fork::Left, &ctx).unwrap();
        assert!(ra == rb);
        assert!(ra.dim() == 6);
        assert!(ra.components().iter().all(|x| (0. ..=10.).contains(x)));
    }
}
