use super::context::TrialCtx;
use super::environment::Environment;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::Probability;
use crate::Scalar;
use rand::Rng;

/// the two moves of the diagonal walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Right,
    Down,
}

impl Step {
    fn objective(&self) -> usize {
        match self {
            Self::Right => 0,
            Self::Down => 1,
        }
    }
}

/// position on the walk plus the direction taken last, which the
/// reward shaping looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalkState {
    pub x: u32,
    pub y: u32,
    pub last: Option<Step>,
}

/// a small diagonal walk with one objective per direction. each move
/// costs a step on both objectives and earns a direction bonus,
/// larger when the direction changes. the walk ends after a fixed
/// number of effective moves. an optional stay probability makes
/// transitions stochastic, and an optional pair of discounted bonus
/// objectives widens the reward to four dimensions.
#[derive(Debug, Clone)]
pub struct Walk {
    walk_len: u32,
    stay_prob: Probability,
    extra_rewards: bool,
    new_dir_bonus: Scalar,
    same_dir_bonus: Scalar,
    gamma: Scalar,
}

impl Walk {
    pub fn new(walk_len: u32, stay_prob: Probability, extra_rewards: bool) -> Self {
        Self {
            walk_len,
            stay_prob,
            extra_rewards,
            new_dir_bonus: 0.5,
            same_dir_bonus: 0.3,
            gamma: 0.5,
        }
    }

    pub fn walk_len(&self) -> u32 {
        self.walk_len
    }

    fn advance(&self, state: &WalkState, action: &Step, stay: bool) -> WalkState {
        let mut next = *state;
        if !stay {
            match action {
                Step::Right => next.x += 1,
                Step::Down => next.y += 1,
            }
        }
        next.last = Some(*action);
        next
    }

    fn done(&self, state: &WalkState) -> bool {
        state.x + state.y == self.walk_len
    }
}

impl Environment for Walk {
    type State = WalkState;
    type Action = Step;

    fn reward_dim(&self) -> usize {
        if self.extra_rewards {
            4
        } else {
            2
        }
    }

    fn initial_state(&self) -> Result<WalkState> {
        Ok(WalkState { x: 0, y: 0, last: None })
    }

    fn is_sink(&self, state: &WalkState, _: &TrialCtx) -> Result<bool> {
        Ok(self.done(state))
    }

    fn valid_actions(&self, state: &WalkState, _: &TrialCtx) -> Result<Vec<Step>> {
        if self.done(state) {
            Ok(vec![])
        } else {
            Ok(vec![Step::Right, Step::Down])
        }
    }

    fn transition_distribution(
        &self,
        state: &WalkState,
        action: &Step,
        _: &TrialCtx,
    ) -> Result<Option<Vec<(WalkState, Probability)>>> {
        let mut distribution = vec![(self.advance(state, action, false), 1. - self.stay_prob)];
        if self.stay_prob > 0. {
            distribution.push((self.advance(state, action, true), self.stay_prob));
        }
        Ok(Some(distribution))
    }

    fn sample_transition(
        &self,
        state: &WalkState,
        action: &Step,
        ctx: &mut TrialCtx,
    ) -> Result<WalkState> {
        let stay = self.stay_prob > 0. && ctx.rng.random::<Probability>() < self.stay_prob;
        Ok(self.advance(state, action, stay))
    }

    fn mo_reward(&self, state: &WalkState, action: &Step, _: &TrialCtx) -> Result<Value> {
        let mut reward = vec![-1., -1.];
        if self.extra_rewards {
            reward.extend([0., 0.]);
        }
        reward[action.objective()] += match state.last {
            Some(last) if last == *action => self.same_dir_bonus,
            _ => self.new_dir_bonus,
        };
        if self.extra_rewards {
            match action {
                Step::Right => reward[2] = self.gamma.powi(state.x as i32),
                Step::Down => reward[3] = self.gamma.powi(state.y as i32),
            }
        }
        Ok(Value::from(reward))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn ctx(dim: usize) -> TrialCtx {
        let mut rng = SmallRng::seed_from_u64(0);
        TrialCtx::new(0, crate::geometry::weight::Weight::centroid(dim), &mut rng)
    }

    #[test]
    fn walk_terminates_after_walk_len_moves() {
        let walk = Walk::new(3, 0., false);
        let mut ctx = ctx(2);
        let mut state = walk.initial_state().unwrap();
        for _ in 0..3 {
            assert!(!walk.is_sink(&state, &ctx).unwrap());
            state = walk.sample_transition(&state, &Step::Right, &mut ctx).unwrap();
        }
        assert!(walk.is_sink(&state, &ctx).unwrap());
        assert!(walk.valid_actions(&state, &ctx).unwrap().is_empty());
    }

    #[test]
    fn changing_direction_earns_the_larger_bonus() {
        let walk = Walk::new(5, 0., false);
        let ctx = ctx(2);
        let fresh = WalkState { x: 1, y: 0, last: Some(Step::Right) };
        let switch = walk.mo_reward(&fresh, &Step::Down, &ctx).unwrap();
        let repeat = walk.mo_reward(&fresh, &Step::Right, &ctx).unwrap();
        assert!((switch.components()[1] - -0.5).abs() < 1e-12);
        assert!((repeat.components()[0] - -0.7).abs() < 1e-12);
    }

    #[test]
    fn extra_rewards_widen_to_four_objectives() {
        let walk = Walk::new(5, 0., true);
        let ctx = ctx(4);
        assert!(walk.reward_dim() == 4);
        let state = WalkState { x: 2, y: 0, last: None };
        let reward = walk.mo_reward(&state, &Step::Right, &ctx).unwrap();
        assert!(reward.dim() == 4);
        assert!((reward.components()[2] - 0.25).abs() < 1e-12);
        assert!(reward.components()[3] == 0.);
    }

    #[test]
    fn stochastic_walks_can_stay_in_place() {
        let walk = Walk::new(5, 0.25, false);
        let mut ctx = ctx(2);
        let state = walk.initial_state().unwrap();
        let mut stayed = 0;
        for _ in 0..200 {
            let next = walk.sample_transition(&state, &Step::Right, &mut ctx).unwrap();
            if next.x == 0 {
                stayed += 1;
            }
        }
        assert!(stayed > 10);
        assert!(stayed < 120);
        let distribution = walk
            .transition_distribution(&state, &Step::Right, &ctx)
            .unwrap()
            .unwrap();
        assert!(distribution.len() == 2);
        assert!((distribution.iter().map(|(_, p)| p).sum::<Probability>() - 1.).abs() < 1e-12);
    }
}
