use super::context::TrialCtx;
use super::environment::Environment;
use crate::error::Result;
use crate::geometry::value::Value;
use crate::Scalar;

/// treasure values per column, each sitting at the seabed depth of
/// its column. further columns hold richer treasure.
const TREASURE: [Scalar; 10] = [0.7, 8.2, 11.5, 14.0, 15.1, 16.1, 19.6, 20.3, 22.4, 23.7];
const DEPTH: [u32; 10] = [1, 2, 3, 4, 4, 4, 7, 7, 9, 10];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dive {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

/// the deep sea treasure grid. a submarine starts at the surface and
/// trades treasure value against time: every move costs one unit of
/// the second objective, and reaching a treasure cell ends the
/// episode with that column's value on the first objective.
#[derive(Debug, Clone, Default)]
pub struct DeepSeaTreasure;

impl DeepSeaTreasure {
    /// the richest treasure on the grid
    pub fn max_treasure() -> Scalar {
        TREASURE[9]
    }

    fn accessible(cell: &Cell) -> bool {
        (cell.x as usize) < DEPTH.len() && cell.y <= DEPTH[cell.x as usize]
    }

    fn treasure(cell: &Cell) -> Option<Scalar> {
        (cell.y == DEPTH[cell.x as usize]).then(|| TREASURE[cell.x as usize])
    }

    fn steer(cell: &Cell, action: &Dive) -> Cell {
        let (dx, dy) = match action {
            Dive::Up => (0, -1),
            Dive::Down => (0, 1),
            Dive::Left => (-1, 0),
            Dive::Right => (1, 0),
        };
        let candidate = Cell {
            x: cell.x.saturating_add_signed(dx).min(DEPTH.len() as u32 - 1),
            y: cell.y.saturating_add_signed(dy).min(10),
        };
        if Self::accessible(&candidate) {
            candidate
        } else {
            *cell
        }
    }
}

impl Environment for DeepSeaTreasure {
    type State = Cell;
    type Action = Dive;

    fn reward_dim(&self) -> usize {
        2
    }

    fn initial_state(&self) -> Result<Cell> {
        Ok(Cell { x: 0, y: 0 })
    }

    fn is_sink(&self, state: &Cell, _: &TrialCtx) -> Result<bool> {
        Ok(Self::treasure(state).is_some())
    }

    fn valid_actions(&self, state: &Cell, _: &TrialCtx) -> Result<Vec<Dive>> {
        if Self::treasure(state).is_some() {
            Ok(vec![])
        } else {
            Ok(vec![Dive::Up, Dive::Down, Dive::Left, Dive::Right])
        }
    }

    fn transition_distribution(
        &self,
        state: &Cell,
        action: &Dive,
        _: &TrialCtx,
    ) -> Result<Option<Vec<(Cell, crate::Probability)>>> {
        Ok(Some(vec![(Self::steer(state, action), 1.)]))
    }

    fn sample_transition(&self, state: &Cell, action: &Dive, _: &mut TrialCtx) -> Result<Cell> {
        Ok(Self::steer(state, action))
    }

    fn mo_reward(&self, state: &Cell, action: &Dive, _: &TrialCtx) -> Result<Value> {
        let landed = Self::steer(state, action);
        let treasure = Self::treasure(&landed).unwrap_or(0.);
        Ok(Value::from(vec![treasure, -1.]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn ctx() -> TrialCtx {
        let mut rng = SmallRng::seed_from_u64(0);
        TrialCtx::new(0, crate::geometry::weight::Weight::centroid(2), &mut rng)
    }

    #[test]
    fn the_first_treasure_is_one_dive_down() {
        let env = DeepSeaTreasure;
        let mut ctx = ctx();
        let start = env.initial_state().unwrap();
        let down = env.sample_transition(&start, &Dive::Down, &mut ctx).unwrap();
        assert!(env.is_sink(&down, &ctx).unwrap());
        let reward = env.mo_reward(&start, &Dive::Down, &ctx).unwrap();
        assert!((reward.components()[0] - 0.7).abs() < 1e-12);
        assert!((reward.components()[1] - -1.).abs() < 1e-12);
    }

    #[test]
    fn the_seabed_blocks_movement() {
        let env = DeepSeaTreasure;
        let mut ctx = ctx();
        // column 5 bottoms out at depth 4, so (5, 5) is seabed
        let at = Cell { x: 6, y: 5 };
        assert!(!env.is_sink(&at, &ctx).unwrap());
        let blocked = env.sample_transition(&at, &Dive::Left, &mut ctx).unwrap();
        assert!(blocked == at);
        let up = env.sample_transition(&at, &Dive::Up, &mut ctx).unwrap();
        assert!(up == Cell { x: 6, y: 4 });
    }

    #[test]
    fn every_column_ends_in_its_treasure() {
        let env = DeepSeaTreasure;
        let ctx = ctx();
        for x in 0..10u32 {
            let cell = Cell { x, y: DEPTH[x as usize] };
            assert!(env.is_sink(&cell, &ctx).unwrap());
            assert!(env.valid_actions(&cell, &ctx).unwrap().is_empty());
        }
    }

    #[test]
    fn edges_clamp_instead_of_escaping() {
        let env = DeepSeaTreasure;
        let mut ctx = ctx();
        let start = env.initial_state().unwrap();
        let up = env.sample_transition(&start, &Dive::Up, &mut ctx).unwrap();
        assert!(up == start);
        let left = env.sample_transition(&start, &Dive::Left, &mut ctx).unwrap();
        assert!(left == start);
    }
}
