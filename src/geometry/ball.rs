use super::value::Value;
use super::weight::Weight;
use crate::error::Error;
use crate::error::Result;
use crate::Scalar;

/// a closed Chebyshev ball in weight space carrying a vector value
/// estimate. balls refine around the weights that actually occur,
/// zooming the estimate onto the visited region of the simplex.
#[derive(Debug, Clone)]
pub struct Ball {
    center: Weight,
    radius: Scalar,
    depth: u32,
    birth: u64,
    active: bool,
    pub visits: u64,
    pub value: Value,
    /// backups seen since the last split opportunity
    pub splits: u64,
}

impl Ball {
    fn new(center: Weight, radius: Scalar, depth: u32, birth: u64, dim: usize) -> Self {
        Self {
            center,
            radius,
            depth,
            birth,
            active: true,
            visits: 0,
            value: Value::zeros(dim),
            splits: 0,
        }
    }

    pub fn contains(&self, weight: &Weight) -> bool {
        self.center.chebyshev(weight) <= self.radius + crate::GEOMETRY_EPSILON
    }
    pub fn radius(&self) -> Scalar {
        self.radius
    }
    pub fn depth(&self) -> u32 {
        self.depth
    }
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// the radius a ball must stay above to keep refining, given how
    /// often it has been visited. a ball of depth l may split only
    /// while 2^-l remains at least 1/sqrt(n).
    fn target_radius(visits: u64) -> Scalar {
        1. / (visits.max(1) as Scalar).sqrt()
    }

    fn may_split(&self, thresh: u64) -> bool {
        self.splits >= thresh && (0.5 as Scalar).powi(self.depth as i32) >= Self::target_radius(self.visits)
    }
}

/// the ball partition of one chance node. the list is kept ordered by
/// decreasing radius; for any weight the active ball is the
/// smallest-radius cover, oldest first among equal radii.
#[derive(Debug, Clone)]
pub struct BallPartition {
    balls: Vec<Ball>,
    dim: usize,
    births: u64,
    split_visit_thresh: u64,
}

impl BallPartition {
    /// starts from a single unit-radius ball at the simplex centroid,
    /// which covers every valid weight
    pub fn new(dim: usize, split_visit_thresh: u64) -> Self {
        Self {
            balls: vec![Ball::new(Weight::centroid(dim), 1., 0, 0, dim)],
            dim,
            births: 1,
            split_visit_thresh,
        }
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }
    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }
    pub fn ball(&self, index: usize) -> &Ball {
        &self.balls[index]
    }
    pub fn iter(&self) -> impl Iterator<Item = &Ball> {
        self.balls.iter()
    }

    /// locate the active ball for a weight: the smallest-radius cover
    /// among active balls, falling back to deactivated covers, oldest
    /// winning ties. a weight with no cover at all is corrupted state.
    pub fn active_index(&self, weight: &Weight) -> Result<usize> {
        let pick = |active_only: bool| {
            self.balls
                .iter()
                .enumerate()
                .filter(|(_, b)| b.contains(weight))
                .filter(|(_, b)| b.active || !active_only)
                .min_by(|(_, a), (_, b)| {
                    a.radius
                        .partial_cmp(&b.radius)
                        .expect("finite radii")
                        .then(a.birth.cmp(&b.birth))
                })
                .map(|(i, _)| i)
        };
        pick(true)
            .or_else(|| pick(false))
            .ok_or_else(|| Error::invariant(format!("no ball covers weight {}", weight)))
    }

    /// fold a backed-up return into the active ball for this weight
    /// and give the ball a chance to split around it
    pub fn observe(&mut self, weight: &Weight, sample: &Value) -> Result<usize> {
        let index = self.active_index(weight)?;
        let ball = &mut self.balls[index];
        ball.visits += 1;
        ball.splits += 1;
        let visits = ball.visits;
        ball.value.nudge(sample, visits);
        if ball.may_split(self.split_visit_thresh) {
            self.split(index, weight);
        }
        Ok(index)
    }

    /// replace a ball by two half-radius children: one keeps the
    /// center and a copy of the statistics, the other zooms onto the
    /// observed weight with fresh statistics. the parent stays in the
    /// list, deactivated.
    fn split(&mut self, index: usize, weight: &Weight) {
        let (center, radius, depth) = {
            let parent = &mut self.balls[index];
            parent.active = false;
            parent.splits = 0;
            (parent.center.clone(), parent.radius, parent.depth)
        };
        let mut keeper = Ball::new(center, radius / 2., depth + 1, self.births, self.dim);
        keeper.visits = self.balls[index].visits;
        keeper.value = self.balls[index].value.clone();
        self.births += 1;
        let zoomed = Ball::new(weight.clone(), radius / 2., depth + 1, self.births, self.dim);
        self.births += 1;
        self.insert(keeper);
        self.insert(zoomed);
    }

    /// insertion keeps the list sorted by decreasing radius, stable
    /// in birth order among equals
    fn insert(&mut self, ball: Ball) {
        let at = self.balls.partition_point(|b| b.radius >= ball.radius);
        self.balls.insert(at, ball);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::Rng;
    use rand::SeedableRng;

    #[test]
    fn root_ball_covers_every_weight() {
        let partition = BallPartition::new(3, 10);
        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..100 {
            let w = Weight::sample(3, &mut rng);
            assert!(partition.active_index(&w).is_ok());
        }
    }

    #[test]
    fn exactly_one_active_ball_per_weight() {
        let mut partition = BallPartition::new(2, 1);
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..500 {
            let w = Weight::sample(2, &mut rng);
            let r = Value::from(vec![rng.random::<f64>(), rng.random::<f64>()]);
            partition.observe(&w, &r).unwrap();
        }
        for _ in 0..100 {
            let w = Weight::sample(2, &mut rng);
            // lookup is a function: re-running it yields the same ball
            let a = partition.active_index(&w).unwrap();
            let b = partition.active_index(&w).unwrap();
            assert!(a == b);
            assert!(partition.ball(a).contains(&w));
        }
    }

    #[test]
    fn splitting_deactivates_the_parent_and_halves_the_radius() {
        let mut partition = BallPartition::new(2, 1);
        let w = Weight::from(vec![0.9, 0.1]);
        let r = Value::from(vec![1., 0.]);
        // with a threshold of one the root splits on its first backup
        partition.observe(&w, &r).unwrap();
        partition.observe(&w, &r).unwrap();
        assert!(partition.len() >= 3);
        assert!(!partition.ball(0).is_active());
        let active = partition.active_index(&w).unwrap();
        assert!(partition.ball(active).is_active());
        assert!(partition.ball(active).radius() <= 0.5 + 1e-12);
    }

    #[test]
    fn statistics_survive_the_split_in_the_keeper_child() {
        let mut partition = BallPartition::new(2, 1);
        let w = Weight::from(vec![0.75, 0.25]);
        let r = Value::from(vec![2., 4.]);
        partition.observe(&w, &r).unwrap();
        partition.observe(&w, &r).unwrap();
        let keeper = partition
            .iter()
            .find(|b| b.is_active() && b.visits > 0)
            .expect("inheriting child");
        assert!(keeper.value == r);
    }

    #[test]
    fn deeper_balls_need_quadratically_more_visits() {
        // depth 1 at radius 1/2 requires n >= 4 before it may split
        let mut partition = BallPartition::new(2, 1);
        let w = Weight::from(vec![0.5, 0.5]);
        let r = Value::from(vec![1., 1.]);
        for _ in 0..5 {
            partition.observe(&w, &r).unwrap();
        }
        let depths = partition.iter().map(|b| b.depth()).max().unwrap();
        assert!(depths >= 1);
        assert!(partition.iter().filter(|b| !b.is_active()).count() >= 1);
    }
}
