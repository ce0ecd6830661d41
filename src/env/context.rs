use crate::geometry::weight::Weight;
use rand::rngs::SmallRng;
use rand::Rng;
use rand::SeedableRng;

/// trial-local state: the scalarising weight the whole descent and
/// backup reads, and the randomness the trial consumes. created when
/// a worker starts a trial, dropped when the backup finishes. nodes
/// never store any of this.
#[derive(Debug)]
pub struct TrialCtx {
    pub tid: usize,
    pub weight: Weight,
    pub rng: SmallRng,
}

impl TrialCtx {
    pub fn new(tid: usize, weight: Weight, rng: &mut SmallRng) -> Self {
        Self {
            tid,
            weight,
            rng: SmallRng::seed_from_u64(rng.random::<u64>()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contexts_fork_their_own_randomness() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut a = TrialCtx::new(0, Weight::centroid(2), &mut rng);
        let mut b = TrialCtx::new(0, Weight::centroid(2), &mut rng);
        assert!(a.rng.random::<u64>() != b.rng.random::<u64>());
    }
}
