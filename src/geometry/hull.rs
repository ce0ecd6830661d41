use super::lp;
use super::lp::Constraint;
use super::lp::Outcome;
use super::lp::Relation;
use super::value::Value;
use super::weight::Weight;
use crate::error::Error;
use crate::error::Result;

/// a set of tagged vector values pruned to the convex Pareto front.
/// tags identify where a point came from, an action at decision
/// nodes or a next state at chance nodes.
#[derive(Debug, Clone)]
pub struct Hull<T> {
    dim: usize,
    points: Vec<(Value, T)>,
}

impl<T: Clone> Hull<T> {
    pub fn new(dim: usize) -> Self {
        Self { dim, points: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
    pub fn dim(&self) -> usize {
        self.dim
    }
    pub fn points(&self) -> &[(Value, T)] {
        &self.points
    }

    /// insert one point and immediately restore the pruning
    /// invariant. inserting a point already present is a no-op.
    pub fn insert(&mut self, value: Value, tag: T) -> Result<()> {
        debug_assert!(value.dim() == self.dim);
        if self.points.iter().any(|(v, _)| *v == value) {
            return Ok(());
        }
        self.points.push((value, tag));
        self.prune()
    }

    /// merge another hull into this one, then prune once
    pub fn union(&mut self, other: &Self) -> Result<()> {
        for (value, tag) in other.points() {
            if !self.points.iter().any(|(v, _)| v == value) {
                self.points.push((value.clone(), tag.clone()));
            }
        }
        self.prune()
    }

    /// the same front shifted by a constant vector, e.g. a local reward
    pub fn translate(&self, offset: &Value) -> Self {
        Self {
            dim: self.dim,
            points: self
                .points
                .iter()
                .map(|(v, t)| (v.clone() + offset, t.clone()))
                .collect(),
        }
    }

    /// the same front under a different tag
    pub fn retagged<U: Clone>(&self, tag: &U) -> Hull<U> {
        Hull {
            dim: self.dim,
            points: self
                .points
                .iter()
                .map(|(v, _)| (v.clone(), tag.clone()))
                .collect(),
        }
    }

    /// scalarised query: the tag of a point maximising the inner
    /// product with this weight
    pub fn best(&self, weight: &Weight) -> Option<&T> {
        self.points
            .iter()
            .max_by(|(a, _), (b, _)| {
                weight
                    .dot(a)
                    .partial_cmp(&weight.dot(b))
                    .expect("finite hull values")
            })
            .map(|(_, tag)| tag)
    }

    /// remove every point strongly convex dominated by the rest.
    /// restarts the scan after each removal so the certificates are
    /// always computed against the surviving set.
    fn prune(&mut self) -> Result<()> {
        'scan: loop {
            if self.points.len() <= 1 {
                return Ok(());
            }
            for i in 0..self.points.len() {
                if self.dominated(i)? {
                    self.points.remove(i);
                    continue 'scan;
                }
            }
            return Ok(());
        }
    }

    /// LP witness for strong convex domination of point i by the
    /// others: maximise x subject to <w, p - q> >= x for all q,
    /// w on the simplex. dominated iff the optimum is <= 0.
    fn dominated(&self, i: usize) -> Result<bool> {
        let (p, _) = &self.points[i];
        let mut constraints = self
            .points
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, (q, _))| {
                let mut coeffs = p
                    .components()
                    .iter()
                    .zip(q.components())
                    .map(|(a, b)| a - b)
                    .collect::<Vec<_>>();
                coeffs.push(-1.);
                coeffs.push(1.);
                Constraint { coeffs, relation: Relation::Ge, rhs: 0. }
            })
            .collect::<Vec<_>>();
        let mut simplex = vec![1.; self.dim];
        simplex.push(0.);
        simplex.push(0.);
        constraints.push(Constraint { coeffs: simplex, relation: Relation::Eq, rhs: 1. });
        let mut objective = vec![0.; self.dim];
        objective.push(1.);
        objective.push(-1.);
        match lp::maximize(&objective, &constraints)? {
            Outcome::Optimal { objective, .. } => Ok(objective <= crate::LP_EPSILON),
            Outcome::Infeasible => Err(Error::hull("domination program infeasible")),
            Outcome::Unbounded => Err(Error::hull("domination program unbounded")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn front() -> Hull<&'static str> {
        let mut hull = Hull::new(2);
        hull.insert(Value::from(vec![1., 0.]), "right").unwrap();
        hull.insert(Value::from(vec![0., 1.]), "down").unwrap();
        hull
    }

    #[test]
    fn dominated_points_are_pruned_on_insert() {
        let mut hull = front();
        hull.insert(Value::from(vec![0.4, 0.4]), "mid").unwrap();
        assert!(hull.len() == 2);
        assert!(hull.points().iter().all(|(_, t)| *t != "mid"));
    }

    #[test]
    fn undominated_points_survive() {
        let mut hull = front();
        hull.insert(Value::from(vec![0.6, 0.6]), "mid").unwrap();
        assert!(hull.len() == 3);
    }

    #[test]
    fn points_on_the_chord_count_as_dominated() {
        let mut hull = front();
        hull.insert(Value::from(vec![0.5, 0.5]), "chord").unwrap();
        assert!(hull.len() == 2);
    }

    #[test]
    fn inserting_twice_is_idempotent() {
        let mut hull = front();
        let before = hull.len();
        hull.insert(Value::from(vec![1., 0.]), "again").unwrap();
        assert!(hull.len() == before);
    }

    #[test]
    fn union_merges_and_prunes() {
        let mut a = front();
        let mut b = Hull::new(2);
        b.insert(Value::from(vec![0.9, 0.9]), "good").unwrap();
        b.insert(Value::from(vec![0.1, 0.1]), "bad").unwrap();
        a.union(&b).unwrap();
        assert!(a.points().iter().any(|(_, t)| *t == "good"));
        assert!(a.points().iter().all(|(_, t)| *t != "bad"));
    }

    #[test]
    fn scalarised_queries_follow_the_weight() {
        let hull = front();
        let right = hull.best(&Weight::from(vec![1., 0.])).unwrap();
        let down = hull.best(&Weight::from(vec![0., 1.])).unwrap();
        assert!(*right == "right");
        assert!(*down == "down");
    }

    #[test]
    fn translate_shifts_every_point() {
        let hull = front().translate(&Value::from(vec![1., 1.]));
        assert!(hull
            .points()
            .iter()
            .any(|(v, _)| *v == Value::from(vec![2., 1.])));
    }

    #[test]
    fn singleton_hulls_are_never_pruned() {
        let mut hull: Hull<u8> = Hull::new(3);
        hull.insert(Value::from(vec![-5., -5., -5.]), 0).unwrap();
        assert!(hull.len() == 1);
    }
}
