use super::value::Value;
use crate::error::Error;
use crate::error::Result;
use crate::Scalar;
use crate::Utility;
use rand::rngs::SmallRng;
use rand::Rng;

/// a scalarising weight: a point on the probability simplex.
/// components are non-negative and sum to one. a weight reduces a
/// vector value to a scalar through its inner product.
#[derive(Debug, Clone, PartialEq)]
pub struct Weight(Vec<Scalar>);

impl Weight {
    /// validated constructor. rejects negative components and
    /// components that do not sum to one.
    pub fn new(components: Vec<Scalar>) -> Result<Self> {
        if components.len() < 2 {
            return Err(Error::config("weight dimension must be at least 2"));
        }
        if components.iter().any(|x| *x < -crate::GEOMETRY_EPSILON) {
            return Err(Error::config("weight components must be non-negative"));
        }
        let total = components.iter().sum::<Scalar>();
        if (total - 1.).abs() > 1e-6 {
            return Err(Error::config(format!("weight sums to {}, expected 1", total)));
        }
        Ok(Self(components))
    }

    /// the centroid of the simplex
    pub fn centroid(dim: usize) -> Self {
        Self(vec![1. / dim as Scalar; dim])
    }

    /// a uniform draw from the simplex. normalized exponentials are
    /// equivalent to a flat Dirichlet.
    pub fn sample(dim: usize, rng: &mut SmallRng) -> Self {
        let exps = (0..dim)
            .map(|_| -(1. - rng.random::<Scalar>()).ln())
            .collect::<Vec<_>>();
        let total = exps.iter().sum::<Scalar>();
        Self(exps.into_iter().map(|x| x / total).collect())
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }
    pub fn components(&self) -> &[Scalar] {
        &self.0
    }

    /// scalarise a vector value under this weight
    pub fn dot(&self, value: &Value) -> Utility {
        self.0
            .iter()
            .zip(value.components())
            .map(|(w, v)| w * v)
            .sum()
    }

    /// L-infinity distance, the metric of the ball partition
    pub fn chebyshev(&self, other: &Self) -> Scalar {
        self.0
            .iter()
            .zip(other.components())
            .map(|(a, b)| (a - b).abs())
            .fold(0., Scalar::max)
    }

    /// euclidean distance, used for closest-vertex lookups
    pub fn euclidean(&self, other: &Self) -> Scalar {
        self.0
            .iter()
            .zip(other.components())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<Scalar>()
            .sqrt()
    }

    /// the exact bit pattern of the components. identical geometric
    /// constructions yield identical bits, which makes this usable as
    /// a dedup key for shared vertices.
    pub fn bits(&self) -> Vec<u64> {
        self.0.iter().map(|x| x.to_bits()).collect()
    }
}

impl From<Vec<Scalar>> for Weight {
    fn from(components: Vec<Scalar>) -> Self {
        Self::new(components).expect("valid simplex point")
    }
}

impl std::fmt::Display for Weight {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "(")?;
        for (i, x) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", x)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sampled_weights_lie_on_the_simplex() {
        let mut rng = SmallRng::seed_from_u64(0);
        for dim in 2..=6 {
            let w = Weight::sample(dim, &mut rng);
            assert!(w.dim() == dim);
            assert!(w.components().iter().all(|x| *x >= 0.));
            assert!((w.components().iter().sum::<Scalar>() - 1.).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_malformed_weights() {
        assert!(Weight::new(vec![0.5, 0.6]).is_err());
        assert!(Weight::new(vec![1.5, -0.5]).is_err());
        assert!(Weight::new(vec![1.0]).is_err());
        assert!(Weight::new(vec![0.25, 0.75]).is_ok());
    }

    #[test]
    fn scalarisation_is_the_inner_product() {
        let w = Weight::from(vec![0.25, 0.75]);
        let v = Value::from(vec![4.0, 8.0]);
        assert!((w.dot(&v) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn chebyshev_dominates_by_largest_axis() {
        let a = Weight::from(vec![0.5, 0.5]);
        let b = Weight::from(vec![0.1, 0.9]);
        assert!((a.chebyshev(&b) - 0.4).abs() < 1e-12);
    }
}
