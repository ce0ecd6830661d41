use crate::Scalar;

/// a vector-valued return or value estimate. one component per
/// reward objective.
#[derive(Debug, Clone, PartialEq)]
pub struct Value(Vec<Scalar>);

impl Value {
    pub fn zeros(dim: usize) -> Self {
        Self(vec![0.; dim])
    }
    pub fn splat(dim: usize, x: Scalar) -> Self {
        Self(vec![x; dim])
    }
    pub fn dim(&self) -> usize {
        self.0.len()
    }
    pub fn components(&self) -> &[Scalar] {
        &self.0
    }
    pub fn into_components(self) -> Vec<Scalar> {
        self.0
    }

    /// incremental running mean with 1/n step size. associative
    /// enough that any interleaving of updates under a lock
    /// converges to the offline mean.
    pub fn nudge(&mut self, sample: &Self, n: u64) {
        assert!(n > 0);
        for (v, x) in self.0.iter_mut().zip(sample.components()) {
            *v += (x - *v) / n as Scalar;
        }
    }

    /// fold a sample into a backup-count weighted mean, where this
    /// value currently carries `seen - weight` worth of mass
    pub fn blend(&mut self, sample: &Self, weight: u64, seen: u64) {
        assert!(seen >= weight && seen > 0);
        let kept = (seen - weight) as Scalar / seen as Scalar;
        let gain = weight as Scalar / seen as Scalar;
        for (v, x) in self.0.iter_mut().zip(sample.components()) {
            *v = *v * kept + x * gain;
        }
    }

    /// the largest per-component range across a set of values
    pub fn spread(values: &[&Self]) -> Scalar {
        match values.first() {
            None => 0.,
            Some(first) => (0..first.dim())
                .map(|i| {
                    let lo = values.iter().map(|v| v.0[i]).fold(Scalar::INFINITY, Scalar::min);
                    let hi = values.iter().map(|v| v.0[i]).fold(Scalar::NEG_INFINITY, Scalar::max);
                    hi - lo
                })
                .fold(0., Scalar::max),
        }
    }
}

impl From<Vec<Scalar>> for Value {
    fn from(components: Vec<Scalar>) -> Self {
        Self(components)
    }
}

impl std::ops::Add<&Value> for Value {
    type Output = Value;
    fn add(mut self, rhs: &Value) -> Value {
        for (v, x) in self.0.iter_mut().zip(rhs.components()) {
            *v += x;
        }
        self
    }
}

impl std::ops::AddAssign<&Value> for Value {
    fn add_assign(&mut self, rhs: &Value) {
        for (v, x) in self.0.iter_mut().zip(rhs.components()) {
            *v += x;
        }
    }
}

impl std::ops::Sub<&Value> for Value {
    type Output = Value;
    fn sub(mut self, rhs: &Value) -> Value {
        for (v, x) in self.0.iter_mut().zip(rhs.components()) {
            *v -= x;
        }
        self
    }
}

impl std::ops::Mul<Scalar> for Value {
    type Output = Value;
    fn mul(mut self, rhs: Scalar) -> Value {
        for v in self.0.iter_mut() {
            *v *= rhs;
        }
        self
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, x) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.4}", x)?;
        }
        write!(f, "]")
    }
}
