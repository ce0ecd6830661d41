use crate::error::Error;
use crate::error::Result;
use crate::Scalar;

const MAX_PIVOTS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relation {
    Le,
    Ge,
    Eq,
}

/// one row of a linear program: coeffs . x  (<= | >= | =)  rhs
#[derive(Debug, Clone)]
pub struct Constraint {
    pub coeffs: Vec<Scalar>,
    pub relation: Relation,
    pub rhs: Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Optimal { objective: Scalar, point: Vec<Scalar> },
    Infeasible,
    Unbounded,
}

/// maximize objective . x subject to the constraints, x >= 0.
///
/// a dense two-phase primal simplex over a full tableau. Bland's rule
/// keeps it from cycling on the degenerate programs the hull pruning
/// generates. problem sizes here are tiny (a handful of objectives,
/// tens of points) so no effort is spent on sparsity.
pub fn maximize(objective: &[Scalar], constraints: &[Constraint]) -> Result<Outcome> {
    Tableau::assemble(objective, constraints)?.solve()
}

struct Tableau {
    /// constraint rows, rhs in the last column
    rows: Vec<Vec<Scalar>>,
    /// objective row, maintained in canonical form; the running
    /// objective value is the negated last entry
    obj: Vec<Scalar>,
    /// the structural objective as given, survives phase one
    objective: Vec<Scalar>,
    /// basic variable of each row
    basis: Vec<usize>,
    /// structural + slack column count, artificials live past this
    cols: usize,
    /// structural column count
    vars: usize,
    /// artificial columns, banned from re-entering after phase one
    artificials: Vec<usize>,
}

impl Tableau {
    fn assemble(objective: &[Scalar], constraints: &[Constraint]) -> Result<Self> {
        let vars = objective.len();
        if constraints.iter().any(|c| c.coeffs.len() != vars) {
            return Err(Error::hull("constraint arity does not match objective"));
        }
        let slacks = constraints
            .iter()
            .filter(|c| c.relation != Relation::Eq)
            .count();
        let cols = vars + slacks;
        let mut rows = Vec::with_capacity(constraints.len());
        let mut basis = Vec::with_capacity(constraints.len());
        let mut artificials = Vec::new();
        let mut slack = vars;
        let mut width = cols + 1;
        // first pass determines how many artificials we need so the
        // tableau can be allocated at full width up front
        let needs_artificial = |c: &Constraint| match (c.relation, c.rhs < 0.) {
            (Relation::Eq, _) => true,
            (Relation::Le, true) => true,
            (Relation::Le, false) => false,
            (Relation::Ge, true) => false,
            (Relation::Ge, false) => true,
        };
        width += constraints.iter().filter(|c| needs_artificial(c)).count();
        let mut artificial = cols;
        for constraint in constraints {
            let mut row = vec![0.; width];
            let flip = constraint.rhs < 0.;
            let sign = if flip { -1. } else { 1. };
            for (j, x) in constraint.coeffs.iter().enumerate() {
                row[j] = sign * x;
            }
            *row.last_mut().unwrap() = sign * constraint.rhs;
            let relation = match (constraint.relation, flip) {
                (Relation::Eq, _) => Relation::Eq,
                (Relation::Le, false) | (Relation::Ge, true) => Relation::Le,
                (Relation::Le, true) | (Relation::Ge, false) => Relation::Ge,
            };
            match relation {
                Relation::Le => {
                    row[slack] = 1.;
                    basis.push(slack);
                    slack += 1;
                }
                Relation::Ge => {
                    row[slack] = -1.;
                    slack += 1;
                    row[artificial] = 1.;
                    basis.push(artificial);
                    artificials.push(artificial);
                    artificial += 1;
                }
                Relation::Eq => {
                    row[artificial] = 1.;
                    basis.push(artificial);
                    artificials.push(artificial);
                    artificial += 1;
                }
            }
            rows.push(row);
        }
        Ok(Self {
            rows,
            obj: vec![0.; width],
            objective: objective.to_vec(),
            basis,
            cols,
            vars,
            artificials,
        })
    }

    fn solve(mut self) -> Result<Outcome> {
        if !self.artificials.is_empty() {
            if !self.phase_one()? {
                return Ok(Outcome::Infeasible);
            }
        }
        self.canonical_objective();
        match self.pivot_until_optimal(false)? {
            true => Ok(Outcome::Optimal {
                objective: -*self.obj.last().unwrap(),
                point: self.point(),
            }),
            false => Ok(Outcome::Unbounded),
        }
    }

    /// drive the artificial variables to zero. returns feasibility.
    fn phase_one(&mut self) -> Result<bool> {
        let width = self.obj.len();
        self.obj = vec![0.; width];
        for &a in &self.artificials {
            self.obj[a] = -1.;
        }
        for i in 0..self.rows.len() {
            if self.artificials.contains(&self.basis[i]) {
                let row = self.rows[i].clone();
                for (o, r) in self.obj.iter_mut().zip(row.iter()) {
                    *o += r;
                }
            }
        }
        if !self.pivot_until_optimal(true)? {
            return Err(Error::hull("phase one cannot be unbounded"));
        }
        if -*self.obj.last().unwrap() < -crate::LP_EPSILON {
            return Ok(false);
        }
        self.expel_artificials();
        Ok(true)
    }

    /// pivot out any artificial still basic at zero level; drop
    /// redundant rows that offer no pivot
    fn expel_artificials(&mut self) {
        let mut i = 0;
        while i < self.rows.len() {
            if self.artificials.contains(&self.basis[i]) {
                match (0..self.cols).find(|&j| self.rows[i][j].abs() > crate::LP_EPSILON) {
                    Some(j) => self.pivot(i, j),
                    None => {
                        self.rows.remove(i);
                        self.basis.remove(i);
                        continue;
                    }
                }
            }
            i += 1;
        }
    }

    /// rebuild the canonical objective row, reduced against the
    /// current basis
    fn canonical_objective(&mut self) {
        let width = self.rows.first().map(|r| r.len()).unwrap_or(self.cols + 1);
        let mut obj = vec![0.; width];
        obj[..self.vars].copy_from_slice(&self.objective);
        for (i, &b) in self.basis.iter().enumerate() {
            let factor = obj[b];
            if factor.abs() > 0. {
                for (o, r) in obj.iter_mut().zip(self.rows[i].iter()) {
                    *o -= factor * r;
                }
            }
        }
        self.obj = obj;
    }

    /// returns false on unbounded. `artificial_phase` permits
    /// artificial columns to leave but never to re-enter.
    fn pivot_until_optimal(&mut self, artificial_phase: bool) -> Result<bool> {
        for _ in 0..MAX_PIVOTS {
            let enterable = (0..self.obj.len() - 1)
                .filter(|&j| artificial_phase || !self.artificials.contains(&j))
                .find(|&j| self.obj[j] > crate::LP_EPSILON);
            let Some(entering) = enterable else {
                return Ok(true);
            };
            let leaving = self
                .rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row[entering] > crate::LP_EPSILON)
                .map(|(i, row)| (i, row.last().unwrap() / row[entering]))
                .min_by(|(i, a), (j, b)| {
                    a.partial_cmp(b)
                        .unwrap()
                        .then_with(|| self.basis[*i].cmp(&self.basis[*j]))
                });
            let Some((leaving, _)) = leaving else {
                return Ok(false);
            };
            self.pivot(leaving, entering);
        }
        Err(Error::hull("simplex exceeded pivot budget"))
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let scale = self.rows[row][col];
        for x in self.rows[row].iter_mut() {
            *x /= scale;
        }
        let pivot_row = self.rows[row].clone();
        for (i, other) in self.rows.iter_mut().enumerate() {
            if i != row && other[col].abs() > 0. {
                let factor = other[col];
                for (x, p) in other.iter_mut().zip(pivot_row.iter()) {
                    *x -= factor * p;
                }
            }
        }
        let factor = self.obj[col];
        if factor.abs() > 0. {
            for (x, p) in self.obj.iter_mut().zip(pivot_row.iter()) {
                *x -= factor * p;
            }
        }
        self.basis[row] = col;
    }

    /// read the structural solution off the basis
    fn point(&self) -> Vec<Scalar> {
        let mut point = vec![0.; self.vars];
        for (i, &b) in self.basis.iter().enumerate() {
            if b < self.vars {
                point[b] = *self.rows[i].last().unwrap();
            }
        }
        point
    }
}

/// solve a square dense linear system by gaussian elimination with
/// partial pivoting. used for barycentric coordinate lookups.
pub fn solve_dense(matrix: &[Vec<Scalar>], rhs: &[Scalar]) -> Option<Vec<Scalar>> {
    let n = rhs.len();
    let mut a = matrix.iter().cloned().collect::<Vec<_>>();
    let mut b = rhs.to_vec();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col]
                .abs()
                .partial_cmp(&a[j][col].abs())
                .expect("finite matrix entries")
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in 0..n {
            if row != col {
                let factor = a[row][col] / a[col][col];
                for k in col..n {
                    a[row][k] -= factor * a[col][k];
                }
                b[row] -= factor * b[col];
            }
        }
    }
    Some((0..n).map(|i| b[i] / a[i][i]).collect())
}
