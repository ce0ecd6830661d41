use super::lp;
use super::value::Value;
use super::weight::Weight;
use crate::error::Error;
use crate::error::Result;
use crate::Entropy;
use crate::Scalar;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashMap;

/// how a triangulation node subdivides when its value surface gets
/// interesting. the two schemes have different refinement grain and
/// are deliberately kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Triangulation {
    /// a new vertex at the centroid, one child per replaced corner
    Barycentric,
    /// a new vertex at the midpoint of the longest edge, two children
    BinaryTree,
}

/// a vertex of the neighbourhood graph: a fixed weight shared by all
/// triangulation nodes that touch it, carrying the value estimate
/// (and, for entropy-regularised search, an entropy estimate) for
/// its corner of the simplex.
#[derive(Debug, Clone)]
pub struct Ngv {
    weight: Weight,
    pub value: Value,
    pub entropy: Entropy,
    neighbours: Vec<usize>,
}

impl Ngv {
    pub fn weight(&self) -> &Weight {
        &self.weight
    }
    pub fn neighbours(&self) -> &[usize] {
        &self.neighbours
    }
}

/// one simplex of the triangulation. leaves tile the weight simplex;
/// interior nodes only route lookups to their children.
#[derive(Debug, Clone)]
pub struct Tn {
    corners: Vec<usize>,
    children: Vec<usize>,
    depth: u32,
    visits: u64,
}

impl Tn {
    pub fn corners(&self) -> &[usize] {
        &self.corners
    }
    pub fn children(&self) -> &[usize] {
        &self.children
    }
    pub fn depth(&self) -> u32 {
        self.depth
    }
    pub fn visits(&self) -> u64 {
        self.visits
    }
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// a hierarchical partition of the weight simplex with value
/// estimates at the vertices. vertices live in a flat arena and are
/// shared by index between the simplices that touch them; weights
/// are deduplicated by exact bit pattern so a corner constructed
/// twice resolves to the same vertex.
#[derive(Debug, Clone)]
pub struct SimplexMap {
    dim: usize,
    variant: Triangulation,
    l_inf_thresh: Scalar,
    split_visit_thresh: u64,
    max_depth: u32,
    tns: Vec<Tn>,
    ngvs: Vec<Ngv>,
    interned: HashMap<Vec<u64>, usize>,
}

impl SimplexMap {
    /// the root simplex spans the unit vectors; every vertex starts
    /// from the configured default value, typically the environment's
    /// minimum, so unexplored regions look pessimistic
    pub fn new(
        dim: usize,
        variant: Triangulation,
        default: &Value,
        l_inf_thresh: Scalar,
        split_visit_thresh: u64,
        max_depth: u32,
    ) -> Self {
        let mut map = Self {
            dim,
            variant,
            l_inf_thresh,
            split_visit_thresh,
            max_depth,
            tns: Vec::new(),
            ngvs: Vec::new(),
            interned: HashMap::new(),
        };
        let corners = (0..dim)
            .map(|i| {
                let mut components = vec![0.; dim];
                components[i] = 1.;
                map.intern(Weight::from(components), default)
            })
            .collect::<Vec<_>>();
        map.link(&corners);
        map.tns.push(Tn { corners, children: Vec::new(), depth: 0, visits: 0 });
        map
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
    pub fn tn(&self, id: usize) -> &Tn {
        &self.tns[id]
    }
    pub fn ngv(&self, id: usize) -> &Ngv {
        &self.ngvs[id]
    }
    pub fn ngvs(&self) -> &[Ngv] {
        &self.ngvs
    }
    pub fn leaves(&self) -> Vec<usize> {
        (0..self.tns.len()).filter(|&i| self.tns[i].is_leaf()).collect()
    }
    pub fn subdivisions(&self) -> usize {
        self.tns.iter().filter(|t| !t.is_leaf()).count()
    }

    /// descend to the unique leaf whose simplex contains this weight
    pub fn leaf(&self, weight: &Weight) -> Result<usize> {
        let mut at = 0;
        loop {
            let tn = &self.tns[at];
            if tn.is_leaf() {
                return Ok(at);
            }
            at = tn
                .children
                .iter()
                .copied()
                .find(|&c| self.contains(c, weight))
                .or_else(|| self.closest_child(tn, weight))
                .ok_or_else(|| Error::invariant(format!("no leaf contains weight {}", weight)))?;
        }
    }

    /// the corner vertex nearest to this weight, the one whose value
    /// estimate stands in for the whole leaf
    pub fn closest(&self, tn: usize, weight: &Weight) -> usize {
        self.tns[tn]
            .corners
            .iter()
            .copied()
            .min_by(|&a, &b| {
                self.ngvs[a]
                    .weight
                    .euclidean(weight)
                    .partial_cmp(&self.ngvs[b].weight.euclidean(weight))
                    .expect("finite distances")
            })
            .expect("simplices have corners")
    }

    /// read the estimate standing for this weight
    pub fn estimate(&self, weight: &Weight) -> Result<(&Value, Entropy)> {
        let leaf = self.leaf(weight)?;
        let ngv = &self.ngvs[self.closest(leaf, weight)];
        Ok((&ngv.value, ngv.entropy))
    }

    /// write a backed-up estimate at the vertex standing for this
    /// weight, give the leaf a chance to subdivide, then push the
    /// improvement one hop through the neighbourhood graph
    pub fn record(&mut self, weight: &Weight, value: Value, entropy: Entropy) -> Result<()> {
        let leaf = self.leaf(weight)?;
        self.tns[leaf].visits += 1;
        let vertex = self.closest(leaf, weight);
        self.ngvs[vertex].value = value;
        self.ngvs[vertex].entropy = entropy;
        self.maybe_subdivide(leaf);
        self.push(vertex);
        Ok(())
    }

    /// share an updated estimate with the vertex's neighbours,
    /// overwriting only neighbours it improves at their own weight.
    /// pulls are disallowed so stale estimates never flow backwards.
    fn push(&mut self, vertex: usize) {
        let value = self.ngvs[vertex].value.clone();
        let entropy = self.ngvs[vertex].entropy;
        for neighbour in self.ngvs[vertex].neighbours.clone() {
            let ngv = &self.ngvs[neighbour];
            if ngv.weight.dot(&ngv.value) < ngv.weight.dot(&value) {
                self.ngvs[neighbour].value = value.clone();
                self.ngvs[neighbour].entropy = entropy;
            }
        }
    }

    fn maybe_subdivide(&mut self, tn: usize) {
        if !self.tns[tn].is_leaf() {
            return;
        }
        if self.tns[tn].visits < self.split_visit_thresh || self.tns[tn].depth >= self.max_depth {
            return;
        }
        let spread = {
            let corners = self.tns[tn]
                .corners
                .iter()
                .map(|&c| &self.ngvs[c].value)
                .collect::<Vec<_>>();
            Value::spread(&corners)
        };
        if spread <= self.l_inf_thresh {
            return;
        }
        match self.variant {
            Triangulation::Barycentric => self.subdivide_barycentric(tn),
            Triangulation::BinaryTree => self.subdivide_binary(tn),
        }
    }

    /// place a vertex at the centroid and spawn one child per corner,
    /// each keeping the other corners
    fn subdivide_barycentric(&mut self, tn: usize) {
        let corners = self.tns[tn].corners.clone();
        let depth = self.tns[tn].depth;
        let centroid = self.combine(&corners, |components| {
            components.iter().sum::<Scalar>() / components.len() as Scalar
        });
        for replaced in 0..corners.len() {
            let mut child = corners.clone();
            child[replaced] = centroid;
            self.link(&child);
            let id = self.tns.len();
            self.tns.push(Tn { corners: child, children: Vec::new(), depth: depth + 1, visits: 0 });
            self.tns[tn].children.push(id);
        }
    }

    /// bisect the longest edge at its midpoint, producing two children
    fn subdivide_binary(&mut self, tn: usize) {
        let corners = self.tns[tn].corners.clone();
        let depth = self.tns[tn].depth;
        let (a, b) = self.longest_edge(&corners);
        let midpoint = self.combine(&[corners[a], corners[b]], |components| {
            components.iter().sum::<Scalar>() / 2.
        });
        for replaced in [a, b] {
            let mut child = corners.clone();
            child[replaced] = midpoint;
            self.link(&child);
            let id = self.tns.len();
            self.tns.push(Tn { corners: child, children: Vec::new(), depth: depth + 1, visits: 0 });
            self.tns[tn].children.push(id);
        }
    }

    fn longest_edge(&self, corners: &[usize]) -> (usize, usize) {
        let mut best = (0, 1);
        let mut longest = 0.;
        for i in 0..corners.len() {
            for j in i + 1..corners.len() {
                let d = self.ngvs[corners[i]].weight.euclidean(&self.ngvs[corners[j]].weight);
                if d > longest {
                    longest = d;
                    best = (i, j);
                }
            }
        }
        best
    }

    /// build a derived vertex by combining corner coordinates
    /// component-wise, deduplicated against existing vertices
    fn combine<F: Fn(&[Scalar]) -> Scalar>(&mut self, corners: &[usize], fold: F) -> usize {
        let components = (0..self.dim)
            .map(|i| {
                let column = corners
                    .iter()
                    .map(|&c| self.ngvs[c].weight.components()[i])
                    .collect::<Vec<_>>();
                fold(&column)
            })
            .collect::<Vec<_>>();
        let default = Value::zeros(self.dim);
        let fresh = self.interned.get(&Weight::from(components.clone()).bits()).is_none();
        let id = self.intern(Weight::from(components), &default);
        // a fresh interior vertex starts from the average of the
        // corners it interpolates rather than the map default
        if fresh {
            let mut value = Value::zeros(self.dim);
            for (n, &c) in corners.iter().enumerate() {
                let sample = self.ngvs[c].value.clone();
                value.nudge(&sample, n as u64 + 1);
            }
            let mut entropy = 0.;
            for (n, &c) in corners.iter().enumerate() {
                entropy += (self.ngvs[c].entropy - entropy) / (n as Scalar + 1.);
            }
            self.ngvs[id].value = value;
            self.ngvs[id].entropy = entropy;
        }
        id
    }

    fn intern(&mut self, weight: Weight, default: &Value) -> usize {
        let key = weight.bits();
        match self.interned.get(&key) {
            Some(&id) => id,
            None => {
                let id = self.ngvs.len();
                self.ngvs.push(Ngv {
                    weight,
                    value: default.clone(),
                    entropy: 0.,
                    neighbours: Vec::new(),
                });
                self.interned.insert(key, id);
                id
            }
        }
    }

    /// corners of one simplex are mutual neighbours
    fn link(&mut self, corners: &[usize]) {
        for &a in corners {
            for &b in corners {
                if a != b && !self.ngvs[a].neighbours.contains(&b) {
                    self.ngvs[a].neighbours.push(b);
                }
            }
        }
    }

    /// barycentric containment test with a small tolerance
    fn contains(&self, tn: usize, weight: &Weight) -> bool {
        match self.barycentric(tn, weight) {
            Some(coords) => coords.iter().all(|&x| x >= -1e-9),
            None => false,
        }
    }

    fn barycentric(&self, tn: usize, weight: &Weight) -> Option<Vec<Scalar>> {
        let corners = &self.tns[tn].corners;
        let matrix = (0..self.dim)
            .map(|i| {
                corners
                    .iter()
                    .map(|&c| self.ngvs[c].weight.components()[i])
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        lp::solve_dense(&matrix, weight.components())
    }

    /// when rounding leaves a boundary weight outside every child,
    /// route to the child it is deepest inside of
    fn closest_child(&self, tn: &Tn, weight: &Weight) -> Option<usize> {
        tn.children
            .iter()
            .copied()
            .filter_map(|c| {
                self.barycentric(c, weight)
                    .map(|coords| (c, coords.into_iter().fold(Scalar::INFINITY, Scalar::min)))
            })
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("finite coordinates"))
            .map(|(c, _)| c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn map(dim: usize, variant: Triangulation) -> SimplexMap {
        SimplexMap::new(dim, variant, &Value::zeros(dim), 0.05, 1, 10)
    }

    #[test]
    fn every_weight_resolves_to_exactly_one_leaf() {
        for variant in [Triangulation::Barycentric, Triangulation::BinaryTree] {
            let mut map = map(3, variant);
            let mut rng = SmallRng::seed_from_u64(7);
            for i in 0..200 {
                let w = Weight::sample(3, &mut rng);
                let v = Value::from(vec![i as Scalar, 0., -(i as Scalar)]);
                map.record(&w, v, 0.).unwrap();
            }
            assert!(map.subdivisions() >= 1);
            for _ in 0..100 {
                let w = Weight::sample(3, &mut rng);
                let containing = map
                    .leaves()
                    .into_iter()
                    .filter(|&l| map.contains(l, &w))
                    .count();
                assert!(containing >= 1);
                assert!(map.leaf(&w).is_ok());
            }
        }
    }

    #[test]
    fn barycentric_split_shares_parent_corners_with_children() {
        let mut map = map(3, Triangulation::Barycentric);
        let parent_corners = map.tn(0).corners().to_vec();
        let w = Weight::centroid(3);
        map.record(&w, Value::from(vec![1., 0., 0.]), 0.).unwrap();
        map.record(&w, Value::from(vec![1., 0., 0.]), 0.).unwrap();
        assert!(!map.tn(0).is_leaf());
        assert!(map.tn(0).children().len() == 3);
        for &child in map.tn(0).children() {
            let kept = map
                .tn(child)
                .corners()
                .iter()
                .filter(|c| parent_corners.contains(c))
                .count();
            assert!(kept == 2);
        }
    }

    #[test]
    fn binary_split_creates_one_midpoint_shared_by_both_children() {
        let mut map = map(3, Triangulation::BinaryTree);
        let w = Weight::centroid(3);
        map.record(&w, Value::from(vec![1., 0., 0.]), 0.).unwrap();
        map.record(&w, Value::from(vec![1., 0., 0.]), 0.).unwrap();
        assert!(map.tn(0).children().len() == 2);
        let [a, b] = map.tn(0).children() else {
            panic!("binary split must make two children")
        };
        let shared = map
            .tn(*a)
            .corners()
            .iter()
            .filter(|c| map.tn(*b).corners().contains(c))
            .count();
        assert!(shared == 2);
    }

    #[test]
    fn corner_lookup_is_stable_across_subdivision() {
        let mut map = map(3, Triangulation::Barycentric);
        let e0 = Weight::from(vec![1., 0., 0.]);
        let before = {
            let leaf = map.leaf(&e0).unwrap();
            map.closest(leaf, &e0)
        };
        map.record(&Weight::centroid(3), Value::from(vec![9., 0., 0.]), 0.).unwrap();
        map.record(&Weight::centroid(3), Value::from(vec![9., 0., 0.]), 0.).unwrap();
        let after = {
            let leaf = map.leaf(&e0).unwrap();
            map.closest(leaf, &e0)
        };
        assert!(before == after);
    }

    #[test]
    fn flat_value_surfaces_do_not_subdivide() {
        let mut map = map(2, Triangulation::Barycentric);
        for _ in 0..50 {
            map.record(&Weight::centroid(2), Value::zeros(2), 0.).unwrap();
        }
        assert!(map.subdivisions() == 0);
    }

    #[test]
    fn push_overwrites_only_improvable_neighbours() {
        let mut map = map(2, Triangulation::Barycentric);
        // e0 gets a value strong at e1's weight too, the push carries it over
        map.record(&Weight::from(vec![1., 0.]), Value::from(vec![5., 5.]), 0.).unwrap();
        let e1 = map.estimate(&Weight::from(vec![0., 1.])).unwrap().0.clone();
        assert!(e1 == Value::from(vec![5., 5.]));
        // a weaker update does not propagate
        map.record(&Weight::from(vec![1., 0.]), Value::from(vec![6., 1.]), 0.).unwrap();
        let e1 = map.estimate(&Weight::from(vec![0., 1.])).unwrap().0.clone();
        assert!(e1 == Value::from(vec![5., 5.]));
    }

    #[test]
    fn max_depth_caps_refinement() {
        let mut map = SimplexMap::new(
            2,
            Triangulation::BinaryTree,
            &Value::zeros(2),
            0.0001,
            1,
            3,
        );
        let mut rng = SmallRng::seed_from_u64(11);
        for i in 0..500 {
            let w = Weight::sample(2, &mut rng);
            map.record(&w, Value::from(vec![i as Scalar, -(i as Scalar)]), 0.).unwrap();
        }
        assert!(map.tns.iter().all(|t| t.depth() <= 3));
        assert!(map.leaves().iter().all(|&l| map.tn(l).depth() <= 3));
    }
}
