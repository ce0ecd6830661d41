use super::chance::ChanceNode;
use super::decision::DecisionNode;
use crate::alg::Planner;
use crate::env::Environment;
use serde::Serialize;
use std::sync::Arc;

/// shape of a searched tree, for logging and sanity checks
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeStats {
    pub decision_nodes: usize,
    pub chance_nodes: usize,
    pub max_depth: usize,
    pub root_visits: u64,
    pub root_backups: u64,
}

impl TreeStats {
    pub fn measure<E: Environment, P: Planner<E>>(root: &Arc<DecisionNode<E, P>>) -> Self {
        let mut stats = Self {
            root_visits: root.visits(),
            root_backups: root.backups(),
            ..Self::default()
        };
        stats.walk(root);
        stats
    }

    fn walk<E: Environment, P: Planner<E>>(&mut self, node: &Arc<DecisionNode<E, P>>) {
        self.decision_nodes += 1;
        self.max_depth = self.max_depth.max(node.depth());
        for (_, chance) in node.children() {
            self.chance_nodes += 1;
            for (_, child) in chance.children() {
                self.walk(&child);
            }
        }
    }
}

impl std::fmt::Display for TreeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} decision / {} chance nodes, depth {}, {} visits",
            self.decision_nodes, self.chance_nodes, self.max_depth, self.root_visits
        )
    }
}

/// an indented rendering of the tree down to a depth cutoff, one
/// line per node with its visit counters. deeper layers are elided.
pub fn render<E: Environment, P: Planner<E>>(
    root: &Arc<DecisionNode<E, P>>,
    max_depth: usize,
) -> String {
    let mut out = String::new();
    render_decision(root, max_depth, 0, &mut out);
    out
}

fn render_decision<E: Environment, P: Planner<E>>(
    node: &Arc<DecisionNode<E, P>>,
    max_depth: usize,
    indent: usize,
    out: &mut String,
) {
    out.push_str(&format!(
        "{}{:?} visits={} backups={}{}\n",
        "  ".repeat(indent),
        node.state(),
        node.visits(),
        node.backups(),
        if node.is_sink() { " sink" } else { "" },
    ));
    if node.depth() >= max_depth {
        return;
    }
    for (action, chance) in node.children() {
        render_chance(&action, &chance, max_depth, indent + 1, out);
    }
}

fn render_chance<E: Environment, P: Planner<E>>(
    action: &E::Action,
    node: &Arc<ChanceNode<E, P>>,
    max_depth: usize,
    indent: usize,
    out: &mut String,
) {
    out.push_str(&format!(
        "{}{:?} visits={} backups={}\n",
        "  ".repeat(indent),
        action,
        node.visits(),
        node.backups(),
    ));
    for (_, child) in node.children() {
        render_decision(&child, max_depth, indent + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::Czt;
    use crate::env::walk::Walk;
    use crate::search::Manager;
    use crate::search::TrialPool;

    #[test]
    fn stats_count_what_the_render_shows() {
        let manager = Arc::new(Manager::new(
            Arc::new(Walk::new(3, 0., false)),
            Czt::new(2, 4., 10),
            1,
            50,
            2,
        ));
        let root = manager.root().unwrap();
        let pool = TrialPool::new(manager, root);
        pool.run_trials(200).unwrap();
        let stats = TreeStats::measure(pool.root());
        assert!(stats.decision_nodes > 1);
        assert!(stats.chance_nodes >= 2);
        assert!(stats.max_depth == 3);
        assert!(stats.root_visits == 200);

        let rendered = render(pool.root(), 1);
        assert!(rendered.contains("visits=200"));
        assert!(rendered.lines().count() >= 3);
    }
}
