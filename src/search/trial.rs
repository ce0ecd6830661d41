use crate::env::Environment;
use crate::env::TrialCtx;
use crate::geometry::value::Value;
use std::collections::HashMap;

/// one worker's view of a trial in flight: the environment context
/// plus search-local scratch. the scratch remembers which action a
/// decision node selected on the way down so its backup can find the
/// matching store on the way up; it is keyed by node id and dies
/// with the trial.
pub struct Trial<E: Environment> {
    pub ctx: TrialCtx,
    selected: HashMap<u64, E::Action>,
}

impl<E: Environment> Trial<E> {
    pub fn new(ctx: TrialCtx) -> Self {
        Self { ctx, selected: HashMap::new() }
    }

    pub fn note_selection(&mut self, node: u64, action: E::Action) {
        self.selected.insert(node, action);
    }

    pub fn selection(&self, node: u64) -> Option<&E::Action> {
        self.selected.get(&node)
    }
}

/// the reward flow a backup sees at one node: the per-step vector
/// rewards split at the node's depth, the return accumulated below
/// the node, and the whole trial's return
pub struct Backup<'a> {
    pub rewards_before: &'a [Value],
    pub rewards_after: &'a [Value],
    pub cumulative_after: &'a Value,
    pub cumulative: &'a Value,
}
