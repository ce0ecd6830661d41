use super::chance::ChanceNode;
use super::decision::DecisionNode;
use super::manager::Manager;
use super::trial::Backup;
use super::trial::Trial;
use crate::alg::Planner;
use crate::env::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::value::Value;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// a fixed group of worker threads driving trials through a shared
/// tree. workers coordinate through per-node mutexes only; the pool
/// itself just hands out trial numbers and watches for failure.
pub struct TrialPool<E: Environment, P: Planner<E>> {
    manager: Arc<Manager<E, P>>,
    root: Arc<DecisionNode<E, P>>,
}

impl<E: Environment, P: Planner<E>> TrialPool<E, P> {
    pub fn new(manager: Arc<Manager<E, P>>, root: Arc<DecisionNode<E, P>>) -> Self {
        Self { manager, root }
    }

    pub fn root(&self) -> &Arc<DecisionNode<E, P>> {
        &self.root
    }
    pub fn manager(&self) -> &Arc<Manager<E, P>> {
        &self.manager
    }

    /// run until the given number of trials completed. any trial
    /// failure halts the pool and surfaces as the first error.
    pub fn run_trials(&self, trials: usize) -> Result<usize> {
        self.drive(Some(trials), None)
    }

    /// run until the wall clock budget expires. the deadline is
    /// polled between trials only; a trial in flight completes.
    pub fn run_trials_for(&self, budget: Duration) -> Result<usize> {
        self.drive(None, Some(Instant::now() + budget))
    }

    fn drive(&self, quota: Option<usize>, deadline: Option<Instant>) -> Result<usize> {
        let issued = AtomicUsize::new(0);
        let completed = AtomicUsize::new(0);
        let halted = AtomicBool::new(false);
        let failure = Mutex::new(None);
        std::thread::scope(|scope| {
            for tid in 0..self.manager.num_threads() {
                let issued = &issued;
                let completed = &completed;
                let halted = &halted;
                let failure = &failure;
                scope.spawn(move || {
                    self.work(tid, quota, deadline, issued, completed, halted, failure)
                });
            }
        });
        let mut failure = failure.lock().expect("pool failure slot");
        match failure.take() {
            Some(error) => Err(error),
            None => Ok(completed.load(Ordering::Relaxed)),
        }
    }

    fn work(
        &self,
        tid: usize,
        quota: Option<usize>,
        deadline: Option<Instant>,
        issued: &AtomicUsize,
        completed: &AtomicUsize,
        halted: &AtomicBool,
        failure: &Mutex<Option<Error>>,
    ) {
        let mut rng = SmallRng::seed_from_u64(self.manager.seed().wrapping_add(tid as u64));
        loop {
            if halted.load(Ordering::Relaxed) {
                break;
            }
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                break;
            }
            if let Some(quota) = quota {
                if issued.fetch_add(1, Ordering::Relaxed) >= quota {
                    break;
                }
            }
            match self.trial(tid, &mut rng) {
                Ok(()) => {
                    completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(error) => {
                    halted.store(true, Ordering::Relaxed);
                    let mut slot = failure.lock().expect("pool failure slot");
                    slot.get_or_insert(error);
                    break;
                }
            }
        }
    }

    /// one full trial: walk down selecting and sampling, then flow
    /// the accumulated vector rewards back up. locks are taken one
    /// node at a time for a single operation each.
    fn trial(&self, tid: usize, rng: &mut SmallRng) -> Result<()> {
        let manager = self.manager.as_ref();
        let ctx = manager.sample_context(tid, rng)?;
        let mut trial = Trial::new(ctx);
        let mut decision = self.root.clone();
        let mut path: Vec<(Arc<DecisionNode<E, P>>, Arc<ChanceNode<E, P>>)> = Vec::new();
        let mut rewards: Vec<Value> = Vec::new();
        while !decision.is_sink() && path.len() < manager.max_trial_length() {
            decision.visit();
            let action = decision.select_action(manager, &mut trial)?;
            let chance = decision.child_or_create(&action, manager, &trial.ctx)?;
            chance.visit();
            let next = chance.sample_observation(manager, &mut trial)?;
            rewards.push(chance.local_reward().clone());
            path.push((decision, chance));
            decision = next;
        }
        decision.visit();

        let dim = manager.env().reward_dim();
        let cumulative = rewards
            .iter()
            .fold(Value::zeros(dim), |acc, r| acc + r);
        let mut suffix = Value::zeros(dim);
        let nothing = Value::zeros(dim);
        decision.backup(
            manager,
            &Backup {
                rewards_before: &rewards,
                rewards_after: &[],
                cumulative_after: &nothing,
                cumulative: &cumulative,
            },
            &mut trial,
        )?;
        for i in (0..path.len()).rev() {
            suffix += &rewards[i];
            let backup = Backup {
                rewards_before: &rewards[..i],
                rewards_after: &rewards[i..],
                cumulative_after: &suffix,
                cumulative: &cumulative,
            };
            let (decision, chance) = &path[i];
            chance.backup(manager, &backup, &mut trial)?;
            decision.backup(manager, &backup, &mut trial)?;
        }
        Ok(())
    }
}
