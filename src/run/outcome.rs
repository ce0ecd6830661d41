use super::config::RunConfig;
use crate::alg::AlgId;
use crate::search::eval::Evaluation;
use crate::Scalar;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// a policy evaluation taken partway through the search
#[derive(Debug, Clone, Serialize)]
pub struct TimedEvaluation {
    pub at_seconds: Scalar,
    pub evaluation: Evaluation,
}

/// one repeat's worth of results: the configuration it ran under,
/// how much search happened, and what the Monte-Carlo evaluation of
/// the recommended policy measured, plus the mid-search time series
/// when the run evaluates periodically
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub env_id: String,
    pub alg_id: AlgId,
    pub repeat: usize,
    pub seed: u64,
    pub trials: usize,
    pub search_seconds: Scalar,
    pub evaluation: Evaluation,
    pub series: Vec<TimedEvaluation>,
    pub config: RunConfig,
}

impl RunOutcome {
    /// write the outcome as pretty json under the given directory
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}-{}-{}.json", self.env_id, self.alg_id, self.repeat));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} x {} repeat {}: {} trials, mean utility {:.4}",
            self.env_id, self.alg_id, self.repeat, self.trials, self.evaluation.mean_utility
        )
    }
}
