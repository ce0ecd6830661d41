pub mod chance;
pub mod decision;
pub mod eval;
pub mod manager;
pub mod policy;
pub mod pool;
pub mod stats;
pub mod trial;

pub use chance::ChanceNode;
pub use decision::DecisionNode;
pub use manager::Manager;
pub use pool::TrialPool;
pub use trial::Backup;
pub use trial::Trial;
