use crate::env::Environment;
use crate::error::Error;
use crate::error::Result;
use crate::search::chance::ChanceNode;
use crate::search::decision::DecisionNode;
use crate::search::trial::Backup;
use crate::search::trial::Trial;
use serde::Deserialize;
use serde::Serialize;

pub mod chmcts;
pub mod czt;
pub mod smbts;
pub mod smdents;

pub use chmcts::Chmcts;
pub use czt::Czt;
pub use smbts::SmBts;
pub use smdents::SmDents;

/// what distinguishes the planner variants: the value stores their
/// nodes carry and the selection, backup and recommendation rules
/// over those stores. the node framework is generic over this, so
/// all variants share one tree, one pool and one locking discipline.
pub trait Planner<E: Environment>: Send + Sync + Sized + 'static {
    type DecisionStore: Send + 'static;
    type ChanceStore: Send + 'static;

    fn decision_store(&self) -> Self::DecisionStore;
    fn chance_store(&self) -> Self::ChanceStore;

    /// pick the action to descend through, under the trial's weight
    fn select_action(&self, node: &DecisionNode<E, Self>, trial: &mut Trial<E>)
        -> Result<E::Action>;

    /// the action the finished search stands behind for this weight
    fn recommend_action(
        &self,
        node: &DecisionNode<E, Self>,
        trial: &mut Trial<E>,
    ) -> Result<E::Action>;

    fn backup_decision(
        &self,
        node: &DecisionNode<E, Self>,
        backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()>;

    fn backup_chance(
        &self,
        node: &ChanceNode<E, Self>,
        backup: &Backup,
        trial: &mut Trial<E>,
    ) -> Result<()>;
}

/// the four planner variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgId {
    Czt,
    Chmcts,
    Smbts,
    Smdents,
}

impl std::str::FromStr for AlgId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "czt" => Ok(Self::Czt),
            "chmcts" => Ok(Self::Chmcts),
            "smbts" => Ok(Self::Smbts),
            "smdents" => Ok(Self::Smdents),
            other => Err(Error::config(format!("unknown algorithm id: {}", other))),
        }
    }
}

impl std::fmt::Display for AlgId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Czt => write!(f, "czt"),
            Self::Chmcts => write!(f, "chmcts"),
            Self::Smbts => write!(f, "smbts"),
            Self::Smdents => write!(f, "smdents"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alg_ids_parse_case_insensitively() {
        assert!("CZT".parse::<AlgId>().unwrap() == AlgId::Czt);
        assert!("smdents".parse::<AlgId>().unwrap() == AlgId::Smdents);
        assert!("uct".parse::<AlgId>().is_err());
    }
}
