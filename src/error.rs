/// everything here is fail-fast. nothing is retried, the first
/// failure aborts the run and surfaces to the caller.
#[derive(Debug, Clone)]
pub enum Error {
    /// unknown algorithm or environment id, malformed parameter,
    /// or a reward dimension mismatch caught at setup
    Config(String),
    /// the environment raised during a transition, reward or context call
    Env(String),
    /// the embedded LP solver did not terminate at an optimum
    Hull(String),
    /// corrupted search state, e.g. a backup before any visit
    /// or a weight not covered by any ball
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
    pub fn env<S: Into<String>>(msg: S) -> Self {
        Self::Env(msg.into())
    }
    pub fn hull<S: Into<String>>(msg: S) -> Self {
        Self::Hull(msg.into())
    }
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::Invariant(msg.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config error: {}", msg),
            Self::Env(msg) => write!(f, "environment error: {}", msg),
            Self::Hull(msg) => write!(f, "hull error: {}", msg),
            Self::Invariant(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
