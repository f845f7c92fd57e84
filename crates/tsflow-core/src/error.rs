/// Canonical result for the planning stack.
pub type Result<T> = std::result::Result<T, Error>;

/// Planning failures. Every variant is fatal to the current `plan()` call.
///
/// `Clone` is required so initializer futures can be shared between parents
/// of the same executor.
#[derive(Debug, Clone)]
pub enum Error {
    DuplicateId(String),
    InvalidFilter(String),
    NoFactory(String),
    NullExecutor(String),
    Cycle { from: String, to: String },
    UnsatisfiedFilter(String),
    UnknownSource { node: String, source: String },
    UnknownNode(String),
}

// Manual Display/Error impls: thiserror's derive unconditionally treats any
// field literally named `source` as the error's source() cause, which
// requires it to implement std::error::Error. `UnknownSource::source` is a
// plain string (a source id), so the derive can't be used here.
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::DuplicateId(id) => write!(f, "duplicate node id in execution graph: {id}"),
            Error::InvalidFilter(msg) => write!(f, "invalid sink filter: {msg}"),
            Error::NoFactory(key) => write!(f, "no factory found for key: {key}"),
            Error::NullExecutor(node) => {
                write!(f, "factory returned no executor for node: {node}")
            }
            Error::Cycle { from, to } => write!(f, "cycle found linking node {from} to {to}"),
            Error::UnsatisfiedFilter(msg) => write!(f, "unsatisfied sink filter: {msg}"),
            Error::UnknownSource { node, source } => {
                write!(f, "node {node} references unknown source: {source}")
            }
            Error::UnknownNode(id) => write!(f, "unknown graph node: {id}"),
        }
    }
}

impl std::error::Error for Error {}
