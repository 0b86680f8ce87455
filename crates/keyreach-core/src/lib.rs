pub mod aggregate;
pub mod analyzers;
pub mod config;
pub mod error;
pub mod model;
pub mod mysql;
pub mod permissions;
pub mod probe;
pub mod transport;
pub mod walker;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::{aggregate, Grants};
pub use analyzers::{Analysis, Analyzer, Credential, FigmaAnalyzer, LaunchDarklyAnalyzer, MysqlAnalyzer};
pub use config::{load_config, AnalyzerConfig};
pub use error::{AnalyzerError, BranchError, GrantParseError, TransportError, WalkError};
pub use model::{AnalyzerKind, AnalyzerResult, Binding, Permission, Resource, ResourceGraph};
pub use permissions::{PermissionSet, PermissionTable};
pub use probe::{ScopeProbe, ScopeProber};
pub use transport::{Auth, HttpTransport, ReqwestTransport};
pub use walker::{JsonCollection, ResourceCollection, ResourceWalker};
