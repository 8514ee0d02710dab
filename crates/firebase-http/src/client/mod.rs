//! Firebase REST client implementation.

mod config;
mod firebase;
mod query;
mod timeout;
mod transport;
mod watch;

pub use config::{ClientConfig, ENV_PROXY, ENV_TIMEOUT_MS};
pub use firebase::{normalize_url, Firebase};
pub use query::QueryParams;
pub use timeout::TimeoutCoordinator;
pub use transport::{HeaderTimeout, LockingTransport, TimeoutBudget};
pub use watch::{WatchOptions, WatchPhase, WatchSender};
