//! Tool backends: registry, routing and the host seam used by sessions.

mod empty;
mod errors;
mod host;
mod registry;
mod retry;
mod schema;

pub use empty::EmptyToolHost;
pub use errors::{RegistryError, ToolError};
pub use host::ToolHost;
pub use registry::ToolRegistry;
pub use retry::RetryPolicy;
pub use schema::{SEPARATOR, normalize_schema, qualified_name, split_qualified};
