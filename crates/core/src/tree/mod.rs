//! Property trees: the decoded, defaulted and formatted view of one node.

pub mod property;
pub mod provider;
pub mod value;

pub use property::{PropertyFormatter, PropertyNode, PropertySource};
pub use provider::{LazyLoader, PropertiesProvider, PropertiesProviderBuilder};
pub use value::{Value, format_number};
