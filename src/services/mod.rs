mod identity;
mod providers;

pub use identity::{Caller, Identity};
pub use providers::{EmailProvider, ProviderRegistry};
