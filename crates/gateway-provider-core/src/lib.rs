pub mod driver;
pub mod factory;
pub mod registry;

pub use driver::{ChatBody, ChatRequest, ChatResponse, Driver, DriverContext, DriverError};
pub use factory::{DriverFactory, DriverFactoryRegistry};
pub use registry::{ModelPricing, ProviderRegistry, ReloadError, ResolveError};
