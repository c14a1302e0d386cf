pub mod logging;
pub mod registry_store;

pub use registry_store::RegistryFileStore;
