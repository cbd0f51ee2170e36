pub mod metadata;
pub mod registry_response;

pub use registry_response::{RegistryError, RegistryResponse};
