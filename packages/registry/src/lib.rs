//! Concord-Registry: Preference Catalogue
//!
//! Declares which `(category, key)` preferences exist, which values they may
//! take, their defaults, risk levels and adaptivity. Every preference write
//! anywhere in the plane must pass [`PreferenceRegistry::validate`].
//!
//! The catalogue is built once at startup and immutable afterwards.

pub mod definition;
pub mod registry;

pub use definition::{PreferenceDefinition, PreferenceKey, RiskLevel, ValueDomain};
pub use registry::{PreferenceRegistry, RegistryBuilder, RegistryError};
