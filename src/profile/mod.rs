//! Company profiles: the durable record produced by onboarding.

pub mod model;
pub mod store;

pub use model::{CompanyProfile, UserId};
pub use store::{JsonProfileStore, MemoryProfileStore, ProfileStore};
