//! Preapproval applications: record model, submission validation and storage.

pub mod model;
pub mod store;

pub use model::{validate_submission, Application};
pub use store::{ApplicationFilter, ApplicationStore, MemoryApplicationStore, StoreError};
