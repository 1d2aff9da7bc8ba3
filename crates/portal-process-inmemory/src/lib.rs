//! In-memory process store for the onboarding portal process engine
//!
//! This crate provides an in-memory implementation of the `ProcessStore`
//! interface defined in portal-process-core. It is primarily useful for
//! development, testing, and single-node deployments where persistence is
//! not required.

pub mod store;
pub use store::InMemoryProcessStore;
