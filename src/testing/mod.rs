//! Test-only support: in-memory fakes for every external collaborator
//! trait, used by this crate's own integration tests and available to
//! downstream callers under the `testing` feature-equivalent module
//! (no cargo feature gate; kept simple as a plain module, matching how
//! prodigy's `testing/mocks/` ships alongside its library code).

pub mod mocks;
