//! The concrete [`DataLoader`] wired into the prefetcher by the server
//! binary.
//!
//! The core's prefetcher is deliberately backend-agnostic (§4.5 of the
//! design treats `DataLoader` as an external collaborator). This server
//! ships a loader that always reports the key unavailable: every
//! dispatched prediction takes the `BackendUnavailable` path described in
//! the error taxonomy, which is the correct behavior for a standalone
//! cache with no origin store behind it. Deployments with a real origin
//! (a database, another service) supply their own `DataLoader` and build
//! their own binary around `chronos-server`'s library crate.

use chronos_core::DataLoader;

/// A loader with no backing store: every load reports the key absent.
pub struct NullDataLoader;

impl DataLoader for NullDataLoader {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        tracing::debug!(key, "no origin DataLoader configured, prefetch load is a no-op");
        None
    }
}
