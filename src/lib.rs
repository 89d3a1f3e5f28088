//! Vipsync - state-synchronization core for a load-balancer ingress controller
//!
//! Vipsync keeps the status fields of externally-owned Kubernetes resources
//! (Ingress and LoadBalancer Services) in agreement with the virtual services
//! and pools that a load-balancing controller actually programs. Watchers
//! (out of scope here) populate an in-memory cache as load-balancer objects
//! are created and deleted; this crate owns that cache and the status writes
//! derived from it.
//!
//! # Architecture
//!
//! Two tightly coupled subsystems:
//! - A sharded, lock-protected object store: one shard per namespace, each
//!   shard an independently lock-guarded name-to-record map. Operations on
//!   different namespaces never contend.
//! - A status reconciler that reads one cache record plus its service
//!   metadata and performs an idempotent, retry-bounded write against the
//!   external resource's status subresource. A resync walker drives the same
//!   reconciliation over the whole cache after a controller restart.
//!
//! # Modules
//!
//! - [`store`] - Namespace-sharded concurrent object store
//! - [`cache`] - Cache record value types and the service-metadata join key
//! - [`status`] - Status reconciliation engine and the resync walker
//! - [`retry`] - Bounded-retry configuration for status writes
//! - [`error`] - Error types for the sync core

#![deny(missing_docs)]

pub mod cache;
pub mod error;
pub mod retry;
pub mod status;
pub mod store;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Correlation key attached to status writes issued by the startup resync walk
///
/// Event-driven writes carry the originating watch key instead; this constant
/// marks writes whose trigger was cache-wide drift repair.
pub const RESYNC_STATUS_KEY: &str = "resync-status";

/// Total write attempts for one status-update target before giving up
///
/// The external API server rejects conflicting status writes via its
/// optimistic-concurrency check; each attempt refetches the resource, so a
/// small cap absorbs write-write races without masking persistent failures.
pub const STATUS_WRITE_ATTEMPTS: u32 = 3;
