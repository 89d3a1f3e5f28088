//! Cache record value types and the service-metadata join key
//!
//! These are the payloads the sharded store carries for the sync core:
//! virtual-service records, pool records, and the service-metadata record
//! that joins a cached load-balancer object back to the external (Ingress or
//! Service) resources whose status must reflect it. Records are created and
//! replaced whole by the watch layer and read, never mutated in place, by the
//! reconciler.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::ObjectStore;
use crate::Result;

/// Composite namespace + name key for a cached load-balancer object
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceName {
    /// Namespace component
    pub namespace: String,
    /// Name component
    pub name: String,
}

impl NamespaceName {
    /// Create a key from its two components
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a composite `"namespace/name"` token.
    ///
    /// The token must split into exactly two non-empty components; anything
    /// else is a hard [`Error::MalformedKey`], never a skip, because a
    /// malformed token means the cache record itself is corrupt.
    pub fn parse(token: &str) -> Result<Self> {
        let mut parts = token.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), None) if !namespace.is_empty() && !name.is_empty() => {
                Ok(Self::new(namespace, name))
            }
            _ => Err(Error::malformed_key(token)),
        }
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The join key connecting a cached load-balancer object to the external
/// resources that should reflect its status.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    /// Namespace of the external resource (single-target case)
    #[serde(default)]
    pub namespace: String,
    /// Ingress name (single-target case; empty when the object maps to a
    /// LoadBalancer Service instead)
    #[serde(default)]
    pub ingress_name: String,
    /// LoadBalancer Service name, for L4 status propagation
    #[serde(default)]
    pub service_name: String,
    /// Hostnames whose status entries this object owns
    #[serde(default)]
    pub host_names: Vec<String>,
    /// SNI/hostname-sharding fan-out: composite `"namespace/ingressName"`
    /// tokens, one per ingress that shares this virtual service. Non-empty
    /// means the single-target fields above are ignored for ingress updates.
    #[serde(default)]
    pub namespace_ingress_names: Vec<String>,
}

impl ServiceMetadata {
    /// Resolve the ingress targets this metadata fans out to.
    ///
    /// All composite tokens are parsed before anything is returned, so one
    /// malformed token aborts the whole operation before any external write.
    /// With an empty fan-out list the single `namespace`/`ingress_name` pair
    /// is the only target.
    pub fn ingress_targets(&self) -> Result<Vec<NamespaceName>> {
        if self.namespace_ingress_names.is_empty() {
            return Ok(vec![NamespaceName::new(&self.namespace, &self.ingress_name)]);
        }
        self.namespace_ingress_names
            .iter()
            .map(|token| NamespaceName::parse(token))
            .collect()
    }

    /// Whether this metadata names an ingress at all, directly or via fan-out
    pub fn names_ingress(&self) -> bool {
        !self.ingress_name.is_empty() || !self.namespace_ingress_names.is_empty()
    }
}

/// Cached state of one virtual service as programmed on the load balancer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualServiceRecord {
    /// Virtual IP the load balancer answers on for this service
    pub virtual_ip: String,
    /// Parent virtual service, set only on SNI-sharded children; the child's
    /// status writes use the parent's virtual IP
    #[serde(default)]
    pub parent_ref: Option<NamespaceName>,
    /// Backend pools behind this virtual service, in programming order
    #[serde(default)]
    pub pool_keys: Vec<NamespaceName>,
    /// Join key back to the external resources reflecting this service
    #[serde(default)]
    pub service_metadata: ServiceMetadata,
}

/// Cached state of one backend pool
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    /// Join key back to the external resources reflecting this pool
    #[serde(default)]
    pub service_metadata: ServiceMetadata,
}

/// The typed cache set the reconciler operates over.
///
/// Keeping each record kind in its own typed store makes the wrong-typed
/// lookup failures of a dynamically typed cache unrepresentable.
#[derive(Debug, Default)]
pub struct ControllerCaches {
    /// Virtual-service records, keyed namespace -> object name
    pub virtual_services: ObjectStore<VirtualServiceRecord>,
    /// Pool records, keyed namespace -> object name
    pub pools: ObjectStore<PoolRecord>,
}

impl ControllerCaches {
    /// Create an empty cache set wrapped for shared ownership
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}
