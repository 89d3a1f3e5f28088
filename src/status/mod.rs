//! Status reconciliation engine
//!
//! This module owns the writes to externally-owned resource status: given a
//! cached virtual-service record and a service-metadata record, it computes
//! the minimal status mutation for the Ingress or LoadBalancer Service the
//! metadata names and applies it through the status subresource.
//!
//! Two symmetric operation families exist - apply (create/update desired
//! status) and retract (remove status entries) - each with an ingress variant
//! and a load-balancer-service variant. Ingress writes run a bounded retry
//! loop around the whole fetch/compute/write cycle because the API server's
//! optimistic-concurrency check rejects the write whenever another caller got
//! there first; each attempt therefore starts from a fresh read.
//!
//! No ordering is guaranteed between concurrent updates to the same external
//! target beyond what that optimistic-concurrency check provides.

mod resync;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
};
use k8s_openapi::api::networking::v1::{
    Ingress, IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
};
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::{debug, error, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::cache::{ControllerCaches, NamespaceName, ServiceMetadata, VirtualServiceRecord};
use crate::error::Error;
use crate::retry::RetryConfig;
use crate::Result;

/// Trait abstracting resource access for status reconciliation
///
/// The reconciler only ever fetches a resource and writes its status
/// subresource back; it never deletes the resource itself. Abstracting those
/// four calls allows mocking the API server in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Fetch the current ingress resource by namespace and name
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress>;

    /// Write the ingress's status subresource back
    ///
    /// The write carries the resourceVersion from the fetch, so a concurrent
    /// writer surfaces as a conflict error here.
    async fn update_ingress_status(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress>;

    /// Fetch the current service resource by namespace and name
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service>;

    /// Write the service's status subresource back
    async fn update_service_status(&self, namespace: &str, service: &Service) -> Result<Service>;
}

/// Real resource client backed by the cluster API server
pub struct KubeResourceClient {
    client: Client,
}

impl KubeResourceClient {
    /// Create a new client wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceClient for KubeResourceClient {
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Ingress> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn update_ingress_status(&self, namespace: &str, ingress: &Ingress) -> Result<Ingress> {
        let api: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let name = ingress
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("status-client", "ingress has no name"))?;
        let data =
            serde_json::to_vec(ingress).map_err(|e| Error::serialization(e.to_string()))?;
        Ok(api.replace_status(name, &PostParams::default(), data).await?)
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn update_service_status(&self, namespace: &str, service: &Service) -> Result<Service> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let name = service
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("status-client", "service has no name"))?;
        let data =
            serde_json::to_vec(service).map_err(|e| Error::serialization(e.to_string()))?;
        Ok(api.replace_status(name, &PostParams::default(), data).await?)
    }
}

/// Status reconciliation engine over the controller caches
///
/// Holds the injected [`ResourceClient`], the typed cache set, and the retry
/// policy for conflicted status writes.
pub struct StatusReconciler {
    client: Arc<dyn ResourceClient>,
    caches: Arc<ControllerCaches>,
    retry: RetryConfig,
}

impl StatusReconciler {
    /// Create a reconciler with the default retry policy
    pub fn new(client: Arc<dyn ResourceClient>, caches: Arc<ControllerCaches>) -> Self {
        Self {
            client,
            caches,
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy for conflicted status writes
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The cache set this reconciler reads from
    pub fn caches(&self) -> &Arc<ControllerCaches> {
        &self.caches
    }

    /// Propagate a virtual service's VIP into the status of every ingress its
    /// service metadata names.
    ///
    /// With a non-empty SNI fan-out list each composite token becomes one
    /// single-target update; a malformed token aborts before any write. Each
    /// target is attempted even if an earlier one failed; the last error is
    /// returned.
    pub async fn apply_ingress_status(
        &self,
        record: &VirtualServiceRecord,
        metadata: &ServiceMetadata,
        key: &str,
    ) -> Result<()> {
        let targets = metadata.ingress_targets()?;
        let mut result = Ok(());
        for target in targets {
            if let Err(e) = self
                .apply_ingress_target(&target, &metadata.host_names, &record.virtual_ip, key)
                .await
            {
                error!(key = %key, target = %target, error = %e, "ingress status update failed");
                result = Err(e);
            }
        }
        result
    }

    /// Remove this metadata's status entries from every ingress it names.
    ///
    /// `is_vs_delete` distinguishes a full virtual-service teardown from a
    /// per-host removal: a per-host removal must not erase status for a host
    /// the ingress spec still declares.
    pub async fn retract_ingress_status(
        &self,
        metadata: &ServiceMetadata,
        is_vs_delete: bool,
        key: &str,
    ) -> Result<()> {
        let targets = metadata.ingress_targets()?;
        let mut result = Ok(());
        for target in targets {
            if let Err(e) = self
                .retract_ingress_target(&target, &metadata.host_names, is_vs_delete, key)
                .await
            {
                error!(key = %key, target = %target, error = %e, "ingress status retraction failed");
                result = Err(e);
            }
        }
        result
    }

    /// Replace a LoadBalancer Service's status wholesale with this virtual
    /// service's VIP and single hostname.
    ///
    /// A load-balancer service owns exactly one hostname; any other count is
    /// a validation error. The write happens once, with no internal retry -
    /// the caller's event loop re-triggers on failure.
    pub async fn apply_service_status(
        &self,
        record: &VirtualServiceRecord,
        metadata: &ServiceMetadata,
        key: &str,
    ) -> Result<()> {
        let target = NamespaceName::new(&metadata.namespace, &metadata.service_name);
        if metadata.host_names.len() != 1 {
            return Err(Error::validation_for(
                target.to_string(),
                format!(
                    "expected exactly one hostname for a load-balancer service, got {}",
                    metadata.host_names.len()
                ),
            ));
        }

        let mut service = match self.client.get_service(&target.namespace, &target.name).await {
            Ok(service) => service,
            Err(e) => {
                warn!(key = %key, target = %target, error = %e, "could not fetch service for status update");
                return Err(e);
            }
        };

        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some(record.virtual_ip.clone()),
                    hostname: Some(metadata.host_names[0].clone()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        });

        self.client
            .update_service_status(&target.namespace, &service)
            .await?;
        info!(key = %key, target = %target, vip = %record.virtual_ip, "updated load-balancer service status");
        Ok(())
    }

    /// Reset a LoadBalancer Service's status to an empty ingress list.
    pub async fn retract_service_status(&self, metadata: &ServiceMetadata, key: &str) -> Result<()> {
        let target = NamespaceName::new(&metadata.namespace, &metadata.service_name);
        let mut service = match self.client.get_service(&target.namespace, &target.name).await {
            Ok(service) => service,
            Err(e) => {
                warn!(key = %key, target = %target, error = %e, "could not fetch service for status reset");
                return Err(e);
            }
        };

        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(Vec::new()),
            }),
            ..Default::default()
        });

        self.client
            .update_service_status(&target.namespace, &service)
            .await?;
        info!(key = %key, target = %target, "reset load-balancer service status");
        Ok(())
    }

    /// Single-target ingress status update with bounded write retry.
    ///
    /// Each attempt refetches the ingress so the computation always runs
    /// against the version the write will be checked against. A fetch failure
    /// is returned immediately - the resource may legitimately not exist yet
    /// and the watch loop will re-trigger.
    async fn apply_ingress_target(
        &self,
        target: &NamespaceName,
        host_names: &[String],
        virtual_ip: &str,
        key: &str,
    ) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut ingress = match self.client.get_ingress(&target.namespace, &target.name).await {
                Ok(ingress) => ingress,
                Err(e) => {
                    warn!(key = %key, target = %target, error = %e, "could not fetch ingress for status update");
                    return Err(e);
                }
            };

            let spec_hosts = ingress_spec_hosts(&ingress);
            let current = lb_entries(&ingress);
            let mut entries = current.clone();

            // At least one desired (IP, host) pair already present verbatim
            // means the slots we own are in place and must not be rewritten.
            let no_op = entries.iter().any(|entry| {
                entry.ip.as_deref() == Some(virtual_ip)
                    && entry
                        .hostname
                        .as_deref()
                        .is_some_and(|h| host_names.iter().any(|hn| hn == h))
            });

            if !no_op {
                // Clear the slots we are about to rewrite, then append one
                // entry per owned hostname.
                entries.retain(|entry| {
                    !entry
                        .hostname
                        .as_deref()
                        .is_some_and(|h| host_names.iter().any(|hn| hn == h))
                });
                for host in host_names {
                    entries.push(IngressLoadBalancerIngress {
                        ip: Some(virtual_ip.to_string()),
                        hostname: Some(host.clone()),
                        ..Default::default()
                    });
                }
            }

            // Status entries must never reference a hostname the routing spec
            // no longer declares, no-op or not.
            entries.retain(|entry| {
                entry
                    .hostname
                    .as_deref()
                    .is_some_and(|h| spec_hosts.iter().any(|sh| sh == h))
            });

            if entries == current {
                debug!(key = %key, target = %target, "ingress status already correct, skipping write");
                return Ok(());
            }

            set_lb_entries(&mut ingress, entries);
            match self
                .client
                .update_ingress_status(&target.namespace, &ingress)
                .await
            {
                Ok(_) => {
                    info!(key = %key, target = %target, vip = %virtual_ip, "updated ingress status");
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        error!(key = %key, target = %target, attempts = attempt, error = %e, "ingress status update exhausted retries");
                        return Err(Error::retries_exhausted(
                            "apply_ingress_status",
                            &target.namespace,
                            &target.name,
                            attempt,
                        ));
                    }
                    warn!(key = %key, target = %target, attempt = attempt, error = %e, "ingress status write failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
            }
        }
    }

    /// Single-target ingress status retraction with bounded write retry.
    async fn retract_ingress_target(
        &self,
        target: &NamespaceName,
        host_names: &[String],
        is_vs_delete: bool,
        key: &str,
    ) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let mut ingress = match self.client.get_ingress(&target.namespace, &target.name).await {
                Ok(ingress) => ingress,
                Err(e) => {
                    warn!(key = %key, target = %target, error = %e, "could not fetch ingress for status retraction");
                    return Err(e);
                }
            };

            let spec_hosts = ingress_spec_hosts(&ingress);
            let current = lb_entries(&ingress);
            let mut entries = current.clone();

            entries.retain(|entry| {
                let Some(host) = entry.hostname.as_deref() else {
                    return true;
                };
                if !host_names.iter().any(|h| h == host) {
                    return true;
                }
                // A host the spec still declares survives a per-host
                // retraction; only a full virtual-service teardown takes it.
                let declared = spec_hosts.iter().any(|sh| sh == host);
                if declared && !is_vs_delete {
                    debug!(key = %key, host = %host, "host still declared in ingress spec, keeping its status");
                    true
                } else {
                    false
                }
            });

            if entries == current {
                debug!(key = %key, target = %target, "no status entries to retract, skipping write");
                return Ok(());
            }

            set_lb_entries(&mut ingress, entries);
            match self
                .client
                .update_ingress_status(&target.namespace, &ingress)
                .await
            {
                Ok(_) => {
                    info!(key = %key, target = %target, "retracted ingress status entries");
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.retry.max_attempts {
                        error!(key = %key, target = %target, attempts = attempt, error = %e, "ingress status retraction exhausted retries");
                        return Err(Error::retries_exhausted(
                            "retract_ingress_status",
                            &target.namespace,
                            &target.name,
                            attempt,
                        ));
                    }
                    warn!(key = %key, target = %target, attempt = attempt, error = %e, "ingress status write failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                }
            }
        }
    }
}

/// Hostnames declared by the ingress's routing spec
fn ingress_spec_hosts(ingress: &Ingress) -> Vec<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_ref())
        .map(|rules| rules.iter().filter_map(|rule| rule.host.clone()).collect())
        .unwrap_or_default()
}

/// Current load-balancer status entries of the ingress
fn lb_entries(ingress: &Ingress) -> Vec<IngressLoadBalancerIngress> {
    ingress
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.clone())
        .unwrap_or_default()
}

/// Replace the ingress's load-balancer status entries
fn set_lb_entries(ingress: &mut Ingress, entries: Vec<IngressLoadBalancerIngress>) {
    ingress.status = Some(IngressStatus {
        load_balancer: Some(IngressLoadBalancerStatus {
            ingress: Some(entries),
        }),
    });
}
