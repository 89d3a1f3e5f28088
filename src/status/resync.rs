//! Full-cache status resync
//!
//! After a controller restart the cache is rebuilt from the watch stream but
//! the external resources may have drifted while nobody was writing their
//! status. The resync walk visits every cached virtual service and replays
//! the applicable ingress status updates. It is best-effort drift repair, not
//! atomic: per-target failures are logged and the walk continues.

use tracing::{debug, error};

use super::StatusReconciler;
use crate::RESYNC_STATUS_KEY;

impl StatusReconciler {
    /// Replay ingress status for every cached virtual service.
    ///
    /// Secure (SNI-sharded) children resolve their parent record and write
    /// the parent's virtual IP under the child's own service metadata;
    /// independent virtual services write their own VIP for every pool whose
    /// metadata names a namespace. Keys that race out between enumeration and
    /// lookup are skipped silently, as are children whose parent is missing.
    pub async fn resync_all_statuses(&self) {
        let caches = self.caches().clone();
        let namespaces = caches.virtual_services.namespaces().await;
        debug!(namespaces = namespaces.len(), "starting ingress status resync");

        for namespace in namespaces {
            let shard = caches.virtual_services.shard(&namespace).await;
            let keys: Vec<String> = shard.list_all().await.keys().cloned().collect();

            for key in keys {
                // The key may have raced out since enumeration; not an error.
                let Some(record) = shard.get(&key).await else {
                    continue;
                };

                if let Some(parent_ref) = &record.parent_ref {
                    let parent_shard = caches.virtual_services.shard(&parent_ref.namespace).await;
                    let Some(parent) = parent_shard.get(&parent_ref.name).await else {
                        continue;
                    };

                    let metadata = &record.service_metadata;
                    if metadata.names_ingress() && !metadata.namespace.is_empty() {
                        if let Err(e) = self
                            .apply_ingress_status(&parent, metadata, RESYNC_STATUS_KEY)
                            .await
                        {
                            error!(
                                virtual_service = %key,
                                parent = %parent_ref,
                                error = %e,
                                "resync failed for sharded virtual service"
                            );
                        }
                    }
                } else {
                    for pool_key in &record.pool_keys {
                        let pool_shard = caches.pools.shard(&pool_key.namespace).await;
                        let Some(pool) = pool_shard.get(&pool_key.name).await else {
                            continue;
                        };

                        if pool.service_metadata.namespace.is_empty() {
                            continue;
                        }
                        if let Err(e) = self
                            .apply_ingress_status(
                                &record,
                                &pool.service_metadata,
                                RESYNC_STATUS_KEY,
                            )
                            .await
                        {
                            error!(
                                virtual_service = %key,
                                pool = %pool_key,
                                error = %e,
                                "resync failed for virtual service pool"
                            );
                        }
                    }
                }
            }
        }
        debug!("ingress status resync complete");
    }
}
