//! Three-source channel reconciliation.
//!
//! Merges the provider's live view, the persisted registry, and the
//! archive listing into `{live, recorded}`. Stateless: every call is a
//! fresh read of all three sources. Channel listing is advisory, so a
//! failing source degrades to empty instead of failing the merge.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::provider::{ProviderChannel, RtcProvider};
use crate::registry::{ChannelRecord, ChannelRegistry};
use crate::storage::{ObjectStore, StoredObject};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveChannel {
    pub channel_name: String,
    pub user_count: u32,
    pub host_uid: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelSets {
    pub live: Vec<LiveChannel>,
    pub recorded: Vec<ChannelRecord>,
}

pub struct ChannelReconciler {
    provider: Arc<dyn RtcProvider>,
    registry: Arc<dyn ChannelRegistry>,
    storage: Arc<dyn ObjectStore>,
}

impl ChannelReconciler {
    pub fn new(
        provider: Arc<dyn RtcProvider>,
        registry: Arc<dyn ChannelRegistry>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            provider,
            registry,
            storage,
        }
    }

    pub async fn reconcile(&self) -> ChannelSets {
        let (provider_channels, registry_channels, objects) = tokio::join!(
            self.provider.list_channels(),
            self.registry.list_channels(),
            self.storage.list_objects(None),
        );

        let provider_channels = provider_channels.unwrap_or_else(|e| {
            warn!("provider channel list unavailable: {e}");
            Vec::new()
        });
        let registry_channels = registry_channels.unwrap_or_else(|e| {
            warn!("channel registry unavailable: {e}");
            Vec::new()
        });
        let objects = objects.unwrap_or_else(|e| {
            warn!("archive listing unavailable: {e}");
            Vec::new()
        });

        merge(&provider_channels, &registry_channels, &objects)
    }
}

/// The registry drives the merge: the provider alone never introduces a
/// channel, and a registry entry alone never counts as live.
fn merge(
    provider: &[ProviderChannel],
    registry: &[ChannelRecord],
    objects: &[StoredObject],
) -> ChannelSets {
    let mut live = Vec::new();
    let mut recorded: Vec<ChannelRecord> = Vec::new();

    for record in registry {
        if let Some(entry) = provider
            .iter()
            .find(|c| c.channel_name == record.title && c.user_count > 0)
        {
            live.push(LiveChannel {
                channel_name: record.title.clone(),
                user_count: entry.user_count,
                host_uid: record.host_uid.clone(),
                created_at: record.created_at.clone(),
            });
        }

        let already_recorded = recorded.iter().any(|c| c.title == record.title);
        if !already_recorded && objects.iter().any(|o| o.key.contains(&record.title)) {
            recorded.push(record.clone());
        }
    }

    ChannelSets { live, recorded }
}
