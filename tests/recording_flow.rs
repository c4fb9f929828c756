//! End-to-end orchestration flow over in-process collaborators.
//!
//! Exercises the public seams the service is wired through: a scripted
//! provider, the real SQLite registry, an in-memory object store, and a
//! file-writing transcoder.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use voxrelay::config::Config;
use voxrelay::directory::{DirectoryUser, UserDirectory, UserPage};
use voxrelay::error::OrchestratorError;
use voxrelay::orchestrator::Orchestrator;
use voxrelay::pipeline::Transcoder;
use voxrelay::provider::{
    ChannelPresence, ProviderChannel, RtcProvider, StartParams, StartedRecording,
};
use voxrelay::registry::SqliteRegistry;
use voxrelay::storage::{ObjectStore, StoredObject};

fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.app_id = "test-app".to_string();
    config.provider.app_certificate = "test-cert".to_string();
    config.provider.rest_key = "rest-key".to_string();
    config.provider.rest_secret = "rest-secret".to_string();
    config.recording.uid_pool_size = 100;
    config
}

struct ScriptedProvider {
    channels: Vec<ProviderChannel>,
    presence: ChannelPresence,
    acquire_calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(channels: Vec<(&str, u32)>, users: Vec<u32>) -> Self {
        Self {
            channels: channels
                .into_iter()
                .map(|(name, user_count)| ProviderChannel {
                    channel_name: name.to_string(),
                    user_count,
                })
                .collect(),
            presence: ChannelPresence {
                channel_exist: !users.is_empty(),
                users,
            },
            acquire_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RtcProvider for ScriptedProvider {
    async fn list_channels(&self) -> Result<Vec<ProviderChannel>, OrchestratorError> {
        Ok(self.channels.clone())
    }

    async fn channel_presence(
        &self,
        _channel: &str,
    ) -> Result<ChannelPresence, OrchestratorError> {
        Ok(self.presence.clone())
    }

    async fn acquire_resource(
        &self,
        _channel: &str,
        _uid: &str,
    ) -> Result<String, OrchestratorError> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        Ok("resource-77".to_string())
    }

    async fn start_recording(
        &self,
        _resource_id: &str,
        _channel: &str,
        _uid: &str,
        _params: &StartParams,
    ) -> Result<StartedRecording, OrchestratorError> {
        Ok(StartedRecording {
            sid: "sid-77".to_string(),
        })
    }

    async fn stop_recording(
        &self,
        _resource_id: &str,
        _sid: &str,
        _channel: &str,
        _uid: &str,
    ) -> Result<serde_json::Value, OrchestratorError> {
        Ok(serde_json::json!({"sid": "sid-77", "uploadingStatus": "uploaded"}))
    }
}

/// Object store over a shared in-memory listing. Uploads append to the
/// listing, so a later reconcile sees the archive.
#[derive(Clone, Default)]
struct MemoryStore {
    objects: Arc<Mutex<Vec<StoredObject>>>,
}

impl MemoryStore {
    fn seed(&self, keys: &[&str]) {
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.push(StoredObject {
                key: key.to_string(),
                url: format!("mem://bucket/{key}"),
            });
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<StoredObject>, OrchestratorError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|o| prefix.map_or(true, |p| o.key.contains(p)))
            .cloned()
            .collect())
    }

    async fn upload(
        &self,
        key: &str,
        source: &Path,
        _content_type: &str,
    ) -> Result<(), OrchestratorError> {
        assert!(source.exists());
        self.objects.lock().unwrap().push(StoredObject {
            key: key.to_string(),
            url: format!("mem://bucket/{key}"),
        });
        Ok(())
    }

    async fn download(&self, _url: &str, dest: &Path) -> Result<(), OrchestratorError> {
        tokio::fs::write(dest, b"segment").await?;
        Ok(())
    }
}

struct StaticDirectory(Vec<String>);

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn fetch_page(
        &self,
        _page_token: Option<&str>,
    ) -> Result<UserPage, OrchestratorError> {
        Ok(UserPage {
            users: self
                .0
                .iter()
                .map(|uid| DirectoryUser {
                    uid: uid.clone(),
                    display_name: Some(format!("User {uid}")),
                    email: None,
                    email_verified: true,
                    disabled: false,
                    admin: false,
                })
                .collect(),
            next_page_token: None,
        })
    }
}

struct WritingTranscoder;

#[async_trait]
impl Transcoder for WritingTranscoder {
    async fn transcode(&self, manifest: &Path, output: &Path) -> AnyResult<()> {
        assert!(manifest.exists());
        std::fs::write(output, b"mp3")?;
        Ok(())
    }
}

fn build(
    provider: Arc<ScriptedProvider>,
    store: MemoryStore,
    registry: Arc<SqliteRegistry>,
) -> Orchestrator {
    Orchestrator::new(
        &test_config(),
        provider,
        registry,
        Arc::new(store),
        Arc::new(StaticDirectory(vec!["7".to_string(), "19".to_string()])),
        Arc::new(WritingTranscoder),
    )
    .unwrap()
}

#[tokio::test]
async fn live_channel_appears_in_overview_before_any_recording() {
    let provider = Arc::new(ScriptedProvider::new(vec![("standup", 2)], vec![7, 19]));
    let store = MemoryStore::default();
    let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());
    registry_add(&registry, "standup", "u1").await;

    let orchestrator = build(provider, store, registry);
    let sets = orchestrator.channel_overview().await;

    assert_eq!(sets.live.len(), 1);
    assert_eq!(sets.live[0].channel_name, "standup");
    assert_eq!(sets.live[0].user_count, 2);
    assert_eq!(sets.live[0].host_uid, "u1");
    assert!(sets.recorded.is_empty());
}

#[tokio::test]
async fn auto_start_then_stop_archives_the_channel() {
    let provider = Arc::new(ScriptedProvider::new(vec![("standup", 2)], vec![7, 19]));
    let store = MemoryStore::default();
    store.seed(&["standup/index.m3u8", "standup/seg-0.ts", "standup/seg-1.ts"]);
    let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());
    registry_add(&registry, "standup", "u1").await;

    let orchestrator = build(Arc::clone(&provider), store.clone(), registry);

    let outcome = orchestrator.auto_start("standup", "7").await.unwrap();
    assert_eq!(outcome.resource_id, "resource-77");
    assert_eq!(outcome.sid, "sid-77");
    assert_eq!(provider.acquire_calls.load(Ordering::SeqCst), 1);

    let stop = orchestrator
        .stop_recording(&outcome.resource_id, &outcome.sid, "standup", &outcome.requester_uid)
        .await
        .unwrap();
    assert_eq!(stop.archived_key, "standup.mp3");
    assert_eq!(stop.provider_response["uploadingStatus"], "uploaded");

    // The archive is now visible to reconciliation and file lookup.
    let sets = orchestrator.channel_overview().await;
    assert_eq!(sets.recorded.len(), 1);
    assert_eq!(sets.recorded[0].title, "standup");

    let file = orchestrator.recorded_file("standup").await.unwrap().unwrap();
    assert_eq!(file.key, "standup.mp3");
}

#[tokio::test]
async fn auto_start_for_absent_target_makes_no_provider_writes() {
    let provider = Arc::new(ScriptedProvider::new(vec![("room-42", 2)], vec![7, 19]));
    let store = MemoryStore::default();
    let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());

    let orchestrator = build(Arc::clone(&provider), store, registry);

    let err = orchestrator.auto_start("room-42", "99").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::PreconditionFailed { .. }));
    assert_eq!(provider.acquire_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn overview_is_idempotent_for_unchanged_sources() {
    let provider = Arc::new(ScriptedProvider::new(vec![("standup", 2)], vec![7]));
    let store = MemoryStore::default();
    store.seed(&["standup.mp3", "retro/seg-0.ts"]);
    let registry = Arc::new(SqliteRegistry::open_in_memory().unwrap());
    registry_add(&registry, "standup", "u1").await;
    registry_add(&registry, "retro", "u2").await;

    let orchestrator = build(provider, store, registry);
    let first = orchestrator.channel_overview().await;
    let second = orchestrator.channel_overview().await;
    assert_eq!(first, second);
    assert_eq!(first.recorded.len(), 2);
}

async fn registry_add(registry: &Arc<SqliteRegistry>, title: &str, host: &str) {
    use voxrelay::registry::ChannelRegistry;
    registry.add_channel(title, host).await.unwrap();
}
