//! Top-level orchestration.
//!
//! Composes the allocator, reconciler, session machine, and conversion
//! pipeline into the public operations: token issuance, channel overview,
//! the auto-start workflow, and the manual recording surface. Holds no
//! cross-request state; the external systems are the only sources of
//! truth.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::allocator::UidAllocator;
use crate::config::Config;
use crate::directory::{self, DirectoryUser, UserDirectory};
use crate::error::OrchestratorError;
use crate::pipeline::{ConversionPipeline, Transcoder};
use crate::provider::token::{Role, TokenMinter};
use crate::provider::RtcProvider;
use crate::reconcile::{ChannelReconciler, ChannelSets};
use crate::registry::ChannelRegistry;
use crate::session::{RecordingSession, SessionMachine};
use crate::storage::{ObjectStore, StoredObject};

#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub token: String,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoStartOutcome {
    pub resource_id: String,
    pub sid: String,
    pub requester_uid: String,
    pub requester_token: String,
    pub target_uid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub provider_response: Value,
    pub archived_key: String,
}

pub struct Orchestrator {
    provider: Arc<dyn RtcProvider>,
    registry: Arc<dyn ChannelRegistry>,
    storage: Arc<dyn ObjectStore>,
    directory: Arc<dyn UserDirectory>,
    reconciler: ChannelReconciler,
    sessions: SessionMachine,
    pipeline: ConversionPipeline,
    tokens: TokenMinter,
    allocator: UidAllocator,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Fails with a `Config` error when credentials are missing; nothing
    /// here exits the process.
    pub fn new(
        config: &Config,
        provider: Arc<dyn RtcProvider>,
        registry: Arc<dyn ChannelRegistry>,
        storage: Arc<dyn ObjectStore>,
        directory: Arc<dyn UserDirectory>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let reconciler = ChannelReconciler::new(
            Arc::clone(&provider),
            Arc::clone(&registry),
            Arc::clone(&storage),
        );
        let sessions = SessionMachine::new(Arc::clone(&provider));
        let pipeline = ConversionPipeline::new(Arc::clone(&storage), transcoder);
        let tokens = TokenMinter::new(
            config.provider.app_id.clone(),
            config.provider.app_certificate.clone(),
            config.provider.token_expiry_seconds,
        );
        let allocator = UidAllocator::new(
            config.recording.uid_pool_size,
            config.recording.max_alloc_attempts,
        );

        Ok(Self {
            provider,
            registry,
            storage,
            directory,
            reconciler,
            sessions,
            pipeline,
            tokens,
            allocator,
        })
    }

    /// Mint a join token. The caller is a subscriber when the channel is
    /// already live, a publisher when they would be first in. Liveness is
    /// recomputed on every mint, never cached.
    pub async fn issue_token(&self, uid: &str, channel_name: &str) -> TokenGrant {
        let sets = self.reconciler.reconcile().await;
        let live = sets
            .live
            .iter()
            .any(|c| c.channel_name == channel_name && c.user_count > 0);

        let role = if live { Role::Subscriber } else { Role::Publisher };
        let numeric_uid = self.allocator.numeric_uid(uid).to_string();
        TokenGrant {
            token: self.tokens.build_token(channel_name, &numeric_uid, role),
            is_host: !live,
        }
    }

    pub async fn channel_overview(&self) -> ChannelSets {
        self.reconciler.reconcile().await
    }

    pub async fn create_channel(
        &self,
        title: &str,
        host_uid: &str,
    ) -> Result<i64, OrchestratorError> {
        let id = self.registry.add_channel(title, host_uid).await?;
        info!("Registered channel '{title}' (host {host_uid})");
        Ok(id)
    }

    pub async fn list_users(&self) -> Result<Vec<DirectoryUser>, OrchestratorError> {
        directory::list_all_users(self.directory.as_ref()).await
    }

    /// Manual surface: reserve recording capacity for a channel.
    pub async fn request_recording(
        &self,
        channel_name: &str,
        uid: &str,
        token: &str,
    ) -> Result<String, OrchestratorError> {
        let mut session = RecordingSession::new(channel_name, uid, token);
        self.sessions.acquire(&mut session).await
    }

    /// Manual surface: start a previously acquired recording.
    pub async fn start_recording(
        &self,
        resource_id: &str,
        channel_name: &str,
        token: &str,
        uid: &str,
        target_uid: Option<String>,
    ) -> Result<String, OrchestratorError> {
        let mut session = RecordingSession::resume_acquired(
            channel_name,
            uid,
            token,
            target_uid,
            resource_id,
        );
        self.sessions.start(&mut session).await
    }

    /// Manual surface: stop a running recording, then convert and archive
    /// it. The provider payload comes back only when the archive landed;
    /// a stop rejection surfaces as the distinct leak class.
    pub async fn stop_recording(
        &self,
        resource_id: &str,
        sid: &str,
        channel_name: &str,
        uid: &str,
    ) -> Result<StopOutcome, OrchestratorError> {
        let mut session =
            RecordingSession::resume_started(channel_name, uid, resource_id, sid);
        let provider_response = self.sessions.stop(&mut session).await?;

        let objects = self.storage.list_objects(Some(channel_name)).await?;
        let urls: Vec<String> = objects.into_iter().map(|o| o.url).collect();
        let archived = self.pipeline.convert(channel_name, &urls).await?;

        Ok(StopOutcome {
            provider_response,
            archived_key: archived.key,
        })
    }

    /// Auto-start: record `target_uid` in `channel_name` under a freshly
    /// allocated requester identity, but only if the target has already
    /// joined.
    pub async fn auto_start(
        &self,
        channel_name: &str,
        target_uid: &str,
    ) -> Result<AutoStartOutcome, OrchestratorError> {
        // Exclusion set over every known identity, so the requester uid
        // cannot alias a real user.
        let users = directory::list_all_users(self.directory.as_ref()).await?;
        let excluded = self
            .allocator
            .exclusion_set(users.iter().map(|u| u.uid.as_str()));

        let requester_uid = self.allocator.allocate(&excluded)?.to_string();
        // The requester is synthetic, never a real participant: publisher.
        let requester_token =
            self.tokens
                .build_token(channel_name, &requester_uid, Role::Publisher);
        info!(
            "Auto-start on '{}': requester uid {} allocated ({} identities excluded)",
            channel_name,
            requester_uid,
            excluded.len()
        );

        let presence = self.provider.channel_presence(channel_name).await?;
        let target_numeric = self.allocator.numeric_uid(target_uid);
        if !presence.channel_exist || !presence.users.contains(&target_numeric) {
            return Err(OrchestratorError::PreconditionFailed {
                channel: channel_name.to_string(),
                target_uid: target_uid.to_string(),
            });
        }

        let mut session =
            RecordingSession::new(channel_name, requester_uid.clone(), requester_token.clone())
                .with_target(target_uid);
        let resource_id = self.sessions.acquire(&mut session).await?;
        let sid = self.sessions.start(&mut session).await?;

        Ok(AutoStartOutcome {
            resource_id,
            sid,
            requester_uid,
            requester_token,
            target_uid: target_uid.to_string(),
        })
    }

    /// The channel's archived MP3, if one exists.
    pub async fn recorded_file(
        &self,
        channel_name: &str,
    ) -> Result<Option<StoredObject>, OrchestratorError> {
        let objects = self.storage.list_objects(Some(channel_name)).await?;
        Ok(objects.into_iter().find(|o| o.key.ends_with(".mp3")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::UserPage;
    use crate::provider::{ChannelPresence, ProviderChannel, StartParams, StartedRecording};
    use crate::registry::ChannelRecord;
    use anyhow::Result as AnyResult;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn config() -> Config {
        let mut config = Config::default();
        config.provider.app_id = "app".to_string();
        config.provider.app_certificate = "cert".to_string();
        config.provider.rest_key = "key".to_string();
        config.provider.rest_secret = "secret".to_string();
        config.recording.uid_pool_size = 64;
        config
    }

    #[derive(Default)]
    struct FakeProvider {
        channels: Vec<(String, u32)>,
        presence: Option<ChannelPresence>,
        acquire_calls: AtomicUsize,
        start_subscription: Mutex<Option<StartParams>>,
    }

    #[async_trait]
    impl RtcProvider for FakeProvider {
        async fn list_channels(&self) -> Result<Vec<ProviderChannel>, OrchestratorError> {
            Ok(self
                .channels
                .iter()
                .map(|(name, count)| ProviderChannel {
                    channel_name: name.clone(),
                    user_count: *count,
                })
                .collect())
        }

        async fn channel_presence(
            &self,
            _channel: &str,
        ) -> Result<ChannelPresence, OrchestratorError> {
            Ok(self.presence.clone().unwrap_or_default())
        }

        async fn acquire_resource(
            &self,
            _channel: &str,
            _uid: &str,
        ) -> Result<String, OrchestratorError> {
            self.acquire_calls.fetch_add(1, Ordering::SeqCst);
            Ok("resource-9".to_string())
        }

        async fn start_recording(
            &self,
            _resource_id: &str,
            _channel: &str,
            _uid: &str,
            params: &StartParams,
        ) -> Result<StartedRecording, OrchestratorError> {
            *self.start_subscription.lock().unwrap() = Some(params.clone());
            Ok(StartedRecording {
                sid: "sid-9".to_string(),
            })
        }

        async fn stop_recording(
            &self,
            _resource_id: &str,
            _sid: &str,
            _channel: &str,
            _uid: &str,
        ) -> Result<Value, OrchestratorError> {
            Ok(serde_json::json!({"sid": "sid-9"}))
        }
    }

    struct FakeRegistry(Vec<ChannelRecord>);

    #[async_trait]
    impl ChannelRegistry for FakeRegistry {
        async fn list_channels(&self) -> Result<Vec<ChannelRecord>, OrchestratorError> {
            Ok(self.0.clone())
        }

        async fn add_channel(
            &self,
            _title: &str,
            _host_uid: &str,
        ) -> Result<i64, OrchestratorError> {
            Ok(1)
        }
    }

    #[derive(Default)]
    struct FakeStore {
        objects: Vec<StoredObject>,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn list_objects(
            &self,
            _prefix: Option<&str>,
        ) -> Result<Vec<StoredObject>, OrchestratorError> {
            Ok(self.objects.clone())
        }

        async fn upload(
            &self,
            _key: &str,
            _source: &Path,
            _content_type: &str,
        ) -> Result<(), OrchestratorError> {
            Ok(())
        }

        async fn download(&self, _url: &str, dest: &Path) -> Result<(), OrchestratorError> {
            tokio::fs::write(dest, b"segment").await?;
            Ok(())
        }
    }

    struct FakeDirectory(Vec<String>);

    #[async_trait]
    impl UserDirectory for FakeDirectory {
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
                        display_name: None,
                        email: None,
                        email_verified: false,
                        disabled: false,
                        admin: false,
                    })
                    .collect(),
                next_page_token: None,
            })
        }
    }

    struct NoopTranscoder;

    #[async_trait]
    impl Transcoder for NoopTranscoder {
        async fn transcode(&self, _manifest: &Path, output: &Path) -> AnyResult<()> {
            std::fs::write(output, b"mp3")?;
            Ok(())
        }
    }

    fn orchestrator(provider: FakeProvider, directory_users: Vec<String>) -> Orchestrator {
        orchestrator_with(provider, directory_users, FakeStore::default(), Vec::new())
    }

    fn orchestrator_with(
        provider: FakeProvider,
        directory_users: Vec<String>,
        store: FakeStore,
        registry: Vec<ChannelRecord>,
    ) -> Orchestrator {
        Orchestrator::new(
            &config(),
            Arc::new(provider),
            Arc::new(FakeRegistry(registry)),
            Arc::new(store),
            Arc::new(FakeDirectory(directory_users)),
            Arc::new(NoopTranscoder),
        )
        .unwrap()
    }

    #[test]
    fn missing_credentials_fail_construction() {
        let err = Orchestrator::new(
            &Config::default(),
            Arc::new(FakeProvider::default()),
            Arc::new(FakeRegistry(Vec::new())),
            Arc::new(FakeStore::default()),
            Arc::new(FakeDirectory(Vec::new())),
            Arc::new(NoopTranscoder),
        )
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[tokio::test]
    async fn auto_start_aborts_when_target_is_absent() {
        // Channel "room-42" has users [7, 19]; target 99 is not among them.
        let provider = FakeProvider {
            presence: Some(ChannelPresence {
                channel_exist: true,
                users: vec![7, 19],
            }),
            ..Default::default()
        };
        let orchestrator = orchestrator(provider, vec!["7".to_string(), "19".to_string()]);

        let err = orchestrator.auto_start("room-42", "99").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn auto_start_makes_no_provider_writes_on_precondition_failure() {
        let provider = Arc::new(FakeProvider {
            presence: Some(ChannelPresence {
                channel_exist: true,
                users: vec![7, 19],
            }),
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(
            &config(),
            Arc::clone(&provider) as Arc<dyn RtcProvider>,
            Arc::new(FakeRegistry(Vec::new())),
            Arc::new(FakeStore::default()),
            Arc::new(FakeDirectory(Vec::new())),
            Arc::new(NoopTranscoder),
        )
        .unwrap();

        orchestrator.auto_start("room-42", "99").await.unwrap_err();
        assert_eq!(provider.acquire_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_start_missing_channel_is_a_precondition_failure() {
        let provider = FakeProvider {
            presence: Some(ChannelPresence {
                channel_exist: false,
                users: Vec::new(),
            }),
            ..Default::default()
        };
        let orchestrator = orchestrator(provider, Vec::new());

        let err = orchestrator.auto_start("gone", "7").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::PreconditionFailed { .. }));
    }

    #[tokio::test]
    async fn auto_start_runs_the_full_acquire_start_sequence() {
        let provider = Arc::new(FakeProvider {
            presence: Some(ChannelPresence {
                channel_exist: true,
                users: vec![7, 19],
            }),
            ..Default::default()
        });
        let orchestrator = Orchestrator::new(
            &config(),
            Arc::clone(&provider) as Arc<dyn RtcProvider>,
            Arc::new(FakeRegistry(Vec::new())),
            Arc::new(FakeStore::default()),
            Arc::new(FakeDirectory(vec!["7".to_string(), "19".to_string()])),
            Arc::new(NoopTranscoder),
        )
        .unwrap();

        let outcome = orchestrator.auto_start("room-42", "7").await.unwrap();
        assert_eq!(outcome.resource_id, "resource-9");
        assert_eq!(outcome.sid, "sid-9");
        assert_eq!(outcome.target_uid, "7");
        assert!(!outcome.requester_token.is_empty());

        // The allocated requester never aliases a known identity.
        let requester: u32 = outcome.requester_uid.parse().unwrap();
        assert!(requester < 64);
        assert_ne!(requester, 7);
        assert_ne!(requester, 19);

        // Recording is filtered to the target's audio only.
        let params = provider.start_subscription.lock().unwrap().clone().unwrap();
        assert_eq!(
            params.subscription,
            crate::provider::AudioSubscription::Single("7".to_string())
        );
        assert_eq!(provider.acquire_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn issue_token_marks_caller_host_when_channel_is_not_live() {
        let orchestrator = orchestrator(FakeProvider::default(), Vec::new());
        let grant = orchestrator.issue_token("7", "brand-new").await;
        assert!(grant.is_host);
        assert!(!grant.token.is_empty());
    }

    #[tokio::test]
    async fn issue_token_marks_caller_subscriber_when_channel_is_live() {
        let provider = FakeProvider {
            channels: vec![("standup".to_string(), 2)],
            ..Default::default()
        };
        let registry = vec![ChannelRecord {
            id: 1,
            title: "standup".to_string(),
            host_uid: "u1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }];
        let orchestrator =
            orchestrator_with(provider, Vec::new(), FakeStore::default(), registry);

        let grant = orchestrator.issue_token("7", "standup").await;
        assert!(!grant.is_host);
    }

    #[tokio::test]
    async fn stop_recording_converts_and_reports_the_archive_key() {
        let store = FakeStore {
            objects: vec![
                StoredObject {
                    key: "standup/seg-0.ts".to_string(),
                    url: "https://cdn/standup/seg-0.ts".to_string(),
                },
                StoredObject {
                    key: "standup/index.m3u8".to_string(),
                    url: "https://cdn/standup/index.m3u8".to_string(),
                },
            ],
        };
        let orchestrator =
            orchestrator_with(FakeProvider::default(), Vec::new(), store, Vec::new());

        let outcome = orchestrator
            .stop_recording("resource-9", "sid-9", "standup", "9001")
            .await
            .unwrap();
        assert_eq!(outcome.archived_key, "standup.mp3");
        assert_eq!(outcome.provider_response["sid"], "sid-9");
    }

    #[tokio::test]
    async fn recorded_file_returns_only_mp3_keys() {
        let store = FakeStore {
            objects: vec![
                StoredObject {
                    key: "standup/seg-0.ts".to_string(),
                    url: "https://cdn/a".to_string(),
                },
                StoredObject {
                    key: "standup.mp3".to_string(),
                    url: "https://cdn/b".to_string(),
                },
            ],
        };
        let orchestrator =
            orchestrator_with(FakeProvider::default(), Vec::new(), store, Vec::new());

        let file = orchestrator.recorded_file("standup").await.unwrap().unwrap();
        assert_eq!(file.key, "standup.mp3");
    }
}
