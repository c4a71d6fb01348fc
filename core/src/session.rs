//! Client session state
//!
//! One explicit context object owns everything the loops and runner share:
//! the account identity, the registered method, the results aggregator,
//! audio targets, and the single-invocation gate. It is created once per
//! process and passed by `Arc` rather than living in process globals.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::config::{self, AudioTargets, Settings};
use crate::contract::{ArgMap, MethodContract, ParamDescriptor, UiAnnotation};
use crate::error::{Result, WavebindError};
use crate::registry::{derive_identity, MethodHandler, MethodRegistry, RegisteredMethod};
use crate::results::ResultsAggregator;
use crate::runner::{self, RunGate};
use crate::storage::FileUploader;
use crate::tracer::{TraceStage, Tracer};

/// Async hook run once during announcement, bracketed by loaded-flag
/// updates; intended for model downloads and other slow warm-up work.
pub type SetupHook = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Descriptive fields carried on every contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub author: String,
    pub name: String,
    pub description: String,
    pub version: String,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            author: "Default Author".to_string(),
            name: "Default Name".to_string(),
            description: "Default Description".to_string(),
            version: "0.0.0".to_string(),
        }
    }
}

/// Tempo and rate reported by the calling session, recorded at dispatch
#[derive(Debug, Clone, Copy, Default)]
pub struct DawClock {
    pub bpm: f64,
    pub sample_rate: u32,
}

pub struct Session {
    settings: Settings,
    api: ApiClient,
    tracer: Tracer,
    token_locked: bool,
    master_token: RwLock<Option<Uuid>>,
    connection_type: RwLock<String>,
    metadata: RwLock<Metadata>,
    registry: RwLock<MethodRegistry>,
    results: Arc<Mutex<ResultsAggregator>>,
    gate: RunGate,
    clock: RwLock<DawClock>,
    input_targets: RwLock<AudioTargets>,
    output_targets: RwLock<AudioTargets>,
    setup_hook: RwLock<Option<SetupHook>>,
    shutdown: AtomicBool,
}

impl Session {
    pub fn new(settings: Settings) -> Arc<Self> {
        let api = ApiClient::new(settings.api_base_url.clone());
        let uploader = FileUploader::new(&settings);

        let env_token = settings.env_token.as_deref();
        let master_token = env_token.and_then(|t| Uuid::parse_str(t).ok());
        if env_token.is_some() && master_token.is_none() {
            tracing::warn!(
                "ignoring invalid {} value; token must be a UUID",
                config::ENV_MASTER_TOKEN
            );
        }
        let token_locked = master_token.is_some();

        let results = Arc::new(Mutex::new(ResultsAggregator::new(
            api.clone(),
            uploader,
            None,
            AudioTargets::default(),
        )));

        Arc::new(Self {
            settings,
            api,
            tracer: Tracer::default(),
            token_locked,
            master_token: RwLock::new(master_token),
            connection_type: RwLock::new("unknown".to_string()),
            metadata: RwLock::new(Metadata::default()),
            registry: RwLock::new(MethodRegistry::default()),
            results,
            gate: RunGate::new(),
            clock: RwLock::new(DawClock::default()),
            input_targets: RwLock::new(AudioTargets::default()),
            output_targets: RwLock::new(AudioTargets::default()),
            setup_hook: RwLock::new(None),
            shutdown: AtomicBool::new(false),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn gate(&self) -> &RunGate {
        &self.gate
    }

    pub fn results(&self) -> Arc<Mutex<ResultsAggregator>> {
        self.results.clone()
    }

    // =========================================================================
    // Account identity
    // =========================================================================

    /// Sets the account token. Ignored (with a log line) when the token was
    /// pinned through the environment.
    pub fn set_master_token(&self, token: &str) -> Result<()> {
        if self.token_locked {
            tracing::info!(
                "master token update ignored; {} is set",
                config::ENV_MASTER_TOKEN
            );
            return Ok(());
        }
        let parsed = Uuid::parse_str(token).map_err(|_| WavebindError::InvalidMasterToken {
            token: token.to_string(),
        })?;
        *self.master_token.write() = Some(parsed);
        Ok(())
    }

    pub fn master_token(&self) -> Option<Uuid> {
        *self.master_token.read()
    }

    // =========================================================================
    // Descriptive metadata
    // =========================================================================

    pub fn set_author(&self, author: &str) {
        self.update_metadata(|m| m.author = author.to_string());
    }

    pub fn set_name(&self, name: &str) {
        self.update_metadata(|m| m.name = name.to_string());
    }

    pub fn set_description(&self, description: &str) {
        self.update_metadata(|m| m.description = description.to_string());
    }

    pub fn set_version(&self, version: &str) {
        self.update_metadata(|m| m.version = version.to_string());
    }

    fn update_metadata(&self, apply: impl FnOnce(&mut Metadata)) {
        let snapshot = {
            let mut metadata = self.metadata.write();
            apply(&mut metadata);
            metadata.clone()
        };
        self.registry.write().sync_metadata(&snapshot);
    }

    pub fn metadata(&self) -> Metadata {
        self.metadata.read().clone()
    }

    pub fn set_connection_type(&self, connection_type: &str) {
        *self.connection_type.write() = connection_type.to_string();
    }

    pub fn connection_type(&self) -> String {
        self.connection_type.read().clone()
    }

    // =========================================================================
    // Audio targets
    // =========================================================================

    pub fn set_input_sample_rate(&self, value: u32) -> Result<()> {
        self.input_targets.write().set_sample_rate(value)
    }

    pub fn set_input_bit_depth(&self, value: u16) -> Result<()> {
        self.input_targets.write().set_bit_depth(value)
    }

    pub fn set_input_channels(&self, value: u16) -> Result<()> {
        self.input_targets.write().set_channels(value)
    }

    pub fn set_input_format(&self, value: &str) -> Result<()> {
        self.input_targets.write().set_format(value)
    }

    pub fn set_output_sample_rate(&self, value: u32) -> Result<()> {
        self.output_targets.write().set_sample_rate(value)
    }

    pub fn set_output_bit_depth(&self, value: u16) -> Result<()> {
        self.output_targets.write().set_bit_depth(value)
    }

    pub fn set_output_channels(&self, value: u16) -> Result<()> {
        self.output_targets.write().set_channels(value)
    }

    pub fn set_output_format(&self, value: &str) -> Result<()> {
        self.output_targets.write().set_format(value)
    }

    pub fn input_targets(&self) -> AudioTargets {
        *self.input_targets.read()
    }

    pub fn output_targets(&self) -> AudioTargets {
        *self.output_targets.read()
    }

    // =========================================================================
    // Session clock
    // =========================================================================

    pub fn set_clock(&self, bpm: f64, sample_rate: u32) {
        *self.clock.write() = DawClock { bpm, sample_rate };
    }

    pub fn bpm(&self) -> f64 {
        self.clock.read().bpm
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.read().sample_rate
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register_setup_hook(&self, hook: SetupHook) {
        *self.setup_hook.write() = Some(hook);
    }

    pub fn setup_hook(&self) -> Option<SetupHook> {
        self.setup_hook.read().clone()
    }

    /// Builds and installs the method contract, derives the connection
    /// identity, and rebinds the results aggregator to it.
    pub async fn register_method(
        &self,
        method_name: &str,
        descriptors: Vec<ParamDescriptor>,
        annotations: HashMap<String, UiAnnotation>,
        handler: MethodHandler,
    ) -> Result<Uuid> {
        let master = self.master_token().ok_or(WavebindError::MasterTokenNotSet)?;
        let metadata = self.metadata();
        let contract = MethodContract::build(method_name, &descriptors, &annotations, &metadata)?;
        let identity = derive_identity(&master, &contract)?;

        self.registry.write().install(RegisteredMethod {
            contract,
            identity,
            handler,
        });

        let uploader = FileUploader::new(&self.settings);
        *self.results.lock().await = ResultsAggregator::new(
            self.api.clone(),
            uploader,
            Some(identity),
            self.output_targets(),
        );

        self.tracer.event(
            Some(identity),
            TraceStage::RegisterMethod,
            &format!("registered method: {}", method_name),
        );
        Ok(identity)
    }

    pub fn identity(&self) -> Option<Uuid> {
        self.registry.read().identity()
    }

    pub fn contract(&self) -> Option<MethodContract> {
        self.registry.read().current().map(|m| m.contract.clone())
    }

    pub fn registered_method(&self, name: &str) -> Result<RegisteredMethod> {
        self.registry
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| WavebindError::MethodNotRegistered {
                name: name.to_string(),
            })
    }

    /// Runs the registered method directly, claiming the invocation gate
    pub async fn invoke(self: &Arc<Self>, name: &str, args: ArgMap) -> Result<()> {
        let guard = self
            .gate
            .try_begin()
            .ok_or(WavebindError::InvocationInProgress)?;
        runner::run(self.clone(), name.to_string(), args, guard, None).await
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ParamKind, UiAnnotation};

    fn noop_handler() -> MethodHandler {
        Arc::new(|_invocation| Box::pin(async { Ok(()) }))
    }

    fn descriptors() -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("a", ParamKind::Int),
            ParamDescriptor::new("b", ParamKind::Float).with_default(2.2),
            ParamDescriptor::new("c", ParamKind::Str).with_default("hi"),
        ]
    }

    #[tokio::test]
    async fn test_register_requires_master_token() {
        let session = Session::new(Settings::default());
        let err = session
            .register_method("f", descriptors(), HashMap::new(), noop_handler())
            .await
            .unwrap_err();
        assert!(matches!(err, WavebindError::MasterTokenNotSet));
    }

    #[tokio::test]
    async fn test_register_binds_identity_and_aggregator() {
        let session = Session::new(Settings::default());
        session
            .set_master_token(&Uuid::new_v4().to_string())
            .unwrap();

        let identity = session
            .register_method("f", descriptors(), HashMap::new(), noop_handler())
            .await
            .unwrap();

        assert_eq!(session.identity(), Some(identity));
        assert_ne!(Some(session.master_token().unwrap()), Some(identity));
        assert_eq!(session.results().lock().await.token(), Some(identity));

        // aggregator starts empty; the would-be envelope is a clean
        // completion
        let envelope = session.results().lock().await.build_envelope();
        assert_eq!(envelope.status, crate::protocol::MessageStatus::Completed);
        assert!(envelope.files.is_empty());
        assert_eq!(envelope.error, None);
        assert_eq!(envelope.message, None);
    }

    #[tokio::test]
    async fn test_reregistration_is_idempotent_per_identity() {
        let session = Session::new(Settings::default());
        session
            .set_master_token(&Uuid::new_v4().to_string())
            .unwrap();

        let first = session
            .register_method("f", descriptors(), HashMap::new(), noop_handler())
            .await
            .unwrap();
        let second = session
            .register_method("f", descriptors(), HashMap::new(), noop_handler())
            .await
            .unwrap();
        assert_eq!(first, second);

        session.set_description("something new");
        let third = session
            .register_method("f", descriptors(), HashMap::new(), noop_handler())
            .await
            .unwrap();
        assert_ne!(first, third);
    }

    #[tokio::test]
    async fn test_metadata_setters_sync_contract_without_rekeying() {
        let session = Session::new(Settings::default());
        session
            .set_master_token(&Uuid::new_v4().to_string())
            .unwrap();
        let identity = session
            .register_method("f", descriptors(), HashMap::new(), noop_handler())
            .await
            .unwrap();

        session.set_name("My Special Method");
        session.set_description("My Special Method Description");

        let contract = session.contract().unwrap();
        assert_eq!(contract.name, "My Special Method");
        assert_eq!(contract.description, "My Special Method Description");
        // identity recomputes only at re-registration
        assert_eq!(session.identity(), Some(identity));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_ui_annotation() {
        let session = Session::new(Settings::default());
        session
            .set_master_token(&Uuid::new_v4().to_string())
            .unwrap();

        let annotations = HashMap::from([(
            "a".to_string(),
            UiAnnotation {
                ui_component: Some(crate::contract::UiComponentKind::Slider),
                min: Some(0.0),
                ..Default::default()
            },
        )]);
        let err = session
            .register_method("f", descriptors(), annotations, noop_handler())
            .await
            .unwrap_err();
        assert!(matches!(err, WavebindError::MissingUiFields { .. }));
        // validation failure leaves nothing registered
        assert_eq!(session.identity(), None);
    }

    #[test]
    fn test_invalid_master_token_rejected() {
        let session = Session::new(Settings::default());
        let err = session.set_master_token("not-a-uuid").unwrap_err();
        assert!(matches!(err, WavebindError::InvalidMasterToken { .. }));
    }

    #[test]
    fn test_env_pinned_token_is_immutable() {
        let pinned = Uuid::new_v4();
        let settings = Settings {
            env_token: Some(pinned.to_string()),
            ..Settings::default()
        };
        let session = Session::new(settings);
        assert_eq!(session.master_token(), Some(pinned));

        // setter is silently ignored
        session
            .set_master_token(&Uuid::new_v4().to_string())
            .unwrap();
        assert_eq!(session.master_token(), Some(pinned));
    }

    #[test]
    fn test_audio_target_setters_validate() {
        let session = Session::new(Settings::default());
        assert!(session.set_output_sample_rate(48000).is_ok());
        assert!(session.set_output_sample_rate(12345).is_err());
        assert!(session.set_input_format("flac").is_ok());
        assert!(session.set_input_format("au").is_err());
        assert_eq!(session.output_targets().sample_rate, 48000);
    }

    #[tokio::test]
    async fn test_invoke_unregistered_method_fails() {
        let session = Session::new(Settings::default());
        let err = session.invoke("ghost", ArgMap::new()).await.unwrap_err();
        assert!(matches!(err, WavebindError::MethodNotRegistered { name } if name == "ghost"));
        // the gate is released again after the failed dispatch
        assert!(!session.gate().is_running());
    }
}
