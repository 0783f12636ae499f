//! Subcall Executor
//!
//! Combines the fragment cache with the generative client into one
//! idempotent unit of work. The execution mode decides the cache policy:
//!
//! | Mode | Cached | Not cached |
//! |------|--------|------------|
//! | `Generate` | regenerated | generated |
//! | `Resume` | reused if longer than `min_cached_chars` | generated |
//! | `AssembleOnly` | reused if non-empty | placeholder |
//!
//! `AssembleOnly` never creates a client, so it never reaches the network.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::plan::MediaSpec;
use super::prompts::{PromptArgs, PromptBuilder};
use super::subcall::Subcall;
use crate::ai::{
    ContextHandle, EffortLevel, GenerativeClient, ProviderConfig, RetryPolicy, SharedBackend,
    create_backend,
};
use crate::config::LlmConfig;
use crate::storage::SharedCache;
use crate::types::{CacheKey, ForgeError, Result};

/// Cache policy for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Always call the service
    #[default]
    Generate,
    /// Reuse substantial cached fragments
    Resume,
    /// Rebuild from cache only
    AssembleOnly,
}

impl ExecutionMode {
    pub fn uses_network(&self) -> bool {
        !matches!(self, Self::AssembleOnly)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Resume => "resume",
            Self::AssembleOnly => "assemble-only",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text returned for a missing fragment in assemble-only mode
pub fn placeholder(key: &CacheKey) -> String {
    format!("[{} not generated: assemble-only mode without cache]", key)
}

// =============================================================================
// Client Factory
// =============================================================================

/// Creates an independent client per subcall
pub trait ClientFactory: Send + Sync {
    fn create_client(&self, credential: &SecretString) -> Result<GenerativeClient>;
}

/// Builds a fresh backend from configuration for every client
pub struct ConfiguredClientFactory {
    llm: LlmConfig,
}

impl ConfiguredClientFactory {
    pub fn new(llm: LlmConfig) -> Self {
        Self { llm }
    }
}

impl ClientFactory for ConfiguredClientFactory {
    fn create_client(&self, credential: &SecretString) -> Result<GenerativeClient> {
        let provider = ProviderConfig::from_llm_config(&self.llm, credential.clone());
        let backend = create_backend(&provider)?;
        Ok(GenerativeClient::new(
            backend,
            RetryPolicy::from_config(&self.llm),
            self.llm.timeout(),
        ))
    }
}

/// Wraps one existing backend; the credential is ignored
pub struct BackendClientFactory {
    backend: SharedBackend,
    policy: RetryPolicy,
    timeout: std::time::Duration,
}

impl BackendClientFactory {
    pub fn new(backend: SharedBackend, policy: RetryPolicy, timeout: std::time::Duration) -> Self {
        Self {
            backend,
            policy,
            timeout,
        }
    }
}

impl ClientFactory for BackendClientFactory {
    fn create_client(&self, _credential: &SecretString) -> Result<GenerativeClient> {
        Ok(GenerativeClient::new(
            Arc::clone(&self.backend),
            self.policy.clone(),
            self.timeout,
        ))
    }
}

// =============================================================================
// Executor
// =============================================================================

pub struct SubcallExecutor {
    cache: SharedCache,
    clients: Arc<dyn ClientFactory>,
    prompts: Arc<dyn PromptBuilder>,
    credential: SecretString,
    mode: ExecutionMode,
    min_cached_chars: usize,
    shared_context_path: Option<PathBuf>,
    /// Uploaded on first use, at most once per run
    shared_context: OnceCell<ContextHandle>,
}

impl SubcallExecutor {
    pub fn new(
        cache: SharedCache,
        clients: Arc<dyn ClientFactory>,
        prompts: Arc<dyn PromptBuilder>,
        credential: SecretString,
        mode: ExecutionMode,
        min_cached_chars: usize,
    ) -> Self {
        Self {
            cache,
            clients,
            prompts,
            credential,
            mode,
            min_cached_chars,
            shared_context_path: None,
            shared_context: OnceCell::new(),
        }
    }

    pub fn with_shared_context(mut self, path: Option<PathBuf>) -> Self {
        self.shared_context_path = path;
        self
    }

    pub fn has_shared_context(&self) -> bool {
        self.shared_context_path.is_some()
    }

    /// Produce the text for one cache key under the run's mode
    pub async fn execute(
        &self,
        key: &CacheKey,
        builder: &dyn PromptBuilder,
        args: &PromptArgs,
        effort: EffortLevel,
        uses_shared_context: bool,
    ) -> Result<String> {
        if let Some(cached) = self.cached(key).await? {
            info!("Cache: {} ({} chars)", key, cached.len());
            return Ok(cached);
        }

        if self.mode == ExecutionMode::AssembleOnly {
            warn!("Not cached: {} (assemble-only)", key);
            return Ok(placeholder(key));
        }

        let parts = builder.build(args);
        let client = self.clients.create_client(&self.credential)?;

        let shared = if uses_shared_context {
            self.shared_context(&client).await?
        } else {
            None
        };

        let text = client
            .generate(shared, &parts.instructions(), &parts.attachments, effort)
            .await?;

        self.cache.put(key, &text).await?;
        info!("Generated: {} ({} chars)", key, text.len());
        Ok(text)
    }

    /// Execute a subcall with the executor's prompt builder
    pub async fn run_subcall(&self, subcall: &Subcall) -> Result<String> {
        self.execute(
            &subcall.key,
            self.prompts.as_ref(),
            &subcall.args,
            subcall.effort,
            subcall.uses_shared_context,
        )
        .await
    }

    /// Produce one media asset; failures degrade to `None`.
    pub async fn execute_media(&self, spec: &MediaSpec) -> Option<PathBuf> {
        let exists = tokio::fs::try_exists(&spec.output).await.unwrap_or(false);

        match self.mode {
            ExecutionMode::AssembleOnly => {
                if !exists {
                    warn!("Media {} missing (assemble-only)", spec.name);
                }
                return exists.then(|| spec.output.clone());
            }
            ExecutionMode::Resume if exists => {
                info!("Media reused: {}", spec.output.display());
                return Some(spec.output.clone());
            }
            _ => {}
        }

        match self.generate_media(spec).await {
            Ok(Some(path)) => Some(path),
            Ok(None) => {
                warn!("Media {} produced no asset", spec.name);
                None
            }
            Err(e) => {
                warn!("Media {} failed: {}", spec.name, e);
                None
            }
        }
    }

    async fn generate_media(&self, spec: &MediaSpec) -> Result<Option<PathBuf>> {
        let parts = self.prompts.build(&PromptArgs::MediaAsset { spec: spec.clone() });
        let client = self.clients.create_client(&self.credential)?;

        let Some(asset) = client.generate_media(&parts.instructions()).await? else {
            return Ok(None);
        };

        write_asset(&spec.output, &asset.data).await?;
        info!(
            "Media generated: {} ({} KB)",
            spec.output.display(),
            asset.data.len() / 1024
        );
        Ok(Some(spec.output.clone()))
    }

    async fn cached(&self, key: &CacheKey) -> Result<Option<String>> {
        let threshold = match self.mode {
            ExecutionMode::Generate => return Ok(None),
            ExecutionMode::Resume => self.min_cached_chars,
            ExecutionMode::AssembleOnly => 0,
        };

        match self.cache.get(key).await? {
            Some(text) if text.trim().chars().count() > threshold => Ok(Some(text)),
            Some(text) => {
                debug!("Cached {} too short ({} chars), ignoring", key, text.len());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn shared_context(&self, client: &GenerativeClient) -> Result<Option<&ContextHandle>> {
        let Some(path) = self.shared_context_path.as_deref() else {
            return Ok(None);
        };

        let handle = self
            .shared_context
            .get_or_try_init(|| async {
                info!("Uploading shared context {}", path.display());
                client.upload_shared_context(path).await
            })
            .await?;
        Ok(Some(handle))
    }
}

async fn write_asset(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await.map_err(ForgeError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::mock::{Behavior, ScriptedBackend};
    use crate::report::prompts::DefaultPrompts;
    use crate::storage::{CacheStore, MemoryCacheStore};
    use crate::types::ErrorCategory;
    use std::time::Duration;
    use tempfile::TempDir;

    fn executor(
        backend: Arc<ScriptedBackend>,
        cache: Arc<MemoryCacheStore>,
        mode: ExecutionMode,
    ) -> SubcallExecutor {
        let factory = BackendClientFactory::new(
            backend,
            RetryPolicy::immediate(3),
            Duration::from_secs(5),
        );
        SubcallExecutor::new(
            cache,
            Arc::new(factory),
            Arc::new(DefaultPrompts::default()),
            SecretString::from("test-key".to_string()),
            mode,
            50,
        )
    }

    fn args() -> PromptArgs {
        PromptArgs::Conclusions {
            report_text: "chapters".into(),
        }
    }

    async fn conclusions(exec: &SubcallExecutor) -> Result<String> {
        let key = CacheKey::new("conclusions");
        exec.execute(&key, &DefaultPrompts::default(), &args(), EffortLevel::High, false)
            .await
    }

    const LONG: &str = "This cached fragment is comfortably longer than fifty characters.";

    #[tokio::test]
    async fn test_generate_ignores_cache_and_overwrites() {
        let backend = Arc::new(ScriptedBackend::echo());
        let cache = Arc::new(MemoryCacheStore::new().with_fragment("conclusions", LONG));
        let exec = executor(backend.clone(), cache.clone(), ExecutionMode::Generate);

        let text = conclusions(&exec).await.unwrap();

        assert_eq!(backend.call_count(), 1);
        assert_ne!(text, LONG);
        assert_eq!(
            cache.get(&CacheKey::new("conclusions")).await.unwrap(),
            Some(text)
        );
    }

    #[tokio::test]
    async fn test_resume_reuses_substantial_cache() {
        let backend = Arc::new(ScriptedBackend::echo());
        let cache = Arc::new(MemoryCacheStore::new().with_fragment("conclusions", LONG));
        let exec = executor(backend.clone(), cache.clone(), ExecutionMode::Resume);

        let text = conclusions(&exec).await.unwrap();

        assert_eq!(text, LONG);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_regenerates_trivial_cache() {
        let backend = Arc::new(ScriptedBackend::echo());
        let cache = Arc::new(MemoryCacheStore::new().with_fragment("conclusions", "stub"));
        let exec = executor(backend.clone(), cache, ExecutionMode::Resume);

        conclusions(&exec).await.unwrap();
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_assemble_only_placeholder_without_client() {
        let backend = Arc::new(ScriptedBackend::new(Behavior::AlwaysFail(ErrorCategory::Auth)));
        let cache = Arc::new(MemoryCacheStore::new().with_fragment("ch1_a_context", "short"));
        let exec = executor(backend.clone(), cache.clone(), ExecutionMode::AssembleOnly);
        let prompts = DefaultPrompts::default();

        let cached = exec
            .execute(&CacheKey::new("ch1_a_context"), &prompts, &args(), EffortLevel::Low, true)
            .await
            .unwrap();
        assert_eq!(cached, "short");

        let missing = exec
            .execute(&CacheKey::new("conclusions"), &prompts, &args(), EffortLevel::Low, true)
            .await
            .unwrap();
        assert_eq!(missing, placeholder(&CacheKey::new("conclusions")));
        assert!(missing.contains("conclusions not generated"));

        assert_eq!(backend.call_count(), 0);
        assert_eq!(backend.upload_count(), 0);
        // Placeholders are never cached
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_shared_context_uploaded_once_across_subcalls() {
        let temp_dir = TempDir::new().unwrap();
        let doc = temp_dir.path().join("source.pdf");
        std::fs::write(&doc, b"%PDF").unwrap();

        let backend = Arc::new(ScriptedBackend::echo());
        let cache = Arc::new(MemoryCacheStore::new());
        let exec = Arc::new(
            executor(backend.clone(), cache, ExecutionMode::Generate)
                .with_shared_context(Some(doc)),
        );

        let mut handles = Vec::new();
        for i in 0..4 {
            let exec = Arc::clone(&exec);
            handles.push(tokio::spawn(async move {
                exec.execute(
                    &CacheKey::new(format!("ch{}_a_context", i)),
                    &DefaultPrompts::default(),
                    &args(),
                    EffortLevel::Low,
                    true,
                )
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(backend.upload_count(), 1);
        assert_eq!(backend.call_count(), 4);
        assert!(backend.requests().iter().all(|r| r.has_shared_context()));
    }

    #[tokio::test]
    async fn test_shared_context_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let doc = temp_dir.path().join("source.pdf");
        std::fs::write(&doc, b"%PDF").unwrap();

        let backend = Arc::new(ScriptedBackend::echo().with_failing_upload());
        let cache = Arc::new(MemoryCacheStore::new());
        let exec = executor(backend.clone(), cache, ExecutionMode::Generate)
            .with_shared_context(Some(doc));

        let key = CacheKey::new("ch1_a_context");
        let result = exec
            .execute(&key, &DefaultPrompts::default(), &args(), EffortLevel::Low, true)
            .await;
        assert!(matches!(result, Err(ForgeError::SharedContext(_))));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_media_written_then_reused_on_resume() {
        let temp_dir = TempDir::new().unwrap();
        let spec = MediaSpec {
            name: "diagram".into(),
            instructions: "draw".into(),
            output: temp_dir.path().join("media/diagram.png"),
        };

        let backend = Arc::new(ScriptedBackend::echo());
        let cache = Arc::new(MemoryCacheStore::new());
        let generate = executor(backend.clone(), cache.clone(), ExecutionMode::Generate);
        assert_eq!(generate.execute_media(&spec).await, Some(spec.output.clone()));
        assert!(spec.output.exists());

        let resume = executor(backend.clone(), cache, ExecutionMode::Resume);
        assert_eq!(resume.execute_media(&spec).await, Some(spec.output.clone()));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_media_failures_degrade() {
        let temp_dir = TempDir::new().unwrap();
        let spec = MediaSpec {
            name: "diagram".into(),
            instructions: "draw".into(),
            output: temp_dir.path().join("diagram.png"),
        };

        let no_asset = Arc::new(ScriptedBackend::echo().without_media());
        let exec = executor(no_asset, Arc::new(MemoryCacheStore::new()), ExecutionMode::Generate);
        assert_eq!(exec.execute_media(&spec).await, None);

        let failing = Arc::new(ScriptedBackend::new(Behavior::AlwaysFail(ErrorCategory::Auth)));
        let exec = executor(failing, Arc::new(MemoryCacheStore::new()), ExecutionMode::Generate);
        assert_eq!(exec.execute_media(&spec).await, None);

        let offline = Arc::new(ScriptedBackend::echo());
        let exec = executor(
            offline.clone(),
            Arc::new(MemoryCacheStore::new()),
            ExecutionMode::AssembleOnly,
        );
        assert_eq!(exec.execute_media(&spec).await, None);
        assert_eq!(offline.call_count(), 0);
    }
}
