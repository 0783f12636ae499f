//! Scripted backend for tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    ContextHandle, GenerationRequest, GenerationResponse, GenerativeBackend, MediaAsset,
    UploadRequest,
};
use crate::types::{ErrorCategory, ForgeError, LlmError, Result};

/// How the scripted backend answers generation calls
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Succeed with text derived from the request
    Echo,
    /// Succeed with a fixed reply
    Reply(String),
    /// Fail every call with the given category
    AlwaysFail(ErrorCategory),
    /// Fail the first `failures` calls, then echo
    FailThenSucceed {
        failures: u32,
        category: ErrorCategory,
    },
}

pub(crate) struct ScriptedBackend {
    behavior: Behavior,
    produce_media: bool,
    fail_upload: bool,
    delay: Duration,
    calls: AtomicU32,
    uploads: AtomicU32,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            produce_media: true,
            fail_upload: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            uploads: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn echo() -> Self {
        Self::new(Behavior::Echo)
    }

    /// Media requests come back text-only
    pub(crate) fn without_media(mut self) -> Self {
        self.produce_media = false;
        self
    }

    pub(crate) fn with_failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    /// Simulated latency per generation call
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn upload_count(&self) -> u32 {
        self.uploads.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn echo_text(request: &GenerationRequest, call: u32) -> String {
        let instructions = request.instruction_text();
        let head: String = instructions.chars().take(60).collect();
        format!(
            "Generated section #{} ({} attachments) responding to: {}",
            call,
            request.attachment_count(),
            head
        )
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn upload(&self, request: UploadRequest) -> Result<ContextHandle> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload {
            return Err(ForgeError::Llm(LlmError::new(
                ErrorCategory::BadRequest,
                "upload rejected",
            )));
        }
        Ok(ContextHandle {
            name: format!("files/{}", request.display_name),
            uri: format!("mock://files/{}", request.display_name),
            mime_type: request.mime_type,
        })
    }

    async fn generate_content(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let text = match &self.behavior {
            Behavior::Echo => Self::echo_text(request, call),
            Behavior::Reply(reply) => reply.clone(),
            Behavior::AlwaysFail(category) => {
                return Err(ForgeError::Llm(LlmError::with_provider(
                    *category,
                    format!("scripted failure #{}", call),
                    "mock",
                )));
            }
            Behavior::FailThenSucceed { failures, category } => {
                if call <= *failures {
                    return Err(ForgeError::Llm(LlmError::with_provider(
                        *category,
                        format!("scripted failure #{}", call),
                        "mock",
                    )));
                }
                Self::echo_text(request, call)
            }
        };

        let media = if request.want_media && self.produce_media {
            vec![MediaAsset {
                mime_type: "image/png".to_string(),
                data: vec![0x89, b'P', b'N', b'G'],
            }]
        } else {
            Vec::new()
        };

        Ok(GenerationResponse {
            text,
            media,
            total_ms: self.delay.as_millis() as u64,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}
