//! AI client adapter: submit a text or audio prompt, get reply text back.
//!
//! [`AiClient`] is the only thing handlers talk to. It wraps a [`Provider`]
//! implementation ([`gemini::GeminiProvider`] in production, scripted fakes
//! in tests) and reports failures through the typed [`AiError`]. There is no
//! caching and no retrying: every call is independent.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

pub mod gemini;

pub use gemini::GeminiProvider;

/// Boxed future returned by [`Provider`] methods.
pub type AiFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Failures surfaced by the AI provider.
#[derive(Debug, Error)]
pub enum AiError {
    /// Network failure, timeout, provider-side error or an unusable reply.
    #[error("AI provider request failed: {0}")]
    Provider(String),

    /// The provider rejected the configured credential.
    #[error("AI provider rejected the credential: {0}")]
    Auth(String),

    /// The provider is throttling requests.
    #[error("AI provider rate limit exceeded")]
    RateLimit { retry_after: Option<Duration> },
}

impl AiError {
    /// Short machine-readable tag, used in logs and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Provider(_) => "provider",
            Self::Auth(_) => "auth",
            Self::RateLimit { .. } => "rate_limit",
        }
    }
}

/// User input for one request.
#[derive(Clone)]
pub enum Prompt {
    Text(String),
    /// Recorded speech passed through opaquely, with the instruction text
    /// that tells the model what to do with it.
    Audio {
        mime_type: String,
        data: Bytes,
        instruction: String,
    },
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Whether there is anything to send.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Audio { data, .. } => data.is_empty(),
        }
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            Self::Audio { mime_type, data, .. } => f
                .debug_struct("Audio")
                .field("mime_type", mime_type)
                .field("bytes", &data.len())
                .finish(),
        }
    }
}

/// A reply from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
}

/// An external generative AI service.
pub trait Provider: Send + Sync {
    /// Human-readable provider/model name for logs.
    fn name(&self) -> &str;

    fn generate(&self, prompt: Prompt) -> AiFuture<Result<String, AiError>>;
}

/// The adapter handlers call. Cheap to clone; the provider is shared.
#[derive(Clone)]
pub struct AiClient {
    provider: Arc<dyn Provider>,
}

impl AiClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Sends `prompt` to the provider and returns its reply unmodified.
    ///
    /// # Errors
    ///
    /// [`AiError::Provider`] for empty input as well as for provider failures,
    /// [`AiError::Auth`] and [`AiError::RateLimit`] as reported by the provider.
    pub async fn submit(&self, prompt: Prompt) -> Result<Reply, AiError> {
        if prompt.is_empty() {
            return Err(AiError::Provider("prompt is empty".to_owned()));
        }

        debug!(provider = self.provider.name(), prompt = ?prompt, "submitting prompt");
        match self.provider.generate(prompt).await {
            Ok(text) => {
                debug!(provider = self.provider.name(), reply_len = text.len(), "reply received");
                Ok(Reply { text })
            }
            Err(e) => {
                warn!(provider = self.provider.name(), kind = e.kind(), error = %e, "provider call failed");
                Err(e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[tokio::test]
    async fn reply_is_surfaced_unmodified() {
        let client = AiClient::new(ScriptedProvider::replying("hello"));
        let reply = client.submit(Prompt::text("say hello")).await.unwrap();
        assert_eq!(reply.text, "hello");
    }

    #[tokio::test]
    async fn whitespace_in_reply_is_not_touched() {
        let client = AiClient::new(ScriptedProvider::replying("  spaced\n"));
        let reply = client.submit(Prompt::text("q")).await.unwrap();
        assert_eq!(reply.text, "  spaced\n");
    }

    #[tokio::test]
    async fn rate_limit_is_surfaced() {
        let provider = ScriptedProvider::new(vec![Err(AiError::RateLimit {
            retry_after: Some(Duration::from_secs(7)),
        })]);
        let client = AiClient::new(provider);
        let err = client.submit(Prompt::text("q")).await.unwrap_err();
        assert!(matches!(
            err,
            AiError::RateLimit { retry_after: Some(d) } if d == Duration::from_secs(7)
        ));
        assert_eq!(err.kind(), "rate_limit");
    }

    #[tokio::test]
    async fn auth_error_is_surfaced() {
        let client = AiClient::new(ScriptedProvider::new(vec![Err(AiError::Auth("bad key".into()))]));
        assert!(matches!(
            client.submit(Prompt::text("q")).await,
            Err(AiError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn empty_prompt_never_reaches_provider() {
        let provider = ScriptedProvider::replying("unused");
        let client = AiClient::new(provider.clone());
        let err = client.submit(Prompt::text("   ")).await.unwrap_err();
        assert!(matches!(err, AiError::Provider(_)));
        let audio = Prompt::Audio {
            mime_type: "audio/webm".into(),
            data: Bytes::new(),
            instruction: "answer".into(),
        };
        assert!(client.submit(audio).await.is_err());
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sequential_calls_are_independent() {
        let client = AiClient::new(Arc::new(EchoProvider));
        let a = client.submit(Prompt::text("first")).await.unwrap();
        let b = client.submit(Prompt::text("second")).await.unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
    }

    #[test]
    fn prompt_debug_hides_content() {
        let debug = format!("{:?}", Prompt::text("my private question"));
        assert!(!debug.contains("private"));
    }
}
