//! # zyvora
//!
//! An adaptive AI tutor served over a from-scratch async HTTP/1.1 server.
//! Questions arrive as typed text or recorded speech, go to Google Gemini with
//! a prompt tuned to the student's level, and come back as a rendered page.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use zyvora::config::Config;
//! use zyvora::handlers::{AppState, build_router};
//! use zyvora::llm::{AiClient, GeminiProvider};
//! use zyvora::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::load()?);
//!     let ai = AiClient::new(Arc::new(GeminiProvider::from_config(&config)?));
//!     let router = Arc::new(build_router(Arc::new(AppState::new(config.clone(), ai))));
//!
//!     let server = Server::bind(config.bind_addr()).await?;
//!     server
//!         .run(move |req| {
//!             let router = router.clone();
//!             async move { router.route(req).await }
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod server;

// ── Application ───────────────────────────────────────────────────────────────
pub mod config;
pub mod handlers;
pub mod llm;
pub mod news;
pub mod search;
pub mod tutor;
pub mod views;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{Config, ConfigError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use llm::{AiClient, AiError, Prompt, Provider};
pub use server::{Server, ServerError};
