//! Route handlers: the text and voice mode pages plus the JSON API.
//!
//! Both modes share [`respond`]; they differ only in how the question is read
//! from the request and which page renders the outcome. Every failure is
//! turned into a response here, so nothing escapes to the connection task.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::context::{BodyError, Context};
use crate::http::{Response, StatusCode};
use crate::llm::{AiClient, AiError, Prompt};
use crate::middleware::{LoggerMiddleware, SecureHeadersMiddleware};
use crate::news::{self, NewsClient};
use crate::router::Router;
use crate::search::{DEFAULT_RESULTS, SearchClient, SearchResult};
use crate::tutor::{self, DEFAULT_PROFICIENCY, Profile};
use crate::views::{self, Mode, Outcome, Paths};

const EMPTY_INPUT: &str = "Please enter a question.";
const PROVIDER_FAILED: &str = "Sorry, something went wrong while reaching the tutor. Please try again.";
const AUTH_FAILED: &str = "The tutor is misconfigured right now. Please let the site owner know.";
const RATE_LIMITED: &str = "The tutor is busy right now. Please try again shortly.";

/// Shared, read-only state handed to every handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub ai: AiClient,
    pub search: Option<SearchClient>,
    pub news: Option<NewsClient>,
}

impl AppState {
    /// Builds state from configuration. Web search and news are enabled when
    /// their keys are configured and their HTTP clients can be created.
    pub fn new(config: Arc<Config>, ai: AiClient) -> Self {
        let search = config
            .search
            .as_ref()
            .and_then(|search| match SearchClient::new(search) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "web search disabled");
                    None
                }
            });
        let news = config
            .news_api_key
            .as_ref()
            .and_then(|key| match NewsClient::new(key) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!(error = %e, "news disabled");
                    None
                }
            });
        Self {
            config,
            ai,
            search,
            news,
        }
    }

    /// Replaces the web search client, e.g. one built with
    /// [`SearchClient::with_endpoint`].
    pub fn with_search(mut self, search: Option<SearchClient>) -> Self {
        self.search = search;
        self
    }

    /// Replaces the news client.
    pub fn with_news(mut self, news: Option<NewsClient>) -> Self {
        self.news = news;
        self
    }

    fn paths(&self) -> Paths {
        Paths {
            text: self.config.text_path.clone(),
            voice: self.config.voice_path.clone(),
        }
    }
}

/// Builds the application router with logging and security headers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();
    router.layer(LoggerMiddleware);
    router.layer(SecureHeadersMiddleware);

    for (mode, path) in [
        (Mode::Text, state.config.text_path.clone()),
        (Mode::Voice, state.config.voice_path.clone()),
    ] {
        let s = Arc::clone(&state);
        router.get(&path, move |ctx: Context| {
            let profile = query_profile(&ctx);
            let page = views::render(mode, &s.paths(), &profile, None, &Outcome::Empty);
            async move { Response::html(StatusCode::Ok, page) }
        });
        let s = Arc::clone(&state);
        router.post(&path, move |ctx: Context| respond(Arc::clone(&s), mode, ctx));
    }

    let s = Arc::clone(&state);
    router.post("/chat", move |ctx: Context| chat(Arc::clone(&s), ctx));
    router.post("/diagnostic", |ctx: Context| async move { diagnostic(&ctx) });
    router.get("/health", |_ctx: Context| async {
        Response::json(StatusCode::Ok, &serde_json::json!({ "status": "ok" }))
    });

    let s = state;
    router.fallback(move |ctx: Context| {
        let page = views::not_found(&s.paths(), ctx.request().path());
        async move { Response::html(StatusCode::NotFound, page) }
    });

    router
}

/// A question as read from a request.
enum Input {
    Text(String),
    Audio { mime_type: String, data: Bytes },
}

impl Input {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Audio { data, .. } => data.is_empty(),
        }
    }

    fn transcript(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::Audio { .. } => None,
        }
    }
}

/// A reply ready to show, with the English original and the sources it
/// cites.
struct Answer {
    reply: String,
    reply_en: String,
    sources: Vec<SearchResult>,
}

/// Handles a page POST for either mode.
async fn respond(state: Arc<AppState>, mode: Mode, ctx: Context) -> Response {
    let paths = state.paths();
    let page = |status: StatusCode, profile: &Profile, question: Option<&str>, outcome: Outcome| {
        Response::html(status, views::render(mode, &paths, profile, question, &outcome))
    };

    let (input, profile) = match read_input(mode, &ctx) {
        Ok(read) => read,
        Err(e) => {
            debug!(mode = mode.as_str(), error = %e, "unreadable page input");
            let status = match e {
                BodyError::WrongContentType { .. } => StatusCode::UnsupportedMediaType,
                BodyError::Json(_) => StatusCode::BadRequest,
            };
            let profile = query_profile(&ctx);
            return page(status, &profile, None, Outcome::Error(EMPTY_INPUT.to_owned()));
        }
    };

    if input.is_empty() {
        return page(
            StatusCode::BadRequest,
            &profile,
            None,
            Outcome::Error(EMPTY_INPUT.to_owned()),
        );
    }

    let question = input.transcript().map(str::to_owned);
    match answer(&state, input, &profile).await {
        Ok(answer) => page(
            StatusCode::Ok,
            &profile,
            question.as_deref(),
            Outcome::Reply(answer.reply),
        ),
        Err(e) => {
            let (status, message) = failure(&e);
            let mut response = page(
                status,
                &profile,
                question.as_deref(),
                Outcome::Error(message.to_owned()),
            );
            if let Some(secs) = retry_after_secs(&e) {
                response.add_header("Retry-After", secs.to_string());
            }
            response
        }
    }
}

fn query_profile(ctx: &Context) -> Profile {
    let request = ctx.request();
    profile_from(
        request.query_param("proficiency"),
        request.query_param("lang"),
    )
}

fn read_input(mode: Mode, ctx: &Context) -> Result<(Input, Profile), BodyError> {
    let request = ctx.request();

    if mode == Mode::Voice {
        if let Some(mime) = request.headers().mime_type().filter(|m| m.starts_with("audio/")) {
            let input = Input::Audio {
                mime_type: mime,
                data: request.body().clone(),
            };
            return Ok((input, query_profile(ctx)));
        }
    }

    let form = ctx.form()?;
    let profile = profile_from(
        form.get("proficiency").or(request.query_param("proficiency")),
        form.get("lang").or(request.query_param("lang")),
    );
    let message = form.get("message").unwrap_or_default().to_owned();
    Ok((Input::Text(message), profile))
}

fn profile_from(proficiency: Option<&str>, lang: Option<&str>) -> Profile {
    let proficiency = proficiency
        .and_then(|p| p.trim().parse::<f64>().ok())
        .unwrap_or(DEFAULT_PROFICIENCY);
    Profile::new(proficiency, lang.unwrap_or("en"))
}

/// Produces the reply for one question.
///
/// Date and time questions are answered locally and news requests go to the
/// headline service. Explanatory questions are grounded with web sources when
/// search is configured. Replies are written in English and then translated
/// into the student's language.
async fn answer(state: &AppState, input: Input, profile: &Profile) -> Result<Answer, AiError> {
    let language = profile.language.as_str();
    let text = match input {
        Input::Text(text) => text,
        Input::Audio { mime_type, data } => {
            let prompt = Prompt::Audio {
                mime_type,
                data,
                instruction: tutor::build_audio_instruction(profile),
            };
            let reply_en = state.ai.submit(prompt).await?.text;
            return Ok(Answer {
                reply: translate(state, &reply_en, language).await,
                reply_en,
                sources: Vec::new(),
            });
        }
    };

    if tutor::asks_for_datetime(&text) {
        debug!("answering date/time question locally");
        let reply_en = tutor::datetime_reply(Local::now());
        return Ok(Answer {
            reply: translate(state, &reply_en, language).await,
            reply_en,
            sources: Vec::new(),
        });
    }

    if let Some(category) = tutor::news_intent(&text) {
        debug!(category = category.as_str(), "answering with headlines");
        // Headlines are already fetched in the student's language.
        let reply = match &state.news {
            Some(news) => news.briefing(category, language).await,
            None => news::NOT_CONFIGURED.to_owned(),
        };
        return Ok(Answer {
            reply_en: reply.clone(),
            reply,
            sources: Vec::new(),
        });
    }

    let sources = match &state.search {
        Some(search) if tutor::wants_sources(&text) => search.search(&text, DEFAULT_RESULTS).await,
        _ => Vec::new(),
    };
    let prompt = Prompt::Text(tutor::build_prompt(profile, &text, &sources));
    let reply = state.ai.submit(prompt).await?;
    let reply_en = tutor::with_source_links(&reply.text, &sources);
    Ok(Answer {
        reply: translate(state, &reply_en, language).await,
        reply_en,
        sources,
    })
}

/// Translates an English reply, falling back to the English text with a note.
async fn translate(state: &AppState, text: &str, language: &str) -> String {
    if !tutor::needs_translation(language) {
        return text.to_owned();
    }
    let prompt = Prompt::Text(tutor::build_translation_prompt(text, language));
    match state.ai.submit(prompt).await {
        Ok(reply) if !reply.text.trim().is_empty() => reply.text,
        Ok(_) => tutor::translation_unavailable(text, language),
        Err(e) => {
            warn!(language, error = %e, "translation failed");
            tutor::translation_unavailable(text, language)
        }
    }
}

/// Status and user-facing message for a provider failure.
fn failure(e: &AiError) -> (StatusCode, &'static str) {
    match e {
        AiError::Provider(_) => (StatusCode::BadGateway, PROVIDER_FAILED),
        AiError::Auth(_) => (StatusCode::InternalServerError, AUTH_FAILED),
        AiError::RateLimit { .. } => (StatusCode::TooManyRequests, RATE_LIMITED),
    }
}

fn retry_after_secs(e: &AiError) -> Option<u64> {
    match e {
        AiError::RateLimit { retry_after } => retry_after.map(|d| d.as_secs().max(1)),
        _ => None,
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    lang: Option<String>,
    proficiency: Option<f64>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
    reply_en: String,
    sources: Vec<SearchResult>,
    profile: Profile,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

fn json_error(status: StatusCode, error: &str, message: impl Into<String>) -> Response {
    Response::json(
        status,
        &ErrorBody {
            error,
            message: message.into(),
        },
    )
}

async fn chat(state: Arc<AppState>, ctx: Context) -> Response {
    let request: ChatRequest = match ctx.json() {
        Ok(request) => request,
        Err(e) => return json_error(StatusCode::BadRequest, "invalid_request", e.to_string()),
    };

    if request.message.trim().is_empty() {
        return json_error(StatusCode::BadRequest, "empty_message", EMPTY_INPUT);
    }

    let profile = Profile::new(
        request.proficiency.unwrap_or(DEFAULT_PROFICIENCY),
        request.lang.as_deref().unwrap_or("en"),
    );

    match answer(&state, Input::Text(request.message), &profile).await {
        Ok(answer) => Response::json(
            StatusCode::Ok,
            &ChatResponse {
                reply: answer.reply,
                reply_en: answer.reply_en,
                sources: answer.sources,
                profile,
            },
        ),
        Err(e) => {
            let (status, message) = failure(&e);
            let mut response = json_error(status, e.kind(), message);
            if let Some(secs) = retry_after_secs(&e) {
                response.add_header("Retry-After", secs.to_string());
            }
            response
        }
    }
}

#[derive(Deserialize)]
struct DiagnosticRequest {
    #[serde(default)]
    answers: HashMap<String, serde_json::Value>,
    lang: Option<String>,
}

#[derive(Serialize)]
struct DiagnosticResponse {
    profile: Profile,
}

fn diagnostic(ctx: &Context) -> Response {
    let request: DiagnosticRequest = match ctx.json() {
        Ok(request) => request,
        Err(e) => return json_error(StatusCode::BadRequest, "invalid_request", e.to_string()),
    };

    // Confidence may arrive as a number or a string.
    let answers: HashMap<String, String> = request
        .answers
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect();

    let proficiency = tutor::score_diagnostic(&answers);
    let profile = Profile::new(proficiency, request.lang.as_deref().unwrap_or("en"));
    debug!(proficiency, style = profile.policy.style.as_str(), "diagnostic scored");
    Response::json(StatusCode::Ok, &DiagnosticResponse { profile })
}
