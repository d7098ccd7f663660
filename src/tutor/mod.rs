//! Tutoring policy: diagnostic scoring, teaching styles, prompt construction
//! and locally answered intents.
//!
//! Everything here is pure and request-scoped. A student's [`Profile`] is
//! computed from what the client sends and is never stored server-side.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::news::Category;
use crate::search::SearchResult;

/// Proficiency assumed when the client sends none.
pub const DEFAULT_PROFICIENCY: f64 = 0.5;

const Q1_KEYWORDS: &[&str] = &["energy", "sun", "food", "glucose", "convert"];
const Q2_KEYWORDS: &[&str] = &["acceleration", "increases", "increase", "more"];
const EXPLANATORY_CUES: &[&str] = &["explain", "what is", "how", "define", "show", "solve"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    StepByStep,
    Balanced,
    Concise,
}

impl Style {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StepByStep => "step_by_step",
            Self::Balanced => "balanced",
            Self::Concise => "concise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Deep,
    Medium,
    Shallow,
}

/// How the tutor should pitch its explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub style: Style,
    pub depth: Depth,
    pub examples: u8,
    pub checks: bool,
}

impl Policy {
    pub fn for_proficiency(proficiency: f64) -> Self {
        if proficiency < 0.33 {
            Self {
                style: Style::StepByStep,
                depth: Depth::Deep,
                examples: 2,
                checks: true,
            }
        } else if proficiency < 0.7 {
            Self {
                style: Style::Balanced,
                depth: Depth::Medium,
                examples: 1,
                checks: true,
            }
        } else {
            Self {
                style: Style::Concise,
                depth: Depth::Shallow,
                examples: 1,
                checks: false,
            }
        }
    }
}

/// A student's level and the teaching policy derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub proficiency: f64,
    pub policy: Policy,
    pub language: String,
}

impl Profile {
    /// Builds a profile, clamping proficiency into `[0, 1]`. Non-finite values
    /// fall back to [`DEFAULT_PROFICIENCY`]; a blank language becomes `en`.
    pub fn new(proficiency: f64, language: &str) -> Self {
        let proficiency = if proficiency.is_finite() {
            proficiency.clamp(0.0, 1.0)
        } else {
            DEFAULT_PROFICIENCY
        };
        let language = language.trim();
        Self {
            proficiency,
            policy: Policy::for_proficiency(proficiency),
            language: if language.is_empty() {
                "en".to_owned()
            } else {
                language.to_owned()
            },
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new(DEFAULT_PROFICIENCY, "en")
    }
}

/// Scores the three-question diagnostic into a proficiency in `[0, 1]`.
///
/// `q1` and `q2` are short science answers checked for key ideas, `q3` is a
/// self-reported confidence from 0 to 5.
pub fn score_diagnostic(answers: &HashMap<String, String>) -> f64 {
    let answer = |key: &str| answers.get(key).map(|a| a.to_lowercase()).unwrap_or_default();
    let mut score = 0.0;

    let a1 = answer("q1");
    if Q1_KEYWORDS.iter().any(|w| a1.contains(w)) {
        score += 0.35;
    } else if a1.split_whitespace().count() >= 3 {
        score += 0.15;
    }

    let a2 = answer("q2");
    if Q2_KEYWORDS.iter().any(|w| a2.contains(w)) {
        score += 0.35;
    } else if a2.split_whitespace().count() >= 2 {
        score += 0.1;
    }

    let confidence = match answers.get("q3") {
        None => 3.0 / 5.0,
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(c) => c.clamp(0, 5) as f64 / 5.0,
            Err(_) => 0.6,
        },
    };
    score += 0.3 * confidence;

    ((score * 100.0).round() / 100.0).min(1.0)
}

/// Whether a question deserves web sources.
pub fn wants_sources(message: &str) -> bool {
    let lower = message.to_lowercase();
    EXPLANATORY_CUES.iter().any(|cue| lower.contains(cue))
}

/// Whether the student is asking for the current date or time.
pub fn asks_for_datetime(message: &str) -> bool {
    message
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("time") || word.eq_ignore_ascii_case("date"))
}

pub fn datetime_reply(now: DateTime<Local>) -> String {
    now.format("Current date and time is: %Y-%m-%d %H:%M:%S").to_string()
}

/// Builds the tutoring prompt sent to the model.
pub fn build_prompt(profile: &Profile, question: &str, sources: &[SearchResult]) -> String {
    let mut prompt = format!(
        "You are Zyvora, a friendly human-like tutor.\n\
         \n\
         StudentProfile:\n  \
         proficiency = {:.2}\n  \
         style       = {}\n  \
         language    = {}\n\
         \n\
         Guidelines:\n\
         - If style == step_by_step: give numbered steps, short examples after each, and end with a check question.\n\
         - If style == balanced: clear explanation, one worked example, and a one-sentence recap.\n\
         - If style == concise: 2-3 sentences with a short takeaway.\n\
         \n\
         Student asked:\n{}\n",
        profile.proficiency,
        profile.policy.style.as_str(),
        profile.language,
        question.trim(),
    );

    if !sources.is_empty() {
        prompt.push_str("\nSources:\n");
        for source in sources {
            let _ = writeln!(prompt, "- {}: {}", source.title, source.link);
        }
    }

    prompt.push_str(
        "\nAnswer warmly in a clear, human tone.\n\
         If user language is not English, answer in English first (client will handle translation).",
    );
    prompt
}

/// Instruction text that accompanies a recorded question.
pub fn build_audio_instruction(profile: &Profile) -> String {
    build_prompt(
        profile,
        "(The question is in the attached audio recording. Transcribe it silently, then answer it.)",
        &[],
    )
}

/// Appends a markdown source list to a model reply.
pub fn with_source_links(reply: &str, sources: &[SearchResult]) -> String {
    if sources.is_empty() {
        return reply.to_owned();
    }
    let mut out = format!("{reply}\n\n**Sources:**");
    for source in sources {
        let _ = write!(out, "\n- **[{}]({})**", source.title, source.link);
    }
    out
}

/// The headline category a news request asks for, if it is one.
pub fn news_intent(message: &str) -> Option<Category> {
    let lower = message.to_lowercase();
    if !lower.contains("news") && !lower.contains("headlines") {
        return None;
    }
    let category = if lower.contains("tech news") || lower.contains("technology news") {
        Category::Technology
    } else if lower.contains("business news") {
        Category::Business
    } else {
        Category::General
    };
    Some(category)
}

/// Whether replies for `language` need translating from English.
pub fn needs_translation(language: &str) -> bool {
    let language = language.trim();
    !language.is_empty() && !language.eq_ignore_ascii_case("en")
}

/// Prompt asking the model to translate an English reply.
pub fn build_translation_prompt(text: &str, language: &str) -> String {
    format!(
        "Translate the following text into the language with code \"{language}\". \
         Keep markdown formatting and links unchanged. Reply with the translation only.\n\n{text}"
    )
}

/// The English reply with a note that it could not be translated.
pub fn translation_unavailable(text: &str, language: &str) -> String {
    format!("{text}\n\n(Translation to {language} not available.)")
}
