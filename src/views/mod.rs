//! Server-side HTML pages for the text and voice modes.
//!
//! Pages are assembled with `format!` around a shared layout. Anything that
//! came from the user or the model goes through [`escape`] first.
//!
//! The student's profile rides along in hidden form fields and in the
//! navigation links, so it survives from one page to the next without any
//! server-side session.

use std::fmt::Write as _;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::tutor::Profile;

/// Which interaction mode a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Text,
    Voice,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Text => "Zyvora: ask a question",
            Self::Voice => "Zyvora: speak a question",
        }
    }
}

/// What the page should show below the input controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Empty,
    Reply(String),
    Error(String),
}

/// Paths of both mode pages, for the navigation links and form actions.
#[derive(Debug, Clone)]
pub struct Paths {
    pub text: String,
    pub voice: String,
}

impl Paths {
    fn action(&self, mode: Mode) -> &str {
        match mode {
            Mode::Text => &self.text,
            Mode::Voice => &self.voice,
        }
    }
}

/// Escapes text for use in HTML element content and quoted attributes.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders a full mode page.
///
/// `question` is echoed back above the outcome when present.
pub fn render(
    mode: Mode,
    paths: &Paths,
    profile: &Profile,
    question: Option<&str>,
    outcome: &Outcome,
) -> String {
    let mut main = String::new();
    let hidden = profile_fields(profile);
    let query = profile_query(profile);
    match mode {
        Mode::Text => text_controls(&mut main, paths.action(mode), &hidden, question),
        Mode::Voice => {
            let upload = format!("{}?{query}", paths.action(mode));
            voice_controls(&mut main, paths.action(mode), &hidden, &upload);
        }
    }

    if let Some(q) = question.filter(|q| !q.trim().is_empty()) {
        let _ = write!(
            main,
            "\n<section class=\"question\"><h2>You asked</h2><p>{}</p></section>",
            escape(q)
        );
    }

    match outcome {
        Outcome::Empty => {}
        Outcome::Reply(text) => {
            let _ = write!(
                main,
                "\n<section class=\"reply\"><h2>Zyvora</h2><pre>{}</pre></section>",
                escape(text)
            );
        }
        Outcome::Error(message) => {
            let _ = write!(
                main,
                "\n<section class=\"error\" role=\"alert\"><p>{}</p></section>",
                escape(message)
            );
        }
    }

    layout(mode.title(), &nav_links(paths, Some(mode), Some(&query)), &main)
}

/// The page served for unknown paths.
pub fn not_found(paths: &Paths, path: &str) -> String {
    let main = format!(
        "<section class=\"error\"><p>Nothing lives at <code>{}</code>.</p></section>",
        escape(path)
    );
    layout("Zyvora: not found", &nav_links(paths, None, None), &main)
}

fn profile_query(profile: &Profile) -> String {
    format!(
        "proficiency={:.2}&lang={}",
        profile.proficiency,
        utf8_percent_encode(&profile.language, NON_ALPHANUMERIC)
    )
}

fn profile_fields(profile: &Profile) -> String {
    format!(
        "  <input type=\"hidden\" name=\"proficiency\" value=\"{:.2}\">\n  \
         <input type=\"hidden\" name=\"lang\" value=\"{}\">\n",
        profile.proficiency,
        escape(&profile.language)
    )
}

/// A JavaScript string literal that is safe inside a `<script>` element.
fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_owned())
        .replace('<', "\\u003c")
}

fn text_controls(out: &mut String, action: &str, hidden: &str, question: Option<&str>) {
    let _ = write!(
        out,
        r#"<form method="post" action="{action}">
{hidden}  <label for="message">Your question</label>
  <textarea id="message" name="message" rows="4" autofocus>{value}</textarea>
  <button type="submit">Ask</button>
</form>"#,
        action = escape(action),
        value = escape(question.unwrap_or("")),
    );
}

fn voice_controls(out: &mut String, action: &str, hidden: &str, upload: &str) {
    let action = escape(action);
    let upload = js_string(upload);
    let _ = write!(
        out,
        r#"<p>Press record, ask your question out loud, then press stop.</p>
<button type="button" id="record">Record</button>
<button type="button" id="stop" disabled>Stop</button>
<form method="post" action="{action}">
{hidden}  <label for="message">Or type what you said</label>
  <input id="message" name="message" type="text">
  <button type="submit">Send</button>
</form>
<script>
(function () {{
  var rec = document.getElementById("record");
  var stop = document.getElementById("stop");
  var recorder, chunks = [];
  rec.onclick = async function () {{
    var stream = await navigator.mediaDevices.getUserMedia({{ audio: true }});
    recorder = new MediaRecorder(stream);
    chunks = [];
    recorder.ondataavailable = function (e) {{ chunks.push(e.data); }};
    recorder.onstop = async function () {{
      var blob = new Blob(chunks, {{ type: recorder.mimeType || "audio/webm" }});
      var res = await fetch({upload}, {{
        method: "POST",
        headers: {{ "Content-Type": blob.type }},
        body: blob
      }});
      document.open();
      document.write(await res.text());
      document.close();
    }};
    recorder.start();
    rec.disabled = true;
    stop.disabled = false;
  }};
  stop.onclick = function () {{
    recorder.stop();
    recorder.stream.getTracks().forEach(function (t) {{ t.stop(); }});
    stop.disabled = true;
  }};
}})();
</script>"#
    );
}

fn nav_links(paths: &Paths, current: Option<Mode>, query: Option<&str>) -> String {
    [Mode::Text, Mode::Voice]
        .into_iter()
        .map(|m| {
            let marker = if current == Some(m) {
                " aria-current=\"page\""
            } else {
                ""
            };
            let href = match query {
                Some(query) => format!("{}?{query}", paths.action(m)),
                None => paths.action(m).to_owned(),
            };
            format!("<a href=\"{}\"{marker}>{} mode</a>", escape(&href), m.as_str())
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn layout(title: &str, nav: &str, main: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 42rem; margin: 2rem auto; padding: 0 1rem; }}
textarea, input[type=text] {{ width: 100%; box-sizing: border-box; }}
pre {{ white-space: pre-wrap; font-family: inherit; }}
.error {{ color: #a40000; }}
</style>
</head>
<body>
<nav>{nav}</nav>
<h1>{title}</h1>
<main>
{main}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> Paths {
        Paths {
            text: "/".into(),
            voice: "/voice".into(),
        }
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(
            escape(r#"<b a="1">'x' & y</b>"#),
            "&lt;b a=&quot;1&quot;&gt;&#39;x&#39; &amp; y&lt;/b&gt;"
        );
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn reply_is_escaped() {
        let page = render(
            Mode::Text,
            &paths(),
            &Profile::default(),
            Some("<script>alert(1)</script>"),
            &Outcome::Reply("use <b>bold</b>".into()),
        );
        assert!(!page.contains("<script>alert(1)</script>"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(page.contains("use &lt;b&gt;bold&lt;/b&gt;"));
    }

    #[test]
    fn text_page_has_form_posting_to_its_path() {
        let page = render(Mode::Text, &paths(), &Profile::default(), None, &Outcome::Empty);
        assert!(page.contains(r#"<form method="post" action="/">"#));
        assert!(page.contains(r#"name="message""#));
        assert!(!page.contains("MediaRecorder"));
        assert!(!page.contains("class=\"reply\""));
    }

    #[test]
    fn voice_page_records_and_posts_to_voice_path() {
        let page = render(Mode::Voice, &paths(), &Profile::default(), None, &Outcome::Empty);
        assert!(page.contains("MediaRecorder"));
        assert!(page.contains(r#"fetch("/voice?proficiency=0.50&lang=en""#));
        assert!(page.contains(r#"action="/voice""#));
        assert!(page.contains(
            r#"<a href="/voice?proficiency=0.50&amp;lang=en" aria-current="page">voice mode</a>"#
        ));
    }

    #[test]
    fn profile_travels_in_hidden_fields_and_links() {
        let profile = Profile::new(0.2, "pt-BR");
        for mode in [Mode::Text, Mode::Voice] {
            let page = render(mode, &paths(), &profile, None, &Outcome::Empty);
            assert!(page.contains(r#"<input type="hidden" name="proficiency" value="0.20">"#));
            assert!(page.contains(r#"<input type="hidden" name="lang" value="pt-BR">"#));
            assert!(page.contains(r#"<a href="/?proficiency=0.20&amp;lang=pt%2DBR""#));
        }
    }

    #[test]
    fn upload_url_cannot_close_the_script() {
        let profile = Profile::new(0.5, "</script>");
        let page = render(Mode::Voice, &paths(), &profile, None, &Outcome::Empty);
        assert_eq!(page.matches("</script>").count(), 1);
        assert!(page.contains(r#"name="lang" value="&lt;/script&gt;""#));
        assert_eq!(js_string("/v</script>"), r#""/v\u003c/script>""#);
    }

    #[test]
    fn error_outcome_is_rendered_as_alert() {
        let page = render(
            Mode::Voice,
            &paths(),
            &Profile::default(),
            None,
            &Outcome::Error("The tutor is busy right now.".into()),
        );
        assert!(page.contains(r#"role="alert""#));
        assert!(page.contains("The tutor is busy right now."));
    }

    #[test]
    fn not_found_escapes_path() {
        let page = not_found(&paths(), "/<x>");
        assert!(page.contains("<code>/&lt;x&gt;</code>"));
        assert!(page.contains(r#"<a href="/voice">voice mode</a>"#));
    }
}
