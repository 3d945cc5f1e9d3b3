//! Prompt framing and post-processing of generated text

use minijinja::{Environment, context};
use std::sync::LazyLock;

const TEXT_PROMPT: &str = "Please provide a detailed description of, {{ text }}";
const IMAGE_PROMPT: &str = "Please generate an image that best describes: {{ summary }}";
const MAX_TITLE_CHARS: usize = 255;

static PROMPTS: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.add_template("text", TEXT_PROMPT)
        .expect("text prompt template is valid");
    env.add_template("image", IMAGE_PROMPT)
        .expect("image prompt template is valid");
    env
});

/// Wraps user input in the instruction sent to the text model.
pub fn text_prompt(input: &str) -> Result<String, minijinja::Error> {
    PROMPTS.get_template("text")?.render(context! { text => input })
}

/// Prompt for illustrating a summarized reply.
pub fn image_prompt(summary: &str) -> Result<String, minijinja::Error> {
    PROMPTS
        .get_template("image")?
        .render(context! { summary => summary })
}

/// Turns a raw completion into the reply shown to the user.
///
/// Drops the echoed prompt, removes control characters, collapses runs of
/// spaces and tabs to one space, caps blank-line runs at a single empty line
/// and trims the result.
pub fn clean_generated_text(raw: &str, prompt: &str) -> String {
    let body = strip_echoed_prompt(raw, prompt);
    let body = body.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(body.len());
    let mut newlines = 0usize;
    let mut pending: Option<(char, usize)> = None;

    for ch in body.chars() {
        if ch == '\n' {
            // trailing blanks never survive a line break
            pending = None;
            newlines += 1;
            if newlines <= 2 {
                out.push('\n');
            }
        } else if ch.is_control() && ch != '\t' {
            continue;
        } else if ch.is_whitespace() {
            pending = Some(match pending {
                Some((first, run)) => (first, run + 1),
                None => (ch, 1),
            });
        } else {
            if let Some((first, run)) = pending.take() {
                if !out.is_empty() {
                    out.push(if run == 1 { first } else { ' ' });
                }
            }
            newlines = 0;
            out.push(ch);
        }
    }

    out.trim().to_owned()
}

fn strip_echoed_prompt<'a>(raw: &'a str, prompt: &str) -> &'a str {
    if prompt.is_empty() {
        return raw;
    }
    raw.strip_prefix(prompt)
        .or_else(|| raw.trim_start().strip_prefix(prompt))
        .unwrap_or(raw)
}

/// Short chat title made of the first `words` words of a reply.
pub fn derive_title(output: &str, words: usize) -> Option<String> {
    let title = output
        .split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() {
        None
    } else {
        Some(title.chars().take(MAX_TITLE_CHARS).collect())
    }
}
