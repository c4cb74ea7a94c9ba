//! Defensive parsing and validation of generated questions
//!
//! Backends return "JSON-ish" text: fenced in markdown, wrapped in prose, with
//! trailing commas. Everything that survives [`validate`] is guaranteed to have
//! four distinct options and a correct answer equal to exactly one of them.

use serde::Deserialize;
use std::collections::HashSet;

use crate::types::Question;

/// Shape we accept from backends before validation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
    #[serde(default, alias = "question")]
    pub text: String,
    #[serde(default, alias = "choices")]
    pub options: Vec<serde_json::Value>,
    #[serde(default, alias = "correct_answer", alias = "answer")]
    pub correct_answer: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    List(Vec<serde_json::Value>),
    Wrapped { questions: Vec<serde_json::Value> },
}

/// Normalize text for answer comparison and duplicate detection:
/// case-fold, strip quotes, collapse whitespace
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`' | '‘' | '’' | '“' | '”' | '«' | '»'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether two answers are the same after normalization
pub fn answers_match(submitted: &str, correct: &str) -> bool {
    normalize(submitted) == normalize(correct)
}

/// Strip markdown code fences around a payload
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Cut the text down to the outermost JSON array or object
fn extract_json(text: &str) -> &str {
    let start = text.find(['[', '{']);
    let end = text.rfind([']', '}']);
    match (start, end) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// Remove commas directly before a closing bracket, ignoring string contents
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
                if !matches!(next, Some(']') | Some('}')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Parse backend output into raw questions.
///
/// Items that do not even deserialize into [`RawQuestion`] are skipped; only a
/// payload that is not JSON at all is an error.
pub fn parse_questions(text: &str) -> Result<Vec<RawQuestion>, String> {
    let cleaned = remove_trailing_commas(extract_json(strip_code_fences(text)));

    let items = match serde_json::from_str::<Envelope>(&cleaned) {
        Ok(Envelope::List(items)) | Ok(Envelope::Wrapped { questions: items }) => items,
        Err(_) => {
            // A single object is still usable
            let single: serde_json::Value =
                serde_json::from_str(&cleaned).map_err(|e| format!("Invalid JSON: {}", e))?;
            vec![single]
        }
    };

    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawQuestion>(item).ok())
        .collect())
}

fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Validate a raw question and turn it into a [`Question`].
///
/// Requires non-empty text, exactly four non-empty options that are distinct
/// after normalization, and a correct answer matching exactly one option. The
/// stored correct answer is the option's own spelling.
pub fn validate(raw: &RawQuestion, id: String) -> Option<Question> {
    let text = raw.text.trim();
    if text.is_empty() || raw.options.len() != 4 {
        return None;
    }

    let options: Vec<String> = raw.options.iter().filter_map(value_as_text).collect();
    if options.len() != 4 || options.iter().any(|o| o.is_empty()) {
        return None;
    }

    let distinct: HashSet<String> = options.iter().map(|o| normalize(o)).collect();
    if distinct.len() != 4 {
        return None;
    }

    let answer = value_as_text(&raw.correct_answer)?;
    let wanted = normalize(&answer);
    if wanted.is_empty() {
        return None;
    }
    let correct = options.iter().find(|o| normalize(o) == wanted)?.clone();

    Some(Question {
        id,
        text: text.to_string(),
        options,
        correct_answer: correct,
    })
}
