use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A single question produced by [`split_questions`]. Immutable once
/// created; `part_of_batch` marks questions that arrived together in one
/// raw input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub part_of_batch: bool,
}

const LIST_PREFIXES: [&str; 8] = [
    "what are",
    "what is",
    "what were",
    "what was",
    "tell me about",
    "explain",
    "describe",
    "list",
];

const CONNECTORS: [&str; 7] = [
    " and ",
    " also ",
    " what about ",
    " how about ",
    ", and ",
    "; ",
    " then ",
];

const QUESTION_WORDS: [&str; 13] = [
    "what", "who", "when", "where", "why", "how", "which", "can", "should", "is", "are", "does",
    "do",
];

/// Detect whether the raw input encodes several independent questions and
/// decompose it. Deterministic and stateless; always returns at least one
/// element. The rules run in priority order and the first one that yields
/// two or more validated parts wins.
pub fn split_questions(raw: &str) -> Vec<Question> {
    if raw.trim().is_empty() {
        return vec![Question {
            text: raw.to_string(),
            part_of_batch: false,
        }];
    }

    let query = raw.trim();

    let parts = split_terminal_marks(query);
    if parts.len() > 1 {
        info!("Detected {} questions via question marks", parts.len());
        return into_questions(parts);
    }

    if let Some(parts) = split_enumerated_list(query) {
        info!(
            "Detected {} questions from list-style query",
            parts.len()
        );
        return into_questions(parts);
    }

    if let Some(parts) = split_connectors(query) {
        return into_questions(parts);
    }

    debug!("Single question detected: {:.50}", query);
    vec![Question {
        text: query.to_string(),
        part_of_batch: false,
    }]
}

fn into_questions(parts: Vec<String>) -> Vec<Question> {
    let batch = parts.len() > 1;
    parts
        .into_iter()
        .map(|text| Question {
            text,
            part_of_batch: batch,
        })
        .collect()
}

/// Split on runs of `?`, re-attaching the marks to the preceding text.
fn split_terminal_marks(query: &str) -> Vec<String> {
    let mut questions = Vec::new();
    let mut current = String::new();
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if c == '?' {
            while chars.peek() == Some(&'?') {
                current.push('?');
                chars.next();
            }
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                questions.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        questions.push(trimmed.to_string());
    }

    questions
}

/// Expand list-style queries like "what are X, Y and Z" into one question
/// per item, re-using the original prefix.
fn split_enumerated_list(query: &str) -> Option<Vec<String>> {
    let (prefix, items_part) = match_list_prefix(query)?;

    let has_list =
        items_part.contains(',') || split_ignore_ascii_case(items_part, " and ").len() > 1;
    if !has_list {
        return None;
    }

    let mut items: Vec<&str> = Vec::new();
    for chunk in items_part.split(',') {
        for piece in split_ignore_ascii_case(chunk, " and ") {
            let piece = piece.trim();
            if piece.chars().count() >= 2 {
                items.push(piece);
            }
        }
    }

    if items.len() < 2 {
        return None;
    }

    let validated: Vec<String> = items
        .iter()
        .map(|item| format!("{} {}", prefix, item))
        .filter(|q| q.split_whitespace().count() >= 3)
        .collect();

    if validated.len() >= 2 {
        Some(validated)
    } else {
        None
    }
}

fn match_list_prefix(query: &str) -> Option<(&str, &str)> {
    for p in LIST_PREFIXES {
        if query.len() > p.len()
            && query.is_char_boundary(p.len())
            && query[..p.len()].eq_ignore_ascii_case(p)
            && query[p.len()..].starts_with(char::is_whitespace)
        {
            return Some((&query[..p.len()], query[p.len()..].trim_start()));
        }
    }
    None
}

/// Split on common connectors, keeping only segments that read as
/// standalone questions.
fn split_connectors(query: &str) -> Option<Vec<String>> {
    for connector in CONNECTORS {
        let parts = split_ignore_ascii_case(query, connector);
        if parts.len() < 2 {
            continue;
        }

        let valid: Vec<String> = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter(|p| looks_like_question(p))
            .map(|p| p.to_string())
            .collect();

        if valid.len() >= 2 {
            info!(
                "Detected {} questions via connector '{}'",
                valid.len(),
                connector.trim()
            );
            return Some(valid);
        }
    }
    None
}

fn looks_like_question(part: &str) -> bool {
    let lower = part.to_lowercase();
    QUESTION_WORDS.iter().any(|qw| lower.starts_with(qw))
        || lower.ends_with('?')
        || part.split_whitespace().count() >= 3
}

/// Case-insensitive split with an ASCII separator. Match positions always
/// begin with an ASCII byte, so the produced slices stay on char
/// boundaries.
fn split_ignore_ascii_case<'a>(text: &'a str, sep: &str) -> Vec<&'a str> {
    let hay = text.as_bytes();
    let needle = sep.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i + needle.len() <= hay.len() {
        if hay[i..i + needle.len()].eq_ignore_ascii_case(needle) {
            parts.push(&text[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&text[start..]);
    parts
}
