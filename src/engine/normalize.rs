//! Canonicalizes loosely-typed generator candidates into fixed-shape items.
//!
//! The external generator is untrusted: question text and options arrive
//! under several alias keys, and the correct-answer indicator may be an
//! index, a letter, an "option N" ordinal or the literal option text.

use serde::Deserialize;
use serde_json::Value;

pub const FILLER_OPTION: &str = "None of the above";

/// A raw candidate as returned by the generator, alias fields included.
/// Resolution happens by explicit priority order, never by duck typing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCandidate {
    pub question: Option<String>,
    pub prompt: Option<String>,
    pub q: Option<String>,
    pub options: Option<Vec<Value>>,
    pub choices: Option<Vec<Value>>,
    pub answers: Option<Vec<Value>>,
    #[serde(rename = "correctIndex")]
    pub correct_index: Option<Value>,
    #[serde(rename = "answerIndex")]
    pub answer_index: Option<Value>,
    pub answer: Option<Value>,
    pub correct: Option<Value>,
    #[serde(rename = "correctOption")]
    pub correct_option: Option<Value>,
    #[serde(alias = "category")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuestion {
    pub stem: String,
    /// Exactly 4 non-empty options.
    pub options: Vec<String>,
    pub correct_index: usize,
    /// Generator-supplied topic label, if any.
    pub topic: Option<String>,
}

/// Pure canonicalization; `None` means the candidate is discarded.
pub fn normalize_candidate(raw: &RawCandidate) -> Option<NormalizedQuestion> {
    let stem = first_non_empty(&[&raw.question, &raw.prompt, &raw.q])?;

    let source = raw
        .options
        .as_ref()
        .filter(|list| !list.is_empty())
        .or(raw.choices.as_ref().filter(|list| !list.is_empty()))
        .or(raw.answers.as_ref().filter(|list| !list.is_empty()))?;

    let mut options: Vec<String> = source
        .iter()
        .map(value_to_text)
        .filter(|text| !text.is_empty())
        .collect();

    if options.len() >= 4 {
        options.truncate(4);
    } else if options.len() == 3 {
        options.push(FILLER_OPTION.to_string());
    } else {
        return None;
    }

    let correct_index = resolve_correct_index(raw, &options)?;
    if options.iter().any(|opt| opt.is_empty()) {
        return None;
    }

    let topic = first_non_empty(&[&raw.topic]);
    Some(NormalizedQuestion { stem, options, correct_index, topic })
}

fn first_non_empty(fields: &[&Option<String>]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| field.as_deref())
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

/// Tries, in order: explicit integer `correctIndex`, integer `answerIndex`,
/// a coerced `answer`, a coerced `correct`, then `correctOption` as a last
/// resort when nothing else lands in [0,3].
fn resolve_correct_index(raw: &RawCandidate, options: &[String]) -> Option<usize> {
    let mut index = raw.correct_index.as_ref().and_then(Value::as_i64);
    if index.is_none() {
        index = raw.answer_index.as_ref().and_then(Value::as_i64);
    }
    if index.is_none() {
        index = raw.answer.as_ref().and_then(|v| coerce_answer(v, options));
    }
    if index.is_none() {
        index = raw.correct.as_ref().and_then(|v| coerce_answer(v, options));
    }
    if !matches!(index, Some(0..=3)) {
        index = raw.correct_option.as_ref().and_then(|v| coerce_answer(v, options));
    }
    match index {
        Some(i @ 0..=3) => Some(i as usize),
        _ => None,
    }
}

/// Coerces a free-form answer indicator to an option index: integer index,
/// letter "a".."d", the ordinal "option N", or exact option-text match.
fn coerce_answer(value: &Value, options: &[String]) -> Option<i64> {
    if let Some(index) = value.as_i64() {
        return (0..options.len() as i64).contains(&index).then_some(index);
    }

    let text = value.as_str()?.trim();
    if text.is_empty() {
        return None;
    }

    let lower = text.to_lowercase();
    if lower.len() == 1 {
        if let Some(index) = "abcd".find(&lower) {
            return Some(index as i64);
        }
    }
    if let Some(ordinal) = lower.strip_prefix("option ") {
        if let Ok(n) = ordinal.trim().parse::<i64>() {
            let index = n - 1;
            if (0..options.len() as i64).contains(&index) {
                return Some(index);
            }
        }
    }

    options
        .iter()
        .position(|option| option == text)
        .map(|index| index as i64)
}
