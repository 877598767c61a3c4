use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::codec;
use crate::error::{QuizError, Result};
use crate::models::Question;

/// Number of option slots on a raw card record (`Q_1` through `Q_6`).
pub const OPTION_SLOTS: usize = 6;

/// One imported card, as handed over by the deck-import collaborator.
///
/// Field names follow the exported deck layout; everything the normalizer
/// does not consume by name is kept as opaque metadata.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RawCardRecord {
    #[serde(rename = "Question")]
    pub prompt: Option<String>,

    /// Space-separated `0`/`1` tokens, one per option slot. Exported decks
    /// carry this either as a bare string or a one-element list.
    #[serde(rename = "Answers")]
    pub answers: Option<AnswerField>,

    #[serde(rename = "Q_1")]
    pub option_1: Option<String>,
    #[serde(rename = "Q_2")]
    pub option_2: Option<String>,
    #[serde(rename = "Q_3")]
    pub option_3: Option<String>,
    #[serde(rename = "Q_4")]
    pub option_4: Option<String>,
    #[serde(rename = "Q_5")]
    pub option_5: Option<String>,
    #[serde(rename = "Q_6")]
    pub option_6: Option<String>,

    #[serde(rename = "Extra_1")]
    pub explanation: Option<String>,
    #[serde(rename = "Sources")]
    pub source: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AnswerField {
    One(String),
    Many(Vec<String>),
}

impl RawCardRecord {
    fn option_slots(&self) -> [Option<&str>; OPTION_SLOTS] {
        [
            self.option_1.as_deref(),
            self.option_2.as_deref(),
            self.option_3.as_deref(),
            self.option_4.as_deref(),
            self.option_5.as_deref(),
            self.option_6.as_deref(),
        ]
    }

    fn answer_spec(&self) -> Option<&str> {
        match &self.answers {
            Some(AnswerField::One(spec)) => Some(spec),
            Some(AnswerField::Many(specs)) => specs.first().map(String::as_str),
            None => None,
        }
    }
}

/// Convert one raw card into a validated question.
///
/// Empty option slots are skipped, not padded; the surviving options keep
/// their slot's correctness flag. A card with no prompt, no surviving
/// options, or no surviving correct option is rejected here so it can never
/// enter a session.
pub fn normalize(raw: &RawCardRecord) -> Result<Question> {
    let prompt = raw
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .ok_or_else(|| QuizError::InvalidQuestion("missing question prompt".into()))?;

    let spec = raw
        .answer_spec()
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .ok_or_else(|| QuizError::InvalidQuestion("missing answer spec".into()))?;
    let slot_correctness = codec::parse_correctness(spec)?;

    let mut options = Vec::new();
    let mut correctness = Vec::new();
    for (slot, text) in raw.option_slots().iter().enumerate() {
        let text = match text {
            Some(text) => text.trim(),
            None => continue,
        };
        if text.is_empty() {
            continue;
        }
        options.push(text.to_string());
        correctness.push(slot_correctness.get(slot).copied().unwrap_or(false));
    }

    if options.is_empty() {
        return Err(QuizError::InvalidQuestion(
            "no options survive slot extraction".into(),
        ));
    }
    if !correctness.iter().any(|&correct| correct) {
        return Err(QuizError::InvalidQuestion(
            "no correct option survives slot extraction".into(),
        ));
    }

    Ok(Question {
        prompt: prompt.to_string(),
        explanation: clean(&raw.explanation),
        source: clean(&raw.source),
        title: clean(&raw.title),
        options,
        correctness,
        tags: raw.tags.clone(),
        metadata: raw
            .metadata
            .iter()
            .map(|(key, value)| (key.clone(), value_to_string(value)))
            .collect(),
        binding: None,
    })
}

/// Normalize a whole imported deck, failing fast with the offending card's
/// position. Validation happens once here, never during quiz play.
pub fn normalize_deck(records: &[RawCardRecord]) -> Result<Vec<Question>> {
    if records.is_empty() {
        return Err(QuizError::InvalidQuestion("deck contains no cards".into()));
    }

    records
        .iter()
        .enumerate()
        .map(|(index, raw)| normalize(raw).map_err(|err| at_card(index, err)))
        .collect()
}

fn at_card(index: usize, err: QuizError) -> QuizError {
    match err {
        QuizError::InvalidQuestion(reason) => {
            QuizError::InvalidQuestion(format!("card {}: {}", index + 1, reason))
        }
        QuizError::MalformedAnswerSpec(spec) => {
            QuizError::MalformedAnswerSpec(format!("card {}: {}", index + 1, spec))
        }
        other => other,
    }
}

fn clean(field: &Option<String>) -> Option<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
