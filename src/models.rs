use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Deck loaded at startup when present.
    #[serde(default = "default_deck")]
    pub deck: String,

    /// Persisted session snapshot path.
    #[serde(default = "default_state")]
    pub state: String,

    /// Completed-run history path.
    #[serde(default = "default_results")]
    pub results: String,

    /// The deadline is `start_time + seconds_per_question * question count`.
    #[serde(default = "default_seconds_per_question")]
    pub seconds_per_question: i64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            deck: default_deck(),
            state: default_state(),
            results: default_results(),
            seconds_per_question: default_seconds_per_question(),
        }
    }
}

fn default_deck() -> String {
    "data/default_deck.json".into()
}

fn default_state() -> String {
    "quiz_session.state".into()
}

fn default_results() -> String {
    "results.csv".into()
}

fn default_seconds_per_question() -> i64 {
    120
}

/// A normalized quiz question. `options` and `correctness` are index-aligned
/// in the original slot order; both are fixed at normalization time.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Question {
    pub prompt: String,
    pub explanation: Option<String>,
    pub source: Option<String>,
    pub title: Option<String>,
    pub options: Vec<String>,
    pub correctness: Vec<bool>,
    pub tags: Vec<String>,
    pub metadata: BTreeMap<String, String>,

    /// Shuffled presentation, built lazily once per session instance of the
    /// question and immutable afterwards.
    pub binding: Option<DisplayBinding>,
}

/// The session-scoped shuffled view of a question's options. All three
/// sequences are the same permutation: `correctness[k]` and
/// `source_indices[k]` describe `options[k]`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DisplayBinding {
    pub options: Vec<String>,
    pub correctness: Vec<bool>,
    pub source_indices: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Single,
    Multiple,
}

impl Question {
    /// Input-widget kind plus the number of selections a full answer needs.
    pub fn question_type(&self) -> (QuestionType, usize) {
        let required = self.correctness.iter().filter(|&&correct| correct).count();
        if required == 1 {
            (QuestionType::Single, 1)
        } else {
            (QuestionType::Multiple, required)
        }
    }
}

/// The aggregate session state. `answers` and `flags` are index-aligned with
/// `questions`; membership and order of `questions` are fixed at start.
///
/// The whole struct is the persistence snapshot: plain data, round-trippable
/// timestamps, no live references.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct QuizSession {
    pub questions: Vec<Question>,
    pub current_index: usize,
    pub answers: Vec<Option<Vec<bool>>>,
    pub flags: Vec<bool>,
    pub score: u32,
    pub started: bool,
    pub completed: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub completion_time: Option<DateTime<Utc>>,
}
