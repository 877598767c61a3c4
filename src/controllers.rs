use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{QuizError, Result};
use crate::models::{Question, QuestionType, QuizSession};
use crate::normalize::{self, RawCardRecord};
use crate::results::{self, QuestionReport, ScoreSummary};
use crate::store::SessionStore;

/// Everything the presentation layer needs to render the current question.
#[derive(Clone, Debug, Serialize)]
pub struct QuestionView {
    pub index: usize,
    pub total: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub question_type: QuestionType,
    pub required_count: usize,
    pub flagged: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
}

/// Session-level data for the navigation board and the setup screen.
#[derive(Clone, Debug, Serialize)]
pub struct SessionStatus {
    pub started: bool,
    pub completed: bool,
    pub total: usize,
    pub answered_count: usize,
    pub answered: Vec<bool>,
    pub flags: Vec<bool>,
    pub pool_size: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub is_correct: bool,
    pub completed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResultsView {
    pub summary: ScoreSummary,
    pub questions: Vec<QuestionReport>,
}

struct Inner {
    pool: Vec<Question>,
    session: QuizSession,
}

/// Shared handle over the question pool, the live session, and the
/// persistence gateway. Every mutating command persists the session before
/// returning, and every entry point applies deadline expiry first.
#[derive(Clone)]
pub struct QuizController {
    inner: Arc<Mutex<Inner>>,
    store: Arc<dyn SessionStore>,
    run_writer: Option<RunWriter>,
    per_question: Duration,
}

impl QuizController {
    /// Build the controller, resuming a persisted session when the gateway
    /// has a usable snapshot and starting fresh otherwise.
    pub fn new(
        store: Arc<dyn SessionStore>,
        run_writer: Option<RunWriter>,
        per_question: Duration,
    ) -> QuizController {
        let session = match store.load() {
            Ok(Some(session)) => {
                log::info!(
                    "resumed persisted session ({} questions, {} answered)",
                    session.questions.len(),
                    session.answered_count()
                );
                session
            }
            Ok(None) => QuizSession::default(),
            Err(err) => {
                log::warn!("discarding unusable session snapshot: {}", err);
                if let Err(err) = store.clear() {
                    log::warn!("could not clear snapshot: {}", err);
                }
                QuizSession::default()
            }
        };

        QuizController {
            inner: Arc::new(Mutex::new(Inner {
                pool: Vec::new(),
                session,
            })),
            store,
            run_writer,
            per_question,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_err| {
            QuizError::Io(io::Error::new(
                io::ErrorKind::Other,
                "controller lock poisoned",
            ))
        })
    }

    /// Persistence after a mutation is mandatory but non-fatal: progress
    /// stays live in memory even when the snapshot cannot be written.
    fn persist(&self, session: &QuizSession) {
        if let Err(err) = self.store.save(session) {
            log::warn!("could not persist session snapshot: {}", err);
        }
    }

    /// Deadline check applied at the top of every command (polling model,
    /// no background timer).
    fn enforce_deadline(&self, inner: &mut Inner, now: DateTime<Utc>) {
        if inner.session.deadline_expired(now) {
            log::info!("session deadline passed, forcing completion");
            inner.session.force_complete(now);
            self.persist(&inner.session);
            self.record_run(&inner.session, now);
        }
    }

    fn record_run(&self, session: &QuizSession, now: DateTime<Utc>) {
        let writer = match &self.run_writer {
            Some(writer) => writer,
            None => return,
        };
        if let Ok(summary) = results::final_score(session) {
            let record = RunRecord {
                finished: session.completion_time.unwrap_or(now),
                score: summary.score,
                total: summary.total,
                percentage: summary.percentage,
            };
            if let Err(err) = writer.write(&record) {
                log::warn!("could not append run record: {}", err);
            }
        }
    }

    /// Replace the question pool with a freshly normalized deck. A deck
    /// with any invalid card is rejected as a whole, leaving the previous
    /// pool and the live session untouched.
    pub fn load_deck(&self, records: &[RawCardRecord]) -> Result<usize> {
        let questions = normalize::normalize_deck(records)?;
        let count = questions.len();
        let mut inner = self.lock()?;
        inner.pool = questions;
        log::info!("loaded deck with {} questions", count);
        Ok(count)
    }

    pub fn pool_size(&self) -> Result<usize> {
        Ok(self.lock()?.pool.len())
    }

    pub fn start_quiz(&self, count: usize, now: DateTime<Utc>) -> Result<SessionStatus> {
        let mut inner = self.lock()?;
        let session = QuizSession::start(&inner.pool, count, self.per_question, now)?;
        inner.session = session;
        self.persist(&inner.session);
        log::info!("quiz started with {} questions", inner.session.questions.len());
        Ok(status_of(&inner))
    }

    /// Restart a finished (or abandoned) session over the same question
    /// set: same membership and order, fresh answers, flags, score,
    /// timestamps, and fresh display bindings.
    pub fn retake(&self, now: DateTime<Utc>) -> Result<SessionStatus> {
        let mut inner = self.lock()?;
        let questions = inner.session.questions.clone();
        let session = QuizSession::restart(questions, self.per_question, now)?;
        inner.session = session;
        self.persist(&inner.session);
        log::info!("quiz retaken with {} questions", inner.session.questions.len());
        Ok(status_of(&inner))
    }

    /// Current state of the session plus the question under the cursor,
    /// with its display binding built on first render.
    pub fn overview(&self, now: DateTime<Utc>) -> Result<(SessionStatus, Option<QuestionView>)> {
        let mut inner = self.lock()?;
        self.enforce_deadline(&mut inner, now);

        if inner.session.current_question().is_some() && inner.session.bind_current() {
            // Binding creation is a mutation: persist it so a resumed
            // session keeps the same option order.
            self.persist(&inner.session);
        }

        let status = status_of(&inner);
        let session = &inner.session;
        let view = session.current_question().map(|question| {
            let (question_type, required_count) = question.question_type();
            let options = question
                .binding
                .as_ref()
                .map(|binding| binding.options.clone())
                .unwrap_or_else(|| question.options.clone());
            QuestionView {
                index: session.current_index,
                total: session.questions.len(),
                prompt: question.prompt.clone(),
                options,
                question_type,
                required_count,
                flagged: session
                    .flags
                    .get(session.current_index)
                    .copied()
                    .unwrap_or(false),
                deadline: session.deadline,
                remaining_seconds: session.remaining_seconds(now),
            }
        });

        Ok((status, view))
    }

    pub fn submit_answer(&self, response: Vec<bool>, now: DateTime<Utc>) -> Result<SubmitOutcome> {
        let mut inner = self.lock()?;
        self.enforce_deadline(&mut inner, now);

        if inner.session.current_question().is_none() {
            return Ok(SubmitOutcome {
                accepted: false,
                is_correct: false,
                completed: inner.session.completed,
            });
        }

        let is_correct = inner.session.submit(response, now);
        let completed = inner.session.completed;
        self.persist(&inner.session);
        if completed {
            log::info!(
                "quiz completed with score {}/{}",
                inner.session.score,
                inner.session.questions.len()
            );
            self.record_run(&inner.session, now);
        }

        Ok(SubmitOutcome {
            accepted: true,
            is_correct,
            completed,
        })
    }

    pub fn navigate(&self, index: usize, now: DateTime<Utc>) -> Result<SessionStatus> {
        let mut inner = self.lock()?;
        self.enforce_deadline(&mut inner, now);
        inner.session.navigate(index)?;
        self.persist(&inner.session);
        Ok(status_of(&inner))
    }

    /// Returns the new flag state of the current question.
    pub fn toggle_flag(&self, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.lock()?;
        self.enforce_deadline(&mut inner, now);
        inner.session.toggle_flag();
        self.persist(&inner.session);
        let flagged = inner
            .session
            .flags
            .get(inner.session.current_index)
            .copied()
            .unwrap_or(false);
        Ok(flagged)
    }

    /// Early submission: complete the session now, filling the gaps with
    /// all-false answers.
    pub fn force_complete(&self, now: DateTime<Utc>) -> Result<ScoreSummary> {
        let mut inner = self.lock()?;
        let was_completed = inner.session.completed;
        inner.session.force_complete(now);
        self.persist(&inner.session);
        if !was_completed && inner.session.completed {
            self.record_run(&inner.session, now);
        }
        results::final_score(&inner.session)
    }

    /// Discard the session and its persisted snapshot. The question pool
    /// is kept; a new quiz can start from it directly.
    pub fn reset(&self) -> Result<SessionStatus> {
        let mut inner = self.lock()?;
        self.store.clear()?;
        inner.session = QuizSession::default();
        log::info!("session reset");
        Ok(status_of(&inner))
    }

    pub fn results(&self, now: DateTime<Utc>) -> Result<ResultsView> {
        let mut inner = self.lock()?;
        self.enforce_deadline(&mut inner, now);
        let summary = results::final_score(&inner.session)?;
        Ok(ResultsView {
            summary,
            questions: results::per_question_report(&inner.session),
        })
    }
}

fn status_of(inner: &Inner) -> SessionStatus {
    let session = &inner.session;
    SessionStatus {
        started: session.started,
        completed: session.completed,
        total: session.questions.len(),
        answered_count: session.answered_count(),
        answered: (0..session.questions.len())
            .map(|index| session.is_question_answered(index))
            .collect(),
        flags: session.flags.clone(),
        pool_size: inner.pool.len(),
    }
}

/// One row per finished quiz run.
#[derive(Clone, Debug, Serialize)]
pub struct RunRecord {
    pub finished: DateTime<Utc>,
    pub score: u32,
    pub total: usize,
    pub percentage: f32,
}

/// Append-only CSV log of completed runs.
#[derive(Clone)]
pub struct RunWriter {
    writer: Arc<Mutex<csv::Writer<File>>>,
}

impl RunWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<RunWriter> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        Ok(RunWriter {
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    pub fn write(&self, record: &RunRecord) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_err| {
            QuizError::Io(io::Error::new(
                io::ErrorKind::Other,
                "couldn't lock run writer",
            ))
        })?;
        writer.serialize(record)?;
        writer.flush()?;

        Ok(())
    }
}
