use serde::Serialize;

use crate::codec;
use crate::error::{QuizError, Result};
use crate::models::QuizSession;

/// Final score of a completed session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub score: u32,
    pub total: usize,
    pub percentage: f32,
}

pub fn final_score(session: &QuizSession) -> Result<ScoreSummary> {
    if !session.completed {
        return Err(QuizError::SessionNotCompleted);
    }

    let total = session.questions.len();
    if total == 0 {
        return Ok(ScoreSummary {
            score: 0,
            total: 0,
            percentage: 0.0,
        });
    }

    Ok(ScoreSummary {
        score: session.score,
        total,
        percentage: session.score as f32 * 100.0 / total as f32,
    })
}

/// One entry of the per-question results breakdown, in display order.
#[derive(Clone, Debug, Serialize)]
pub struct QuestionReport {
    pub index: usize,
    pub is_correct: bool,
    pub prompt: String,
    pub display_options: Vec<String>,
    pub display_correctness: Vec<bool>,
    pub user_answer: Vec<bool>,
    pub explanation: Option<String>,
}

/// Per-question breakdown for the results view.
///
/// Questions missing a display binding or an answer are skipped rather than
/// reported half-empty; a well-formed completed session has neither.
pub fn per_question_report(session: &QuizSession) -> Vec<QuestionReport> {
    session
        .questions
        .iter()
        .zip(&session.answers)
        .enumerate()
        .filter_map(|(index, (question, answer))| {
            let binding = question.binding.as_ref()?;
            let answer = answer.as_ref()?;
            Some(QuestionReport {
                index,
                is_correct: codec::is_correct(Some(answer), &binding.correctness),
                prompt: question.prompt.clone(),
                display_options: binding.options.clone(),
                display_correctness: binding.correctness.clone(),
                user_answer: answer.clone(),
                explanation: question.explanation.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Question, QuizSession};
    use chrono::{Duration, Utc};

    fn pool(size: usize) -> Vec<Question> {
        (0..size)
            .map(|index| Question {
                prompt: format!("question {}", index + 1),
                explanation: Some("because".into()),
                source: None,
                title: None,
                options: vec!["a".into(), "b".into()],
                correctness: vec![true, false],
                tags: Vec::new(),
                metadata: Default::default(),
                binding: None,
            })
            .collect()
    }

    fn completed_session(size: usize, correct: usize) -> QuizSession {
        let now = Utc::now();
        let mut session =
            QuizSession::start(&pool(size), size, Duration::seconds(120), now).unwrap();
        for index in 0..size {
            session.navigate(index).unwrap();
            let binding = session.questions[index].binding.clone().unwrap();
            let response = if index < correct {
                binding.correctness.clone()
            } else {
                binding
                    .correctness
                    .iter()
                    .map(|&correct| !correct)
                    .collect()
            };
            session.submit(response, now);
        }
        if !session.completed {
            session.force_complete(now);
        }
        session
    }

    #[test]
    fn final_score_requires_completion() {
        let now = Utc::now();
        match final_score(&QuizSession::default()) {
            Err(QuizError::SessionNotCompleted) => {}
            other => panic!("unexpected: {:?}", other),
        }

        let in_progress =
            QuizSession::start(&pool(3), 3, Duration::seconds(120), now).unwrap();
        assert!(final_score(&in_progress).is_err());
    }

    #[test]
    fn final_score_summarizes_a_completed_session() {
        let session = completed_session(4, 3);
        let summary = final_score(&session).unwrap();
        assert_eq!(summary.score, 3);
        assert_eq!(summary.total, 4);
        assert!((summary.percentage - 75.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_completed_session_scores_zero_without_dividing() {
        let mut session = QuizSession::default();
        session.completed = true;
        let summary = final_score(&session).unwrap();
        assert_eq!(summary.score, 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.percentage, 0.0);
    }

    #[test]
    fn report_covers_every_answered_question() {
        let session = completed_session(3, 2);
        let report = per_question_report(&session);
        assert_eq!(report.len(), 3);
        assert_eq!(report.iter().filter(|entry| entry.is_correct).count(), 2);
        for entry in &report {
            assert_eq!(entry.display_options.len(), entry.display_correctness.len());
            assert_eq!(entry.display_options.len(), entry.user_answer.len());
            assert_eq!(entry.explanation.as_deref(), Some("because"));
        }
    }

    #[test]
    fn report_skips_questions_without_binding_or_answer() {
        let mut session = completed_session(3, 3);
        session.questions[1].binding = None;
        session.answers[2] = None;
        let report = per_question_report(&session);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].index, 0);
    }
}
