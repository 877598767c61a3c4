use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;

use crate::codec;
use crate::error::{QuizError, Result};
use crate::models::{Question, QuizSession};
use crate::shuffle;

impl QuizSession {
    /// Sample `count` questions from the pool and enter the in-progress
    /// state. The selection and its order are fixed for the lifetime of the
    /// session. A count larger than the pool is clamped with a warning
    /// rather than rejected.
    pub fn start(
        pool: &[Question],
        count: usize,
        per_question: Duration,
        now: DateTime<Utc>,
    ) -> Result<QuizSession> {
        if pool.is_empty() {
            return Err(QuizError::EmptyPool);
        }
        if count == 0 {
            return Err(QuizError::InvalidCount(count));
        }

        let count = if count > pool.len() {
            log::warn!(
                "requested {} questions but the pool has {}; clamping",
                count,
                pool.len()
            );
            pool.len()
        } else {
            count
        };

        let mut rng = thread_rng();
        let mut selected = pool
            .choose_multiple(&mut rng, count)
            .cloned()
            .collect::<Vec<_>>();
        selected.shuffle(&mut rng);

        QuizSession::restart(selected, per_question, now)
    }

    /// Fresh in-progress session over an explicit question set, membership
    /// and order preserved. Used by `start` after sampling and by retakes.
    pub fn restart(
        mut questions: Vec<Question>,
        per_question: Duration,
        now: DateTime<Utc>,
    ) -> Result<QuizSession> {
        if questions.is_empty() {
            return Err(QuizError::EmptyPool);
        }

        // Bindings belong to a single session; a fresh session reshuffles.
        for question in &mut questions {
            question.binding = None;
        }

        let count = questions.len();
        Ok(QuizSession {
            questions,
            current_index: 0,
            answers: vec![None; count],
            flags: vec![false; count],
            score: 0,
            started: true,
            completed: false,
            start_time: Some(now),
            deadline: Some(now + per_question * count as i32),
            completion_time: None,
        })
    }

    /// The question the UI should display, if any.
    ///
    /// While in progress this always points somewhere, even when the
    /// question under the cursor is already answered. Only a completed
    /// session with a response recorded for every question has nothing left
    /// to show.
    pub fn current_question(&self) -> Option<&Question> {
        if self.completed && self.answers.iter().all(|answer| answer.is_some()) {
            return None;
        }
        self.questions.get(self.current_index)
    }

    /// A question counts as answered once a response with at least one
    /// selection is recorded for it. Single predicate behind completion,
    /// the score board, and `answered_count`.
    pub fn is_question_answered(&self, index: usize) -> bool {
        match self.answers.get(index) {
            Some(Some(response)) => response.iter().any(|&picked| picked),
            _ => false,
        }
    }

    /// Whether any response at all is recorded, all-false included.
    pub fn has_response(&self, index: usize) -> bool {
        matches!(self.answers.get(index), Some(Some(_)))
    }

    pub fn answered_count(&self) -> usize {
        (0..self.questions.len())
            .filter(|&index| self.is_question_answered(index))
            .count()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_in_progress(&self) -> bool {
        self.started && !self.completed
    }

    /// Build the display binding for the question under the cursor if this
    /// is its first render. Returns whether a binding was built, so the
    /// caller knows to persist.
    pub fn bind_current(&mut self) -> bool {
        let index = self.current_index;
        self.ensure_binding(index)
    }

    fn ensure_binding(&mut self, index: usize) -> bool {
        if let Some(question) = self.questions.get_mut(index) {
            if question.binding.is_none() {
                let binding = shuffle::build_binding(question);
                question.binding = Some(binding);
                return true;
            }
        }
        false
    }

    /// Record a response for the current question and score it against the
    /// displayed option order.
    ///
    /// Returns whether the response was correct; a session without a current
    /// question swallows the call and returns false. The session completes
    /// only when every question is answered *and* the submission happened on
    /// the last index; otherwise the cursor advances to the next question
    /// without a response, wrapping around, and stays put if there is none.
    pub fn submit(&mut self, response: Vec<bool>, now: DateTime<Utc>) -> bool {
        if self.current_question().is_none() {
            return false;
        }

        let index = self.current_index;
        self.ensure_binding(index);

        let (was_correct, now_correct) = match self.questions[index].binding.as_ref() {
            Some(binding) => (
                codec::is_correct(self.answers[index].as_deref(), &binding.correctness),
                codec::is_correct(Some(&response), &binding.correctness),
            ),
            None => (false, false),
        };
        // Score moves only on a not-correct -> correct transition, so
        // re-submitting a question can neither double-count nor lower it.
        if now_correct && !was_correct {
            self.score += 1;
        }
        self.answers[index] = Some(response);

        let all_answered = (0..self.questions.len()).all(|i| self.is_question_answered(i));
        let at_last_index = index + 1 == self.questions.len();
        if all_answered && at_last_index {
            self.complete(now);
        } else {
            self.advance_past(index);
        }

        now_correct
    }

    /// Move the cursor to the next question with no recorded response,
    /// wrapping around; stays put when every other question has one.
    fn advance_past(&mut self, index: usize) {
        let len = self.questions.len();
        let mut next = (index + 1) % len;
        while next != index {
            if !self.has_response(next) {
                break;
            }
            next = (next + 1) % len;
        }
        self.current_index = next;
    }

    /// Move the cursor to `index`, building that question's binding on
    /// first visit. A session with no questions rejects every index.
    pub fn navigate(&mut self, index: usize) -> Result<()> {
        if index >= self.questions.len() {
            return Err(QuizError::IndexOutOfRange {
                index,
                len: self.questions.len(),
            });
        }
        self.current_index = index;
        self.ensure_binding(index);
        Ok(())
    }

    /// Advisory review marker; never affects scoring or completion.
    pub fn toggle_flag(&mut self) {
        let index = self.current_index;
        if let Some(flag) = self.flags.get_mut(index) {
            *flag = !*flag;
        }
    }

    /// Finish the session immediately, filling every missing response with
    /// an all-false record sized to the question's option count. Used for
    /// early submission and deadline expiry.
    pub fn force_complete(&mut self, now: DateTime<Utc>) {
        if !self.started {
            return;
        }

        for index in 0..self.questions.len() {
            if self.answers[index].is_none() {
                let question = &self.questions[index];
                let len = question
                    .binding
                    .as_ref()
                    .map(|binding| binding.options.len())
                    .unwrap_or_else(|| question.options.len());
                self.answers[index] = Some(vec![false; len]);
            }
        }
        self.complete(now);
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        if self.completion_time.is_none() {
            self.completion_time = Some(now);
        }
        self.completed = true;
        self.started = false;
    }

    /// Whether the wall clock has passed the session deadline. Derived from
    /// the stored absolute deadline so a resumed session cannot drift.
    pub fn deadline_expired(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => self.is_in_progress() && now >= deadline,
            None => false,
        }
    }

    /// Seconds left on the clock, never negative.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        match self.deadline {
            Some(deadline) => (deadline - now).num_seconds().max(0),
            None => 0,
        }
    }

    /// Structural invariants every persisted snapshot must satisfy before
    /// it is allowed to resume.
    pub fn check_invariants(&self) -> Result<()> {
        let len = self.questions.len();
        if self.answers.len() != len || self.flags.len() != len {
            return Err(QuizError::CorruptSnapshot(
                "answer and flag lists out of step with questions".into(),
            ));
        }
        if len > 0 && self.current_index >= len {
            return Err(QuizError::CorruptSnapshot("cursor out of range".into()));
        }
        if self.started && self.completed {
            return Err(QuizError::CorruptSnapshot(
                "session both in progress and completed".into(),
            ));
        }
        for question in &self.questions {
            if question.options.len() != question.correctness.len() {
                return Err(QuizError::CorruptSnapshot(
                    "question options out of step with correctness".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{QuestionType, QuizSession};

    fn question(prompt: &str, correctness: &[bool]) -> Question {
        Question {
            prompt: prompt.into(),
            explanation: None,
            source: None,
            title: None,
            options: correctness
                .iter()
                .enumerate()
                .map(|(index, _)| format!("option {}", index + 1))
                .collect(),
            correctness: correctness.to_vec(),
            tags: Vec::new(),
            metadata: Default::default(),
            binding: None,
        }
    }

    fn single_answer_pool(size: usize) -> Vec<Question> {
        (0..size)
            .map(|index| question(&format!("question {}", index + 1), &[true, false, false]))
            .collect()
    }

    /// Submit whatever the displayed correct answer is for the current
    /// question.
    fn submit_correct(session: &mut QuizSession, now: DateTime<Utc>) -> bool {
        session.bind_current();
        let response = session.questions[session.current_index]
            .binding
            .as_ref()
            .unwrap()
            .correctness
            .clone();
        session.submit(response, now)
    }

    #[test]
    fn question_type_derives_from_correct_count() {
        let single = question("s", &[true, false, false]);
        assert_eq!(single.question_type(), (QuestionType::Single, 1));

        let multi = question("m", &[true, true, false, false]);
        assert_eq!(multi.question_type(), (QuestionType::Multiple, 2));
    }

    #[test]
    fn start_samples_the_requested_count() {
        let pool = single_answer_pool(10);
        let now = Utc::now();
        let session = QuizSession::start(&pool, 5, Duration::seconds(120), now).unwrap();

        assert_eq!(session.questions.len(), 5);
        assert_eq!(session.current_index, 0);
        assert!(session.answers.iter().all(|answer| answer.is_none()));
        assert!(session.flags.iter().all(|&flag| !flag));
        assert!(!session.completed);
        assert!(session.started);
        assert_eq!(session.start_time, Some(now));
        assert_eq!(session.deadline, Some(now + Duration::seconds(600)));
    }

    #[test]
    fn start_samples_without_replacement() {
        let pool = single_answer_pool(10);
        let session = QuizSession::start(&pool, 10, Duration::seconds(120), Utc::now()).unwrap();
        let mut prompts = session
            .questions
            .iter()
            .map(|question| question.prompt.clone())
            .collect::<Vec<_>>();
        prompts.sort();
        prompts.dedup();
        assert_eq!(prompts.len(), 10);
    }

    #[test]
    fn start_clamps_oversized_count() {
        let pool = single_answer_pool(10);
        let session = QuizSession::start(&pool, 20, Duration::seconds(120), Utc::now()).unwrap();
        assert_eq!(session.questions.len(), 10);
    }

    #[test]
    fn start_rejects_empty_pool_and_zero_count() {
        let now = Utc::now();
        match QuizSession::start(&[], 5, Duration::seconds(120), now) {
            Err(QuizError::EmptyPool) => {}
            other => panic!("unexpected: {:?}", other),
        }
        match QuizSession::start(&single_answer_pool(3), 0, Duration::seconds(120), now) {
            Err(QuizError::InvalidCount(0)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn current_question_is_idempotent() {
        let pool = single_answer_pool(3);
        let session = QuizSession::start(&pool, 3, Duration::seconds(120), Utc::now()).unwrap();
        let first = session.current_question().map(|q| q.prompt.clone());
        let second = session.current_question().map(|q| q.prompt.clone());
        assert_eq!(first, second);
        assert_eq!(session.current_index, 0);
    }

    #[test]
    fn binding_is_stable_across_navigation() {
        let pool = single_answer_pool(3);
        let mut session = QuizSession::start(&pool, 3, Duration::seconds(120), Utc::now()).unwrap();

        session.bind_current();
        let before = session.questions[0].binding.clone().unwrap();

        session.navigate(2).unwrap();
        session.navigate(0).unwrap();
        session.bind_current();

        let after = session.questions[0].binding.clone().unwrap();
        assert_eq!(before.options, after.options);
        assert_eq!(before.correctness, after.correctness);
        assert_eq!(before.source_indices, after.source_indices);
    }

    #[test]
    fn correct_submission_increments_score_and_advances() {
        let pool = single_answer_pool(3);
        let now = Utc::now();
        let mut session = QuizSession::start(&pool, 3, Duration::seconds(120), now).unwrap();

        assert!(submit_correct(&mut session, now));
        assert_eq!(session.score, 1);
        assert_eq!(session.current_index, 1);
        assert!(!session.completed);
    }

    #[test]
    fn wrong_submission_records_but_does_not_score() {
        let mut session = QuizSession::restart(
            vec![question("q", &[false, true, false])],
            Duration::seconds(120),
            Utc::now(),
        )
        .unwrap();
        session.bind_current();

        let binding = session.questions[0].binding.clone().unwrap();
        let wrong = binding
            .correctness
            .iter()
            .map(|&correct| !correct)
            .collect::<Vec<_>>();
        let result = session.submit(wrong, Utc::now());

        assert!(!result);
        assert_eq!(session.score, 0);
        assert!(session.has_response(0));
    }

    #[test]
    fn undersized_multi_answer_is_accepted_but_scored_false() {
        // Two correct options; a response picking only one of them is a
        // valid answer record that simply scores false.
        let mut session = QuizSession::restart(
            vec![question("q", &[true, true, false, false])],
            Duration::seconds(120),
            Utc::now(),
        )
        .unwrap();
        session.bind_current();

        let binding = session.questions[0].binding.clone().unwrap();
        let mut partial = vec![false; binding.correctness.len()];
        let first_correct = binding.correctness.iter().position(|&c| c).unwrap();
        partial[first_correct] = true;

        assert!(!session.submit(partial, Utc::now()));
        assert!(session.has_response(0));
        assert!(session.is_question_answered(0));
        assert_eq!(session.score, 0);
    }

    #[test]
    fn completes_only_on_last_index_with_all_answered() {
        let pool = single_answer_pool(3);
        let now = Utc::now();
        let mut session = QuizSession::start(&pool, 3, Duration::seconds(120), now).unwrap();

        // Answer the last question first: everything else is still open, so
        // the session must not complete.
        session.navigate(2).unwrap();
        assert!(submit_correct(&mut session, now));
        assert!(!session.completed);
        // Cursor wrapped to the first unanswered question.
        assert_eq!(session.current_index, 0);

        assert!(submit_correct(&mut session, now));
        assert!(!session.completed);
        assert_eq!(session.current_index, 1);

        // All answered now, but the submission index was not the last one.
        assert!(submit_correct(&mut session, now));
        assert!(!session.completed);
        assert_eq!(session.current_index, 1);

        // Re-submit on the last index to actually complete.
        session.navigate(2).unwrap();
        assert!(submit_correct(&mut session, now));
        assert!(session.is_completed());
        assert!(!session.started);
        assert!(!session.is_in_progress());
        assert_eq!(session.completion_time, Some(now));
        assert_eq!(session.score, 3);
        assert!(session.current_question().is_none());
    }

    #[test]
    fn completion_law_in_order() {
        let pool = single_answer_pool(4);
        let now = Utc::now();
        let mut session = QuizSession::start(&pool, 4, Duration::seconds(120), now).unwrap();

        for _ in 0..4 {
            submit_correct(&mut session, now);
        }

        assert!(session.completed);
        assert_eq!(session.score, 4);
        assert_eq!(session.answered_count(), 4);
    }

    #[test]
    fn resubmission_does_not_double_count() {
        let pool = single_answer_pool(2);
        let now = Utc::now();
        let mut session = QuizSession::start(&pool, 2, Duration::seconds(120), now).unwrap();

        assert!(submit_correct(&mut session, now));
        assert_eq!(session.score, 1);

        // Back to the answered question; same correct answer again.
        session.navigate(0).unwrap();
        assert!(submit_correct(&mut session, now));
        assert_eq!(session.score, 1);
    }

    #[test]
    fn navigate_rejects_out_of_range() {
        let pool = single_answer_pool(2);
        let mut session = QuizSession::start(&pool, 2, Duration::seconds(120), Utc::now()).unwrap();
        match session.navigate(2) {
            Err(QuizError::IndexOutOfRange { index: 2, len: 2 }) => {}
            other => panic!("unexpected: {:?}", other),
        }

        let mut empty = QuizSession::default();
        assert!(empty.navigate(0).is_err());
    }

    #[test]
    fn toggle_flag_flips_only_the_current_question() {
        let pool = single_answer_pool(2);
        let mut session = QuizSession::start(&pool, 2, Duration::seconds(120), Utc::now()).unwrap();

        session.toggle_flag();
        assert_eq!(session.flags, vec![true, false]);
        session.toggle_flag();
        assert_eq!(session.flags, vec![false, false]);

        // Flags never change scoring or completion.
        assert_eq!(session.score, 0);
        assert!(!session.completed);
    }

    #[test]
    fn force_complete_fills_unanswered_with_all_false() {
        let pool = single_answer_pool(3);
        let now = Utc::now();
        let mut session = QuizSession::start(&pool, 3, Duration::seconds(120), now).unwrap();

        assert!(submit_correct(&mut session, now));
        session.force_complete(now);

        assert!(session.completed);
        assert!(!session.started);
        assert_eq!(session.completion_time, Some(now));
        for (index, answer) in session.answers.iter().enumerate() {
            let answer = answer.as_ref().unwrap();
            if index > 0 {
                assert!(answer.iter().all(|&picked| !picked));
            }
        }
        // Every answer is present, so there is nothing left to display.
        assert!(session.current_question().is_none());
    }

    #[test]
    fn force_complete_is_a_no_op_before_start() {
        let mut session = QuizSession::default();
        session.force_complete(Utc::now());
        assert!(!session.completed);
    }

    #[test]
    fn deadline_expiry_forces_completion_on_next_interaction() {
        let pool = single_answer_pool(2);
        let started_at = Utc::now() - Duration::seconds(600);
        let mut session = QuizSession::start(&pool, 2, Duration::seconds(120), started_at).unwrap();

        let now = Utc::now();
        assert!(session.deadline_expired(now));
        assert_eq!(session.remaining_seconds(now), 0);

        session.force_complete(now);
        assert!(session.completed);
        assert!(session.answers.iter().all(|answer| answer.is_some()));
        assert!(!session.deadline_expired(now));
    }

    #[test]
    fn remaining_time_derives_from_the_absolute_deadline() {
        let pool = single_answer_pool(2);
        let now = Utc::now();
        let session = QuizSession::start(&pool, 2, Duration::seconds(120), now).unwrap();
        assert_eq!(session.remaining_seconds(now + Duration::seconds(100)), 140);
    }

    #[test]
    fn snapshot_invariants_catch_misaligned_lists() {
        let pool = single_answer_pool(2);
        let mut session = QuizSession::start(&pool, 2, Duration::seconds(120), Utc::now()).unwrap();
        assert!(session.check_invariants().is_ok());

        session.answers.pop();
        assert!(session.check_invariants().is_err());
    }
}
