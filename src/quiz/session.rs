use log::{debug, info, warn};

use super::ai_helper::QuestionProvider;
use super::score::ResultSummary;
use super::{validate_batch, QuizQuestion, QuizSettings, UserAnswer, OPTION_COUNT};
use crate::error::ProviderError;

pub const GENERATION_FAILED: &str =
    "Something went wrong while generating the quiz. Try another topic.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Setup {
        error: Option<String>,
    },
    Generating,
    /// `answers` holds `current_index` entries while the current question is
    /// open and one more once it has been answered.
    InProgress {
        current_index: usize,
        answers: Vec<UserAnswer>,
    },
    Completed {
        answers: Vec<UserAnswer>,
    },
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Setup { error: None }
    }
}

/// Identifies the question an image was requested for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTicket {
    pub attempt: u32,
    pub question_index: usize,
    pub prompt: String,
}

/// Read-only view handed to the renderer.
#[derive(Debug, PartialEq, Eq)]
pub enum Snapshot<'a> {
    Setup {
        error: Option<&'a str>,
    },
    Generating,
    Question {
        index: usize,
        total: usize,
        question: &'a QuizQuestion,
        answer: Option<&'a UserAnswer>,
    },
    Finished {
        summary: ResultSummary,
    },
}

/// One quiz attempt, from settings to final score.
#[derive(Debug, Clone, Default)]
pub struct QuizSession {
    state: SessionState,
    questions: Vec<QuizQuestion>,
    attempt: u32,
}

impl QuizSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            SessionState::Setup { error } => error.as_deref(),
            _ => None,
        }
    }

    pub fn current_question(&self) -> Option<&QuizQuestion> {
        match &self.state {
            SessionState::InProgress { current_index, .. } => self.questions.get(*current_index),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<ResultSummary> {
        match &self.state {
            SessionState::Completed { answers } => {
                Some(ResultSummary::from_answers(answers, self.questions.len()))
            }
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        match &self.state {
            SessionState::Setup { error } => Snapshot::Setup {
                error: error.as_deref(),
            },
            SessionState::Generating => Snapshot::Generating,
            SessionState::InProgress {
                current_index,
                answers,
            } => Snapshot::Question {
                index: *current_index,
                total: self.questions.len(),
                question: &self.questions[*current_index],
                answer: answers.get(*current_index),
            },
            SessionState::Completed { answers } => Snapshot::Finished {
                summary: ResultSummary::from_answers(answers, self.questions.len()),
            },
        }
    }

    /// Setup -> Generating. Returns false when the session is elsewhere.
    pub fn begin_generation(&mut self) -> bool {
        if !matches!(self.state, SessionState::Setup { .. }) {
            debug!("Ignoring start: session is not in setup");
            return false;
        }
        self.state = SessionState::Generating;
        true
    }

    /// Applies the provider's answer to a pending generation.
    pub fn finish_generation(
        &mut self,
        result: Result<Vec<QuizQuestion>, ProviderError>,
        expected: usize,
    ) -> Result<(), ProviderError> {
        if self.state != SessionState::Generating {
            debug!("Ignoring generation result: nothing is being generated");
            return Ok(());
        }

        let questions = result.and_then(|questions| {
            validate_batch(&questions, expected)?;
            Ok(questions)
        });

        match questions {
            Ok(questions) => {
                info!("Quiz generated with {} questions", questions.len());
                self.questions = questions;
                self.enter_first_question();
                Ok(())
            }
            Err(err) => {
                warn!("Quiz generation failed: {}", err);
                self.questions.clear();
                self.state = SessionState::Setup {
                    error: Some(GENERATION_FAILED.to_string()),
                };
                Err(err)
            }
        }
    }

    /// Requests a question batch for `settings` and enters the first question.
    ///
    /// Outside of setup this is a no-op. On failure the session is back in
    /// setup with a user-facing error, and the cause is returned for logging.
    pub async fn start(
        &mut self,
        settings: QuizSettings,
        provider: &dyn QuestionProvider,
    ) -> Result<(), ProviderError> {
        if !self.begin_generation() {
            return Ok(());
        }
        info!(
            "Generating {} {} questions about {:?}",
            settings.question_count(),
            settings.difficulty(),
            settings.topic()
        );
        let result = provider
            .generate_questions(
                settings.topic(),
                settings.difficulty(),
                settings.question_count(),
            )
            .await;
        self.finish_generation(result, settings.question_count())
    }

    /// Records the answer for the current question, once.
    pub fn select_option(&mut self, option_index: usize) -> Option<UserAnswer> {
        let SessionState::InProgress {
            current_index,
            answers,
        } = &mut self.state
        else {
            debug!("Ignoring option {}: no question is open", option_index);
            return None;
        };
        if answers.len() > *current_index {
            debug!("Ignoring option {}: question {} is already answered", option_index, current_index);
            return None;
        }
        if option_index >= OPTION_COUNT {
            debug!("Ignoring option {}: out of range", option_index);
            return None;
        }

        let answer = UserAnswer {
            question_index: *current_index,
            selected_option_index: option_index,
            is_correct: self.questions[*current_index].is_correct(option_index),
        };
        answers.push(answer);
        Some(answer)
    }

    /// Moves past an answered question. Past the last one the attempt completes.
    pub fn advance(&mut self) -> bool {
        let SessionState::InProgress {
            current_index,
            answers,
        } = &mut self.state
        else {
            return false;
        };
        if answers.len() <= *current_index {
            debug!("Ignoring advance: question {} is unanswered", current_index);
            return false;
        }

        if *current_index + 1 < self.questions.len() {
            *current_index += 1;
            return true;
        }

        let answers = std::mem::take(answers);
        let summary = ResultSummary::from_answers(&answers, self.questions.len());
        info!(
            "Quiz completed: {}/{} correct ({}%)",
            summary.correct_count, summary.total_questions, summary.score_percent
        );
        self.state = SessionState::Completed { answers };
        true
    }

    /// Replays the same questions from the beginning.
    pub fn restart(&mut self) -> bool {
        if !matches!(self.state, SessionState::Completed { .. }) {
            debug!("Ignoring restart: quiz is not completed");
            return false;
        }
        self.enter_first_question();
        true
    }

    /// Drops the questions and goes back to setup.
    pub fn new_quiz(&mut self) -> bool {
        if !matches!(self.state, SessionState::Completed { .. }) {
            debug!("Ignoring new quiz: quiz is not completed");
            return false;
        }
        self.questions.clear();
        self.state = SessionState::default();
        true
    }

    pub fn image_ticket(&self) -> Option<ImageTicket> {
        let SessionState::InProgress { current_index, .. } = &self.state else {
            return None;
        };
        Some(ImageTicket {
            attempt: self.attempt,
            question_index: *current_index,
            prompt: self.questions[*current_index].image_prompt.clone(),
        })
    }

    /// Whether an image fetched for `ticket` may still be shown.
    pub fn accepts_image(&self, ticket: &ImageTicket) -> bool {
        match &self.state {
            SessionState::InProgress { current_index, .. } => {
                ticket.attempt == self.attempt && ticket.question_index == *current_index
            }
            _ => false,
        }
    }

    /// Stores a resolved image reference; stale tickets are dropped.
    pub fn attach_image(&mut self, ticket: &ImageTicket, reference: String) -> bool {
        if !self.accepts_image(ticket) {
            debug!(
                "Discarding stale image for question {} of attempt {}",
                ticket.question_index, ticket.attempt
            );
            return false;
        }
        self.questions[ticket.question_index].image = Some(reference);
        true
    }

    fn enter_first_question(&mut self) {
        self.attempt += 1;
        self.state = SessionState::InProgress {
            current_index: 0,
            answers: Vec::new(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::ai_helper::MockQuestionProvider;
    use crate::quiz::score::Tier;
    use crate::quiz::{sample_question, Difficulty};

    fn batch(correct: &[usize]) -> Vec<QuizQuestion> {
        correct
            .iter()
            .enumerate()
            .map(|(n, &c)| sample_question(n, c))
            .collect()
    }

    fn provider_returning(questions: Vec<QuizQuestion>) -> MockQuestionProvider {
        let mut provider = MockQuestionProvider::new();
        provider
            .expect_generate_questions()
            .times(1)
            .returning(move |_, _, _| Ok(questions.clone()));
        provider
    }

    async fn started(correct: &[usize]) -> QuizSession {
        let provider = provider_returning(batch(correct));
        let settings = QuizSettings::new("Rome", Difficulty::Medium, correct.len()).unwrap();
        let mut session = QuizSession::new();
        session.start(settings, &provider).await.unwrap();
        session
    }

    fn answers_len(session: &QuizSession) -> usize {
        match session.state() {
            SessionState::InProgress { answers, .. } | SessionState::Completed { answers } => {
                answers.len()
            }
            _ => 0,
        }
    }

    #[tokio::test]
    async fn start_requests_questions_and_opens_the_first_one() {
        let mut provider = MockQuestionProvider::new();
        provider
            .expect_generate_questions()
            .withf(|topic, difficulty, count| {
                topic == "Rome" && *difficulty == Difficulty::Medium && *count == 3
            })
            .times(1)
            .returning(|_, _, _| Ok(batch(&[0, 1, 2])));

        let settings = QuizSettings::new("Rome", Difficulty::Medium, 3).unwrap();
        let mut session = QuizSession::new();
        session.start(settings, &provider).await.unwrap();

        assert_eq!(
            session.state(),
            &SessionState::InProgress {
                current_index: 0,
                answers: vec![]
            }
        );
        assert_eq!(session.questions().len(), 3);
        assert!(session
            .questions()
            .iter()
            .all(|q| q.options.len() == OPTION_COUNT && q.correct_answer_index < OPTION_COUNT));
    }

    #[tokio::test]
    async fn provider_failure_returns_to_setup_with_message() {
        let mut provider = MockQuestionProvider::new();
        provider
            .expect_generate_questions()
            .times(1)
            .returning(|_, _, _| Err(ProviderError::Empty));

        let settings = QuizSettings::new("Rome", Difficulty::Easy, 3).unwrap();
        let mut session = QuizSession::new();
        let result = session.start(settings, &provider).await;

        assert!(matches!(result, Err(ProviderError::Empty)));
        assert_eq!(session.error(), Some(GENERATION_FAILED));
        assert!(session.questions().is_empty());
        assert_eq!(
            session.snapshot(),
            Snapshot::Setup {
                error: Some(GENERATION_FAILED)
            }
        );
    }

    #[tokio::test]
    async fn short_batch_counts_as_failure() {
        let provider = provider_returning(batch(&[0, 1]));
        let settings = QuizSettings::new("Rome", Difficulty::Hard, 3).unwrap();
        let mut session = QuizSession::new();
        let result = session.start(settings, &provider).await;

        assert!(matches!(
            result,
            Err(ProviderError::WrongCount {
                expected: 3,
                actual: 2
            })
        ));
        assert_eq!(session.error(), Some(GENERATION_FAILED));
    }

    #[tokio::test]
    async fn start_is_ignored_outside_setup() {
        let mut session = started(&[0, 0, 0]).await;
        // No expectations: any call would panic.
        let provider = MockQuestionProvider::new();
        let settings = QuizSettings::new("Other", Difficulty::Easy, 3).unwrap();
        session.start(settings, &provider).await.unwrap();
        assert_eq!(session.questions()[0].question, "Question 0?");
    }

    #[test]
    fn generating_state_is_visible_between_begin_and_finish() {
        let mut session = QuizSession::new();
        assert!(session.begin_generation());
        assert_eq!(session.snapshot(), Snapshot::Generating);
        assert!(!session.begin_generation());
        assert!(session.select_option(0).is_none());
        session.finish_generation(Ok(batch(&[1, 1, 1])), 3).unwrap();
        assert!(matches!(session.snapshot(), Snapshot::Question { index: 0, total: 3, .. }));
    }

    #[tokio::test]
    async fn second_selection_is_a_no_op() {
        let mut session = started(&[2, 0, 1]).await;

        let first = session.select_option(2).unwrap();
        assert!(first.is_correct);
        assert_eq!(first.question_index, 0);
        assert!(session.select_option(1).is_none());
        assert_eq!(answers_len(&session), 1);
    }

    #[tokio::test]
    async fn out_of_range_option_is_ignored() {
        let mut session = started(&[0, 0, 0]).await;
        assert!(session.select_option(OPTION_COUNT).is_none());
        assert_eq!(answers_len(&session), 0);
    }

    #[tokio::test]
    async fn advance_before_answering_changes_nothing() {
        let mut session = started(&[0, 0, 0]).await;
        let before = session.state().clone();
        assert!(!session.advance());
        assert_eq!(session.state(), &before);
    }

    #[tokio::test]
    async fn answers_never_outrun_the_current_question() {
        let mut session = started(&[0, 1, 2, 3, 0]).await;
        let total = session.questions().len();

        while let SessionState::InProgress { current_index, .. } = session.state().clone() {
            assert!(answers_len(&session) <= current_index + 1);
            session.select_option(1);
            session.select_option(2);
            assert_eq!(answers_len(&session), current_index + 1);
            session.advance();
        }

        assert_eq!(answers_len(&session), total);
        assert!(!session.advance());
    }

    #[tokio::test]
    async fn rome_scenario_scores_two_of_three() {
        let mut provider = MockQuestionProvider::new();
        provider
            .expect_generate_questions()
            .withf(|topic, difficulty, count| {
                topic == "Rome" && *difficulty == Difficulty::Medium && *count == 3
            })
            .returning(|_, _, _| Ok(batch(&[0, 3, 1])));
        let settings = QuizSettings::new("Rome", Difficulty::Medium, 3).unwrap();
        let mut session = QuizSession::new();
        session.start(settings, &provider).await.unwrap();

        for choice in [0, 3, 2] {
            session.select_option(choice).unwrap();
            assert!(session.advance());
        }

        let summary = session.summary().unwrap();
        assert_eq!(summary.correct_count, 2);
        assert_eq!(summary.score_percent, 67);
        assert_eq!(summary.tier(), Tier::Scholar);
        assert!(matches!(session.state(), SessionState::Completed { answers } if answers.len() == 3));
    }

    #[tokio::test]
    async fn restart_replays_the_same_questions() {
        let mut session = started(&[1, 2, 3]).await;
        let original = session.questions().to_vec();
        assert!(!session.restart());

        for _ in 0..3 {
            session.select_option(0);
            session.advance();
        }
        assert!(session.restart());

        assert_eq!(session.questions(), original.as_slice());
        assert_eq!(
            session.state(),
            &SessionState::InProgress {
                current_index: 0,
                answers: vec![]
            }
        );
        assert_eq!(session.attempt(), 2);
    }

    #[tokio::test]
    async fn new_quiz_discards_everything() {
        let mut session = started(&[0, 0, 0]).await;
        assert!(!session.new_quiz());
        for _ in 0..3 {
            session.select_option(0);
            session.advance();
        }
        assert!(session.new_quiz());
        assert_eq!(session.state(), &SessionState::Setup { error: None });
        assert!(session.questions().is_empty());
        assert!(session.summary().is_none());
    }

    #[tokio::test]
    async fn stale_image_tickets_are_discarded() {
        let mut session = started(&[0, 0, 0]).await;
        let first = session.image_ticket().unwrap();
        assert_eq!(first.question_index, 0);
        assert_eq!(first.prompt, "An illustration for question 0");

        session.select_option(0);
        session.advance();
        assert!(!session.accepts_image(&first));
        assert!(!session.attach_image(&first, "stale".to_string()));
        assert_eq!(session.questions()[0].image, None);

        let second = session.image_ticket().unwrap();
        assert!(session.attach_image(&second, "file-1".to_string()));
        assert_eq!(session.current_question().unwrap().image.as_deref(), Some("file-1"));
    }

    #[tokio::test]
    async fn restart_invalidates_tickets_but_keeps_resolved_images() {
        let mut session = started(&[0, 0, 0]).await;
        let ticket = session.image_ticket().unwrap();
        assert!(session.attach_image(&ticket, "file-0".to_string()));
        for _ in 0..3 {
            session.select_option(0);
            session.advance();
        }
        assert!(session.image_ticket().is_none());
        session.restart();

        assert!(!session.accepts_image(&ticket));
        assert_eq!(session.current_question().unwrap().image.as_deref(), Some("file-0"));
    }
}
