pub mod ai_helper;
pub mod score;
pub mod session;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ProviderError, SettingsError};

pub const OPTION_COUNT: usize = 4;
pub const QUESTION_COUNT_MIN: usize = 3;
pub const QUESTION_COUNT_MAX: usize = 10;
pub const DEFAULT_QUESTION_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    /// How the level is described to the model.
    pub fn prompt_description(&self) -> &'static str {
        match self {
            Difficulty::Easy => "beginner (basic knowledge)",
            Difficulty::Medium => "intermediate (standard knowledge)",
            Difficulty::Hard => "advanced (expert knowledge)",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Difficulty {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(SettingsError::UnknownDifficulty(other.to_string())),
        }
    }
}

/// What the user asked for. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSettings {
    topic: String,
    difficulty: Difficulty,
    question_count: usize,
}

impl QuizSettings {
    pub fn new(
        topic: &str,
        difficulty: Difficulty,
        question_count: usize,
    ) -> Result<Self, SettingsError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(SettingsError::EmptyTopic);
        }
        if !(QUESTION_COUNT_MIN..=QUESTION_COUNT_MAX).contains(&question_count) {
            return Err(SettingsError::QuestionCountOutOfRange {
                count: question_count,
                min: QUESTION_COUNT_MIN,
                max: QUESTION_COUNT_MAX,
            });
        }
        Ok(Self {
            topic: topic.to_string(),
            difficulty,
            question_count,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn question_count(&self) -> usize {
        self.question_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
    pub image_prompt: String,
    /// Resolved lazily by whoever renders the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl QuizQuestion {
    pub fn is_correct(&self, option_index: usize) -> bool {
        option_index == self.correct_answer_index
    }

    pub fn correct_option(&self) -> &str {
        self.options
            .get(self.correct_answer_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn check_shape(&self) -> Result<(), String> {
        if self.question.trim().is_empty() {
            return Err("empty question text".to_string());
        }
        if self.options.len() != OPTION_COUNT {
            return Err(format!(
                "expected {} options, got {}",
                OPTION_COUNT,
                self.options.len()
            ));
        }
        let distinct: HashSet<&str> = self.options.iter().map(|o| o.trim()).collect();
        if distinct.len() != OPTION_COUNT {
            return Err("options are not distinct".to_string());
        }
        if self.correct_answer_index >= OPTION_COUNT {
            return Err(format!(
                "correct answer index {} is out of range",
                self.correct_answer_index
            ));
        }
        Ok(())
    }
}

/// Rejects a batch unless it has exactly `expected` well-formed questions.
pub fn validate_batch(questions: &[QuizQuestion], expected: usize) -> Result<(), ProviderError> {
    if questions.is_empty() {
        return Err(ProviderError::Empty);
    }
    if questions.len() != expected {
        return Err(ProviderError::WrongCount {
            expected,
            actual: questions.len(),
        });
    }
    for (index, question) in questions.iter().enumerate() {
        question
            .check_shape()
            .map_err(|reason| ProviderError::InvalidQuestion { index, reason })?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAnswer {
    pub question_index: usize,
    pub selected_option_index: usize,
    pub is_correct: bool,
}

/// Raw image bytes as returned by the image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
}

#[cfg(test)]
pub(crate) fn sample_question(n: usize, correct: usize) -> QuizQuestion {
    QuizQuestion {
        question: format!("Question {}?", n),
        options: (0..OPTION_COUNT)
            .map(|i| format!("Option {}-{}", n, i))
            .collect(),
        correct_answer_index: correct,
        explanation: format!("Because of reason {}.", n),
        image_prompt: format!("An illustration for question {}", n),
        image: None,
    }
}
