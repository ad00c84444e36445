#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("the topic must not be empty")]
    EmptyTopic,

    #[error("a quiz has between {min} and {max} questions, got {count}")]
    QuestionCountOutOfRange { count: usize, min: usize, max: usize },

    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
}

/// Everything that can go wrong while talking to the AI service.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("ChatGPT error: {0}")]
    ChatGpt(#[from] chatgpt::err::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("the provider returned no questions")]
    Empty,

    #[error("expected {expected} questions, got {actual}")]
    WrongCount { expected: usize, actual: usize },

    #[error("question {index} is invalid: {reason}")]
    InvalidQuestion { index: usize, reason: String },

    #[error("the image response carried no image data")]
    MissingImage,
}
