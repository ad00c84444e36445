use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chatgpt::client::ChatGPT;
use chatgpt::types::CompletionResponse;
use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;

use super::{Difficulty, GeneratedImage, QuizQuestion, OPTION_COUNT};
use crate::config::Config;
use crate::error::ProviderError;

const IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";
// Closest supported size to 16:9.
const IMAGE_SIZE: &str = "1792x1024";
const IMAGE_STYLE: &str =
    "Professional educational illustration, vibrant digital art, clean composition";

/// Source of generated quiz content.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    async fn generate_questions(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, ProviderError>;

    /// A failed image is just a missing one.
    async fn generate_image(&self, prompt: &str) -> Option<GeneratedImage>;
}

pub struct QuizHelper {
    chat_gpt: ChatGPT,
    http: Client,
    api_key: String,
    image_model: String,
    language: String,
    images_enabled: bool,
}

impl QuizHelper {
    pub fn new(config: &Config) -> Result<Self, ProviderError> {
        let chat_gpt = {
            let mut gpt = ChatGPT::new(config.api_key.as_str())?;

            gpt.config.engine = config.text_engine();
            gpt.config.timeout = config.request_timeout;

            gpt
        };
        let http = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            chat_gpt,
            http,
            api_key: config.api_key.clone(),
            image_model: config.image_model.clone(),
            language: config.language.clone(),
            images_enabled: config.images_enabled,
        })
    }

    async fn request_image(&self, prompt: &str) -> Result<GeneratedImage, ProviderError> {
        let body = serde_json::json!({
            "model": self.image_model,
            "prompt": format!("{}: {}", IMAGE_STYLE, prompt),
            "n": 1,
            "size": IMAGE_SIZE,
            "response_format": "b64_json",
        });

        let response: Value = self
            .http
            .post(IMAGES_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        decode_image_response(&response)
    }
}

#[async_trait]
impl QuestionProvider for QuizHelper {
    async fn generate_questions(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
    ) -> Result<Vec<QuizQuestion>, ProviderError> {
        let prompt = questions_prompt(topic, difficulty, count, &self.language);
        debug!("Requesting {} questions about {:?}", count, topic);

        let response: CompletionResponse = self.chat_gpt.send_message(prompt).await?;
        let content = response.message().clone().content;
        debug!("Completion: {:?}", content);

        let mut questions = parse_questions(&content)?;
        questions.truncate(count);
        {
            let mut rng = rand::thread_rng();
            for question in questions.iter_mut() {
                shuffle_options(question, &mut rng);
            }
        }
        Ok(questions)
    }

    async fn generate_image(&self, prompt: &str) -> Option<GeneratedImage> {
        if !self.images_enabled {
            return None;
        }
        match self.request_image(prompt).await {
            Ok(image) => Some(image),
            Err(err) => {
                warn!("Image generation failed: {}", err);
                None
            }
        }
    }
}

fn questions_prompt(topic: &str, difficulty: Difficulty, count: usize, language: &str) -> String {
    format!(
        "Create {count} multiple-choice quiz questions about \"{topic}\".
        The difficulty is {level}.

        Rules:
        1. Write the question, the options and the explanation in {language}.
        2. Every question has exactly {options} distinct options and exactly one correct option.
        3. Every question has an imagePrompt: a detailed English prompt for an image model that illustrates the question without giving the answer away.

        Reply with JSON only, no prose, in this shape:
        {{\"questions\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \"correctAnswerIndex\": 0, \"explanation\": \"...\", \"imagePrompt\": \"...\"}}]}}",
        count = count,
        topic = topic,
        level = difficulty.prompt_description(),
        language = language,
        options = OPTION_COUNT,
    )
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum QuestionBatch {
    Wrapped { questions: Vec<QuizQuestion> },
    Bare(Vec<QuizQuestion>),
}

impl QuestionBatch {
    fn into_questions(self) -> Vec<QuizQuestion> {
        match self {
            QuestionBatch::Wrapped { questions } => questions,
            QuestionBatch::Bare(questions) => questions,
        }
    }
}

/// Pulls the question list out of a completion, tolerating code fences and
/// prose on either side of the JSON.
///
/// Every `{` or `[` is tried as the start of the batch, and the first one that
/// yields questions wins. Text after the batch is never looked at.
fn parse_questions(content: &str) -> Result<Vec<QuizQuestion>, ProviderError> {
    let mut first_error = None;
    let mut empty_batch = false;

    for (start, _) in content
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
    {
        let mut stream =
            serde_json::Deserializer::from_str(&content[start..]).into_iter::<QuestionBatch>();
        match stream.next() {
            Some(Ok(batch)) => {
                let questions = batch.into_questions();
                if !questions.is_empty() {
                    return Ok(questions);
                }
                empty_batch = true;
            }
            Some(Err(err)) => {
                first_error.get_or_insert(err);
            }
            None => {}
        }
    }

    if empty_batch {
        return Ok(Vec::new());
    }
    match first_error {
        Some(err) => Err(err.into()),
        None => {
            let batch: QuestionBatch = serde_json::from_str(content.trim())?;
            Ok(batch.into_questions())
        }
    }
}

// Models like to put the right answer first, so the options are reordered
// and the index follows the correct text.
fn shuffle_options<R: Rng + ?Sized>(question: &mut QuizQuestion, rng: &mut R) {
    let Some(correct) = question.options.get(question.correct_answer_index).cloned() else {
        return;
    };
    question.options.shuffle(rng);
    if let Some(position) = question.options.iter().position(|o| *o == correct) {
        question.correct_answer_index = position;
    }
}

fn decode_image_response(response: &Value) -> Result<GeneratedImage, ProviderError> {
    let encoded = response["data"][0]["b64_json"]
        .as_str()
        .ok_or(ProviderError::MissingImage)?;
    Ok(GeneratedImage {
        bytes: BASE64.decode(encoded)?,
    })
}
