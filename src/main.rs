mod config;
mod error;
mod quiz;
mod render;

use std::sync::Arc;

use dotenv::dotenv;
use log::{debug, info, warn};
use quiz::ai_helper::{QuestionProvider, QuizHelper};
use quiz::session::{ImageTicket, QuizSession, SessionState, Snapshot, GENERATION_FAILED};
use quiz::{Difficulty, QuizSettings};
use render::Intent;
use teloxide::{
    dispatching::{dialogue::InMemStorage, UpdateHandler},
    prelude::*,
    types::{ChatAction, InputFile, KeyboardRemove, ParseMode},
    utils::command::BotCommands,
};

use crate::config::Config;

type QuizDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type HandlerResult = Result<(), HandlerError>;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveTopic,
    ReceiveDifficulty {
        topic: String,
    },
    ReceiveQuestionCount {
        topic: String,
        difficulty: Difficulty,
    },
    Playing {
        session: QuizSession,
    },
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "show this text.")]
    Help,
    #[command(description = "build a new quiz.")]
    Start,
    #[command(description = "abandon the current quiz.")]
    Cancel,
}

#[tokio::main]
async fn main() -> Result<(), HandlerError> {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting AI Spark Quiz bot...");

    let config = Config::from_env()?;
    let provider: Arc<dyn QuestionProvider> = Arc::new(QuizHelper::new(&config)?);
    info!(
        "Using text model {}, image model {} (images {})",
        config.text_model,
        config.image_model,
        if config.images_enabled { "on" } else { "off" }
    );

    let bot = Bot::from_env();
    if let Err(err) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {}", err);
    }

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![InMemStorage::<State>::new(), provider])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

fn schema() -> UpdateHandler<HandlerError> {
    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(dptree::case![Command::Help].endpoint(help))
        .branch(dptree::case![Command::Start].endpoint(start))
        .branch(dptree::case![Command::Cancel].endpoint(cancel));

    Update::filter_message()
        .enter_dialogue::<Message, InMemStorage<State>, State>()
        .branch(command_handler)
        .branch(dptree::case![State::Start].endpoint(start))
        .branch(dptree::case![State::ReceiveTopic].endpoint(receive_topic))
        .branch(dptree::case![State::ReceiveDifficulty { topic }].endpoint(receive_difficulty))
        .branch(
            dptree::case![State::ReceiveQuestionCount { topic, difficulty }]
                .endpoint(receive_question_count),
        )
        .branch(dptree::case![State::Playing { session }].endpoint(playing))
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

async fn start(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, render::GREETING).await?;
    ask_topic(&bot, &dialogue, msg.chat.id).await
}

async fn cancel(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, render::CANCELLED)
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.exit().await?;
    Ok(())
}

async fn ask_topic(bot: &Bot, dialogue: &QuizDialogue, chat_id: ChatId) -> HandlerResult {
    bot.send_message(chat_id, render::ASK_TOPIC)
        .reply_markup(KeyboardRemove::new())
        .await?;
    dialogue.update(State::ReceiveTopic).await?;
    Ok(())
}

async fn receive_topic(bot: Bot, dialogue: QuizDialogue, msg: Message) -> HandlerResult {
    match msg.text().map(str::trim) {
        Some(topic) if !topic.is_empty() => {
            bot.send_message(msg.chat.id, render::ASK_DIFFICULTY)
                .reply_markup(render::difficulty_keyboard())
                .await?;
            dialogue
                .update(State::ReceiveDifficulty {
                    topic: topic.to_string(),
                })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please send the topic as text.")
                .await?;
        }
    }
    Ok(())
}

async fn receive_difficulty(
    bot: Bot,
    dialogue: QuizDialogue,
    topic: String,
    msg: Message,
) -> HandlerResult {
    match msg.text().map(|text| text.parse::<Difficulty>()) {
        Some(Ok(difficulty)) => {
            bot.send_message(msg.chat.id, render::ask_count())
                .reply_markup(render::count_keyboard())
                .await?;
            dialogue
                .update(State::ReceiveQuestionCount { topic, difficulty })
                .await?;
        }
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the difficulties.")
                .reply_markup(render::difficulty_keyboard())
                .await?;
        }
    }
    Ok(())
}

async fn receive_question_count(
    bot: Bot,
    dialogue: QuizDialogue,
    (topic, difficulty): (String, Difficulty),
    msg: Message,
    provider: Arc<dyn QuestionProvider>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    let Some(Ok(count)) = msg.text().map(|text| text.trim().parse::<usize>()) else {
        bot.send_message(chat_id, "Please send a number.")
            .reply_markup(render::count_keyboard())
            .await?;
        return Ok(());
    };
    let settings = match QuizSettings::new(&topic, difficulty, count) {
        Ok(settings) => settings,
        Err(err) => {
            bot.send_message(chat_id, format!("Sorry, {}.", err))
                .reply_markup(render::count_keyboard())
                .await?;
            return Ok(());
        }
    };

    bot.send_message(chat_id, render::generating(settings.topic()))
        .reply_markup(KeyboardRemove::new())
        .await?;
    if let Err(err) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!("Failed to send typing action: {}", err);
    }

    let mut session = QuizSession::new();
    match session.start(settings, provider.as_ref()).await {
        Ok(()) => {
            let pending = show_question(&bot, chat_id, &session).await?;
            dialogue.update(State::Playing { session }).await?;
            if let Some(ticket) = pending {
                spawn_image(bot, dialogue, provider, chat_id, ticket);
            }
        }
        Err(_) => {
            let error = session.error().unwrap_or(GENERATION_FAILED).to_string();
            bot.send_message(chat_id, format!("⚠️ {}", error)).await?;
            ask_topic(&bot, &dialogue, chat_id).await?;
        }
    }
    Ok(())
}

async fn playing(
    bot: Bot,
    dialogue: QuizDialogue,
    mut session: QuizSession,
    msg: Message,
    provider: Arc<dyn QuestionProvider>,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    if matches!(
        session.state(),
        SessionState::Setup { .. } | SessionState::Generating
    ) {
        return ask_topic(&bot, &dialogue, chat_id).await;
    }

    let intent = render::read_intent(&session.snapshot(), msg.text().unwrap_or_default());
    let mut pending = None;
    match intent {
        Intent::Select(option) => {
            if let Some(answer) = session.select_option(option) {
                let question = &session.questions()[answer.question_index];
                let is_last = answer.question_index + 1 == session.questions().len();
                bot.send_message(chat_id, render::feedback_text(question, &answer))
                    .parse_mode(ParseMode::Html)
                    .reply_markup(render::advance_keyboard(is_last))
                    .await?;
            }
        }
        Intent::Advance => {
            if session.advance() {
                match session.summary() {
                    Some(summary) => {
                        bot.send_message(chat_id, render::result_text(&summary))
                            .parse_mode(ParseMode::Html)
                            .reply_markup(render::result_keyboard())
                            .await?;
                    }
                    None => pending = show_question(&bot, chat_id, &session).await?,
                }
            }
        }
        Intent::Restart => {
            if session.restart() {
                pending = show_question(&bot, chat_id, &session).await?;
            }
        }
        Intent::NewQuiz => {
            if session.new_quiz() {
                return ask_topic(&bot, &dialogue, chat_id).await;
            }
        }
        Intent::Unrecognised => reprompt(&bot, chat_id, &session).await?,
    }

    dialogue.update(State::Playing { session }).await?;
    if let Some(ticket) = pending {
        spawn_image(bot, dialogue, provider, chat_id, ticket);
    }
    Ok(())
}

async fn reprompt(bot: &Bot, chat_id: ChatId, session: &QuizSession) -> HandlerResult {
    match session.snapshot() {
        Snapshot::Question {
            question,
            answer: None,
            ..
        } => {
            bot.send_message(chat_id, render::ASK_OPTION)
                .reply_markup(render::options_keyboard(question))
                .await?;
        }
        Snapshot::Question {
            index,
            total,
            answer: Some(_),
            ..
        } => {
            bot.send_message(chat_id, render::ASK_CONTINUE)
                .reply_markup(render::advance_keyboard(index + 1 == total))
                .await?;
        }
        Snapshot::Finished { .. } => {
            bot.send_message(chat_id, render::ASK_RESULT_ACTION)
                .reply_markup(render::result_keyboard())
                .await?;
        }
        Snapshot::Setup { .. } | Snapshot::Generating => {}
    }
    Ok(())
}

/// Sends the current question, then its picture when one was uploaded before.
///
/// Returns the ticket of a picture that still has to be generated. The caller
/// stores the session first and then hands the ticket to [`spawn_image`].
async fn show_question(
    bot: &Bot,
    chat_id: ChatId,
    session: &QuizSession,
) -> Result<Option<ImageTicket>, HandlerError> {
    let Snapshot::Question {
        index,
        total,
        question,
        ..
    } = session.snapshot()
    else {
        return Ok(None);
    };
    debug!("Showing question {} of attempt {}", index, session.attempt());
    bot.send_message(chat_id, render::question_text(index, total, question))
        .parse_mode(ParseMode::Html)
        .reply_markup(render::options_keyboard(question))
        .await?;

    if let Some(file_id) = question.image.clone() {
        if let Err(err) = bot.send_photo(chat_id, InputFile::file_id(file_id)).await {
            warn!("Failed to resend image: {}", err);
            bot.send_message(chat_id, render::IMAGE_PLACEHOLDER).await?;
        }
        return Ok(None);
    }
    Ok(session.image_ticket())
}

/// Generates the picture for `ticket` without holding up the quiz.
fn spawn_image(
    bot: Bot,
    dialogue: QuizDialogue,
    provider: Arc<dyn QuestionProvider>,
    chat_id: ChatId,
    ticket: ImageTicket,
) {
    tokio::spawn(async move {
        let delivered = deliver_image(&bot, &dialogue, provider.as_ref(), chat_id, &ticket).await;
        if let Err(err) = delivered {
            warn!("Failed to deliver image: {}", err);
        }
    });
}

async fn deliver_image(
    bot: &Bot,
    dialogue: &QuizDialogue,
    provider: &dyn QuestionProvider,
    chat_id: ChatId,
    ticket: &ImageTicket,
) -> HandlerResult {
    if let Err(err) = bot.send_chat_action(chat_id, ChatAction::UploadPhoto).await {
        debug!("Failed to send upload action: {}", err);
    }
    let image = provider.generate_image(&ticket.prompt).await;

    // The user may have moved on while the image was being generated.
    if !image_still_wanted(&dialogue.get().await?, ticket) {
        debug!(
            "Dropping image for question {} of attempt {}",
            ticket.question_index, ticket.attempt
        );
        return Ok(());
    }

    let Some(image) = image else {
        bot.send_message(chat_id, render::IMAGE_PLACEHOLDER).await?;
        return Ok(());
    };
    let sent = match bot.send_photo(chat_id, InputFile::memory(image.bytes)).await {
        Ok(sent) => sent,
        Err(err) => {
            warn!("Failed to send image: {}", err);
            bot.send_message(chat_id, render::IMAGE_PLACEHOLDER).await?;
            return Ok(());
        }
    };
    let Some(file_id) = sent
        .photo()
        .and_then(|sizes| sizes.last())
        .map(|photo| photo.file.id.clone())
    else {
        return Ok(());
    };

    if let Some(State::Playing { mut session }) = dialogue.get().await? {
        if session.attach_image(ticket, file_id) {
            dialogue.update(State::Playing { session }).await?;
        }
    }
    Ok(())
}

fn image_still_wanted(state: &Option<State>, ticket: &ImageTicket) -> bool {
    match state {
        Some(State::Playing { session }) => session.accepts_image(ticket),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::ai_helper::MockQuestionProvider;
    use crate::quiz::sample_question;

    async fn playing_session() -> QuizSession {
        let mut provider = MockQuestionProvider::new();
        provider
            .expect_generate_questions()
            .returning(|_, _, _| Ok((0..3).map(|n| sample_question(n, 0)).collect()));
        let settings = QuizSettings::new("Rome", Difficulty::Easy, 3).unwrap();
        let mut session = QuizSession::new();
        session.start(settings, &provider).await.unwrap();
        session
    }

    #[tokio::test]
    async fn question_is_playable_while_its_image_is_pending() {
        let mut session = playing_session().await;
        let ticket = session.image_ticket().unwrap();

        session.select_option(0).unwrap();
        assert!(image_still_wanted(
            &Some(State::Playing {
                session: session.clone()
            }),
            &ticket
        ));

        session.advance();
        let state = Some(State::Playing { session });
        assert!(!image_still_wanted(&state, &ticket));
    }

    #[tokio::test]
    async fn image_is_dropped_once_the_quiz_is_left() {
        let session = playing_session().await;
        let ticket = session.image_ticket().unwrap();

        assert!(!image_still_wanted(&None, &ticket));
        assert!(!image_still_wanted(&Some(State::ReceiveTopic), &ticket));
    }

    #[tokio::test]
    async fn image_from_a_previous_attempt_is_dropped() {
        let mut session = playing_session().await;
        let ticket = session.image_ticket().unwrap();
        for _ in 0..3 {
            session.select_option(0);
            session.advance();
        }
        session.restart();

        let state = Some(State::Playing { session });
        assert!(!image_still_wanted(&state, &ticket));
    }
}
