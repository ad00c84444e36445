//! Turns session snapshots into chat messages and chat replies into intents.

use teloxide::types::{KeyboardButton, KeyboardMarkup};
use teloxide::utils::html::escape;

use crate::quiz::score::{ResultSummary, MAX_STARS};
use crate::quiz::session::Snapshot;
use crate::quiz::{
    Difficulty, QuizQuestion, UserAnswer, DEFAULT_QUESTION_COUNT, OPTION_COUNT,
    QUESTION_COUNT_MAX, QUESTION_COUNT_MIN,
};

pub const NEXT_QUESTION: &str = "Next question ➡️";
pub const SEE_RESULTS: &str = "See results 🏁";
pub const TRY_AGAIN: &str = "Try again 🔁";
pub const NEW_QUIZ: &str = "New quiz ✨";

pub const GREETING: &str = "Hi! I'm AI Spark Quiz. Pick any topic and I'll build a multiple-choice quiz about it.";
pub const ASK_TOPIC: &str = "What topic should the quiz be about? (e.g. Ancient Egypt, modern programming, Pokémon...)";
pub const ASK_DIFFICULTY: &str = "Choose a difficulty";
pub const ASK_OPTION: &str = "Please pick one of the options.";
pub const IMAGE_PLACEHOLDER: &str = "🖼️ Couldn't generate an image for this question.";
pub const ASK_CONTINUE: &str = "Tap the button below to continue.";
pub const ASK_RESULT_ACTION: &str = "Try the same questions again or build a new quiz?";
pub const CANCELLED: &str = "Quiz cancelled. Send /start whenever you want a new one.";

const OPTION_LETTERS: [char; OPTION_COUNT] = ['A', 'B', 'C', 'D'];

pub fn ask_count() -> String {
    format!(
        "How many questions? ({}-{}, {} is a good start)",
        QUESTION_COUNT_MIN, QUESTION_COUNT_MAX, DEFAULT_QUESTION_COUNT
    )
}

pub fn generating(topic: &str) -> String {
    format!(
        "🧠 The AI is studying \"{}\"... Building the questions and image prompts.",
        topic
    )
}

pub fn difficulty_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![Difficulty::ALL
        .iter()
        .map(|d| KeyboardButton::new(d.label()))
        .collect::<Vec<_>>()])
    .resize_keyboard(true)
}

pub fn count_keyboard() -> KeyboardMarkup {
    let buttons = (QUESTION_COUNT_MIN..=QUESTION_COUNT_MAX)
        .map(|n| KeyboardButton::new(n.to_string()))
        .collect::<Vec<_>>();
    KeyboardMarkup::new(buttons.chunks(4).map(|row| row.to_vec()).collect::<Vec<_>>())
        .resize_keyboard(true)
}

pub fn options_keyboard(question: &QuizQuestion) -> KeyboardMarkup {
    KeyboardMarkup::new(
        question
            .options
            .iter()
            .map(|o| vec![KeyboardButton::new(o.clone())])
            .collect::<Vec<_>>(),
    )
    .resize_keyboard(true)
}

pub fn advance_keyboard(is_last: bool) -> KeyboardMarkup {
    let label = if is_last { SEE_RESULTS } else { NEXT_QUESTION };
    KeyboardMarkup::new(vec![vec![KeyboardButton::new(label)]]).resize_keyboard(true)
}

pub fn result_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(TRY_AGAIN),
        KeyboardButton::new(NEW_QUIZ),
    ]])
    .resize_keyboard(true)
}

fn progress_bar(index: usize, total: usize) -> String {
    let done = index + 1;
    format!(
        "{}{} {}/{}",
        "▰".repeat(done),
        "▱".repeat(total.saturating_sub(done)),
        done,
        total
    )
}

pub fn question_text(index: usize, total: usize, question: &QuizQuestion) -> String {
    let options = question
        .options
        .iter()
        .zip(OPTION_LETTERS)
        .map(|(option, letter)| format!("{}. {}", letter, escape(option)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "{}\n\n<b>{}</b>\n\n{}",
        progress_bar(index, total),
        escape(&question.question),
        options
    )
}

pub fn feedback_text(question: &QuizQuestion, answer: &UserAnswer) -> String {
    let verdict = if answer.is_correct {
        "✅ Correct!".to_string()
    } else {
        format!(
            "❌ Not quite. The answer is <b>{}</b>.",
            escape(question.correct_option())
        )
    };
    format!(
        "{}\n\n<b>Explanation</b>\n{}",
        verdict,
        escape(&question.explanation)
    )
}

pub fn result_text(summary: &ResultSummary) -> String {
    let tier = summary.tier();
    let stars = summary.stars();
    let mut text = format!(
        "<b>Quiz result: {}%</b>\n\n{} <b>{}</b>\n{} / {} correct\n\n{}\n<i>{}</i>\n\nTitle: {} {}\nRating: {}{}",
        summary.score_percent,
        tier.emoji(),
        tier.title(),
        summary.correct_count,
        summary.total_questions,
        tier.message(),
        tier.sub_message(),
        tier.emoji(),
        tier.badge(),
        "★".repeat(stars as usize),
        "☆".repeat((MAX_STARS - stars) as usize),
    );
    if summary.is_perfect() {
        text.push_str("\n\n🎉 PERFECT SCORE CELEBRATION! 🎉");
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Select(usize),
    Advance,
    Restart,
    NewQuiz,
    Unrecognised,
}

/// Maps a chat reply to what the user meant in the current frame.
pub fn read_intent(snapshot: &Snapshot<'_>, reply: &str) -> Intent {
    let reply = reply.trim();
    match snapshot {
        Snapshot::Question {
            question,
            answer: None,
            ..
        } => parse_option(reply, question)
            .map(Intent::Select)
            .unwrap_or(Intent::Unrecognised),
        Snapshot::Question {
            answer: Some(_), ..
        } if reply == NEXT_QUESTION || reply == SEE_RESULTS => Intent::Advance,
        Snapshot::Finished { .. } if reply == TRY_AGAIN => Intent::Restart,
        Snapshot::Finished { .. } if reply == NEW_QUIZ => Intent::NewQuiz,
        _ => Intent::Unrecognised,
    }
}

/// Accepts the option text itself, its number (1-4) or its letter (A-D).
pub fn parse_option(reply: &str, question: &QuizQuestion) -> Option<usize> {
    let reply = reply.trim();
    if let Some(index) = question.options.iter().position(|o| o.trim() == reply) {
        return Some(index);
    }

    let mut chars = reply.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return None;
    };
    if let Some(digit) = c.to_digit(10) {
        let digit = digit as usize;
        return (1..=OPTION_COUNT).contains(&digit).then(|| digit - 1);
    }
    OPTION_LETTERS
        .iter()
        .position(|letter| *letter == c.to_ascii_uppercase())
}
