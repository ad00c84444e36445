use super::UserAnswer;

pub const MAX_STARS: u32 = 5;

/// Final tally of one attempt. Always recomputed from the answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSummary {
    pub correct_count: usize,
    pub total_questions: usize,
    pub score_percent: u32,
}

impl ResultSummary {
    /// `total_questions` must be at least 1.
    pub fn from_answers(answers: &[UserAnswer], total_questions: usize) -> Self {
        let correct_count = answers.iter().filter(|a| a.is_correct).count();
        Self {
            correct_count,
            total_questions,
            score_percent: round_percent(correct_count, total_questions),
        }
    }

    pub fn tier(&self) -> Tier {
        Tier::from_percent(self.score_percent)
    }

    /// One star per started 20 percent.
    pub fn stars(&self) -> u32 {
        ((self.score_percent + 19) / 20).min(MAX_STARS)
    }

    pub fn is_perfect(&self) -> bool {
        self.score_percent == 100
    }
}

// Integer round-half-up of 100 * correct / total.
fn round_percent(correct: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((200 * correct + total) / (2 * total)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Perfect,
    Master,
    Scholar,
    Apprentice,
}

impl Tier {
    pub fn from_percent(score_percent: u32) -> Self {
        if score_percent == 100 {
            Tier::Perfect
        } else if score_percent >= 80 {
            Tier::Master
        } else if score_percent >= 60 {
            Tier::Scholar
        } else {
            Tier::Apprentice
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            Tier::Perfect => "Legend",
            Tier::Master => "Master",
            Tier::Scholar => "Scholar",
            Tier::Apprentice => "Apprentice",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Tier::Perfect => "👑",
            Tier::Master => "🌟",
            Tier::Scholar => "✨",
            Tier::Apprentice => "🌱",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Tier::Perfect => "All-knowing legend!",
            Tier::Master => "Superhuman master!",
            Tier::Scholar => "Shining scholar!",
            Tier::Apprentice => "Bursting with potential!",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Tier::Perfect => "Incredible! You rule this subject.",
            Tier::Master => "Excellent! You covered almost everything.",
            Tier::Scholar => "Nice effort! Your knowledge is solid.",
            Tier::Apprentice => "Don't worry, you'll score higher next time!",
        }
    }

    pub fn sub_message(&self) -> &'static str {
        match self {
            Tier::Perfect => "Not a single mistake. This one goes into the history books.",
            Tier::Master => "One more step and you'd have reached perfection.",
            Tier::Scholar => "The basics are there. Dig a little deeper to climb higher.",
            Tier::Apprentice => "Failure is the mother of success. Give it another go!",
        }
    }
}
