use std::sync::Mutex;

use async_trait::async_trait;
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use shared::domain::Turn;

use crate::{AssistantResponder, APOLOGY_REPLY};

pub const CANNED_REPLIES: &[&str] = &[
    "I understand you're asking about this neurology case. Let me help you think through this systematically.",
    "Based on the symptoms you've described, what are the key clinical features you notice?",
    "Consider the anatomical location and potential differential diagnoses.",
    "What additional tests or examinations might be helpful here?",
    "Let's work through this step by step. What's your initial assessment?",
    "Think about the neuroanatomy involved here. What structures could be affected?",
    "What would be your next diagnostic step in this case?",
    "Consider both common and rare causes for these symptoms.",
];

/// Scripted assistant that answers with a random prompt from a fixed list.
pub struct CannedResponder {
    replies: Vec<String>,
    rng: Mutex<SmallRng>,
}

impl CannedResponder {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    pub fn with_replies(replies: Vec<String>, seed: u64) -> Self {
        Self {
            replies,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            replies: CANNED_REPLIES.iter().map(|reply| reply.to_string()).collect(),
            rng: Mutex::new(rng),
        }
    }
}

impl Default for CannedResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantResponder for CannedResponder {
    async fn respond(&self, _message: &str, _history: &[Turn]) -> String {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.replies
            .choose(&mut *rng)
            .cloned()
            .unwrap_or_else(|| APOLOGY_REPLY.to_string())
    }

    fn name(&self) -> &'static str {
        "canned"
    }
}
