use async_trait::async_trait;
use shared::domain::Turn;

mod canned;
mod remote;

pub use canned::{CannedResponder, CANNED_REPLIES};
pub use remote::{AssistantError, RemoteModelConfig, RemoteModelResponder};

/// Shown to the participant whenever a reply could not be produced.
pub const APOLOGY_REPLY: &str =
    "Sorry, I couldn't come up with a response just now. Please try asking again.";

/// Produces the assistant's side of a case conversation.
///
/// Implementations never fail outward: any internal error turns into
/// [`APOLOGY_REPLY`] so the conversation can always be extended.
#[async_trait]
pub trait AssistantResponder: Send + Sync {
    async fn respond(&self, message: &str, history: &[Turn]) -> String;

    fn name(&self) -> &'static str;
}
