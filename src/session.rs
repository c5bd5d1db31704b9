//! Turn-scoped state for one conversation.
//!
//! Everything here is reset when a call reaches a terminal state. The dedup
//! set survives disambiguation sub-turns so a chosen file is not injected a
//! second time when the corrected question is re-scanned.

use crate::mention::{self, DedupSet, PendingDisambiguation};

#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub id: String,
    pub created_at: String,
    /// Question as first submitted this turn, reported on failure.
    original_question: Option<String>,
    /// Question being resolved, corrected after each disambiguation answer.
    current_question: String,
    /// File blocks injected from disambiguation answers.
    injected: String,
    /// Editor selection attached as extra context.
    attachment: Option<String>,
    dedup: DedupSet,
    pending: Option<PendingDisambiguation>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            id: generate_session_id(),
            created_at: now_timestamp(),
            original_question: None,
            current_question: String::new(),
            injected: String::new(),
            attachment: None,
            dedup: DedupSet::default(),
            pending: None,
        }
    }

    /// Start a fresh top-level question. Abandons any pending choice.
    pub fn begin_question(&mut self, text: &str) {
        self.original_question = Some(text.to_string());
        self.current_question = text.to_string();
        self.injected.clear();
        self.dedup.clear();
        self.pending = None;
    }

    pub fn current_question(&self) -> &str {
        &self.current_question
    }

    /// The question the user originally asked this turn.
    pub fn original_question(&self) -> &str {
        self.original_question
            .as_deref()
            .unwrap_or(&self.current_question)
    }

    pub fn push_injected(&mut self, block: &str) {
        self.injected.push_str(block);
    }

    /// Replace the first `@{bare_name}` in the remembered question with the
    /// bare form, so the next scan moves past the answered mention.
    pub fn correct_question(&mut self, bare_name: &str) {
        let token = format!("@{}", bare_name);
        self.current_question =
            mention::replace_first_token(&self.current_question, &token, bare_name);
    }

    /// `"{stripped}\n\n{attachment}{injected}{resolved}"`.
    pub fn final_prompt(&self, stripped: &str, resolved: &str) -> String {
        let mut prompt = format!("{}\n\n", stripped);
        if let Some(attachment) = &self.attachment {
            prompt.push_str(attachment);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&self.injected);
        prompt.push_str(resolved);
        prompt
    }

    pub fn set_pending(&mut self, pending: PendingDisambiguation) {
        self.pending = Some(pending);
    }

    pub fn pending(&self) -> Option<&PendingDisambiguation> {
        self.pending.as_ref()
    }

    pub fn clear_pending(&mut self) -> Option<PendingDisambiguation> {
        self.pending.take()
    }

    pub fn attach(&mut self, text: &str) {
        self.attachment = Some(text.to_string());
    }

    pub fn detach(&mut self) -> bool {
        self.attachment.take().is_some()
    }

    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    pub fn dedup_mut(&mut self) -> &mut DedupSet {
        &mut self.dedup
    }

    /// Reset turn state after a call finished, however it finished.
    pub fn end_turn(&mut self) {
        self.original_question = None;
        self.current_question.clear();
        self.injected.clear();
        self.attachment = None;
        self.dedup.clear();
        self.pending = None;
    }
}

pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_string()
}

pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
