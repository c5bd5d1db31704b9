//! Question/answer transcript for one conversation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// One finished exchange. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    /// Reply with latency footer, the error message, or the partial text
    /// streamed before cancellation.
    pub answer: String,
    pub outcome: TurnOutcome,
    pub asked_at: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>, outcome: TurnOutcome) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            outcome,
            asked_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    /// Turn count at the last full transcript render.
    rendered: usize,
}

impl ConversationHistory {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Whether the transcript changed since it was last rendered in full.
    /// Marks the current count as rendered.
    pub fn needs_rerender(&mut self) -> bool {
        if self.rendered == self.turns.len() {
            return false;
        }
        self.rendered = self.turns.len();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_clear() {
        let mut history = ConversationHistory::default();
        assert!(history.is_empty());
        history.push(Turn::new("q", "a", TurnOutcome::Completed));
        assert_eq!(history.len(), 1);
        assert_eq!(history.turns()[0].question, "q");
        history.clear();
        assert!(history.is_empty());
    }

    #[test]
    fn test_needs_rerender_tracks_turn_count() {
        let mut history = ConversationHistory::default();
        assert!(!history.needs_rerender());

        history.push(Turn::new("q1", "a1", TurnOutcome::Completed));
        assert!(history.needs_rerender());
        assert!(!history.needs_rerender());

        history.clear();
        assert!(history.needs_rerender());
    }

    #[test]
    fn test_outcome_serializes_lowercase() {
        let turn = Turn::new("q", "", TurnOutcome::Cancelled);
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"cancelled\""));
    }
}
