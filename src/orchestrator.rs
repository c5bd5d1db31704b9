//! Top-level sequencing for one conversation.
//!
//! A submission is echoed, routed through disambiguation if it answers a
//! pending choice, resolved for `@name.ext` mentions, and then handed to the
//! call engine. Only one submission is processed at a time; overlapping ones
//! are dropped.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::cancel::CancellationSignal;
use crate::engine::{CallOutcome, CallRequest, StreamingCallEngine};
use crate::error::ChatError;
use crate::history::{ConversationHistory, Turn, TurnOutcome};
use crate::index::{FileEvent, FileIndexHandle};
use crate::mention::{self, PendingDisambiguation};
use crate::session::ConversationSession;
use crate::sink::OutputSink;
use crate::types::{OutputEvent, OutputMode};
use crate::workspace::Workspace;

/// One message from the input surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub text: String,
    /// The text answers a pending disambiguation question.
    pub context_answer: bool,
    /// Bare name the UI believes the answer is for.
    pub file_hint: Option<String>,
}

impl Submission {
    pub fn question(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn answer(text: impl Into<String>, file_hint: Option<String>) -> Self {
        Self {
            text: text.into(),
            context_answer: true,
            file_hint,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Another submission was still in flight.
    Ignored,
    /// A numeric answer in `1..=range_max` is needed before calling.
    NeedsChoice { bare_name: String, range_max: usize },
    Finished(CallOutcome),
}

struct RespondingGuard<'a>(&'a AtomicBool);

impl Drop for RespondingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ChatOrchestrator {
    engine: StreamingCallEngine,
    workspace: Arc<dyn Workspace>,
    index: Arc<FileIndexHandle>,
    sink: Arc<dyn OutputSink>,
    cancel: CancellationSignal,
    responding: AtomicBool,
    backend: AtomicUsize,
    output: Mutex<OutputMode>,
    history: Mutex<ConversationHistory>,
    session: tokio::sync::Mutex<ConversationSession>,
}

impl ChatOrchestrator {
    pub fn new(
        engine: StreamingCallEngine,
        workspace: Arc<dyn Workspace>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            engine,
            workspace,
            index: Arc::new(FileIndexHandle::default()),
            sink,
            cancel: CancellationSignal::new(),
            responding: AtomicBool::new(false),
            backend: AtomicUsize::new(0),
            output: Mutex::new(OutputMode::Live),
            history: Mutex::new(ConversationHistory::default()),
            session: tokio::sync::Mutex::new(ConversationSession::new()),
        }
    }

    pub fn index(&self) -> &Arc<FileIndexHandle> {
        &self.index
    }

    pub async fn refresh_index(&self) -> Result<usize> {
        self.index.rebuild(self.workspace.as_ref()).await
    }

    pub async fn on_file_event(&self, event: FileEvent) -> Result<bool> {
        self.index.on_file_event(event, self.workspace.as_ref()).await
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.engine
            .backends()
            .iter()
            .map(|b| b.name.clone())
            .collect()
    }

    pub fn selected_backend(&self) -> usize {
        self.backend.load(Ordering::SeqCst)
    }

    /// Backend the next call starts from.
    pub fn select_backend(&self, index: usize) -> Result<(), ChatError> {
        let available = self.engine.backends().len();
        if index >= available {
            return Err(ChatError::InvalidBackend { index, available });
        }
        self.backend.store(index, Ordering::SeqCst);
        debug!(index, "selected backend");
        Ok(())
    }

    pub fn output_mode(&self) -> OutputMode {
        lock(&self.output).clone()
    }

    pub fn set_output_mode(&self, mode: OutputMode) {
        *lock(&self.output) = mode;
    }

    pub fn is_responding(&self) -> bool {
        self.responding.load(Ordering::SeqCst)
    }

    /// Stop the call in flight, if any.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_signal(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    pub fn history(&self) -> Vec<Turn> {
        lock(&self.history).turns().to_vec()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
    }

    /// Whether the transcript changed since it was last rendered in full.
    pub fn needs_rerender(&self) -> bool {
        lock(&self.history).needs_rerender()
    }

    /// Attach an editor selection as context for the next question.
    /// Whitespace-only selections are ignored.
    pub async fn attach_selection(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.session.lock().await.attach(text);
        self.sink
            .publish(OutputEvent::Content(format!("```\n{}\n```", text)));
        true
    }

    pub async fn remove_attachment(&self) -> bool {
        let removed = self.session.lock().await.detach();
        if removed {
            self.sink.publish(OutputEvent::Content(String::new()));
        }
        removed
    }

    pub async fn submit(&self, submission: Submission) -> SubmitOutcome {
        if self.responding.swap(true, Ordering::SeqCst) {
            debug!("submission ignored while responding");
            return SubmitOutcome::Ignored;
        }
        let _guard = RespondingGuard(&self.responding);
        self.cancel.reset();

        let output = self.output_mode();
        self.sink
            .publish(OutputEvent::Question(submission.text.clone()));

        let mut session = self.session.lock().await;

        let answering = submission.context_answer && session.pending().is_some();
        if answering {
            if let Some(outcome) = self.apply_choice(&mut session, &submission).await {
                return outcome;
            }
        } else {
            if submission.context_answer {
                debug!("context answer with no pending choice, treating as a question");
            }
            session.begin_question(&submission.text);
            if let OutputMode::File { name } = &output {
                let header = format!("## {}\n\n", submission.text);
                if let Err(e) = self.sink.write_append(name, &header).await {
                    warn!(file = %name, error = %format!("{:#}", e), "failed to append question header");
                }
            }
        }

        let question = session.current_question().to_string();
        let index = self.index.snapshot();
        let resolution = mention::resolve(
            mention::find_mentions(&question),
            &index,
            session.dedup_mut(),
            self.workspace.as_ref(),
        )
        .await;

        for unreadable in &resolution.unreadable {
            self.sink.publish(OutputEvent::Warning(format!(
                "@{} was not attached: {}",
                unreadable.bare_name, unreadable.error
            )));
        }

        if let Some(ambiguity) = resolution.ambiguity {
            // Files injected before the ambiguous mention stay for this turn.
            session.push_injected(&resolution.injected_text);
            let pending = PendingDisambiguation::new(ambiguity);
            let outcome = SubmitOutcome::NeedsChoice {
                bare_name: pending.bare_name.clone(),
                range_max: pending.candidate_count(),
            };
            self.publish_selection(&pending);
            session.set_pending(pending);
            return outcome;
        }

        let stripped = mention::strip_fulfilled(&question, &resolution.fulfilled);
        let prompt = session.final_prompt(&stripped, &resolution.injected_text);
        let original = session.original_question().to_string();

        self.sink.publish(OutputEvent::Loading);
        self.sink.publish(OutputEvent::Content(String::new()));

        let request = CallRequest {
            prompt: &prompt,
            question: &original,
            start_index: self.selected_backend(),
            output: &output,
        };
        let outcome = self.engine.call(request, self.sink.as_ref(), &self.cancel).await;

        let turn = match &outcome {
            CallOutcome::Completed { answer, .. } => {
                Turn::new(&original, answer, TurnOutcome::Completed)
            }
            CallOutcome::Cancelled { partial, .. } => {
                Turn::new(&original, partial, TurnOutcome::Cancelled)
            }
            CallOutcome::Exhausted { error } => {
                Turn::new(&original, error.to_string(), TurnOutcome::Failed)
            }
        };
        info!(outcome = ?turn.outcome, attempts = outcome.attempts(), "turn finished");
        lock(&self.history).push(turn);
        session.end_turn();

        SubmitOutcome::Finished(outcome)
    }

    /// Apply a numeric answer to the pending choice. Returns an outcome when
    /// the answer is rejected and the choice stays pending.
    async fn apply_choice(
        &self,
        session: &mut ConversationSession,
        submission: &Submission,
    ) -> Option<SubmitOutcome> {
        let pending = session.pending()?.clone();

        if let Some(hint) = &submission.file_hint {
            if hint != &pending.bare_name {
                warn!(hint = %hint, pending = %pending.bare_name, "answer hint does not match pending choice");
            }
        }

        let chosen = match pending.choose(&submission.text) {
            Ok(chosen) => chosen,
            Err(e) => {
                warn!(error = %e, "invalid disambiguation answer");
                self.publish_selection(&pending);
                return Some(SubmitOutcome::NeedsChoice {
                    bare_name: pending.bare_name.clone(),
                    range_max: pending.candidate_count(),
                });
            }
        };

        if !session.dedup_mut().contains(&chosen.location) {
            match self.workspace.read_file(&chosen.location).await {
                Ok(content) => {
                    session.push_injected(&mention::file_block(&chosen.bare_name, &content));
                    session.dedup_mut().insert(&chosen.location);
                }
                Err(e) => {
                    let error = ChatError::FileRead {
                        location: chosen.location.clone(),
                        message: format!("{:#}", e),
                    };
                    warn!(error = %error, "skipping unreadable choice");
                    self.sink.publish(OutputEvent::Warning(format!(
                        "@{} was not attached: {}",
                        chosen.bare_name, error
                    )));
                }
            }
        }

        session.correct_question(&pending.bare_name);
        session.clear_pending();
        None
    }

    fn publish_selection(&self, pending: &PendingDisambiguation) {
        self.sink.publish(OutputEvent::Selection {
            question: pending.prompt.clone(),
            bare_name: pending.bare_name.clone(),
            range_max: pending.candidate_count(),
        });
    }
}
