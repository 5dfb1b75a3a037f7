//! Core chat session management.
//!
//! This module provides [`ChatSessionController`], which owns the message log
//! and the request lifecycle.  Views read snapshots and issue commands; they
//! never mutate session state themselves.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::to_writer_pretty;
use tokio::sync::watch;

use crate::ChatClient;
use crate::client::ChatEndpoint;
use crate::error::{Error, Result};
use crate::observability::{
    SESSION_FAILURES, SESSION_REJECTED, SESSION_REPLIES, SESSION_RESETS, SESSION_STALE_RESPONSES,
    SESSION_SUBMITS,
};
use crate::types::{Message, Sender};

/// The controller's single source of truth, and the snapshot handed to views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Committed messages in chronological order.
    pub log: Vec<Message>,
    /// True while a request is in flight.
    pub pending: bool,
    /// Input text that has not been submitted yet.
    pub draft: String,
}

/// The mutation that produced a snapshot.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The draft was replaced.
    DraftUpdated,
    /// A user message was appended, the draft cleared, and a request started.
    Submitted,
    /// A reply was appended and the request finished.
    Replied,
    /// The error marker was appended and the request finished.
    Failed {
        /// Why the request failed.
        error: Error,
    },
    /// The log and draft were cleared and any in-flight request abandoned.
    Reset,
}

/// Why a submission was ignored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The text was empty or whitespace.
    Blank,
    /// Another request is still in flight.
    Busy,
}

/// How a call to [`ChatSessionController::submit`] ended.
///
/// None of these are errors from the caller's point of view: every outcome is
/// already reflected in the session state.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Nothing changed.
    Rejected(RejectReason),
    /// The reply was appended to the log.
    Replied,
    /// The error marker was appended to the log.
    Failed(Error),
    /// The session was reset while the request was in flight; its result was dropped.
    Stale,
}

impl SubmitOutcome {
    /// Returns true if the submission reached the endpoint.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SubmitOutcome::Rejected(_))
    }
}

/// Receives every session mutation.
///
/// Observers run synchronously after the mutation is complete, and see events
/// in the order the mutations happened.  When mutations race, or an observer
/// mutates the session itself, the call already delivering hands the later
/// events on once the current one has reached every observer.  Observers may
/// read and mutate the controller but should not block.
pub trait SessionObserver: Send + Sync {
    /// Called once per mutation with the resulting state.
    fn on_event(&self, event: &SessionEvent, state: &SessionState);
}

impl<F> SessionObserver for F
where
    F: Fn(&SessionEvent, &SessionState) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent, state: &SessionState) {
        self(event, state)
    }
}

/// Handle returned by [`ChatSessionController::subscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// The number of messages in the log.
    pub message_count: usize,
    /// The number of user messages.
    pub user_messages: usize,
    /// The number of genuine replies.
    pub replies: usize,
    /// The number of error markers.
    pub errors: usize,
    /// Whether a request is in flight.
    pub pending: bool,
    /// Submissions ignored since the controller was created.
    pub rejected: u64,
    /// Results discarded because of an intervening reset.
    pub stale_discarded: u64,
    /// Resets since the controller was created.
    pub resets: u64,
}

struct Core {
    state: SessionState,
    generation: u64,
    rejected: u64,
    stale_discarded: u64,
    resets: u64,
    // Committed but undelivered events, in commit order.
    outbox: VecDeque<(SessionEvent, SessionState)>,
    delivering: bool,
}

struct Observers {
    next_id: u64,
    entries: Vec<(SubscriptionId, Arc<dyn SessionObserver>)>,
}

struct Shared<E> {
    endpoint: E,
    core: Mutex<Core>,
    observers: Mutex<Observers>,
    snapshots: watch::Sender<SessionState>,
}

/// Serializes user submissions against a [`ChatEndpoint`].
///
/// The controller is a cheap handle; clones share one session.  At most one
/// request is in flight at a time.  A generation counter, advanced by
/// [`reset`](Self::reset), tags each request so that results arriving after a
/// reset are discarded instead of landing in the cleared log.
pub struct ChatSessionController<E = ChatClient> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for ChatSessionController<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: ChatEndpoint> ChatSessionController<E> {
    /// Creates an empty session that talks to `endpoint`.
    pub fn new(endpoint: E) -> Self {
        let (snapshots, _) = watch::channel(SessionState::default());
        Self {
            shared: Arc::new(Shared {
                endpoint,
                core: Mutex::new(Core {
                    state: SessionState::default(),
                    generation: 0,
                    rejected: 0,
                    stale_discarded: 0,
                    resets: 0,
                    outbox: VecDeque::new(),
                    delivering: false,
                }),
                observers: Mutex::new(Observers {
                    next_id: 0,
                    entries: Vec::new(),
                }),
                snapshots,
            }),
        }
    }

    /// Returns the endpoint this session talks to.
    pub fn endpoint(&self) -> &E {
        &self.shared.endpoint
    }

    /// Sends `text` to the endpoint and records the exchange.
    ///
    /// Blank text, or any text while another request is in flight, is ignored.
    /// Otherwise the user message is appended, the draft cleared, and the
    /// session marked pending before the request is sent; once the request
    /// settles, exactly one reply or error marker is appended.  Failures are
    /// recorded in the log, never returned.
    ///
    /// Dropping the returned future while the request is in flight settles it
    /// as a failure, so the session is never left pending.
    pub async fn submit(&self, text: impl Into<String>) -> SubmitOutcome {
        let text = text.into();
        let generation = match self.accept(&text) {
            Ok(generation) => generation,
            Err(reason) => return SubmitOutcome::Rejected(reason),
        };
        let in_flight = InFlight {
            session: self,
            generation: Some(generation),
        };
        let result = self.shared.endpoint.complete(&text).await;
        in_flight.finish(result)
    }

    /// Submits the current draft.
    pub async fn submit_draft(&self) -> SubmitOutcome {
        let draft = self.lock_core().state.draft.clone();
        self.submit(draft).await
    }

    fn accept(&self, text: &str) -> std::result::Result<u64, RejectReason> {
        let mut core = self.lock_core();
        let reason = if text.trim().is_empty() {
            Some(RejectReason::Blank)
        } else if core.state.pending {
            Some(RejectReason::Busy)
        } else {
            None
        };
        if let Some(reason) = reason {
            core.rejected += 1;
            SESSION_REJECTED.click();
            tracing::debug!(?reason, "submission rejected");
            return Err(reason);
        }

        core.state.log.push(Message::user(text));
        core.state.draft.clear();
        core.state.pending = true;
        SESSION_SUBMITS.click();
        let generation = core.generation;
        tracing::debug!(generation, prompt_len = text.len(), "submission accepted");
        self.publish(core, SessionEvent::Submitted);
        Ok(generation)
    }

    fn settle(&self, generation: u64, result: Result<String>) -> SubmitOutcome {
        let mut core = self.lock_core();
        if core.generation != generation {
            core.stale_discarded += 1;
            SESSION_STALE_RESPONSES.click();
            tracing::debug!(
                generation,
                current = core.generation,
                ok = result.is_ok(),
                "discarding result from before reset"
            );
            return SubmitOutcome::Stale;
        }

        core.state.pending = false;
        match result {
            Ok(reply) => {
                core.state.log.push(Message::assistant(reply));
                SESSION_REPLIES.click();
                self.publish(core, SessionEvent::Replied);
                SubmitOutcome::Replied
            }
            Err(error) => {
                tracing::warn!(%error, "chat request failed");
                core.state.log.push(Message::error_marker());
                SESSION_FAILURES.click();
                self.publish(
                    core,
                    SessionEvent::Failed {
                        error: error.clone(),
                    },
                );
                SubmitOutcome::Failed(error)
            }
        }
    }

    /// Replaces the draft.
    pub fn update_draft(&self, text: impl Into<String>) {
        let mut core = self.lock_core();
        core.state.draft = text.into();
        self.publish(core, SessionEvent::DraftUpdated);
    }

    /// Clears the log and draft and abandons any in-flight request.
    pub fn reset(&self) {
        let mut core = self.lock_core();
        let abandoned = core.state.pending;
        core.state.log.clear();
        core.state.draft.clear();
        core.state.pending = false;
        core.generation = core.generation.wrapping_add(1);
        core.resets += 1;
        SESSION_RESETS.click();
        tracing::debug!(generation = core.generation, abandoned, "session reset");
        self.publish(core, SessionEvent::Reset);
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.lock_core().state.clone()
    }

    /// Returns true while a request is in flight.
    pub fn is_pending(&self) -> bool {
        self.lock_core().state.pending
    }

    /// Returns the number of messages in the log.
    pub fn message_count(&self) -> usize {
        self.lock_core().state.log.len()
    }

    /// Returns a receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.shared.snapshots.subscribe()
    }

    /// Registers an observer for every subsequent mutation.
    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> SubscriptionId {
        let mut observers = self.lock_observers();
        let id = SubscriptionId(observers.next_id);
        observers.next_id += 1;
        observers.entries.push((id, observer));
        id
    }

    /// Removes an observer.  Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.lock_observers();
        let before = observers.entries.len();
        observers.entries.retain(|(existing, _)| *existing != id);
        observers.entries.len() != before
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        let core = self.lock_core();
        let log = &core.state.log;
        SessionStats {
            message_count: log.len(),
            user_messages: log.iter().filter(|m| m.sender == Sender::User).count(),
            replies: log.iter().filter(|m| m.is_reply()).count(),
            errors: log.iter().filter(|m| m.is_error).count(),
            pending: core.state.pending,
            rejected: core.rejected,
            stale_discarded: core.stale_discarded,
            resets: core.resets,
        }
    }

    /// Saves the transcript to the specified path.
    pub fn save_transcript_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let log = self.lock_core().state.log.clone();
        let transcript = TranscriptFile::new(&log);
        let file = File::create(path.as_ref())
            .map_err(|err| Error::io("failed to create transcript file", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript", Some(Box::new(err)))
        })
    }

    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_observers(&self) -> MutexGuard<'_, Observers> {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // Consumes the guard so observers run without the session lock held.
    // Events reach observers in commit order.  If another call is already
    // delivering, the event is queued for it and this call returns at once.
    fn publish(&self, mut core: MutexGuard<'_, Core>, event: SessionEvent) {
        let snapshot = core.state.clone();
        self.shared.snapshots.send_replace(snapshot.clone());
        core.outbox.push_back((event, snapshot));
        if core.delivering {
            return;
        }
        core.delivering = true;
        drop(core);

        let _delivering = Delivering { session: self };
        loop {
            let (event, snapshot) = {
                let mut core = self.lock_core();
                match core.outbox.pop_front() {
                    Some(next) => next,
                    None => {
                        core.delivering = false;
                        break;
                    }
                }
            };
            let observers: Vec<Arc<dyn SessionObserver>> = self
                .lock_observers()
                .entries
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect();
            for observer in observers {
                observer.on_event(&event, &snapshot);
            }
        }
    }
}

// Settles an accepted request if the future driving it is dropped early.
struct InFlight<'a, E: ChatEndpoint> {
    session: &'a ChatSessionController<E>,
    generation: Option<u64>,
}

impl<E: ChatEndpoint> InFlight<'_, E> {
    fn finish(mut self, result: Result<String>) -> SubmitOutcome {
        match self.generation.take() {
            Some(generation) => self.session.settle(generation, result),
            None => SubmitOutcome::Stale,
        }
    }
}

impl<E: ChatEndpoint> Drop for InFlight<'_, E> {
    fn drop(&mut self) {
        if let Some(generation) = self.generation.take() {
            self.session.settle(
                generation,
                Err(Error::protocol("request abandoned before it settled")),
            );
        }
    }
}

// Hands delivery back if an observer panics.
struct Delivering<'a, E: ChatEndpoint> {
    session: &'a ChatSessionController<E>,
}

impl<E: ChatEndpoint> Drop for Delivering<'_, E> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.session.lock_core().delivering = false;
        }
    }
}

#[derive(Serialize)]
struct TranscriptFile<'a> {
    version: u8,
    messages: &'a [Message],
}

impl<'a> TranscriptFile<'a> {
    fn new(messages: &'a [Message]) -> Self {
        Self {
            version: 1,
            messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ERROR_MARKER;

    struct Canned {
        replies: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ChatEndpoint for Canned {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(Error::protocol("no canned reply")))
        }
    }

    #[test]
    fn new_session_empty() {
        let session = ChatSessionController::new(Canned::new(vec![]));
        assert_eq!(session.snapshot(), SessionState::default());
        assert_eq!(session.message_count(), 0);
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn submit_sends_text_verbatim() {
        let session = ChatSessionController::new(Canned::new(vec![Ok("pong".to_string())]));
        let outcome = session.submit("  ping  ").await;
        assert!(matches!(outcome, SubmitOutcome::Replied));
        assert_eq!(session.endpoint().prompts(), vec!["  ping  ".to_string()]);
        assert_eq!(session.snapshot().log[0].text, "  ping  ");
    }

    #[tokio::test]
    async fn failure_appends_error_marker() {
        let session = ChatSessionController::new(Canned::new(vec![Err(Error::connection(
            "refused", None,
        ))]));
        let outcome = session.submit("Ping").await;
        assert!(matches!(outcome, SubmitOutcome::Failed(ref e) if e.is_connection()));

        let state = session.snapshot();
        assert!(!state.pending);
        assert_eq!(state.log.len(), 2);
        assert_eq!(state.log[1].text, ERROR_MARKER);
        assert!(state.log[1].is_error);
    }

    #[tokio::test]
    async fn blank_submission_is_ignored() {
        let session = ChatSessionController::new(Canned::new(vec![]));
        session.update_draft(" \t\n");
        let outcome = session.submit_draft().await;
        assert!(matches!(outcome, SubmitOutcome::Rejected(RejectReason::Blank)));
        assert!(!outcome.is_accepted());
        assert_eq!(session.snapshot().draft, " \t\n");
        assert!(session.endpoint().prompts().is_empty());
        assert_eq!(session.stats().rejected, 1);
    }

    #[tokio::test]
    async fn submit_draft_clears_draft() {
        let session = ChatSessionController::new(Canned::new(vec![Ok("Hi".to_string())]));
        session.update_draft("Hello");
        session.submit_draft().await;
        let state = session.snapshot();
        assert_eq!(state.draft, "");
        assert_eq!(state.log[0].text, "Hello");
        assert_eq!(state.log[0].sender, Sender::User);
    }

    #[tokio::test]
    async fn observers_see_every_mutation() {
        let session = ChatSessionController::new(Canned::new(vec![Ok("Hi".to_string())]));
        let seen: Arc<Mutex<Vec<(String, SessionState)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.subscribe(Arc::new(move |event: &SessionEvent, state: &SessionState| {
            let name = match event {
                SessionEvent::DraftUpdated => "draft",
                SessionEvent::Submitted => "submitted",
                SessionEvent::Replied => "replied",
                SessionEvent::Failed { .. } => "failed",
                SessionEvent::Reset => "reset",
            };
            sink.lock().unwrap().push((name.to_string(), state.clone()));
        }));

        session.update_draft("Hello");
        session.submit_draft().await;
        session.reset();

        let seen = seen.lock().unwrap();
        let names: Vec<&str> = seen.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["draft", "submitted", "replied", "reset"]);

        let submitted = &seen[1].1;
        assert!(submitted.pending);
        assert_eq!(submitted.log.len(), 1);
        assert_eq!(submitted.draft, "");

        let replied = &seen[2].1;
        assert!(!replied.pending);
        assert_eq!(replied.log.len(), 2);
    }

    #[tokio::test]
    async fn rejected_submission_does_not_notify() {
        let session = ChatSessionController::new(Canned::new(vec![]));
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        session.subscribe(Arc::new(move |_: &SessionEvent, _: &SessionState| {
            *sink.lock().unwrap() += 1;
        }));
        session.submit("").await;
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let session = ChatSessionController::new(Canned::new(vec![]));
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let id = session.subscribe(Arc::new(move |_: &SessionEvent, _: &SessionState| {
            *sink.lock().unwrap() += 1;
        }));
        session.update_draft("a");
        assert!(session.unsubscribe(id));
        assert!(!session.unsubscribe(id));
        session.update_draft("b");
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn watch_tracks_latest_state() {
        let session = ChatSessionController::new(Canned::new(vec![]));
        let rx = session.watch();
        session.update_draft("typing");
        assert_eq!(rx.borrow().draft, "typing");
    }

    #[tokio::test]
    async fn stats_count_senders() {
        let session = ChatSessionController::new(Canned::new(vec![
            Ok("one".to_string()),
            Err(Error::timeout("slow", None)),
        ]));
        session.submit("a").await;
        session.submit("b").await;
        let stats = session.stats();
        assert_eq!(stats.message_count, 4);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.replies, 1);
        assert_eq!(stats.errors, 1);
        assert!(!stats.pending);
    }

    #[tokio::test]
    async fn save_transcript_writes_messages() {
        let session = ChatSessionController::new(Canned::new(vec![Ok("Hi there".to_string())]));
        session.submit("Hello").await;

        let path = std::env::temp_dir().join(format!(
            "chatterbox-transcript-{}.json",
            std::process::id()
        ));
        session.save_transcript_to(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(written["version"], 1);
        assert_eq!(written["messages"][0]["sender"], "user");
        assert_eq!(written["messages"][0]["text"], "Hello");
        assert_eq!(written["messages"][1]["sender"], "assistant");
        assert_eq!(written["messages"][1]["text"], "Hi there");
    }
}
