//! Dispatcher: routes inbound messages to the session manager and turns
//! every outcome into exactly one reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::artifacts::ArtifactDir;
use crate::channels::{ChannelManager, IncomingMessage, OutgoingResponse};
use crate::error::{ChannelError, FlowError};
use crate::profile::UserId;
use crate::session::prompts;
use crate::session::{Completion, RenderedDocument, SessionManager, SubmitOutcome};

use super::command::{self, Command, Inbound};

/// How long a user's worker task waits for another message before it
/// exits and leaves the pool.
pub const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(300);

/// Routes messages from all channels to the dialogue flows.
pub struct Dispatcher {
    sessions: Arc<SessionManager>,
    artifacts: Option<ArtifactDir>,
    worker_idle: Duration,
}

impl Dispatcher {
    /// Create a dispatcher. When `artifacts` is set, every generated
    /// document is also written there.
    pub fn new(sessions: Arc<SessionManager>, artifacts: Option<ArtifactDir>) -> Self {
        Self {
            sessions,
            artifacts,
            worker_idle: DEFAULT_WORKER_IDLE,
        }
    }

    /// Set how long an idle user's worker task lingers.
    pub fn with_worker_idle(mut self, idle: Duration) -> Self {
        self.worker_idle = idle;
        self
    }

    /// Handle one message and build the reply.
    pub async fn handle(&self, msg: &IncomingMessage) -> OutgoingResponse {
        let user = UserId::new(msg.user_id.as_str());
        tracing::debug!(user_id = %user, channel = %msg.channel, "Inbound message");

        match command::parse(&msg.content) {
            Inbound::Command(Command::Start) => match self.sessions.begin_onboarding(&user).await {
                Ok(started) => OutgoingResponse::text(started.prompt),
                Err(e) => flow_notice(&user, e),
            },
            Inbound::Command(Command::Generate) => {
                match self.sessions.begin_engagement(&user).await {
                    Ok(started) => OutgoingResponse::text(started.prompt),
                    Err(e) => flow_notice(&user, e),
                }
            }
            Inbound::Command(Command::Cancel) => match self.sessions.cancel(&user).await {
                Ok(_) => OutgoingResponse::text(prompts::CANCELLED),
                Err(FlowError::NoActiveSession) => {
                    OutgoingResponse::text(prompts::NOTHING_TO_CANCEL)
                }
                Err(e) => flow_notice(&user, e),
            },
            Inbound::Command(Command::Help) => OutgoingResponse::text(prompts::HELP),
            Inbound::Command(Command::Unknown(name)) => {
                OutgoingResponse::text(format!("Unknown command /{name}.\n\n{}", prompts::HELP))
            }
            Inbound::Text(text) => match self.sessions.submit_answer(&user, &text).await {
                Ok(SubmitOutcome::NextPrompt { prompt, .. })
                | Ok(SubmitOutcome::Retry { prompt, .. }) => OutgoingResponse::text(prompt),
                Ok(SubmitOutcome::Completed(Completion::Onboarded(_))) => {
                    OutgoingResponse::text(prompts::ONBOARDING_COMPLETE)
                }
                Ok(SubmitOutcome::Completed(Completion::Document(document))) => {
                    self.deliver_document(document).await
                }
                Err(e) => flow_notice(&user, e),
            },
        }
    }

    /// Write the artifact copy, then hand the bytes over for delivery.
    async fn deliver_document(&self, document: RenderedDocument) -> OutgoingResponse {
        if let Some(ref artifacts) = self.artifacts {
            match artifacts.write(&document.file_name, &document.bytes).await {
                Ok(path) => tracing::info!(path = %path.display(), "Terms document saved"),
                Err(e) => tracing::warn!(file = %document.file_name, "Failed to save terms document: {e}"),
            }
        }
        OutgoingResponse::document(prompts::DOCUMENT_CAPTION, &document.file_name, document.bytes)
    }

    /// Consume every channel's messages until all streams end.
    ///
    /// Each user gets a worker task that handles their messages in arrival
    /// order; different users are handled in parallel. Workers exit after
    /// `worker_idle` without a message and are removed from the pool.
    pub async fn run(self: Arc<Self>, channels: Arc<ChannelManager>) -> Result<(), ChannelError> {
        let mut stream = channels.start_all().await?;
        let (mut pool, mut finished) = WorkerPool::new(self, Arc::clone(&channels));

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(msg) => pool.dispatch(msg),
                    None => break,
                },
                Some((user_id, id)) = finished.recv() => pool.retire(&user_id, id),
            }
        }

        tracing::info!(workers = pool.len(), "All channel streams ended, draining workers");
        pool.drain().await;
        channels.shutdown_all().await;
        Ok(())
    }
}

struct Worker {
    id: u64,
    tx: mpsc::UnboundedSender<IncomingMessage>,
    handle: JoinHandle<()>,
}

/// Per-user worker tasks keyed by user id.
///
/// A worker that goes idle closes its queue, finishes what is already
/// queued, and reports `(user_id, id)` on the finished channel so the pool
/// can drop its entry.
struct WorkerPool {
    dispatcher: Arc<Dispatcher>,
    channels: Arc<ChannelManager>,
    workers: HashMap<String, Worker>,
    next_id: u64,
    finished_tx: mpsc::UnboundedSender<(String, u64)>,
}

impl WorkerPool {
    fn new(
        dispatcher: Arc<Dispatcher>,
        channels: Arc<ChannelManager>,
    ) -> (Self, mpsc::UnboundedReceiver<(String, u64)>) {
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let pool = Self {
            dispatcher,
            channels,
            workers: HashMap::new(),
            next_id: 0,
            finished_tx,
        };
        (pool, finished_rx)
    }

    fn len(&self) -> usize {
        self.workers.len()
    }

    /// Queue a message on its user's worker, spawning one if needed.
    fn dispatch(&mut self, msg: IncomingMessage) {
        let (msg, prev) = match self.workers.get(&msg.user_id) {
            Some(worker) => match worker.tx.send(msg) {
                Ok(()) => return,
                // The worker went idle and closed its queue.
                Err(mpsc::error::SendError(msg)) => {
                    let prev = self.workers.remove(&msg.user_id).map(|w| w.handle);
                    (msg, prev)
                }
            },
            None => (msg, None),
        };

        let user_id = msg.user_id.clone();
        let worker = self.spawn(user_id.clone(), prev);
        if worker.tx.send(msg).is_err() {
            tracing::warn!(user_id = %user_id, "Worker exited before its first message");
        }
        self.workers.insert(user_id, worker);
    }

    /// Drop a finished worker, unless the user already has a newer one.
    fn retire(&mut self, user_id: &str, id: u64) {
        if self.workers.get(user_id).is_some_and(|w| w.id == id) {
            self.workers.remove(user_id);
            tracing::debug!(user_id = %user_id, workers = self.workers.len(), "Idle worker retired");
        }
    }

    /// Close every queue and wait for the workers to finish.
    async fn drain(self) {
        for (user_id, worker) in self.workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                tracing::warn!(user_id = %user_id, "Worker task failed: {e}");
            }
        }
    }

    /// Spawn a worker. It waits for `prev`, the user's previous worker, so
    /// messages stay in arrival order across an idle exit.
    fn spawn(&mut self, user_id: String, prev: Option<JoinHandle<()>>) -> Worker {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let dispatcher = Arc::clone(&self.dispatcher);
        let channels = Arc::clone(&self.channels);
        let finished = self.finished_tx.clone();
        let idle = dispatcher.worker_idle;

        let handle = tokio::spawn(async move {
            if let Some(prev) = prev {
                if let Err(e) = prev.await {
                    tracing::warn!(user_id = %user_id, "Previous worker task failed: {e}");
                }
            }
            loop {
                match tokio::time::timeout(idle, rx.recv()).await {
                    Ok(Some(msg)) => reply(&dispatcher, &channels, &msg).await,
                    Ok(None) => break,
                    Err(_) => {
                        rx.close();
                        while let Some(msg) = rx.recv().await {
                            reply(&dispatcher, &channels, &msg).await;
                        }
                        let _ = finished.send((user_id, id));
                        break;
                    }
                }
            }
        });
        Worker { id, tx, handle }
    }
}

async fn reply(dispatcher: &Dispatcher, channels: &ChannelManager, msg: &IncomingMessage) {
    let response = dispatcher.handle(msg).await;
    if let Err(e) = channels.respond(msg, response).await {
        tracing::warn!(
            user_id = %msg.user_id,
            channel = %msg.channel,
            "Failed to deliver response: {e}"
        );
    }
}

/// User-facing notice for a flow error.
fn flow_notice(user: &UserId, err: FlowError) -> OutgoingResponse {
    let text = match err {
        FlowError::AlreadyOnboarded => prompts::ALREADY_ONBOARDED.to_string(),
        FlowError::NotOnboarded => prompts::NOT_ONBOARDED.to_string(),
        FlowError::NoActiveSession => prompts::NO_ACTIVE_SESSION.to_string(),
        FlowError::SessionInProgress { flow } => format!(
            "You're in the middle of {flow}. Answer the last question or send /cancel first."
        ),
        FlowError::Store(e) => {
            tracing::warn!(user_id = %user, "Onboarding not saved: {e}");
            prompts::SAVE_FAILED.to_string()
        }
        FlowError::Render(e) => {
            tracing::warn!(user_id = %user, "Engagement ended by render failure: {e}");
            prompts::RENDER_FAILED.to_string()
        }
    };
    OutgoingResponse::text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Channel, MessageStream};
    use crate::error::RenderError;
    use crate::profile::{CompanyProfile, MemoryProfileStore, ProfileStore};
    use crate::session::manager::tests::ForgetfulStore;
    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::Mutex;

    /// Channel that never yields messages and records reply texts.
    struct RecordingChannel {
        replies: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl Channel for RecordingChannel {
        fn name(&self) -> &str {
            "record"
        }

        async fn start(&self) -> Result<MessageStream, ChannelError> {
            Ok(stream::empty::<IncomingMessage>().boxed())
        }

        async fn respond(
            &self,
            msg: &IncomingMessage,
            response: OutgoingResponse,
        ) -> Result<(), ChannelError> {
            self.replies
                .lock()
                .await
                .push((msg.user_id.clone(), response.content));
            Ok(())
        }

        async fn health_check(&self) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn acme() -> CompanyProfile {
        CompanyProfile {
            agency_name: "Acme".into(),
            services: "Posters".into(),
            email: "a@acme.com".into(),
            phone: "1".into(),
        }
    }

    fn dispatcher() -> (Dispatcher, Arc<MemoryProfileStore>) {
        let store = Arc::new(MemoryProfileStore::new());
        let sessions = Arc::new(SessionManager::new(store.clone()));
        (Dispatcher::new(sessions, None), store)
    }

    async fn say(dispatcher: &Dispatcher, user: &str, text: &str) -> OutgoingResponse {
        dispatcher
            .handle(&IncomingMessage::new("test", user, text))
            .await
    }

    #[tokio::test]
    async fn start_prompts_for_agency_name() {
        let (d, _) = dispatcher();
        let resp = say(&d, "u1", "/start").await;
        assert!(resp.content.starts_with(prompts::ONBOARDING_WELCOME));
        assert!(resp.attachment.is_none());
    }

    #[tokio::test]
    async fn generate_before_start_is_refused() {
        let (d, _) = dispatcher();
        let resp = say(&d, "u1", "/generate").await;
        assert_eq!(resp.content, prompts::NOT_ONBOARDED);
    }

    #[tokio::test]
    async fn text_without_session_gets_notice() {
        let (d, _) = dispatcher();
        let resp = say(&d, "u1", "hello").await;
        assert_eq!(resp.content, prompts::NO_ACTIVE_SESSION);
    }

    #[tokio::test]
    async fn cancel_replies() {
        let (d, _) = dispatcher();
        assert_eq!(say(&d, "u1", "/cancel").await.content, prompts::NOTHING_TO_CANCEL);
        say(&d, "u1", "/start").await;
        assert_eq!(say(&d, "u1", "/cancel").await.content, prompts::CANCELLED);
    }

    #[tokio::test]
    async fn full_flow_delivers_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryProfileStore::new());
        let sessions = Arc::new(SessionManager::new(store.clone()));
        let d = Dispatcher::new(sessions, Some(ArtifactDir::new(dir.path())));

        say(&d, "u1", "/start").await;
        for answer in ["Acme", "Video Editing", "a@acme.com"] {
            say(&d, "u1", answer).await;
        }
        let done = say(&d, "u1", "555-0100").await;
        assert_eq!(done.content, prompts::ONBOARDING_COMPLETE);
        assert!(store.get(&UserId::new("u1")).await.is_some());

        assert_eq!(say(&d, "u1", "/start").await.content, prompts::ALREADY_ONBOARDED);

        say(&d, "u1", "/generate").await;
        for answer in ["Bob", "₹3000", "3 days"] {
            say(&d, "u1", answer).await;
        }
        let resp = say(&d, "u1", "Logo design").await;
        let attachment = resp.attachment.expect("document attachment");
        assert_eq!(attachment.file_name, "Terms_u1.pdf");
        assert!(attachment.bytes.starts_with(b"%PDF"));

        let saved = std::fs::read(dir.path().join("Terms_u1.pdf")).unwrap();
        assert_eq!(saved, attachment.bytes);
    }

    #[tokio::test]
    async fn blank_answer_repeats_question() {
        let (d, _) = dispatcher();
        say(&d, "u1", "/start").await;
        let resp = say(&d, "u1", "   ").await;
        assert!(resp.content.contains(prompts::BLANK_ANSWER));
        assert!(resp.content.contains("Agency/Company name"));
    }

    #[tokio::test]
    async fn second_start_while_generating_is_refused() {
        let (d, store) = dispatcher();
        let user = UserId::new("u1");
        store
            .put(
                &user,
                crate::profile::CompanyProfile {
                    agency_name: "Acme".into(),
                    services: "Posters".into(),
                    email: "a@acme.com".into(),
                    phone: "1".into(),
                },
            )
            .await
            .unwrap();
        say(&d, "u1", "/generate").await;
        let resp = say(&d, "u1", "/generate").await;
        assert!(resp.content.contains("middle of engagement"));
    }

    #[tokio::test]
    async fn unknown_command_lists_help() {
        let (d, _) = dispatcher();
        let resp = say(&d, "u1", "/nope").await;
        assert!(resp.content.starts_with("Unknown command /nope."));
        assert!(resp.content.contains("/generate"));
    }

    #[tokio::test]
    async fn render_failure_gets_render_notice() {
        let store = Arc::new(ForgetfulStore::new(acme(), 1));
        let d = Dispatcher::new(Arc::new(SessionManager::new(store)), None);

        assert!(say(&d, "u1", "/generate").await.content.contains("Client's Name"));
        for answer in ["Bob", "₹3000", "3 days"] {
            say(&d, "u1", answer).await;
        }
        let resp = say(&d, "u1", "Logo design").await;
        assert_eq!(resp.content, prompts::RENDER_FAILED);
        assert!(resp.attachment.is_none());

        assert_eq!(say(&d, "u1", "hello").await.content, prompts::NO_ACTIVE_SESSION);
    }

    #[test]
    fn render_error_maps_to_render_notice() {
        let resp = flow_notice(&UserId::new("u1"), FlowError::Render(RenderError::MissingProfile));
        assert_eq!(resp.content, prompts::RENDER_FAILED);
    }

    #[tokio::test]
    async fn idle_workers_leave_the_pool() {
        let (d, _) = dispatcher();
        let d = Arc::new(d.with_worker_idle(Duration::from_millis(20)));
        let replies = Arc::new(Mutex::new(Vec::new()));
        let mut channels = ChannelManager::new();
        channels.add(Box::new(RecordingChannel {
            replies: Arc::clone(&replies),
        }));
        let (mut pool, mut finished) = WorkerPool::new(d, Arc::new(channels));

        pool.dispatch(IncomingMessage::new("record", "u1", "/help"));
        pool.dispatch(IncomingMessage::new("record", "u2", "/help"));
        assert_eq!(pool.len(), 2);

        let mut retired = Vec::new();
        for _ in 0..2 {
            let (user_id, id) = tokio::time::timeout(Duration::from_secs(5), finished.recv())
                .await
                .expect("worker went idle")
                .expect("finished channel open");
            pool.retire(&user_id, id);
            retired.push((user_id, id));
        }
        assert_eq!(pool.len(), 0);
        assert_eq!(replies.lock().await.len(), 2);

        // A returning user gets a fresh worker that a stale retire leaves alone.
        pool.dispatch(IncomingMessage::new("record", "u1", "/cancel"));
        assert_eq!(pool.len(), 1);
        let (user_id, old_id) = retired
            .iter()
            .find(|(user_id, _)| user_id == "u1")
            .cloned()
            .expect("u1 retired");
        pool.retire(&user_id, old_id);
        assert_eq!(pool.len(), 1);

        pool.drain().await;
        let replies = replies.lock().await;
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[2], ("u1".to_string(), prompts::NOTHING_TO_CANCEL.to_string()));
    }

    #[tokio::test]
    async fn run_returns_when_streams_end() {
        let (d, _) = dispatcher();
        let d = Arc::new(d.with_worker_idle(Duration::from_millis(10)));
        let replies = Arc::new(Mutex::new(Vec::new()));
        let mut channels = ChannelManager::new();
        channels.add(Box::new(RecordingChannel {
            replies: Arc::clone(&replies),
        }));

        d.run(Arc::new(channels)).await.unwrap();
        assert!(replies.lock().await.is_empty());
    }
}
