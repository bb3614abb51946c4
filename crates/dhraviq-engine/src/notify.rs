//! Best-effort push notifications.
//!
//! The request path only ever calls [`NotificationQueue::enqueue`], which
//! never blocks. A [`NotificationWorker`] drains the channel and hands each
//! job to a detached task that waits the dispatch delay before calling the
//! [`NotificationSink`]. Failures are logged and dropped.
//!
//! On cancellation the worker stops accepting jobs, dispatches whatever is
//! still buffered, and waits for every in-flight send before it returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

pub const DEFAULT_DISPATCH_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

const PUSHOVER_URL: &str = "https://api.pushover.net/1/messages.json";
const PUSHOVER_TIMEOUT: Duration = Duration::from_secs(10);
const TITLE: &str = "New User Question";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationJob {
    pub user_id: String,
    pub question: String,
    pub email: Option<String>,
}

impl NotificationJob {
    pub fn title(&self) -> &'static str {
        TITLE
    }

    pub fn message(&self) -> String {
        let mut message = format!(
            "New question from user {}:\n\n{}",
            self.user_id, self.question
        );
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            message.push_str(&format!("\n\nUser email: {email}"));
        }
        message
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification queue is full")]
    QueueFull,

    #[error("notification queue is closed")]
    QueueClosed,

    #[error("notification sink is not configured")]
    NotConfigured,

    #[error("notification request failed: {0}")]
    Http(String),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Submission side used by the request path. Must not block.
pub trait NotificationQueue: Send + Sync {
    fn enqueue(&self, job: NotificationJob) -> Result<(), NotifyError>;
}

/// Delivery side: one attempt per call, no retries.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotifyError>;
}

/// Bounded mpsc sender.
#[derive(Clone)]
pub struct ChannelNotificationQueue {
    tx: mpsc::Sender<NotificationJob>,
}

impl ChannelNotificationQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl NotificationQueue for ChannelNotificationQueue {
    fn enqueue(&self, job: NotificationJob) -> Result<(), NotifyError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
        })
    }
}

/// Drains the queue until the channel closes or `cancel` fires. The spawned
/// handle resolves once every accepted job has been attempted.
pub struct NotificationWorker {
    rx: mpsc::Receiver<NotificationJob>,
    sink: Arc<dyn NotificationSink>,
    delay: Duration,
    cancel: CancellationToken,
    in_flight: TaskTracker,
}

impl NotificationWorker {
    pub fn new(
        rx: mpsc::Receiver<NotificationJob>,
        sink: Arc<dyn NotificationSink>,
        delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            sink,
            delay,
            cancel,
            in_flight: TaskTracker::new(),
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        loop {
            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            self.dispatch(job);
        }

        // Late enqueues now fail with QueueClosed instead of vanishing
        self.rx.close();
        let mut drained = 0usize;
        while let Ok(job) = self.rx.try_recv() {
            self.dispatch(job);
            drained += 1;
        }

        self.in_flight.close();
        let pending = self.in_flight.len();
        if pending > 0 {
            info!(pending, drained, "waiting for queued notifications");
        }
        self.in_flight.wait().await;
        debug!("notification worker stopped");
    }

    fn dispatch(&self, job: NotificationJob) {
        let sink = Arc::clone(&self.sink);
        let delay = self.delay;
        // Outlives the request that queued it, tracked for shutdown
        self.in_flight.spawn(async move {
            tokio::time::sleep(delay).await;
            match sink.send(&job).await {
                Ok(()) => info!(user_id = %job.user_id, "notification sent"),
                Err(e) => warn!(user_id = %job.user_id, error = %e, "notification failed"),
            }
        });
    }
}

/// Pushover messages API.
pub struct PushoverSink {
    client: Client,
    token: SecretString,
    user: SecretString,
}

impl PushoverSink {
    pub fn new(token: SecretString, user: SecretString) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(PUSHOVER_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(Self {
            client,
            token,
            user,
        })
    }

    fn form(&self, job: &NotificationJob) -> Vec<(&'static str, String)> {
        vec![
            ("token", self.token.expose_secret().to_string()),
            ("user", self.user.expose_secret().to_string()),
            ("title", job.title().to_string()),
            ("message", job.message()),
            ("priority", "0".to_string()),
            ("sound", "magic".to_string()),
            ("html", "1".to_string()),
        ]
    }
}

#[async_trait]
impl NotificationSink for PushoverSink {
    async fn send(&self, job: &NotificationJob) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(PUSHOVER_URL)
            .form(&self.form(job))
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Sink used when no credentials are configured. Every send fails.
pub struct DisabledSink;

#[async_trait]
impl NotificationSink for DisabledSink {
    async fn send(&self, _job: &NotificationJob) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}
