use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique message id derived from the creation instant.
pub fn next_message_id(now_millis: i64) -> String {
    let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{now_millis}-{seq}")
}

/// One entry of the chat transcript. Never mutated after creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub is_bot: bool,
    pub timestamp: OffsetDateTime,
}

impl Message {
    pub fn user(id: impl Into<String>, text: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_bot: false,
            timestamp,
        }
    }

    pub fn bot(id: impl Into<String>, text: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_bot: true,
            timestamp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Destructive,
}

/// Side-channel toast, shown independently of the transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity: Severity::Destructive,
        }
    }
}

/// Receiver for notifications raised by the session and the query client.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
