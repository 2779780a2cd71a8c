//! Campus placement assistant: a rate-limited client for the placement
//! query endpoint, plus the chat session and company directory around it.

pub mod client;
pub mod clock;
pub mod config;
pub mod directory;
pub mod markdown;
pub mod rate_limit;
pub mod session;
pub mod shell;
pub mod storage;
pub mod types;

pub use client::{HttpTransport, QueryClient, QueryError, QueryTransport, RawResponse, Reply};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use directory::{Category, CompanyDirectory};
pub use rate_limit::{LimitStatus, RateLimitState, RateLimiter};
pub use session::{ChatSession, PendingQuery, Refusal, SubmitOutcome};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use types::{Message, Notification, Notifier, Severity};
