//! Chat transcript and submission flow.
//!
//! A session is driven from a single event loop. A submission is split into
//! [`ChatSession::begin`] (synchronous bookkeeping) and
//! [`ChatSession::finish`] (settling the reply) so the loop can keep
//! refreshing the quota display while the question is in flight.
//! [`ChatSession::submit`] runs both halves back to back.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::client::{QueryClient, QueryError, Reply};
use crate::clock::Clock;
use crate::rate_limit::{RateLimiter, minutes_ceil};
use crate::types::{Message, Notification, Notifier, next_message_id};

pub const WELCOME_ID: &str = "welcome";
pub const WELCOME_TEXT: &str = "Hello! I'm your Campus Placement Assistant. I can help you with information about companies, CTC ranges, eligibility criteria, placement rounds, and more. What would you like to know?";

pub const SUGGESTED_QUESTIONS: [&str; 8] = [
    "What companies are visiting for placements?",
    "What is the CTC range offered by tech companies?",
    "Tell me about internship opportunities and stipends",
    "What are the eligibility criteria for placements?",
    "How many rounds are there in the placement process?",
    "Which roles are available for CS students?",
    "What are the requirements for Infosys placement?",
    "Tell me about FAANG companies visiting campus",
];

pub fn company_question(company: &str) -> String {
    format!(
        "Tell me about {company} - their placement process, CTC, eligibility criteria, and available roles."
    )
}

/// Why a submission did not go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    Empty,
    InFlight,
    RateLimited(Duration),
}

/// A question that passed the checks and is waiting for its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Refused(Refusal),
    Answered(Message),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitIndicator {
    pub text: String,
    pub low_remaining: bool,
    pub cooldown_active: bool,
}

pub struct ChatSession {
    messages: Vec<Message>,
    input: String,
    in_flight: bool,
    remaining: u32,
    cooldown_ends_at: Option<i64>,
    limiter: RateLimiter,
    client: Arc<QueryClient>,
    notifier: Arc<dyn Notifier>,
}

impl ChatSession {
    pub fn new(limiter: RateLimiter, client: Arc<QueryClient>, notifier: Arc<dyn Notifier>) -> Self {
        let now = limiter.clock().now();
        let mut session = Self {
            messages: vec![Message::bot(WELCOME_ID, WELCOME_TEXT, now)],
            input: String::new(),
            in_flight: false,
            remaining: 0,
            cooldown_ends_at: None,
            limiter,
            client,
            notifier,
        };
        session.refresh();
        session
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Epoch milliseconds at which the cooldown ends, if one is running
    pub fn cooldown_ends_at(&self) -> Option<i64> {
        self.cooldown_ends_at
    }

    pub fn client(&self) -> Arc<QueryClient> {
        self.client.clone()
    }

    /// Suggested questions, offered only before the first exchange.
    pub fn suggestions(&self) -> &'static [&'static str] {
        if self.messages.len() == 1 {
            &SUGGESTED_QUESTIONS
        } else {
            &[]
        }
    }

    pub fn choose_suggestion(&mut self, index: usize) -> bool {
        match self.suggestions().get(index) {
            Some(question) => {
                self.input = question.to_string();
                true
            }
            None => false,
        }
    }

    /// Pre-fill the input for a company picked from the directory.
    pub fn select_company(&mut self, company: &str) {
        self.input = company_question(company);
    }

    /// Recompute the quota display. Safe to call on every tick.
    pub fn refresh(&mut self) {
        let status = self.limiter.check_limit();
        self.remaining = status.remaining;
        self.cooldown_ends_at = if status.time_until_reset > Duration::ZERO {
            Some(self.limiter.clock().now_millis() + status.time_until_reset.as_millis() as i64)
        } else {
            None
        };
    }

    pub fn indicator(&self) -> LimitIndicator {
        let now = self.limiter.clock().now_millis();
        let text = if self.remaining > 0 {
            format!("{} questions remaining", self.remaining)
        } else if let Some(ends_at) = self.cooldown_ends_at {
            let left = Duration::from_millis((ends_at - now).max(0) as u64);
            format!("Rate limit reached. Reset in {} minutes", minutes_ceil(left))
        } else {
            "Questions available".to_string()
        };

        LimitIndicator {
            text,
            low_remaining: (1..=2).contains(&self.remaining),
            cooldown_active: self.cooldown_ends_at.is_some(),
        }
    }

    /// Validate and record a question, appending it to the transcript.
    pub fn begin(&mut self, text: &str) -> Result<PendingQuery, Refusal> {
        if text.trim().is_empty() {
            return Err(Refusal::Empty);
        }
        if self.in_flight {
            debug!("submission ignored, a question is already in flight");
            return Err(Refusal::InFlight);
        }

        let status = self.limiter.check_limit();
        if !status.allowed {
            info!(wait_ms = status.time_until_reset.as_millis() as u64, "question refused by rate limit");
            self.notifier.notify(Notification::destructive(
                "Rate limit exceeded",
                QueryError::RateLimited(status.time_until_reset).user_message(),
            ));
            self.refresh();
            return Err(Refusal::RateLimited(status.time_until_reset));
        }

        let clock = self.limiter.clock();
        let id = next_message_id(clock.now_millis());
        self.messages.push(Message::user(id, text, clock.now()));
        self.input.clear();
        self.in_flight = true;

        self.limiter.record_request();
        self.refresh();
        debug!(remaining = self.remaining, "question accepted");

        Ok(PendingQuery {
            query: text.to_string(),
        })
    }

    /// Settle an in-flight question. Always clears the in-flight flag.
    pub fn finish(&mut self, reply: Reply) -> Message {
        self.in_flight = false;
        if let Some(notification) = reply.notification {
            self.notifier.notify(notification);
        }
        self.messages.push(reply.message.clone());
        self.refresh();
        reply.message
    }

    pub async fn submit(&mut self, text: &str) -> SubmitOutcome {
        let pending = match self.begin(text) {
            Ok(pending) => pending,
            Err(refusal) => return SubmitOutcome::Refused(refusal),
        };
        let reply = self.client.ask(&pending.query).await;
        SubmitOutcome::Answered(self.finish(reply))
    }

    /// Submit whatever is currently in the input field.
    pub async fn submit_input(&mut self) -> SubmitOutcome {
        let text = self.input.clone();
        self.submit(&text).await
    }
}
