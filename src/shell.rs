//! Terminal front end for a [`ChatSession`].
//!
//! One event loop multiplexes stdin, a one-second quota refresh and the
//! settlement of the in-flight question. Network calls run on spawned tasks
//! and report back over channels, so every session mutation happens here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::client::{QueryClient, Reply};
use crate::directory::{CompanyDirectory, categorize};
use crate::session::{ChatSession, LimitIndicator, Refusal};
use crate::types::{Message, Notification, Notifier, Severity};

const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour repr:12 padding:zero]:[minute padding:zero] [period case:upper]");

const HELP: &str = "\
Type a question and press Enter to ask it.
  (empty line)        send the pre-filled question
  /companies [term]   list recruiters, optionally filtered
  /pick <name>        pre-fill a question about a company
  /suggest <number>   pre-fill a suggested question
  /status             show remaining questions
  /test               check the API connection
  /help               show this help
  /quit               leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    SendInput,
    Companies(Option<String>),
    Pick(String),
    Suggest(usize),
    Status,
    Test,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::SendInput;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Ask(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name {
        "companies" => Command::Companies((!arg.is_empty()).then(|| arg.to_string())),
        "pick" if !arg.is_empty() => Command::Pick(arg.to_string()),
        "suggest" => match arg.parse::<usize>() {
            Ok(n) if n >= 1 => Command::Suggest(n - 1),
            _ => Command::Unknown(line.to_string()),
        },
        "status" => Command::Status,
        "test" => Command::Test,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Prints notifications inline, above the prompt.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        println!("{}", format_notification(&notification));
    }
}

pub fn format_notification(notification: &Notification) -> String {
    let marker = match notification.severity {
        Severity::Info => "[i]",
        Severity::Destructive => "[!]",
    };
    format!("{marker} {}: {}", notification.title, notification.description)
}

fn format_message_timestamp(timestamp: OffsetDateTime) -> String {
    let mut datetime = timestamp;
    if let Ok(offset) = UtcOffset::current_local_offset() {
        datetime = datetime.to_offset(offset);
    }
    datetime.format(MESSAGE_TIME_FORMAT).unwrap_or_default()
}

pub fn format_message(message: &Message) -> String {
    let speaker = if message.is_bot { "Assistant" } else { "You" };
    format!(
        "[{}] {speaker}: {}",
        format_message_timestamp(message.timestamp),
        message.text
    )
}

pub fn format_indicator(indicator: &LimitIndicator) -> String {
    let mut line = format!("-- {}", indicator.text);
    if indicator.low_remaining {
        line.push_str(" (low remaining questions)");
    }
    if indicator.cooldown_active {
        line.push_str(" (cooldown active)");
    }
    line
}

fn print_suggestions(session: &ChatSession) {
    let suggestions = session.suggestions();
    if suggestions.is_empty() {
        return;
    }
    println!("Try asking about:");
    for (index, question) in suggestions.iter().enumerate() {
        println!("  {}. {question}", index + 1);
    }
}

fn print_companies(directory: &CompanyDirectory, term: Option<&str>) {
    let matches = directory.search(term.unwrap_or(""));
    if matches.is_empty() {
        println!("No companies found.");
        return;
    }
    println!("Companies ({}):", matches.len());
    for company in matches {
        println!("  {company} [{}]", categorize(company));
    }
    println!("Use /pick <name> to ask about a company.");
}

fn start_connection_check(client: Arc<QueryClient>, checks: &mpsc::Sender<Notification>) -> JoinHandle<()> {
    let checks = checks.clone();
    tokio::spawn(async move {
        if checks.send(client.probe().await).await.is_err() {
            debug!("session closed before the connection check finished");
        }
    })
}

fn start_question(session: &mut ChatSession, text: &str, replies: &mpsc::Sender<Reply>) {
    match session.begin(text) {
        Ok(pending) => {
            if let Some(message) = session.messages().last() {
                println!("{}", format_message(message));
            }
            println!("Thinking...");
            let client = session.client();
            let replies = replies.clone();
            tokio::spawn(async move {
                let reply = client.ask(&pending.query).await;
                if replies.send(reply).await.is_err() {
                    debug!("session closed before the reply arrived");
                }
            });
        }
        Err(Refusal::InFlight) => println!("Still waiting for the previous answer."),
        Err(Refusal::Empty) | Err(Refusal::RateLimited(_)) => {}
    }
}

pub async fn run(mut session: ChatSession, directory: CompanyDirectory) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(1);
    let (probe_tx, mut probe_rx) = mpsc::channel::<Notification>(1);

    for message in session.messages() {
        println!("{}", format_message(message));
    }
    print_suggestions(&session);
    let mut last_indicator = session.indicator();
    println!("{}", format_indicator(&last_indicator));
    println!("Type /help for commands.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read from stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    Command::Ask(text) => start_question(&mut session, &text, &reply_tx),
                    Command::SendInput => {
                        let text = session.input().to_string();
                        start_question(&mut session, &text, &reply_tx);
                    }
                    Command::Companies(term) => print_companies(&directory, term.as_deref()),
                    Command::Pick(name) => {
                        match directory.find(&name) {
                            Some(company) => {
                                session.select_company(company);
                                println!("> {}", session.input());
                                println!("Press Enter to send it, or type your own question.");
                            }
                            None => println!("No single company matches '{name}'."),
                        }
                    }
                    Command::Suggest(index) => {
                        if session.choose_suggestion(index) {
                            println!("> {}", session.input());
                            println!("Press Enter to send it, or type your own question.");
                        } else {
                            println!("No such suggestion.");
                        }
                    }
                    Command::Status => println!("{}", format_indicator(&session.indicator())),
                    Command::Test => {
                        println!("Testing API connection...");
                        start_connection_check(session.client(), &probe_tx);
                    }
                    Command::Help => println!("{HELP}"),
                    Command::Quit => break,
                    Command::Unknown(raw) => println!("Unknown command: {raw} (try /help)"),
                }
            }
            Some(reply) = reply_rx.recv() => {
                let message = session.finish(reply);
                println!("{}", format_message(&message));
            }
            Some(notification) = probe_rx.recv() => {
                TerminalNotifier.notify(notification);
            }
            _ = ticker.tick() => {
                session.refresh();
                let indicator = session.indicator();
                if indicator != last_indicator {
                    println!("{}", format_indicator(&indicator));
                    last_indicator = indicator;
                }
            }
        }
    }

    Ok(())
}

/// Shared notifier handle for wiring a session to the terminal.
pub fn terminal_notifier() -> Arc<dyn Notifier> {
    Arc::new(TerminalNotifier)
}
