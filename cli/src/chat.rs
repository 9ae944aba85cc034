//! Interactive chat loop
//!
//! Each line is answered in its own task, so a panic inside a turn costs
//! that one answer and nothing else. Ctrl-C cancels the turn in progress;
//! at the prompt it leaves the loop.

use crate::app::App;
use crate::output::{format_status, format_summary};
use concierge_domain::{CallerIdentity, ConversationContext, Message};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Messages of prior exchanges sent along with each new one.
const MAX_HISTORY_MESSAGES: usize = 20;

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Message(String),
    Status,
    Reenable(String),
    Clear,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("quit" | "exit" | "q"), _) => Input::Quit,
        (Some("status"), _) => Input::Status,
        (Some("reenable"), Some(name)) => Input::Reenable(name.to_string()),
        (Some("clear"), _) => Input::Clear,
        (Some("help" | "h" | "?"), _) => Input::Help,
        _ => Input::Unknown(line.to_string()),
    }
}

pub struct ChatRepl<'a> {
    app: &'a App,
    caller: CallerIdentity,
    show_summary: bool,
    history: Vec<Message>,
}

impl<'a> ChatRepl<'a> {
    pub fn new(app: &'a App, caller: CallerIdentity) -> Self {
        Self {
            app,
            caller,
            show_summary: false,
            history: Vec::new(),
        }
    }

    pub fn with_summary(mut self, show: bool) -> Self {
        self.show_summary = show;
        self
    }

    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.print_welcome();

        loop {
            print!(">>> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            };
            let Some(line) = line else {
                println!("Bye!");
                break;
            };

            match parse_input(&line) {
                Input::Empty => {}
                Input::Message(text) => self.answer(text).await,
                Input::Status => print!("{}", format_status(&self.app.supervisor.status())),
                Input::Reenable(name) => {
                    if self.app.supervisor.reenable(&name) {
                        println!("Re-enabled {}", name);
                    } else {
                        println!("{} is not waiting to be re-enabled", name);
                    }
                }
                Input::Clear => {
                    self.history.clear();
                    println!("History cleared");
                }
                Input::Help => self.print_help(),
                Input::Quit => {
                    println!("Bye!");
                    break;
                }
                Input::Unknown(command) => {
                    println!("Unknown command: {} (try /help)", command);
                }
            }
        }
        Ok(())
    }

    async fn answer(&mut self, text: String) {
        let handler = self.app.handler.clone();
        let caller = self.caller.clone();
        let history = ConversationContext::from_messages(self.history.clone());
        let message = text.clone();
        let mut turn =
            tokio::spawn(async move { handler.handle(&history, &message, &caller).await });

        let output = tokio::select! {
            joined = &mut turn => joined,
            _ = tokio::signal::ctrl_c() => {
                turn.abort();
                println!("^C (cancelled)");
                return;
            }
        };

        match output {
            Ok(output) => {
                println!("{}", output.text);
                if self.show_summary {
                    println!("{}", format_summary(&output));
                }
                println!();
                self.remember(text, output.text);
            }
            Err(e) => {
                tracing::error!(error = %e, "Turn task failed");
                println!("Something went wrong answering that. Please try again.");
            }
        }
    }

    fn remember(&mut self, question: String, answer: String) {
        self.history.push(Message::user(question));
        self.history.push(Message::assistant(answer));
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }
    }

    fn print_welcome(&self) {
        println!();
        println!("concierge chat, answering as caller '{}'", self.caller);
        println!("Type /help for commands, /quit or Ctrl-D to leave.");
        println!();
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  /status           Show tool server states");
        println!("  /reenable <name>  Retry a server that gave up connecting");
        println!("  /clear            Forget the conversation so far");
        println!("  /quit             Leave");
    }
}
