//! Interactive terminal front end
//!
//! A thin surface over the client, the reconciler, and the playback driver:
//! reads lines, streams prose to stdout as it arrives, then renders the
//! structured extras (clarifications, retrieved context, optimized query)
//! once the stream settles.

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::{AssistantClient, ChatRequest, Rating};
use crate::config::Config;
use crate::conversation::{Conversation, Message, Role};
use crate::speech::{PlaybackDriver, SynthesisError, Synthesizer};
use crate::stream::Reconciler;

pub struct Console {
    config: Config,
    client: AssistantClient,
    conversation: Conversation,
    playback: PlaybackDriver,
    model: String,
    table: String,
    /// Options offered by the latest clarification set, selectable by number.
    pending_options: Vec<String>,
}

impl Console {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = AssistantClient::new(&config)?;
        let playback = PlaybackDriver::new(
            Arc::new(ConsoleSynthesizer),
            &config.speech_language,
            config.speech_chunk_size,
        );
        let model = config.model.clone();
        let table = config.table.clone();
        Ok(Self {
            config,
            client,
            conversation: Conversation::new(),
            playback,
            model,
            table,
            pending_options: Vec::new(),
        })
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.start_conversation();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        prompt();
        while let Some(line) = lines.next_line().await? {
            let input = line.trim().to_string();
            if input.is_empty() {
                prompt();
                continue;
            }

            if let Some(command) = input.strip_prefix(':') {
                if !self.handle_command(command).await {
                    break;
                }
            } else if let Some(option) = self.numbered_option(&input) {
                println!("▸ {option}");
                self.send(&option).await;
            } else {
                self.send(&input).await;
            }
            prompt();
        }
        self.playback.stop();
        Ok(())
    }

    fn start_conversation(&mut self) {
        self.playback.stop();
        self.conversation.reset();
        self.pending_options.clear();

        let greeting = greeting_for(&self.table);
        self.conversation.push(Message::bot(greeting));
        println!("{greeting}");
    }

    /// A bare number picks the matching clarification option.
    fn numbered_option(&self, input: &str) -> Option<String> {
        let choice: usize = input.parse().ok()?;
        self.pending_options.get(choice.checked_sub(1)?).cloned()
    }

    async fn send(&mut self, query: &str) {
        self.pending_options.clear();
        self.conversation.push_user(query);

        let request = ChatRequest {
            query: query.to_string(),
            model_id: self.model.clone(),
            conversation_id: self.conversation.id.to_string(),
            user_id: self.config.user_id.clone(),
            table_id: self.table.clone(),
        };

        let mut reconciler = Reconciler::begin(&mut self.conversation);

        let stream = match self.client.chat(&request).await {
            Ok(stream) => stream,
            Err(err) => {
                reconciler.apply_error(
                    &mut self.conversation,
                    &serde_json::Value::String(err.to_string()),
                );
                self.render_outcome(true);
                return;
            }
        };

        tokio::pin!(stream);
        let mut transport_error = false;
        while let Some(item) = stream.next().await {
            match item {
                Ok(event) => {
                    if let Some(prose) = reconciler.apply(&mut self.conversation, &event) {
                        print!("{prose}");
                        let _ = std::io::stdout().flush();
                    }
                    if reconciler.is_terminal() {
                        break;
                    }
                }
                Err(err) => {
                    reconciler.apply_error(
                        &mut self.conversation,
                        &serde_json::Value::String(err.to_string()),
                    );
                    transport_error = true;
                    break;
                }
            }
        }

        let terminal = reconciler.is_terminal();
        if !terminal {
            let leftover = reconciler.finish(&mut self.conversation);
            if !leftover.is_empty() {
                print!("{leftover}");
            }
        }
        println!();
        self.render_outcome(terminal || transport_error);
    }

    /// Render everything that arrived out-of-band once the stream settles.
    fn render_outcome(&mut self, terminal: bool) {
        let index = self.conversation.len().saturating_sub(1);
        let Some(message) = self.conversation.get(index) else {
            return;
        };

        if terminal {
            println!("{}", message.display);
            return;
        }

        if let Some(query) = &message.optimized_query {
            println!("  optimized query: {query}");
        }

        if !message.retrieved_context.is_empty() {
            println!("  reference documents:");
            for item in &message.retrieved_context {
                let name = if item.doc_name.is_empty() {
                    "unnamed document"
                } else {
                    &item.doc_name
                };
                println!("    - {name} (score {:.3})", item.score);
            }
        }

        if !message.clarifications.is_empty() {
            let mut options = Vec::new();
            for clarification in &message.clarifications {
                println!("  {}", clarification.question);
                for option in &clarification.options {
                    options.push(option.clone());
                    println!("    {}. {}", options.len(), option);
                }
            }
            println!("  (type a number to answer)");
            self.pending_options = options;
        }

        println!("  (#{index}: \":say {index}\" to hear it, \":good {index}\" / \":bad {index}\" to rate)");
    }

    /// Returns `false` when the console should exit.
    async fn handle_command(&mut self, command: &str) -> bool {
        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match name {
            "quit" | "q" => return false,
            "reset" => self.start_conversation(),
            "table" if !rest.is_empty() => {
                self.table = rest.to_string();
                self.start_conversation();
            }
            "model" if !rest.is_empty() => {
                self.model = rest.to_string();
                println!("model set to {}", self.model);
            }
            "models" => self.list_models().await,
            "good" => self.feedback(rest, Rating::Good).await,
            "bad" => self.feedback(rest, Rating::Bad).await,
            "say" => self.say(rest),
            "stop" => self.playback.stop(),
            "pause" => self.playback.set_hidden(true),
            "resume" => self.playback.set_hidden(false),
            _ => {
                println!(
                    "commands: :reset :table <name> :model <id> :models \
                     :good <n> [comment] :bad <n> [comment] :say <n> :stop \
                     :pause :resume :quit"
                );
            }
        }
        true
    }

    async fn list_models(&self) {
        match self.client.list_models().await {
            Ok(models) => {
                for model in models {
                    let current = if model.id == self.model { " *" } else { "" };
                    match (model.input_cost, model.output_cost) {
                        (Some(input), Some(output)) => println!(
                            "  {} - {} (in {input}/M, out {output}/M){current}",
                            model.id, model.name
                        ),
                        _ => println!("  {} - {}{current}", model.id, model.name),
                    }
                }
            }
            Err(err) => println!("could not fetch models: {err}"),
        }
    }

    async fn feedback(&mut self, rest: &str, rating: Rating) {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let index: usize = match parts.next().unwrap_or_default().parse() {
            Ok(index) => index,
            Err(_) => {
                println!("usage: :good <message#> [comment]");
                return;
            }
        };
        let comments = parts.next().unwrap_or_default().trim();

        let Some(message) = self.conversation.get(index).filter(|m| m.role == Role::Bot) else {
            println!("no bot message #{index}");
            return;
        };

        match self
            .client
            .submit_feedback(self.conversation.id, message.id, rating, comments)
            .await
        {
            Ok(()) => println!("feedback recorded for #{index}"),
            Err(err) => println!("feedback failed: {err}"),
        }
    }

    fn say(&mut self, rest: &str) {
        let Ok(index) = rest.parse::<usize>() else {
            println!("usage: :say <message#>");
            return;
        };
        let Some(message) = self.conversation.get(index).filter(|m| m.role == Role::Bot) else {
            println!("no bot message #{index}");
            return;
        };
        // Playback runs detached; :stop or a newer :say invalidates it.
        let _ = self.playback.play(index, &message.display);
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn greeting_for(table: &str) -> &'static str {
    match table {
        "dgca" => "How can I help you with DGCA regulations and aviation matters?",
        _ => "How can I help you with DigiYatra?",
    }
}

/// Stand-in synthesizer: prints each utterance and simulates its duration.
/// A platform voice backend plugs in through the same trait.
struct ConsoleSynthesizer;

#[async_trait]
impl Synthesizer for ConsoleSynthesizer {
    async fn speak(&self, text: &str, _language: &str) -> Result<(), SynthesisError> {
        println!("🔊 {text}");
        let words = text.split_whitespace().count() as u64;
        tokio::time::sleep(Duration::from_millis(200 + 40 * words)).await;
        Ok(())
    }

    fn cancel(&self) {
        tracing::debug!("synthesizer cancel");
    }

    fn pause(&self) {
        tracing::debug!("synthesizer pause");
    }

    fn resume(&self) {
        tracing::debug!("synthesizer resume");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_tracks_the_knowledge_table() {
        assert!(greeting_for("digiyatra").contains("DigiYatra"));
        assert!(greeting_for("dgca").contains("DGCA"));
        assert!(greeting_for("anything-else").contains("DigiYatra"));
    }
}
