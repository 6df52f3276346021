//! Interactive terminal application
//!
//! A line-based REPL: plain input becomes a chat message, `/` input is a
//! command. Streamed replies render incrementally through the markdown
//! streamer; image and error replies are rendered whole once the session
//! finishes handling the message.

use crate::chat::Role;
use crate::onboarding::{OnboardingClient, OnboardingForm};
use crate::session::{Attachment, ChatSession, SessionEvent};
use crate::speech::{TranscribeError, Transcriber};
use crate::storage::Storage;
use crate::ui::{print_markdown, MarkdownStreamer};
use crate::utils::logger;
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

const HELP_TEXT: &str = "\
Commands:
  /new                start a new chat
  /chats              list saved chats
  /open <n>           switch to chat n (from /chats)
  /delete <n>         delete chat n
  /attach <file> [text]   send an image with an optional message
  /speak              dictate a message by voice
  /help               show this help
  /quit               exit
Anything else is sent as a chat message.";

pub struct App {
    session: ChatSession,
    storage: Storage,
    onboarding: OnboardingClient,
    transcriber: Option<Box<dyn Transcriber>>,
}

impl App {
    pub fn new(
        session: ChatSession,
        storage: Storage,
        onboarding: OnboardingClient,
        transcriber: Option<Box<dyn Transcriber>>,
    ) -> Self {
        Self {
            session,
            storage,
            onboarding,
            transcriber,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        self.print_banner();
        if !self.storage.welcome_submitted() {
            self.run_onboarding().await;
        }

        loop {
            let Some(line) = read_line(&prompt())? else {
                break;
            };
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix('/') {
                if !self.handle_command(command).await? {
                    break;
                }
            } else {
                self.send(&line, None).await;
            }
        }

        println!("{}", style("Goodbye!").dim());
        Ok(())
    }

    fn print_banner(&self) {
        println!();
        println!("{}", style("Glimpse").green().bold());
        println!(
            "{}",
            style("Chat with an AI that can also show you photos. /help for commands.").dim()
        );
        println!();
    }

    /// Returns false when the app should exit
    async fn handle_command(&mut self, command: &str) -> Result<bool> {
        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match name {
            "help" => println!("{}", HELP_TEXT),
            "quit" | "exit" => return Ok(false),
            "new" => {
                let conv = self.session.new_chat();
                println!("{}", style(format!("Started \"{}\"", conv.title)).dim());
            }
            "chats" => self.list_chats(),
            "open" => match self.resolve_chat(rest) {
                Some(id) => {
                    self.session.open(&id);
                    let title = self.session.active().map(|c| c.title.clone()).unwrap_or_default();
                    println!("{}", style(format!("Switched to \"{}\"", title)).dim());
                    self.print_transcript();
                }
                None => println!("{}", style("No such chat. See /chats.").red()),
            },
            "delete" => self.delete_chat(rest)?,
            "attach" => {
                let mut args = rest.splitn(2, char::is_whitespace);
                let path = args.next().unwrap_or_default();
                let text = args.next().unwrap_or("What do you see in this image?").trim();
                if path.is_empty() {
                    println!("{}", style("Usage: /attach <file> [text]").red());
                } else {
                    match load_attachment(Path::new(path)) {
                        Ok(att) => self.send(text, Some(att)).await,
                        Err(e) => {
                            logger::warn(&format!("attachment failed: {}", e));
                            println!(
                                "{}",
                                style(format!("Cannot attach ({}); sending text only.", e))
                                    .yellow()
                            );
                            let noted = with_image_note(text, Path::new(path));
                            self.send(&noted, None).await;
                        }
                    }
                }
            }
            "speak" => self.speak().await,
            _ => println!("{}", style(format!("Unknown command /{}. Try /help.", name)).red()),
        }
        Ok(true)
    }

    fn list_chats(&self) {
        if self.session.conversations().is_empty() {
            println!("{}", style("No chats yet. Just start typing.").dim());
            return;
        }
        let active_id = self.session.active().map(|c| c.id.clone());
        for (idx, conv) in self.session.conversations().iter().enumerate() {
            let marker = if Some(&conv.id) == active_id.as_ref() { "*" } else { " " };
            println!(
                "{} {:>2}. {}  {}",
                marker,
                idx + 1,
                conv.title,
                style(format!(
                    "({} messages, {})",
                    conv.messages.len(),
                    conv.updated_at.format("%Y-%m-%d %H:%M")
                ))
                .dim()
            );
        }
    }

    /// Accepts a 1-based index from /chats or a conversation id
    fn resolve_chat(&self, arg: &str) -> Option<String> {
        if let Ok(idx) = arg.parse::<usize>() {
            return self
                .session
                .conversations()
                .get(idx.checked_sub(1)?)
                .map(|c| c.id.clone());
        }
        self.session
            .conversations()
            .iter()
            .find(|c| c.id == arg)
            .map(|c| c.id.clone())
    }

    fn delete_chat(&mut self, arg: &str) -> Result<()> {
        let Some(id) = self.resolve_chat(arg) else {
            println!("{}", style("No such chat. See /chats.").red());
            return Ok(());
        };
        let title = self
            .session
            .conversations()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.title.clone())
            .unwrap_or_default();

        let answer = read_line(&format!("Delete \"{}\"? [y/N] ", title))?.unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("y") {
            self.session.delete(&id);
            println!("{}", style("Deleted.").dim());
        }
        Ok(())
    }

    fn print_transcript(&self) {
        let Some(conv) = self.session.active() else {
            return;
        };
        for msg in &conv.messages {
            let stamp = style(msg.timestamp.format("%H:%M").to_string()).dim();
            match msg.role {
                Role::User => {
                    println!("{} {}  {}", style("you ❯").cyan().bold(), msg.content, stamp)
                }
                Role::Assistant => {
                    println!("{} {}", style("glimpse").green().bold(), stamp);
                    let _ = print_markdown(&msg.content);
                    println!();
                }
            }
        }
    }

    async fn speak(&mut self) {
        let Some(transcriber) = &self.transcriber else {
            println!(
                "{}",
                style("Voice input is not set up. Configure transcribe_command first.").red()
            );
            return;
        };
        println!("{}", style("Listening...").dim());
        match transcriber.transcribe() {
            Ok(text) => {
                println!("{} {}", style("you ❯").cyan().bold(), text);
                self.send(&text, None).await;
            }
            Err(TranscribeError::Unavailable) => {
                println!("{}", style("No transcription backend is available.").red())
            }
            Err(TranscribeError::Denied) => {
                println!("{}", style("Microphone access was denied.").red())
            }
            Err(TranscribeError::Failed(e)) => {
                println!("{}", style(format!("Transcription failed: {}", e)).red())
            }
        }
    }

    async fn send(&mut self, text: &str, attachment: Option<Attachment>) {
        let mut spinner: Option<ProgressBar> = None;
        let mut streamer = MarkdownStreamer::new();
        let mut streamed = false;

        self.session
            .send_message(text, attachment, |event| match event {
                SessionEvent::Status(message) => match &spinner {
                    Some(pb) => pb.set_message(message),
                    None => spinner = Some(make_spinner(message)),
                },
                SessionEvent::Chunk(chunk) => {
                    if let Some(pb) = spinner.take() {
                        pb.finish_and_clear();
                        println!();
                    }
                    streamed = true;
                    let _ = streamer.push(&chunk);
                }
            })
            .await;

        if let Some(pb) = spinner.take() {
            pb.finish_and_clear();
        }

        if streamed {
            let _ = streamer.finish();
            println!();
        } else if let Some(reply) = self
            .session
            .active()
            .and_then(|c| c.messages.last())
            .filter(|m| m.role == Role::Assistant)
        {
            println!();
            let _ = print_markdown(&reply.content);
            println!();
        }
    }

    /// First-run welcome form. The suppression flag is set only after the
    /// relay accepts the submission; skips and failed posts leave it unset,
    /// so the form is offered again next start.
    async fn run_onboarding(&mut self) {
        println!("{}", style("Welcome! A few quick questions (enter to skip).").bold());
        let name = read_line("Your name: ").ok().flatten().unwrap_or_default();
        let country = read_line("Country: ").ok().flatten().unwrap_or_default();
        let email = read_line("Email: ").ok().flatten().unwrap_or_default();

        let form = OnboardingForm {
            name: name.trim().to_string(),
            country: country.trim().to_string(),
            email: email.trim().to_string(),
        };
        if form.name.is_empty() && form.country.is_empty() && form.email.is_empty() {
            println!();
            return;
        }

        if !self.complete_onboarding(&form).await {
            println!(
                "{}",
                style("Could not send that right now; we'll ask again next time.").yellow()
            );
        }
        println!();
    }

    /// Submit the form; mark onboarding done only when it was accepted.
    async fn complete_onboarding(&mut self, form: &OnboardingForm) -> bool {
        match self.onboarding.submit(form).await {
            Ok(()) => {
                self.storage.set_welcome_submitted();
                true
            }
            Err(e) => {
                logger::warn(&format!("onboarding submission failed: {}", e));
                false
            }
        }
    }
}

fn prompt() -> String {
    format!("{} ", style("you ❯").cyan().bold())
}

/// Prompted line read; None on EOF
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin().lock().read_line(&mut line)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn make_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid spinner template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Keep the filename visible in the transcript when the image itself could
/// not be read
fn with_image_note(text: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image");
    format!("{}\n\n[Image: {}]", text, name)
}

/// Read an image file into a base64 data URL attachment
fn load_attachment(path: &Path) -> Result<Attachment> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        other => bail!("unsupported image type \"{}\"", other),
    };

    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();

    Ok(Attachment {
        name,
        data_url: format!("data:{};base64,{}", mime, BASE64.encode(bytes)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CompletionClient, ImageSearchClient};
    use crate::session::ChatSession;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(dir: &TempDir, onboarding_endpoint: String) -> App {
        let completion = CompletionClient::new("http://127.0.0.1:9/unused", "key");
        let images = ImageSearchClient::new("http://127.0.0.1:9/unused", "key");
        let session = ChatSession::new(completion, images, Storage::new(dir.path()), "test/model");
        App::new(
            session,
            Storage::new(dir.path()),
            OnboardingClient::new(Some(onboarding_endpoint)),
            None,
        )
    }

    fn sample_form() -> OnboardingForm {
        OnboardingForm {
            name: "Dana".to_string(),
            country: "Jordan".to_string(),
            email: "dana@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rejected_onboarding_leaves_flag_unset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/welcome"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir, format!("{}/welcome", server.uri()));
        assert!(!app.complete_onboarding(&sample_form()).await);
        assert!(!app.storage.welcome_submitted());
    }

    #[tokio::test]
    async fn test_accepted_onboarding_sets_flag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/welcome"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir, format!("{}/welcome", server.uri()));
        assert!(app.complete_onboarding(&sample_form()).await);
        assert!(app.storage.welcome_submitted());
    }

    #[test]
    fn test_image_note_survives_a_failed_attachment() {
        let noted = with_image_note("look at this", Path::new("/tmp/garden.png"));
        assert_eq!(noted, "look at this\n\n[Image: garden.png]");

        let bad = Path::new("/nope/missing.png");
        assert!(load_attachment(bad).is_err());
        assert!(with_image_note("hi", bad).contains("[Image: missing.png]"));
    }

    #[test]
    fn test_load_attachment_builds_data_url() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, [0x89, 0x50, 0x4e, 0x47]).unwrap();

        let att = load_attachment(&path).unwrap();
        assert_eq!(att.name, "pic.png");
        assert!(att.data_url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_load_attachment_rejects_unknown_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();
        assert!(load_attachment(&path).is_err());
    }
}
