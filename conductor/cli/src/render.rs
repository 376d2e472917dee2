//! Terminal surface
//!
//! Turns [`ConductorMessage`] updates into text on an async writer. Reply
//! text is written as it streams; the committed message only closes the line.

use chat_conductor::{ChatStatus, ConductorMessage, Message, MessageRole};
use tokio::io::{AsyncWrite, AsyncWriteExt};

const ASSISTANT: &str = "assistant> ";
const USER: &str = "you> ";

pub struct Renderer<W> {
    out: W,
    mid_reply: bool,
}

impl<W: AsyncWrite + Unpin> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_reply: false,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub async fn handle(&mut self, msg: &ConductorMessage) -> std::io::Result<()> {
        match msg {
            ConductorMessage::Delta { delta, .. } => {
                if !self.mid_reply {
                    self.out.write_all(ASSISTANT.as_bytes()).await?;
                    self.mid_reply = true;
                }
                self.out.write_all(delta.as_bytes()).await?;
            }
            ConductorMessage::Appended { message } if message.role == MessageRole::Assistant => {
                if self.mid_reply {
                    self.out.write_all(b"\n").await?;
                } else {
                    let line = format!("{ASSISTANT}{}\n", message.content);
                    self.out.write_all(line.as_bytes()).await?;
                }
                self.mid_reply = false;
            }
            ConductorMessage::Error { message } => {
                self.end_partial_line(" [failed]").await?;
                let line = format!("error: {message} (type /retry to try again)\n");
                self.out.write_all(line.as_bytes()).await?;
            }
            ConductorMessage::Status {
                status: ChatStatus::Idle,
            } => self.end_partial_line(" [stopped]").await?,
            ConductorMessage::Status {
                status: ChatStatus::Sending,
            } => self.end_partial_line(" [interrupted]").await?,
            ConductorMessage::Cleared => {
                self.end_partial_line(" [stopped]").await?;
                self.out.write_all(b"(conversation cleared)\n").await?;
            }
            _ => return Ok(()),
        }
        self.out.flush().await
    }

    /// Print a whole transcript
    pub async fn history(&mut self, messages: &[Message]) -> std::io::Result<()> {
        if messages.is_empty() {
            self.out.write_all(b"(no messages)\n").await?;
        }
        for message in messages {
            let prefix = match message.role {
                MessageRole::User => USER,
                MessageRole::Assistant => ASSISTANT,
            };
            let line = format!("{prefix}{}\n", message.content);
            self.out.write_all(line.as_bytes()).await?;
        }
        self.out.flush().await
    }

    /// Print free-form text
    pub async fn note(&mut self, text: &str) -> std::io::Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        if !text.ends_with('\n') {
            self.out.write_all(b"\n").await?;
        }
        self.out.flush().await
    }

    async fn end_partial_line(&mut self, marker: &str) -> std::io::Result<()> {
        if self.mid_reply {
            self.out.write_all(marker.as_bytes()).await?;
            self.out.write_all(b"\n").await?;
            self.mid_reply = false;
        }
        Ok(())
    }
}
