//! [`ConsoleComponent`] – a line-oriented terminal adapter.
//!
//! Lets an operator talk to the bot without any chat network.  Each input
//! line becomes a `USER_MESSAGE` for the orchestrator, except for a few
//! slash-commands:
//!
//! | Command | Effect |
//! |---|---|
//! | `/arrive <location>` | sends `LOCATION_UPDATE { arrived: true }` |
//! | `/leave <location>` | sends `LOCATION_UPDATE { arrived: false }` |
//! | `/inject <json>` | decodes a raw `{sender, kind, payload}` envelope and forwards it |
//! | `/quit` | requests process shutdown |
//!
//! Replies addressed to the console are written to the output, one per line.
//! The reader and writer are generic so tests can drive the component with
//! in-memory streams.

use async_trait::async_trait;
use courier_bus::{Component, ComponentContext};
use courier_types::{CourierError, Envelope, Message};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Name the console registers under by default.
pub const CONSOLE: &str = "Console";

/// Terminal adapter component.
pub struct ConsoleComponent<R, W> {
    name: String,
    user: String,
    target: String,
    reader: R,
    writer: W,
    shutdown: Option<CancellationToken>,
}

impl<R, W> ConsoleComponent<R, W> {
    /// Console named [`CONSOLE`] speaking as `user` to the orchestrator
    /// registered as `target`.
    pub fn new(user: impl Into<String>, target: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            name: CONSOLE.to_string(),
            user: user.into(),
            target: target.into(),
            reader,
            writer,
            shutdown: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Token cancelled when the operator types `/quit`.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = Some(shutdown);
        self
    }
}

/// What to do after an input line.
enum LineOutcome {
    Continue,
    Notice(String),
    Quit,
}

fn handle_line(
    ctx: &ComponentContext,
    user: &str,
    target: &str,
    line: &str,
) -> Result<LineOutcome, CourierError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(LineOutcome::Continue);
    }
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match command {
        "/quit" | "/exit" => return Ok(LineOutcome::Quit),
        "/arrive" | "/leave" if rest.is_empty() => {
            return Ok(LineOutcome::Notice(format!("usage: {command} <location>")));
        }
        "/arrive" => ctx.send(target, Message::location_update(rest, true))?,
        "/leave" => ctx.send(target, Message::location_update(rest, false))?,
        "/inject" => match Envelope::from_json(rest) {
            Ok(envelope) => ctx.forward(target, envelope)?,
            Err(e) => return Ok(LineOutcome::Notice(format!("rejected: {e}"))),
        },
        _ => ctx.send(target, Message::user_message(user, line))?,
    }
    Ok(LineOutcome::Continue)
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[async_trait]
impl<R, W> Component for ConsoleComponent<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, mut ctx: ComponentContext) -> Result<(), CourierError> {
        let ConsoleComponent {
            user,
            target,
            reader,
            mut writer,
            shutdown,
            ..
        } = *self;
        let mut lines = reader.lines();
        let mut input_open = true;

        loop {
            let output = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                line = lines.next_line(), if input_open => match line {
                    Ok(Some(line)) => match handle_line(&ctx, &user, &target, &line) {
                        Ok(LineOutcome::Continue) => None,
                        Ok(LineOutcome::Notice(text)) => Some(text),
                        Ok(LineOutcome::Quit) => {
                            if let Some(token) = &shutdown {
                                token.cancel();
                            }
                            break;
                        }
                        Err(e) => Some(format!("error: {e}")),
                    },
                    Ok(None) => {
                        debug!("console input closed");
                        input_open = false;
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "console read failed");
                        input_open = false;
                        None
                    }
                },
                envelope = ctx.mailbox.receive() => match envelope {
                    Some(envelope) => match envelope.message() {
                        Message::UserMessage { text, .. } => Some(text.clone()),
                        other => {
                            debug!(kind = %other.kind(), "console ignoring envelope");
                            None
                        }
                    },
                    None => break,
                },
            };

            if let Some(text) = output
                && let Err(e) = write_line(&mut writer, &text).await
            {
                warn!(error = %e, "console write failed");
                break;
            }
        }
        Ok(())
    }
}
