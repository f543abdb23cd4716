//! Session Driver
//!
//! Runs an [`Agent`] against a line-oriented input and a byte output: one
//! utterance per line, answers typed out chunk by chunk.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::reasoning::{Agent, OutputSink};

/// True for the command that ends a session
pub fn is_exit_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case("exit")
}

/// Text the driver writes around the conversation
#[derive(Clone, Debug)]
pub struct DriverMessages {
    pub greeting: Vec<String>,
    pub user_prompt: String,
    pub assistant_prefix: String,
    pub farewell: String,
}

impl Default for DriverMessages {
    fn default() -> Self {
        Self {
            greeting: vec![
                "Welcome to the AI Agent Calculator! Type 'exit' to quit.".into(),
                "You can ask me to perform calculations for you or chat with me.".into(),
            ],
            user_prompt: "\nYou: ".into(),
            assistant_prefix: "\nAssistant: ".into(),
            farewell: "Goodbye!".into(),
        }
    }
}

/// Why the driver stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The user typed `exit`
    ExitCommand,
    /// Input reached end of file
    EndOfInput,
    /// A fatal error closed the session
    Fatal,
}

/// Summary returned by [`SessionDriver::run`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reason: ExitReason,
    /// Utterances that produced an answer
    pub answers: usize,
}

/// Writes chunks straight through to a writer, flushing each one
pub struct WriterSink<'a, W> {
    writer: &'a mut W,
}

impl<'a, W> WriterSink<'a, W> {
    pub const fn new(writer: &'a mut W) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl<W> OutputSink for WriterSink<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_chunk(&mut self, chunk: &str) -> Result<()> {
        self.writer.write_all(chunk.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn end_answer(&mut self) -> Result<()> {
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Feeds lines from `input` to an [`Agent`] and types answers to `output`
pub struct SessionDriver<R, W> {
    agent: Agent,
    input: R,
    output: W,
    messages: DriverMessages,
}

impl<R, W> SessionDriver<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(agent: Agent, input: R, output: W) -> Self {
        Self {
            agent,
            input,
            output,
            messages: DriverMessages::default(),
        }
    }

    #[must_use]
    pub fn with_messages(mut self, messages: DriverMessages) -> Self {
        self.messages = messages;
        self
    }

    pub const fn agent(&self) -> &Agent {
        &self.agent
    }

    pub const fn output(&self) -> &W {
        &self.output
    }

    pub fn into_parts(self) -> (Agent, R, W) {
        (self.agent, self.input, self.output)
    }

    async fn write(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Run until `exit`, end of input, or a fatal error
    ///
    /// Only I/O failures on the driver's own streams are returned as errors;
    /// model and tool failures are reported to the user in-band.
    pub async fn run(&mut self) -> Result<SessionOutcome> {
        tracing::info!(session = %self.agent.session().id, "Session started");

        let greeting = self.messages.greeting.join("\n");
        if !greeting.is_empty() {
            self.write(&format!("{greeting}\n")).await?;
        }

        let mut answers = 0;
        let mut line = String::new();

        let reason = loop {
            let prompt = self.messages.user_prompt.clone();
            self.write(&prompt).await?;

            line.clear();
            if self.input.read_line(&mut line).await? == 0 {
                self.agent.close();
                break ExitReason::EndOfInput;
            }

            if is_exit_command(&line) {
                self.agent.close();
                let farewell = format!("{}\n", self.messages.farewell);
                self.write(&farewell).await?;
                break ExitReason::ExitCommand;
            }

            let utterance = line.trim_end_matches(['\n', '\r']);

            let prefix = self.messages.assistant_prefix.clone();
            self.write(&prefix).await?;

            let mut sink = WriterSink::new(&mut self.output);
            match self.agent.handle_input(utterance, &mut sink).await {
                Ok(_) => answers += 1,
                Err(e) => {
                    let fatal = e.is_fatal();
                    self.write(&format!("\n{}\n", e.user_message())).await?;
                    if fatal {
                        break ExitReason::Fatal;
                    }
                }
            }
        };

        tracing::info!(?reason, answers, "Session ended");
        Ok(SessionOutcome { reason, answers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::message::Role;
    use crate::reasoning::{AgentBuilder, LoopState};
    use crate::test_support::{ScriptedProvider, answer, calculator_call, calls};
    use crate::tool::{CalculatorTool, ToolRegistry};
    use std::sync::Arc;

    fn agent(provider: Arc<ScriptedProvider>) -> Agent {
        let mut tools = ToolRegistry::new();
        tools.register(CalculatorTool).unwrap();
        AgentBuilder::new()
            .provider(provider)
            .tools(tools)
            .build()
            .unwrap()
    }

    fn quiet() -> DriverMessages {
        DriverMessages {
            greeting: Vec::new(),
            user_prompt: "> ".into(),
            assistant_prefix: String::new(),
            farewell: "bye".into(),
        }
    }

    async fn drive(
        provider: Arc<ScriptedProvider>,
        input: &'static str,
    ) -> (SessionOutcome, Agent, String) {
        let mut driver = SessionDriver::new(agent(provider), input.as_bytes(), Vec::new())
            .with_messages(quiet());
        let outcome = driver.run().await.unwrap();
        let (agent, _, output) = driver.into_parts();
        (outcome, agent, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_exit_detection() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  EXIT \n"));
        assert!(is_exit_command("Exit\r\n"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("quit"));
    }

    #[tokio::test]
    async fn test_exit_closes_without_querying() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer("unused")]));

        let (outcome, agent, output) = drive(provider.clone(), "  ExIt  \n").await;

        assert_eq!(outcome.reason, ExitReason::ExitCommand);
        assert_eq!(agent.state(), LoopState::Closed);
        assert_eq!(provider.query_count(), 0);
        assert_eq!(output, "> bye\n");
    }

    #[tokio::test]
    async fn test_answers_are_typed_then_newline() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            calls(vec![calculator_call("c1", 2, 3)]),
            answer("The sum is 5."),
        ]));

        let (outcome, agent, output) = drive(provider, "what is 2 + 3?\nexit\n").await;

        assert_eq!(
            outcome,
            SessionOutcome {
                reason: ExitReason::ExitCommand,
                answers: 1,
            }
        );
        assert_eq!(output, "> The sum is 5.\n> bye\n");
        assert_eq!(agent.conversation().turns()[0].content, "what is 2 + 3?");
    }

    #[tokio::test]
    async fn test_input_forwarded_verbatim() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer("ok")]));

        let (_, agent, _) = drive(provider, "  Exit the loop, please  \r\n").await;

        assert_eq!(
            agent.conversation().turns()[0].content,
            "  Exit the loop, please  "
        );
    }

    #[tokio::test]
    async fn test_blank_lines_forwarded_and_end_of_input() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            answer("Ask me anything."),
            answer("Still listening."),
            answer("hi"),
        ]));

        let (outcome, agent, output) = drive(provider.clone(), "\n   \nhello").await;

        assert_eq!(outcome.reason, ExitReason::EndOfInput);
        assert_eq!(outcome.answers, 3);
        assert_eq!(provider.query_count(), 3);
        assert!(agent.is_closed());
        assert_eq!(output, "> Ask me anything.\n> Still listening.\n> hi\n> ");

        let utterances: Vec<&str> = agent
            .conversation()
            .turns()
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(utterances, ["", "   ", "hello"]);
    }

    #[tokio::test]
    async fn test_recoverable_error_reported_and_session_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(AgentError::ModelUnavailable("timeout".into())),
            answer("second try worked"),
        ]));

        let (outcome, agent, output) = drive(provider, "first\nsecond\nexit\n").await;

        assert_eq!(outcome.answers, 1);
        assert!(output.contains("currently unavailable"));
        assert!(output.contains("second try worked\n"));
        let roles: Vec<Role> = agent.conversation().turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_driver() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(AgentError::ModelProtocol(
            "nonsense".into(),
        ))]));

        let (outcome, agent, output) = drive(provider.clone(), "hello\nagain\n").await;

        assert_eq!(outcome.reason, ExitReason::Fatal);
        assert!(agent.is_closed());
        assert_eq!(provider.query_count(), 1);
        assert!(output.contains("Ending the session"));
    }

    #[tokio::test]
    async fn test_default_greeting() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let mut driver = SessionDriver::new(agent(provider), "exit\n".as_bytes(), Vec::new());

        driver.run().await.unwrap();

        let output = String::from_utf8(driver.output().clone()).unwrap();
        assert!(output.starts_with("Welcome to the AI Agent Calculator! Type 'exit' to quit.\n"));
        assert!(output.ends_with("\nYou: Goodbye!\n"));
    }
}
