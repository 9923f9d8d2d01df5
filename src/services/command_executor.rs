use anyhow::Result;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use tokio::process::Command;

/// Trait for executing system commands - allows for mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
        }
    }
}

/// Real implementation that executes actual system commands
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(CommandOutput::from(output))
    }
}

pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock implementation for testing
    #[derive(Clone, Default)]
    pub struct MockCommandExecutor {
        responses: Arc<Mutex<Vec<MockResponse>>>,
        missing_programs: Arc<Mutex<Vec<String>>>,
        call_history: Arc<Mutex<Vec<MockCall>>>,
    }

    #[derive(Debug, Clone)]
    pub struct MockResponse {
        pub program: String,
        pub args_contains: Vec<String>,
        pub stdout: String,
        pub stderr: String,
        pub success: bool,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct MockCall {
        pub program: String,
        pub args: Vec<String>,
    }

    impl MockCommandExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_response(
            &self,
            program: &str,
            args_contains: Vec<&str>,
            stdout: &str,
            stderr: &str,
            success: bool,
        ) {
            self.responses.lock().unwrap().push(MockResponse {
                program: program.to_string(),
                args_contains: args_contains.iter().map(|s| s.to_string()).collect(),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                success,
            });
        }

        /// Makes spawning `program` fail as if it were not installed.
        pub fn remove_program(&self, program: &str) {
            self.missing_programs
                .lock()
                .unwrap()
                .push(program.to_string());
        }

        pub fn get_call_history(&self) -> Vec<MockCall> {
            self.call_history.lock().unwrap().clone()
        }

        pub fn calls_to(&self, program: &str) -> usize {
            self.call_history
                .lock()
                .unwrap()
                .iter()
                .filter(|call| call.program == program)
                .count()
        }

        pub fn assert_called_with(&self, program: &str, args_contains: &[&str]) -> bool {
            let history = self.call_history.lock().unwrap();
            history.iter().any(|call| {
                call.program == program
                    && args_contains
                        .iter()
                        .all(|arg| call.args.iter().any(|a| a.contains(arg)))
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.call_history.lock().unwrap().push(MockCall {
                program: program.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
            });

            if self
                .missing_programs
                .lock()
                .unwrap()
                .iter()
                .any(|missing| missing == program)
            {
                return Err(anyhow::anyhow!("No such file or directory: {}", program));
            }

            let response = {
                let responses = self.responses.lock().unwrap();
                responses
                    .iter()
                    .find(|r| {
                        r.program == program
                            && r.args_contains
                                .iter()
                                .all(|arg| args.iter().any(|a| a.contains(arg.as_str())))
                    })
                    .cloned()
            };

            Ok(match response {
                Some(resp) => CommandOutput {
                    stdout: resp.stdout,
                    stderr: resp.stderr,
                    success: resp.success,
                    exit_code: Some(if resp.success { 0 } else { 1 }),
                },
                // Unconfigured commands succeed silently
                None => CommandOutput {
                    stdout: String::new(),
                    stderr: String::new(),
                    success: true,
                    exit_code: Some(0),
                },
            })
        }
    }
}
