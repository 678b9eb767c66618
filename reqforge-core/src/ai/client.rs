//! Text generation clients
//!
//! The oracle is any service that turns a prompt into text. Two transports
//! are provided: the Claude CLI in `--print` mode and an HTTP adapter
//! service. Every call made by the analysis and refinement paths goes
//! through [`call_with_deadline`] so that a slow or hung oracle can never
//! stall the caller.

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while talking to the oracle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleError {
    #[error("Oracle integration not available")]
    NotAvailable,

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Oracle call was cancelled")]
    Cancelled,

    #[error("Claude CLI execution failed: {0}")]
    ExecFailed(String),

    #[error("Oracle request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response from oracle: {0}")]
    InvalidResponse(String),
}

/// Knobs forwarded to the generator with every request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.3,
            max_tokens: 1024,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Anything that can turn a prompt into text
pub trait TextGenerator: Send + Sync {
    /// Short description for logs and status output
    fn describe(&self) -> String;

    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        settings: &GenerationSettings,
    ) -> Result<String, OracleError>;
}

/// Run `generator` on a worker thread, giving up at the deadline or on cancellation
///
/// The worker is detached when the caller gives up; its eventual result is
/// discarded.
pub fn call_with_deadline(
    generator: Arc<dyn TextGenerator>,
    prompt: String,
    system_prompt: Option<String>,
    settings: GenerationSettings,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<String, OracleError> {
    let deadline = settings.timeout;
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("reqforge-oracle".into())
        .spawn(move || {
            let result = generator.generate(&prompt, system_prompt.as_deref(), &settings);
            // The receiver is gone if the caller already gave up
            let _ = tx.send(result);
        })
        .map_err(|e| OracleError::ExecFailed(format!("Failed to spawn oracle worker: {}", e)))?;

    let start = Instant::now();
    let slice = Duration::from_millis(25);
    loop {
        if cancel.as_ref().map_or(false, |c| c.load(Ordering::SeqCst)) {
            return Err(OracleError::Cancelled);
        }
        let remaining = match deadline.checked_sub(start.elapsed()) {
            Some(remaining) if !remaining.is_zero() => remaining,
            _ => return Err(OracleError::Timeout(deadline)),
        };
        match rx.recv_timeout(remaining.min(slice)) {
            Ok(result) => return result,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(OracleError::ExecFailed("Oracle worker panicked".into()))
            }
        }
    }
}

/// Claude CLI in non-interactive `--print` mode
#[derive(Debug, Clone)]
pub struct ClaudeCliGenerator {
    path: PathBuf,
}

impl ClaudeCliGenerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Use the first `claude` executable found on this machine
    pub fn detect() -> Option<Self> {
        find_claude_cli().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TextGenerator for ClaudeCliGenerator {
    fn describe(&self) -> String {
        format!("Claude CLI ({})", self.path.display())
    }

    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        settings: &GenerationSettings,
    ) -> Result<String, OracleError> {
        let mut cmd = Command::new(&self.path);
        cmd.arg("--print");
        if let Some(model) = &settings.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(system) = system_prompt {
            cmd.arg("--append-system-prompt").arg(system);
        }
        let mut child = cmd
            .arg("-p")
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OracleError::ExecFailed(e.to_string()))?;

        // Drain the pipes on their own threads so a chatty child cannot block
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let start = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if start.elapsed() >= settings.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OracleError::Timeout(settings.timeout));
                }
                Ok(None) => thread::sleep(Duration::from_millis(50)),
                Err(e) => return Err(OracleError::ExecFailed(e.to_string())),
            }
        };

        let stdout = stdout.map(join_reader).unwrap_or_default();
        let stderr = stderr.map(join_reader).unwrap_or_default();

        if !status.success() {
            return Err(OracleError::ExecFailed(format!(
                "Exit code: {:?}, stderr: {}",
                status.code(),
                stderr.trim()
            )));
        }

        if stdout.trim().is_empty() {
            return Err(OracleError::InvalidResponse(
                "Empty response from CLI".to_string(),
            ));
        }

        debug!(bytes = stdout.len(), "Claude CLI responded");
        Ok(stdout)
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

/// Find the claude CLI executable
pub fn find_claude_cli() -> Option<PathBuf> {
    if let Ok(output) = Command::new("which").arg("claude").output() {
        if output.status.success() {
            let path_str = String::from_utf8_lossy(&output.stdout);
            let path = PathBuf::from(path_str.trim());
            if path.exists() {
                return Some(path);
            }
        }
    }

    for candidate in ["/usr/local/bin/claude", "/usr/bin/claude"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    let npm_global = dirs::home_dir()?.join(".npm-global/bin/claude");
    npm_global.exists().then_some(npm_global)
}

/// HTTP text generation adapter
///
/// Posts `{message, system_prompt, model, temperature, max_tokens}` to
/// `<base_url>/message` and reads `content` (or `message`) from the reply.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    base_url: String,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct MessageReply {
    content: Option<String>,
    message: Option<String>,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/message", self.base_url.trim_end_matches('/'))
    }
}

impl TextGenerator for HttpGenerator {
    fn describe(&self) -> String {
        format!("HTTP adapter ({})", self.base_url)
    }

    fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        settings: &GenerationSettings,
    ) -> Result<String, OracleError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| OracleError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        let body = MessageRequest {
            message: prompt,
            system_prompt,
            model: settings.model.as_deref(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };

        let response = client.post(self.endpoint()).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout(settings.timeout)
            } else {
                OracleError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::RequestFailed(format!("HTTP {}", status)));
        }

        let reply: MessageReply = response
            .json()
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        reply
            .content
            .or(reply.message)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| OracleError::InvalidResponse("Reply carried no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    impl TextGenerator for Canned {
        fn describe(&self) -> String {
            "canned".into()
        }

        fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _settings: &GenerationSettings,
        ) -> Result<String, OracleError> {
            Ok(self.0.to_string())
        }
    }

    struct Sleepy(Duration);

    impl TextGenerator for Sleepy {
        fn describe(&self) -> String {
            "sleepy".into()
        }

        fn generate(
            &self,
            _prompt: &str,
            _system_prompt: Option<&str>,
            _settings: &GenerationSettings,
        ) -> Result<String, OracleError> {
            thread::sleep(self.0);
            Ok("late".into())
        }
    }

    fn settings(timeout_ms: u64) -> GenerationSettings {
        GenerationSettings {
            timeout: Duration::from_millis(timeout_ms),
            ..Default::default()
        }
    }

    #[test]
    fn test_call_with_deadline_returns_reply() {
        let reply = call_with_deadline(Arc::new(Canned("hello")), "p".into(), None, settings(1000), None);
        assert_eq!(reply, Ok("hello".to_string()));
    }

    #[test]
    fn test_call_with_deadline_times_out() {
        let start = Instant::now();
        let reply = call_with_deadline(
            Arc::new(Sleepy(Duration::from_secs(5))),
            "p".into(),
            None,
            settings(100),
            None,
        );
        assert_eq!(reply, Err(OracleError::Timeout(Duration::from_millis(100))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_call_with_deadline_cancelled() {
        let cancel = Arc::new(AtomicBool::new(true));
        let reply = call_with_deadline(
            Arc::new(Sleepy(Duration::from_secs(5))),
            "p".into(),
            None,
            settings(5000),
            Some(cancel),
        );
        assert_eq!(reply, Err(OracleError::Cancelled));
    }

    #[test]
    fn test_missing_cli_is_exec_failure() {
        let generator = ClaudeCliGenerator::new("/nonexistent/claude-cli");
        let result = generator.generate("hi", None, &settings(1000));
        assert!(matches!(result, Err(OracleError::ExecFailed(_))));
    }

    #[test]
    fn test_http_endpoint_joins_path() {
        assert_eq!(
            HttpGenerator::new("http://localhost:8080/").endpoint(),
            "http://localhost:8080/message"
        );
    }
}
