use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use warden_core::{ActionKind, ActionRequest, CapabilityHandler, HandlerOutput, WardenError};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const STDOUT_LIMIT_CHARS: usize = 10_000;
const STDERR_LIMIT_CHARS: usize = 5_000;

/// Shell handler covering `run_command` and `install_package`.
///
/// Commands run through `sh -c` with stdin nulled, so interactive commands
/// fail fast instead of hanging a dispatch task.
pub struct ShellCapability {
    package_manager: String,
}

impl ShellCapability {
    pub fn new() -> Self {
        Self::with_package_manager("pip install")
    }

    pub fn with_package_manager(prefix: &str) -> Self {
        Self {
            package_manager: prefix.to_string(),
        }
    }

    async fn run(&self, request: &ActionRequest, command: &str) -> warden_core::Result<HandlerOutput> {
        let timeout_secs = request.params["timeout_secs"]
            .as_u64()
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let working_dir = request.params["working_dir"].as_str();

        info!(command = command, timeout_secs = timeout_secs, "executing shell command");

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd.stdin(std::process::Stdio::null());
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let output =
            tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output())
                .await
                .map_err(|_| WardenError::Handler {
                    kind: request.kind,
                    reason: format!("command timed out after {timeout_secs}s"),
                })?
                .map_err(|e| WardenError::Handler {
                    kind: request.kind,
                    reason: e.to_string(),
                })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        if !output.status.success() {
            return Err(WardenError::Handler {
                kind: request.kind,
                reason: format!(
                    "exit code {}: {}",
                    exit_code,
                    stderr.chars().take(STDERR_LIMIT_CHARS).collect::<String>()
                ),
            });
        }

        Ok(HandlerOutput::text(format!(
            "Exit code: {}\n\nSTDOUT:\n{}\n\nSTDERR:\n{}",
            exit_code,
            stdout.chars().take(STDOUT_LIMIT_CHARS).collect::<String>(),
            stderr.chars().take(STDERR_LIMIT_CHARS).collect::<String>(),
        ))
        .with_data(json!({ "exit_code": exit_code })))
    }

    fn install_command(&self, request: &ActionRequest) -> warden_core::Result<String> {
        let package = request.params["package"]
            .as_str()
            .ok_or_else(|| WardenError::Handler {
                kind: request.kind,
                reason: "missing 'package' parameter".into(),
            })?;
        // Package names never need shell metacharacters; reject anything
        // that could smuggle a second command past the policy tier.
        let clean = package
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.@/:=^~<>".contains(c));
        if package.is_empty() || !clean {
            return Err(WardenError::Handler {
                kind: request.kind,
                reason: format!("invalid package name '{package}'"),
            });
        }
        Ok(format!("{} {}", self.package_manager, package))
    }
}

impl Default for ShellCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityHandler for ShellCapability {
    fn name(&self) -> &str {
        "shell"
    }

    async fn execute(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        match request.kind {
            ActionKind::RunCommand => {
                let command =
                    request.params["command"]
                        .as_str()
                        .ok_or_else(|| WardenError::Handler {
                            kind: request.kind,
                            reason: "missing 'command' parameter".into(),
                        })?;
                self.run(request, command).await
            }
            ActionKind::InstallPackage => {
                let command = self.install_command(request)?;
                self.run(request, &command).await
            }
            other => Err(WardenError::Handler {
                kind: other,
                reason: "shell capability cannot handle this kind".into(),
            }),
        }
    }
}
