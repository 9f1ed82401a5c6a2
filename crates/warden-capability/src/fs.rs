use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use warden_core::{ActionKind, ActionRequest, CapabilityHandler, HandlerOutput, WardenError};

/// Longer file contents are truncated rather than flooding the producer.
const READ_LIMIT_CHARS: usize = 50_000;

/// Filesystem handler covering `read_file`, `write_file`, and
/// `delete_file`. Registered once under each kind.
pub struct FsCapability;

impl FsCapability {
    pub fn new() -> Self {
        Self
    }

    fn param<'a>(request: &'a ActionRequest, key: &str) -> warden_core::Result<&'a str> {
        request.params[key]
            .as_str()
            .ok_or_else(|| WardenError::Handler {
                kind: request.kind,
                reason: format!("missing '{key}' parameter"),
            })
    }

    async fn read(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        let path = Self::param(request, "path")?;
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| WardenError::Handler {
                    kind: request.kind,
                    reason: format!("reading {path}: {e}"),
                })?;
        Ok(HandlerOutput::text(
            content.chars().take(READ_LIMIT_CHARS).collect::<String>(),
        ))
    }

    async fn write(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        let path = Self::param(request, "path")?;
        let content = Self::param(request, "content")?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|e| WardenError::Handler {
                kind: request.kind,
                reason: format!("writing {path}: {e}"),
            })?;

        info!(path = path, bytes = content.len(), "wrote file");
        Ok(
            HandlerOutput::text(format!("wrote {} bytes to {}", content.len(), path))
                .with_data(json!({ "path": path, "bytes": content.len() })),
        )
    }

    async fn delete(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        let path = Self::param(request, "path")?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| WardenError::Handler {
                kind: request.kind,
                reason: format!("deleting {path}: {e}"),
            })?;
        info!(path = path, "deleted file");
        Ok(HandlerOutput::text(format!("deleted {path}")))
    }
}

impl Default for FsCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityHandler for FsCapability {
    fn name(&self) -> &str {
        "fs"
    }

    async fn execute(&self, request: &ActionRequest) -> warden_core::Result<HandlerOutput> {
        match request.kind {
            ActionKind::ReadFile => self.read(request).await,
            ActionKind::WriteFile => self.write(request).await,
            ActionKind::DeleteFile => self.delete(request).await,
            other => Err(WardenError::Handler {
                kind: other,
                reason: "fs capability cannot handle this kind".into(),
            }),
        }
    }
}
