//! External process runner shared by the recognition and normalisation
//! adapters.
//!
//! Tools run through `tokio::process::Command` with `kill_on_drop(true)`, so
//! a timed-out or cancelled invocation never leaves an orphaned process
//! behind. Exit status is the contract: anything but success becomes
//! [`PipelineError::ToolFailed`] with the tail of stderr attached.

use crate::error::PipelineError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Lines of stderr kept in a [`PipelineError::ToolFailed`] message.
const STDERR_TAIL_LINES: usize = 5;

/// Display name for a tool binary (`/usr/bin/gs` → `gs`).
pub fn tool_name(binary: &Path) -> String {
    binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| binary.display().to_string())
}

/// Run `binary` with `args`, waiting at most `timeout`.
pub async fn run_tool(binary: &Path, args: &[OsString], timeout: Option<Duration>) -> Result<(), PipelineError> {
    let tool = tool_name(binary);
    debug!("Running {} {:?}", binary.display(), args);

    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PipelineError::ToolNotFound {
                tool: tool.clone(),
                hint: install_hint(&tool),
            }
        } else {
            PipelineError::io(binary, e)
        }
    })?;

    let wait = child.wait_with_output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| PipelineError::ToolTimedOut {
                tool: tool.clone(),
                secs: limit.as_secs(),
            })?,
        None => wait.await,
    }
    .map_err(|e| PipelineError::io(binary, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        return Err(PipelineError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: tail,
        });
    }
    Ok(())
}

/// Resolve `binary` on `PATH` (or as a path), failing with an install hint.
pub fn require_tool(binary: &Path) -> Result<PathBuf, PipelineError> {
    which::which(binary).map_err(|_| {
        let tool = tool_name(binary);
        PipelineError::ToolNotFound {
            hint: install_hint(&tool),
            tool,
        }
    })
}

fn install_hint(tool: &str) -> String {
    match tool {
        "ocrmypdf" => "Install it with `pip install ocrmypdf` or your package manager \
                       (apt install ocrmypdf, brew install ocrmypdf), plus the tesseract \
                       language packs you need."
            .into(),
        "gs" | "gswin64c" | "gswin32c" => "Install Ghostscript (apt install ghostscript, \
                                           brew install ghostscript)."
            .into(),
        other => format!("Install '{}' or add it to PATH.", other),
    }
}
