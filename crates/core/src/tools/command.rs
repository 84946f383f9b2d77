//! Shell invocation helper shared by the tool adapters.

use std::path::Path;

use tokio::process::Command;
use tracing::{debug, warn};

/// Runs a shell pipeline and returns its combined output, or `None` on a
/// non-zero exit or spawn failure. Callers treat `None` as the tool
/// saying no.
pub async fn run_shell(command: &str, cwd: Option<&Path>) -> Option<String> {
    debug!("Running: {command}");
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = match cmd.output().await {
        Ok(output) => output,
        Err(e) => {
            warn!("Failed to spawn {command:?}: {e}");
            return None;
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    if !output.status.success() {
        debug!("Command exited with {}: {combined}", output.status);
        return None;
    }
    Some(combined)
}

/// Single-quotes a value for `sh -c`, escaping embedded quotes.
pub fn sh_quote(value: impl AsRef<str>) -> String {
    format!("'{}'", value.as_ref().replace('\'', r"'\''"))
}

/// Probes one property of an audio file via `soxi`. Flag is e.g. `-c`
/// (channels), `-b` (bits), `-r` (rate), `-D` (duration).
pub async fn soxi(flag: &str, file: &Path) -> Option<String> {
    let output = run_shell(
        &format!("soxi {flag} {}", sh_quote(file.to_string_lossy())),
        None,
    )
    .await?;
    let value = output.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sh_quote_plain() {
        assert_eq!(sh_quote("abc"), "'abc'");
    }

    #[test]
    fn test_sh_quote_embedded_quote() {
        assert_eq!(sh_quote("it's"), r"'it'\''s'");
    }

    #[tokio::test]
    async fn test_run_shell_captures_output() {
        let output = run_shell("printf hello", None).await.unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn test_run_shell_nonzero_exit_is_none() {
        assert!(run_shell("exit 3", None).await.is_none());
    }

    #[tokio::test]
    async fn test_run_shell_respects_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = run_shell("pwd", Some(dir.path())).await.unwrap();
        assert_eq!(
            std::path::Path::new(output.trim()).file_name(),
            dir.path().file_name()
        );
    }
}
