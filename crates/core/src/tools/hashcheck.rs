//! Source integrity verification against the tracker's torrent file.

use std::path::Path;

use async_trait::async_trait;

use crate::pipeline::HashVerifier;

use super::command::{run_shell, sh_quote};

/// Runs the external `hashcheck` verifier. The check passes only when
/// every reported line is INFO-classed; any WARN or ERROR line means the
/// content does not match the torrent.
pub struct CommandHashVerifier {
    binary: String,
}

impl CommandHashVerifier {
    pub fn new() -> Self {
        Self {
            binary: "hashcheck".to_string(),
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for CommandHashVerifier {
    fn default() -> Self {
        Self::new()
    }
}

fn all_lines_info(output: &str) -> bool {
    let mut seen_any = false;
    for line in output.lines() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        seen_any = true;
        if first != "INFO" {
            return false;
        }
    }
    seen_any
}

#[async_trait]
impl HashVerifier for CommandHashVerifier {
    async fn verify(&self, torrent_file: &Path, content_dir: &Path) -> bool {
        let command = format!(
            "{} {} {}",
            self.binary,
            sh_quote(torrent_file.to_string_lossy()),
            sh_quote(content_dir.to_string_lossy())
        );
        match run_shell(&command, None).await {
            Some(output) => all_lines_info(&output),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_info_passes() {
        assert!(all_lines_info("INFO piece 1 ok\nINFO piece 2 ok\n"));
    }

    #[test]
    fn test_any_error_fails() {
        assert!(!all_lines_info("INFO piece 1 ok\nERROR piece 2 mismatch\n"));
    }

    #[test]
    fn test_empty_output_fails() {
        assert!(!all_lines_info(""));
        assert!(!all_lines_info("\n\n"));
    }
}
