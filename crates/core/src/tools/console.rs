//! Blocking console implementation of the confirmation port.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::pipeline::Confirmer;

/// Prompts the operator on stdin/stdout. Reads run on the blocking pool
/// so the runtime stays responsive while waiting.
pub struct ConsoleConfirmer;

fn read_line_blocking(prompt: String) -> Option<String> {
    let mut stdout = std::io::stdout();
    let _ = write!(stdout, "{prompt}");
    let _ = stdout.flush();

    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}

async fn read_line(prompt: String) -> Option<String> {
    tokio::task::spawn_blocking(move || read_line_blocking(prompt))
        .await
        .ok()
        .flatten()
}

#[async_trait]
impl Confirmer for ConsoleConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        loop {
            let answer = match read_line(format!("{prompt} (y/n): ")).await {
                Some(answer) => answer.to_ascii_lowercase(),
                // Closed stdin counts as a refusal, not an endless loop.
                None => return false,
            };
            match answer.as_str() {
                "y" => return true,
                "n" => return false,
                _ => {}
            }
        }
    }

    async fn alternate_path(&self, missing: &Path) -> Option<PathBuf> {
        let wants_alternate = self
            .confirm(&format!(
                "Could not find {}. Do you wish to provide an alternative path?",
                missing.display()
            ))
            .await;
        if !wants_alternate {
            return None;
        }
        let answer = read_line("Alternative path: ".to_string()).await?;
        if answer.is_empty() {
            None
        } else {
            Some(PathBuf::from(answer))
        }
    }
}
