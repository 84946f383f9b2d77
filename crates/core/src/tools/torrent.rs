//! Torrent packaging via mktorrent.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::pipeline::{ToolError, TorrentPackager};

use super::command::{run_shell, sh_quote};

/// Builds a private torrent for a transcoded release with `mktorrent`.
pub struct MktorrentPackager;

fn mktorrent_command(
    content_dir: &Path,
    torrent_file: &Path,
    announce_url: &str,
    piece_length: u32,
) -> String {
    format!(
        "mktorrent -l {piece_length} -p -a {} -o {} {}",
        sh_quote(announce_url),
        sh_quote(torrent_file.to_string_lossy()),
        sh_quote(content_dir.to_string_lossy())
    )
}

#[async_trait]
impl TorrentPackager for MktorrentPackager {
    async fn package(
        &self,
        content_dir: &Path,
        work_dir: &Path,
        announce_url: &str,
        piece_length: u32,
    ) -> Result<PathBuf, ToolError> {
        let name = content_dir
            .file_name()
            .ok_or_else(|| ToolError::Failed("release directory has no name".to_string()))?;
        let mut torrent_file = work_dir.join(name);
        torrent_file.set_extension("torrent");

        let command = mktorrent_command(content_dir, &torrent_file, announce_url, piece_length);
        if run_shell(&command, None).await.is_none() {
            return Err(ToolError::Failed(format!(
                "mktorrent failed for {}",
                content_dir.display()
            )));
        }
        if !torrent_file.exists() {
            return Err(ToolError::Failed(format!(
                "mktorrent produced no file at {}",
                torrent_file.display()
            )));
        }
        Ok(torrent_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_shape() {
        let command = mktorrent_command(
            Path::new("/out/Artist - Album [2001] (CD - V0)"),
            Path::new("/tmp/work/Artist - Album [2001] (CD - V0).torrent"),
            "https://flacsfor.me/abc123/announce",
            18,
        );
        assert!(command.starts_with("mktorrent -l 18 -p -a "));
        assert!(command.contains("'https://flacsfor.me/abc123/announce'"));
        assert!(command.contains("'/out/Artist - Album [2001] (CD - V0)'"));
    }
}
