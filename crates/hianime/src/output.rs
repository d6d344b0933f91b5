//! JSON output for CLI commands.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Pretty-print `value` as JSON to `path`, or to stdout when `None`
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;

    match path {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
            info!(path = %path.display(), "Output written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write to stdout")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{StreamDescriptor, StreamLink};
    use tempfile::TempDir;

    #[test]
    fn test_write_json_to_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("stream.json");

        let descriptor = StreamDescriptor {
            id: "one-piece-100::ep=2142".to_string(),
            kind: "sub".to_string(),
            link: StreamLink {
                file: "https://cdn.example/master.m3u8".to_string(),
                link_type: "hls".to_string(),
            },
            tracks: Vec::new(),
            intro: None,
            outro: None,
            server: "HD-1".to_string(),
            iframe: None,
        };
        write_json(&descriptor, Some(&path))?;

        let written: StreamDescriptor = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(written, descriptor);
        Ok(())
    }

    #[test]
    fn test_write_json_to_missing_directory_fails() {
        let result = write_json(&serde_json::json!({}), Some(Path::new("/nonexistent/dir/out.json")));
        assert!(result.is_err());
    }
}
