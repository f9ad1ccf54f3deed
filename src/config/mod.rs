pub mod paths;
pub mod settings;

use std::io::Write;
use std::path::Path;

pub use settings::{BridgeConfig, ConnectionConfig, DownloadConfig, PoolConfig, UploadConfig};

/// Write `content` to a sibling temp file, sync it, then rename over `path`.
///
/// Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}
