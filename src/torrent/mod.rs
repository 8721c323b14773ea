//! Torrent rewriting for the destination tracker.

use lava_torrent::bencode::BencodeElem;
use lava_torrent::torrent::v1::Torrent;
use lava_torrent::LavaTorrentError;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::{format_size, sanitize_filename};

#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Invalid torrent: {0}")]
    Parse(#[from] LavaTorrentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TorrentError>;

const MAX_NAME_CHARS: usize = 150;

/// Point a source torrent at the destination tracker.
///
/// The announce URL is replaced and the announce list dropped, source-site
/// comments and publisher fields are removed, `info.source` is cleared and
/// the torrent is marked private.
pub fn rewrite_for_tracker(bytes: &[u8], announce: &str) -> Result<Vec<u8>> {
    let mut torrent = Torrent::read_from_bytes(bytes)?;

    torrent.announce = Some(announce.to_string());
    torrent.announce_list = None;

    if let Some(extra) = torrent.extra_fields.as_mut() {
        extra.retain(|key, _| !key.starts_with("comment") && !key.starts_with("publisher"));
    }

    let info = torrent.extra_info_fields.get_or_insert_with(Default::default);
    info.remove("source");
    info.insert("private".to_string(), BencodeElem::Integer(1));

    debug!("Rewrote torrent '{}' for {}", torrent.name, announce);
    Ok(torrent.encode()?)
}

/// Torrent name from the info dictionary.
pub fn torrent_name(bytes: &[u8]) -> Result<String> {
    Ok(Torrent::read_from_bytes(bytes)?.name)
}

/// Write a rewritten torrent into `dir` as `<name>.torrent`.
pub async fn write_torrent(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let stem: String = sanitize_filename(name).chars().take(MAX_NAME_CHARS).collect();
    let stem = if stem.trim().is_empty() { "torrent".to_string() } else { stem };
    let path = dir.join(format!("{}.torrent", stem));
    tokio::fs::write(&path, bytes).await?;
    debug!("Wrote {} ({})", path.display(), format_size(bytes.len() as u64));
    Ok(path)
}
