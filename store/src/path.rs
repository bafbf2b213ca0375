//! Content-addressed path derivation.
//!
//! A key hashes to a fixed location on disk: SHA-1 digest, hex-encoded,
//! split into 5-character directory segments with the full digest as the
//! filename. The derivation is a pure function of the key, so every node
//! places the same content at the same relative path.

use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

/// Width of one directory segment in hex characters.
const SHARD_WIDTH: usize = 5;

/// The derived on-disk location for a key: nested shard directories plus
/// the digest as filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathKey {
    pub dir: String,
    pub filename: String,
}

impl PathKey {
    /// Full path of the content file under `root`.
    pub fn full_path(&self, root: &Path) -> PathBuf {
        root.join(&self.dir).join(&self.filename)
    }

    /// The first shard segment — the directory removed by a delete.
    pub fn first_shard(&self) -> &str {
        self.dir.split('/').next().unwrap_or(&self.dir)
    }
}

/// Derive the [`PathKey`] for a key.
pub fn path_for(key: &str) -> PathKey {
    let digest = Sha1::digest(key.as_bytes());
    let hash = hex::encode(digest);

    let segments: Vec<&str> = hash
        .as_bytes()
        .chunks(SHARD_WIDTH)
        // chunks() of a hex string never splits a UTF-8 boundary
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect();

    PathKey {
        dir: segments.join("/"),
        filename: hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_matches_known_vector() {
        let path_key = path_for("SoulSoceity");
        assert_eq!(
            path_key.dir,
            "84647/b2184/badb9/331c9/ec324/5ec5f/aebce/3c140"
        );
        assert_eq!(path_key.filename, "84647b2184badb9331c9ec3245ec5faebce3c140");
    }

    #[test]
    fn derivation_is_deterministic() {
        assert_eq!(path_for("Squad 1"), path_for("Squad 1"));
        assert_ne!(path_for("Squad 1"), path_for("Squad 2"));
    }

    #[test]
    fn first_shard_is_leading_segment() {
        let path_key = path_for("SoulSoceity");
        assert_eq!(path_key.first_shard(), "84647");
    }
}
