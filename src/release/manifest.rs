//! Checksum manifest parsing and verification.
//!
//! A release ships an `md5sum.txt` as written by `md5sum`: one
//! `<hex digest>  <file name>` line per file.

use anyhow::{bail, Context, Result};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

/// Manifest file name inside a release directory.
pub const MANIFEST_NAME: &str = "md5sum.txt";

/// One file listed in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// File name relative to the release directory.
    pub file: String,
    /// Lowercase hex MD5 digest.
    pub md5: String,
}

/// Parsed checksum manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Parses manifest text.
    ///
    /// Accepts `md5sum` output (`<md5>  <file>`, with an optional `*`
    /// binary marker) as well as `<file> <md5>`. Blank lines and `#`
    /// comments are skipped.
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (n, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (Some(first), Some(second), None) = (fields.next(), fields.next(), fields.next())
            else {
                bail!("Malformed manifest line {}: '{}'", n + 1, line);
            };

            let (md5, file) = if is_md5(first) {
                (first, second)
            } else if is_md5(second) {
                (second, first)
            } else {
                bail!("No MD5 digest on manifest line {}: '{}'", n + 1, line);
            };
            let file = file.trim_start_matches('*');

            if !is_safe_name(file) {
                bail!("Unsafe file name in manifest line {}: '{}'", n + 1, file);
            }

            entries.push(ManifestEntry {
                file: file.to_string(),
                md5: md5.to_lowercase(),
            });
        }

        Ok(Self { entries })
    }

    /// Reads and parses a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// Listed file names, in manifest order.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.file.as_str())
    }

    /// Checks every listed file under `dir`.
    pub fn verify(&self, dir: &Path) -> Result<Vec<Verification>> {
        let mut results = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let path = dir.join(&entry.file);
            let status = if !path.exists() {
                VerifyStatus::Missing
            } else {
                let actual = md5_file(&path)?;
                if actual == entry.md5 {
                    VerifyStatus::Ok
                } else {
                    VerifyStatus::Mismatch { actual }
                }
            };
            results.push(Verification {
                file: entry.file.clone(),
                status,
            });
        }
        Ok(results)
    }
}

/// Outcome of checking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    Ok,
    Missing,
    Mismatch { actual: String },
}

/// Verification result for one manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub file: String,
    pub status: VerifyStatus,
}

impl Verification {
    pub fn is_ok(&self) -> bool {
        self.status == VerifyStatus::Ok
    }
}

/// MD5 of a file's contents as lowercase hex.
pub fn md5_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn is_md5(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Release-relative names only: no absolute paths, no `..`.
fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // md5("hello\n")
    const HELLO_MD5: &str = "b1946ac92492d2347c6235b4d2611184";

    #[test]
    fn test_parse_md5sum_format() {
        let manifest = Manifest::parse(&format!(
            "{}  pbta-histologies.tsv\n\n{} *pbta-snv-consensus.maf.tsv.gz\n",
            HELLO_MD5, "D41D8CD98F00B204E9800998ECF8427E"
        ))
        .unwrap();

        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[0].file, "pbta-histologies.tsv");
        assert_eq!(manifest.entries[1].file, "pbta-snv-consensus.maf.tsv.gz");
        assert_eq!(manifest.entries[1].md5, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_parse_file_first_format() {
        let manifest = Manifest::parse(&format!("file1.txt {}\n", HELLO_MD5)).unwrap();
        assert_eq!(manifest.entries[0].md5, HELLO_MD5);
        assert_eq!(manifest.files().collect::<Vec<_>>(), vec!["file1.txt"]);
    }

    #[test]
    fn test_parse_rejects_bad_lines() {
        assert!(Manifest::parse("just-one-field\n").is_err());
        assert!(Manifest::parse("file1.txt notadigest\n").is_err());
        assert!(Manifest::parse(&format!("{}  ../escape.txt\n", HELLO_MD5)).is_err());
        assert!(Manifest::parse(&format!("{}  /etc/passwd\n", HELLO_MD5)).is_err());
    }

    #[test]
    fn test_md5_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hello.txt");
        std::fs::write(&path, "hello\n").unwrap();
        assert_eq!(md5_file(&path).unwrap(), HELLO_MD5);
    }

    #[test]
    fn test_verify() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("good.txt"), "hello\n").unwrap();
        std::fs::write(temp_dir.path().join("bad.txt"), "goodbye\n").unwrap();

        let manifest = Manifest::parse(&format!(
            "{0}  good.txt\n{0}  bad.txt\n{0}  missing.txt\n",
            HELLO_MD5
        ))
        .unwrap();
        let results = manifest.verify(temp_dir.path()).unwrap();

        assert!(results[0].is_ok());
        assert!(matches!(results[1].status, VerifyStatus::Mismatch { .. }));
        assert_eq!(results[2].status, VerifyStatus::Missing);
    }
}
