//! Versioned data release download.
//!
//! Fetches the release manifest, downloads every listed file that is not
//! already present with a matching checksum, verifies the release directory
//! and points stable symlinks in the data directory at the release copies.

use crate::release::manifest::{md5_file, Manifest, Verification, MANIFEST_NAME};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::IF_MODIFIED_SINCE;
use reqwest::StatusCode;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Release notes shipped next to the manifest.
pub const RELEASE_NOTES: &str = "release-notes.md";

/// Result of one conditional request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Body written to the destination (bytes).
    Downloaded(u64),
    /// Remote copy is not newer than the local one.
    NotModified,
    /// Remote file does not exist.
    NotFound,
}

/// Conditional file transfer.
#[allow(async_fn_in_trait)]
pub trait Fetch {
    /// Fetches `url` into `dest`.
    ///
    /// With `modified_since` set, the transfer is skipped when the remote
    /// copy is not newer.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        modified_since: Option<SystemTime>,
    ) -> Result<FetchOutcome>;
}

/// HTTP(S) implementation of [`Fetch`].
pub struct HttpFetcher {
    client: reqwest::Client,
    show_progress: bool,
}

impl HttpFetcher {
    pub fn new(timeout_seconds: u64, show_progress: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .user_agent(concat!("pbta-summary/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            show_progress,
        })
    }

    fn progress_bar(&self, len: Option<u64>, name: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }
        let pb = ProgressBar::new(len.unwrap_or(0));
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(name.to_string());
        Some(pb)
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        modified_since: Option<SystemTime>,
    ) -> Result<FetchOutcome> {
        let mut request = self.client.get(url);
        if let Some(since) = modified_since {
            request = request.header(IF_MODIFIED_SINCE, http_date(since));
        }

        let mut response = request
            .send()
            .await
            .with_context(|| format!("Request failed: {}", url))?;

        match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(FetchOutcome::NotModified),
            StatusCode::NOT_FOUND => return Ok(FetchOutcome::NotFound),
            status if !status.is_success() => bail!("{} returned HTTP {}", url, status),
            _ => {}
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let mut tmp = NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;

        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let pb = self.progress_bar(response.content_length(), &name);

        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Transfer interrupted: {}", url))?
        {
            tmp.write_all(&chunk)
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += chunk.len() as u64;
            if let Some(ref pb) = pb {
                pb.set_position(written);
            }
        }

        tmp.persist(dest)
            .with_context(|| format!("Failed to move download into {}", dest.display()))?;

        if let Some(pb) = pb {
            pb.finish_with_message(format!("{} done", name));
        }

        Ok(FetchOutcome::Downloaded(written))
    }
}

/// Formats a timestamp as an HTTP date (RFC 7231).
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Where a release lives remotely and locally.
#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Base URL; the release is under `<url>/<release>/`.
    pub url: String,
    /// Release tag.
    pub release: String,
    /// Local data directory; the release lands in `<data_dir>/<release>/`.
    pub data_dir: PathBuf,
    /// Create `<data_dir>/<file>` symlinks after a clean verification.
    pub symlinks: bool,
}

impl ReleaseOptions {
    pub fn release_dir(&self) -> PathBuf {
        self.data_dir.join(&self.release)
    }

    fn remote(&self, file: &str) -> String {
        format!(
            "{}/{}/{}",
            self.url.trim_end_matches('/'),
            self.release,
            file
        )
    }
}

/// What a download run did.
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    /// Files transferred in this run.
    pub fetched: Vec<String>,
    /// Files already present with a matching checksum.
    pub skipped: Vec<String>,
    /// Per-file checksum verification.
    pub verification: Vec<Verification>,
    /// Symlinks created.
    pub links: usize,
}

impl DownloadSummary {
    /// True when every manifest file verified.
    pub fn all_verified(&self) -> bool {
        self.verification.iter().all(Verification::is_ok)
    }
}

/// Downloads, verifies and links one release.
pub async fn download_release<F: Fetch>(
    fetcher: &F,
    options: &ReleaseOptions,
) -> Result<DownloadSummary> {
    let release_dir = options.release_dir();
    std::fs::create_dir_all(&release_dir)
        .with_context(|| format!("Failed to create {}", release_dir.display()))?;

    let manifest_path = release_dir.join(MANIFEST_NAME);
    info!("Fetching manifest for {}", options.release);
    match fetch_conditional(fetcher, &options.remote(MANIFEST_NAME), &manifest_path).await? {
        FetchOutcome::NotFound => bail!(
            "Release manifest not found: {}",
            options.remote(MANIFEST_NAME)
        ),
        outcome => debug!("Manifest: {:?}", outcome),
    }

    let manifest = Manifest::load(&manifest_path)?;
    info!("Manifest lists {} files", manifest.entries.len());

    let mut summary = DownloadSummary::default();
    for entry in &manifest.entries {
        let local = release_dir.join(&entry.file);

        if local.exists() && md5_file(&local)? == entry.md5 {
            debug!("Up to date: {}", entry.file);
            summary.skipped.push(entry.file.clone());
            continue;
        }

        info!("Downloading {}", entry.file);
        match fetch_conditional(fetcher, &options.remote(&entry.file), &local).await? {
            FetchOutcome::Downloaded(bytes) => {
                debug!("{}: {} bytes", entry.file, bytes);
                summary.fetched.push(entry.file.clone());
            }
            FetchOutcome::NotModified => {
                warn!("{} not modified upstream but differs locally", entry.file);
            }
            FetchOutcome::NotFound => {
                bail!("Listed file not found upstream: {}", options.remote(&entry.file))
            }
        }
    }

    let notes_path = release_dir.join(RELEASE_NOTES);
    if fetch_conditional(fetcher, &options.remote(RELEASE_NOTES), &notes_path).await?
        == FetchOutcome::NotFound
    {
        warn!("No release notes published for {}", options.release);
    }

    info!("Verifying checksums");
    summary.verification = manifest.verify(&release_dir)?;

    if !summary.all_verified() {
        warn!("Checksum verification failed; symlinks not updated");
        return Ok(summary);
    }

    if options.symlinks {
        let mut files: Vec<&str> = manifest.files().collect();
        if notes_path.exists() {
            files.push(RELEASE_NOTES);
        }
        for file in files {
            link_release_file(&options.data_dir, &options.release, file)?;
            summary.links += 1;
        }
    }

    Ok(summary)
}

async fn fetch_conditional<F: Fetch>(fetcher: &F, url: &str, dest: &Path) -> Result<FetchOutcome> {
    let since = std::fs::metadata(dest).and_then(|m| m.modified()).ok();
    fetcher.fetch(url, dest, since).await
}

/// Points `<data_dir>/<file>` at `<release>/<file>`, replacing any link.
pub fn link_release_file(data_dir: &Path, release: &str, file: &str) -> Result<PathBuf> {
    let link = data_dir.join(file);
    let target = relative_target(release, file);

    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    if let Ok(meta) = std::fs::symlink_metadata(&link) {
        if meta.is_dir() {
            bail!("Refusing to replace directory with symlink: {}", link.display());
        }
        std::fs::remove_file(&link)
            .with_context(|| format!("Failed to remove {}", link.display()))?;
    }

    symlink(&target, &link)
        .with_context(|| format!("Failed to link {} -> {}", link.display(), target.display()))?;
    debug!("Linked {} -> {}", link.display(), target.display());
    Ok(link)
}

/// Link target relative to the link's own directory.
fn relative_target(release: &str, file: &str) -> PathBuf {
    let depth = Path::new(file).components().count().saturating_sub(1);
    let mut target = PathBuf::new();
    for _ in 0..depth {
        target.push("..");
    }
    target.push(release);
    target.push(file);
    target
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    const HELLO_MD5: &str = "b1946ac92492d2347c6235b4d2611184";
    const BASE: &str = "https://example.org/data";

    /// Serves fixed bodies and records every requested URL.
    struct MockFetcher {
        files: HashMap<String, String>,
        not_modified: bool,
        requests: RefCell<Vec<String>>,
    }

    impl MockFetcher {
        fn new(files: &[(&str, String)]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(name, body)| (format!("{}/v1/{}", BASE, name), body.clone()))
                    .collect(),
                not_modified: false,
                requests: RefCell::new(Vec::new()),
            }
        }

        fn requested(&self, file: &str) -> bool {
            let url = format!("{}/v1/{}", BASE, file);
            self.requests.borrow().iter().any(|u| *u == url)
        }
    }

    impl Fetch for MockFetcher {
        async fn fetch(
            &self,
            url: &str,
            dest: &Path,
            modified_since: Option<SystemTime>,
        ) -> Result<FetchOutcome> {
            self.requests.borrow_mut().push(url.to_string());
            if self.not_modified && modified_since.is_some() {
                return Ok(FetchOutcome::NotModified);
            }
            match self.files.get(url) {
                Some(body) => {
                    std::fs::create_dir_all(dest.parent().unwrap())?;
                    std::fs::write(dest, body)?;
                    Ok(FetchOutcome::Downloaded(body.len() as u64))
                }
                None => Ok(FetchOutcome::NotFound),
            }
        }
    }

    fn options(data_dir: &Path) -> ReleaseOptions {
        ReleaseOptions {
            url: format!("{}/", BASE),
            release: "v1".to_string(),
            data_dir: data_dir.to_path_buf(),
            symlinks: true,
        }
    }

    #[test]
    fn test_http_date() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(time), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(relative_target("v1", "a.tsv"), PathBuf::from("v1/a.tsv"));
        assert_eq!(
            relative_target("v1", "sub/a.tsv"),
            PathBuf::from("../v1/sub/a.tsv")
        );
    }

    #[test]
    fn test_fresh_download_fetches_verifies_and_links() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new(&[
            (MANIFEST_NAME, format!("{}  file1.txt\n", HELLO_MD5)),
            ("file1.txt", "hello\n".to_string()),
            (RELEASE_NOTES, "# v1\n".to_string()),
        ]);

        let summary =
            tokio_test::block_on(download_release(&fetcher, &options(temp_dir.path()))).unwrap();

        assert_eq!(summary.fetched, vec!["file1.txt"]);
        assert!(summary.skipped.is_empty());
        assert!(summary.all_verified());
        assert_eq!(summary.links, 2);

        let link = temp_dir.path().join("file1.txt");
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "hello\n");
        assert!(std::fs::symlink_metadata(&link)
            .unwrap()
            .file_type()
            .is_symlink());
    }

    #[test]
    fn test_present_matching_file_is_not_fetched() {
        let temp_dir = TempDir::new().unwrap();
        let release_dir = temp_dir.path().join("v1");
        std::fs::create_dir_all(&release_dir).unwrap();
        std::fs::write(release_dir.join("file1.txt"), "hello\n").unwrap();
        std::fs::write(
            release_dir.join(MANIFEST_NAME),
            format!("file1.txt {}\n", HELLO_MD5),
        )
        .unwrap();

        let mut fetcher = MockFetcher::new(&[]);
        fetcher.not_modified = true;

        let summary =
            tokio_test::block_on(download_release(&fetcher, &options(temp_dir.path()))).unwrap();

        assert!(!fetcher.requested("file1.txt"));
        assert_eq!(summary.skipped, vec!["file1.txt"]);
        assert!(summary.fetched.is_empty());
        assert!(summary.all_verified());
    }

    #[test]
    fn test_checksum_mismatch_is_reported_and_left_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new(&[
            (MANIFEST_NAME, format!("{}  file1.txt\n", HELLO_MD5)),
            ("file1.txt", "corrupted\n".to_string()),
        ]);

        let summary =
            tokio_test::block_on(download_release(&fetcher, &options(temp_dir.path()))).unwrap();

        assert!(!summary.all_verified());
        assert_eq!(summary.links, 0);
        assert!(temp_dir.path().join("v1/file1.txt").exists());
        assert!(!temp_dir.path().join("file1.txt").exists());
    }

    #[test]
    fn test_missing_manifest_fails() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new(&[]);
        let result = tokio_test::block_on(download_release(&fetcher, &options(temp_dir.path())));
        assert!(result.is_err());
    }

    #[test]
    fn test_listed_file_missing_upstream_fails() {
        let temp_dir = TempDir::new().unwrap();
        let fetcher = MockFetcher::new(&[(MANIFEST_NAME, format!("{}  file1.txt\n", HELLO_MD5))]);
        let result = tokio_test::block_on(download_release(&fetcher, &options(temp_dir.path())));
        assert!(result.is_err());
    }

    #[test]
    fn test_link_replaces_existing_link() {
        let temp_dir = TempDir::new().unwrap();
        for release in ["v1", "v2"] {
            let dir = temp_dir.path().join(release);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("a.tsv"), release).unwrap();
        }

        link_release_file(temp_dir.path(), "v1", "a.tsv").unwrap();
        link_release_file(temp_dir.path(), "v2", "a.tsv").unwrap();

        let content = std::fs::read_to_string(temp_dir.path().join("a.tsv")).unwrap();
        assert_eq!(content, "v2");
    }
}
