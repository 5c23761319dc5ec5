//! Data release download and integrity checks.

pub mod downloader;
pub mod manifest;

pub use downloader::{download_release, HttpFetcher, ReleaseOptions};
pub use manifest::VerifyStatus;
