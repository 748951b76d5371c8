// ============================================================
// Layer 4 - Corpus Acquisition
// ============================================================
// Downloads the zipped MIDI corpus and unpacks it.
//
//   extract_dir exists?  -> nothing to do, no network call
//   otherwise            -> download once, extract every entry,
//                           delete the archive
//
// There is no checksum and no retry. A half-extracted directory
// from an interrupted run counts as "exists"; delete it by hand
// to start over.

use anyhow::{Context, Result};
use std::{fs, path::Path};

use crate::domain::traits::CorpusFetcher;

/// What `acquire_corpus` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    AlreadyPresent,
    Downloaded,
}

/// Make sure `extract_dir` holds the corpus, downloading it if missing.
pub fn acquire_corpus(
    fetcher:     &dyn CorpusFetcher,
    url:         &str,
    zip_path:    &Path,
    extract_dir: &Path,
) -> Result<Acquisition> {
    if extract_dir.exists() {
        tracing::info!("'{}' already exists, skipping download", extract_dir.display());
        return Ok(Acquisition::AlreadyPresent);
    }

    tracing::info!("Downloading pretrain data from {}", url);
    fetcher
        .fetch(url, zip_path)
        .with_context(|| format!("Download of '{url}' failed"))?;

    tracing::info!("Unzipping pretrain data into '{}'", extract_dir.display());
    extract_zip(zip_path, extract_dir)?;

    fs::remove_file(zip_path)
        .with_context(|| format!("Cannot remove archive '{}'", zip_path.display()))?;
    tracing::info!("Removed archive '{}'", zip_path.display());

    Ok(Acquisition::Downloaded)
}

fn extract_zip(zip_path: &Path, extract_dir: &Path) -> Result<()> {
    let file = fs::File::open(zip_path)
        .with_context(|| format!("Cannot open archive '{}'", zip_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("'{}' is not a zip archive", zip_path.display()))?;
    archive
        .extract(extract_dir)
        .with_context(|| format!("Cannot extract into '{}'", extract_dir.display()))?;
    tracing::debug!("Extracted {} entries", archive.len());
    Ok(())
}

// ─── HttpFetcher ──────────────────────────────────────────────────────────────
/// Blocking HTTP download via reqwest.
///
/// Google Drive serves an HTML "can't scan this file for viruses"
/// page instead of large files; when that happens the request is
/// repeated once with `confirm=t`.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("Cannot build HTTP client")?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        Ok(response)
    }
}

impl CorpusFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let mut response = self.get(url)?;

        if is_html(&response) && url.contains("drive.google.com") {
            let confirmed = drive_confirm_url(url);
            tracing::debug!("Google Drive interstitial, retrying as {}", confirmed);
            response = self.get(&confirmed)?;
        }

        let mut out = fs::File::create(dest)
            .with_context(|| format!("Cannot create '{}'", dest.display()))?;
        let bytes = response
            .copy_to(&mut out)
            .with_context(|| format!("Cannot write '{}'", dest.display()))?;
        tracing::info!("Downloaded {} bytes to '{}'", bytes, dest.display());
        Ok(())
    }
}

fn is_html(response: &reqwest::blocking::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

fn drive_confirm_url(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}confirm=t")
}
