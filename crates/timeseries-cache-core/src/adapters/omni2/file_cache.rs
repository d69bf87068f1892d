//! Local directory of downloaded yearly files.
//!
//! A file is downloaded the first time its year is needed and kept in the
//! data directory afterwards. Files are re-downloaded once they are older
//! than the [`StalenessPolicy`] allows; a failed re-download keeps the old
//! file.

use std::path::PathBuf;

use chrono::{DateTime, Datelike, Duration, Utc};
use log::{error, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::{
    fetch::{DownloadSnafu, FetchResult, HttpStatusSnafu, OfflineSnafu, SourceStorageSnafu},
    storage::{self, CacheLocation},
};

/// When a downloaded yearly file should be fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StalenessPolicy {
    /// Years overlapping this many days before "now" count as recent.
    pub recent_window_days: i64,
    /// Maximum age of a recent year's file.
    pub recent_max_age_days: f64,
    /// Maximum age of any other year's file.
    pub old_max_age_days: f64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            recent_window_days: 182,
            recent_max_age_days: 7.0,
            old_max_age_days: 365.0,
        }
    }
}

impl StalenessPolicy {
    /// First year counted as recent at `now`.
    pub fn boundary_year(&self, now: DateTime<Utc>) -> i32 {
        (now - Duration::days(self.recent_window_days)).year()
    }

    /// Maximum file age, in days, for `year` as seen at `now`.
    pub fn max_age_days(&self, year: i32, now: DateTime<Utc>) -> f64 {
        if year >= self.boundary_year(now) {
            self.recent_max_age_days
        } else {
            self.old_max_age_days
        }
    }
}

/// Downloads and keeps yearly files in a local directory.
#[derive(Debug, Clone)]
pub struct YearlyFileCache {
    location: CacheLocation,
    url_template: String,
    file_name_template: String,
    staleness: StalenessPolicy,
    offline: bool,
    now: DateTime<Utc>,
    client: reqwest::Client,
}

impl YearlyFileCache {
    /// Create a file cache rooted at `data_dir`.
    ///
    /// `url_template` and `file_name_template` use a `{year}` placeholder.
    /// `now` is the reference time for staleness decisions.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        url_template: impl Into<String>,
        file_name_template: impl Into<String>,
        staleness: StalenessPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            location: CacheLocation::local(data_dir),
            url_template: url_template.into(),
            file_name_template: file_name_template.into(),
            staleness,
            offline: false,
            now,
            client: reqwest::Client::new(),
        }
    }

    /// Never download; use local files only.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// URL of the file for `year`.
    pub fn url_for(&self, year: i32) -> String {
        self.url_template.replace("{year}", &year.to_string())
    }

    /// Local file name (relative to the data directory) for `year`.
    pub fn file_name_for(&self, year: i32) -> PathBuf {
        PathBuf::from(self.file_name_template.replace("{year}", &year.to_string()))
    }

    /// Absolute-or-relative local path of the file for `year`.
    pub fn local_path_for(&self, year: i32) -> PathBuf {
        self.location.join(&self.file_name_for(year))
    }

    /// Contents of the file for `year`, downloading it if needed.
    ///
    /// A local file that is too old is refreshed; if that download fails the
    /// old contents are returned and the failure is logged.
    pub async fn ensure_file(&self, year: i32) -> FetchResult<Vec<u8>> {
        let rel = self.file_name_for(year);
        let url = self.url_for(year);

        let modified = storage::modified_time(&self.location, &rel)
            .await
            .context(SourceStorageSnafu)?;

        let Some(modified) = modified else {
            ensure!(
                !self.offline,
                OfflineSnafu {
                    path: self.local_path_for(year).display().to_string(),
                }
            );
            info!("Downloading {url} for the first time");
            return self.download_to_file(&url, year).await;
        };

        let age = self.now - DateTime::<Utc>::from(modified);
        let age_days = age.num_milliseconds() as f64 / 86_400_000.0;
        if !self.offline && age_days > self.staleness.max_age_days(year, self.now) {
            info!("Local copy of {url} is {age_days:.1} days old; downloading it again");
            match self.download_to_file(&url, year).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => error!("Failed to re-download {url}: {e}. Using the existing file."),
            }
        }

        storage::read_all_bytes(&self.location, &rel)
            .await
            .context(SourceStorageSnafu)
    }

    async fn download_to_file(&self, url: &str, year: i32) -> FetchResult<Vec<u8>> {
        let bytes = self.download(url).await?;
        storage::write_atomic(&self.location, &self.file_name_for(year), &bytes)
            .await
            .context(SourceStorageSnafu)?;
        Ok(bytes)
    }

    async fn download(&self, url: &str) -> FetchResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(DownloadSnafu { url })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            HttpStatusSnafu {
                url,
                status: status.as_u16(),
            }
        );

        let body = response.bytes().await.context(DownloadSnafu { url })?;
        Ok(body.to_vec())
    }
}
