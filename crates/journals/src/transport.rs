//! Document transports.
//!
//! A transport fetches a document by location and reports the origin's
//! modification time, which is the freshness signal for cached copies.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::LAST_MODIFIED;

use crate::error::{JournalError, Result};

/// Bytes of a fetched document and the origin's modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub modified: Option<DateTime<Utc>>,
}

pub trait Transport: Send + Sync {
    /// Fetches a document. Blocks the calling thread.
    fn fetch(&self, location: &str) -> Result<FetchedDocument>;

    /// Reports the origin modification time without fetching the body.
    fn probe(&self, location: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Reads documents from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    fn path(location: &str) -> &Path {
        Path::new(location.strip_prefix("file://").unwrap_or(location))
    }
}

impl Transport for FileTransport {
    fn fetch(&self, location: &str) -> Result<FetchedDocument> {
        let path = Self::path(location);
        let bytes = fs::read(path).map_err(|error| match error.kind() {
            ErrorKind::NotFound => JournalError::transport(location, "file not found"),
            _ => JournalError::transport(location, error),
        })?;
        Ok(FetchedDocument {
            bytes,
            modified: file_modified(path),
        })
    }

    fn probe(&self, location: &str) -> Result<Option<DateTime<Utc>>> {
        let path = Self::path(location);
        fs::metadata(path).map_err(|error| JournalError::transport(location, error))?;
        Ok(file_modified(path))
    }
}

/// Returns a file's modification time, if the platform reports one.
pub(crate) fn file_modified(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// Fetches documents over HTTP(S) with a blocking client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| JournalError::transport("http client", error))?;
        Ok(Self { client })
    }

    fn last_modified(
        location: &str,
        response: &reqwest::blocking::Response,
    ) -> Option<DateTime<Utc>> {
        let raw = response.headers().get(LAST_MODIFIED)?.to_str().ok()?;
        match parse_http_date(raw) {
            Some(value) => Some(value),
            None => {
                log::debug!("ignoring unparseable Last-Modified {raw:?} for {location}");
                None
            }
        }
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, location: &str) -> Result<FetchedDocument> {
        let response = self
            .client
            .get(location)
            .send()
            .map_err(|error| JournalError::transport(location, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JournalError::Status {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }
        let modified = Self::last_modified(location, &response);
        let bytes = response
            .bytes()
            .map_err(|error| JournalError::transport(location, error))?;
        Ok(FetchedDocument {
            bytes: bytes.to_vec(),
            modified,
        })
    }

    fn probe(&self, location: &str) -> Result<Option<DateTime<Utc>>> {
        let response = self
            .client
            .head(location)
            .send()
            .map_err(|error| JournalError::transport(location, error))?;
        let status = response.status();
        if !status.is_success() {
            return Err(JournalError::Status {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(Self::last_modified(location, &response))
    }
}

/// Parses an HTTP date such as `Wed, 21 Oct 2015 07:28:00 GMT`.
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

/// Routes `http://`/`https://` locations to HTTP and everything else to
/// the filesystem.
#[derive(Debug, Clone)]
pub struct DefaultTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl DefaultTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(timeout)?,
            file: FileTransport,
        })
    }

    fn route(&self, location: &str) -> &dyn Transport {
        if location.starts_with("http://") || location.starts_with("https://") {
            &self.http
        } else {
            &self.file
        }
    }
}

impl Transport for DefaultTransport {
    fn fetch(&self, location: &str) -> Result<FetchedDocument> {
        self.route(location).fetch(location)
    }

    fn probe(&self, location: &str) -> Result<Option<DateTime<Utc>>> {
        self.route(location).probe(location)
    }
}
