//! HTTP fetching for CRD sources and tool releases

use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::error::{Result, SourceError};

/// Upper bound on how much of a body is read to identify its format
pub const SNIFF_LIMIT: usize = 64 * 1024;

const USER_AGENT: &str = concat!("kubegate/", env!("CARGO_PKG_VERSION"));

/// Thin wrapper around `reqwest::Client` that turns non-200 answers into errors
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with the default connect timeout
    pub fn new() -> Result<Self> {
        Self::with_connect_timeout(Duration::from_secs(30))
    }

    pub fn with_connect_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SourceError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Issue a GET; anything but 200 OK is an error
    pub async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status != reqwest::StatusCode::OK {
            return Err(SourceError::HttpError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Fetch text from URL
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        Ok(response.text().await?)
    }
}

/// Prefix of a body stream read for format identification
#[derive(Debug)]
pub struct Prefix {
    pub bytes: Vec<u8>,
    /// Whether the stream ended within the limit
    pub complete: bool,
}

/// Read up to `limit` bytes from a chunk stream, leaving the rest unread
pub async fn read_prefix<S, B, E>(stream: &mut S, limit: usize) -> std::result::Result<Prefix, E>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut bytes = Vec::new();

    while bytes.len() < limit {
        match stream.next().await {
            Some(chunk) => bytes.extend_from_slice(chunk?.as_ref()),
            None => {
                return Ok(Prefix {
                    bytes,
                    complete: true,
                });
            }
        }
    }

    Ok(Prefix {
        bytes,
        complete: false,
    })
}

/// Discard whatever is left of a body stream so the connection can be reused
pub async fn drain<S, B, E>(stream: &mut S) -> std::result::Result<u64, E>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut discarded = 0u64;
    while let Some(chunk) = stream.next().await {
        discarded += chunk?.as_ref().len() as u64;
    }
    Ok(discarded)
}
