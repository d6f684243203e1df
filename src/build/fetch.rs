//! Template fetching from local files or remote URLs.

use std::future::Future;

use super::paths::Location;

/// Number of extra attempts when no retry count is configured.
pub const DEFAULT_RETRIES: u32 = 3;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("failed to read {location}: {source}")]
    Io {
        location: String,
        source: std::io::Error,
    },

    #[error("request to {location} failed: {source}")]
    Http {
        location: String,
        source: reqwest::Error,
    },

    #[error("{location} responded with status {status}")]
    Status { location: String, status: u16 },

    #[error("giving up on {location} after {attempts} attempt(s): {last}")]
    Exhausted {
        location: String,
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Anything that can produce the raw text of a template.
///
/// The composer only talks to this trait, so tests can swap in an
/// in-memory source.
pub trait TemplateSource {
    fn fetch_text(
        &self,
        location: &Location,
    ) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Fetches templates from disk or over HTTP, retrying failed attempts.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    retries: u32,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES)
    }
}

impl Fetcher {
    pub fn new(retries: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            retries,
        }
    }

    /// Fetch a location, retrying immediately up to `retries` extra times.
    pub async fn fetch(&self, location: &Location) -> Result<String, FetchError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.fetch_once(location).await {
                Ok(text) => return Ok(text),
                Err(e) if attempts <= self.retries => {
                    tracing::warn!("error fetching {location}: {e}. Retrying...");
                }
                Err(e) => {
                    return Err(FetchError::Exhausted {
                        location: location.to_string(),
                        attempts,
                        last: Box::new(e),
                    });
                }
            }
        }
    }

    async fn fetch_once(&self, location: &Location) -> Result<String, FetchError> {
        tracing::debug!("fetching {location}");
        match location {
            Location::Local(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| FetchError::Io {
                        location: location.to_string(),
                        source,
                    })
            }
            Location::Remote(url) => {
                let http_err = |source| FetchError::Http {
                    location: location.to_string(),
                    source,
                };
                let response = self.client.get(url.clone()).send().await.map_err(http_err)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        location: location.to_string(),
                        status: status.as_u16(),
                    });
                }
                response.text().await.map_err(http_err)
            }
        }
    }
}

impl TemplateSource for Fetcher {
    fn fetch_text(
        &self,
        location: &Location,
    ) -> impl Future<Output = Result<String, FetchError>> + Send {
        self.fetch(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nav.html");
        std::fs::write(&path, "<nav></nav>").unwrap();

        let fetcher = Fetcher::new(0);
        let text = fetcher.fetch(&Location::Local(path)).await.unwrap();
        assert_eq!(text, "<nav></nav>");
    }

    #[tokio::test]
    async fn test_missing_local_file_exhausts_retries() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(2);

        let err = fetcher
            .fetch(&Location::Local(dir.path().join("missing.html")))
            .await
            .unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Io { .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_remote() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/template/nav.html")
            .with_status(200)
            .with_body("<nav>remote</nav>")
            .create_async()
            .await;

        let fetcher = Fetcher::new(0);
        let location = Location::parse(&format!("{}/template/nav.html", server.url()));
        let text = fetcher.fetch(&location).await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, "<nav>remote</nav>");
    }

    #[tokio::test]
    async fn test_remote_error_status_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/broken.html")
            .with_status(500)
            .expect(4)
            .create_async()
            .await;

        let fetcher = Fetcher::new(3);
        let location = Location::parse(&format!("{}/broken.html", server.url()));
        let err = fetcher.fetch(&location).await.unwrap_err();

        mock.assert_async().await;
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 4);
                assert!(matches!(*last, FetchError::Status { status: 500, .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
