//! HTTP client for the question endpoint.
//!
//! Two flavours of the same dependency: a blocking GET and an async POST.
//! Non-2xx responses are errors, so the breaker counts them as failures.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub const DEFAULT_URL: &str = "http://localhost:8080/question";

/// Failure talking to the remote dependency.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("I/O error on {method} request for \"{url}\": {source}")]
    Transport {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{status} from {method} {url}")]
    Status {
        status: StatusCode,
        method: &'static str,
        url: String,
    },

    #[error("simulated failure: {0}")]
    Simulated(String),
}

/// Async client, POSTs to the question endpoint.
#[derive(Debug, Clone)]
pub struct QuestionClient {
    url: String,
    client: reqwest::Client,
}

impl QuestionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn ask(&self) -> Result<String, RemoteError> {
        let transport = |source| RemoteError::Transport {
            method: "POST",
            url: self.url.clone(),
            source,
        };

        let res = self.client.post(&self.url).send().await.map_err(transport)?;
        let status = res.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status,
                method: "POST",
                url: self.url.clone(),
            });
        }
        res.text().await.map_err(transport)
    }
}

/// Blocking client, GETs the question endpoint.
///
/// Owns its own runtime internally: build, use and drop it on a thread that
/// is not driving async tasks (e.g. inside `spawn_blocking`).
#[derive(Debug)]
pub struct BlockingQuestionClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl BlockingQuestionClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url: url.into(),
            client: reqwest::blocking::Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn ask(&self) -> Result<String, RemoteError> {
        let transport = |source| RemoteError::Transport {
            method: "GET",
            url: self.url.clone(),
            source,
        };

        let res = self.client.get(&self.url).send().map_err(transport)?;
        let status = res.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                status,
                method: "GET",
                url: self.url.clone(),
            });
        }
        res.text().map_err(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let err = RemoteError::Status {
            status: StatusCode::BAD_REQUEST,
            method: "POST",
            url: DEFAULT_URL.to_string(),
        };
        assert_eq!(
            err.to_string(),
            "400 Bad Request from POST http://localhost:8080/question"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // Bind and immediately release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            QuestionClient::new(format!("http://{addr}/question"), Duration::from_secs(2)).unwrap();
        let err = client.ask().await.unwrap_err();
        assert!(matches!(err, RemoteError::Transport { method: "POST", .. }));
        assert!(err.to_string().starts_with("I/O error on POST request for"));
    }
}
