use std::future::Future;

use reqwest::{redirect, Client, StatusCode};
use tracing::debug;

use crate::config::Settings;
use crate::error::FetchError;

/// One GET, one body. Retry is the orchestrator's business.
pub trait Fetch {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout())
            .redirect(redirect::Policy::limited(settings.max_redirects))
            // Broken certificate chain on the county site; see Settings.
            .danger_accept_invalid_certs(settings.accept_invalid_certs)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(HttpFetcher { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(transport)?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }
        debug!(url, bytes = body.len(), "fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            timeout_secs: 5,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn returns_body_on_200() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/roster")
            .match_header("user-agent", settings().user_agent.as_str())
            .with_status(200)
            .with_body("<html><body>ok</body></html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&settings()).unwrap();
        let body = fetcher.fetch(&format!("{}/roster", server.url())).await.unwrap();
        assert!(body.contains("ok"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_200_is_status_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/gone").with_status(404).create_async().await;

        let fetcher = HttpFetcher::new(&settings()).unwrap();
        let err = fetcher.fetch(&format!("{}/gone", server.url())).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn blank_body_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/blank")
            .with_status(200)
            .with_body("   \n")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&settings()).unwrap();
        let err = fetcher.fetch(&format!("{}/blank", server.url())).await.unwrap_err();
        assert!(matches!(err, FetchError::EmptyBody { .. }));
    }

    #[tokio::test]
    async fn follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/old")
            .with_status(302)
            .with_header("location", "/new")
            .create_async()
            .await;
        server
            .mock("GET", "/new")
            .with_status(200)
            .with_body("moved here")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&settings()).unwrap();
        let body = fetcher.fetch(&format!("{}/old", server.url())).await.unwrap();
        assert_eq!(body, "moved here");
    }

    #[tokio::test]
    async fn connection_refused_is_transport() {
        let fetcher = HttpFetcher::new(&settings()).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }
}
