//! Cookie-aware HTTP client wrapping reqwest.
//!
//! Not a browser — just HTTP requests replaying the site's pages and
//! forms. The cookie store carries the game session between requests.
//! Nothing here retries: transparently re-issuing a request could double a
//! side-effecting action, so retry decisions stay with the session layer
//! (which retries only the implicit re-authentication step).

use crate::errors::BotError;
use std::time::Duration;

/// Response from an upstream request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// All response headers. The session layer needs the challenge-id
    /// header from login conflicts, so nothing is filtered out.
    pub headers: Vec<(String, String)>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client shared by the session state machine.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new client with a persistent cookie store and a standard
    /// browser user-agent (the upstream rejects obviously non-browser UAs).
    pub fn new(timeout_ms: u64) -> Self {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                  AppleWebKit/537.36 (KHTML, like Gecko) \
                  Chrome/131.0.0.0 Safari/537.36";

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(true)
            .user_agent(ua)
            .build()
            .unwrap_or_default();

        Self { client }
    }

    /// GET a page with query parameters.
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse, BotError> {
        let resp = self.client.get(url).query(query).send().await?;
        Self::read_response(url, resp).await
    }

    /// POST url-encoded form data, with optional extra headers (the login
    /// endpoint takes the one-time code as a header, not a field).
    pub async fn post_form(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: &[(String, String)],
        extra_headers: &[(String, String)],
    ) -> Result<HttpResponse, BotError> {
        let mut builder = self.client.post(url).query(query);
        for (name, value) in extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let resp = builder.form(form).send().await?;
        Self::read_response(url, resp).await
    }

    /// POST a JSON body (challenge solve endpoint).
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<HttpResponse, BotError> {
        let resp = self.client.post(url).json(body).send().await?;
        Self::read_response(url, resp).await
    }

    async fn read_response(url: &str, resp: reqwest::Response) -> Result<HttpResponse, BotError> {
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let headers: Vec<(String, String)> = resp
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();
        // A failed body read must surface as a transport error: an empty
        // body would read downstream exactly like a logged-out page.
        let body = resp.text().await?;

        Ok(HttpResponse {
            url: url.to_string(),
            final_url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = HttpClient::new(10000);
        let _ = client;
    }

    #[tokio::test]
    async fn test_truncated_body_is_a_transport_error() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Advertise a longer body than we send, then hang up: the headers
        // arrive fine but the body read fails.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial")
                .await;
        });

        let client = HttpClient::new(2_000);
        let err = client
            .get(&format!("http://{addr}/"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Transport(_)));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let resp = HttpResponse {
            url: "https://example.com".to_string(),
            final_url: "https://example.com".to_string(),
            status: 409,
            headers: vec![("GF-Challenge-Id".to_string(), "c-123".to_string())],
            body: String::new(),
        };
        assert_eq!(resp.header("gf-challenge-id"), Some("c-123"));
        assert_eq!(resp.header("x-missing"), None);
    }
}
