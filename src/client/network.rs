//! The network port used by the client library.
//!
//! Every client component talks to the API through [Network], so the same code
//! runs natively against a server through [ReqwestNetwork] or against in-memory
//! fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde::Serialize;

/// A failed network request, i.e. no HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The server could not be reached, e.g. the device is offline.
    #[error("the server is unreachable: {0}")]
    Unreachable(String),

    /// The request timed out before a response arrived.
    #[error("the request timed out")]
    Timeout,

    /// The request could not be built, e.g. the URL is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Where a response came from relative to the client's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// A same-origin response.
    Basic,
    /// A response from another origin.
    Cors,
    /// A response made up by the client, e.g. for a queued request.
    Synthetic,
}

/// An HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute URL.
    pub url: Url,
    /// A JSON body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// A GET request for `url`.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
        }
    }

    /// A request with `body` serialized as JSON.
    ///
    /// # Errors
    /// Returns [NetworkError::InvalidRequest] if `body` cannot be serialized.
    pub fn with_json(
        method: Method,
        url: Url,
        body: &impl Serialize,
    ) -> Result<Self, NetworkError> {
        let body = serde_json::to_vec(body)
            .map_err(|error| NetworkError::InvalidRequest(error.to_string()))?;

        Ok(Self {
            method,
            url,
            body: Some(body),
        })
    }

    /// The key the request is cached under: the method and the absolute URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// An HTTP response with its body read into memory.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: u16,
    /// Where the response came from.
    pub response_type: ResponseType,
    /// The response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// A same-origin response with a JSON body.
    pub fn json(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            response_type: ResponseType::Basic,
            body: body.to_string().into_bytes(),
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends HTTP requests.
#[async_trait]
pub trait Network: Send + Sync {
    /// Send `request` and read the whole response.
    ///
    /// An HTTP error status is a successful fetch; only failures to get a
    /// response are errors.
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError>;
}

/// A [Network] backed by reqwest, keeping cookies between requests.
#[derive(Debug, Clone)]
pub struct ReqwestNetwork {
    client: Client,
    origin: Url,
}

impl ReqwestNetwork {
    /// Build a network for the app served from `origin` with a request timeout.
    ///
    /// # Errors
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(origin: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self { client, origin })
    }

    /// The origin responses are compared against to decide their [ResponseType].
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let response_type = if response.url().origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_transport_error)?;

        Ok(HttpResponse {
            status,
            response_type,
            body: body.to_vec(),
        })
    }
}

fn map_transport_error(error: reqwest::Error) -> NetworkError {
    if error.is_timeout() {
        NetworkError::Timeout
    } else if error.is_builder() {
        NetworkError::InvalidRequest(error.to_string())
    } else {
        NetworkError::Unreachable(error.to_string())
    }
}


#[cfg(test)]
mod tests {
    use reqwest::{Method, Url};
    use serde_json::json;

    use super::{HttpRequest, HttpResponse};

    #[test]
    fn cache_key_is_method_and_absolute_url() {
        let url = Url::parse("https://kasir.example.com/manifest.json").unwrap();
        let request = HttpRequest::get(url);

        assert_eq!(request.cache_key(), "GET https://kasir.example.com/manifest.json");
    }

    #[test]
    fn json_request_serializes_body() {
        let request = HttpRequest::with_json(
            Method::POST,
            Url::parse("https://kasir.example.com/api/transactions").unwrap(),
            &json!({ "amount": 1 }),
        )
        .unwrap();

        assert_eq!(request.body.as_deref(), Some(br#"{"amount":1}"#.as_slice()));
    }

    #[test]
    fn success_is_2xx() {
        assert!(HttpResponse::json(201, &json!({})).is_success());
        assert!(!HttpResponse::json(404, &json!({})).is_success());
    }
}
