use crate::engine::error::{ApiError, Result};
use crate::engine::transport::{HttpMethod, RawResponse, RequestDescriptor, Transport, TransportError};
use async_trait::async_trait;
use reqwest::{
    Client, Method, Url,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};
use std::time::Duration;

/// Header carrying the caller's experience identifiers
pub const EXPERIENCE_ID_HEADER: &str = "x-goog-maps-experience-id";

const CLIENT_USER_AGENT: &str = concat!("geoapi-rs/", env!("CARGO_PKG_VERSION"));

/// Settings for the built-in HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub experience_ids: Vec<String>,
}

/// A [`Transport`] backed by the async reqwest client
///
/// Appends the API key as the `key` query parameter and sends POST bodies as
/// JSON. Dropping the future returned by `invoke` aborts the request.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &HttpTransportConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ApiError::Config(format!("Invalid base URL '{}': {e}", config.base_url)))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if !config.experience_ids.is_empty() {
            let joined = config.experience_ids.join(",");
            let value = HeaderValue::try_from(joined.as_str()).map_err(|e| {
                ApiError::Config(format!("Invalid experience id '{joined}': {e}"))
            })?;
            headers.insert(HeaderName::from_static(EXPERIENCE_ID_HEADER), value);
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    /// Absolute URL for a request, including query parameters and key
    pub fn url_for(&self, request: &RequestDescriptor) -> std::result::Result<Url, TransportError> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| TransportError::Io(format!("Invalid request path '{}': {e}", request.path)))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &request.params {
                query.append_pair(key, value);
            }
            if let Some(api_key) = &self.api_key {
                query.append_pair("key", api_key);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn invoke(
        &self,
        request: &RequestDescriptor,
    ) -> std::result::Result<RawResponse, TransportError> {
        let url = self.url_for(request)?;

        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };
        let mut builder = self.client.request(method, url);
        if let (HttpMethod::Post, Some(body)) = (request.method, &request.body) {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(format!("HTTP request timed out: {e}"))
            } else if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Io(format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(format!("Timed out reading response body: {e}"))
            } else {
                TransportError::Io(format!("Failed to read response body: {e}"))
            }
        })?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(api_key: Option<&str>) -> HttpTransport {
        HttpTransport::new(&HttpTransportConfig {
            base_url: "https://maps.example.com".to_string(),
            api_key: api_key.map(str::to_string),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(20),
            experience_ids: vec!["exp-1".to_string(), "exp-2".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn test_url_includes_params_and_key() {
        let request = RequestDescriptor::get("/maps/api/geocode/json")
            .param("address", "10 Downing St, London")
            .param("region", "uk");
        let url = transport(Some("AIzaTest")).url_for(&request).unwrap();

        assert_eq!(url.path(), "/maps/api/geocode/json");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("address".to_string(), "10 Downing St, London".to_string()),
                ("region".to_string(), "uk".to_string()),
                ("key".to_string(), "AIzaTest".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_without_query() {
        let url = transport(None)
            .url_for(&RequestDescriptor::get("/maps/api/timezone/json"))
            .unwrap();
        assert_eq!(url.as_str(), "https://maps.example.com/maps/api/timezone/json");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = HttpTransport::new(&HttpTransportConfig {
            base_url: "not a url".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_secs(1),
            experience_ids: vec![],
        });
        assert!(matches!(result, Err(ApiError::Config(_))));
    }
}
