use reqwest::{
    Client, Method, StatusCode,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unique or exclusion constraint rejected the write (HTTP 409 / SQLSTATE 23505).
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    Header(String),
}

/// Thin PostgREST client. Every call authenticates with the server key from config.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_server_key().to_string(),
        }
    }

    fn get_headers(&self, prefer: Option<&'static str>) -> Result<HeaderMap, DatabaseError> {
        let mut headers = HeaderMap::new();

        let api_key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| DatabaseError::Header(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| DatabaseError::Header(e.to_string()))?;

        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer));
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        self.send(method, path, body, None).await
    }

    /// Write that returns the affected rows (`Prefer: return=representation`).
    pub async fn request_returning<T>(&self, method: Method, path: &str, body: Value) -> Result<Vec<T>, DatabaseError>
    where
        T: DeserializeOwned,
    {
        self.send(method, path, Some(body), Some("return=representation")).await
    }

    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        prefer: Option<&'static str>,
    ) -> Result<T, DatabaseError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut req = self.client.request(method, &url).headers(self.get_headers(prefer)?);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    error!("Supabase rejected credentials ({}): {}", status, error_text);
                    DatabaseError::Auth(error_text)
                }
                StatusCode::NOT_FOUND => DatabaseError::NotFound(error_text),
                StatusCode::CONFLICT => {
                    debug!("Supabase constraint violation: {}", error_text);
                    DatabaseError::Conflict(error_text)
                }
                _ => {
                    error!("API error ({}): {}", status, error_text);
                    DatabaseError::Api {
                        status: status.as_u16(),
                        message: error_text,
                    }
                }
            });
        }

        Ok(response.json::<T>().await?)
    }
}
