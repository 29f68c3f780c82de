use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use shared::{
    domain::PageId,
    error::ApiError,
    protocol::{ActionOutcome, CoverPageDocument, NewQuestion, PageRequest, PageResult},
};

use crate::{
    backends::{CompositionBackend, ListingBackend, RegistryBackend, RegistryEntity},
    error::FetchError,
};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend speaking the server's JSON API over reqwest. One instance serves
/// every controller; reqwest pools connections internally.
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Turns an error status into the fetch taxonomy. A 4xx carrying an
    /// `ApiError` body becomes `Rejected` with the server's own wording.
    async fn check_status(response: Response) -> Result<Response, FetchError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status.is_client_error() && status != StatusCode::REQUEST_TIMEOUT {
            if let Ok(api_error) = response.json::<ApiError>().await {
                return Err(FetchError::Rejected(api_error.message));
            }
        }
        Err(FetchError::ServerError(status.as_u16()))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, FetchError> {
        let response = Self::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}

fn map_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() {
        FetchError::NetworkUnavailable
    } else if let Some(status) = err.status() {
        FetchError::ServerError(status.as_u16())
    } else if err.is_decode() {
        FetchError::MalformedResponse(err.to_string())
    } else {
        FetchError::NetworkUnavailable
    }
}

#[derive(Serialize)]
struct ListQuery<'a> {
    collection: &'static str,
    page: u32,
    search: &'a str,
    per_page: u32,
}

#[async_trait]
impl<T: DeserializeOwned + Send + 'static> ListingBackend<T> for HttpBackend {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>, FetchError> {
        let response = self
            .http
            .get(self.url("/api/list"))
            .query(&ListQuery {
                collection: request.collection.as_str(),
                page: request.page,
                search: &request.search,
                per_page: request.per_page,
            })
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }
}

#[async_trait]
impl CompositionBackend for HttpBackend {
    async fn save_page(&self, document: &CoverPageDocument) -> Result<ActionOutcome, FetchError> {
        let response = self
            .http
            .post(self.url("/api/pages"))
            .json(document)
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }

    async fn load_page(&self, id: PageId) -> Result<CoverPageDocument, FetchError> {
        let response = self
            .http
            .get(self.url(&format!("/api/pages/{}", id.0)))
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }

    async fn save_question(&self, content: &str) -> Result<ActionOutcome, FetchError> {
        let response = self
            .http
            .post(self.url("/api/questions"))
            .json(&NewQuestion {
                content: content.to_string(),
            })
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }
}

#[async_trait]
impl<E> RegistryBackend<E> for HttpBackend
where
    E: RegistryEntity,
    E::Draft: Serialize,
{
    async fn create(&self, draft: &E::Draft) -> Result<ActionOutcome, FetchError> {
        let response = self
            .http
            .post(self.url(&format!("/api/{}", E::collection())))
            .json(draft)
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }

    async fn update(&self, id: i64, draft: &E::Draft) -> Result<ActionOutcome, FetchError> {
        let response = self
            .http
            .put(self.url(&format!("/api/{}/{id}", E::collection())))
            .json(draft)
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }

    async fn delete(&self, id: i64) -> Result<ActionOutcome, FetchError> {
        let response = self
            .http
            .delete(self.url(&format!("/api/{}/{id}", E::collection())))
            .send()
            .await
            .map_err(map_transport)?;
        Self::decode(response).await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
