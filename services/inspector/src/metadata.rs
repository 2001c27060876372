//! Prize metadata publication.
//!
//! Multi-edition prizes each get their own metadata document; the returned
//! URI goes into the Merkle leaf, so publication must happen before the
//! tree is built.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait MetadataPublisher: Send + Sync {
    /// Publish one metadata document and return its permanent URI.
    async fn publish(
        &self,
        name: &str,
        description: &str,
        image_url: &str,
    ) -> Result<String, MetadataError>;
}

#[derive(Serialize)]
struct MetadataDocument<'a> {
    name: &'a str,
    description: &'a str,
    image: &'a str,
}

#[derive(Deserialize)]
struct PublishResponse {
    uri: String,
}

/// POSTs metadata JSON to the pinning gateway.
pub struct HttpMetadataPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetadataPublisher {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl MetadataPublisher for HttpMetadataPublisher {
    async fn publish(
        &self,
        name: &str,
        description: &str,
        image_url: &str,
    ) -> Result<String, MetadataError> {
        let document = MetadataDocument {
            name,
            description,
            image: image_url,
        };
        let response: PublishResponse = self
            .client
            .post(&self.endpoint)
            .json(&document)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.uri)
    }
}
