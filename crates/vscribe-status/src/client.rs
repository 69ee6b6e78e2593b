//! PostgREST client for the status store.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StatusError, StatusResult};

/// Status store configuration.
#[derive(Debug, Clone)]
pub struct StatusStoreConfig {
    /// Base URL of the store (the project URL, without `/rest/v1`)
    pub base_url: String,
    /// Service key, sent as both `apikey` and bearer token
    pub service_key: String,
    pub timeout: Duration,
}

impl StatusStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StatusResult<Self> {
        Ok(Self {
            base_url: std::env::var("SUPABASE_URL")
                .map_err(|_| StatusError::config_error("SUPABASE_URL not set"))?,
            service_key: std::env::var("SUPABASE_SERVICE_KEY")
                .map_err(|_| StatusError::config_error("SUPABASE_SERVICE_KEY not set"))?,
            timeout: Duration::from_secs(30),
        })
    }
}

/// Thin PostgREST client: upsert, patch, select, delete on rows.
#[derive(Clone)]
pub struct StatusStoreClient {
    http: Client,
    base_url: String,
    service_key: String,
}

impl StatusStoreClient {
    pub fn new(config: StatusStoreConfig) -> StatusResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(StatusError::Network)?;

        Ok(Self {
            http,
            base_url: format!("{}/rest/v1", config.base_url.trim_end_matches('/')),
            service_key: config.service_key,
        })
    }

    pub fn from_env() -> StatusResult<Self> {
        Self::new(StatusStoreConfig::from_env()?)
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Insert or replace a row keyed by its primary key.
    pub async fn upsert<T: Serialize + ?Sized>(&self, table: &str, row: &T) -> StatusResult<()> {
        let url = self.table_url(table);
        debug!("Upserting row into {}", table);

        let response = self
            .authed(self.http.post(&url))
            .header("Prefer", "resolution=merge-duplicates")
            .json(row)
            .send()
            .await?;

        Self::expect_success(table, response).await
    }

    /// Patch columns of the row matching `key_column = key`.
    pub async fn patch<T: Serialize + ?Sized>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        patch: &T,
    ) -> StatusResult<()> {
        let url = format!("{}?{}=eq.{}", self.table_url(table), key_column, key);

        let response = self
            .authed(self.http.patch(&url))
            .json(patch)
            .send()
            .await?;

        Self::expect_success(table, response).await
    }

    /// Fetch the row matching `key_column = key`, if present.
    pub async fn get_row<T: DeserializeOwned>(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> StatusResult<Option<T>> {
        let url = format!(
            "{}?{}=eq.{}&select=*",
            self.table_url(table),
            key_column,
            key
        );

        let response = self.authed(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(Self::failure(table, response).await);
        }

        let mut rows: Vec<T> = response.json().await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Delete rows matching `key_column = key`.
    pub async fn delete(&self, table: &str, key_column: &str, key: &str) -> StatusResult<()> {
        let url = format!("{}?{}=eq.{}", self.table_url(table), key_column, key);

        let response = self.authed(self.http.delete(&url)).send().await?;
        Self::expect_success(table, response).await
    }

    /// Delete rows matching an arbitrary PostgREST filter, returning
    /// how many were removed.
    pub async fn delete_where(&self, table: &str, filter: &str) -> StatusResult<u32> {
        let url = format!("{}?{}", self.table_url(table), filter);

        let response = self
            .authed(self.http.delete(&url))
            .header("Prefer", "return=representation")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(table, response).await);
        }

        let rows: Vec<serde_json::Value> = response.json().await?;
        Ok(rows.len() as u32)
    }

    async fn expect_success(table: &str, response: reqwest::Response) -> StatusResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::failure(table, response).await)
        }
    }

    async fn failure(table: &str, response: reqwest::Response) -> StatusError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            StatusError::not_found(table.to_string())
        } else {
            StatusError::request_failed(format!("{} request failed with {}: {}", table, status, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> StatusStoreClient {
        StatusStoreClient::new(StatusStoreConfig {
            base_url: server.uri(),
            service_key: "svc-key".into(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_sends_merge_duplicates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/processing_status"))
            .and(header("Prefer", "resolution=merge-duplicates"))
            .and(header("apikey", "svc-key"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .upsert("processing_status", &json!({"upload_id": "up-1"}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_row_returns_first_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/processing_status"))
            .and(query_param("upload_id", "eq.up-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"upload_id": "up-1"}])),
            )
            .mount(&server)
            .await;

        let row: Option<serde_json::Value> = client(&server)
            .await
            .get_row("processing_status", "upload_id", "up-1")
            .await
            .unwrap();
        assert_eq!(row.unwrap()["upload_id"], "up-1");
    }

    #[tokio::test]
    async fn test_get_row_empty_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/processing_status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let row: Option<serde_json::Value> = client(&server)
            .await
            .get_row("processing_status", "upload_id", "up-x")
            .await
            .unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_delete_where_counts_rows() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/processing_checkpoints"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"upload_id": "a"}, {"upload_id": "b"}])),
            )
            .mount(&server)
            .await;

        let count = client(&server)
            .await
            .delete_where("processing_checkpoints", "expires_at=lt.2024-01-01")
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/processing_status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .upsert("processing_status", &json!({}))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
