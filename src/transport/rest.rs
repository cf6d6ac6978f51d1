//! transport::rest
//!
//! Transport over the Salesforce REST API.
//!
//! # Design
//!
//! - Every request is signed through the [`TokenProvider`]
//! - A 401 answer triggers one refresh through
//!   [`TokenProvider::refresh_rejected`] and one retry; a second 401 is an
//!   [`AuthError::Rejected`]
//! - Other non-success statuses surface as [`SfError::Query`] with the remote
//!   error code and message; there is no retry
//! - Connection failures and timeouts surface as [`SfError::Network`]
//!
//! # Example
//!
//! ```ignore
//! use sftools::transport::{RestTransport, Transport};
//!
//! let transport = RestTransport::new(provider, "53.0", Duration::from_secs(30))?;
//! let rows = transport.query("SELECT Id FROM Case LIMIT 1").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::traits::{QueryResponse, Row, Transport};
use crate::error::SfError;
use crate::schema::{FieldSchema, FieldType, ObjectTypeSchema};
use crate::session::{AuthError, TokenProvider};

/// User-Agent header for REST requests.
const USER_AGENT_VALUE: &str = "sftools";

/// Salesforce REST transport.
pub struct RestTransport {
    client: Client,
    provider: Arc<dyn TokenProvider>,
    api_version: String,
}

impl std::fmt::Debug for RestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestTransport")
            .field("instance_url", &self.provider.instance_url())
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl RestTransport {
    /// Create a transport for the instance of `provider`.
    ///
    /// # Arguments
    ///
    /// * `provider` - Signs requests and refreshes rejected tokens
    /// * `api_version` - REST API version, e.g. "53.0"
    /// * `timeout` - Per-request timeout
    pub fn new(
        provider: Arc<dyn TokenProvider>,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, SfError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT_VALUE)
            .build()?;
        Ok(Self {
            client,
            provider,
            api_version: api_version.to_string(),
        })
    }

    fn instance_url(&self) -> &str {
        self.provider.instance_url().trim_end_matches('/')
    }

    /// Build URL for a data endpoint.
    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.instance_url(),
            self.api_version,
            path
        )
    }

    /// Send a signed request, refreshing and retrying once on 401.
    async fn send<F>(&self, build: F) -> Result<Response, SfError>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let signed = self.provider.authorize(build(&self.client)).await?;
        let response = signed.request.send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("SF: token rejected, refreshing once");
        let token = self.provider.refresh_rejected(&signed.token).await?;
        let response = build(&self.client).bearer_auth(&token).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Rejected.into());
        }
        Ok(response)
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, SfError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| SfError::Query {
                status: Some(status.as_u16()),
                message: format!("failed to parse response: {}", e),
            });
        }
        Err(Self::error_from(response).await)
    }

    /// Turn a non-success response into a query error.
    async fn error_from(response: Response) -> SfError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<Vec<RestError>>(&body) {
            Ok(errors) if !errors.is_empty() => errors
                .iter()
                .map(|e| format!("{}: {}", e.error_code, e.message))
                .collect::<Vec<_>>()
                .join("; "),
            _ if body.is_empty() => format!("HTTP {}", status.as_u16()),
            _ => body,
        };
        SfError::Query {
            status: Some(status.as_u16()),
            message,
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn query(&self, soql: &str) -> Result<QueryResponse, SfError> {
        let url = self.data_url("query");
        let response = self
            .send(|client| client.get(&url).query(&[("q", soql)]))
            .await?;
        let mut page: RestQueryPage = Self::handle_response(response).await?;

        let mut records: Vec<Row> = page.records.drain(..).map(strip_attributes).collect();
        let total_size = page.total_size;
        let mut next = page.next_records_url.take().filter(|_| !page.done);

        while let Some(path) = next {
            let url = format!("{}{}", self.instance_url(), path);
            debug!("SF: query_more({})", path);
            let response = self.send(|client| client.get(&url)).await?;
            let mut more: RestQueryPage = Self::handle_response(response).await?;
            records.extend(more.records.drain(..).map(strip_attributes));
            next = more.next_records_url.take().filter(|_| !more.done);
        }

        Ok(QueryResponse {
            total_size,
            done: true,
            records,
        })
    }

    async fn describe(&self, object_type: &str) -> Result<ObjectTypeSchema, SfError> {
        let url = self.data_url(&format!("sobjects/{}/describe", object_type));
        let response = self.send(|client| client.get(&url)).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(SfError::UnknownType(object_type.to_string()));
        }
        let described: RestDescribe = match Self::handle_response(response).await {
            Err(SfError::Query { message, .. }) if message.starts_with("NOT_FOUND") => {
                return Err(SfError::UnknownType(object_type.to_string()))
            }
            other => other?,
        };

        Ok(ObjectTypeSchema::new(
            described.name,
            described
                .fields
                .into_iter()
                .map(|f| FieldSchema {
                    name: f.name,
                    field_type: FieldType::from_remote(&f.field_type),
                    reference_to: f.reference_to,
                })
                .collect(),
        ))
    }

    async fn describe_global(&self) -> Result<Vec<String>, SfError> {
        let url = self.data_url("sobjects");
        let response = self.send(|client| client.get(&url)).await?;
        let global: RestGlobalDescribe = Self::handle_response(response).await?;
        Ok(global
            .sobjects
            .into_iter()
            .filter(|s| s.queryable && s.searchable)
            .map(|s| s.name)
            .collect())
    }

    async fn current_user_id(&self) -> Result<String, SfError> {
        if let Some(user_id) = self.provider.user_id() {
            return Ok(user_id);
        }
        let url = format!("{}/services/oauth2/userinfo", self.instance_url());
        let response = self.send(|client| client.get(&url)).await?;
        let info: RestUserInfo = Self::handle_response(response).await?;
        Ok(info.user_id)
    }

    async fn delete(&self, object_type: &str, id: &str) -> Result<(), SfError> {
        let url = self.data_url(&format!("sobjects/{}/{}", object_type, id));
        let response = self.send(|client| client.delete(&url)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_from(response).await)
        }
    }
}

/// Remove the remote `attributes` key from a row and its nested records.
fn strip_attributes(row: Row) -> Row {
    row.into_iter()
        .filter(|(key, _)| key != "attributes")
        .map(|(key, value)| match value {
            Value::Object(nested) => (key, Value::Object(strip_attributes(nested))),
            other => (key, other),
        })
        .collect()
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct RestError {
    #[serde(rename = "errorCode", default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestQueryPage {
    total_size: usize,
    done: bool,
    #[serde(default)]
    records: Vec<Row>,
    #[serde(default)]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RestDescribe {
    name: String,
    fields: Vec<RestField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    reference_to: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RestGlobalDescribe {
    sobjects: Vec<RestSObject>,
}

#[derive(Debug, Deserialize)]
struct RestSObject {
    name: String,
    #[serde(default)]
    queryable: bool,
    #[serde(default)]
    searchable: bool,
}

#[derive(Debug, Deserialize)]
struct RestUserInfo {
    user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strip_attributes_removes_nested() {
        let row = json!({
            "attributes": {"type": "Case"},
            "Id": "500A",
            "Owner": {"attributes": {"type": "User"}, "Name": "Ann"}
        });
        let Value::Object(row) = row else {
            panic!("object expected")
        };
        let stripped = strip_attributes(row);
        assert!(!stripped.contains_key("attributes"));
        assert_eq!(stripped["Owner"], json!({"Name": "Ann"}));
    }

    #[test]
    fn query_page_deserialize() {
        let json = r#"{
            "totalSize": 3,
            "done": false,
            "nextRecordsUrl": "/services/data/v53.0/query/01gxx-2000",
            "records": [{"attributes": {"type": "Case"}, "Id": "500A"}]
        }"#;
        let page: RestQueryPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.total_size, 3);
        assert!(!page.done);
        assert_eq!(page.records.len(), 1);
        assert!(page.next_records_url.is_some());
    }

    #[test]
    fn describe_field_deserialize() {
        let json = r#"{"name": "OwnerId", "type": "reference", "referenceTo": ["Group", "User"]}"#;
        let field: RestField = serde_json::from_str(json).unwrap();
        assert_eq!(field.field_type, "reference");
        assert_eq!(field.reference_to, vec!["Group", "User"]);
    }
}
