//! Integration tests for the REST transport.
//!
//! A wiremock server stands in for the Salesforce REST API; requests are
//! signed by a fixed token provider. Tests against a real org are behind
//! the `live_salesforce_tests` feature flag.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sftools::client::{Sf, SfOptions};
use sftools::schema::FieldType;
use sftools::session::{AuthError, TokenProvider};
use sftools::transport::{RestTransport, Transport};
use sftools::SfError;

// =============================================================================
// Test Helpers
// =============================================================================

struct FixedToken {
    instance_url: String,
    user_id: Option<String>,
}

#[async_trait]
impl TokenProvider for FixedToken {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok("fixed-token".to_string())
    }

    async fn refresh_rejected(&self, _rejected: &str) -> Result<String, AuthError> {
        Err(AuthError::Rejected)
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

fn transport(server: &MockServer, user_id: Option<&str>) -> RestTransport {
    let provider = Arc::new(FixedToken {
        instance_url: server.uri(),
        user_id: user_id.map(str::to_string),
    });
    RestTransport::new(provider, "53.0", Duration::from_secs(5)).unwrap()
}

fn data(suffix: &str) -> String {
    format!("/services/data/v53.0/{}", suffix)
}

fn case_describe() -> serde_json::Value {
    json!({
        "name": "Case",
        "fields": [
            {"name": "Id", "type": "id"},
            {"name": "CaseNumber", "type": "string"},
            {"name": "Subject", "type": "string"},
            {"name": "IsClosed", "type": "boolean"},
            {"name": "OwnerId", "type": "reference", "referenceTo": ["User", "Group"]},
            {"name": "CreatedDate", "type": "datetime"}
        ]
    })
}

// =============================================================================
// Query
// =============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn query_is_signed_and_follows_next_records_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data("query")))
            .and(query_param("q", "SELECT Id FROM Case"))
            .and(header("authorization", "Bearer fixed-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 3,
                "done": false,
                "nextRecordsUrl": "/services/data/v53.0/query/01gXX-2000",
                "records": [
                    {"attributes": {"type": "Case"}, "Id": "500A"},
                    {"attributes": {"type": "Case"}, "Id": "500B"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(data("query/01gXX-2000")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 3,
                "done": true,
                "records": [
                    {"attributes": {"type": "Case"}, "Id": "500C", "Owner": {"attributes": {"type": "User"}, "Alias": "jdoe"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = transport(&server, None)
            .query("SELECT Id FROM Case")
            .await
            .unwrap();

        assert_eq!(response.total_size, 3);
        let ids: Vec<&str> = response
            .records
            .iter()
            .map(|r| r["Id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["500A", "500B", "500C"]);
        assert_eq!(response.records[2]["Owner"], json!({"Alias": "jdoe"}));
    }

    #[tokio::test]
    async fn remote_errors_become_query_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data("query")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!([{
                "errorCode": "INVALID_FIELD",
                "message": "No such column 'Bogus__c' on entity 'Case'"
            }])))
            .mount(&server)
            .await;

        let err = transport(&server, None)
            .query("SELECT Id, Bogus__c FROM Case")
            .await
            .unwrap_err();
        match err {
            SfError::Query { status, message } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "INVALID_FIELD: No such column 'Bogus__c' on entity 'Case'");
            }
            other => panic!("expected a query error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let provider = Arc::new(FixedToken {
            instance_url: "http://127.0.0.1:9".to_string(),
            user_id: None,
        });
        let transport = RestTransport::new(provider, "53.0", Duration::from_secs(2)).unwrap();
        let err = transport.query("SELECT Id FROM Case").await.unwrap_err();
        assert_eq!(err.kind(), "NetworkError");
    }
}

// =============================================================================
// Metadata
// =============================================================================

mod metadata_tests {
    use super::*;

    #[tokio::test]
    async fn describe_maps_field_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data("sobjects/Case/describe")))
            .respond_with(ResponseTemplate::new(200).set_body_json(case_describe()))
            .mount(&server)
            .await;

        let schema = transport(&server, None).describe("Case").await.unwrap();
        assert_eq!(
            schema.field_names(),
            vec!["Id", "CaseNumber", "Subject", "IsClosed", "OwnerId", "CreatedDate"]
        );
        let owner = schema.field("ownerid").unwrap();
        assert_eq!(owner.field_type, FieldType::Reference);
        assert_eq!(owner.reference_to, vec!["User".to_string(), "Group".to_string()]);
        assert_eq!(schema.field("IsClosed").unwrap().field_type, FieldType::Boolean);
    }

    #[tokio::test]
    async fn describe_unknown_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data("sobjects/Nope__c/describe")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!([{
                "errorCode": "NOT_FOUND",
                "message": "The requested resource does not exist"
            }])))
            .mount(&server)
            .await;

        let err = transport(&server, None).describe("Nope__c").await.unwrap_err();
        assert!(matches!(err, SfError::UnknownType(ref t) if t == "Nope__c"));
    }

    #[tokio::test]
    async fn describe_global_keeps_queryable_searchable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data("sobjects")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sobjects": [
                    {"name": "Case", "queryable": true, "searchable": true},
                    {"name": "CaseHistory", "queryable": true, "searchable": false},
                    {"name": "TimeCard__c", "queryable": true, "searchable": true}
                ]
            })))
            .mount(&server)
            .await;

        let types = transport(&server, None).describe_global().await.unwrap();
        assert_eq!(types, vec!["Case", "TimeCard__c"]);
    }

    #[tokio::test]
    async fn current_user_from_userinfo() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/oauth2/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user_id": "005000000000001AAA",
                "organization_id": "00D000000000001AAA"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = transport(&server, None).current_user_id().await.unwrap();
        assert_eq!(user, "005000000000001AAA");
    }

    #[tokio::test]
    async fn current_user_from_session_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/oauth2/userinfo"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let user = transport(&server, Some("005KNOWN"))
            .current_user_id()
            .await
            .unwrap();
        assert_eq!(user, "005KNOWN");
    }
}

// =============================================================================
// Delete
// =============================================================================

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn delete_sends_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(data("sobjects/CaseComment/00a000000000001AAA")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server, None)
            .delete("CaseComment", "00a000000000001AAA")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_missing_is_query_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!([{
                "errorCode": "NOT_FOUND",
                "message": "The requested resource does not exist"
            }])))
            .mount(&server)
            .await;

        let err = transport(&server, None)
            .delete("CaseComment", "00a000000000009AAA")
            .await
            .unwrap_err();
        assert!(matches!(err, SfError::Query { status: Some(404), .. }));
    }
}

// =============================================================================
// Client over REST
// =============================================================================

mod client_tests {
    use super::*;

    #[tokio::test]
    async fn get_case_by_number_then_lazy_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data("sobjects/Case/describe")))
            .respond_with(ResponseTemplate::new(200).set_body_json(case_describe()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(data("query")))
            .and(query_param(
                "q",
                "SELECT Id FROM Case WHERE CaseNumber = '00001234' ORDER BY Id LIMIT 1",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 1,
                "done": true,
                "records": [{"attributes": {"type": "Case"}, "Id": "500000000000001AAA"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(data("query")))
            .and(query_param(
                "q",
                "SELECT Id, Subject FROM Case WHERE Id = '500000000000001AAA' ORDER BY Id LIMIT 1",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalSize": 1,
                "done": true,
                "records": [{"attributes": {"type": "Case"}, "Id": "500000000000001AAA", "Subject": "Printer on fire"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sf = Sf::with_transport(Arc::new(transport(&server, None)), SfOptions::default());
        let case = sf.get("Case", "1234").await.unwrap().unwrap();
        assert_eq!(case.id(), "500000000000001AAA");
        assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));
        assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));
    }
}

// =============================================================================
// Live Salesforce Tests (behind feature flag)
// =============================================================================

#[cfg(feature = "live_salesforce_tests")]
mod live_tests {
    use super::*;

    struct EnvToken {
        instance_url: String,
        token: String,
    }

    #[async_trait]
    impl TokenProvider for EnvToken {
        async fn bearer_token(&self) -> Result<String, AuthError> {
            Ok(self.token.clone())
        }

        async fn refresh_rejected(&self, _rejected: &str) -> Result<String, AuthError> {
            Err(AuthError::Rejected)
        }

        fn instance_url(&self) -> &str {
            &self.instance_url
        }

        fn user_id(&self) -> Option<String> {
            None
        }
    }

    fn live_transport() -> Option<RestTransport> {
        let instance_url = std::env::var("SFTOOLS_TEST_INSTANCE_URL").ok()?;
        let token = std::env::var("SFTOOLS_TEST_ACCESS_TOKEN").ok()?;
        let provider = Arc::new(EnvToken {
            instance_url,
            token,
        });
        RestTransport::new(provider, "53.0", Duration::from_secs(30)).ok()
    }

    #[tokio::test]
    async fn live_describe_case() {
        let Some(transport) = live_transport() else {
            eprintln!("Skipping: SFTOOLS_TEST_INSTANCE_URL/SFTOOLS_TEST_ACCESS_TOKEN not set");
            return;
        };

        let schema = transport.describe("Case").await.unwrap();
        assert!(schema.has_field("CaseNumber"));
    }

    #[tokio::test]
    async fn live_current_user_exists() {
        let Some(transport) = live_transport() else {
            eprintln!("Skipping: SFTOOLS_TEST_INSTANCE_URL/SFTOOLS_TEST_ACCESS_TOKEN not set");
            return;
        };

        let sf = Sf::with_transport(Arc::new(transport), SfOptions::default());
        let me = sf.me().await.unwrap();
        assert!(sftools::client::is_record_id(me.id()));
    }
}
