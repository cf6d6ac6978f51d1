//! Integration tests for the client against MockTransport.
//!
//! These tests exercise record lookup, lazy fields, the schema cache,
//! queries and relations end to end without a network.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use sftools::client::{Sf, SfOptions};
use sftools::query::{FilterOptions, FilterSpec, Literal};
use sftools::record::Population;
use sftools::schema::{FieldSchema, FieldType, ObjectTypeSchema};
use sftools::transport::mock::{FailOn, MockOperation, MockTransport};
use sftools::SfError;

// =============================================================================
// Test Helpers
// =============================================================================

const CASE_ID: &str = "500000000000001AAA";
const ME: &str = "005000000000001AAA";

fn org() -> MockTransport {
    MockTransport::new()
        .with_current_user(ME)
        .with_record(
            "Case",
            json!({
                "Id": CASE_ID,
                "CaseNumber": "00001234",
                "Subject": "Printer on fire",
                "Status": "New",
                "IsClosed": false,
                "OwnerId": ME
            }),
        )
        .with_record(
            "Case",
            json!({
                "Id": "500000000000002AAA",
                "CaseNumber": "00001235",
                "Subject": "It's broken",
                "Status": "Closed",
                "IsClosed": true,
                "OwnerId": "005000000000002AAA"
            }),
        )
        .with_record(
            "CaseComment",
            json!({"Id": "00a000000000001AAA", "ParentId": CASE_ID, "CommentBody": "Smoke seen", "CreatedById": ME}),
        )
        .with_record(
            "CaseComment",
            json!({"Id": "00a000000000002AAA", "ParentId": CASE_ID, "CommentBody": "Fire out", "CreatedById": ME}),
        )
        .with_record(
            "TimeCard__c",
            json!({
                "Id": "a0B000000000001AAA",
                "CaseId__c": CASE_ID,
                "StartTime__c": "2024-01-15T09:00:00",
                "TotalMinutesStatic__c": 30,
                "OwnerId": ME
            }),
        )
        .with_record(
            "TimeCard__c",
            json!({
                "Id": "a0B000000000002AAA",
                "CaseId__c": CASE_ID,
                "StartTime__c": "2024-02-15T09:00:00",
                "TotalMinutesStatic__c": 90,
                "OwnerId": ME
            }),
        )
        .with_record("User", json!({"Id": ME, "Alias": "jdoe", "Name": "Jo Doe"}))
}

fn client(mock: &MockTransport) -> Sf {
    Sf::with_transport(Arc::new(mock.clone()), SfOptions::default())
}

// =============================================================================
// Lookup
// =============================================================================

mod lookup_tests {
    use super::*;

    #[tokio::test]
    async fn get_case_by_padded_number() {
        let mock = org();
        let case = client(&mock).get("Case", "00001234").await.unwrap().unwrap();
        assert_eq!(case.id(), CASE_ID);
        assert_eq!(case.object_type(), "Case");
    }

    #[tokio::test]
    async fn get_absent_record_is_none() {
        let mock = org();
        assert!(client(&mock).get("Case", "00009999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_unknown_type_is_unknown_type_error() {
        let err = client(&org()).get("Widget__c", "1").await.unwrap_err();
        assert!(matches!(err, SfError::UnknownType(ref t) if t == "Widget__c"));
    }

    #[tokio::test]
    async fn same_record_from_two_queries_shares_fields() {
        let mock = org();
        let sf = client(&mock);

        let by_number = sf.get("Case", "1234").await.unwrap().unwrap();
        by_number.field("Subject").await.unwrap();

        let listed = sf
            .find(&FilterSpec::new("Case").eq("Status", "New"))
            .await
            .unwrap();
        let same = listed.first().unwrap();
        assert_eq!(same.cached("Subject"), Some(json!("Printer on fire")));
    }

    #[tokio::test]
    async fn requery_replaces_changed_field() {
        let mock = org();
        let sf = client(&mock);

        let case = sf.get("Case", "1234").await.unwrap().unwrap();
        assert_eq!(case.field("Subject").await.unwrap(), json!("Printer on fire"));

        mock.set_field("Case", CASE_ID, "Subject", json!("Printer replaced"));
        let listed = sf
            .find(&FilterSpec::new("Case").select(["Subject"]).eq("Status", "New"))
            .await
            .unwrap();
        assert_eq!(listed.first().unwrap().id(), CASE_ID);
        assert_eq!(case.cached("Subject"), Some(json!("Printer replaced")));
        assert_eq!(case.field("Subject").await.unwrap(), json!("Printer replaced"));
    }
}

// =============================================================================
// Lazy Fields
// =============================================================================

mod field_tests {
    use super::*;

    #[tokio::test]
    async fn field_access_is_idempotent() {
        let mock = org();
        let case = client(&mock).get("Case", CASE_ID).await.unwrap().unwrap();

        let before = mock.query_count();
        let first = case.field("Status").await.unwrap();
        let second = case.field("Status").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(mock.query_count(), before + 1);
    }

    #[tokio::test]
    async fn field_not_found_makes_no_query() {
        let mock = org();
        let case = client(&mock).get("Case", CASE_ID).await.unwrap().unwrap();
        let before = mock.query_count();

        let err = case.field("Resolution__c").await.unwrap_err();
        assert_eq!(err.kind(), "FieldNotFoundError");
        assert_eq!(mock.query_count(), before);
    }

    #[tokio::test]
    async fn population_is_monotonic() {
        let mock = org();
        let sf = client(&mock);
        let case = sf.get("Case", CASE_ID).await.unwrap().unwrap();
        assert_eq!(case.population(), Population::Unpopulated);

        case.field("Subject").await.unwrap();
        assert_eq!(case.population(), Population::Partial);

        case.populate_all().await.unwrap();
        assert_eq!(case.population(), Population::Full);

        // A narrower query of the same record does not demote it.
        sf.find(&FilterSpec::new("Case").select(["Status"]).eq("Status", "New"))
            .await
            .unwrap();
        assert_eq!(case.population(), Population::Full);

        let before = mock.query_count();
        assert_eq!(case.field("OwnerId").await.unwrap(), json!(ME));
        assert_eq!(mock.query_count(), before);
    }

    #[tokio::test]
    async fn preload_mode_fetches_all_fields_up_front() {
        let mock = org();
        let sf = Sf::with_transport(
            Arc::new(mock.clone()),
            SfOptions {
                preload_fields: true,
                ..Default::default()
            },
        );
        let case = sf.get("Case", "1234").await.unwrap().unwrap();
        assert_eq!(case.population(), Population::Full);
        assert!(mock.statements()[0].starts_with("SELECT FIELDS(ALL) FROM Case"));
    }

    #[tokio::test]
    async fn dump_fields_labels() {
        let mock = org();
        let sf = client(&mock);
        let case = sf.get("Case", CASE_ID).await.unwrap().unwrap();

        let one = case
            .dump_fields(Some(&["Subject".to_string()]), None)
            .await
            .unwrap();
        assert_eq!(one, "Printer on fire");

        let two = case
            .dump_fields(Some(&["CaseNumber".to_string(), "Subject".to_string()]), None)
            .await
            .unwrap();
        assert_eq!(two, "CaseNumber: 00001234\nSubject: Printer on fire");

        let comment = sf.get("CaseComment", "00a000000000001AAA").await.unwrap().unwrap();
        assert_eq!(comment.dump_fields(None, None).await.unwrap(), "Smoke seen");
    }
}

// =============================================================================
// Schema Cache
// =============================================================================

mod schema_tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_describes_make_one_request() {
        let mock = org().with_describe_delay(Duration::from_millis(50));
        let sf = Arc::new(client(&mock));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let sf = sf.clone();
            handles.push(tokio::spawn(async move {
                sf.schema().describe("Case").await.map(|s| s.field_names().len())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 6);
        }
        assert_eq!(mock.describe_count(), 1);
        assert!(sf.schema().is_cached("Case"));
    }

    #[tokio::test]
    async fn concurrent_describes_of_unknown_type_make_one_request() {
        let mock = org().with_describe_delay(Duration::from_millis(50));
        let sf = Arc::new(client(&mock));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            handles.push(tokio::spawn(async move {
                sf.schema().describe("Nope__c").await.map(|_| ())
            }));
        }
        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, SfError::UnknownType(ref t) if t == "Nope__c"));
        }
        assert_eq!(mock.describe_count(), 1);

        assert!(sf.get("Nope__c", "1").await.is_err());
        assert_eq!(mock.describe_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_a_failed_describe() {
        let mock = org()
            .with_describe_delay(Duration::from_millis(50))
            .fail_on(FailOn::Describe(SfError::Network("timed out".into())));
        let sf = Arc::new(client(&mock));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sf = sf.clone();
            handles.push(tokio::spawn(async move {
                sf.schema().describe("Case").await.map(|_| ())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap_err().kind(), "NetworkError");
        }
        assert_eq!(mock.describe_count(), 1);
    }

    #[tokio::test]
    async fn failed_describe_is_retried_later() {
        let mock = org().fail_on(FailOn::Describe(SfError::Network("timed out".into())));
        let sf = client(&mock);

        assert_eq!(sf.schema().describe("Case").await.unwrap_err().kind(), "NetworkError");
        mock.clear_fail_on();
        assert!(sf.schema().describe("Case").await.is_ok());
        assert_eq!(mock.describe_count(), 2);
    }

    #[tokio::test]
    async fn field_names_follow_schema_order() {
        let mock = MockTransport::new().with_schema(ObjectTypeSchema::new(
            "Account",
            vec![
                FieldSchema::new("Id", FieldType::Reference),
                FieldSchema::new("Name", FieldType::String),
                FieldSchema::new("AnnualRevenue", FieldType::Number),
            ],
        ));
        let names = client(&mock).schema().field_names("Account").await.unwrap();
        assert_eq!(names, vec!["Id", "Name", "AnnualRevenue"]);
    }

    #[tokio::test]
    async fn object_types_are_listed_once() {
        let mock = org();
        let sf = client(&mock);
        let types = sf.object_types().await.unwrap();
        assert!(types.contains(&"TimeCard__c".to_string()));
        sf.object_types().await.unwrap();
        assert_eq!(
            mock.operations()
                .iter()
                .filter(|op| **op == MockOperation::DescribeGlobal)
                .count(),
            1
        );
    }
}

// =============================================================================
// Queries
// =============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn timecards_in_january() {
        let mock = org();
        let options = FilterOptions {
            after: Some(sftools::query::parse_datetime("2024-01-01").unwrap()),
            before: Some(sftools::query::parse_datetime("2024-02-01").unwrap()),
            ..Default::default()
        };
        let cards = client(&mock)
            .object("TimeCard__c")
            .find_options(&options)
            .await
            .unwrap();

        assert_eq!(cards.ids(), vec!["a0B000000000001AAA"]);
        assert_eq!(
            mock.statements()[0],
            "SELECT COUNT() FROM TimeCard__c WHERE StartTime__c >= '2024-01-01T00:00:00' AND StartTime__c <= '2024-02-01T00:00:00'"
        );
    }

    #[tokio::test]
    async fn quotes_in_values_are_escaped() {
        let mock = org();
        let cases = client(&mock)
            .find(&FilterSpec::new("Case").eq("Subject", "It's broken"))
            .await
            .unwrap();
        assert_eq!(cases.ids(), vec!["500000000000002AAA"]);
        assert!(mock.statements()[0].contains(r"Subject = 'It\'s broken'"));
    }

    #[tokio::test]
    async fn empty_filter_matches_everything() {
        let mock = org();
        let cases = client(&mock).find(&FilterSpec::new("Case")).await.unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(mock.statements()[0], "SELECT COUNT() FROM Case");
        assert_eq!(mock.statements()[1], "SELECT Id FROM Case ORDER BY Id LIMIT 2");
    }

    #[tokio::test]
    async fn mine_uses_current_user() {
        let mock = org();
        let options = FilterOptions {
            mine: true,
            min: Some(60.0),
            ..Default::default()
        };
        let cards = client(&mock)
            .object("TimeCard__c")
            .find_options(&options)
            .await
            .unwrap();
        assert_eq!(cards.ids(), vec!["a0B000000000002AAA"]);
    }

    #[tokio::test]
    async fn unknown_filter_field_is_query_error() {
        let mock = org();
        let err = client(&mock)
            .find(&FilterSpec::new("Case").eq("Bogus__c", Literal::Null))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "QueryError");
    }

    #[tokio::test]
    async fn too_many_results_are_refused() {
        let mock = MockTransport::new();
        for i in 0..4001 {
            mock.add_record("Task", json!({"Id": format!("00T{:015}", i)}));
        }
        let err = client(&mock)
            .find(&FilterSpec::new("Task").limit(5000))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "query failed: Query matches too many results (4001)");
    }
}

// =============================================================================
// Relations
// =============================================================================

mod relation_tests {
    use super::*;

    #[tokio::test]
    async fn case_comments_and_timecards() {
        let mock = org();
        let sf = client(&mock);
        let case = sf.get("Case", "1234").await.unwrap().unwrap();

        let comments = sf.related(&case, "comments", &FilterOptions::default()).await.unwrap();
        assert_eq!(comments.len(), 2);

        let cards = case
            .related(
                "timecards",
                &FilterOptions {
                    min: Some(60.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cards.ids(), vec!["a0B000000000002AAA"]);
    }

    #[tokio::test]
    async fn my_open_cases() {
        let mock = org();
        let sf = client(&mock);
        let me = sf.me().await.unwrap();
        let cases = me.related("cases", &FilterOptions::default()).await.unwrap();
        assert_eq!(cases.ids(), vec![CASE_ID]);
    }

    #[tokio::test]
    async fn deleted_comment_leaves_relation() {
        let mock = org();
        let sf = client(&mock);
        assert!(sf.object("CaseComment").delete("00a000000000002AAA").await.unwrap());

        let case = sf.get("Case", CASE_ID).await.unwrap().unwrap();
        let comments = case.related("comments", &FilterOptions::default()).await.unwrap();
        assert_eq!(comments.ids(), vec!["00a000000000001AAA"]);
    }
}
