//! S5 from the worked scenarios: a rewrite that introduces a proper noun
//! absent from the source is rejected end to end, leaving the original
//! title in place and recording the rejection reason.

mod common;

use climate_river::config::ChatServiceConfig;
use climate_river::services::news_pipeline::{rewriter, ChatClient};
use common::TestDatabase;
use serde_json::json;
use serial_test::serial;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
#[serial]
async fn rejects_rewrite_that_adds_a_proper_noun() {
    let db = TestDatabase::new().await;
    let source = db.insert_source("iea-wire").await;
    let article_id = sqlx::query_scalar!(
        r#"
        INSERT INTO articles (source_id, canonical_url, title, publisher_host, published_at, fetched_at)
        VALUES ($1, 'https://iea.example/2030-renewables', 'IEA says 2030 renewables target in reach', 'iea.example', now(), now())
        RETURNING id
        "#,
        source,
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();

    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "content": "Bill Gates predicts renewables boom by 2030"
                }
            }]
        })))
        .mount(&mock_server)
        .await;

    let chat_client = ChatClient::new(ChatServiceConfig {
        endpoint: format!("{}/v1/chat/completions", mock_server.uri()),
        model_id: "test-model".to_string(),
        api_key: "test-key".to_string(),
    });

    let result = rewriter::rewrite(&db.pool, &chat_client, 10).await.unwrap();
    assert_eq!(result.processed, 1);
    assert_eq!(result.updated, 0);

    let row = sqlx::query!(
        "SELECT rewritten_title, rewrite_notes FROM articles WHERE id = $1",
        article_id
    )
    .fetch_one(&db.pool)
    .await
    .unwrap();

    assert!(row.rewritten_title.is_none());
    let notes = row.rewrite_notes.expect("rejection notes recorded");
    assert!(notes.starts_with("added_proper_noun"));
}
