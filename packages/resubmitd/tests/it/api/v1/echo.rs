use std::time::Duration;

use color_eyre::Result;
use pretty_assertions::assert_eq as pretty_assert_eq;
use reqwest::StatusCode;
use resubmit::GuardConfig;
use serde::Deserialize;

use crate::helpers::TestFixture;

#[derive(Debug, Deserialize)]
struct Echoed {
    bytes: usize,
    received: serde_json::Value,
}

#[test_log::test(tokio::test)]
async fn handler_reads_the_body_twice() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let body = serde_json::json!({ "message": "hello", "count": 3 });
    let raw = serde_json::to_vec(&body)?;

    let response = reqwest::Client::new()
        .post(fixture.url("api/v1/echo")?)
        .header("content-type", "application/json")
        .body(raw.clone())
        .send()
        .await?;

    pretty_assert_eq!(response.status(), StatusCode::OK);
    let echoed = response.json::<Echoed>().await?;
    pretty_assert_eq!(echoed.bytes, raw.len());
    pretty_assert_eq!(echoed.received, body);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn echo_retention_is_capped() -> Result<()> {
    let config = GuardConfig::builder().ttl(Duration::from_secs(60)).build();
    let fixture = TestFixture::spawn(config).await?;
    let url = fixture.url("api/v1/echo")?;
    let client = reqwest::Client::new();
    let body = serde_json::json!({ "ping": true });

    let first = client.post(url.clone()).json(&body).send().await?;
    pretty_assert_eq!(first.status(), StatusCode::OK);
    let second = client.post(url.clone()).json(&body).send().await?;
    pretty_assert_eq!(second.status(), StatusCode::CONFLICT);

    tokio::time::sleep(resubmitd::guards::ECHO_TTL + Duration::from_millis(200)).await;

    let third = client.post(url).json(&body).send().await?;
    pretty_assert_eq!(third.status(), StatusCode::OK);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn routes_do_not_share_submissions() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let client = reqwest::Client::new();
    let body = serde_json::json!({ "item": "widget", "quantity": 1 });

    let order = client
        .post(fixture.url("api/v1/orders")?)
        .json(&body)
        .send()
        .await?;
    pretty_assert_eq!(order.status(), StatusCode::CREATED);

    let echo = client
        .post(fixture.url("api/v1/echo")?)
        .json(&body)
        .send()
        .await?;
    pretty_assert_eq!(echo.status(), StatusCode::OK);
    pretty_assert_eq!(fixture.tracker.len(), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn ineligible_content_type_is_not_buffered() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;

    let response = reqwest::Client::new()
        .post(fixture.url("api/v1/echo")?)
        .header("content-type", "text/plain")
        .body("hello")
        .send()
        .await?;

    pretty_assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(fixture.tracker.is_empty());
    Ok(())
}
