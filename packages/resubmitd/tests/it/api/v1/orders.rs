//! Integration tests for order creation behind the duplicate submission guard.

use std::time::Duration;

use color_eyre::Result;
use futures::future::join_all;
use http::HeaderName;
use pretty_assertions::assert_eq as pretty_assert_eq;
use reqwest::{StatusCode, header::RETRY_AFTER};
use resubmit::{BodyEncoding, GuardConfig, Identity};
use serde::Deserialize;
use simple_test_case::test_case;

use crate::helpers::TestFixture;

#[derive(Debug, Deserialize)]
struct CreatedOrder {
    id: u64,
    item: String,
    quantity: u32,
    submission: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderList {
    orders: Vec<CreatedOrder>,
}

fn order(item: &str, quantity: u32) -> serde_json::Value {
    serde_json::json!({ "item": item, "quantity": quantity })
}

#[test_log::test(tokio::test)]
async fn repeated_order_is_rejected() -> Result<()> {
    let config = GuardConfig::builder().ttl(Duration::from_secs(2)).build();
    let fixture = TestFixture::spawn(config).await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    let first = client.post(url.clone()).json(&order("widget", 2)).send().await?;
    pretty_assert_eq!(first.status(), StatusCode::CREATED);
    let created = first.json::<CreatedOrder>().await?;
    pretty_assert_eq!(created.item, "widget");
    pretty_assert_eq!(created.quantity, 2);
    assert!(created.submission.is_some_and(|fp| fp.len() == 64));

    let second = client.post(url).json(&order("widget", 2)).send().await?;
    pretty_assert_eq!(second.status(), StatusCode::CONFLICT);
    let retry_after = second
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .map(String::from);
    pretty_assert_eq!(retry_after.as_deref(), Some("2"));

    pretty_assert_eq!(fixture.ledger.orders().await.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn short_quantity_field_is_accepted() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();
    let body = r#"{"item":"A","qty":1}"#;

    let first = client
        .post(url.clone())
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?;
    pretty_assert_eq!(first.status(), StatusCode::CREATED);
    let created = first.json::<CreatedOrder>().await?;
    pretty_assert_eq!(created.item, "A");
    pretty_assert_eq!(created.quantity, 1);

    let second = client
        .post(url)
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await?;
    pretty_assert_eq!(second.status(), StatusCode::CONFLICT);
    pretty_assert_eq!(fixture.ledger.orders().await.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn trailing_slash_is_not_routed() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;

    let response = reqwest::Client::new()
        .post(fixture.url("api/v1/orders/")?)
        .json(&order("widget", 1))
        .send()
        .await?;

    pretty_assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(fixture.tracker.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn order_is_accepted_again_after_ttl() -> Result<()> {
    let config = GuardConfig::builder().ttl(Duration::from_millis(200)).build();
    let fixture = TestFixture::spawn(config).await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    let first = client.post(url.clone()).json(&order("widget", 1)).send().await?;
    pretty_assert_eq!(first.status(), StatusCode::CREATED);

    tokio::time::sleep(Duration::from_millis(400)).await;

    let second = client.post(url).json(&order("widget", 1)).send().await?;
    pretty_assert_eq!(second.status(), StatusCode::CREATED);
    pretty_assert_eq!(fixture.ledger.orders().await.len(), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn different_orders_are_independent() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    for body in [order("widget", 1), order("widget", 2), order("gadget", 1)] {
        let response = client.post(url.clone()).json(&body).send().await?;
        pretty_assert_eq!(response.status(), StatusCode::CREATED);
    }

    pretty_assert_eq!(fixture.ledger.orders().await.len(), 3);
    Ok(())
}

#[test_case(50; "fifty")]
#[test_case(200; "two_hundred")]
#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_identical_orders_create_one(requests: usize) -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    let responses = join_all((0..requests).map(|_| {
        client
            .post(url.clone())
            .json(&order("limited edition", 1))
            .send()
    }))
    .await;

    let mut created = 0;
    let mut conflicts = 0;
    for response in responses {
        match response?.status() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            status => panic!("unexpected status: {status}"),
        }
    }

    pretty_assert_eq!(created, 1);
    pretty_assert_eq!(conflicts, requests - 1);
    pretty_assert_eq!(fixture.ledger.orders().await.len(), 1);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn invalid_order_still_counts_as_submitted() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    let first = client.post(url.clone()).json(&order("widget", 0)).send().await?;
    pretty_assert_eq!(first.status(), StatusCode::BAD_REQUEST);

    let second = client.post(url).json(&order("widget", 0)).send().await?;
    pretty_assert_eq!(second.status(), StatusCode::CONFLICT);
    assert!(fixture.ledger.orders().await.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn oversized_order_is_rejected() -> Result<()> {
    let config = GuardConfig::builder().max_body_bytes(16).build();
    let fixture = TestFixture::spawn(config).await?;

    let response = reqwest::Client::new()
        .post(fixture.url("api/v1/orders")?)
        .json(&order("a very long item name indeed", 1))
        .send()
        .await?;

    pretty_assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(fixture.ledger.orders().await.is_empty());
    assert!(fixture.tracker.is_empty());
    Ok(())
}

#[test_log::test(tokio::test)]
async fn callers_are_isolated_by_identity_header() -> Result<()> {
    let session = HeaderName::from_static("x-session-id");
    let config = GuardConfig::builder()
        .identity(Identity::Header(session.clone()))
        .build();
    let fixture = TestFixture::spawn(config).await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    let send = |caller: &'static str| {
        client
            .post(url.clone())
            .header(session.clone(), caller)
            .json(&order("widget", 1))
            .send()
    };

    pretty_assert_eq!(send("alice").await?.status(), StatusCode::CREATED);
    pretty_assert_eq!(send("bob").await?.status(), StatusCode::CREATED);
    pretty_assert_eq!(send("alice").await?.status(), StatusCode::CONFLICT);
    pretty_assert_eq!(fixture.ledger.orders().await.len(), 2);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn canonical_json_ignores_key_order() -> Result<()> {
    let config = GuardConfig::builder()
        .body_encoding(BodyEncoding::CanonicalJson)
        .build();
    let fixture = TestFixture::spawn(config).await?;
    let url = fixture.url("api/v1/orders")?;
    let client = reqwest::Client::new();

    let first = client
        .post(url.clone())
        .header("content-type", "application/json")
        .body(r#"{"item":"widget","quantity":1}"#)
        .send()
        .await?;
    pretty_assert_eq!(first.status(), StatusCode::CREATED);

    let second = client
        .post(url)
        .header("content-type", "application/json")
        .body(r#"{ "quantity": 1, "item": "widget" }"#)
        .send()
        .await?;
    pretty_assert_eq!(second.status(), StatusCode::CONFLICT);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn listing_orders_is_never_deduplicated() -> Result<()> {
    let fixture = TestFixture::spawn_default().await?;
    let client = reqwest::Client::new();

    let created = client
        .post(fixture.url("api/v1/orders")?)
        .json(&order("widget", 3))
        .send()
        .await?;
    pretty_assert_eq!(created.status(), StatusCode::CREATED);

    for _ in 0..3 {
        let response = client.get(fixture.url("api/v1/orders")?).send().await?;
        pretty_assert_eq!(response.status(), StatusCode::OK);
        let list = response.json::<OrderList>().await?;
        pretty_assert_eq!(list.orders.len(), 1);
        pretty_assert_eq!(list.orders[0].id, 1);
    }
    Ok(())
}
