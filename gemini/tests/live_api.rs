//! Live tests against the Gemini API.
//!
//! Run with: `cargo test -p gemini --test live_api -- --ignored --nocapture`
//!
//! These tests require GEMINI_API_KEY to be set.

use gemini::{Error, Gemini, Request};

fn setup() {
    let _ = dotenvy::dotenv();
}

fn has_api_key() -> bool {
    std::env::var("GEMINI_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_generate_short_reply() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let client = Gemini::from_env().expect("client");
    let request = Request::new("Reply with exactly the word: ready")
        .with_temperature(0.0)
        .with_max_output_tokens(16);
    let response = client.complete(request).await.expect("request failed");

    println!("Reply: {}", response.text);
    assert!(response.text.to_lowercase().contains("ready"));
}

#[tokio::test]
#[ignore]
async fn test_bad_key_is_api_error() {
    setup();

    let client = Gemini::new("definitely-not-a-key").expect("client");
    let result = client.generate("hello").await;

    match result {
        Err(Error::Api { status, .. }) => assert!(status >= 400),
        Err(Error::Network(e)) => eprintln!("Skipping: no network ({e})"),
        other => panic!("expected API error, got {other:?}"),
    }
}
