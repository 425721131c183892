//! Live tests against the real generative API.
//!
//! Run with: `GEMINI_API_KEY=... cargo test -p story-core --test live_session -- --ignored --nocapture`

use story_core::{EditorConfig, StorySession};

const STORY: &str = "Mara found an old map in her grandmother's attic. \
    The next morning she left town at dawn, following the map toward the coast, \
    where an old sailor named Tomas agreed to take her across the bay.";

fn setup() {
    let _ = dotenvy::dotenv();
}

fn has_api_key() -> bool {
    std::env::var("GEMINI_API_KEY").is_ok()
}

#[tokio::test]
#[ignore]
async fn test_live_analysis_and_rewrite() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: GEMINI_API_KEY not set");
        return;
    }

    let config = EditorConfig::from_env().expect("config");
    let mut session = StorySession::from_config(config).expect("session");

    let root = session.set_text(STORY).await.expect("analysis");
    assert!(root.is_some());

    let analysis = session.state().analysis();
    println!("Flowchart:\n{}", analysis.flowchart.to_mermaid());
    println!("Characters: {:?}", analysis.characters);
    assert!(!analysis.is_empty());

    session
        .rewrite_all("Retell it as a ghost story")
        .await
        .expect("rewrite");
    println!("Rewrite:\n{}", session.state().text());
    assert_eq!(session.state().store().unwrap().len(), 2);

    let fetched = session.relationships().await.expect("relationships");
    assert_eq!(fetched, 1);
}
