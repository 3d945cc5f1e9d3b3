//! History service tests: paging, chat lifecycle and the error trail

mod common;

use common::{FAIL_MARKER, Harness};
use tokio_multimodal_chat_api::core::errors::ChatError;
use tokio_multimodal_chat_api::core::models::{ChatRef, TurnInput, TurnOptions};
use tokio_multimodal_chat_api::core::traits::{HistoryService, TurnService};

/// Appends `turns` text-only turns to `code` straight through the repository.
async fn seed_turns(harness: &Harness, code: &str, turns: usize) {
    for i in 0..turns {
        let history = harness
            .repo
            .create_history(code, &format!("question {i}"))
            .await
            .unwrap();
        harness
            .repo
            .set_history_output(history.id, &format!("answer {i}"))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_pagination() {
    let harness = Harness::new().await;
    let history = harness.history();
    let chat = history.create_chat(None).await.unwrap();
    seed_turns(&harness, &chat.code, 25).await;

    let first = history.get_history(&chat.code, 1, Some(10)).await.unwrap();
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.current_page, 1);
    assert_eq!(first.turns.len(), 10);
    // newest first
    assert_eq!(first.turns[0].history.input_text, "question 24");

    let third = history.get_history(&chat.code, 3, Some(10)).await.unwrap();
    assert_eq!(third.turns.len(), 5);
    assert_eq!(third.turns[4].history.input_text, "question 0");

    let fourth = history.get_history(&chat.code, 4, Some(10)).await.unwrap();
    assert!(fourth.turns.is_empty());
    assert_eq!(fourth.total_pages, 3);
    assert_eq!(fourth.current_page, 4);
}

#[tokio::test]
async fn test_pagination_defaults_and_limits() {
    let harness = Harness::new().await;
    let history = harness.history();
    let chat = history.create_chat(None).await.unwrap();

    let empty = history.get_history(&chat.code, 1, None).await.unwrap();
    assert!(empty.turns.is_empty());
    assert_eq!(empty.total_pages, 1);

    seed_turns(&harness, &chat.code, 12).await;
    let page = history.get_history(&chat.code, 1, None).await.unwrap();
    assert_eq!(page.turns.len(), 10);
    assert_eq!(page.total_pages, 2);

    let page = history.get_history(&chat.code, 1, Some(100)).await.unwrap();
    assert_eq!(page.turns.len(), 12);
    assert_eq!(page.total_pages, 1);

    // oversized pages are refused, never shrunk behind the caller's back
    let err = history.get_history(&chat.code, 1, Some(150)).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let err = history.get_history(&chat.code, 0, None).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
    let err = history.get_history(&chat.code, 1, Some(0)).await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let err = history.get_history("missing", 1, None).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_chat_removes_rows_and_blobs() {
    let harness = Harness::new().await;
    let orchestrator = harness.orchestrator();
    let history = harness.history();

    let first = orchestrator
        .run_turn(
            ChatRef::New,
            TurnInput::Text("a harbour town".to_owned()),
            TurnOptions { want_image: true },
        )
        .await
        .unwrap();
    let code = first.chat.code.clone();
    orchestrator
        .run_turn(
            ChatRef::Existing(code.clone()),
            TurnInput::Text(format!("again {FAIL_MARKER}")),
            TurnOptions::default(),
        )
        .await
        .unwrap();

    // an unrelated chat must survive
    let other = history.create_chat(Some("Keep me".to_owned())).await.unwrap();

    assert_eq!(harness.stored_blobs(), 2);
    assert_eq!(harness.count("chat_errors").await, 1);

    history.delete_chat(&code).await.unwrap();

    assert_eq!(harness.count("files").await, 0);
    assert_eq!(harness.count("histories").await, 0);
    assert_eq!(harness.count("chat_errors").await, 0);
    assert_eq!(harness.count("chats").await, 1);
    assert_eq!(harness.stored_blobs(), 0);
    assert!(harness.locks.is_empty());

    let err = history.get_history(&code, 1, None).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
    let err = history.delete_chat(&code).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));

    assert!(history.get_history(&other.code, 1, None).await.is_ok());
}

#[tokio::test]
async fn test_unknown_codes_leave_no_lock_entries() {
    let harness = Harness::new().await;
    let orchestrator = harness.orchestrator();
    let history = harness.history();

    for i in 0..200 {
        let code = format!("unknown{i}");
        let err = orchestrator
            .run_turn(
                ChatRef::Existing(code.clone()),
                TurnInput::Text("hello".to_owned()),
                TurnOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));

        let err = history.delete_chat(&code).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
    }
    assert!(harness.locks.is_empty());

    // successful turns release their entry too
    orchestrator
        .run_turn(
            ChatRef::New,
            TurnInput::Text("a harbour town".to_owned()),
            TurnOptions::default(),
        )
        .await
        .unwrap();
    assert!(harness.locks.is_empty());
}

#[tokio::test]
async fn test_create_and_rename_chat() {
    let harness = Harness::new().await;
    let history = harness.history();

    let untitled = history.create_chat(Some("  ".to_owned())).await.unwrap();
    assert_eq!(untitled.title, None);
    assert_eq!(untitled.code.len(), 20);

    let titled = history.create_chat(Some("Trip plans".to_owned())).await.unwrap();
    assert_ne!(titled.code, untitled.code);

    let renamed = history
        .rename_chat(&untitled.code, " Recipes ".to_owned())
        .await
        .unwrap();
    assert_eq!(renamed.code, untitled.code);
    assert_eq!(renamed.title.as_deref(), Some("Recipes"));

    let err = history
        .rename_chat(&untitled.code, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
    let err = history
        .rename_chat("missing", "Anything".to_owned())
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));

    // the rename bumped updated_at, so it lists first
    let chats = history.list_chats().await.unwrap();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0].code, untitled.code);
}

#[tokio::test]
async fn test_explicit_title_is_kept_after_first_reply() {
    let harness = Harness::new().await;
    let chat = harness
        .history()
        .create_chat(Some("Holiday".to_owned()))
        .await
        .unwrap();

    let result = harness
        .orchestrator()
        .run_turn(
            ChatRef::Existing(chat.code),
            TurnInput::Text("a harbour town".to_owned()),
            TurnOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.chat.title.as_deref(), Some("Holiday"));
}

#[tokio::test]
async fn test_list_errors() {
    let harness = Harness::new().await;
    let orchestrator = harness.orchestrator();
    let history = harness.history();

    let failed = orchestrator
        .run_turn(
            ChatRef::New,
            TurnInput::Text(format!("first {FAIL_MARKER}")),
            TurnOptions::default(),
        )
        .await
        .unwrap();
    orchestrator
        .run_turn(
            ChatRef::New,
            TurnInput::Text(format!("second {FAIL_MARKER}")),
            TurnOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(history.list_errors(None).await.unwrap().len(), 2);

    let errors = history.list_errors(Some(&failed.chat.code)).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].chat_code, failed.chat.code);
    assert!(errors[0].error.contains("text-generation failed"));

    let err = history.list_errors(Some("missing")).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}
