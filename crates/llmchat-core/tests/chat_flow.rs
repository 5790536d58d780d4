//! End-to-end flows through `ChatCore` with scripted ports.

use std::sync::Arc;

use futures_util::StreamExt;
use llmchat_core::testing::{ReplyScript, ScriptedEngine, ScriptedModelRepository};
use llmchat_core::{
    AppEvent, ChatCore, DownloadState, EngineIdentifier, EventBus, GenerationStatus,
    LifecycleError, MessageRole, ModelCatalog, ModelDescriptor, SessionError, Settings,
    StorageError,
};

fn single_model_catalog() -> ModelCatalog {
    ModelCatalog::new([ModelDescriptor::new(
        "m1",
        "M1",
        1_000,
        EngineIdentifier::new("m1-engine"),
    )])
    .unwrap()
}

fn build(repo: ScriptedModelRepository, engine: ScriptedEngine) -> (ChatCore, EventBus) {
    let bus = EventBus::new();
    let core = ChatCore::new(
        single_model_catalog(),
        Arc::new(repo),
        Arc::new(engine),
        Arc::new(bus.clone()),
        Settings::with_defaults(),
    )
    .unwrap();
    (core, bus)
}

#[tokio::test]
async fn download_select_and_chat() {
    let repo = ScriptedModelRepository::new().with_progress("m1-engine", [0.0, 0.5, 1.0]);
    let engine = ScriptedEngine::new().reply(ReplyScript::tokens(["hey"]));
    let (core, _bus) = build(repo, engine.clone());

    let progress: Vec<f64> = core
        .lifecycle()
        .download("m1")
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(progress, vec![0.0, 0.5, 1.0]);

    core.lifecycle().select("m1").unwrap();

    let transcript = core.new_transcript();
    let mut session = core
        .create_session(transcript.clone(), "m1", Some("sys".into()), Some(512))
        .await
        .unwrap();
    session.send("hi").await.unwrap();
    let deltas: Vec<String> = session
        .generate()
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(deltas, vec!["hey"]);

    let messages = transcript.snapshot();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role(), MessageRole::User);
    assert_eq!(messages[0].content(), "hi");
    assert_eq!(messages[1].role(), MessageRole::Assistant);
    assert_eq!(messages[1].content(), "hey");
    assert_eq!(session.status(), GenerationStatus::Completed);

    let opened = engine.opened();
    let (engine_id, params) = &opened[0];
    assert_eq!(engine_id, "m1-engine");
    assert_eq!(params.system_prompt.as_deref(), Some("sys"));
    assert_eq!(params.max_output_length, 512);
}

#[tokio::test]
async fn subscribers_see_events_in_emission_order() {
    let repo = ScriptedModelRepository::new().with_progress("m1-engine", [0.5, 1.0]);
    let (core, bus) = build(repo, ScriptedEngine::new());
    let mut events = bus.subscribe();

    core.lifecycle().download("m1").unwrap().wait().await.unwrap();
    core.lifecycle().select("m1").unwrap();
    core.lifecycle().delete("m1").await.unwrap();

    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.event_name());
    }
    assert_eq!(
        names,
        vec![
            "download:queued",
            "download:started",
            "download:progress",
            "download:progress",
            "download:completed",
            "model:selected",
            "model:selected",
            "model:removed",
        ]
    );
}

#[tokio::test]
async fn deleting_selected_model_clears_selection() {
    let repo = ScriptedModelRepository::new().with_stored("m1-engine");
    let (core, _bus) = build(repo.clone(), ScriptedEngine::new());
    let lifecycle = core.lifecycle();

    lifecycle.refresh().await.unwrap();
    lifecycle.select("m1").unwrap();
    lifecycle.delete("m1").await.unwrap();

    assert!(lifecycle.selected_model().is_none());
    assert_eq!(lifecycle.download_state("m1").unwrap(), DownloadState::NotPresent);
    assert!(lifecycle.list_downloaded().is_empty());
    assert!(!repo.is_stored("m1-engine"));
    assert!(matches!(
        lifecycle.select("m1"),
        Err(LifecycleError::ModelNotDownloaded { .. })
    ));
}

#[tokio::test]
async fn failed_removal_keeps_model_usable() {
    let repo = ScriptedModelRepository::new().with_stored("m1-engine");
    let engine = ScriptedEngine::new().reply(ReplyScript::tokens(["still here"]));
    let (core, _bus) = build(repo.clone(), engine);
    let lifecycle = core.lifecycle();
    lifecycle.refresh().await.unwrap();
    lifecycle.select("m1").unwrap();

    repo.fail_removals(StorageError::other("disk busy"));
    assert_eq!(
        lifecycle.delete("m1").await,
        Err(LifecycleError::Storage(StorageError::other("disk busy")))
    );
    assert_eq!(repo.removals(), vec!["m1-engine"]);
    assert!(repo.is_stored("m1-engine"));
    assert_eq!(lifecycle.download_state("m1").unwrap(), DownloadState::Present);
    assert_eq!(lifecycle.selected_model().unwrap().id(), "m1");

    let transcript = core.new_transcript();
    let mut session = core.create_session_for_selected(transcript).await.unwrap();
    session.send("hi").await.unwrap();
    let deltas: Vec<_> = session.generate().unwrap().map(Result::unwrap).collect().await;
    assert_eq!(deltas, vec!["still here"]);
}

#[tokio::test]
async fn transcript_shows_growing_prefixes() {
    let repo = ScriptedModelRepository::new().with_stored("m1-engine");
    let engine = ScriptedEngine::new().reply(ReplyScript::tokens(["Hel", "lo", " world"]));
    let (core, bus) = build(repo, engine);
    core.lifecycle().refresh().await.unwrap();

    let transcript = core.new_transcript();
    let mut session = core
        .create_session(transcript.clone(), "m1", None, None)
        .await
        .unwrap();
    let mut events = bus.subscribe();

    session.send("hi").await.unwrap();
    let mut stream = session.generate().unwrap();
    let mut prefixes = Vec::new();
    while let Some(delta) = stream.next().await {
        delta.unwrap();
        prefixes.push(transcript.last().unwrap().content().to_string());
    }
    assert_eq!(prefixes, vec!["Hel", "Hello", "Hello world"]);
    assert_eq!(transcript.last().unwrap().content(), "Hello world");

    // The UI sees one append for the reply, then replacements
    let mut reply_updates = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            AppEvent::MessageAppended { message, .. } | AppEvent::MessageReplaced { message, .. }
                if message.role() == MessageRole::Assistant =>
            {
                reply_updates.push(message.content().to_string());
            }
            _ => {}
        }
    }
    assert_eq!(reply_updates, vec!["Hel", "Hello", "Hello world"]);
}

#[tokio::test]
async fn cancel_keeps_partial_reply_and_frees_transcript() {
    let repo = ScriptedModelRepository::new().with_stored("m1-engine");
    let engine = ScriptedEngine::new()
        .reply(ReplyScript::stall(["Hel", "lo"]))
        .reply(ReplyScript::tokens(["again"]));
    let (core, _bus) = build(repo, engine);
    core.lifecycle().refresh().await.unwrap();

    let transcript = core.new_transcript();
    let mut session = core
        .create_session(transcript.clone(), "m1", None, None)
        .await
        .unwrap();
    session.send("hi").await.unwrap();
    let mut stream = session.generate().unwrap();
    stream.next().await.unwrap().unwrap();
    stream.next().await.unwrap().unwrap();

    assert!(session.cancel());
    assert_eq!(session.status(), GenerationStatus::Cancelled);
    assert_eq!(transcript.last().unwrap().content(), "Hello");

    // A new session may take over even before the old stream is dropped
    let mut next = core
        .create_session(transcript.clone(), "m1", None, None)
        .await
        .unwrap();
    next.send("more").await.unwrap();
    let _: Vec<_> = next.generate().unwrap().collect().await;
    assert!(stream.next().await.is_none());

    let contents: Vec<_> = transcript
        .snapshot()
        .iter()
        .map(|m| m.content().to_string())
        .collect();
    assert_eq!(contents, vec!["hi", "Hello", "more", "again"]);
}

#[tokio::test]
async fn second_session_on_busy_transcript_is_rejected() {
    let repo = ScriptedModelRepository::new().with_stored("m1-engine");
    let engine = ScriptedEngine::new().reply(ReplyScript::tokens(["first"]));
    let (core, _bus) = build(repo, engine);
    core.lifecycle().refresh().await.unwrap();

    let transcript = core.new_transcript();
    let mut first = core
        .create_session(transcript.clone(), "m1", None, None)
        .await
        .unwrap();
    let mut second = core
        .create_session(transcript.clone(), "m1", None, None)
        .await
        .unwrap();

    first.send("one").await.unwrap();
    assert_eq!(second.send("two").await, Err(SessionError::SessionBusy));

    let _: Vec<_> = first.generate().unwrap().collect().await;
    assert_eq!(first.status(), GenerationStatus::Completed);
    second.send("two").await.unwrap();
}
