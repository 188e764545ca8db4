//! End-to-end routing tests
//!
//! These drive a [`Router`] built from a config file through whole
//! conversations, the way the chat bot uses it.

use parley_core::experiments::{ExperimentStatus, JsonFileArchive, Variant};
use parley_core::{
    Config, Error, IntentSource, PassthroughReason, Risk, RouteContext, Router,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn write_config(dir: &Path) -> Config {
    let archive = dir.join("archive");
    let path = dir.join("config.toml");
    fs::write(
        &path,
        format!(
            r#"
[entities]
repos = ["JUDO", "LusoTown", "atlas-api"]
companies = ["Acme", "Globex"]

[cache]
capacity = 16
ttl_secs = 600

[experiments]
archive_dir = '{}'
"#,
            archive.display()
        ),
    )
    .expect("failed to write config");
    Config::load_from(&path).expect("failed to load config")
}

fn ctx(chat: &str) -> RouteContext {
    RouteContext::new("u1", chat)
}

// ============================================
// Conversations
// ============================================

#[test]
fn conversation_carries_context_between_messages() {
    let dir = TempDir::new().unwrap();
    let router = Router::new(&write_config(dir.path()));
    let chat = ctx("ops");

    let deploy = router.resolve("deploy judo to staging", &chat);
    assert_eq!(deploy.text, "deploy JUDO --env=staging");
    assert!(deploy.requires_confirmation());

    let logs = router.resolve("show logs for it", &chat);
    assert_eq!(logs.text, "logs JUDO");
    assert!(!logs.requires_confirmation());

    let thanks = router.resolve("thanks!", &chat);
    assert_eq!(thanks.passthrough_reason, Some(PassthroughReason::Thanks));

    let restart = router.resolve("restart it", &chat);
    assert_eq!(restart.text, "restart JUDO");

    let state = router.threads().state("ops").unwrap();
    assert_eq!(state.last_repo.as_deref(), Some("JUDO"));
    assert_eq!(state.last_action.as_deref(), Some("restart"));
    assert_eq!(router.classifier().history().last_action("u1").as_deref(), Some("restart"));
}

#[test]
fn bound_session_fills_missing_targets() {
    let dir = TempDir::new().unwrap();
    let router = Router::new(&write_config(dir.path()));
    let session = ctx("bound").with_auto_repo("LusoTown").with_auto_company("Acme");

    assert_eq!(router.resolve("run the tests", &session).text, "test LusoTown");
    assert_eq!(router.resolve("show upcoming deadlines", &session).text, "deadlines Acme");
    assert_eq!(router.resolve("build atlas-api", &session).text, "build atlas-api");

    // Destructive commands never borrow the session target
    let fresh = ctx("bound-2").with_auto_repo("LusoTown");
    let delete = router.resolve("delete it", &fresh);
    assert_eq!(delete.source, IntentSource::Passthrough);
    assert_eq!(delete.text, "delete it");
}

#[test]
fn compound_message_reports_remaining_steps() {
    let dir = TempDir::new().unwrap();
    let router = Router::new(&write_config(dir.path()));

    let resolution = router.resolve("run tests on JUDO and then deploy it", &ctx("ci"));
    assert_eq!(resolution.text, "test JUDO");

    let steps = resolution.decomposition.unwrap();
    assert_eq!(steps.chat_id, "ci");
    assert_eq!(steps.total_intents, 2);

    // The follow-up step routes on its own once the first one finishes
    let next = router.resolve(&steps.remaining_intents[0].text, &ctx("ci"));
    assert_eq!(next.text, "deploy JUDO");
    assert_eq!(next.intent.unwrap().risk(), Risk::High);
}

#[test]
fn repeated_messages_resolve_identically() {
    let dir = TempDir::new().unwrap();
    let router = Router::new(&write_config(dir.path()));

    let messages = ["status of LusoTown", "could you deploy judo for me", "hello"];
    let first: Vec<_> = messages
        .iter()
        .map(|m| router.resolve(m, &ctx("c1")).text)
        .collect();
    let second: Vec<_> = messages
        .iter()
        .map(|m| router.resolve(m, &ctx("c1")).text)
        .collect();
    assert_eq!(first, second);
    assert_eq!(router.metrics().cache_hits, 2);
}

#[test]
fn router_is_shared_across_threads() {
    let dir = TempDir::new().unwrap();
    let router = Arc::new(Router::new(&write_config(dir.path())));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let router = Arc::clone(&router);
            thread::spawn(move || {
                let chat = RouteContext::new(format!("u{i}"), format!("chat-{i}"));
                router.resolve("build JUDO", &chat).text
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), "build JUDO");
    }
    assert_eq!(router.metrics().total, 4);
    assert_eq!(router.threads().len(), 4);
}

// ============================================
// Experiments
// ============================================

#[test]
fn experiment_results_are_archived() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    let router = Router::new(&config);

    router
        .experiments()
        .create_experiment(
            "ambiguity-v2",
            vec![
                Variant::new("control", 1),
                Variant::new("lenient", 1).with_param("clarification_threshold", 0.5),
            ],
        )
        .unwrap();
    router.set_threshold_experiment(Some("ambiguity-v2")).unwrap();

    for user in ["ana", "bo", "cy", "di"] {
        let chat = RouteContext::new(user, "exp");
        let resolution = router.resolve("build JUDO", &chat);
        if resolution.is_passthrough() {
            router.record_correction(&resolution, "build JUDO", &chat);
        } else {
            router.record_success(&chat, Some(40.0));
        }
    }

    let results = router
        .experiments()
        .end_experiment("ambiguity-v2", true)
        .unwrap();
    assert_eq!(results.total, 4);
    assert_eq!(
        router.experiments().experiment("ambiguity-v2").unwrap().status,
        ExperimentStatus::Completed
    );

    let archived = JsonFileArchive::new(config.experiments.archive_dir())
        .load("ambiguity-v2")
        .unwrap();
    assert_eq!(archived.results, results);

    // A completed experiment no longer takes outcomes, but routing still works
    router.record_success(&RouteContext::new("ana", "exp"), None);
    assert_eq!(router.experiments().get_results("ambiguity-v2").unwrap().total, 4);
    assert_eq!(router.resolve("build JUDO", &ctx("exp")).text, "build JUDO");

    assert!(matches!(
        router.experiments().end_experiment("ambiguity-v2", true),
        Err(Error::ExperimentCompleted(_))
    ));
}
