//! Dispatcher, reconciliation and deletion behaviour against a real content
//! tree and a scripted translator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;

use locsync_core::{is_translated, ContentRoot, DocumentStore, LocaleSet};
use locsync_sync::{
    on_source_deleted, reconcile_all, translate_path, DispatchOutcome, Dispatcher, RejectReason,
    SyncAction, SyncMode, TargetOutcome,
};
use locsync_translate::{
    mock::echo_text, MockReply, MockTranslator, TranslateError,
};

const HELLO: &str = "---\ntitle: Привет\ndate: 2024-05-01\nauthor: Ali\n---\nТекст статьи.\n";

struct Fixture {
    tmp: TempDir,
    mock: MockTranslator,
    dispatcher: Dispatcher,
}

impl Fixture {
    fn new(mock: MockTranslator) -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let store = DocumentStore::new(ContentRoot::new(tmp.path(), LocaleSet::default(), "md"));
        let dispatcher = Dispatcher::new(store, Arc::new(mock.clone()));
        Self {
            tmp,
            mock,
            dispatcher,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }

    fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, text).unwrap();
        path
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).unwrap()
    }

    fn set_mtime(&self, rel: &str, secs: i64) {
        set_file_mtime(self.path(rel), FileTime::from_unix_time(secs, 0)).unwrap();
    }
}

fn settled(outcome: DispatchOutcome) -> locsync_sync::BatchReport {
    match outcome {
        DispatchOutcome::Settled(report) => report,
        other => panic!("expected a settled batch, got {other:?}"),
    }
}

fn rejection(outcome: DispatchOutcome) -> RejectReason {
    match outcome {
        DispatchOutcome::Rejected { reason, .. } => reason,
        other => panic!("expected a rejection, got {other:?}"),
    }
}

fn stamped(text: &str) -> String {
    text.replacen("---\n", "---\ntranslated: true\n", 1)
}

// ---------------------------------------------------------------------------
// 1. Fan-out on create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_source_is_translated_into_every_other_locale() {
    let fx = Fixture::new(MockTranslator::echo());
    let source = fx.write("ru/hello.md", HELLO);

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap());

    assert_eq!(fx.mock.targets(), vec!["en", "uz"]);
    assert_eq!(report.source, "ru/hello.md");
    assert_eq!(report.written(), 2);
    assert_eq!(report.exit_code(), 0);
    for target in &report.targets {
        assert_eq!(
            target.outcome,
            TargetOutcome::Written {
                action: SyncAction::Create
            }
        );
    }

    assert_eq!(fx.read("en/hello.md"), stamped(&echo_text(HELLO, "en")));
    assert_eq!(fx.read("uz/hello.md"), stamped(&echo_text(HELLO, "uz")));
    assert!(fx.dispatcher.in_flight().is_empty());
}

#[tokio::test]
async fn marker_is_the_only_change_to_collaborator_output() {
    let output = "---\ntitle: Hello\ndate: 2024-05-01\ntags: [a, b]\n---\nArticle text.\n";
    let fx = Fixture::new(MockTranslator::new(MockReply::Text(output.to_string())));
    let source = fx.write("ru/hello.md", HELLO);

    fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap();

    assert_eq!(
        fx.read("en/hello.md"),
        "---\ntranslated: true\ntitle: Hello\ndate: 2024-05-01\ntags: [a, b]\n---\nArticle text.\n"
    );
}

#[tokio::test]
async fn collaborator_marker_is_not_duplicated() {
    let output = "---\ntitle: Hello\ntranslated: false\n---\nx\n";
    let fx = Fixture::new(MockTranslator::new(MockReply::Text(output.to_string())));
    let source = fx.write("ru/hello.md", HELLO);

    fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap();

    let written = fx.read("uz/hello.md");
    assert_eq!(written, "---\ntitle: Hello\ntranslated: true\n---\nx\n");
    assert_eq!(written.matches("translated:").count(), 1);
}

// ---------------------------------------------------------------------------
// 2. Mirrors never propagate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edited_mirror_is_skipped_entirely() {
    let fx = Fixture::new(MockTranslator::echo());
    let mirror = fx.write("en/hello.md", "---\ntranslated: true\ntitle: Hi\n---\nedited by hand\n");

    let outcome = fx.dispatcher.dispatch(&mirror, SyncMode::Change).await.unwrap();

    assert_eq!(rejection(outcome), RejectReason::Mirror);
    assert_eq!(fx.mock.call_count(), 0);
    assert!(!fx.path("ru/hello.md").exists());
    assert!(!fx.path("uz/hello.md").exists());
}

#[tokio::test]
async fn written_mirrors_read_back_as_translated() {
    let fx = Fixture::new(MockTranslator::echo());
    let source = fx.write("ru/hello.md", HELLO);
    fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap();

    let store = fx.dispatcher.store();
    for rel in ["en/hello.md", "uz/hello.md"] {
        let doc = store.read_path(&fx.path(rel)).unwrap();
        assert!(is_translated(&doc), "{rel} should carry the marker");
    }
}

// ---------------------------------------------------------------------------
// 3. Staleness per mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn change_retranslates_regardless_of_timestamps() {
    let fx = Fixture::new(MockTranslator::echo());
    let source = fx.write("ru/hello.md", HELLO);
    fx.write("en/hello.md", "---\ntranslated: true\n---\nold\n");
    fx.write("uz/hello.md", "---\ntranslated: true\n---\nold\n");
    fx.set_mtime("ru/hello.md", 1_000);
    fx.set_mtime("en/hello.md", 5_000);
    fx.set_mtime("uz/hello.md", 5_000);

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Change).await.unwrap());

    assert_eq!(fx.mock.call_count(), 2);
    assert!(report
        .targets
        .iter()
        .all(|t| t.outcome == TargetOutcome::Written { action: SyncAction::Update }));
    assert!(fx.read("en/hello.md").contains("[en]"));
}

#[tokio::test]
async fn add_skips_existing_targets() {
    let fx = Fixture::new(MockTranslator::echo());
    let source = fx.write("ru/hello.md", HELLO);
    fx.write("en/hello.md", "---\ntranslated: true\n---\nexisting\n");

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap());

    assert_eq!(fx.mock.targets(), vec!["uz"]);
    assert_eq!(report.up_to_date(), 1);
    assert_eq!(fx.read("en/hello.md"), "---\ntranslated: true\n---\nexisting\n");
}

#[tokio::test]
async fn background_scan_updates_only_older_targets() {
    let fx = Fixture::new(MockTranslator::echo());
    let source = fx.write("ru/hello.md", HELLO);
    fx.write("en/hello.md", "---\ntranslated: true\n---\nfresh\n");
    fx.write("uz/hello.md", "---\ntranslated: true\n---\nstale\n");
    fx.set_mtime("ru/hello.md", 2_000);
    fx.set_mtime("en/hello.md", 3_000);
    fx.set_mtime("uz/hello.md", 1_000);

    let report = settled(
        fx.dispatcher
            .dispatch(&source, SyncMode::BackgroundScan)
            .await
            .unwrap(),
    );

    assert_eq!(fx.mock.targets(), vec!["uz"]);
    assert_eq!(report.up_to_date(), 1);
    assert_eq!(report.written(), 1);
    assert_eq!(fx.read("en/hello.md"), "---\ntranslated: true\n---\nfresh\n");
}

// ---------------------------------------------------------------------------
// 4. Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_target_does_not_block_siblings() {
    let mock = MockTranslator::echo().with_reply(
        "en",
        MockReply::Fail(TranslateError::Transport("connection reset".to_string())),
    );
    let fx = Fixture::new(mock);
    let source = fx.write("ru/hello.md", HELLO);

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap());

    assert_eq!(fx.mock.targets(), vec!["en", "uz"]);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.written(), 1);
    assert_eq!(report.exit_code(), 1);
    assert!(matches!(
        &report.targets[0].outcome,
        TargetOutcome::Failed { kind, .. } if kind == "transport"
    ));
    assert!(!fx.path("en/hello.md").exists());
    assert!(fx.path("uz/hello.md").exists());
    assert!(fx.dispatcher.in_flight().is_empty());
}

#[tokio::test]
async fn truncated_translation_writes_nothing() {
    let mock = MockTranslator::echo().with_reply(
        "uz",
        MockReply::Fail(TranslateError::Truncated {
            target: "uz".to_string(),
            max_tokens: 16384,
        }),
    );
    let fx = Fixture::new(mock);
    let source = fx.write("ru/hello.md", HELLO);
    fx.write("uz/hello.md", "---\ntranslated: true\n---\nprevious\n");

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Change).await.unwrap());

    assert!(matches!(
        &report.targets[1].outcome,
        TargetOutcome::Failed { kind, .. } if kind == "truncated"
    ));
    assert_eq!(fx.read("uz/hello.md"), "---\ntranslated: true\n---\nprevious\n");
}

#[tokio::test]
async fn unparseable_output_is_rejected_per_target() {
    let mock = MockTranslator::echo().with_reply(
        "en",
        MockReply::Text("Sure! Here is the translation:\n\ntitle: Hi\n".to_string()),
    );
    let fx = Fixture::new(mock);
    let source = fx.write("ru/hello.md", HELLO);

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap());

    assert!(matches!(
        &report.targets[0].outcome,
        TargetOutcome::Failed { kind, .. } if kind == "invalid_output"
    ));
    assert!(!fx.path("en/hello.md").exists());
    assert!(fx.path("uz/hello.md").exists());
}

// ---------------------------------------------------------------------------
// 5. Admission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paths_outside_the_root_are_rejected_before_io() {
    let fx = Fixture::new(MockTranslator::echo());
    let outside = TempDir::new().unwrap();
    let escaped = outside.path().join("ru/hello.md");

    let outcome = fx.dispatcher.dispatch(&escaped, SyncMode::Add).await.unwrap();
    assert_eq!(rejection(outcome), RejectReason::PathEscape);

    let dotted = fx.path("ru/../../evil.md");
    let outcome = fx.dispatcher.dispatch(&dotted, SyncMode::Add).await.unwrap();
    assert_eq!(rejection(outcome), RejectReason::PathEscape);

    assert_eq!(fx.mock.call_count(), 0);
}

#[tokio::test]
async fn symlinked_locale_dir_outside_the_root_is_never_written_or_deleted() {
    let fx = Fixture::new(MockTranslator::echo());
    let outside = TempDir::new().unwrap();
    fs::write(outside.path().join("hello.md"), "---\ntitle: keep\n---\n").unwrap();
    std::os::unix::fs::symlink(outside.path(), fx.path("en")).unwrap();
    let source = fx.write("ru/hello.md", HELLO);

    let report = settled(fx.dispatcher.dispatch(&source, SyncMode::Change).await.unwrap());
    let en = &report.targets[0];
    assert_eq!(en.locale.as_str(), "en");
    assert!(
        matches!(&en.outcome, TargetOutcome::Failed { kind, .. } if kind == "path_escape"),
        "{:?}",
        en.outcome
    );
    assert!(matches!(report.targets[1].outcome, TargetOutcome::Written { .. }));
    assert_eq!(fx.mock.call_count(), 1);
    assert_eq!(
        fs::read_to_string(outside.path().join("hello.md")).unwrap(),
        "---\ntitle: keep\n---\n"
    );

    fs::remove_file(&source).unwrap();
    let deletion = on_source_deleted(fx.dispatcher.store(), &source).unwrap();
    assert_eq!(deletion.deleted(), 1);
    assert_eq!(deletion.failed(), 1);
    assert!(outside.path().join("hello.md").exists());
    assert!(!fx.path("uz/hello.md").exists());
}

#[tokio::test]
async fn unusable_paths_are_rejected_with_reasons() {
    let fx = Fixture::new(MockTranslator::echo());
    let notes = fx.write("ru/notes.txt", HELLO);
    let unknown = fx.write("fr/hello.md", HELLO);
    let invalid = fx.write("ru/broken.md", "no header here\n");

    let cases = [
        (notes, RejectReason::NotADocument),
        (unknown, RejectReason::LocaleUnresolvable),
        (fx.path("ru/missing.md"), RejectReason::SourceMissing),
    ];
    for (path, expected) in cases {
        let outcome = fx.dispatcher.dispatch(&path, SyncMode::Add).await.unwrap();
        assert_eq!(outcome.exit_code(), 2);
        assert_eq!(rejection(outcome), expected, "{}", path.display());
    }
    assert!(matches!(
        rejection(fx.dispatcher.dispatch(&invalid, SyncMode::Add).await.unwrap()),
        RejectReason::InvalidDocument(_)
    ));
    assert_eq!(fx.mock.call_count(), 0);
}

#[tokio::test]
async fn concurrent_events_for_one_path_run_one_batch() {
    let mock = MockTranslator::echo().with_delay(Duration::from_millis(200));
    let fx = Fixture::new(mock);
    let source = fx.write("ru/hello.md", HELLO);

    let (first, second) = tokio::join!(
        fx.dispatcher.dispatch(&source, SyncMode::Add),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fx.dispatcher.dispatch(&source, SyncMode::Change).await
        }
    );

    assert_eq!(settled(first.unwrap()).written(), 2);
    assert_eq!(rejection(second.unwrap()), RejectReason::InFlight);
    assert_eq!(fx.mock.call_count(), 2);
    assert_eq!(fx.dispatcher.in_flight().dropped(), 1);
    assert!(fx.dispatcher.in_flight().is_empty());
}

#[tokio::test]
async fn dry_run_decides_without_translating_or_writing() {
    let fx = Fixture::new(MockTranslator::echo());
    let dry = fx.dispatcher.clone().with_dry_run(true);
    let source = fx.write("ru/hello.md", HELLO);

    let report = settled(dry.dispatch(&source, SyncMode::Add).await.unwrap());

    assert!(report.dry_run);
    assert_eq!(report.would_write(), 2);
    assert_eq!(fx.mock.call_count(), 0);
    assert!(!fx.path("en/hello.md").exists());
}

// ---------------------------------------------------------------------------
// 6. Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconcile_fills_groups_and_is_idempotent() {
    let fx = Fixture::new(MockTranslator::echo());
    fx.write("ru/a.md", "---\ntitle: A\n---\nru\n");
    fx.write("en/b.md", "---\ntitle: B\n---\nen\n");
    fx.set_mtime("ru/a.md", 1_000);
    fx.set_mtime("en/b.md", 1_000);

    let first = reconcile_all(&fx.dispatcher).await.unwrap();
    assert_eq!(first.written(), 4);
    assert_eq!(first.exit_code(), 0);
    assert_eq!(fx.mock.call_count(), 4);
    for rel in ["en/a.md", "uz/a.md", "ru/b.md", "uz/b.md"] {
        assert!(fx.path(rel).exists(), "{rel} missing");
    }

    let second = reconcile_all(&fx.dispatcher).await.unwrap();
    assert_eq!(second.written(), 0);
    assert_eq!(second.scanned, 6);
    assert_eq!(second.mirrors_skipped, 4);
    assert_eq!(fx.mock.call_count(), 4);
}

#[tokio::test]
async fn reconcile_exit_code_reflects_failures() {
    let mock = MockTranslator::echo().with_reply(
        "uz",
        MockReply::Fail(TranslateError::Api {
            status: 529,
            message: "Overloaded".to_string(),
        }),
    );
    let fx = Fixture::new(mock);
    fx.write("ru/a.md", "---\ntitle: A\n---\n");

    let report = reconcile_all(&fx.dispatcher).await.unwrap();
    assert_eq!(report.written(), 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn reconcile_records_an_unreadable_locale_and_moves_on() {
    let fx = Fixture::new(MockTranslator::echo());
    fx.write("ru/a.md", "---\ntitle: A\n---\n");
    // A plain file where the `en` directory belongs.
    fs::write(fx.path("en"), "not a directory").unwrap();
    fx.write("uz/b.md", "---\ntitle: B\n---\n");

    let report = reconcile_all(&fx.dispatcher).await.unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].path, fx.path("en"));
    assert_eq!(report.errors[0].kind, "io");
    // uz was still listed after the en failure: its own source was translated.
    assert!(fx.path("uz/a.md").exists());
    assert!(fx.path("ru/b.md").exists());
    assert_eq!(report.batches.len(), 2);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn translate_path_rejects_mirrors_with_exit_code_two() {
    let fx = Fixture::new(MockTranslator::echo());
    let mirror = fx.write("uz/a.md", "---\ntranslated: true\n---\n");

    let outcome = translate_path(&fx.dispatcher, &mirror).await.unwrap();
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(rejection(outcome), RejectReason::Mirror);
}

// ---------------------------------------------------------------------------
// 7. Deletion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_a_source_removes_its_mirrors() {
    let fx = Fixture::new(MockTranslator::echo());
    let source = fx.write("ru/hello.md", HELLO);
    fx.dispatcher.dispatch(&source, SyncMode::Add).await.unwrap();
    fs::remove_file(&source).unwrap();

    let report = on_source_deleted(fx.dispatcher.store(), &source).unwrap();
    assert_eq!(report.deleted(), 2);
    assert!(!fx.path("en/hello.md").exists());
    assert!(!fx.path("uz/hello.md").exists());

    let again = on_source_deleted(fx.dispatcher.store(), &source).unwrap();
    assert_eq!(again.deleted(), 0);
    assert_eq!(again.failed(), 0);
}

#[test]
fn report_serializes_outcomes_flat() {
    let report = locsync_sync::TargetReport {
        locale: "en".into(),
        path: Path::new("/blog/en/a.md").to_path_buf(),
        outcome: TargetOutcome::Written {
            action: SyncAction::Create,
        },
    };
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "written");
    assert_eq!(json["action"], "create");
    assert_eq!(json["locale"], "en");
}
