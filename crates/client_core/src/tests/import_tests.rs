use super::*;
use crate::test_support::{snapshot, FakeApi, ListScript};
use shared::{
    error::ErrorKind,
    protocol::{ImportOutcome, ImportProgress},
};

fn orchestrator() -> (Arc<FakeApi>, ImportOrchestrator<FakeApi>) {
    let api = FakeApi::new(ListScript::Bare { count: 0 });
    (api.clone(), ImportOrchestrator::new(api))
}

#[tokio::test]
async fn submit_tracks_the_returned_job() {
    let (api, imports) = orchestrator();
    let id = ImportId::new("imp-1");
    assert_eq!(imports.phase(&id).await, ImportPhase::Idle);

    let options = ImportOptions {
        skip_validation: true,
        ..Default::default()
    };
    let handle = imports
        .submit(ImportUpload::new("customers.csv", "a,b\n1,2\n"), &options)
        .await
        .expect("submit");

    assert_eq!(handle.import_id(), Some(&id));
    assert_eq!(imports.phase(&id).await, ImportPhase::Submitted);
    let uploads = api.uploads.lock().expect("uploads");
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, options);
}

#[tokio::test]
async fn submit_answered_with_bare_id_is_tracked_as_queued() {
    let (api, imports) = orchestrator();
    api.set_submit_reply(ImportHandle::Id(ImportId::new("imp-77")));

    let handle = imports
        .submit(ImportUpload::new("batch.csv", "a\n1\n"), &ImportOptions::default())
        .await
        .expect("submit");

    let id = ImportId::new("imp-77");
    assert_eq!(handle.import_id(), Some(&id));
    let tracked = imports.tracked(&id).await.expect("tracked");
    assert_eq!(tracked.phase(), ImportPhase::Submitted);
    assert_eq!(tracked.snapshot.file_name.as_deref(), Some("batch.csv"));
}

#[tokio::test]
async fn submit_finished_within_the_request_tracks_nothing() {
    let (api, imports) = orchestrator();
    let outcome = ImportOutcome {
        progress: ImportProgress {
            total_rows: 2,
            processed_rows: 2,
            success_count: 2,
            error_count: 0,
        },
        errors: Vec::new(),
    };
    api.set_submit_reply(ImportHandle::Finished(outcome.clone()));

    let handle = imports
        .submit(ImportUpload::new("small.csv", "a\n1\n2\n"), &ImportOptions::default())
        .await
        .expect("a finished import is a success");

    assert_eq!(handle, ImportHandle::Finished(outcome));
    assert_eq!(handle.import_id(), None);
    assert_eq!(imports.phase(&ImportId::new("imp-1")).await, ImportPhase::Idle);
}

#[tokio::test]
async fn submit_without_file_content_is_a_validation_error() {
    let (api, imports) = orchestrator();
    let err = imports
        .submit(ImportUpload::new("empty.csv", Vec::<u8>::new()), &ImportOptions::default())
        .await
        .expect_err("empty upload");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        err.validation_errors().and_then(|e| e.field("csvFile")),
        Some("CSV file is required")
    );
    assert!(api.uploads.lock().expect("uploads").is_empty());
}

#[tokio::test]
async fn poll_is_idempotent_without_server_change() {
    let (api, imports) = orchestrator();
    api.script_statuses("imp-3", vec![snapshot("imp-3", ImportState::Running, 40, 100)]);
    let id = ImportId::new("imp-3");

    let first = imports.poll(&id).await.expect("poll");
    let second = imports.poll(&id).await.expect("poll");

    assert_eq!(first, second);
    assert_eq!(imports.phase(&id).await, ImportPhase::Running);
}

#[tokio::test]
async fn cancel_after_completion_defers_to_server_state() {
    let (api, imports) = orchestrator();
    api.script_statuses("imp-4", vec![snapshot("imp-4", ImportState::Completed, 10, 10)]);
    let id = ImportId::new("imp-4");
    imports.poll(&id).await.expect("poll");

    let ack = imports.cancel(&id).await.expect("cancel");
    assert_eq!(ack, "Cancellation requested");
    assert_eq!(api.cancel_calls.lock().expect("cancels").as_slice(), [id.clone()]);

    let tracked = imports.tracked(&id).await.expect("tracked");
    assert!(tracked.cancel_requested);
    assert_eq!(tracked.phase(), ImportPhase::Completed);

    let after = imports.poll(&id).await.expect("poll");
    assert_eq!(after.status, ImportState::Completed);
    assert_eq!(imports.phase(&id).await, ImportPhase::Completed);
}

#[tokio::test]
async fn cancel_of_running_job_is_seen_on_next_poll() {
    let (api, imports) = orchestrator();
    api.script_statuses("imp-5", vec![snapshot("imp-5", ImportState::Running, 3, 10)]);
    let id = ImportId::new("imp-5");
    imports.poll(&id).await.expect("poll");

    imports.cancel(&id).await.expect("cancel");
    assert_eq!(imports.phase(&id).await, ImportPhase::Running);

    imports.poll(&id).await.expect("poll");
    assert_eq!(imports.phase(&id).await, ImportPhase::Cancelled);
}

#[tokio::test]
async fn poll_failure_surfaces_as_error() {
    let (_api, imports) = orchestrator();
    let err = imports
        .poll(&ImportId::new("unknown"))
        .await
        .expect_err("unknown job");
    assert_eq!(err.status(), Some(404));
    assert_eq!(imports.phase(&ImportId::new("unknown")).await, ImportPhase::Idle);
}

#[tokio::test]
async fn list_active_skips_terminal_jobs() {
    let (api, imports) = orchestrator();
    api.set_active(vec![
        snapshot("a", ImportState::Running, 1, 4),
        snapshot("b", ImportState::Completed, 4, 4),
        snapshot("c", ImportState::Queued, 0, 0),
    ]);

    let active = imports.list_active().await.expect("active");
    let ids: Vec<&str> = active.iter().map(|job| job.import_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(imports.phase(&ImportId::new("c")).await, ImportPhase::Submitted);
    assert_eq!(imports.phase(&ImportId::new("b")).await, ImportPhase::Idle);
}

#[tokio::test]
async fn watch_keeps_polling_through_unrecognised_status() {
    let (api, imports) = orchestrator();
    api.script_statuses(
        "imp-9",
        vec![
            snapshot("imp-9", ImportState::Unknown, 1, 4),
            snapshot("imp-9", ImportState::Completed, 4, 4),
        ],
    );
    let id = ImportId::new("imp-9");

    let first = imports.poll(&id).await.expect("poll");
    assert_eq!(first.status, ImportState::Unknown);
    assert_eq!(imports.phase(&id).await, ImportPhase::Running);

    let last = imports
        .watch(&id, Duration::from_millis(1), |_| {})
        .await
        .expect("watch");
    assert_eq!(last.status, ImportState::Completed);
}

#[tokio::test]
async fn watch_reports_progress_until_terminal() {
    let (api, imports) = orchestrator();
    api.script_statuses(
        "imp-6",
        vec![
            snapshot("imp-6", ImportState::Queued, 0, 0),
            snapshot("imp-6", ImportState::Running, 50, 100),
            snapshot("imp-6", ImportState::Completed, 100, 100),
        ],
    );

    let mut seen = Vec::new();
    let last = imports
        .watch(&ImportId::new("imp-6"), Duration::from_millis(1), |job| {
            seen.push((job.status, job.progress.percent()))
        })
        .await
        .expect("watch");

    assert_eq!(last.status, ImportState::Completed);
    assert_eq!(
        seen,
        vec![
            (ImportState::Queued, None),
            (ImportState::Running, Some(50)),
            (ImportState::Completed, Some(100)),
        ]
    );
}
