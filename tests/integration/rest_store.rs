// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for the REST task store against the stub backend.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use taskboard::session::Session;
use taskboard::store::http::{HttpTaskStore, StoreConfig};
use taskboard::store::{StoreError, TaskStore};
use taskboard::members::Roster;
use taskboard_proto::task::{
    MemberId, NewTask, Percentage, ProjectId, SubTaskId, TaskId, TaskStatus,
};
use taskboard_stub::server::{self, StubState};

const PROJECT: ProjectId = ProjectId::new(2);

async fn store_for(state: StubState, token: &str) -> HttpTaskStore {
    let (addr, _handle) = server::start_server_with_state("127.0.0.1:0", state.into())
        .await
        .unwrap();
    HttpTaskStore::new(
        &StoreConfig {
            api_url: format!("http://{addr}/api/"),
            request_timeout: Duration::from_secs(5),
        },
        Session::new(MemberId::new(1), "ana", token),
    )
    .unwrap()
}

#[tokio::test]
async fn task_crud_round_trip() {
    let store = store_for(StubState::new(), "any").await;
    assert!(store.list_tasks(PROJECT).await.unwrap().is_empty());

    let created = store
        .create_task(PROJECT, &NewTask::todo(PROJECT, "Plan sprint"))
        .await
        .unwrap();
    assert_eq!(created.title, "Plan sprint");
    assert_eq!(created.status, TaskStatus::ToDo);

    let mut edited = created.clone();
    edited.status = TaskStatus::Doing;
    edited.percentage = Percentage::new(40);
    edited.deadline = Some(Utc.with_ymd_and_hms(2030, 1, 2, 12, 0, 0).unwrap());
    edited.owner.insert(MemberId::new(7));
    let stored = store.update_task(PROJECT, &edited).await.unwrap();
    assert_eq!(stored.status, TaskStatus::Doing);
    assert_eq!(stored.percentage.get(), 40);
    assert_eq!(stored.deadline, edited.deadline);
    assert!(stored.owner.contains(&MemberId::new(7)));

    let listed = store.list_tasks(PROJECT).await.unwrap();
    assert_eq!(listed, vec![stored]);

    store.delete_task(PROJECT, created.id).await.unwrap();
    assert!(store.list_tasks(PROJECT).await.unwrap().is_empty());
}

#[tokio::test]
async fn subtasks_survive_task_updates() {
    let store = store_for(StubState::new(), "any").await;
    let task = store
        .create_task(PROJECT, &NewTask::todo(PROJECT, "Release"))
        .await
        .unwrap();
    let sub = store
        .create_subtask(PROJECT, task.id, "tag the build")
        .await
        .unwrap();
    assert_eq!(sub.task, task.id);
    assert!(!sub.completed);

    let toggled = store
        .set_subtask_completed(PROJECT, task.id, sub.id, true)
        .await
        .unwrap();
    assert!(toggled.completed);
    assert_eq!(toggled.title, "tag the build");

    // The update body carries no sub-tasks; the stored ones are kept.
    let mut renamed = task.clone();
    renamed.title = "Release 2".to_string();
    let stored = store.update_task(PROJECT, &renamed).await.unwrap();
    assert_eq!(stored.subtasks, vec![toggled]);

    store.delete_subtask(PROJECT, task.id, sub.id).await.unwrap();
    let listed = store.list_tasks(PROJECT).await.unwrap();
    assert!(listed[0].subtasks.is_empty());
}

#[tokio::test]
async fn missing_records_are_404() {
    let store = store_for(StubState::new(), "any").await;
    let err = store.delete_task(PROJECT, TaskId::new(99)).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 404, .. }), "{err}");

    let task = store
        .create_task(PROJECT, &NewTask::todo(PROJECT, "A"))
        .await
        .unwrap();
    let err = store
        .set_subtask_completed(PROJECT, task.id, SubTaskId::new(5), true)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 404, .. }), "{err}");
}

#[tokio::test]
async fn blank_title_is_400() {
    let store = store_for(StubState::new(), "any").await;
    let err = store
        .create_task(PROJECT, &NewTask::todo(PROJECT, "   "))
        .await
        .unwrap_err();
    match err {
        StoreError::Status { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("detail"), "{body}");
        }
        other => panic!("expected status error, got {other}"),
    }
}

#[tokio::test]
async fn unknown_token_is_401_when_auth_is_required() {
    let state = || StubState::new().with_user("good", "ana").requiring_auth(true);

    let rejected = store_for(state(), "bad").await;
    let err = rejected.list_tasks(PROJECT).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 401, .. }), "{err}");

    let accepted = store_for(state(), "good").await;
    assert!(accepted.list_tasks(PROJECT).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_endpoints_start_empty() {
    let store = store_for(StubState::new(), "any").await;
    assert!(store.list_activity(PROJECT).await.unwrap().is_empty());
    assert!(store.list_chat(PROJECT).await.unwrap().is_empty());
}

#[tokio::test]
async fn subtask_routes_are_keyed_by_task() {
    let store = store_for(StubState::new(), "any").await;
    let task = store
        .create_task(PROJECT, &NewTask::todo(PROJECT, "Release"))
        .await
        .unwrap();
    // The project argument plays no part in the sub-task URL.
    let sub = store
        .create_subtask(ProjectId::new(77), task.id, "tag")
        .await
        .unwrap();
    let listed = store.list_tasks(PROJECT).await.unwrap();
    assert_eq!(listed[0].subtasks, vec![sub]);
}

#[tokio::test]
async fn members_can_be_invited_promoted_and_removed() {
    let state = StubState::new()
        .with_user("tok-ana", "ana")
        .with_user("tok-bo", "bo");
    let store = store_for(state, "tok-ana").await;
    assert!(store.list_members(PROJECT).await.unwrap().is_empty());

    let names = vec!["ana".to_string(), "bo".to_string()];
    store.invite_members(PROJECT, &names).await.unwrap();
    let roster = Roster::load(&store, PROJECT).await.unwrap();
    let ana = roster.members()[0].id;
    let bo = roster.members()[1].id;
    assert_eq!(roster.manager(), Some(ana));
    assert_eq!(roster.name_of(bo), Some("bo"));

    let err = store.remove_member(PROJECT, ana).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 400, .. }), "{err}");

    let details = store.set_manager(PROJECT, bo).await.unwrap();
    assert_eq!(details.manager, Some(bo));
    store.remove_member(PROJECT, ana).await.unwrap();
    let members = store.list_members(PROJECT).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].username, "bo");

    let unknown = vec!["nobody".to_string()];
    let err = store.invite_members(PROJECT, &unknown).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 404, .. }), "{err}");
    let err = store.set_manager(PROJECT, MemberId::new(99)).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status: 404, .. }), "{err}");
}
