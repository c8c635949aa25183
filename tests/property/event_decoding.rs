//! Property-based tests for sync event decoding.
//!
//! Uses proptest to verify:
//! 1. Arbitrary text never panics the frame decoder.
//! 2. Tags outside the known action set are always rejected, never coerced.
//! 3. Payloads without a tag are rejected as `MissingAction`.
//! 4. Any task event this crate encodes is decoded back to the same event.
//! 5. Wire percentages are always clamped into `0..=100`.

use proptest::prelude::*;
use serde_json::{Value, json};
use taskboard_proto::event::{Action, EventError, SyncEvent, TaskField};
use taskboard_proto::frame::Frame;
use taskboard_proto::task::{MemberId, ProjectId, SubTask, SubTaskId, Task, TaskId, TaskStatus};

const KNOWN_ACTIONS: [&str; 6] = ["created", "updated", "edited", "moved", "deleted", "editing"];

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::ToDo),
        Just(TaskStatus::Doing),
        Just(TaskStatus::Done),
    ]
}

fn arb_subtask(task: TaskId) -> impl Strategy<Value = SubTask> {
    (1..10_000u64, "[a-z ]{0,16}", any::<bool>()).prop_map(move |(id, title, completed)| SubTask {
        id: SubTaskId::new(id),
        task,
        title,
        completed,
    })
}

fn arb_task() -> impl Strategy<Value = Task> {
    (1..1_000u64, "[A-Za-z0-9 ]{1,32}", ".{0,64}", arb_status(), 0..=100i64)
        .prop_flat_map(|(id, title, description, status, pct)| {
            let task_id = TaskId::new(id);
            (
                Just((task_id, title, description, status, pct)),
                prop::collection::btree_set(1..50u64, 0..4),
                prop::collection::vec(arb_subtask(task_id), 0..3),
            )
        })
        .prop_map(|((id, title, description, status, pct), owners, subtasks)| Task {
            id,
            title,
            description,
            status,
            percentage: serde_json::from_value(json!(pct)).unwrap_or_default(),
            deadline: None,
            owner: owners.into_iter().map(MemberId::new).collect(),
            subtasks,
            project: Some(ProjectId::new(1)),
        })
}

fn arb_event() -> impl Strategy<Value = SyncEvent> {
    prop_oneof![
        arb_task().prop_map(SyncEvent::TaskCreated),
        arb_task().prop_map(SyncEvent::TaskUpdated),
        (arb_task(), prop::sample::subsequence(
            vec![TaskField::Title, TaskField::Description, TaskField::Owner],
            0..=3,
        ))
            .prop_map(|(task, edited_fields)| SyncEvent::TaskEdited {
                task,
                edited_fields
            }),
        (arb_task(), arb_status()).prop_map(|(task, from)| SyncEvent::TaskMoved {
            from_status: Some(from),
            to_status: Some(task.status),
            task,
        }),
        (1..1_000u64).prop_map(|id| SyncEvent::TaskDeleted {
            id: TaskId::new(id),
            title: None
        }),
        arb_subtask(TaskId::new(3)).prop_map(SyncEvent::SubTaskCreated),
        (1..1_000u64, 1..1_000u64).prop_map(|(t, s)| SyncEvent::SubTaskDeleted {
            task_id: TaskId::new(t),
            subtask_id: SubTaskId::new(s),
        }),
        (1..1_000u64, "[a-z]{0,8}").prop_map(|(t, v)| SyncEvent::Editing {
            task_id: TaskId::new(t),
            field: TaskField::Title,
            value: Value::String(v),
        }),
    ]
}

proptest! {
    /// Arbitrary text never panics the frame decoder.
    #[test]
    fn random_text_decode_no_panic(text in ".{0,256}") {
        if let Ok(frame) = Frame::decode(&text) {
            let _ = frame.event();
        }
    }

    /// Unknown tags are rejected with the tag echoed back.
    #[test]
    fn unknown_action_rejected(tag in "[a-z]{1,12}") {
        prop_assume!(!KNOWN_ACTIONS.contains(&tag.as_str()));
        let msg = json!({"id": 1, "title": "A", "status": "To-Do", "action": tag});
        prop_assert_eq!(SyncEvent::from_message(&msg), Err(EventError::UnknownAction(tag)));
    }

    /// Payloads without a tag are rejected, whatever else they carry.
    #[test]
    fn untagged_payload_rejected(task in arb_task()) {
        let msg = serde_json::to_value(&task).unwrap();
        prop_assert_eq!(SyncEvent::from_message(&msg), Err(EventError::MissingAction));
    }

    /// Encoded events decode to themselves and keep their action tag.
    #[test]
    fn encoded_event_decodes_to_itself(event in arb_event()) {
        let frame = Frame::from_event(&event).unwrap();
        let text = frame.encode().unwrap();
        let decoded = Frame::decode(&text).unwrap().event().unwrap();
        prop_assert_eq!(decoded.action(), event.action());
        prop_assert_eq!(decoded, event);
    }

    /// Out-of-range percentages are clamped rather than rejected.
    #[test]
    fn percentage_is_clamped(raw in -1_000.0f64..1_000.0) {
        let msg = json!({"id": 1, "title": "A", "status": "Doing",
                         "percentage": raw, "action": "updated"});
        let SyncEvent::TaskUpdated(task) = SyncEvent::from_message(&msg).unwrap() else {
            return Err(TestCaseError::fail("expected TaskUpdated"));
        };
        prop_assert!(task.percentage.get() <= 100);
        if raw <= 0.0 {
            prop_assert_eq!(task.percentage.get(), 0);
        }
    }
}

#[test]
fn every_action_tag_parses() {
    for tag in KNOWN_ACTIONS {
        let action: Action = tag.parse().unwrap();
        assert_eq!(action.as_str(), tag);
    }
}
