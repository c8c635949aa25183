// Test-specific lint overrides: property tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc
)]

//! Property-based tests for board convergence.
//!
//! Uses proptest to verify:
//! 1. Two replicas that see the same events, interleaved differently across
//!    tasks but in order per task, end with the same board.
//! 2. Re-delivering a `created` or `deleted` event changes nothing.
//! 3. Events for tasks that were never created are skipped, not applied.

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskboard::board::{Outcome, Reconciler};
use taskboard_proto::event::SyncEvent;
use taskboard_proto::task::{Percentage, ProjectId, SubTask, SubTaskId, Task, TaskId, TaskStatus};

const PROJECT: ProjectId = ProjectId::new(1);

#[derive(Debug, Clone)]
enum Op {
    Retitle(String),
    Move(TaskStatus),
    Progress(i64),
    AddSub,
    ToggleSub(usize),
    DeleteSub(usize),
}

fn arb_status() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::ToDo),
        Just(TaskStatus::Doing),
        Just(TaskStatus::Done),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z]{1,12}".prop_map(Op::Retitle),
        arb_status().prop_map(Op::Move),
        (0..=100i64).prop_map(Op::Progress),
        Just(Op::AddSub),
        (0..4usize).prop_map(Op::ToggleSub),
        (0..4usize).prop_map(Op::DeleteSub),
    ]
}

/// One task's history: its operations and whether it is deleted at the end.
fn arb_script() -> impl Strategy<Value = (Vec<Op>, bool)> {
    (prop::collection::vec(arb_op(), 0..8), any::<bool>())
}

/// The events a backend would relay for one task, in commit order.
fn events_for(id: u64, ops: &[Op], delete: bool, next_sub: &mut u64) -> Vec<SyncEvent> {
    let mut task = Task {
        id: TaskId::new(id),
        title: format!("task {id}"),
        description: String::new(),
        status: TaskStatus::ToDo,
        percentage: Percentage::default(),
        deadline: None,
        owner: BTreeSet::new(),
        subtasks: Vec::new(),
        project: Some(PROJECT),
    };
    let mut events = vec![SyncEvent::TaskCreated(task.clone())];
    for op in ops {
        match op {
            Op::Retitle(title) => {
                task.title.clone_from(title);
                events.push(SyncEvent::TaskUpdated(task.clone()));
            }
            Op::Move(to) => {
                let from = task.status;
                task.status = *to;
                events.push(SyncEvent::TaskMoved {
                    task: task.clone(),
                    from_status: Some(from),
                    to_status: Some(*to),
                });
            }
            Op::Progress(pct) => {
                task.percentage = Percentage::new(*pct);
                events.push(SyncEvent::TaskUpdated(task.clone()));
            }
            Op::AddSub => {
                *next_sub += 1;
                let sub = SubTask {
                    id: SubTaskId::new(*next_sub),
                    task: task.id,
                    title: format!("item {next_sub}"),
                    completed: false,
                };
                task.subtasks.push(sub.clone());
                events.push(SyncEvent::SubTaskCreated(sub));
            }
            Op::ToggleSub(k) => {
                if let Some(sub) = task.subtasks.get_mut(*k) {
                    sub.completed = !sub.completed;
                    events.push(SyncEvent::SubTaskUpdated(sub.clone()));
                }
            }
            Op::DeleteSub(k) => {
                if *k < task.subtasks.len() {
                    let sub = task.subtasks.remove(*k);
                    events.push(SyncEvent::SubTaskDeleted {
                        task_id: task.id,
                        subtask_id: sub.id,
                    });
                }
            }
        }
    }
    if delete {
        events.push(SyncEvent::TaskDeleted {
            id: task.id,
            title: Some(task.title),
        });
    }
    events
}

/// Merges per-task queues, choosing the next queue from `choices`.
fn interleave(queues: &[Vec<SyncEvent>], choices: &[usize]) -> Vec<SyncEvent> {
    let mut cursors = vec![0usize; queues.len()];
    let total: usize = queues.iter().map(Vec::len).sum();
    let mut merged = Vec::with_capacity(total);
    let mut step = 0;
    while merged.len() < total {
        let open: Vec<usize> = (0..queues.len())
            .filter(|&q| cursors[q] < queues[q].len())
            .collect();
        let pick = open[choices.get(step).copied().unwrap_or(0) % open.len()];
        merged.push(queues[pick][cursors[pick]].clone());
        cursors[pick] += 1;
        step += 1;
    }
    merged
}

fn replay(events: &[SyncEvent]) -> Vec<Task> {
    let mut reconciler = Reconciler::new(PROJECT);
    for event in events {
        reconciler.apply_remote_event(event);
    }
    let mut tasks = reconciler.state().tasks().to_vec();
    tasks.sort_by_key(|t| t.id);
    tasks
}

fn arb_history() -> impl Strategy<Value = (Vec<Vec<SyncEvent>>, Vec<usize>, Vec<usize>)> {
    (
        prop::collection::vec(arb_script(), 1..5),
        prop::collection::vec(any::<usize>(), 0..64),
        prop::collection::vec(any::<usize>(), 0..64),
    )
        .prop_map(|(scripts, a, b)| {
            let mut next_sub = 0;
            let queues = scripts
                .iter()
                .zip(1u64..)
                .map(|((ops, delete), id)| events_for(id, ops, *delete, &mut next_sub))
                .collect();
            (queues, a, b)
        })
}

proptest! {
    #[test]
    fn replicas_converge_across_interleavings((queues, a, b) in arb_history()) {
        let first = replay(&interleave(&queues, &a));
        let second = replay(&interleave(&queues, &b));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn final_board_matches_each_task_history((queues, a, _b) in arb_history()) {
        let board = replay(&interleave(&queues, &a));
        for queue in &queues {
            let alone = replay(queue);
            let id = queue[0].task_id();
            let on_board = board.iter().find(|t| t.id == id);
            prop_assert_eq!(on_board, alone.first());
        }
    }

    #[test]
    fn redelivered_created_and_deleted_are_no_ops((queues, a, _b) in arb_history()) {
        let events = interleave(&queues, &a);
        let mut reconciler = Reconciler::new(PROJECT);
        for event in &events {
            reconciler.apply_remote_event(event);
            let before = reconciler.state().clone();
            if matches!(event, SyncEvent::TaskCreated(_) | SyncEvent::TaskDeleted { .. }) {
                let again = reconciler.apply_remote_event(event);
                prop_assert!(!again.is_changed());
                prop_assert_eq!(reconciler.state(), &before);
            }
        }
    }

    #[test]
    fn events_for_unknown_tasks_are_skipped(status in arb_status(), id in 1..1_000u64) {
        let mut reconciler = Reconciler::new(PROJECT);
        let task = Task {
            id: TaskId::new(id),
            title: "ghost".to_string(),
            description: String::new(),
            status,
            percentage: Percentage::default(),
            deadline: None,
            owner: BTreeSet::new(),
            subtasks: Vec::new(),
            project: None,
        };
        let outcome = reconciler.apply_remote_event(&SyncEvent::TaskMoved {
            task: task.clone(),
            from_status: None,
            to_status: Some(status),
        });
        prop_assert!(matches!(outcome, Outcome::Skipped(_)));
        let outcome = reconciler.apply_remote_event(&SyncEvent::TaskUpdated(task));
        prop_assert!(matches!(outcome, Outcome::Skipped(_)));
        prop_assert!(reconciler.state().is_empty());
    }
}
