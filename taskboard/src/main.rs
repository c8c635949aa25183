//! `taskboard`: terminal client for a project's real-time Kanban board.
//!
//! Prints the board whenever it changes and reads line commands from stdin.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskboard/config.toml`).
//!
//! ```bash
//! cargo run --bin taskboard -- --project 1 --user-id 7 --token "$TOKEN"
//!
//! # Against the in-memory test backend
//! cargo run --bin taskboard-stub &
//! cargo run --bin taskboard -- --api-url http://127.0.0.1:8000/api \
//!     --ws-url ws://127.0.0.1:8000 --project 1 --user-id 1 --token dev
//! ```

use std::error::Error;
use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use taskboard::activity::ActivityLog;
use taskboard::board::{BoardEvent, BoardSession, BoardState, TaskDisplay, project};
use taskboard::chat::ChatFeed;
use taskboard::command::{self, Command, HELP, ParseError};
use taskboard::config::{CliArgs, ClientConfig};
use taskboard::connection::ConnectionManager;
use taskboard::members::Roster;
use taskboard::session::Session;
use taskboard::store::TaskStore;
use taskboard::store::http::HttpTaskStore;
use taskboard_proto::chat::ChatMessage;
use taskboard_proto::task::{MemberId, ProjectId};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file; stdout shows the board.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(?config, "taskboard starting");

    let Some(session) = config.to_session() else {
        eprintln!("error: missing credentials, pass --user-id and --token (or TASKBOARD_USER_ID / TASKBOARD_TOKEN)");
        return ExitCode::FAILURE;
    };
    let Some(project_id) = config.project else {
        eprintln!("error: missing project, pass --project <id>");
        return ExitCode::FAILURE;
    };

    let result = run(&config, session, project_id).await;
    tracing::info!("taskboard exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(err = %e, "taskboard failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskboard.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(
    config: &ClientConfig,
    session: Session,
    project_id: ProjectId,
) -> Result<(), Box<dyn Error>> {
    let viewer = session.user_id();
    let store = Arc::new(HttpTaskStore::new(&config.store_config(), session.clone())?);
    let connections = ConnectionManager::new(config.connection_config(), session)?;

    let mut board = BoardSession::open(Arc::clone(&store), &connections, project_id).await?;
    let mut activity = ActivityLog::load(&*store, project_id)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(project = %project_id, err = %e, "activity log unavailable");
            ActivityLog::new()
        });
    let mut roster = Roster::load(&*store, project_id).await.unwrap_or_else(|e| {
        tracing::warn!(project = %project_id, err = %e, "member list unavailable");
        Roster::default()
    });
    let mut chat = match ChatFeed::open(&*store, &connections, project_id).await {
        Ok(feed) => Some(feed),
        Err(e) => {
            tracing::warn!(project = %project_id, err = %e, "chat unavailable");
            println!("(chat unavailable: {e})");
            None
        }
    };

    println!("connecting to project {project_id}...");
    let status = board.wait_until_ready().await;
    if !status.is_ready() {
        println!("! tasks channel {status}; changes will be refused");
    }

    let mut state = board.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    print_board(&board.snapshot(), &roster, viewer);
    println!("type 'help' for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Help) => println!("{HELP}"),
                    Ok(Command::Log) => print_log(&activity),
                    Ok(Command::Members) => match Roster::load(&*store, project_id).await {
                        Ok(fresh) => {
                            roster = fresh;
                            print_members(&roster);
                        }
                        Err(e) => println!("! members: {e}"),
                    },
                    Ok(Command::Invite(usernames)) => {
                        match store.invite_members(project_id, &usernames).await {
                            Ok(()) => {
                                println!("invited {}", usernames.join(", "));
                                if let Ok(fresh) = Roster::load(&*store, project_id).await {
                                    roster = fresh;
                                }
                            }
                            Err(e) => println!("! invite: {e}"),
                        }
                    }
                    Ok(Command::Manager(member)) => match store.set_manager(project_id, member).await {
                        Ok(details) => {
                            roster.set_manager(details.manager);
                            print_members(&roster);
                        }
                        Err(e) => println!("! manager: {e}"),
                    },
                    Ok(Command::Kick(member)) => match store.remove_member(project_id, member).await {
                        Ok(()) => {
                            if let Ok(fresh) = Roster::load(&*store, project_id).await {
                                roster = fresh;
                            }
                            print_members(&roster);
                        }
                        Err(e) => println!("! kick: {e}"),
                    },
                    Ok(Command::Say(text)) => match &chat {
                        Some(feed) => {
                            if let Err(e) = feed.send(&text) {
                                println!("! chat: {e}");
                            }
                        }
                        None => println!("! chat is not available"),
                    },
                    Ok(cmd) => match cmd.to_intent(&board.snapshot()) {
                        Ok(Some(intent)) => board.submit(intent).await?,
                        Ok(None) => {}
                        Err(e) => println!("! {e}"),
                    },
                    Err(ParseError::Empty) => {}
                    Err(e) => println!("! {e}"),
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = state.borrow_and_update().clone();
                print_board(&snapshot, &roster, viewer);
            }
            event = board.next_event() => match event {
                Some(BoardEvent::StatusChanged(status)) => println!("[tasks channel: {status}]"),
                Some(BoardEvent::Failed { error, .. }) => println!("! {error}"),
                Some(BoardEvent::Activity(entry)) => {
                    println!("* {}", entry.render());
                    activity.record(entry);
                }
                Some(BoardEvent::Applied { .. }) => {}
                None => break,
            },
            message = next_chat(&mut chat) => match message {
                Some(m) => println!("<{}> {}", m.user, m.message),
                None => {
                    println!("[chat channel closed]");
                    chat = None;
                }
            },
        }
    }

    if let Some(feed) = &chat {
        feed.close();
    }
    board.close().await;
    Ok(())
}

async fn next_chat(chat: &mut Option<ChatFeed>) -> Option<ChatMessage> {
    match chat {
        Some(feed) => feed.recv().await,
        None => std::future::pending().await,
    }
}

fn print_board(state: &BoardState, roster: &Roster, viewer: MemberId) {
    let now = Utc::now();
    println!();
    for column in project(state).columns() {
        println!("== {} ({}) ==", column.status, column.tasks.len());
        for task in &column.tasks {
            let display = TaskDisplay::derive(task, Some(viewer), now);
            let marker = if display.owned_by_viewer { '*' } else { ' ' };
            let mut line = format!("{marker} #{} {}", task.id, task.title);
            if display.show_progress {
                let _ = write!(line, "  {}%", task.percentage.get());
            }
            if let Some(label) = &display.deadline_label {
                let _ = write!(line, "  {label}");
                if display.overdue {
                    line.push('!');
                }
            }
            if !task.owner.is_empty() {
                let _ = write!(line, "  @{}", roster.owner_names(task).join(",@"));
            }
            if state.has_previews(task.id) {
                line.push_str("  (being edited)");
            }
            println!("{line}");
            for sub in &task.subtasks {
                let tick = if sub.completed { 'x' } else { ' ' };
                println!("      [{tick}] {} {}", sub.id, sub.title);
            }
        }
    }
}

fn print_members(roster: &Roster) {
    if roster.members().is_empty() {
        println!("(no members)");
        return;
    }
    for line in roster.lines() {
        println!("  {line}");
    }
}

fn print_log(activity: &ActivityLog) {
    if activity.is_empty() {
        println!("(no activity yet)");
        return;
    }
    for (entry, line) in activity.entries().zip(activity.lines()) {
        match entry.timestamp {
            Some(at) => println!("{}  {line}", at.format("%H:%M:%S %d/%m/%Y")),
            None => println!("{line}"),
        }
    }
}
