//! Line commands typed into the terminal front end.
//!
//! ```text
//! add <title>              move <id> <todo|doing|done>
//! edit <id> <title>        delete <id>
//! sub <id> <title>         toggle <id> <sub-id>
//! unsub <id> <sub-id>      assign <id> [member-id...]
//! members                  invite <username...>
//! manager <member-id>      kick <member-id>
//! say <text>               log
//! help                     quit
//! ```

use std::collections::BTreeSet;

use taskboard_proto::task::{MemberId, ParseStatusError, SubTaskId, TaskId, TaskStatus};

use crate::board::{BoardError, BoardState, Intent};

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `add <title>`
    Add(String),
    /// `move <id> <status>`
    Move {
        /// Card to move.
        task: TaskId,
        /// Target column.
        to: TaskStatus,
    },
    /// `edit <id> <title>`: retitle a card.
    Edit {
        /// Card to edit.
        task: TaskId,
        /// New title.
        title: String,
    },
    /// `delete <id>`
    Delete(TaskId),
    /// `sub <id> <title>`
    Sub {
        /// Parent card.
        task: TaskId,
        /// Item title.
        title: String,
    },
    /// `toggle <id> <sub-id>`
    Toggle {
        /// Parent card.
        task: TaskId,
        /// Item to flip.
        subtask: SubTaskId,
    },
    /// `unsub <id> <sub-id>`
    Unsub {
        /// Parent card.
        task: TaskId,
        /// Item to remove.
        subtask: SubTaskId,
    },
    /// `assign <id> [member-id...]`: replace a card's owners; no ids clears
    /// them.
    Assign {
        /// Card to assign.
        task: TaskId,
        /// New owners.
        owners: BTreeSet<MemberId>,
    },
    /// `members`: list the project's members.
    Members,
    /// `invite <username...>`
    Invite(Vec<String>),
    /// `manager <member-id>`: hand over the manager role.
    Manager(MemberId),
    /// `kick <member-id>`
    Kick(MemberId),
    /// `say <text>`: post to the project chat.
    Say(String),
    /// `log`: print the activity log.
    Log,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Errors from [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Nothing but whitespace.
    #[error("empty command")]
    Empty,
    /// The first word is not a command.
    #[error("unknown command: {0} (try 'help')")]
    Unknown(String),
    /// A required argument is missing.
    #[error("missing {0}")]
    Missing(&'static str),
    /// An id is not a number.
    #[error("invalid id: {0}")]
    InvalidId(String),
    /// A column name is not recognized.
    #[error(transparent)]
    InvalidStatus(#[from] ParseStatusError),
}

/// Usage text printed by `help`.
pub const HELP: &str = "\
commands:
  add <title>                 create a To-Do card
  move <id> <todo|doing|done> move a card
  edit <id> <title>           retitle a card
  delete <id>                 delete a card
  sub <id> <title>            add a checklist item
  toggle <id> <sub-id>        tick or untick a checklist item
  unsub <id> <sub-id>         remove a checklist item
  assign <id> [member-id...]  set a card's owners (none clears them)
  members                     list project members
  invite <username...>        add accounts to the project
  manager <member-id>         make a member the project manager
  kick <member-id>            remove a member from the project
  say <text>                  post to the project chat
  log                         show the activity log
  quit                        leave";

/// Parses one input line.
///
/// # Errors
///
/// See [`ParseError`].
pub fn parse(line: &str) -> Result<Command, ParseError> {
    let line = line.trim();
    let (word, rest) = split_word(line);
    match word.to_ascii_lowercase().as_str() {
        "" => Err(ParseError::Empty),
        "add" => Ok(Command::Add(text(rest, "title")?)),
        "move" => {
            let (task, rest) = id(rest, "task id")?;
            let (status, _) = split_word(rest);
            if status.is_empty() {
                return Err(ParseError::Missing("status"));
            }
            Ok(Command::Move {
                task,
                to: status.parse()?,
            })
        }
        "edit" => {
            let (task, rest) = id(rest, "task id")?;
            Ok(Command::Edit {
                task,
                title: text(rest, "title")?,
            })
        }
        "delete" | "rm" => Ok(Command::Delete(id(rest, "task id")?.0)),
        "sub" => {
            let (task, rest) = id(rest, "task id")?;
            Ok(Command::Sub {
                task,
                title: text(rest, "title")?,
            })
        }
        "toggle" => {
            let (task, rest) = id(rest, "task id")?;
            let (subtask, _) = id(rest, "sub-task id")?;
            Ok(Command::Toggle { task, subtask })
        }
        "unsub" => {
            let (task, rest) = id(rest, "task id")?;
            let (subtask, _) = id(rest, "sub-task id")?;
            Ok(Command::Unsub { task, subtask })
        }
        "assign" => {
            let (task, mut rest) = id(rest, "task id")?;
            let mut owners = BTreeSet::new();
            while !rest.is_empty() {
                let (owner, next) = id(rest, "member id")?;
                owners.insert(owner);
                rest = next;
            }
            Ok(Command::Assign { task, owners })
        }
        "members" => Ok(Command::Members),
        "invite" => {
            let usernames: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
            if usernames.is_empty() {
                return Err(ParseError::Missing("username"));
            }
            Ok(Command::Invite(usernames))
        }
        "manager" => Ok(Command::Manager(id(rest, "member id")?.0)),
        "kick" => Ok(Command::Kick(id(rest, "member id")?.0)),
        "say" => Ok(Command::Say(text(rest, "message")?)),
        "log" => Ok(Command::Log),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

impl Command {
    /// The board intent for this command, `None` for commands that do not
    /// touch the board.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::TaskNotFound`] when `edit` or `assign` names a
    /// card that is not on the board.
    pub fn to_intent(&self, state: &BoardState) -> Result<Option<Intent>, BoardError> {
        let intent = match self {
            Self::Add(title) => Intent::AddTask {
                title: title.clone(),
                description: String::new(),
            },
            Self::Move { task, to } => Intent::MoveTask {
                task: *task,
                to: *to,
            },
            Self::Edit { task, title } => {
                let mut edited = state
                    .task(*task)
                    .ok_or(BoardError::TaskNotFound(*task))?
                    .clone();
                edited.title.clone_from(title);
                Intent::EditTask(edited)
            }
            Self::Assign { task, owners } => {
                let mut edited = state
                    .task(*task)
                    .ok_or(BoardError::TaskNotFound(*task))?
                    .clone();
                edited.owner.clone_from(owners);
                Intent::EditTask(edited)
            }
            Self::Delete(task) => Intent::DeleteTask(*task),
            Self::Sub { task, title } => Intent::AddSubTask {
                task: *task,
                title: title.clone(),
            },
            Self::Toggle { task, subtask } => Intent::ToggleSubTask {
                task: *task,
                subtask: *subtask,
            },
            Self::Unsub { task, subtask } => Intent::DeleteSubTask {
                task: *task,
                subtask: *subtask,
            },
            Self::Members
            | Self::Invite(_)
            | Self::Manager(_)
            | Self::Kick(_)
            | Self::Say(_)
            | Self::Log
            | Self::Help
            | Self::Quit => return Ok(None),
        };
        Ok(Some(intent))
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    input
        .split_once(char::is_whitespace)
        .map_or((input, ""), |(word, rest)| (word, rest.trim_start()))
}

fn text(rest: &str, what: &'static str) -> Result<String, ParseError> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Err(ParseError::Missing(what));
    }
    Ok(rest.to_string())
}

fn id<'a, T: std::str::FromStr>(
    rest: &'a str,
    what: &'static str,
) -> Result<(T, &'a str), ParseError> {
    let (word, rest) = split_word(rest);
    if word.is_empty() {
        return Err(ParseError::Missing(what));
    }
    let value = word
        .trim_start_matches('#')
        .parse()
        .map_err(|_| ParseError::InvalidId(word.to_string()))?;
    Ok((value, rest))
}
