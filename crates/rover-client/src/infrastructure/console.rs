//! Line-oriented console commands for the binary.
//!
//! Each stdin line is one command:
//!
//! | Line            | Effect                                        |
//! |-----------------|-----------------------------------------------|
//! | `press <key>`   | key down through the key bindings             |
//! | `release <key>` | key up                                        |
//! | `tap <key>`     | key down immediately followed by key up       |
//! | `speed <0..1>`  | set the wheel speed                           |
//! | `select <n>`    | bind the n-th offered rover (0-based)         |
//! | `list`          | print the offered rovers                      |
//! | `state`         | print the controller status                   |
//! | `quit`          | close the links and exit                      |

use std::fmt::Write as _;

use thiserror::Error;

use crate::application::controller::RoverController;
use crate::application::handshake::SessionError;
use crate::application::held_inputs::InputSource;
use crate::application::motion_intent::MotionError;

/// Error type for console input.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (try press, release, tap, speed, select, list, state, quit)")]
    UnknownCommand(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid argument '{value}' for '{command}'")]
    InvalidArgument {
        command: &'static str,
        value: String,
    },

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// One parsed console line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Press(char),
    Release(char),
    Tap(char),
    Speed(f64),
    Select(isize),
    List,
    State,
    Quit,
}

/// What the runtime should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleReply {
    /// Keep running; print the text if there is any.
    Continue(Option<String>),
    Quit,
}

impl ConsoleCommand {
    /// Parses one line.  Blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConsoleError`] describing what is wrong with the line.
    pub fn parse(line: &str) -> Result<Option<Self>, ConsoleError> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next();
        let command = match verb.to_ascii_lowercase().as_str() {
            "press" => ConsoleCommand::Press(key_arg("press", arg)?),
            "release" => ConsoleCommand::Release(key_arg("release", arg)?),
            "tap" => ConsoleCommand::Tap(key_arg("tap", arg)?),
            "speed" => ConsoleCommand::Speed(number_arg("speed", arg)?),
            "select" => ConsoleCommand::Select(number_arg("select", arg)?),
            "list" => ConsoleCommand::List,
            "state" => ConsoleCommand::State,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Runs the command against `controller`.
    ///
    /// # Errors
    ///
    /// Propagates the controller's refusal.
    pub fn apply(self, controller: &mut RoverController) -> Result<ConsoleReply, ConsoleError> {
        let source = InputSource::Keyboard;
        match self {
            ConsoleCommand::Press(key) => {
                controller.press_key(source, key)?;
            }
            ConsoleCommand::Release(key) => {
                controller.release_key(source, key)?;
            }
            ConsoleCommand::Tap(key) => {
                controller.press_key(source, key)?;
                controller.release_key(source, key)?;
            }
            ConsoleCommand::Speed(value) => {
                controller.set_speed(value)?;
            }
            ConsoleCommand::Select(index) => {
                controller.select_rover(index)?;
            }
            ConsoleCommand::List => return Ok(ConsoleReply::Continue(Some(rover_list(controller)))),
            ConsoleCommand::State => {
                return Ok(ConsoleReply::Continue(Some(controller.status().to_string())))
            }
            ConsoleCommand::Quit => return Ok(ConsoleReply::Quit),
        }
        Ok(ConsoleReply::Continue(None))
    }
}

fn key_arg(command: &'static str, arg: Option<&str>) -> Result<char, ConsoleError> {
    let arg = arg.ok_or(ConsoleError::MissingArgument(command))?;
    let mut chars = arg.chars();
    match (chars.next(), chars.next()) {
        (Some(key), None) => Ok(key),
        _ => Err(ConsoleError::InvalidArgument {
            command,
            value: arg.to_string(),
        }),
    }
}

fn number_arg<T: std::str::FromStr>(command: &'static str, arg: Option<&str>) -> Result<T, ConsoleError> {
    let arg = arg.ok_or(ConsoleError::MissingArgument(command))?;
    arg.parse().map_err(|_| ConsoleError::InvalidArgument {
        command,
        value: arg.to_string(),
    })
}

fn rover_list(controller: &RoverController) -> String {
    let rovers = controller.session().rovers();
    if rovers.is_empty() {
        return "no rovers offered".to_string();
    }
    let mut out = String::new();
    for (index, rover) in rovers.iter().enumerate() {
        let _ = write!(out, "{index}: {}", rover.display_name());
        if !rover.description.is_empty() {
            let _ = write!(out, " ({})", rover.description);
        }
        if rover.has_gimbal() {
            out.push_str(" [gimbal]");
        }
        out.push('\n');
    }
    out.pop();
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
