//! Interactive commands read from stdin.

use std::io::BufRead;

use crossbeam_channel::{unbounded, Receiver};
use tracing::debug;

/// Seconds moved by the `f` and `b` commands.
pub const SEEK_STEP_SECS: f64 = 10.0;

/// Volume change of the `+` and `-` commands.
pub const VOLUME_STEP: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Pause when playing, play otherwise.
    TogglePause,
    Next,
    Stop,
    Quit,
    VolumeUp,
    VolumeDown,
    ToggleMute,
    /// Jump to an absolute position in seconds.
    Seek(f64),
    /// Move by a number of seconds from the current position.
    SeekBy(f64),
}

impl Command {
    /// Parse one input line. Unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next()? {
            "p" | "pause" | "play" => Self::TogglePause,
            "n" | "next" => Self::Next,
            "s" | "stop" => Self::Stop,
            "q" | "quit" => Self::Quit,
            "+" => Self::VolumeUp,
            "-" => Self::VolumeDown,
            "m" | "mute" => Self::ToggleMute,
            "f" => Self::SeekBy(SEEK_STEP_SECS),
            "b" => Self::SeekBy(-SEEK_STEP_SECS),
            "seek" => Self::Seek(words.next()?.parse().ok()?),
            other => Self::Seek(other.parse().ok()?),
        };
        Some(command)
    }
}

/// Read commands from stdin on a background thread.
///
/// The channel disconnects when stdin closes.
pub fn spawn_stdin_reader() -> std::io::Result<Receiver<Command>> {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name("cadence-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("Unknown command: {line}"),
                }
            }
            debug!("stdin closed");
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("p"), Some(Command::TogglePause));
        assert_eq!(Command::parse("  next "), Some(Command::Next));
        assert_eq!(Command::parse("q"), Some(Command::Quit));
        assert_eq!(Command::parse("b"), Some(Command::SeekBy(-SEEK_STEP_SECS)));
        assert_eq!(Command::parse("seek 42.5"), Some(Command::Seek(42.5)));
        assert_eq!(Command::parse("90"), Some(Command::Seek(90.0)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("seek"), None);
        assert_eq!(Command::parse("seek later"), None);
        assert_eq!(Command::parse("dance"), None);
    }
}
