//! On-screen notifications
//!
//! The backend is picked from the config at startup and fixed for the life of
//! the process. Both variants render by running an external program through
//! the same [`CommandRunner`] the dispatcher uses.

mod geometry;
mod osd;

use crate::conf::{NotifyBackend, Settings};
use crate::shell::{self, CommandRunner, ShellError};
use thiserror::Error;

use geometry::GeometryError;
pub use osd::OsdNotifier;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error("`{command}` exited with {exit_code}: {}", .stderr.trim())]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
}

/// Forwards text to `dunstify` without any placement
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl DesktopNotifier {
    pub fn command_line(&self, text: &str) -> String {
        format!("dunstify -a mqtt-saver {}", shell::quote(text))
    }

    pub fn display_text<R: CommandRunner>(&self, runner: &R, text: &str) -> Result<(), NotifyError> {
        let command = self.command_line(text);
        let output = runner.run(&command)?;
        if !output.success() {
            return Err(NotifyError::CommandFailed {
                command,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum NotificationSink {
    Osd(OsdNotifier),
    Desktop(DesktopNotifier),
}

impl NotificationSink {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.notify {
            NotifyBackend::Osd => NotificationSink::Osd(OsdNotifier::new(&settings.osd)),
            NotifyBackend::Dunst => NotificationSink::Desktop(DesktopNotifier),
        }
    }

    pub fn name(&self) -> &'static str {
        self.backend().as_str()
    }

    pub fn backend(&self) -> NotifyBackend {
        match self {
            NotificationSink::Osd(_) => NotifyBackend::Osd,
            NotificationSink::Desktop(_) => NotifyBackend::Dunst,
        }
    }

    /// External programs this backend shells out to
    pub fn required_programs(&self) -> &'static [&'static str] {
        match self {
            NotificationSink::Osd(_) => &["xrandr", "xdpyinfo", "osd_cat"],
            NotificationSink::Desktop(_) => &["dunstify"],
        }
    }

    pub fn display_text<R: CommandRunner>(&self, runner: &R, text: &str) -> Result<(), NotifyError> {
        match self {
            NotificationSink::Osd(osd) => osd.display_text(runner, text),
            NotificationSink::Desktop(desktop) => desktop.display_text(runner, text),
        }
    }
}
