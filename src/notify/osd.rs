//! `osd_cat` overlay placement

use super::geometry::{self, Geometry};
use super::NotifyError;
use crate::conf::OsdSettings;
use crate::shell::{self, CommandRunner};

/// Average glyph width as a fraction of the pixel size
const GLYPH_WIDTH_RATIO: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct OsdNotifier {
    settings: OsdSettings,
}

impl OsdNotifier {
    pub fn new(settings: &OsdSettings) -> Self {
        Self {
            settings: settings.clone(),
        }
    }

    pub fn display_text<R: CommandRunner>(&self, runner: &R, text: &str) -> Result<(), NotifyError> {
        let screen = geometry::detect(runner)?;
        let (x, y) = self.position(&screen, text);
        tracing::debug!(?screen, x, y, "placing osd");

        let command = self.command_line(text, x, y);
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

    /// Top-left corner that roughly centres `text` on `screen`
    pub fn position(&self, screen: &Geometry, text: &str) -> (i32, i32) {
        let font_size = self.settings.font_size as f32;
        let text_width = text.chars().count() as f32 * font_size * GLYPH_WIDTH_RATIO;

        let left = ((screen.width as f32 - text_width) / 2.0).max(0.0);
        let top = ((screen.height as f32 - font_size) / 2.0).max(0.0);

        (
            screen.x.saturating_add(left.round() as i32),
            screen.y.saturating_add(top.round() as i32),
        )
    }

    fn font(&self) -> String {
        format!(
            "-*-{}-bold-r-*-*-{}-*-*-*-*-*-*-*",
            self.settings.font, self.settings.font_size
        )
    }

    pub fn command_line(&self, text: &str, x: i32, y: i32) -> String {
        format!(
            "printf '%s\\n' {} | osd_cat --pos=top --align=left --indent={} --offset={} --font={} --colour={} --delay={}",
            shell::quote(text),
            x,
            y,
            shell::quote(&self.font()),
            shell::quote(&self.settings.colour),
            self.settings.delay,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::geometry::{XDPYINFO_COMMAND, XRANDR_COMMAND};
    use crate::shell::testing::FakeRunner;

    fn notifier(font_size: u32) -> OsdNotifier {
        OsdNotifier::new(&OsdSettings {
            font_size,
            ..OsdSettings::default()
        })
    }

    const SCREEN: Geometry = Geometry {
        width: 1920,
        height: 1080,
        x: 0,
        y: 0,
    };

    #[test]
    fn test_position_centres_text() {
        // 10 chars * 20px * 0.6 = 120px wide
        let (x, y) = notifier(20).position(&SCREEN, "0123456789");
        assert_eq!(x, (1920 - 120) / 2);
        assert_eq!(y, (1080 - 20) / 2);
    }

    #[test]
    fn test_position_respects_display_offset() {
        let screen = Geometry {
            x: 1920,
            y: 100,
            ..SCREEN
        };
        let (x, y) = notifier(20).position(&screen, "0123456789");
        assert_eq!(x, 1920 + 900);
        assert_eq!(y, 100 + 530);
    }

    #[test]
    fn test_position_clamps_long_text() {
        let text = "x".repeat(500);
        let (x, _) = notifier(40).position(&SCREEN, &text);
        assert_eq!(x, 0);
    }

    #[test]
    fn test_position_saturates_at_extreme_offsets() {
        let screen = Geometry {
            x: i32::MAX - 10,
            y: i32::MAX,
            ..SCREEN
        };
        let (x, y) = notifier(20).position(&screen, "0123456789");
        assert_eq!((x, y), (i32::MAX, i32::MAX));
    }

    #[test]
    fn test_command_line_quotes_text() {
        let command = notifier(32).command_line("it's on", 10, 20);
        assert!(command.starts_with("printf '%s\\n' 'it'\\''s on' | osd_cat"));
        assert!(command.contains("--indent=10"));
        assert!(command.contains("--offset=20"));
        assert!(command.contains("--colour='green'"));
        assert!(command.contains("-32-"));
    }

    #[test]
    fn test_display_text_runs_osd_cat() {
        let runner = FakeRunner::new().respond(
            XRANDR_COMMAND,
            0,
            "DP-1 connected primary 1920x1080+0+0 (normal)\n",
            "",
        );

        notifier(32).display_text(&runner, "FIRE!").unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("osd_cat"));
        assert!(calls[1].contains("'FIRE!'"));
    }

    #[test]
    fn test_display_text_geometry_failure() {
        let runner = FakeRunner::new()
            .respond(XRANDR_COMMAND, 0, "", "")
            .respond(XDPYINFO_COMMAND, 0, "", "");

        let err = notifier(32).display_text(&runner, "FIRE!").unwrap_err();
        assert_eq!(err.to_string(), "no dimensions line found");
        assert!(runner.calls().iter().all(|c| !c.contains("osd_cat")));
    }

    #[test]
    fn test_display_text_osd_cat_failure() {
        let runner = FakeRunner::new()
            .respond(XRANDR_COMMAND, 0, "DP-1 connected primary 800x600+0+0\n", "")
            .respond("printf", 1, "", "cannot open display");

        let err = notifier(32).display_text(&runner, "hi").unwrap_err();
        match err {
            NotifyError::CommandFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "cannot open display");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
