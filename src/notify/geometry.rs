//! Screen geometry from `xrandr` / `xdpyinfo` output

use crate::shell::{CommandRunner, ShellError};
use thiserror::Error;

pub const XRANDR_COMMAND: &str = "xrandr --query";
pub const XDPYINFO_COMMAND: &str = "xdpyinfo";

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("no primary display line found")]
    NoPrimaryDisplay,
    #[error("no dimensions line found")]
    NoDimensions,
    #[error("malformed geometry `{0}`")]
    Malformed(String),
    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// A display rectangle in root-window coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
}

impl Geometry {
    /// Parse `WxH+X+Y` (offsets may be negative) or a bare `WxH`
    pub fn parse(token: &str) -> Result<Self, GeometryError> {
        let malformed = || GeometryError::Malformed(token.to_string());

        let (size, offsets) = match token.find(['+', '-']) {
            Some(pos) => token.split_at(pos),
            None => (token, ""),
        };

        let (width, height) = size.split_once('x').ok_or_else(malformed)?;
        let width = width.parse().map_err(|_| malformed())?;
        let height = height.parse().map_err(|_| malformed())?;

        let (x, y) = if offsets.is_empty() {
            (0, 0)
        } else {
            parse_offsets(offsets).ok_or_else(malformed)?
        };

        Ok(Self {
            width,
            height,
            x,
            y,
        })
    }
}

// "+1920+0", "-10+5"
fn parse_offsets(offsets: &str) -> Option<(i32, i32)> {
    let second = offsets[1..].find(['+', '-'])? + 1;
    let (x, y) = offsets.split_at(second);
    Some((x.parse().ok()?, y.parse().ok()?))
}

/// Find the primary output in `xrandr --query` output
///
/// `DP-1 connected primary 2560x1440+1920+0 (normal left ...) 597mm x 336mm`
pub fn primary_from_xrandr(output: &str) -> Result<Geometry, GeometryError> {
    let line = output
        .lines()
        .find(|line| line.contains(" connected primary"))
        .ok_or(GeometryError::NoPrimaryDisplay)?;

    // A primary output that is switched off has no geometry token
    let token = line
        .split_whitespace()
        .skip_while(|word| *word != "primary")
        .nth(1)
        .filter(|word| word.contains('x') && word.contains('+'))
        .ok_or(GeometryError::NoPrimaryDisplay)?;

    Geometry::parse(token)
}

/// Size of the whole X screen from `xdpyinfo`
///
/// `  dimensions:    3840x1080 pixels (1016x286 millimeters)`
pub fn screen_from_xdpyinfo(output: &str) -> Result<Geometry, GeometryError> {
    let token = output
        .lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("dimensions:"))
        .and_then(|rest| rest.split_whitespace().next())
        .ok_or(GeometryError::NoDimensions)?;

    Geometry::parse(token)
}

/// Primary display geometry, or the whole virtual screen when there is no primary
pub fn detect<R: CommandRunner>(runner: &R) -> Result<Geometry, GeometryError> {
    let xrandr = runner.run(XRANDR_COMMAND)?;
    if xrandr.success() {
        match primary_from_xrandr(&xrandr.stdout) {
            Ok(geometry) => return Ok(geometry),
            Err(e) => tracing::debug!(error = %e, "falling back to xdpyinfo"),
        }
    } else {
        tracing::debug!(
            exit_code = xrandr.exit_code,
            stderr = %xrandr.stderr.trim(),
            "xrandr failed, falling back to xdpyinfo"
        );
    }

    let xdpyinfo = runner.run(XDPYINFO_COMMAND)?;
    screen_from_xdpyinfo(&xdpyinfo.stdout)
}
