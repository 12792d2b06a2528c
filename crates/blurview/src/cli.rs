use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use viewconfig::{FrameFormatSetting, PatternKind, PowerSetting};

#[derive(Parser, Debug)]
#[command(
    name = "blurview",
    author,
    version,
    about = "Blurred video frame preview",
    arg_required_else_help = false
)]
pub struct Args {
    /// Configuration file; defaults to `blurview.toml` in the config directory.
    #[arg(long, value_name = "PATH", env = "BLURVIEW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration and exit without opening a window.
    #[arg(long)]
    pub check_config: bool,

    /// Blur radius in pixels at the reference resolution (`30` or `30x45`).
    #[arg(long, value_name = "PX", value_parser = parse_radius)]
    pub radius: Option<[f32; 2]>,

    /// Flip frames vertically before blurring; `--flip=false` turns it off.
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub flip: Option<bool>,

    /// Initial window size (e.g. `720x1280`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Rate at which the demo source produces frames.
    #[arg(long, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Generated pattern: `gradient`, `checker`, or `bars`.
    #[arg(long, value_name = "PATTERN")]
    pub pattern: Option<PatternKind>,

    /// Still image to loop instead of a generated pattern.
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Frame layout handed to the renderer: `rgba8` or `rgba32f`.
    #[arg(long, value_name = "FORMAT", value_parser = parse_frame_format)]
    pub frame_format: Option<FrameFormatSetting>,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_gpu_power)]
    pub gpu_power: Option<PowerSetting>,

    /// Exit after the given duration (e.g. `10s`, `2m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub run_for: Option<Duration>,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| "expected WxH format, e.g. 720x1280".to_string())?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| "invalid width in size specification".to_string())?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| "invalid height in size specification".to_string())?;

    if width == 0 || height == 0 {
        return Err("surface dimensions must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_radius(value: &str) -> Result<[f32; 2], String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("blur radius must not be empty".to_string());
    }

    let parse_axis = |raw: &str| -> Result<f32, String> {
        let parsed: f32 = raw
            .trim()
            .parse()
            .map_err(|_| format!("invalid blur radius '{raw}'"))?;
        if !parsed.is_finite() || parsed < 0.0 {
            return Err("blur radius must be a non-negative number of pixels".to_string());
        }
        Ok(parsed)
    };

    match trimmed.split_once(['x', 'X', ',']) {
        Some((x, y)) => Ok([parse_axis(x)?, parse_axis(y)?]),
        None => {
            let both = parse_axis(trimmed)?;
            Ok([both, both])
        }
    }
}

pub fn parse_frame_format(value: &str) -> Result<FrameFormatSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "rgba8" | "rgba" => Ok(FrameFormatSetting::Rgba8),
        "rgba32f" | "rgba32float" | "float" => Ok(FrameFormatSetting::Rgba32f),
        "" => Err("frame format must not be empty".to_string()),
        other => Err(format!(
            "unknown frame format '{other}'; expected 'rgba8' or 'rgba32f'"
        )),
    }
}

pub fn parse_gpu_power(value: &str) -> Result<PowerSetting, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(PowerSetting::Low),
        "high" | "high-performance" | "discrete" => Ok(PowerSetting::High),
        "" => Err("gpu power preference must not be empty".to_string()),
        other => Err(format!(
            "unknown gpu power preference '{other}'; expected 'low' or 'high'"
        )),
    }
}

pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let duration = humantime::parse_duration(value.trim()).map_err(|err| err.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}
