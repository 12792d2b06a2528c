use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialise(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level `blurview.toml`. Every section is optional.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ViewConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub blur: BlurSection,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub gpu: GpuSection,
    #[serde(default)]
    pub source: SourceSection,
}

/// Blur extent in pixels, measured against `reference`.
///
/// The renderer divides by the reference resolution once, so the blur keeps
/// its texture-space size on any other surface size.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BlurSection {
    #[serde(default = "default_radius", deserialize_with = "deserialize_radius")]
    pub radius: [f32; 2],
    #[serde(default = "default_reference")]
    pub reference: [u32; 2],
    #[serde(default)]
    pub flip_vertical: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SurfaceSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_title")]
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GpuSection {
    #[serde(default, deserialize_with = "deserialize_power")]
    pub power: PowerSetting,
    #[serde(default)]
    pub frame_format: FrameFormatSetting,
}

/// Demo frame source standing in for a decoder.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    #[serde(default = "default_fps")]
    pub fps: f32,
    #[serde(default)]
    pub pattern: PatternKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(
        default,
        deserialize_with = "deserialize_duration_opt",
        serialize_with = "serialize_duration_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub run_for: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    #[default]
    Low,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormatSetting {
    #[default]
    Rgba8,
    Rgba32f,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Gradient,
    Checker,
    Bars,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternKind::Gradient => "gradient",
            PatternKind::Checker => "checker",
            PatternKind::Bars => "bars",
        })
    }
}

impl std::str::FromStr for PatternKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gradient" => Ok(PatternKind::Gradient),
            "checker" | "checkerboard" => Ok(PatternKind::Checker),
            "bars" | "colorbars" => Ok(PatternKind::Bars),
            other => Err(format!("unknown pattern '{other}'")),
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_radius() -> [f32; 2] {
    [30.0, 30.0]
}

fn default_reference() -> [u32; 2] {
    [2160, 3840]
}

fn default_width() -> u32 {
    720
}

fn default_height() -> u32 {
    1280
}

fn default_title() -> String {
    "blurview".into()
}

fn default_fps() -> f32 {
    30.0
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            blur: BlurSection::default(),
            surface: SurfaceSection::default(),
            gpu: GpuSection::default(),
            source: SourceSection::default(),
        }
    }
}

impl Default for BlurSection {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            reference: default_reference(),
            flip_vertical: false,
        }
    }
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            pattern: PatternKind::default(),
            image: None,
            run_for: None,
        }
    }
}

/// Accepts `radius = 30` or `radius = [30, 45]`.
fn deserialize_radius<'de, D>(deserializer: D) -> Result<[f32; 2], D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Uniform(f32),
        Axes([f32; 2]),
    }

    Ok(match Helper::deserialize(deserializer)? {
        Helper::Uniform(value) => [value, value],
        Helper::Axes(axes) => axes,
    })
}

fn deserialize_power<'de, D>(deserializer: D) -> Result<PowerSetting, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" | "integrated" => Ok(PowerSetting::Low),
        "high" | "high-performance" | "discrete" => Ok(PowerSetting::High),
        other => Err(de::Error::custom(format!("invalid gpu power setting '{other}'"))),
    }
}

fn deserialize_duration_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map(Some)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs(v as u64)))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(Duration::from_secs(v)))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Some(Duration::from_secs_f64(v)))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration_opt<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(duration) => serializer.serialize_str(&humantime::format_duration(*duration).to_string()),
        None => serializer.serialize_none(),
    }
}

impl ViewConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Interval between demo frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.source.fps)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        for (axis, value) in ["x", "y"].iter().zip(self.blur.radius) {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "blur.radius {axis} must be a non-negative number of pixels"
                )));
            }
        }

        if self.blur.reference.contains(&0) {
            return Err(ConfigError::Invalid(
                "blur.reference must be a non-zero resolution".into(),
            ));
        }

        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "surface size {}x{} must be non-zero",
                self.surface.width, self.surface.height
            )));
        }

        if !self.source.fps.is_finite() || self.source.fps <= 0.0 || self.source.fps > 240.0 {
            return Err(ConfigError::Invalid(format!(
                "source.fps must be within (0, 240], got {}",
                self.source.fps
            )));
        }

        if let Some(image) = &self.source.image {
            if image.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "source.image may not be empty".into(),
                ));
            }
        }

        if let Some(run_for) = self.source.run_for {
            if run_for.is_zero() {
                return Err(ConfigError::Invalid(
                    "source.run_for must be greater than zero".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1

[blur]
radius = [24, 48]
reference = [1080, 1920]
flip_vertical = true

[surface]
width = 540
height = 960

[gpu]
power = "high-performance"
frame_format = "rgba32f"

[source]
fps = 24
pattern = "checker"
run_for = "1m 30s"
"#;

    #[test]
    fn parses_sample_config() {
        let config = ViewConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.blur.radius, [24.0, 48.0]);
        assert_eq!(config.blur.reference, [1080, 1920]);
        assert!(config.blur.flip_vertical);
        assert_eq!(config.surface.width, 540);
        assert_eq!(config.surface.title, "blurview");
        assert_eq!(config.gpu.power, PowerSetting::High);
        assert_eq!(config.gpu.frame_format, FrameFormatSetting::Rgba32f);
        assert_eq!(config.source.pattern, PatternKind::Checker);
        assert_eq!(config.source.run_for, Some(Duration::from_secs(90)));
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config = ViewConfig::from_toml_str("").unwrap();
        assert_eq!(config, ViewConfig::default());
        assert_eq!(config.blur.radius, [30.0, 30.0]);
        assert_eq!(config.blur.reference, [2160, 3840]);
        assert_eq!(config.frame_interval(), Duration::from_secs_f32(1.0 / 30.0));
    }

    #[test]
    fn scalar_radius_applies_to_both_axes() {
        let config = ViewConfig::from_toml_str("[blur]\nradius = 12.5\n").unwrap();
        assert_eq!(config.blur.radius, [12.5, 12.5]);
    }

    #[test]
    fn rejects_negative_radius() {
        let err = ViewConfig::from_toml_str("[blur]\nradius = -1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_surface() {
        let err = ViewConfig::from_toml_str("[surface]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unknown_frame_format() {
        let err = ViewConfig::from_toml_str("[gpu]\nframe_format = \"yuv420\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = ViewConfig::from_toml_str("[blur]\nsigma = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = ViewConfig::from_toml_str("version = 2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_out_of_range_fps() {
        let err = ViewConfig::from_toml_str("[source]\nfps = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn serialised_config_parses_back() {
        let config = ViewConfig::from_toml_str(SAMPLE).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("run_for = \"1m 30s\""));
        assert_eq!(ViewConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ViewConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blurview.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ViewConfig::load(&path).unwrap();
        assert_eq!(config.source.fps, 24.0);
    }

    #[test]
    fn pattern_names_parse() {
        assert_eq!("Checkerboard".parse::<PatternKind>(), Ok(PatternKind::Checker));
        assert!("plasma".parse::<PatternKind>().is_err());
    }
}
