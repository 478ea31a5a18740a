//! Pipeline description model.
//!
//! A [`GraphDescription`] is an ordered sequence of typed stages, each
//! carrying named properties. It is produced by [`build`], printed as a
//! single launch line, and consumed by an engine; it is never mutated after
//! construction.

mod builder;

pub use builder::{build, build_with_rng};

use std::fmt;

/// Raw sample layout asserted between the converter and the payloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16-bit signed big-endian.
    S16Be,
    /// 24-bit signed big-endian.
    S24Be,
}

impl SampleFormat {
    /// Caps string for the format-caps stage.
    pub fn as_caps(self) -> &'static str {
        match self {
            Self::S16Be => "S16BE",
            Self::S24Be => "S24BE",
        }
    }

    /// Parse a caps string back into a format.
    pub fn from_caps(caps: &str) -> Option<Self> {
        match caps {
            "S16BE" => Some(Self::S16Be),
            "S24BE" => Some(Self::S24Be),
            _ => None,
        }
    }

    /// Bytes per sample on the wire.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::S16Be => 2,
            Self::S24Be => 3,
        }
    }
}

/// Processing stage types, in the only order a description may use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Test signal source.
    TestSource,
    /// Sample format conversion.
    AudioConvert,
    /// Raw-audio capability constraint (format, channels, rate).
    FormatCaps,
    /// RTP payloader for 16-bit linear PCM.
    RtpL16Pay,
    /// RTP payloader for 24-bit linear PCM.
    RtpL24Pay,
    /// RTP capability tag (clock rate, channels, payload type).
    RtpCaps,
    /// UDP network sink.
    UdpSink,
}

impl StageKind {
    /// Stage name as rendered in the launch line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestSource => "testsrc",
            Self::AudioConvert => "audioconvert",
            Self::FormatCaps => "format-caps",
            Self::RtpL16Pay => "rtpL16pay",
            Self::RtpL24Pay => "rtpL24pay",
            Self::RtpCaps => "rtp-caps",
            Self::UdpSink => "udpsink",
        }
    }
}

/// Typed stage property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl PropValue {
    /// Integer view; string values are parsed.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Non-negative integer view.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|v| u64::try_from(v).ok())
    }

    /// Numeric view; integer and string values are widened/parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Boolean view; string values are parsed.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String view, only for genuine string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// One stage of the description: a kind plus ordered named properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    kind: StageKind,
    props: Vec<(String, PropValue)>,
}

impl Stage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            props: Vec::new(),
        }
    }

    /// Append a property, preserving insertion order.
    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.push((name.to_string(), value.into()));
        self
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn props(&self) -> &[(String, PropValue)] {
        &self.props
    }

    /// Look up a property by name.
    pub fn prop(&self, name: &str) -> Option<&PropValue> {
        self.props
            .iter()
            .find(|(prop, _)| prop == name)
            .map(|(_, value)| value)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        for (name, value) in &self.props {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// Ordered stage sequence describing one transmit pipeline.
///
/// Owned by the controller for the duration of a run; there are no mutating
/// accessors, so a description cannot change after activation.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDescription {
    stages: Vec<Stage>,
}

impl GraphDescription {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// First stage of the given kind, if present.
    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.kind == kind)
    }
}

impl fmt::Display for GraphDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                write!(f, " ! ")?;
            }
            write!(f, "{stage}")?;
        }
        Ok(())
    }
}
