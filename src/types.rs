// Strong typing over strings. Newtypes for timestamps, identifiers, and pixel geometry.
// Engine configuration arrives from JS as JSON; every field has a default.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Host clock reading in milliseconds. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Offset by a fractional delay, rounded up so a deadline is never reported early.
    pub fn after(&self, delay_ms: f64) -> Timestamp {
        if delay_ms <= 0.0 {
            return *self;
        }
        Timestamp(self.0.saturating_add(delay_ms.ceil() as u64))
    }
}

/// Correlates an asynchronous host completion with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(u64);

impl Ticket {
    pub fn from_raw(raw: u64) -> Self {
        Ticket(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic ticket source. Tickets are never reused within one sequence.
#[derive(Debug, Default)]
pub struct TicketSeq {
    next: u64,
}

impl TicketSeq {
    pub fn new() -> Self {
        TicketSeq { next: 1 }
    }

    pub fn issue(&mut self) -> Ticket {
        let ticket = Ticket(self.next.max(1));
        self.next = ticket.0 + 1;
        ticket
    }
}

/// Identifier of a feature area in the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        SectionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structural DOM query identifying a scene or step target (e.g. `#review-panel .toolbar`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(query: impl Into<String>) -> Self {
        Locator(query.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key used to look up pre-generated narration audio.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SceneKey {
    pub section_id: SectionId,
    pub step_index: usize,
}

impl SceneKey {
    pub fn new(section_id: SectionId, step_index: usize) -> Self {
        SceneKey {
            section_id,
            step_index,
        }
    }
}

/// Viewport or element size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }
}

/// Axis-aligned rectangle in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Grow by `pad` on every side.
    pub fn inflate(&self, pad: f64) -> Rect {
        Rect::new(
            self.x - pad,
            self.y - pad,
            self.width + pad * 2.0,
            self.height + pad * 2.0,
        )
    }
}

/// Side of the target the callout prefers to sit on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Top => Side::Bottom,
            Side::Bottom => Side::Top,
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Engine configuration passed from JS.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub spotlight: SpotlightSettings,
    #[serde(default)]
    pub narration: NarrationSettings,
}

impl EngineConfig {
    /// Parse the host's configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }
}

/// Fixed delays and rates used by the scheduler and the tour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Pause after the host reports a section switch, before targets are resolved.
    #[serde(default = "default_navigation_settle_ms")]
    pub navigation_settle_ms: u64,
    /// Pause after scrolling a target into view, before it is measured.
    #[serde(default = "default_spotlight_settle_ms")]
    pub spotlight_settle_ms: u64,
    /// Pause after narration audio ends, before the next scene.
    #[serde(default = "default_narration_gap_ms")]
    pub narration_gap_ms: u64,
    /// Text reveal rate at speed 1.
    #[serde(default = "default_reveal_chars_per_sec")]
    pub reveal_chars_per_sec: f64,
    /// Longest wait for the host's section switch.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Longest wait for a sub-demo pre-action.
    #[serde(default = "default_pre_action_timeout_ms")]
    pub pre_action_timeout_ms: u64,
    /// Display time of the intertitle inserted between sections of the full tour.
    #[serde(default = "default_intertitle_ms")]
    pub intertitle_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        TimingSettings {
            navigation_settle_ms: default_navigation_settle_ms(),
            spotlight_settle_ms: default_spotlight_settle_ms(),
            narration_gap_ms: default_narration_gap_ms(),
            reveal_chars_per_sec: default_reveal_chars_per_sec(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            pre_action_timeout_ms: default_pre_action_timeout_ms(),
            intertitle_ms: default_intertitle_ms(),
        }
    }
}

fn default_navigation_settle_ms() -> u64 {
    500
}

fn default_spotlight_settle_ms() -> u64 {
    350
}

fn default_narration_gap_ms() -> u64 {
    600
}

fn default_reveal_chars_per_sec() -> f64 {
    30.0
}

fn default_navigation_timeout_ms() -> u64 {
    8_000
}

fn default_pre_action_timeout_ms() -> u64 {
    8_000
}

fn default_intertitle_ms() -> u64 {
    2_500
}

/// Cutout and callout geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotlightSettings {
    /// Space between the target and the cutout edge.
    #[serde(default = "default_padding")]
    pub padding: f64,
    /// Space between the cutout and the callout.
    #[serde(default = "default_margin")]
    pub margin: f64,
    /// Minimum distance between the callout and the viewport edge.
    #[serde(default = "default_inset")]
    pub inset: f64,
}

impl Default for SpotlightSettings {
    fn default() -> Self {
        SpotlightSettings {
            padding: default_padding(),
            margin: default_margin(),
            inset: default_inset(),
        }
    }
}

fn default_padding() -> f64 {
    8.0
}

fn default_margin() -> f64 {
    14.0
}

fn default_inset() -> f64 {
    12.0
}

/// Narration provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationSettings {
    /// Root that manifest file paths are resolved against.
    #[serde(default = "default_audio_root")]
    pub audio_root: String,
    /// Longest utterance handed to the speech engine in one piece.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// BCP 47 language used for voice matching and utterances.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        NarrationSettings {
            audio_root: default_audio_root(),
            max_chunk_chars: default_max_chunk_chars(),
            language: default_language(),
        }
    }
}

fn default_audio_root() -> String {
    "/static/guide-audio".to_string()
}

fn default_max_chunk_chars() -> usize {
    200
}

fn default_language() -> String {
    "en-US".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_after_rounds_up() {
        let ts = Timestamp::from_millis(1_000);
        assert_eq!(ts.after(2_000.0).as_millis(), 3_000);
        assert_eq!(ts.after(0.2).as_millis(), 1_001);
        assert_eq!(ts.after(-5.0), ts);
        assert_eq!(ts.millis_since(Timestamp::from_millis(4_000)), 0);
    }

    #[test]
    fn tickets_are_monotonic() {
        let mut seq = TicketSeq::new();
        let a = seq.issue();
        let b = seq.issue();
        assert!(b.as_raw() > a.as_raw());
        assert_ne!(a, b);
    }

    #[test]
    fn rect_inflate() {
        let r = Rect::new(10.0, 20.0, 100.0, 50.0).inflate(8.0);
        assert_eq!(r, Rect::new(2.0, 12.0, 116.0, 66.0));
        assert_eq!(r.right(), 118.0);
        assert_eq!(r.bottom(), 78.0);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"timing":{"narration_gap_ms":250}}"#).unwrap();
        assert_eq!(config.timing.narration_gap_ms, 250);
        assert_eq!(config.timing.navigation_settle_ms, 500);
        assert_eq!(config.spotlight.inset, 12.0);
        assert_eq!(config.narration.language, "en-US");
    }

    #[test]
    fn malformed_config_is_rejected() {
        let err = EngineConfig::from_json(r#"{"timing":{"narration_gap_ms":"soon"}}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
        assert!(err.to_string().starts_with("Invalid configuration:"));
        assert_eq!(EngineConfig::from_json("{}").unwrap().timing.intertitle_ms, 2500);
    }

    #[test]
    fn side_parses_lowercase() {
        let side: Side = serde_json::from_str(r#""left""#).unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(side.opposite(), Side::Right);
    }
}
