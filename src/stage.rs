// Collaborator seams. The engine decides; the host page measures, draws, and navigates.
// Everything crossing these traits is plain data so the JS side stays plumbing.

use serde::{Deserialize, Serialize};

use crate::narration::{AudioPlayer, SpeechEngine};
use crate::prefs::PreferenceStore;
use crate::types::{Locator, Rect, SectionId, Side, Size, Ticket};

/// Live measurement of a queried element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElementBox {
    pub rect: Rect,
    /// Still attached to the document.
    #[serde(default = "default_connected")]
    pub connected: bool,
    /// Hidden by `display: none`, `visibility: hidden` or similar.
    #[serde(default)]
    pub hidden: bool,
}

fn default_connected() -> bool {
    true
}

impl ElementBox {
    pub fn visible(rect: Rect) -> Self {
        ElementBox {
            rect,
            connected: true,
            hidden: false,
        }
    }
}

/// Synchronous layout queries against the host document.
pub trait Dom {
    fn query(&self, locator: &Locator) -> Option<ElementBox>;
    fn scroll_into_view(&mut self, locator: &Locator);
    fn viewport(&self) -> Size;
    /// Natural size of the callout box with its current content.
    fn callout_size(&self) -> Size;
}

/// Narration bar content for one demo scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneView {
    pub index: usize,
    pub total: usize,
    pub breadcrumb: String,
    pub narration: String,
}

/// Dimmed overlay with a cutout, plus the callout position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotlightView {
    pub cutout: Rect,
    pub callout: Rect,
    pub side: Side,
    /// Demo mode keeps the narration bar and hides the callout.
    pub show_callout: bool,
}

/// Callout content for one tour step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub description: String,
    pub callout: Rect,
    pub cutout: Option<Rect>,
    pub side: Option<Side>,
}

/// Shown when a demo plays to the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub title: String,
    pub scenes_played: usize,
}

/// Visual output.
pub trait Renderer {
    fn render_scene(&mut self, view: &SceneView);
    /// Narration text shown so far, in characters.
    fn reveal_text(&mut self, shown_chars: usize);
    fn show_spotlight(&mut self, view: &SpotlightView);
    fn hide_spotlight(&mut self);
    fn show_step(&mut self, view: &StepView);
    /// Remove the narration bar and any step callout.
    fn clear(&mut self);
    fn show_notice(&mut self, message: &str);
    fn show_completion(&mut self, completion: &Completion);
    fn set_help_panel(&mut self, open: bool);
}

/// Host application hooks. Both report back through the controller with the same ticket.
pub trait Host {
    fn navigate_to_section(&mut self, section: &SectionId, ticket: Ticket);
    fn run_pre_action(&mut self, action: &str, ticket: Ticket);
}

/// Everything the engine talks to, handed in on each call.
pub trait Stage {
    fn dom(&mut self) -> &mut dyn Dom;
    fn renderer(&mut self) -> &mut dyn Renderer;
    fn host(&mut self) -> &mut dyn Host;
    fn audio(&mut self) -> &mut dyn AudioPlayer;
    /// `None` when the platform has no speech synthesis.
    fn speech(&mut self) -> Option<&mut dyn SpeechEngine>;
    fn preferences(&mut self) -> &mut dyn PreferenceStore;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_box_defaults_to_connected() {
        let el: ElementBox =
            serde_json::from_str(r#"{"rect":{"x":1,"y":2,"width":3,"height":4}}"#).unwrap();
        assert!(el.connected);
        assert!(!el.hidden);
    }
}
