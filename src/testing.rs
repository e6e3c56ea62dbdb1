// Recording fake for every collaborator trait, shared by the unit tests.

use std::collections::HashMap;

use crate::narration::{AudioPlayer, ClipRequest, SpeechEngine, Utterance};
use crate::prefs::{MemoryStore, PreferenceStore};
use crate::stage::{
    Completion, Dom, ElementBox, Host, Renderer, SceneView, SpotlightView, Stage, StepView,
};
use crate::types::{Locator, Rect, SectionId, Size, Ticket};
use crate::voice::Voice;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    RenderScene(SceneView),
    Reveal(usize),
    Spotlight(SpotlightView),
    HideSpotlight,
    Step(StepView),
    Clear,
    Notice(String),
    Completion(Completion),
    HelpPanel(bool),
    Navigate(String, Ticket),
    PreAction(String, Ticket),
    PlayClip(String),
    PauseClip,
    ResumeClip,
    StopClip,
    ClipRate(f64),
    ClipVolume(f32),
    Speak(String),
    PauseSpeech,
    ResumeSpeech,
    CancelSpeech,
}

impl Call {
    fn is_narration(&self) -> bool {
        matches!(
            self,
            Call::PlayClip(_)
                | Call::PauseClip
                | Call::ResumeClip
                | Call::StopClip
                | Call::ClipRate(_)
                | Call::ClipVolume(_)
                | Call::Speak(_)
                | Call::PauseSpeech
                | Call::ResumeSpeech
                | Call::CancelSpeech
        )
    }
}

pub(crate) struct FakeStage {
    pub elements: HashMap<String, ElementBox>,
    pub viewport: Size,
    pub callout: Size,
    pub scrolled: Vec<String>,
    pub calls: Vec<Call>,
    pub speech_available: bool,
    pub voices: Vec<Voice>,
    /// Clip currently loaded on the audio element.
    pub clip: Option<ClipRequest>,
    /// Utterance currently being spoken.
    pub utterance: Option<Utterance>,
    pub prefs: MemoryStore,
}

impl FakeStage {
    pub fn new() -> Self {
        FakeStage {
            elements: HashMap::new(),
            viewport: Size::new(1280.0, 800.0),
            callout: Size::new(300.0, 120.0),
            scrolled: Vec::new(),
            calls: Vec::new(),
            speech_available: false,
            voices: Vec::new(),
            clip: None,
            utterance: None,
            prefs: MemoryStore::new(),
        }
    }

    pub fn with_element(mut self, locator: &str, rect: Rect) -> Self {
        self.elements.insert(locator.to_string(), ElementBox::visible(rect));
        self
    }

    pub fn with_speech(mut self) -> Self {
        self.speech_available = true;
        self.voices = vec![
            Voice::new("Alex", "en-US", true),
            Voice::new("Google US English", "en-US", false),
        ];
        self
    }

    pub fn narration_calls(&self) -> Vec<Call> {
        self.calls.iter().filter(|c| c.is_narration()).cloned().collect()
    }

    pub fn audio_active(&self) -> bool {
        self.clip.is_some() || self.utterance.is_some()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Navigate(section, _) => Some(section.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_navigation(&self) -> Option<Ticket> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::Navigate(_, ticket) => Some(*ticket),
            _ => None,
        })
    }

    pub fn last_pre_action(&self) -> Option<Ticket> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::PreAction(_, ticket) => Some(*ticket),
            _ => None,
        })
    }

    /// Scene indices rendered so far, in order.
    pub fn rendered_scenes(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::RenderScene(view) => Some(view.index),
                _ => None,
            })
            .collect()
    }

    pub fn steps(&self) -> Vec<StepView> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Step(view) => Some(view.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Dom for FakeStage {
    fn query(&self, locator: &Locator) -> Option<ElementBox> {
        self.elements.get(locator.as_str()).copied()
    }

    fn scroll_into_view(&mut self, locator: &Locator) {
        self.scrolled.push(locator.as_str().to_string());
    }

    fn viewport(&self) -> Size {
        self.viewport
    }

    fn callout_size(&self) -> Size {
        self.callout
    }
}

impl Renderer for FakeStage {
    fn render_scene(&mut self, view: &SceneView) {
        self.calls.push(Call::RenderScene(view.clone()));
    }

    fn reveal_text(&mut self, shown_chars: usize) {
        self.calls.push(Call::Reveal(shown_chars));
    }

    fn show_spotlight(&mut self, view: &SpotlightView) {
        self.calls.push(Call::Spotlight(view.clone()));
    }

    fn hide_spotlight(&mut self) {
        self.calls.push(Call::HideSpotlight);
    }

    fn show_step(&mut self, view: &StepView) {
        self.calls.push(Call::Step(view.clone()));
    }

    fn clear(&mut self) {
        self.calls.push(Call::Clear);
    }

    fn show_notice(&mut self, message: &str) {
        self.calls.push(Call::Notice(message.to_string()));
    }

    fn show_completion(&mut self, completion: &Completion) {
        self.calls.push(Call::Completion(completion.clone()));
    }

    fn set_help_panel(&mut self, open: bool) {
        self.calls.push(Call::HelpPanel(open));
    }
}

impl Host for FakeStage {
    fn navigate_to_section(&mut self, section: &SectionId, ticket: Ticket) {
        self.calls.push(Call::Navigate(section.as_str().to_string(), ticket));
    }

    fn run_pre_action(&mut self, action: &str, ticket: Ticket) {
        self.calls.push(Call::PreAction(action.to_string(), ticket));
    }
}

impl AudioPlayer for FakeStage {
    fn play(&mut self, clip: &ClipRequest) {
        self.calls.push(Call::PlayClip(clip.url.clone()));
        self.clip = Some(clip.clone());
    }

    fn pause(&mut self) {
        self.calls.push(Call::PauseClip);
    }

    fn resume(&mut self) {
        self.calls.push(Call::ResumeClip);
    }

    fn stop(&mut self) {
        self.calls.push(Call::StopClip);
        self.clip = None;
    }

    fn set_rate(&mut self, rate: f64) {
        self.calls.push(Call::ClipRate(rate));
        if let Some(clip) = self.clip.as_mut() {
            clip.rate = rate;
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.calls.push(Call::ClipVolume(volume));
        if let Some(clip) = self.clip.as_mut() {
            clip.volume = volume;
        }
    }
}

impl SpeechEngine for FakeStage {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, utterance: &Utterance) {
        self.calls.push(Call::Speak(utterance.text.clone()));
        self.utterance = Some(utterance.clone());
    }

    fn pause(&mut self) {
        self.calls.push(Call::PauseSpeech);
    }

    fn resume(&mut self) {
        self.calls.push(Call::ResumeSpeech);
    }

    fn cancel(&mut self) {
        self.calls.push(Call::CancelSpeech);
        self.utterance = None;
    }
}

impl PreferenceStore for FakeStage {
    fn get(&self, key: &str) -> Option<String> {
        self.prefs.get(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.prefs.set(key, value);
    }
}

impl Stage for FakeStage {
    fn dom(&mut self) -> &mut dyn Dom {
        self
    }

    fn renderer(&mut self) -> &mut dyn Renderer {
        self
    }

    fn host(&mut self) -> &mut dyn Host {
        self
    }

    fn audio(&mut self) -> &mut dyn AudioPlayer {
        self
    }

    fn speech(&mut self) -> Option<&mut dyn SpeechEngine> {
        if self.speech_available {
            Some(self)
        } else {
            None
        }
    }

    fn preferences(&mut self) -> &mut dyn PreferenceStore {
        self
    }
}
