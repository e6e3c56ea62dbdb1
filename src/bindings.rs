// JS surface. The page passes one host object implementing the stage; the engine
// calls it synchronously and the page reports async completions back by ticket.
// All structured data crosses as JSON strings.

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::composer::DemoRequest;
use crate::content::Catalog;
use crate::controller::GuideController;
use crate::error::EngineError;
use crate::narration::{AudioPlayer, ClipRequest, NarrationEvent, SpeechEngine, Utterance};
use crate::prefs::PreferenceStore;
use crate::scheduler::StartOutcome;
use crate::stage::{
    Completion, Dom, ElementBox, Host, Renderer, SceneView, SpotlightView, Stage, StepView,
};
use crate::types::{EngineConfig, Locator, SectionId, Size, Ticket, Timestamp};
use crate::voice::Voice;

#[wasm_bindgen]
extern "C" {
    /// Host object implementing the page side of the engine.
    pub type JsStage;

    #[wasm_bindgen(method, js_name = queryTarget)]
    fn js_query_target(this: &JsStage, locator: &str) -> Option<String>;
    #[wasm_bindgen(method, js_name = scrollIntoView)]
    fn js_scroll_into_view(this: &JsStage, locator: &str);
    #[wasm_bindgen(method, js_name = viewportWidth)]
    fn js_viewport_width(this: &JsStage) -> f64;
    #[wasm_bindgen(method, js_name = viewportHeight)]
    fn js_viewport_height(this: &JsStage) -> f64;
    #[wasm_bindgen(method, js_name = calloutWidth)]
    fn js_callout_width(this: &JsStage) -> f64;
    #[wasm_bindgen(method, js_name = calloutHeight)]
    fn js_callout_height(this: &JsStage) -> f64;

    #[wasm_bindgen(method, js_name = renderScene)]
    fn js_render_scene(this: &JsStage, view_json: &str);
    #[wasm_bindgen(method, js_name = revealText)]
    fn js_reveal_text(this: &JsStage, shown_chars: u32);
    #[wasm_bindgen(method, js_name = showSpotlight)]
    fn js_show_spotlight(this: &JsStage, view_json: &str);
    #[wasm_bindgen(method, js_name = hideSpotlight)]
    fn js_hide_spotlight(this: &JsStage);
    #[wasm_bindgen(method, js_name = showStep)]
    fn js_show_step(this: &JsStage, view_json: &str);
    #[wasm_bindgen(method, js_name = clear)]
    fn js_clear(this: &JsStage);
    #[wasm_bindgen(method, js_name = showNotice)]
    fn js_show_notice(this: &JsStage, message: &str);
    #[wasm_bindgen(method, js_name = showCompletion)]
    fn js_show_completion(this: &JsStage, completion_json: &str);
    #[wasm_bindgen(method, js_name = setHelpPanel)]
    fn js_set_help_panel(this: &JsStage, open: bool);

    #[wasm_bindgen(method, js_name = navigateToSection)]
    fn js_navigate_to_section(this: &JsStage, section_id: &str, ticket: f64);
    #[wasm_bindgen(method, js_name = runPreAction)]
    fn js_run_pre_action(this: &JsStage, action: &str, ticket: f64);

    #[wasm_bindgen(method, js_name = playClip)]
    fn js_play_clip(this: &JsStage, clip_json: &str);
    #[wasm_bindgen(method, js_name = pauseClip)]
    fn js_pause_clip(this: &JsStage);
    #[wasm_bindgen(method, js_name = resumeClip)]
    fn js_resume_clip(this: &JsStage);
    #[wasm_bindgen(method, js_name = stopClip)]
    fn js_stop_clip(this: &JsStage);
    #[wasm_bindgen(method, js_name = setClipRate)]
    fn js_set_clip_rate(this: &JsStage, rate: f64);
    #[wasm_bindgen(method, js_name = setClipVolume)]
    fn js_set_clip_volume(this: &JsStage, volume: f32);

    #[wasm_bindgen(method, js_name = hasSpeech)]
    fn js_has_speech(this: &JsStage) -> bool;
    #[wasm_bindgen(method, js_name = voices)]
    fn js_voices(this: &JsStage) -> String;
    #[wasm_bindgen(method, js_name = speak)]
    fn js_speak(this: &JsStage, utterance_json: &str);
    #[wasm_bindgen(method, js_name = pauseSpeech)]
    fn js_pause_speech(this: &JsStage);
    #[wasm_bindgen(method, js_name = resumeSpeech)]
    fn js_resume_speech(this: &JsStage);
    #[wasm_bindgen(method, js_name = cancelSpeech)]
    fn js_cancel_speech(this: &JsStage);

    #[wasm_bindgen(method, js_name = getPreference)]
    fn js_get_preference(this: &JsStage, key: &str) -> Option<String>;
    #[wasm_bindgen(method, js_name = setPreference)]
    fn js_set_preference(this: &JsStage, key: &str, value: &str);
}

fn encode<T: Serialize>(what: &str, value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(json) => Some(json),
        Err(err) => {
            tracing::warn!(what, %err, "could not encode payload for host");
            None
        }
    }
}

fn ticket_to_js(ticket: Ticket) -> f64 {
    ticket.as_raw() as f64
}

/// Tickets are small positive integers; anything else matches nothing.
fn ticket_from_js(raw: f64) -> Ticket {
    if raw.is_finite() && raw >= 1.0 {
        Ticket::from_raw(raw as u64)
    } else {
        Ticket::from_raw(0)
    }
}

fn now() -> Timestamp {
    Timestamp::from_millis(js_sys::Date::now().max(0.0) as u64)
}

fn to_js(err: EngineError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn completion_result(error: Option<String>) -> Result<(), String> {
    match error {
        Some(reason) => Err(reason),
        None => Ok(()),
    }
}

impl Dom for JsStage {
    fn query(&self, locator: &Locator) -> Option<ElementBox> {
        let json = self.js_query_target(locator.as_str())?;
        match serde_json::from_str(&json) {
            Ok(element) => Some(element),
            Err(err) => {
                tracing::warn!(%locator, %err, "unreadable element box from host");
                None
            }
        }
    }

    fn scroll_into_view(&mut self, locator: &Locator) {
        self.js_scroll_into_view(locator.as_str());
    }

    fn viewport(&self) -> Size {
        Size::new(self.js_viewport_width(), self.js_viewport_height())
    }

    fn callout_size(&self) -> Size {
        Size::new(self.js_callout_width(), self.js_callout_height())
    }
}

impl Renderer for JsStage {
    fn render_scene(&mut self, view: &SceneView) {
        if let Some(json) = encode("scene", view) {
            self.js_render_scene(&json);
        }
    }

    fn reveal_text(&mut self, shown_chars: usize) {
        self.js_reveal_text(u32::try_from(shown_chars).unwrap_or(u32::MAX));
    }

    fn show_spotlight(&mut self, view: &SpotlightView) {
        if let Some(json) = encode("spotlight", view) {
            self.js_show_spotlight(&json);
        }
    }

    fn hide_spotlight(&mut self) {
        self.js_hide_spotlight();
    }

    fn show_step(&mut self, view: &StepView) {
        if let Some(json) = encode("step", view) {
            self.js_show_step(&json);
        }
    }

    fn clear(&mut self) {
        self.js_clear();
    }

    fn show_notice(&mut self, message: &str) {
        self.js_show_notice(message);
    }

    fn show_completion(&mut self, completion: &Completion) {
        if let Some(json) = encode("completion", completion) {
            self.js_show_completion(&json);
        }
    }

    fn set_help_panel(&mut self, open: bool) {
        self.js_set_help_panel(open);
    }
}

impl Host for JsStage {
    fn navigate_to_section(&mut self, section: &SectionId, ticket: Ticket) {
        self.js_navigate_to_section(section.as_str(), ticket_to_js(ticket));
    }

    fn run_pre_action(&mut self, action: &str, ticket: Ticket) {
        self.js_run_pre_action(action, ticket_to_js(ticket));
    }
}

impl AudioPlayer for JsStage {
    fn play(&mut self, clip: &ClipRequest) {
        if let Some(json) = encode("clip", clip) {
            self.js_play_clip(&json);
        }
    }

    fn pause(&mut self) {
        self.js_pause_clip();
    }

    fn resume(&mut self) {
        self.js_resume_clip();
    }

    fn stop(&mut self) {
        self.js_stop_clip();
    }

    fn set_rate(&mut self, rate: f64) {
        self.js_set_clip_rate(rate);
    }

    fn set_volume(&mut self, volume: f32) {
        self.js_set_clip_volume(volume);
    }
}

impl SpeechEngine for JsStage {
    fn voices(&self) -> Vec<Voice> {
        serde_json::from_str(&self.js_voices()).unwrap_or_else(|err| {
            tracing::warn!(%err, "unreadable voice list from host");
            Vec::new()
        })
    }

    fn speak(&mut self, utterance: &Utterance) {
        if let Some(json) = encode("utterance", utterance) {
            self.js_speak(&json);
        }
    }

    fn pause(&mut self) {
        self.js_pause_speech();
    }

    fn resume(&mut self) {
        self.js_resume_speech();
    }

    fn cancel(&mut self) {
        self.js_cancel_speech();
    }
}

impl PreferenceStore for JsStage {
    fn get(&self, key: &str) -> Option<String> {
        self.js_get_preference(key)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.js_set_preference(key, value);
    }
}

impl Stage for JsStage {
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
        if self.js_has_speech() {
            Some(self)
        } else {
            None
        }
    }

    fn preferences(&mut self) -> &mut dyn PreferenceStore {
        self
    }
}

/// Guided help engine exposed to JavaScript.
///
/// The page calls `tick()` whenever the deadline it last returned has passed;
/// `tick` and every control method return the next deadline (epoch ms) or
/// `undefined` when nothing is pending.
#[wasm_bindgen]
pub struct WasmGuide {
    controller: GuideController,
    stage: JsStage,
}

#[wasm_bindgen]
impl WasmGuide {
    /// Create the engine.
    ///
    /// # Arguments
    /// * `config_json` - EngineConfig JSON; `"{}"` uses every default
    /// * `catalog_json` - Catalog JSON with the authored sections
    /// * `stage` - Host object implementing the JsStage methods
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str, catalog_json: &str, stage: JsStage) -> Result<WasmGuide, JsValue> {
        let config = EngineConfig::from_json(config_json).map_err(to_js)?;
        let catalog = Catalog::from_json(catalog_json).map_err(to_js)?;
        let mut stage = stage;
        let controller = GuideController::new(config, catalog, &mut stage);
        Ok(WasmGuide { controller, stage })
    }

    /// Install the pre-generated audio manifest, or pass nothing if it failed to load.
    #[wasm_bindgen(js_name = loadManifest)]
    pub fn load_manifest(&mut self, manifest_json: Option<String>) {
        self.controller.load_manifest(manifest_json.as_deref());
    }

    /// Play a section overview, or one of its sub-demos.
    /// Returns false when a demo was already playing.
    #[wasm_bindgen(js_name = startDemo)]
    pub fn start_demo(&mut self, section_id: &str, sub_demo_id: Option<String>) -> Result<bool, JsValue> {
        let request = match sub_demo_id {
            Some(sub_demo_id) => DemoRequest::SubDemo {
                section_id: section_id.to_string(),
                sub_demo_id,
            },
            None => DemoRequest::Section {
                section_id: section_id.to_string(),
            },
        };
        self.start(&request)
    }

    #[wasm_bindgen(js_name = startFullTour)]
    pub fn start_full_tour(&mut self) -> Result<bool, JsValue> {
        self.start(&DemoRequest::FullTour)
    }

    /// Start the manual tour of a section.
    #[wasm_bindgen(js_name = startTour)]
    pub fn start_tour(&mut self, section_id: &str) -> Result<bool, JsValue> {
        self.controller
            .start_tour(&mut self.stage, section_id, now())
            .map_err(to_js)
    }

    pub fn next(&mut self) -> bool {
        self.controller.next(&mut self.stage, now())
    }

    pub fn previous(&mut self) -> bool {
        self.controller.previous(&mut self.stage, now())
    }

    pub fn pause(&mut self) -> bool {
        self.controller.pause(&mut self.stage, now())
    }

    pub fn resume(&mut self) -> bool {
        self.controller.resume(&mut self.stage, now())
    }

    pub fn stop(&mut self) -> bool {
        self.controller.stop(&mut self.stage)
    }

    #[wasm_bindgen(js_name = skipTour)]
    pub fn skip_tour(&mut self) {
        self.controller.skip_tour(&mut self.stage);
    }

    /// Returns the speed actually applied after clamping.
    #[wasm_bindgen(js_name = setSpeed)]
    pub fn set_speed(&mut self, multiplier: f64) -> f64 {
        self.controller.set_speed(&mut self.stage, multiplier, now()).get()
    }

    /// Fire due work and return the next deadline.
    pub fn tick(&mut self) -> Option<f64> {
        let now = now();
        self.controller.tick(&mut self.stage, now);
        self.deadline_after(now)
    }

    #[wasm_bindgen(js_name = nextDeadline)]
    pub fn next_deadline(&self) -> Option<f64> {
        self.deadline_after(now())
    }

    /// Report a finished section switch. Pass an error message if it failed.
    #[wasm_bindgen(js_name = navigationComplete)]
    pub fn navigation_complete(&mut self, ticket: f64, error: Option<String>) {
        self.controller
            .navigation_complete(ticket_from_js(ticket), completion_result(error), now());
    }

    /// Report a finished pre-action, with an optional function that undoes it.
    #[wasm_bindgen(js_name = preActionComplete)]
    pub fn pre_action_complete(&mut self, ticket: f64, error: Option<String>, cleanup: Option<js_sys::Function>) {
        let cleanup = cleanup.map(|function| -> Box<dyn FnOnce()> {
            Box::new(move || {
                if let Err(err) = function.call0(&JsValue::NULL) {
                    tracing::warn!(?err, "host cleanup threw");
                }
            })
        });
        self.controller.pre_action_complete(
            &mut self.stage,
            ticket_from_js(ticket),
            completion_result(error),
            cleanup,
            now(),
        );
    }

    #[wasm_bindgen(js_name = narrationEnded)]
    pub fn narration_ended(&mut self, ticket: f64) {
        self.controller
            .narration_event(&mut self.stage, ticket_from_js(ticket), NarrationEvent::Ended, now());
    }

    #[wasm_bindgen(js_name = narrationFailed)]
    pub fn narration_failed(&mut self, ticket: f64, reason: String) {
        self.controller.narration_event(
            &mut self.stage,
            ticket_from_js(ticket),
            NarrationEvent::Failed(reason),
            now(),
        );
    }

    /// The global cancel key. Returns what it did as a JSON string.
    #[wasm_bindgen(js_name = cancelKey)]
    pub fn cancel_key(&mut self) -> Result<String, JsValue> {
        let outcome = self.controller.cancel(&mut self.stage);
        serde_json::to_string(&outcome).map_err(|e| to_js(EngineError::from(e)))
    }

    #[wasm_bindgen(js_name = openHelp)]
    pub fn open_help(&mut self) -> Result<(), JsValue> {
        self.controller.open_help(&mut self.stage).map_err(to_js)
    }

    #[wasm_bindgen(js_name = closeHelp)]
    pub fn close_help(&mut self) -> bool {
        self.controller.close_help(&mut self.stage)
    }

    /// Current playback state as a JSON string.
    pub fn state(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.controller.state()).map_err(|e| to_js(EngineError::from(e)))
    }

    #[wasm_bindgen(js_name = setEnabled)]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.controller.set_enabled(&mut self.stage, enabled);
    }

    #[wasm_bindgen(js_name = setNarrationEnabled)]
    pub fn set_narration_enabled(&mut self, enabled: bool) {
        self.controller
            .set_narration_enabled(&mut self.stage, enabled, now());
    }

    #[wasm_bindgen(js_name = setVolume)]
    pub fn set_volume(&mut self, volume: f32) {
        self.controller.set_volume(&mut self.stage, volume);
    }

    #[wasm_bindgen(js_name = setPreferredVoice)]
    pub fn set_preferred_voice(&mut self, name: Option<String>) {
        self.controller.set_preferred_voice(&mut self.stage, name);
    }

    /// Voices the speech engine offers, as JSON, for a settings picker.
    pub fn voices(&mut self) -> Result<String, JsValue> {
        let voices = self
            .stage
            .speech()
            .map(|engine| engine.voices())
            .unwrap_or_default();
        serde_json::to_string(&voices).map_err(|e| to_js(EngineError::from(e)))
    }
}

impl WasmGuide {
    fn start(&mut self, request: &DemoRequest) -> Result<bool, JsValue> {
        let outcome = self
            .controller
            .start_demo(&mut self.stage, request, now())
            .map_err(to_js)?;
        Ok(outcome == StartOutcome::Started)
    }

    fn deadline_after(&self, now: Timestamp) -> Option<f64> {
        self.controller
            .next_deadline(now)
            .map(|deadline| deadline.as_millis() as f64)
    }
}
