// guide_engine: guided tours and narrated feature demos for a host web app.
// All decisions live here; JS is plumbing. The engine owns no timers and never touches
// the DOM directly. It is driven by explicit `now` readings and talks to the page
// through the traits in `stage`.

mod bindings;
mod cleanup;
mod composer;
mod content;
mod controller;
mod error;
mod manifest;
mod narration;
mod prefs;
mod scheduler;
mod spotlight;
mod stage;
mod target;
mod timing;
mod tour;
mod types;
mod voice;

#[cfg(test)]
mod testing;

use wasm_bindgen::prelude::*;

pub use bindings::{JsStage, WasmGuide};
pub use cleanup::{CleanupFn, CleanupRegistry};
pub use composer::{ComposedDemo, DemoComposer, DemoRequest};
pub use content::{Catalog, Scene, Section, SubDemo, TourStep};
pub use controller::{CancelOutcome, GuideController};
pub use error::EngineError;
pub use manifest::AudioManifest;
pub use narration::{
    AudioPlayer, ClipRequest, NarrationChain, NarrationEvent, NarrationProgress, NarrationSession,
    SpeakOutcome, SpeechEngine, SpeedEffect, Tier, Utterance,
};
pub use prefs::{MemoryStore, PreferenceStore, Preferences};
pub use scheduler::{PlaybackContext, PlaybackState, RunOutcome, Scheduler, StartOutcome};
pub use spotlight::{PendingSpotlight, Placement, SpotlightLayout};
pub use stage::{
    Completion, Dom, ElementBox, Host, Renderer, SceneView, SpotlightView, Stage, StepView,
};
pub use target::{resolve, Resolution};
pub use timing::{Countdown, Speed, TextReveal, WorkClock};
pub use tour::TourPlayer;
pub use types::*;
pub use voice::{chunk_sentences, Voice, VoiceRule, VoiceSelector};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStage;

    const CATALOG: &str = r##"{
        "sections": [
            { "id": "review", "title": "Review",
              "scenes": [ { "duration_ms": 1000, "narration": "Your queue." } ] }
        ]
    }"##;

    #[test]
    fn empty_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.timing.navigation_settle_ms, 500);
        assert_eq!(config.narration.max_chunk_chars, 200);
    }

    #[test]
    fn controller_plays_a_catalog_end_to_end() {
        let mut stage = FakeStage::new();
        let mut guide = GuideController::new(
            EngineConfig::default(),
            Catalog::from_json(CATALOG).unwrap(),
            &mut stage,
        );
        guide.load_manifest(None);
        let request = DemoRequest::Section {
            section_id: "review".into(),
        };
        let start = Timestamp::from_millis(1_000);
        assert_eq!(guide.start_demo(&mut stage, &request, start).unwrap(), StartOutcome::Started);

        let mut now = start;
        while let Some(deadline) = guide.next_deadline(now) {
            now = deadline;
            guide.tick(&mut stage, now);
        }
        assert_eq!(now, Timestamp::from_millis(2_000));
        assert_eq!(guide.scheduler().last_outcome(), Some(RunOutcome::Completed));
    }
}
