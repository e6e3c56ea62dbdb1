// Narration provider chain: pre-generated clip -> speech synthesis -> silence.
// One session at a time. Starting a new one always stops the old one first, and every
// completion carries the ticket of the utterance or clip it belongs to, so late events
// from a stopped session fall on the floor.

use serde::{Deserialize, Serialize};

use crate::manifest::AudioManifest;
use crate::stage::Stage;
use crate::timing::Speed;
use crate::types::{NarrationSettings, SceneKey, Ticket, TicketSeq};
use crate::voice::{chunk_sentences, Voice, VoiceSelector};

/// Request to play a pre-generated clip on the shared audio element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    pub ticket: Ticket,
    pub url: String,
    pub rate: f64,
    pub volume: f32,
}

/// One chunk of synthesized speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub ticket: Ticket,
    pub text: String,
    pub voice: Option<String>,
    pub lang: String,
    pub rate: f64,
    pub volume: f32,
}

/// The host's single audio element.
pub trait AudioPlayer {
    fn play(&mut self, clip: &ClipRequest);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn set_rate(&mut self, rate: f64);
    fn set_volume(&mut self, volume: f32);
}

/// The platform speech engine.
pub trait SpeechEngine {
    fn voices(&self) -> Vec<Voice>;
    fn speak(&mut self, utterance: &Utterance);
    fn pause(&mut self);
    fn resume(&mut self);
    fn cancel(&mut self);
}

/// Which provider is voicing the current scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Silent,
    Audio,
    Speech,
}

/// Completion reported by the host for a clip or utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NarrationEvent {
    Ended,
    Failed(String),
}

/// Result of asking the chain to voice a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// A provider is playing; completion arrives as a [`NarrationEvent`].
    Pending,
    /// Narration disabled or every provider declined.
    Silent,
}

/// What a handled event means for the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationProgress {
    Continuing,
    Finished { produced_audio: bool },
}

/// Effect of a runtime speed change on the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedEffect {
    Unaffected,
    /// Clip playback rate rescaled in place.
    Retimed,
    /// In-flight utterance cancelled and not resumed.
    SpeechDropped,
}

/// Per-scene provider state.
#[derive(Debug, Default)]
pub enum NarrationSession {
    #[default]
    Silent,
    Audio {
        ticket: Ticket,
        text: String,
        paused: bool,
    },
    Speech {
        ticket: Ticket,
        chunks: Vec<String>,
        next: usize,
        voice: Option<String>,
        paused: bool,
    },
}

impl NarrationSession {
    pub fn tier(&self) -> Tier {
        match self {
            NarrationSession::Silent => Tier::Silent,
            NarrationSession::Audio { .. } => Tier::Audio,
            NarrationSession::Speech { .. } => Tier::Speech,
        }
    }

    fn ticket(&self) -> Option<Ticket> {
        match self {
            NarrationSession::Silent => None,
            NarrationSession::Audio { ticket, .. } | NarrationSession::Speech { ticket, .. } => {
                Some(*ticket)
            }
        }
    }
}

pub struct NarrationChain {
    settings: NarrationSettings,
    manifest: Option<AudioManifest>,
    selector: VoiceSelector,
    enabled: bool,
    volume: f32,
    session: NarrationSession,
    tickets: TicketSeq,
}

impl NarrationChain {
    pub fn new(settings: NarrationSettings) -> Self {
        let selector = VoiceSelector::new(None, &settings.language);
        NarrationChain {
            settings,
            manifest: None,
            selector,
            enabled: true,
            volume: 1.0,
            session: NarrationSession::Silent,
            tickets: TicketSeq::new(),
        }
    }

    /// Install the startup manifest. Absent or malformed manifests disable tier 1 only.
    pub fn load_manifest(&mut self, json: Option<&str>) {
        self.manifest = match json.map(AudioManifest::from_json) {
            Some(Ok(manifest)) => {
                tracing::info!(clips = manifest.clip_count(), "narration manifest loaded");
                Some(manifest)
            }
            Some(Err(err)) => {
                tracing::warn!(%err, "ignoring narration manifest");
                None
            }
            None => {
                tracing::debug!("no narration manifest; clips disabled");
                None
            }
        };
    }

    pub fn has_manifest(&self) -> bool {
        self.manifest.is_some()
    }

    pub fn tier(&self) -> Tier {
        self.session.tier()
    }

    pub fn is_active(&self) -> bool {
        self.session.tier() != Tier::Silent
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Turning narration off stops the active session. Returns true if one was stopped.
    pub fn set_enabled(&mut self, stage: &mut dyn Stage, enabled: bool) -> bool {
        self.enabled = enabled;
        if enabled || !self.is_active() {
            return false;
        }
        self.stop(stage);
        true
    }

    pub fn set_volume(&mut self, stage: &mut dyn Stage, volume: f32) {
        self.volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 1.0 };
        // Utterances take the new volume from the next chunk on.
        if let NarrationSession::Audio { .. } = self.session {
            stage.audio().set_volume(self.volume);
        }
    }

    pub fn set_preferred_voice(&mut self, name: Option<String>) {
        self.selector.set_preferred(name.filter(|n| !n.is_empty()));
    }

    /// Voice `text`, trying the manifest clip for `key` first.
    pub fn speak(
        &mut self,
        stage: &mut dyn Stage,
        text: &str,
        key: Option<&SceneKey>,
        speed: Speed,
    ) -> SpeakOutcome {
        self.stop(stage);
        if !self.enabled || text.trim().is_empty() {
            return SpeakOutcome::Silent;
        }

        let clip_url = match (key, self.manifest.as_ref()) {
            (Some(key), Some(manifest)) => manifest.clip_url(&self.settings.audio_root, key),
            _ => None,
        };
        if let Some(url) = clip_url {
            let ticket = self.tickets.issue();
            tracing::debug!(%ticket, %url, "narrating from clip");
            stage.audio().play(&ClipRequest {
                ticket,
                url,
                rate: speed.get(),
                volume: self.volume,
            });
            self.session = NarrationSession::Audio {
                ticket,
                text: text.to_string(),
                paused: false,
            };
            return SpeakOutcome::Pending;
        }

        self.start_speech(stage, text, speed)
    }

    fn start_speech(&mut self, stage: &mut dyn Stage, text: &str, speed: Speed) -> SpeakOutcome {
        let Some(engine) = stage.speech() else {
            tracing::debug!("no speech engine; narrating silently");
            return SpeakOutcome::Silent;
        };
        let voices = engine.voices();
        if voices.is_empty() {
            tracing::debug!("speech engine has no voices; narrating silently");
            return SpeakOutcome::Silent;
        }
        let chunks = chunk_sentences(text, self.settings.max_chunk_chars);
        if chunks.is_empty() {
            return SpeakOutcome::Silent;
        }
        let voice = self.selector.pick(&voices).map(|(voice, rule)| {
            tracing::debug!(voice = %voice.name, ?rule, "voice selected");
            voice.name.clone()
        });

        let ticket = self.tickets.issue();
        engine.speak(&Utterance {
            ticket,
            text: chunks[0].clone(),
            voice: voice.clone(),
            lang: self.settings.language.clone(),
            rate: speed.get(),
            volume: self.volume,
        });
        self.session = NarrationSession::Speech {
            ticket,
            chunks,
            next: 1,
            voice,
            paused: false,
        };
        SpeakOutcome::Pending
    }

    /// Apply a host completion. `None` means the ticket is stale and nothing changed.
    pub fn handle_event(
        &mut self,
        stage: &mut dyn Stage,
        ticket: Ticket,
        event: NarrationEvent,
        speed: Speed,
    ) -> Option<NarrationProgress> {
        if self.session.ticket() != Some(ticket) {
            tracing::debug!(%ticket, ?event, "stale narration event");
            return None;
        }

        let was_paused = matches!(
            self.session,
            NarrationSession::Audio { paused: true, .. } | NarrationSession::Speech { paused: true, .. }
        );
        let progress = self.advance_session(stage, ticket, event, speed);
        if was_paused && progress == Some(NarrationProgress::Continuing) {
            self.pause(stage);
        }
        progress
    }

    fn advance_session(
        &mut self,
        stage: &mut dyn Stage,
        ticket: Ticket,
        event: NarrationEvent,
        speed: Speed,
    ) -> Option<NarrationProgress> {
        match std::mem::take(&mut self.session) {
            NarrationSession::Silent => None,
            NarrationSession::Audio { text, .. } => match event {
                NarrationEvent::Ended => Some(NarrationProgress::Finished {
                    produced_audio: true,
                }),
                NarrationEvent::Failed(reason) => {
                    tracing::warn!(%ticket, %reason, "narration clip failed; trying speech");
                    stage.audio().stop();
                    match self.start_speech(stage, &text, speed) {
                        SpeakOutcome::Pending => Some(NarrationProgress::Continuing),
                        SpeakOutcome::Silent => Some(NarrationProgress::Finished {
                            produced_audio: false,
                        }),
                    }
                }
            },
            NarrationSession::Speech {
                chunks,
                next,
                voice,
                ..
            } => {
                if let NarrationEvent::Failed(reason) = &event {
                    tracing::warn!(%ticket, %reason, chunk = next - 1, "utterance failed; skipping");
                }
                if next >= chunks.len() {
                    return Some(NarrationProgress::Finished {
                        produced_audio: true,
                    });
                }
                let Some(engine) = stage.speech() else {
                    return Some(NarrationProgress::Finished {
                        produced_audio: true,
                    });
                };
                let ticket = self.tickets.issue();
                engine.speak(&Utterance {
                    ticket,
                    text: chunks[next].clone(),
                    voice: voice.clone(),
                    lang: self.settings.language.clone(),
                    rate: speed.get(),
                    volume: self.volume,
                });
                self.session = NarrationSession::Speech {
                    ticket,
                    chunks,
                    next: next + 1,
                    voice,
                    paused: false,
                };
                Some(NarrationProgress::Continuing)
            }
        }
    }

    pub fn pause(&mut self, stage: &mut dyn Stage) {
        match &mut self.session {
            NarrationSession::Silent => {}
            NarrationSession::Audio { paused, .. } => {
                if !*paused {
                    stage.audio().pause();
                    *paused = true;
                }
            }
            NarrationSession::Speech { paused, .. } => {
                if !*paused {
                    if let Some(engine) = stage.speech() {
                        engine.pause();
                    }
                    *paused = true;
                }
            }
        }
    }

    pub fn resume(&mut self, stage: &mut dyn Stage) {
        match &mut self.session {
            NarrationSession::Silent => {}
            NarrationSession::Audio { paused, .. } => {
                if *paused {
                    stage.audio().resume();
                    *paused = false;
                }
            }
            NarrationSession::Speech { paused, .. } => {
                if *paused {
                    if let Some(engine) = stage.speech() {
                        engine.resume();
                    }
                    *paused = false;
                }
            }
        }
    }

    pub fn stop(&mut self, stage: &mut dyn Stage) {
        match std::mem::take(&mut self.session) {
            NarrationSession::Silent => {}
            NarrationSession::Audio { .. } => stage.audio().stop(),
            NarrationSession::Speech { .. } => {
                if let Some(engine) = stage.speech() {
                    engine.cancel();
                }
            }
        }
    }

    /// Engines forbid retiming an in-flight utterance, so speech is dropped rather than
    /// restarted; the scene timers carry on without it.
    pub fn set_speed(&mut self, stage: &mut dyn Stage, speed: Speed) -> SpeedEffect {
        match self.session {
            NarrationSession::Silent => SpeedEffect::Unaffected,
            NarrationSession::Audio { .. } => {
                stage.audio().set_rate(speed.get());
                SpeedEffect::Retimed
            }
            NarrationSession::Speech { .. } => {
                tracing::debug!("speed changed mid-utterance; dropping speech");
                self.stop(stage);
                SpeedEffect::SpeechDropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeStage};
    use crate::types::SectionId;

    const MANIFEST: &str = r#"{"sections":{"sectionA":{"steps":[{"file":"a/0.mp3"}]}}}"#;

    fn key(section: &str, index: usize) -> SceneKey {
        SceneKey::new(SectionId::new(section), index)
    }

    fn chain(manifest: Option<&str>) -> NarrationChain {
        let mut chain = NarrationChain::new(NarrationSettings::default());
        chain.load_manifest(manifest);
        chain
    }

    #[test]
    fn clip_plays_and_resolves_true() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some(MANIFEST));
        let outcome = chain.speak(&mut stage, "Hello there.", Some(&key("sectionA", 0)), Speed::normal());
        assert_eq!(outcome, SpeakOutcome::Pending);
        assert_eq!(chain.tier(), Tier::Audio);
        let clip = stage.clip.clone().unwrap();
        assert_eq!(clip.url, "/static/guide-audio/a/0.mp3");

        let progress = chain.handle_event(&mut stage, clip.ticket, NarrationEvent::Ended, Speed::normal());
        assert_eq!(progress, Some(NarrationProgress::Finished { produced_audio: true }));
        assert!(!chain.is_active());
    }

    #[test]
    fn clip_failure_falls_through_to_speech_for_same_text() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some(MANIFEST));
        chain.speak(&mut stage, "Hello there.", Some(&key("sectionA", 0)), Speed::normal());
        let clip = stage.clip.clone().unwrap();

        let progress = chain.handle_event(
            &mut stage,
            clip.ticket,
            NarrationEvent::Failed("decode error".to_string()),
            Speed::normal(),
        );
        assert_eq!(progress, Some(NarrationProgress::Continuing));
        assert_eq!(chain.tier(), Tier::Speech);
        assert_eq!(stage.utterance.as_ref().unwrap().text, "Hello there.");
    }

    #[test]
    fn fallback_order_never_skips_an_available_tier() {
        for (manifest, speech, expected) in [
            (true, true, Tier::Audio),
            (true, false, Tier::Audio),
            (false, true, Tier::Speech),
            (false, false, Tier::Silent),
        ] {
            let mut stage = FakeStage::new();
            if speech {
                stage = stage.with_speech();
            }
            let mut chain = chain(manifest.then_some(MANIFEST));
            chain.speak(&mut stage, "Text.", Some(&key("sectionA", 0)), Speed::normal());
            assert_eq!(chain.tier(), expected, "manifest={manifest} speech={speech}");
        }
    }

    #[test]
    fn unknown_key_skips_to_speech() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some(MANIFEST));
        chain.speak(&mut stage, "Text.", Some(&key("sectionA", 5)), Speed::normal());
        assert_eq!(chain.tier(), Tier::Speech);
        assert!(stage.clip.is_none());
    }

    #[test]
    fn speech_without_voices_is_silent() {
        let mut stage = FakeStage::new().with_speech();
        stage.voices.clear();
        let mut chain = chain(None);
        assert_eq!(chain.speak(&mut stage, "Text.", None, Speed::normal()), SpeakOutcome::Silent);
    }

    #[test]
    fn disabled_or_empty_narration_is_silent() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some(MANIFEST));
        assert_eq!(chain.speak(&mut stage, "   ", Some(&key("sectionA", 0)), Speed::normal()), SpeakOutcome::Silent);
        chain.set_enabled(&mut stage, false);
        assert_eq!(chain.speak(&mut stage, "Words.", Some(&key("sectionA", 0)), Speed::normal()), SpeakOutcome::Silent);
        assert!(stage.calls.is_empty());
    }

    #[test]
    fn speech_chunks_are_spoken_in_order_and_errors_skip() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(None);
        chain.speak(&mut stage, "One. Two. Three.", None, Speed::new(1.5));
        assert_eq!(stage.utterance.as_ref().unwrap().rate, 1.5);

        let first = stage.utterance.clone().unwrap().ticket;
        assert_eq!(
            chain.handle_event(&mut stage, first, NarrationEvent::Ended, Speed::normal()),
            Some(NarrationProgress::Continuing)
        );
        let second = stage.utterance.clone().unwrap();
        assert_eq!(second.text, "Two.");
        assert_eq!(
            chain.handle_event(&mut stage, second.ticket, NarrationEvent::Failed("synthesis-failed".into()), Speed::normal()),
            Some(NarrationProgress::Continuing)
        );
        let third = stage.utterance.clone().unwrap();
        assert_eq!(third.text, "Three.");
        assert_eq!(
            chain.handle_event(&mut stage, third.ticket, NarrationEvent::Ended, Speed::normal()),
            Some(NarrationProgress::Finished { produced_audio: true })
        );
        // Replaying an old ticket does nothing.
        assert_eq!(chain.handle_event(&mut stage, first, NarrationEvent::Ended, Speed::normal()), None);
    }

    #[test]
    fn pause_resume_stop_route_to_active_tier() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some(MANIFEST));
        chain.speak(&mut stage, "Clip.", Some(&key("sectionA", 0)), Speed::normal());
        chain.pause(&mut stage);
        chain.pause(&mut stage);
        chain.resume(&mut stage);
        chain.stop(&mut stage);
        assert_eq!(
            stage.narration_calls(),
            vec![Call::PlayClip("/static/guide-audio/a/0.mp3".into()), Call::PauseClip, Call::ResumeClip, Call::StopClip]
        );

        stage.calls.clear();
        chain.speak(&mut stage, "Speech.", None, Speed::normal());
        chain.pause(&mut stage);
        chain.resume(&mut stage);
        chain.stop(&mut stage);
        assert_eq!(
            stage.narration_calls(),
            vec![Call::Speak("Speech.".into()), Call::PauseSpeech, Call::ResumeSpeech, Call::CancelSpeech]
        );
        assert!(!stage.audio_active());
    }

    #[test]
    fn speed_change_retimes_clip_but_drops_speech() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some(MANIFEST));
        chain.speak(&mut stage, "Clip.", Some(&key("sectionA", 0)), Speed::normal());
        assert_eq!(chain.set_speed(&mut stage, Speed::new(2.0)), SpeedEffect::Retimed);
        assert_eq!(stage.clip.as_ref().unwrap().rate, 2.0);

        chain.speak(&mut stage, "Speech.", None, Speed::normal());
        let ticket = stage.utterance.clone().unwrap().ticket;
        assert_eq!(chain.set_speed(&mut stage, Speed::new(2.0)), SpeedEffect::SpeechDropped);
        assert!(stage.utterance.is_none());
        assert_eq!(chain.handle_event(&mut stage, ticket, NarrationEvent::Ended, Speed::normal()), None);
    }

    #[test]
    fn volume_applies_to_active_clip_and_clamps() {
        let mut stage = FakeStage::new();
        let mut chain = chain(Some(MANIFEST));
        chain.speak(&mut stage, "Clip.", Some(&key("sectionA", 0)), Speed::normal());
        chain.set_volume(&mut stage, 3.0);
        assert_eq!(chain.volume(), 1.0);
        chain.set_volume(&mut stage, 0.25);
        assert_eq!(stage.clip.as_ref().unwrap().volume, 0.25);
    }

    #[test]
    fn malformed_manifest_disables_clips_only() {
        let mut stage = FakeStage::new().with_speech();
        let mut chain = chain(Some("not json"));
        assert!(!chain.has_manifest());
        chain.speak(&mut stage, "Still spoken.", Some(&key("sectionA", 0)), Speed::normal());
        assert_eq!(chain.tier(), Tier::Speech);
    }
}
