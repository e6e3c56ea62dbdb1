// Scene scheduler: plays a composed scene list as Preparing -> Navigating -> Presenting
// -> (Paused) -> Advancing -> ... -> Complete.
//
// The scheduler owns no real timers. Every wait is a Countdown inside the current
// phase; the host reads next_deadline() and calls tick(now) when it passes. Replacing
// the phase or dropping the PlaybackContext therefore cancels every wait at once.
// Asynchronous host completions carry the Ticket they were issued with and are
// dropped when it no longer matches.

use serde::{Deserialize, Serialize};

use crate::cleanup::{CleanupFn, CleanupRegistry};
use crate::composer::ComposedDemo;
use crate::content::Scene;
use crate::error::EngineError;
use crate::narration::{NarrationChain, NarrationEvent, NarrationProgress, SpeakOutcome, SpeedEffect};
use crate::spotlight::{PendingSpotlight, SpotlightLayout};
use crate::stage::{Completion, SceneView, SpotlightView, Stage};
use crate::target::{resolve, Resolution};
use crate::timing::{Countdown, Speed, TextReveal, WorkClock};
use crate::types::{EngineConfig, SectionId, Side, Ticket, TicketSeq, Timestamp, TimingSettings};

/// Externally visible playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    Idle,
    /// Awaiting a sub-demo pre-action.
    Preparing,
    /// Awaiting the host's section switch or its settle delay.
    Navigating,
    Presenting,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A demo is already playing; the request was ignored.
    AlreadyPlaying,
}

/// How the last run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    Stopped,
}

/// What ends a presenting scene.
#[derive(Debug)]
enum Wait {
    /// Narration is playing; the next event decides.
    Narration,
    Timer(Countdown),
}

#[derive(Debug)]
struct SceneRun {
    /// Speed-1 progress since the scene started presenting.
    clock: WorkClock,
    reveal: TextReveal,
    spotlight: Option<PendingSpotlight>,
    wait: Wait,
}

impl SceneRun {
    fn pause(&mut self, now: Timestamp) {
        self.clock.pause(now);
        self.reveal.pause(now);
        if let Some(pending) = self.spotlight.as_mut() {
            pending.pause(now);
        }
        if let Wait::Timer(countdown) = &mut self.wait {
            countdown.pause(now);
        }
    }

    fn resume(&mut self, now: Timestamp) {
        self.clock.resume(now);
        self.reveal.resume(now);
        if let Some(pending) = self.spotlight.as_mut() {
            pending.resume(now);
        }
        if let Wait::Timer(countdown) = &mut self.wait {
            countdown.resume(now);
        }
    }

    fn deadline(&self, now: Timestamp) -> Option<Timestamp> {
        let wait = match &self.wait {
            Wait::Timer(countdown) => countdown.deadline(now),
            Wait::Narration => None,
        };
        [
            self.spotlight.as_ref().and_then(|p| p.deadline(now)),
            self.reveal.deadline(now),
            wait,
        ]
        .into_iter()
        .flatten()
        .min()
    }
}

#[derive(Debug)]
enum Phase {
    /// Between scenes; never observable outside a scheduler call.
    Advancing,
    Preparing {
        ticket: Ticket,
        timeout: Countdown,
    },
    Navigating {
        ticket: Ticket,
        section: SectionId,
        timeout: Countdown,
    },
    Settling {
        settle: Countdown,
    },
    Presenting(SceneRun),
}

impl Phase {
    fn pause(&mut self, now: Timestamp) {
        match self {
            Phase::Advancing => {}
            Phase::Preparing { timeout, .. } | Phase::Navigating { timeout, .. } => timeout.pause(now),
            Phase::Settling { settle } => settle.pause(now),
            Phase::Presenting(run) => run.pause(now),
        }
    }

    fn resume(&mut self, now: Timestamp) {
        match self {
            Phase::Advancing => {}
            Phase::Preparing { timeout, .. } | Phase::Navigating { timeout, .. } => timeout.resume(now),
            Phase::Settling { settle } => settle.resume(now),
            Phase::Presenting(run) => run.resume(now),
        }
    }
}

/// Run-time state of one demo. Dropping it drops every pending wait.
#[derive(Debug)]
pub struct PlaybackContext {
    title: String,
    scenes: Vec<Scene>,
    current_index: usize,
    is_paused: bool,
    speed: Speed,
    phase: Phase,
    active_section: Option<SectionId>,
    pre_action: Option<(Ticket, String)>,
    cleanups: CleanupRegistry,
}

impl PlaybackContext {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.scenes.get(self.current_index)
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    fn set_phase(&mut self, mut phase: Phase, now: Timestamp) {
        if self.is_paused {
            phase.pause(now);
        }
        self.phase = phase;
    }

    fn settle_after_navigation(&mut self, section: SectionId, settle_ms: u64, now: Timestamp) {
        self.active_section = Some(section);
        self.set_phase(
            Phase::Settling {
                settle: Countdown::fixed(settle_ms, now),
            },
            now,
        );
    }

    /// Swap a narration wait for a countdown.
    fn wait_on_timer(&mut self, produced_audio: bool, gap_ms: u64, now: Timestamp) {
        let duration_ms = self.scenes[self.current_index].duration_ms;
        let speed = self.speed;
        let paused = self.is_paused;
        if let Phase::Presenting(run) = &mut self.phase {
            let mut countdown = if produced_audio {
                Countdown::fixed(gap_ms, now)
            } else {
                // Silent scenes run for their duration counted from scene start.
                Countdown::with_progress(duration_ms, run.clock.work(now), speed, now)
            };
            if paused {
                countdown.pause(now);
            }
            run.wait = Wait::Timer(countdown);
        }
    }
}

pub struct Scheduler {
    timing: TimingSettings,
    layout: SpotlightLayout,
    narration: NarrationChain,
    context: Option<PlaybackContext>,
    tickets: TicketSeq,
    speed: Speed,
    last_outcome: Option<RunOutcome>,
}

impl Scheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Scheduler {
            timing: config.timing.clone(),
            layout: SpotlightLayout::new(config.spotlight.clone()),
            narration: NarrationChain::new(config.narration.clone()),
            context: None,
            tickets: TicketSeq::new(),
            speed: Speed::normal(),
            last_outcome: None,
        }
    }

    pub fn narration(&self) -> &NarrationChain {
        &self.narration
    }

    pub fn narration_mut(&mut self) -> &mut NarrationChain {
        &mut self.narration
    }

    pub fn context(&self) -> Option<&PlaybackContext> {
        self.context.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.context.is_some()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.context.as_ref().map(|ctx| ctx.current_index)
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn last_outcome(&self) -> Option<RunOutcome> {
        self.last_outcome
    }

    pub fn state(&self) -> PlaybackState {
        let Some(ctx) = &self.context else {
            return PlaybackState::Idle;
        };
        if ctx.is_paused {
            return PlaybackState::Paused;
        }
        match ctx.phase {
            Phase::Preparing { .. } => PlaybackState::Preparing,
            Phase::Navigating { .. } | Phase::Settling { .. } => PlaybackState::Navigating,
            Phase::Presenting(_) | Phase::Advancing => PlaybackState::Presenting,
        }
    }

    pub fn start(
        &mut self,
        stage: &mut dyn Stage,
        demo: ComposedDemo,
        now: Timestamp,
    ) -> Result<StartOutcome, EngineError> {
        if self.context.is_some() {
            tracing::debug!(title = %demo.title, "start ignored; a demo is already playing");
            return Ok(StartOutcome::AlreadyPlaying);
        }
        if demo.scenes.is_empty() {
            return Err(EngineError::EmptyContent(demo.title));
        }

        tracing::info!(title = %demo.title, scenes = demo.scenes.len(), speed = self.speed.get(), "demo started");
        self.last_outcome = None;
        self.context = Some(PlaybackContext {
            title: demo.title,
            scenes: demo.scenes,
            current_index: 0,
            is_paused: false,
            speed: self.speed,
            phase: Phase::Advancing,
            active_section: None,
            pre_action: None,
            cleanups: CleanupRegistry::new(),
        });

        match demo.pre_action {
            Some(action) => {
                let ticket = self.tickets.issue();
                if let Some(ctx) = self.context.as_mut() {
                    ctx.pre_action = Some((ticket, action.clone()));
                    ctx.set_phase(
                        Phase::Preparing {
                            ticket,
                            timeout: Countdown::fixed(self.timing.pre_action_timeout_ms, now),
                        },
                        now,
                    );
                }
                tracing::debug!(%action, %ticket, "awaiting pre-action");
                stage.host().run_pre_action(&action, ticket);
            }
            None => self.enter_scene(stage, 0, now),
        }
        Ok(StartOutcome::Started)
    }

    /// The host finished (or failed) a section switch.
    pub fn navigation_complete(
        &mut self,
        ticket: Ticket,
        result: Result<(), String>,
        now: Timestamp,
    ) {
        let settle_ms = self.timing.navigation_settle_ms;
        let Some(ctx) = self.context.as_mut() else {
            tracing::debug!(%ticket, "navigation completed with no active demo");
            return;
        };
        let section = match &ctx.phase {
            Phase::Navigating { ticket: expected, section, .. } if *expected == ticket => section.clone(),
            _ => {
                tracing::debug!(%ticket, "stale navigation completion");
                return;
            }
        };
        if let Err(reason) = result {
            tracing::warn!(%section, %reason, "section switch failed; continuing");
        }
        ctx.settle_after_navigation(section, settle_ms, now);
    }

    /// The host finished (or failed) a sub-demo pre-action. `cleanup` reverses whatever
    /// it changed and runs when the demo ends, or right away if it already has.
    pub fn pre_action_complete(
        &mut self,
        stage: &mut dyn Stage,
        ticket: Ticket,
        result: Result<(), String>,
        cleanup: Option<CleanupFn>,
        now: Timestamp,
    ) {
        let owned = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.pre_action.as_ref())
            .and_then(|(t, action)| (*t == ticket).then(|| action.clone()));
        let Some(action) = owned else {
            if let Some(cleanup) = cleanup {
                tracing::debug!(%ticket, "pre-action finished after its demo ended; reversing now");
                cleanup();
            }
            return;
        };

        if let Err(reason) = &result {
            tracing::warn!(%action, %reason, "pre-action failed; continuing");
        }
        if let Some(cleanup) = cleanup {
            self.register_cleanup(action, cleanup);
        }
        let preparing = self
            .context
            .as_ref()
            .is_some_and(|ctx| matches!(ctx.phase, Phase::Preparing { ticket: t, .. } if t == ticket));
        if preparing {
            self.enter_scene(stage, 0, now);
        }
    }

    /// Store a host cleanup for the active demo. Without one it runs immediately.
    pub fn register_cleanup(&mut self, label: impl Into<String>, cleanup: CleanupFn) {
        match self.context.as_mut() {
            Some(ctx) => ctx.cleanups.register(label, cleanup),
            None => {
                let label: String = label.into();
                tracing::debug!(%label, "no active demo; running cleanup now");
                cleanup();
            }
        }
    }

    pub fn narration_event(
        &mut self,
        stage: &mut dyn Stage,
        ticket: Ticket,
        event: NarrationEvent,
        now: Timestamp,
    ) {
        let speed = self.context.as_ref().map_or(self.speed, |ctx| ctx.speed);
        let Some(progress) = self.narration.handle_event(stage, ticket, event, speed) else {
            return;
        };
        let gap_ms = self.timing.narration_gap_ms;
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let waiting = matches!(&ctx.phase, Phase::Presenting(run) if matches!(run.wait, Wait::Narration));
        if !waiting {
            return;
        }
        if let NarrationProgress::Finished { produced_audio } = progress {
            ctx.wait_on_timer(produced_audio, gap_ms, now);
        }
    }

    /// Fire whatever is due at `now`.
    pub fn tick(&mut self, stage: &mut dyn Stage, now: Timestamp) {
        let limit = self.context.as_ref().map_or(0, |ctx| ctx.scenes.len() * 4 + 16);
        let mut transitions = 0;
        while self.poll(stage, now) {
            transitions += 1;
            if transitions > limit {
                tracing::warn!(transitions, "tick stopped early; resuming on the next one");
                break;
            }
        }
    }

    /// One step of due work. Returns true if the phase changed.
    fn poll(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        let settle_ms = self.timing.navigation_settle_ms;
        let Some(ctx) = self.context.as_mut() else {
            return false;
        };
        if ctx.is_paused {
            return false;
        }
        match &mut ctx.phase {
            Phase::Advancing => false,
            Phase::Preparing { timeout, .. } => {
                if !timeout.is_due(now) {
                    return false;
                }
                tracing::warn!("pre-action timed out; continuing");
                self.enter_scene(stage, 0, now);
                true
            }
            Phase::Navigating { section, timeout, .. } => {
                if !timeout.is_due(now) {
                    return false;
                }
                tracing::warn!(%section, "section switch timed out; continuing");
                let section = section.clone();
                ctx.settle_after_navigation(section, settle_ms, now);
                true
            }
            Phase::Settling { settle } => {
                if !settle.is_due(now) {
                    return false;
                }
                self.present(stage, now);
                true
            }
            Phase::Presenting(run) => {
                if run.spotlight.as_ref().is_some_and(|p| p.is_due(now)) {
                    if let Some(pending) = run.spotlight.take() {
                        match pending.measure(stage.dom(), &self.layout) {
                            Some(placement) => stage.renderer().show_spotlight(&SpotlightView {
                                cutout: placement.cutout,
                                callout: placement.callout,
                                side: placement.side,
                                show_callout: false,
                            }),
                            None => {
                                tracing::debug!(locator = %pending.locator(), "target gone before spotlight");
                                stage.renderer().hide_spotlight();
                            }
                        }
                    }
                }
                if let Some(shown) = run.reveal.advance(now) {
                    stage.renderer().reveal_text(shown);
                }
                let due = matches!(&run.wait, Wait::Timer(countdown) if countdown.is_due(now));
                if due {
                    self.advance(stage, true, now);
                }
                due
            }
        }
    }

    /// Point playback at `index`, navigating first if the scene needs another section.
    fn enter_scene(&mut self, stage: &mut dyn Stage, index: usize, now: Timestamp) {
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        ctx.current_index = index;
        ctx.phase = Phase::Advancing;
        let navigate = ctx.scenes[index]
            .navigate
            .clone()
            .filter(|section| ctx.active_section.as_ref() != Some(section));

        match navigate {
            Some(section) => {
                let ticket = self.tickets.issue();
                tracing::debug!(%section, %ticket, index, "switching section");
                ctx.set_phase(
                    Phase::Navigating {
                        ticket,
                        section: section.clone(),
                        timeout: Countdown::fixed(self.timing.navigation_timeout_ms, now),
                    },
                    now,
                );
                stage.host().navigate_to_section(&section, ticket);
            }
            None => self.present(stage, now),
        }
    }

    fn present(&mut self, stage: &mut dyn Stage, now: Timestamp) {
        // Nothing from the previous scene may still be speaking.
        self.narration.stop(stage);
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        let index = ctx.current_index;
        let scene = &ctx.scenes[index];
        tracing::debug!(index, total = ctx.scenes.len(), "presenting scene");

        stage.renderer().render_scene(&SceneView {
            index,
            total: ctx.scenes.len(),
            breadcrumb: scene.section_label.clone(),
            narration: scene.narration.clone(),
        });

        let spotlight = match (resolve(stage.dom(), scene.target.as_ref()), scene.target.as_ref()) {
            (Resolution::Found(_), Some(locator)) => Some(PendingSpotlight::begin(
                stage.dom(),
                locator,
                Side::Bottom,
                self.timing.spotlight_settle_ms,
                now,
            )),
            (Resolution::NotFound, Some(locator)) => {
                tracing::debug!(%locator, index, "scene target missing; presenting without spotlight");
                stage.renderer().hide_spotlight();
                None
            }
            _ => {
                stage.renderer().hide_spotlight();
                None
            }
        };

        let reveal = TextReveal::start(&scene.narration, self.timing.reveal_chars_per_sec, ctx.speed, now);
        stage.renderer().reveal_text(0);

        let wait = match self
            .narration
            .speak(stage, &scene.narration, scene.source.as_ref(), ctx.speed)
        {
            SpeakOutcome::Pending => Wait::Narration,
            SpeakOutcome::Silent => Wait::Timer(Countdown::scaled(scene.duration_ms, ctx.speed, now)),
        };

        let run = SceneRun {
            clock: WorkClock::start(now, ctx.speed),
            reveal,
            spotlight,
            wait,
        };
        ctx.set_phase(Phase::Presenting(run), now);
        if ctx.is_paused {
            self.narration.pause(stage);
        }
    }

    /// Leave the current scene and move one step. Past the end completes the demo.
    fn advance(&mut self, stage: &mut dyn Stage, forward: bool, now: Timestamp) {
        self.narration.stop(stage);
        let Some(ctx) = self.context.as_mut() else {
            return;
        };
        ctx.phase = Phase::Advancing;
        stage.renderer().hide_spotlight();

        let next = if forward {
            ctx.current_index + 1
        } else {
            ctx.current_index.saturating_sub(1)
        };
        if next >= ctx.scenes.len() {
            self.teardown(stage, RunOutcome::Completed);
            return;
        }
        self.enter_scene(stage, next, now);
    }

    pub fn next(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        self.step(stage, true, now)
    }

    /// On the first scene this replays it.
    pub fn previous(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        self.step(stage, false, now)
    }

    fn step(&mut self, stage: &mut dyn Stage, forward: bool, now: Timestamp) -> bool {
        let Some(ctx) = self.context.as_mut() else {
            return false;
        };
        ctx.is_paused = false;
        self.advance(stage, forward, now);
        true
    }

    pub fn pause(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        let Some(ctx) = self.context.as_mut() else {
            return false;
        };
        if ctx.is_paused {
            return false;
        }
        ctx.is_paused = true;
        ctx.phase.pause(now);
        self.narration.pause(stage);
        tracing::debug!(index = ctx.current_index, "paused");
        true
    }

    pub fn resume(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        let Some(ctx) = self.context.as_mut() else {
            return false;
        };
        if !ctx.is_paused {
            return false;
        }
        ctx.is_paused = false;
        ctx.phase.resume(now);
        self.narration.resume(stage);
        tracing::debug!(index = ctx.current_index, "resumed");
        true
    }

    /// Change speed now and for later runs. Only the remaining work is rescaled.
    pub fn set_speed(&mut self, stage: &mut dyn Stage, multiplier: f64, now: Timestamp) -> Speed {
        let speed = Speed::new(multiplier);
        self.speed = speed;
        let gap_ms = self.timing.narration_gap_ms;
        let Some(ctx) = self.context.as_mut() else {
            return speed;
        };
        ctx.speed = speed;
        if let Phase::Presenting(run) = &mut ctx.phase {
            run.clock.set_speed(speed, now);
            run.reveal.set_speed(speed, now);
            if let Wait::Timer(countdown) = &mut run.wait {
                countdown.set_speed(speed, now);
            }
        }
        if self.narration.set_speed(stage, speed) == SpeedEffect::SpeechDropped {
            ctx.wait_on_timer(false, gap_ms, now);
        }
        tracing::debug!(speed = speed.get(), "speed changed");
        speed
    }

    pub fn set_volume(&mut self, stage: &mut dyn Stage, volume: f32) {
        self.narration.set_volume(stage, volume);
    }

    /// Turning narration off mid-scene hands the scene back to its duration timer.
    pub fn set_narration_enabled(&mut self, stage: &mut dyn Stage, enabled: bool, now: Timestamp) {
        let gap_ms = self.timing.narration_gap_ms;
        if !self.narration.set_enabled(stage, enabled) {
            return;
        }
        if let Some(ctx) = self.context.as_mut() {
            let waiting = matches!(&ctx.phase, Phase::Presenting(run) if matches!(run.wait, Wait::Narration));
            if waiting {
                ctx.wait_on_timer(false, gap_ms, now);
            }
        }
    }

    pub fn stop(&mut self, stage: &mut dyn Stage) -> bool {
        if self.context.is_none() {
            return false;
        }
        self.teardown(stage, RunOutcome::Stopped);
        true
    }

    /// Single exit path for stop, completion and errors.
    fn teardown(&mut self, stage: &mut dyn Stage, outcome: RunOutcome) {
        let Some(mut ctx) = self.context.take() else {
            return;
        };
        self.narration.stop(stage);
        let renderer = stage.renderer();
        renderer.hide_spotlight();
        renderer.clear();
        let cleaned = ctx.cleanups.run_all();
        match outcome {
            RunOutcome::Completed => {
                tracing::info!(title = %ctx.title, scenes = ctx.scenes.len(), cleaned, "demo complete");
                stage.renderer().show_completion(&Completion {
                    title: ctx.title.clone(),
                    scenes_played: ctx.scenes.len(),
                });
            }
            RunOutcome::Stopped => {
                tracing::info!(title = %ctx.title, index = ctx.current_index, cleaned, "demo stopped");
            }
        }
        self.last_outcome = Some(outcome);
    }

    /// Earliest moment `tick` has work to do. `None` when idle or paused.
    pub fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        let ctx = self.context.as_ref()?;
        if ctx.is_paused {
            return None;
        }
        match &ctx.phase {
            Phase::Advancing => None,
            Phase::Preparing { timeout, .. } | Phase::Navigating { timeout, .. } => timeout.deadline(now),
            Phase::Settling { settle } => settle.deadline(now),
            Phase::Presenting(run) => run.deadline(now),
        }
    }
}
