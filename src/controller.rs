// Top-level guide controller: one scheduler, one tour, the help panel and preferences.
// Enforces the cross-cutting rules: feature flag, one activity at a time, and the
// cancel-key priority (demo, then tour, then help panel).

use serde::{Deserialize, Serialize};

use crate::cleanup::CleanupFn;
use crate::composer::{DemoComposer, DemoRequest};
use crate::content::Catalog;
use crate::error::EngineError;
use crate::narration::NarrationEvent;
use crate::prefs::Preferences;
use crate::scheduler::{PlaybackState, Scheduler, StartOutcome};
use crate::stage::Stage;
use crate::timing::Speed;
use crate::tour::TourPlayer;
use crate::types::{EngineConfig, Ticket, Timestamp};

/// What a cancel keypress did. Never more than one thing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    StoppedDemo,
    EndedTour,
    ClosedHelp,
    Nothing,
}

pub struct GuideController {
    config: EngineConfig,
    catalog: Catalog,
    scheduler: Scheduler,
    tour: TourPlayer,
    prefs: Preferences,
    help_open: bool,
}

impl GuideController {
    /// Build the controller and apply persisted preferences from the stage.
    pub fn new(config: EngineConfig, catalog: Catalog, stage: &mut dyn Stage) -> Self {
        let prefs = Preferences::load(stage.preferences());
        let mut scheduler = Scheduler::new(&config);
        let narration = scheduler.narration_mut();
        narration.set_enabled(stage, prefs.narration_enabled);
        narration.set_volume(stage, prefs.volume);
        narration.set_preferred_voice(prefs.preferred_voice.clone());

        let tour = TourPlayer::new(config.spotlight.clone(), config.timing.spotlight_settle_ms);
        tracing::debug!(sections = catalog.sections.len(), enabled = prefs.enabled, "guide ready");
        GuideController {
            config,
            catalog,
            scheduler,
            tour,
            prefs,
            help_open: false,
        }
    }

    pub fn load_manifest(&mut self, json: Option<&str>) {
        self.scheduler.narration_mut().load_manifest(json);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn tour(&self) -> &TourPlayer {
        &self.tour
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    pub fn state(&self) -> PlaybackState {
        self.scheduler.state()
    }

    pub fn is_help_open(&self) -> bool {
        self.help_open
    }

    pub fn start_demo(
        &mut self,
        stage: &mut dyn Stage,
        request: &DemoRequest,
        now: Timestamp,
    ) -> Result<StartOutcome, EngineError> {
        if !self.prefs.enabled {
            return Err(EngineError::Disabled);
        }
        if self.scheduler.is_playing() {
            tracing::debug!(?request, "demo already playing");
            return Ok(StartOutcome::AlreadyPlaying);
        }
        let composer = DemoComposer::new(&self.catalog, self.config.timing.intertitle_ms);
        let demo = match composer.compose(request) {
            Ok(demo) => demo,
            Err(EngineError::EmptyContent(title)) => {
                stage.renderer().show_notice(&empty_notice(&title));
                return Err(EngineError::EmptyContent(title));
            }
            Err(err) => return Err(err),
        };

        self.tour.end(stage);
        self.close_help(stage);
        self.scheduler.start(stage, demo, now)
    }

    /// Start the manual tour of a section. Ends any playing demo first.
    pub fn start_tour(&mut self, stage: &mut dyn Stage, section_id: &str, now: Timestamp) -> Result<bool, EngineError> {
        if !self.prefs.enabled {
            return Err(EngineError::Disabled);
        }
        let Some(section) = self.catalog.section(section_id) else {
            return Err(EngineError::UnknownSection(section_id.to_string()));
        };
        if section.tour.is_empty() {
            let title = section.title.clone();
            stage.renderer().show_notice(&empty_notice(&title));
            return Err(EngineError::EmptyContent(title));
        }

        self.scheduler.stop(stage);
        if self.help_open {
            self.help_open = false;
            stage.renderer().set_help_panel(false);
        }
        self.tour.start(stage, section, now)
    }

    /// The global cancel key.
    pub fn cancel(&mut self, stage: &mut dyn Stage) -> CancelOutcome {
        if self.scheduler.stop(stage) {
            CancelOutcome::StoppedDemo
        } else if self.tour.end(stage) {
            CancelOutcome::EndedTour
        } else if self.close_help(stage) {
            CancelOutcome::ClosedHelp
        } else {
            CancelOutcome::Nothing
        }
    }

    pub fn open_help(&mut self, stage: &mut dyn Stage) -> Result<(), EngineError> {
        if !self.prefs.enabled {
            return Err(EngineError::Disabled);
        }
        if !self.help_open {
            self.help_open = true;
            stage.renderer().set_help_panel(true);
        }
        Ok(())
    }

    pub fn close_help(&mut self, stage: &mut dyn Stage) -> bool {
        if !self.help_open {
            return false;
        }
        self.help_open = false;
        stage.renderer().set_help_panel(false);
        true
    }

    /// Next scene of the playing demo, or next step of the active tour.
    pub fn next(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        if self.scheduler.is_playing() {
            self.scheduler.next(stage, now)
        } else {
            self.tour.next(stage, now)
        }
    }

    pub fn previous(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        if self.scheduler.is_playing() {
            self.scheduler.previous(stage, now)
        } else {
            self.tour.previous(stage, now)
        }
    }

    pub fn pause(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        self.scheduler.pause(stage, now)
    }

    pub fn resume(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        self.scheduler.resume(stage, now)
    }

    pub fn stop(&mut self, stage: &mut dyn Stage) -> bool {
        self.scheduler.stop(stage)
    }

    pub fn skip_tour(&mut self, stage: &mut dyn Stage) {
        self.tour.skip(stage);
    }

    pub fn set_speed(&mut self, stage: &mut dyn Stage, multiplier: f64, now: Timestamp) -> Speed {
        self.scheduler.set_speed(stage, multiplier, now)
    }

    pub fn navigation_complete(&mut self, ticket: Ticket, result: Result<(), String>, now: Timestamp) {
        self.scheduler.navigation_complete(ticket, result, now);
    }

    pub fn pre_action_complete(
        &mut self,
        stage: &mut dyn Stage,
        ticket: Ticket,
        result: Result<(), String>,
        cleanup: Option<CleanupFn>,
        now: Timestamp,
    ) {
        self.scheduler.pre_action_complete(stage, ticket, result, cleanup, now);
    }

    pub fn narration_event(&mut self, stage: &mut dyn Stage, ticket: Ticket, event: NarrationEvent, now: Timestamp) {
        self.scheduler.narration_event(stage, ticket, event, now);
    }

    pub fn tick(&mut self, stage: &mut dyn Stage, now: Timestamp) {
        self.scheduler.tick(stage, now);
        self.tour.tick(stage, now);
    }

    pub fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        [self.scheduler.next_deadline(now), self.tour.next_deadline(now)]
            .into_iter()
            .flatten()
            .min()
    }

    /// Master switch. Turning it off ends everything that is showing.
    pub fn set_enabled(&mut self, stage: &mut dyn Stage, enabled: bool) {
        self.prefs.enabled = enabled;
        if !enabled {
            self.scheduler.stop(stage);
            self.tour.end(stage);
            self.close_help(stage);
        }
        self.persist(stage);
    }

    pub fn set_narration_enabled(&mut self, stage: &mut dyn Stage, enabled: bool, now: Timestamp) {
        self.prefs.narration_enabled = enabled;
        self.scheduler.set_narration_enabled(stage, enabled, now);
        self.persist(stage);
    }

    pub fn set_volume(&mut self, stage: &mut dyn Stage, volume: f32) {
        self.scheduler.set_volume(stage, volume);
        self.prefs.volume = self.scheduler.narration().volume();
        self.persist(stage);
    }

    pub fn set_preferred_voice(&mut self, stage: &mut dyn Stage, name: Option<String>) {
        let name = name.filter(|n| !n.trim().is_empty());
        self.scheduler.narration_mut().set_preferred_voice(name.clone());
        self.prefs.preferred_voice = name;
        self.persist(stage);
    }

    fn persist(&self, stage: &mut dyn Stage) {
        self.prefs.save(stage.preferences());
    }
}

fn empty_notice(title: &str) -> String {
    format!("There is nothing to show for {title} yet.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::{PreferenceStore, KEY_ENABLED, KEY_VOICE, KEY_VOLUME};
    use crate::testing::{Call, FakeStage};
    use crate::types::Rect;

    const CATALOG: &str = r##"{
        "sections": [
            { "id": "review", "title": "Review",
              "scenes": [ { "duration_ms": 3000, "target": "#a" }, { "duration_ms": 2000 } ],
              "tour": [ { "title": "Queue", "target": "#a" }, { "title": "Done" } ] },
            { "id": "blank", "title": "Blank" }
        ]
    }"##;

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn setup() -> (GuideController, FakeStage) {
        let mut stage = FakeStage::new().with_element("#a", Rect::new(10.0, 10.0, 50.0, 20.0));
        let controller = GuideController::new(
            EngineConfig::default(),
            Catalog::from_json(CATALOG).unwrap(),
            &mut stage,
        );
        (controller, stage)
    }

    fn review() -> DemoRequest {
        DemoRequest::Section {
            section_id: "review".into(),
        }
    }

    #[test]
    fn cancel_follows_priority_one_per_press() {
        let (mut guide, mut stage) = setup();
        guide.open_help(&mut stage).unwrap();
        guide.start_tour(&mut stage, "review", ms(0)).unwrap();
        // Starting closed the panel; reopen it under the tour.
        guide.open_help(&mut stage).unwrap();

        assert_eq!(guide.cancel(&mut stage), CancelOutcome::EndedTour);
        assert_eq!(guide.cancel(&mut stage), CancelOutcome::ClosedHelp);
        assert_eq!(guide.cancel(&mut stage), CancelOutcome::Nothing);

        guide.start_demo(&mut stage, &review(), ms(10)).unwrap();
        assert_eq!(guide.cancel(&mut stage), CancelOutcome::StoppedDemo);
        assert_eq!(guide.state(), PlaybackState::Idle);
    }

    #[test]
    fn demo_and_tour_replace_each_other() {
        let (mut guide, mut stage) = setup();
        guide.start_tour(&mut stage, "review", ms(0)).unwrap();
        guide.start_demo(&mut stage, &review(), ms(10)).unwrap();
        assert!(!guide.tour().is_active());
        assert!(guide.scheduler().is_playing());

        guide.start_tour(&mut stage, "review", ms(20)).unwrap();
        assert!(!guide.scheduler().is_playing());
        assert!(guide.tour().is_active());
    }

    #[test]
    fn unknown_tour_section_is_refused() {
        let (mut guide, mut stage) = setup();
        guide.open_help(&mut stage).unwrap();
        assert!(matches!(
            guide.start_tour(&mut stage, "nope", ms(0)),
            Err(EngineError::UnknownSection(_))
        ));
        assert!(guide.is_help_open());
        assert!(!guide.tour().is_active());
    }

    #[test]
    fn second_demo_start_is_silent() {
        let (mut guide, mut stage) = setup();
        guide.start_demo(&mut stage, &review(), ms(0)).unwrap();
        assert_eq!(
            guide.start_demo(&mut stage, &DemoRequest::FullTour, ms(5)).unwrap(),
            StartOutcome::AlreadyPlaying
        );
        assert_eq!(stage.rendered_scenes(), vec![0]);
    }

    #[test]
    fn empty_content_shows_notice_and_never_plays() {
        let (mut guide, mut stage) = setup();
        let result = guide.start_demo(
            &mut stage,
            &DemoRequest::Section {
                section_id: "blank".into(),
            },
            ms(0),
        );
        assert!(matches!(result, Err(EngineError::EmptyContent(_))));
        assert!(matches!(
            guide.start_tour(&mut stage, "blank", ms(0)),
            Err(EngineError::EmptyContent(_))
        ));
        assert_eq!(
            stage.calls,
            vec![
                Call::Notice("There is nothing to show for Blank yet.".into()),
                Call::Notice("There is nothing to show for Blank yet.".into()),
            ]
        );
        assert_eq!(guide.state(), PlaybackState::Idle);
    }

    #[test]
    fn disabled_flag_refuses_and_ends_everything() {
        let (mut guide, mut stage) = setup();
        guide.start_demo(&mut stage, &review(), ms(0)).unwrap();
        guide.set_enabled(&mut stage, false);
        assert!(!guide.scheduler().is_playing());
        assert_eq!(stage.prefs.get(KEY_ENABLED).as_deref(), Some("false"));
        assert!(matches!(
            guide.start_demo(&mut stage, &review(), ms(10)),
            Err(EngineError::Disabled)
        ));
        assert!(matches!(guide.open_help(&mut stage), Err(EngineError::Disabled)));
    }

    #[test]
    fn preferences_load_and_persist() {
        let mut stage = FakeStage::new();
        stage.prefs.set(KEY_VOLUME, "0.3");
        let mut guide = GuideController::new(
            EngineConfig::default(),
            Catalog::from_json(CATALOG).unwrap(),
            &mut stage,
        );
        assert_eq!(guide.preferences().volume, 0.3);
        assert_eq!(guide.scheduler().narration().volume(), 0.3);

        guide.set_volume(&mut stage, 2.0);
        assert_eq!(stage.prefs.get(KEY_VOLUME).as_deref(), Some("1"));
        guide.set_preferred_voice(&mut stage, Some("Samantha".into()));
        assert_eq!(stage.prefs.get(KEY_VOICE).as_deref(), Some("Samantha"));
        guide.set_narration_enabled(&mut stage, false, ms(0));
        assert!(!guide.scheduler().narration().is_enabled());
    }

    #[test]
    fn next_routes_to_tour_when_no_demo() {
        let (mut guide, mut stage) = setup();
        guide.start_tour(&mut stage, "review", ms(0)).unwrap();
        guide.tick(&mut stage, ms(350));
        assert!(guide.next(&mut stage, ms(400)));
        assert_eq!(guide.tour().current_index(), Some(1));
        assert!(!guide.next(&mut stage, ms(500)));
        assert!(!guide.tour().is_active());
        assert_eq!(guide.next_deadline(ms(500)), None);
    }
}
