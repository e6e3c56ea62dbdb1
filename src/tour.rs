// Manual tour: user-paced steps with a spotlight and a callout.
// No narration, no auto-advance, no speed. Steps whose target cannot be seen are
// skipped in the direction of travel.

use crate::content::{Section, TourStep};
use crate::error::EngineError;
use crate::spotlight::{PendingSpotlight, SpotlightLayout};
use crate::stage::{Stage, StepView};
use crate::target::{resolve, Resolution};
use crate::types::{SectionId, SpotlightSettings, Timestamp};

#[derive(Debug)]
struct ActiveTour {
    section: SectionId,
    steps: Vec<TourStep>,
    index: usize,
    /// Targeted step waiting for its settle delay.
    pending: Option<PendingSpotlight>,
}

#[derive(Debug)]
pub struct TourPlayer {
    layout: SpotlightLayout,
    settle_ms: u64,
    active: Option<ActiveTour>,
}

impl TourPlayer {
    pub fn new(spotlight: SpotlightSettings, settle_ms: u64) -> Self {
        TourPlayer {
            layout: SpotlightLayout::new(spotlight),
            settle_ms,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.active.as_ref().map(|tour| tour.index)
    }

    pub fn section(&self) -> Option<&SectionId> {
        self.active.as_ref().map(|tour| &tour.section)
    }

    /// Begin the section's tour at its first visible step. Returns false if no step
    /// could be shown, in which case the tour is already over.
    pub fn start(&mut self, stage: &mut dyn Stage, section: &Section, now: Timestamp) -> Result<bool, EngineError> {
        if section.tour.is_empty() {
            return Err(EngineError::EmptyContent(section.title.clone()));
        }
        self.end(stage);
        tracing::info!(section = %section.id, steps = section.tour.len(), "tour started");
        self.active = Some(ActiveTour {
            section: section.id.clone(),
            steps: section.tour.clone(),
            index: 0,
            pending: None,
        });
        Ok(self.move_to(stage, 0, true, now))
    }

    pub fn next(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        let Some(index) = self.current_index() else {
            return false;
        };
        self.move_to(stage, index + 1, true, now)
    }

    /// Stays put when no earlier step is visible.
    pub fn previous(&mut self, stage: &mut dyn Stage, now: Timestamp) -> bool {
        let Some(index) = self.current_index() else {
            return false;
        };
        if index == 0 {
            return false;
        }
        self.move_to(stage, index - 1, false, now)
    }

    pub fn skip(&mut self, stage: &mut dyn Stage) {
        self.end(stage);
    }

    pub fn end(&mut self, stage: &mut dyn Stage) -> bool {
        let Some(tour) = self.active.take() else {
            return false;
        };
        tracing::info!(section = %tour.section, index = tour.index, "tour ended");
        let renderer = stage.renderer();
        renderer.hide_spotlight();
        renderer.clear();
        true
    }

    /// Show the nearest visible step from `from` in the given direction.
    /// Forward past the end ends the tour; backward with nothing visible stays put.
    fn move_to(&mut self, stage: &mut dyn Stage, from: usize, forward: bool, now: Timestamp) -> bool {
        let Some(tour) = self.active.as_ref() else {
            return false;
        };
        let visible = |index: &usize| !resolve(stage.dom(), tour.steps[*index].target.as_ref()).is_missing();
        let found = if forward {
            (from..tour.steps.len()).find(visible)
        } else {
            (0..=from).rev().find(visible)
        };

        match found {
            Some(index) => {
                if index != from {
                    tracing::debug!(from, to = index, "skipped tour steps with missing targets");
                }
                self.show(stage, index, now);
                true
            }
            None if forward => {
                tracing::debug!(from, "no visible step left");
                self.end(stage);
                false
            }
            None => false,
        }
    }

    fn show(&mut self, stage: &mut dyn Stage, index: usize, now: Timestamp) {
        let Some(tour) = self.active.as_mut() else {
            return;
        };
        tour.index = index;
        tour.pending = None;
        let step = &tour.steps[index];
        match (resolve(stage.dom(), step.target.as_ref()), step.target.as_ref()) {
            (Resolution::Found(_), Some(locator)) => {
                // The previous step's callout must not linger through the settle delay.
                let renderer = stage.renderer();
                renderer.hide_spotlight();
                renderer.clear();
                tour.pending = Some(PendingSpotlight::begin(stage.dom(), locator, step.side, self.settle_ms, now));
            }
            _ => {
                let dom = stage.dom();
                let callout = self.layout.centered(dom.callout_size(), dom.viewport());
                let view = StepView {
                    index,
                    total: tour.steps.len(),
                    title: step.title.clone(),
                    description: step.description.clone(),
                    callout,
                    cutout: None,
                    side: None,
                };
                let renderer = stage.renderer();
                renderer.hide_spotlight();
                renderer.show_step(&view);
            }
        }
    }

    pub fn tick(&mut self, stage: &mut dyn Stage, now: Timestamp) {
        let Some(tour) = self.active.as_mut() else {
            return;
        };
        if !tour.pending.as_ref().is_some_and(|p| p.is_due(now)) {
            return;
        }
        let Some(pending) = tour.pending.take() else {
            return;
        };
        match pending.measure(stage.dom(), &self.layout) {
            Some(placement) => {
                let step = &tour.steps[tour.index];
                let view = StepView {
                    index: tour.index,
                    total: tour.steps.len(),
                    title: step.title.clone(),
                    description: step.description.clone(),
                    callout: placement.callout,
                    cutout: Some(placement.cutout),
                    side: Some(placement.side),
                };
                let renderer = stage.renderer();
                renderer.hide_spotlight();
                renderer.show_step(&view);
            }
            None => {
                tracing::debug!(locator = %pending.locator(), "tour target vanished; skipping");
                let next = tour.index + 1;
                self.move_to(stage, next, true, now);
            }
        }
    }

    pub fn next_deadline(&self, now: Timestamp) -> Option<Timestamp> {
        self.active.as_ref()?.pending.as_ref()?.deadline(now)
    }
}
