// Spotlight placement: cutout around the target, callout beside it, never off-screen.
// Rule: the final clamp wins over every preference. A callout that hides part of the
// target is acceptable; one that renders partially outside the viewport is not.

use serde::{Deserialize, Serialize};

use crate::stage::Dom;
use crate::target::{resolve, Resolution};
use crate::timing::Countdown;
use crate::types::{Locator, Rect, Side, Size, SpotlightSettings, Timestamp};

/// Where the overlay cutout and the callout go.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub cutout: Rect,
    pub callout: Rect,
    /// Side actually used after flipping.
    pub side: Side,
}

/// Pure placement maths over viewport coordinates.
#[derive(Debug, Clone, Default)]
pub struct SpotlightLayout {
    settings: SpotlightSettings,
}

impl SpotlightLayout {
    pub fn new(settings: SpotlightSettings) -> Self {
        SpotlightLayout { settings }
    }

    pub fn settings(&self) -> &SpotlightSettings {
        &self.settings
    }

    /// Place the callout next to `target`, preferring `preferred`.
    pub fn place(&self, target: Rect, callout: Size, viewport: Size, preferred: Side) -> Placement {
        let margin = self.settings.margin;
        let cutout = target.inflate(self.settings.padding);
        let (width, height) = self.fit(callout, viewport);

        let (x, y, side) = match preferred {
            Side::Top | Side::Bottom => {
                let x = self.anchor_horizontally(&cutout, width, viewport);
                let (y, side) = self.flip_vertically(&cutout, height, viewport, preferred);
                (x, y, side)
            }
            Side::Left => (
                cutout.x - margin - width,
                cutout.center_y() - height / 2.0,
                Side::Left,
            ),
            Side::Right => (
                cutout.right() + margin,
                cutout.center_y() - height / 2.0,
                Side::Right,
            ),
        };

        Placement {
            cutout,
            callout: Rect::new(
                self.clamp_axis(x, width, viewport.width),
                self.clamp_axis(y, height, viewport.height),
                width,
                height,
            ),
            side,
        }
    }

    /// Callout in the middle of the viewport, for steps without a target.
    pub fn centered(&self, callout: Size, viewport: Size) -> Rect {
        let (width, height) = self.fit(callout, viewport);
        Rect::new(
            self.clamp_axis((viewport.width - width) / 2.0, width, viewport.width),
            self.clamp_axis((viewport.height - height) / 2.0, height, viewport.height),
            width,
            height,
        )
    }

    /// Shrink the callout so it can fit inside the inset viewport at all.
    fn fit(&self, callout: Size, viewport: Size) -> (f64, f64) {
        let inset = self.settings.inset;
        let max_width = (viewport.width - inset * 2.0).max(0.0);
        let max_height = (viewport.height - inset * 2.0).max(0.0);
        (
            callout.width.clamp(0.0, max_width),
            callout.height.clamp(0.0, max_height),
        )
    }

    fn anchor_horizontally(&self, cutout: &Rect, width: f64, viewport: Size) -> f64 {
        let inset = self.settings.inset;
        let centered = cutout.center_x() - width / 2.0;
        if centered >= inset && centered + width <= viewport.width - inset {
            return centered;
        }
        // Anchor to the target edge nearest the viewport edge it is close to.
        if cutout.center_x() < viewport.width / 2.0 {
            cutout.x
        } else {
            cutout.right() - width
        }
    }

    fn flip_vertically(&self, cutout: &Rect, height: f64, viewport: Size, preferred: Side) -> (f64, Side) {
        let inset = self.settings.inset;
        let margin = self.settings.margin;
        let below = cutout.bottom() + margin;
        let above = cutout.y - margin - height;
        let fits_below = below + height <= viewport.height - inset;
        let fits_above = above >= inset;

        match preferred {
            Side::Top if fits_above => (above, Side::Top),
            Side::Top if fits_below => (below, Side::Bottom),
            Side::Top => (above, Side::Top),
            _ if fits_below => (below, Side::Bottom),
            _ if fits_above => (above, Side::Top),
            _ => (below, Side::Bottom),
        }
    }

    fn clamp_axis(&self, value: f64, size: f64, extent: f64) -> f64 {
        let inset = self.settings.inset;
        let hi = (extent - inset - size).max(inset);
        if value.is_nan() {
            return inset;
        }
        value.clamp(inset, hi)
    }
}

/// A target scrolled into view and waiting for layout to settle before measurement.
#[derive(Debug, Clone)]
pub struct PendingSpotlight {
    locator: Locator,
    side: Side,
    settle: Countdown,
}

impl PendingSpotlight {
    pub fn begin(
        dom: &mut dyn Dom,
        locator: &Locator,
        side: Side,
        settle_ms: u64,
        now: Timestamp,
    ) -> Self {
        dom.scroll_into_view(locator);
        PendingSpotlight {
            locator: locator.clone(),
            side,
            settle: Countdown::fixed(settle_ms, now),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.settle.is_due(now)
    }

    pub fn deadline(&self, now: Timestamp) -> Option<Timestamp> {
        self.settle.deadline(now)
    }

    pub fn pause(&mut self, now: Timestamp) {
        self.settle.pause(now);
    }

    pub fn resume(&mut self, now: Timestamp) {
        self.settle.resume(now);
    }

    /// Re-resolve after the settle delay; `None` if the target went away meanwhile.
    pub fn measure(&self, dom: &dyn Dom, layout: &SpotlightLayout) -> Option<Placement> {
        match resolve(dom, Some(&self.locator)) {
            Resolution::Found(rect) => {
                Some(layout.place(rect, dom.callout_size(), dom.viewport(), self.side))
            }
            _ => None,
        }
    }
}
