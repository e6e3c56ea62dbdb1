// Target resolution: locator -> live, visible element box.
// A miss is a value, not an error; callers decide whether to skip or carry on.

use crate::stage::Dom;
use crate::types::{Locator, Rect};

/// Outcome of resolving a scene or step target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The scene declares no target.
    Untargeted,
    /// Visible element with its bounding box.
    Found(Rect),
    /// Absent, detached, hidden or zero-sized.
    NotFound,
}

impl Resolution {
    pub fn is_missing(&self) -> bool {
        matches!(self, Resolution::NotFound)
    }
}

pub fn resolve(dom: &dyn Dom, target: Option<&Locator>) -> Resolution {
    let Some(locator) = target else {
        return Resolution::Untargeted;
    };
    match dom.query(locator) {
        Some(el) if el.connected && !el.hidden && !el.rect.is_empty() => Resolution::Found(el.rect),
        Some(_) => {
            tracing::debug!(%locator, "target present but not visible");
            Resolution::NotFound
        }
        None => {
            tracing::debug!(%locator, "target not found");
            Resolution::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStage;

    #[test]
    fn absent_locator_is_untargeted() {
        let stage = FakeStage::new();
        assert_eq!(resolve(&stage, None), Resolution::Untargeted);
    }

    #[test]
    fn visible_element_is_found() {
        let stage = FakeStage::new().with_element("#a", Rect::new(10.0, 10.0, 50.0, 20.0));
        assert_eq!(
            resolve(&stage, Some(&Locator::new("#a"))),
            Resolution::Found(Rect::new(10.0, 10.0, 50.0, 20.0))
        );
    }

    #[test]
    fn invisible_elements_are_missing() {
        let mut stage = FakeStage::new()
            .with_element("#zero", Rect::new(10.0, 10.0, 0.0, 20.0))
            .with_element("#detached", Rect::new(10.0, 10.0, 5.0, 5.0))
            .with_element("#hidden", Rect::new(10.0, 10.0, 5.0, 5.0));
        stage.elements.get_mut("#detached").unwrap().connected = false;
        stage.elements.get_mut("#hidden").unwrap().hidden = true;

        for locator in ["#zero", "#detached", "#hidden", "#missing"] {
            assert!(resolve(&stage, Some(&Locator::new(locator))).is_missing(), "{locator}");
        }
    }
}
