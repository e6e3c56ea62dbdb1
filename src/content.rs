// Authored guide content: sections, their overview scenes, sub-demos and tour steps.
// Read-only to the engine. The composer clones and tags scenes; nothing mutates them.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{Locator, SceneKey, SectionId, Side};

/// One presentable unit of a demo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Element to spotlight, if any.
    #[serde(default)]
    pub target: Option<Locator>,
    /// Narration text; may be empty.
    #[serde(default)]
    pub narration: String,
    /// Display time at speed 1 when no narration audio is produced.
    pub duration_ms: u64,
    /// Section the host must switch to before this scene is presented.
    #[serde(default)]
    pub navigate: Option<SectionId>,
    /// Breadcrumb text. Filled in by the composer.
    #[serde(default)]
    pub section_label: String,
    /// Pre-generated audio lookup key. Filled in by the composer.
    #[serde(default)]
    pub source: Option<SceneKey>,
}

impl Scene {
    pub fn new(duration_ms: u64) -> Self {
        Scene {
            target: None,
            narration: String::new(),
            duration_ms,
            navigate: None,
            section_label: String::new(),
            source: None,
        }
    }

    pub fn with_target(mut self, locator: &str) -> Self {
        self.target = Some(Locator::new(locator));
        self
    }

    pub fn with_narration(mut self, text: &str) -> Self {
        self.narration = text.to_string();
        self
    }

    pub fn with_navigate(mut self, section: &str) -> Self {
        self.navigate = Some(SectionId::new(section));
        self
    }
}

/// A focused scene list nested under a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubDemo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub description: String,
    /// Host action to await before the first scene (e.g. open a panel).
    #[serde(default)]
    pub pre_action: Option<String>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// One step of a manual tour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourStep {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub target: Option<Locator>,
    #[serde(default)]
    pub side: Side,
}

/// A named feature area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub sub_demos: Vec<SubDemo>,
    #[serde(default)]
    pub tour: Vec<TourStep>,
}

impl Section {
    pub fn sub_demo(&self, id: &str) -> Option<&SubDemo> {
        self.sub_demos.iter().find(|sub| sub.id == id)
    }
}

/// All sections, in the canonical order used by the full tour.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Catalog {
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidCatalog(e.to_string()))
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.id.as_str() == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r##"{
        "sections": [
            {
                "id": "review",
                "title": "Document Review",
                "scenes": [
                    { "target": "#doc-list", "narration": "Your documents live here.", "duration_ms": 4000 },
                    { "duration_ms": 2000 }
                ],
                "sub_demos": [
                    { "id": "filters", "title": "Filters", "pre_action": "open-filters", "scenes": [] }
                ],
                "tour": [
                    { "title": "List", "description": "All documents", "target": "#doc-list", "side": "right" }
                ]
            }
        ]
    }"##;

    #[test]
    fn catalog_parses_with_defaults() {
        let catalog = Catalog::from_json(CATALOG).unwrap();
        let review = catalog.section("review").unwrap();
        assert_eq!(review.scenes.len(), 2);
        assert_eq!(review.scenes[1].target, None);
        assert!(review.scenes[1].narration.is_empty());
        assert_eq!(review.tour[0].side, Side::Right);
        assert_eq!(
            review.sub_demo("filters").unwrap().pre_action.as_deref(),
            Some("open-filters")
        );
        assert!(catalog.section("missing").is_none());
    }

    #[test]
    fn malformed_catalog_is_rejected() {
        let err = Catalog::from_json(r#"{"sections": [{"title": "no id"}]}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidCatalog(_)));
    }
}
