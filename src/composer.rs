// Builds the ordered scene list for a demo request. Pure: the only side effect of a
// sub-demo, its pre-action, is carried out later by the scheduler.

use serde::{Deserialize, Serialize};

use crate::content::{Catalog, Scene, Section};
use crate::error::EngineError;
use crate::types::{SceneKey, SectionId};

const BREADCRUMB_SEPARATOR: &str = " › ";

/// What the user asked to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemoRequest {
    Section { section_id: String },
    SubDemo { section_id: String, sub_demo_id: String },
    FullTour,
}

/// A ready-to-play scene list.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedDemo {
    pub title: String,
    pub scenes: Vec<Scene>,
    /// Host action awaited before the first scene.
    pub pre_action: Option<String>,
}

impl ComposedDemo {
    pub fn new(title: impl Into<String>, scenes: Vec<Scene>) -> Self {
        ComposedDemo {
            title: title.into(),
            scenes,
            pre_action: None,
        }
    }
}

pub struct DemoComposer<'a> {
    catalog: &'a Catalog,
    intertitle_ms: u64,
}

impl<'a> DemoComposer<'a> {
    pub fn new(catalog: &'a Catalog, intertitle_ms: u64) -> Self {
        DemoComposer {
            catalog,
            intertitle_ms,
        }
    }

    pub fn compose(&self, request: &DemoRequest) -> Result<ComposedDemo, EngineError> {
        let demo = match request {
            DemoRequest::Section { section_id } => {
                let section = self.section(section_id)?;
                ComposedDemo::new(section.title.clone(), overview(section))
            }
            DemoRequest::SubDemo {
                section_id,
                sub_demo_id,
            } => {
                let section = self.section(section_id)?;
                let sub = section
                    .sub_demo(sub_demo_id)
                    .ok_or_else(|| EngineError::UnknownSubDemo {
                        section: section_id.clone(),
                        sub_demo: sub_demo_id.clone(),
                    })?;
                let label = format!("{}{}{}", section.title, BREADCRUMB_SEPARATOR, sub.title);
                let key_section = SectionId::new(format!("{}/{}", section.id, sub.id));
                let scenes = tag(&sub.scenes, &label, &key_section);
                ComposedDemo {
                    title: label,
                    scenes,
                    pre_action: sub.pre_action.clone().filter(|a| !a.trim().is_empty()),
                }
            }
            DemoRequest::FullTour => ComposedDemo::new("Full tour", self.full_tour()),
        };

        if demo.scenes.is_empty() {
            return Err(EngineError::EmptyContent(demo.title));
        }
        tracing::debug!(title = %demo.title, scenes = demo.scenes.len(), "demo composed");
        Ok(demo)
    }

    fn section(&self, id: &str) -> Result<&'a Section, EngineError> {
        self.catalog
            .section(id)
            .ok_or_else(|| EngineError::UnknownSection(id.to_string()))
    }

    /// Every scene names the view it plays on, so stepping back across a section
    /// boundary switches the host back as well.
    fn full_tour(&self) -> Vec<Scene> {
        let mut scenes: Vec<Scene> = Vec::new();
        for section in self.catalog.sections.iter().filter(|s| !s.scenes.is_empty()) {
            if let Some(view) = scenes.last().and_then(|s| s.navigate.clone()) {
                let mut intertitle =
                    Scene::new(self.intertitle_ms).with_narration(&format!("Next: {}", section.title));
                intertitle.section_label = section.title.clone();
                intertitle.navigate = Some(view);
                scenes.push(intertitle);
            }
            let mut view = section.id.clone();
            for mut scene in overview(section) {
                view = scene.navigate.get_or_insert(view).clone();
                scenes.push(scene);
            }
        }
        scenes
    }
}

fn overview(section: &Section) -> Vec<Scene> {
    tag(&section.scenes, &section.title, &section.id)
}

fn tag(scenes: &[Scene], label: &str, key_section: &SectionId) -> Vec<Scene> {
    scenes
        .iter()
        .enumerate()
        .map(|(index, scene)| {
            let mut scene = scene.clone();
            scene.section_label = label.to_string();
            scene.source = Some(SceneKey::new(key_section.clone(), index));
            scene
        })
        .collect()
}
