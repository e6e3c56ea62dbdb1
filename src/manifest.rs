// Pre-generated narration audio manifest.
// Shape: { "sections": { "<section id>": { "steps": [ { "file": "review/01.mp3" } ] } } }

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::SceneKey;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudioManifest {
    #[serde(default)]
    sections: HashMap<String, ManifestSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ManifestSection {
    #[serde(default)]
    steps: Vec<ManifestStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestStep {
    #[serde(default)]
    file: String,
}

impl AudioManifest {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Manifest(e.to_string()))
    }

    /// Number of clips across all sections.
    pub fn clip_count(&self) -> usize {
        self.sections
            .values()
            .map(|section| section.steps.iter().filter(|step| !step.file.is_empty()).count())
            .sum()
    }

    /// Clip URL for a scene, resolved against `root`.
    pub fn clip_url(&self, root: &str, key: &SceneKey) -> Option<String> {
        let step = self
            .sections
            .get(key.section_id.as_str())?
            .steps
            .get(key.step_index)?;
        let file = step.file.trim();
        if file.is_empty() {
            return None;
        }
        if file.contains("://") {
            return Some(file.to_string());
        }
        Some(format!(
            "{}/{}",
            root.trim_end_matches('/'),
            file.trim_start_matches('/')
        ))
    }
}
