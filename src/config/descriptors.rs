//! Descriptor files
//!
//! Entities and the serializable part of [`Options`] live in one YAML or JSON file,
//! picked by extension:
//!
//! ```yaml
//! entities:
//!   - name: Course
//!     fields: { id: integer, name: string }
//! options:
//!   mutationOptions: { delete: false }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::graphql::{EntityDescriptor, Options};

#[derive(Debug, Default, Deserialize)]
pub struct DescriptorFile {
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
    #[serde(default)]
    pub options: Options,
}

impl DescriptorFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read descriptor file {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let file = if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
        .with_context(|| format!("Invalid descriptor file {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            entities = file.entities.len(),
            "Loaded entity descriptors"
        );
        Ok(file)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}
