//! Template metadata and the built-in catalog.

use serde::{Deserialize, Serialize};

use crate::contract::TemplateCatalog;

/// Metadata for one content template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Historical performance in `[0, 1]`, used when rotation is weighted.
    #[serde(default)]
    pub performance_score: f64,
}

impl TemplateInfo {
    pub fn new(id: &str, name: &str, description: &str, performance_score: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            performance_score,
        }
    }
}

/// The six stock templates every deployment ships with.
#[derive(Debug, Clone, Default)]
pub struct BuiltinCatalog;

impl TemplateCatalog for BuiltinCatalog {
    fn templates(&self) -> Vec<TemplateInfo> {
        vec![
            TemplateInfo::new("minimal", "Minimal", "Clean single-column article", 0.62),
            TemplateInfo::new("business", "Business", "Professional layout with callouts", 0.71),
            TemplateInfo::new("editorial", "Editorial", "Long-form magazine style", 0.66),
            TemplateInfo::new("tech", "Tech", "Developer-focused with code styling", 0.58),
            TemplateInfo::new("marketing", "Marketing", "Conversion-oriented with highlights", 0.74),
            TemplateInfo::new("news", "News", "Timely news-story layout", 0.55),
        ]
    }
}

/// A catalog backed by an explicit list, e.g. loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    templates: Vec<TemplateInfo>,
}

impl StaticCatalog {
    pub fn new(templates: Vec<TemplateInfo>) -> Self {
        Self { templates }
    }
}

impl TemplateCatalog for StaticCatalog {
    fn templates(&self) -> Vec<TemplateInfo> {
        self.templates.clone()
    }
}
