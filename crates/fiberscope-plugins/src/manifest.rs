//! Descriptions plugins publish to the panel shell.

use serde::{Deserialize, Serialize};

/// A panel view contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginView {
    /// Tab title shown in the panel shell.
    pub title: String,
    /// Optional icon asset path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Document the shell embeds for this view.
    pub src: String,
}

impl PluginView {
    /// Describes a view.
    pub fn new(title: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            icon: None,
            src: src.into(),
        }
    }

    /// Attaches an icon asset path.
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// What a plugin contributes, as reported to the panel shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Human-readable plugin name.
    pub name: String,
    /// Panel view, when the plugin contributes one. Headless plugins only
    /// contribute methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<PluginView>,
}

impl PluginManifest {
    /// Describes a headless plugin.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            view: None,
        }
    }

    /// Attaches a panel view.
    #[must_use]
    pub fn with_view(mut self, view: PluginView) -> Self {
        self.view = Some(view);
        self
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn serialises_without_absent_fields() {
        let manifest = PluginManifest::new("React Scan");
        let json = serde_json::to_value(&manifest).expect("serialise failed");
        assert_eq!(json, serde_json::json!({"name": "React Scan"}));
    }

    #[rstest]
    fn round_trips_a_full_manifest() {
        let manifest = PluginManifest::new("React Scan").with_view(
            PluginView::new("Scan", "plugins/react-scan/panel.html").with_icon("scan.svg"),
        );
        let json = serde_json::to_string(&manifest).expect("serialise failed");
        let back: PluginManifest = serde_json::from_str(&json).expect("deserialise failed");
        assert_eq!(back, manifest);
    }
}
