//! Click classification
//!
//! A click is delivered as the path from the clicked element up to the
//! container. Classification walks the path the way `Element.closest` does
//! and maps the first marker found to a [`ClickKind`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The parts of a DOM element that click classification looks at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ElementInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn href(&self) -> Option<&str> {
        self.attr("href")
    }

    fn matches(&self, marker: &Marker) -> bool {
        match marker {
            Marker::Class(class) => self.has_class(class),
            Marker::Attr(name) => self.attributes.contains_key(*name),
            Marker::ClassWithAttr(class, name) => {
                self.has_class(class) && self.attributes.contains_key(*name)
            }
        }
    }
}

/// Elements from the click target (first) up to the container (last)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClickPath(pub Vec<ElementInfo>);

impl ClickPath {
    pub fn new(elements: Vec<ElementInfo>) -> Self {
        Self(elements)
    }

    /// Nearest element (target included) matching any of `markers`
    fn closest(&self, markers: &[Marker]) -> Option<&ElementInfo> {
        self.0
            .iter()
            .find(|element| markers.iter().any(|m| element.matches(m)))
    }
}

impl From<Vec<ElementInfo>> for ClickPath {
    fn from(elements: Vec<ElementInfo>) -> Self {
        Self(elements)
    }
}

enum Marker {
    Class(&'static str),
    Attr(&'static str),
    ClassWithAttr(&'static str, &'static str),
}

const CONTACT: &[Marker] = &[Marker::Class("contact-link"), Marker::Attr("data-copy-email")];
const SOCIAL: &[Marker] = &[Marker::Class("social-link")];
const PROJECT_LIVE: &[Marker] = &[Marker::ClassWithAttr("project-live-link", "data-project-id")];
const PROJECT_CODE: &[Marker] = &[Marker::ClassWithAttr(
    "project-code-button",
    "data-project-id",
)];

/// Entity id used for social links without a `data-social` name
pub const SOCIAL_ENTITY: &str = "social";
/// Prefix of named social entity ids
pub const SOCIAL_ENTITY_PREFIX: &str = "social:";

/// Result of classifying a click
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClickKind {
    EmailCopy,
    Social { entity: String, href: String },
    ProjectLive { project_id: String, href: String },
    ProjectCode { project_id: String },
    Ignored,
}

impl ClickKind {
    pub fn classify(path: &ClickPath) -> Self {
        if path.closest(CONTACT).is_some() {
            return ClickKind::EmailCopy;
        }

        if let Some(link) = path.closest(SOCIAL) {
            let entity = match link.attr("data-social") {
                Some(name) if !name.is_empty() => format!("{SOCIAL_ENTITY_PREFIX}{name}"),
                _ => SOCIAL_ENTITY.to_string(),
            };
            return ClickKind::Social {
                entity,
                href: link.href().unwrap_or_default().to_string(),
            };
        }

        if let Some(link) = path.closest(PROJECT_LIVE) {
            if let Some(id) = link.attr("data-project-id").filter(|id| !id.is_empty()) {
                return ClickKind::ProjectLive {
                    project_id: id.to_string(),
                    href: link.href().unwrap_or_default().to_string(),
                };
            }
        }

        if let Some(button) = path.closest(PROJECT_CODE) {
            if let Some(id) = button.attr("data-project-id").filter(|id| !id.is_empty()) {
                return ClickKind::ProjectCode {
                    project_id: id.to_string(),
                };
            }
        }

        ClickKind::Ignored
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ClickKind::Ignored)
    }
}

/// Whether an entity id belongs to the social block
pub fn is_social_entity(id: &str) -> bool {
    id == SOCIAL_ENTITY || id.starts_with(SOCIAL_ENTITY_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn path(elements: Vec<ElementInfo>) -> ClickPath {
        ClickPath::new(elements)
    }

    #[test]
    fn test_contact_markers() {
        let by_class = path(vec![ElementInfo::new().with_class("contact-link")]);
        assert_eq!(ClickKind::classify(&by_class), ClickKind::EmailCopy);

        // Icon inside a copy button: the marker is on the parent.
        let by_attr = path(vec![
            ElementInfo::new().with_class("icon"),
            ElementInfo::new().with_attr("data-copy-email", ""),
        ]);
        assert_eq!(ClickKind::classify(&by_attr), ClickKind::EmailCopy);
    }

    #[test]
    fn test_social_entity_names() {
        let named = path(vec![ElementInfo::new()
            .with_class("social-link")
            .with_attr("data-social", "github")
            .with_attr("href", "https://github.com/alice")]);
        assert_eq!(
            ClickKind::classify(&named),
            ClickKind::Social {
                entity: "social:github".to_string(),
                href: "https://github.com/alice".to_string(),
            }
        );

        let unnamed = path(vec![ElementInfo::new().with_class("social-link")]);
        assert_eq!(
            ClickKind::classify(&unnamed),
            ClickKind::Social {
                entity: "social".to_string(),
                href: String::new(),
            }
        );
    }

    #[test]
    fn test_project_markers_need_id() {
        let live = path(vec![
            ElementInfo::new().with_class("label"),
            ElementInfo::new()
                .with_class("project-live-link")
                .with_attr("data-project-id", "atlas")
                .with_attr("href", "https://atlas.dev"),
        ]);
        assert_eq!(
            ClickKind::classify(&live),
            ClickKind::ProjectLive {
                project_id: "atlas".to_string(),
                href: "https://atlas.dev".to_string(),
            }
        );

        let code = path(vec![ElementInfo::new()
            .with_class("project-code-button")
            .with_attr("data-project-id", "beacon")]);
        assert_eq!(
            ClickKind::classify(&code),
            ClickKind::ProjectCode {
                project_id: "beacon".to_string()
            }
        );

        let missing_id = path(vec![ElementInfo::new().with_class("project-code-button")]);
        assert!(ClickKind::classify(&missing_id).is_ignored());
    }

    #[test]
    fn test_unmarked_click_ignored() {
        let plain = path(vec![
            ElementInfo::new().with_class("card"),
            ElementInfo::new().with_class("container"),
        ]);
        assert!(ClickKind::classify(&plain).is_ignored());
        assert!(ClickKind::classify(&ClickPath::default()).is_ignored());
    }

    #[test]
    fn test_click_path_deserializes_as_array() {
        let json = r#"[{"classes":["social-link"],"attributes":{"data-social":"x"}},{}]"#;
        let parsed: ClickPath = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.0.len(), 2);
        assert!(parsed.0[0].has_class("social-link"));
        assert_eq!(parsed.0[1], ElementInfo::default());
    }

    #[test]
    fn test_social_entity_detection() {
        assert!(is_social_entity("social"));
        assert!(is_social_entity("social:github"));
        assert!(!is_social_entity("socialite"));
        assert!(!is_social_entity("atlas"));
    }
}
