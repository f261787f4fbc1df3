//! Launch context: role and panel parameters the bot puts on the app URL
//!
//! The bot opens the mini app with `?role=<role>&panels=<a,b,c>` and
//! optionally `lecture_id=<n>`. Panels a role is not entitled to are dropped;
//! an unknown or missing role falls back to `student`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
    #[error("Invalid launch URL: {0}")]
    InvalidUrl(String),
}

/// UI sections of the mini app
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Student,
    Speaker,
    Admin,
}

impl Panel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Panel::Student => "student",
            Panel::Speaker => "speaker",
            Panel::Admin => "admin",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Panel::Student),
            "speaker" => Some(Panel::Speaker),
            "admin" => Some(Panel::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Panel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role parameter as assigned by the bot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchRole {
    #[default]
    Student,
    Speaker,
    Admin,
    Rating,
}

impl LaunchRole {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(LaunchRole::Student),
            "speaker" => Some(LaunchRole::Speaker),
            "admin" => Some(LaunchRole::Admin),
            "rating" => Some(LaunchRole::Rating),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchRole::Student => "student",
            LaunchRole::Speaker => "speaker",
            LaunchRole::Admin => "admin",
            LaunchRole::Rating => "rating",
        }
    }

    /// Panels this role may open, in display order
    pub fn allowed_panels(&self) -> &'static [Panel] {
        match self {
            LaunchRole::Student | LaunchRole::Rating => &[Panel::Student],
            LaunchRole::Speaker => &[Panel::Student, Panel::Speaker],
            LaunchRole::Admin => &[Panel::Student, Panel::Speaker, Panel::Admin],
        }
    }
}

impl fmt::Display for LaunchRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed launch parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchContext {
    role: LaunchRole,
    panels: Vec<Panel>,
    lecture_id: Option<u64>,
}

impl Default for LaunchContext {
    fn default() -> Self {
        Self::for_role(LaunchRole::Student)
    }
}

impl LaunchContext {
    /// Context with the role's default panels and no lecture
    pub fn for_role(role: LaunchRole) -> Self {
        Self {
            role,
            panels: role.allowed_panels().to_vec(),
            lecture_id: None,
        }
    }

    pub fn with_lecture(mut self, lecture_id: u64) -> Self {
        self.lecture_id = Some(lecture_id).filter(|id| *id > 0);
        self
    }

    /// Parse a query string, with or without the leading `?`
    pub fn from_query(query: &str) -> Self {
        let query = query.trim_start_matches('?');

        let mut role_param = None;
        let mut panels_param = None;
        let mut lecture_param = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "role" => role_param = Some(value.into_owned()),
                "panels" => panels_param = Some(value.into_owned()),
                "lecture_id" | "lectureId" => lecture_param = Some(value.into_owned()),
                _ => {}
            }
        }

        let role = match role_param.as_deref() {
            None => LaunchRole::Student,
            Some(raw) => LaunchRole::parse(raw).unwrap_or_else(|| {
                warn!("Unknown launch role {:?}, falling back to student", raw);
                LaunchRole::Student
            }),
        };

        let allowed = role.allowed_panels();
        let mut panels: Vec<Panel> = Vec::new();
        if let Some(raw) = panels_param.as_deref() {
            for panel in raw.split(',').filter_map(Panel::parse) {
                if allowed.contains(&panel) && !panels.contains(&panel) {
                    panels.push(panel);
                }
            }
        }
        if panels.is_empty() {
            panels = allowed.to_vec();
        }

        let lecture_id = lecture_param
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|id| *id > 0);

        Self {
            role,
            panels,
            lecture_id,
        }
    }

    /// Parse the full page URL
    pub fn from_url(raw: &str) -> Result<Self, LaunchError> {
        let url = url::Url::parse(raw).map_err(|e| LaunchError::InvalidUrl(e.to_string()))?;
        Ok(Self::from_query(url.query().unwrap_or("")))
    }

    pub fn role(&self) -> LaunchRole {
        self.role
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    pub fn lecture_id(&self) -> Option<u64> {
        self.lecture_id
    }

    pub fn allows(&self, panel: Panel) -> bool {
        self.panels.contains(&panel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_query_defaults_to_student() {
        let ctx = LaunchContext::from_query("");
        assert_eq!(ctx.role(), LaunchRole::Student);
        assert_eq!(ctx.panels(), &[Panel::Student]);
        assert_eq!(ctx.lecture_id(), None);
    }

    #[test]
    fn test_percent_encoded_panels() {
        let ctx = LaunchContext::from_query("?role=admin&panels=student%2Cspeaker%2Cadmin");
        assert_eq!(ctx.role(), LaunchRole::Admin);
        assert_eq!(ctx.panels(), &[Panel::Student, Panel::Speaker, Panel::Admin]);
    }

    #[test]
    fn test_panels_outside_role_are_dropped() {
        let ctx = LaunchContext::from_query("role=speaker&panels=student,admin,speaker");
        assert_eq!(ctx.panels(), &[Panel::Student, Panel::Speaker]);
        assert!(!ctx.allows(Panel::Admin));
    }

    #[test]
    fn test_rating_role_gets_student_panel() {
        let ctx = LaunchContext::from_query("role=rating");
        assert_eq!(ctx.role(), LaunchRole::Rating);
        assert_eq!(ctx.panels(), &[Panel::Student]);
    }

    #[test]
    fn test_unknown_role_falls_back() {
        let ctx = LaunchContext::from_query("role=superuser&panels=admin");
        assert_eq!(ctx.role(), LaunchRole::Student);
        assert_eq!(ctx.panels(), &[Panel::Student]);
    }

    #[test]
    fn test_lecture_id_parsing() {
        assert_eq!(
            LaunchContext::from_query("lecture_id=42").lecture_id(),
            Some(42)
        );
        assert_eq!(LaunchContext::from_query("lectureId=7").lecture_id(), Some(7));
        assert_eq!(LaunchContext::from_query("lecture_id=0").lecture_id(), None);
        assert_eq!(LaunchContext::from_query("lecture_id=abc").lecture_id(), None);
    }

    #[test]
    fn test_from_url() {
        let ctx =
            LaunchContext::from_url("https://example.github.io/app/?role=speaker&panels=student%2Cspeaker")
                .unwrap();
        assert_eq!(ctx.role(), LaunchRole::Speaker);
        assert!(ctx.allows(Panel::Speaker));

        assert!(LaunchContext::from_url("not a url").is_err());
    }

    proptest! {
        #[test]
        fn prop_panels_always_within_role(role in "[a-z]{0,8}", panels in "[a-z,]{0,24}") {
            let ctx = LaunchContext::from_query(&format!("role={}&panels={}", role, panels));
            let allowed = ctx.role().allowed_panels();
            prop_assert!(!ctx.panels().is_empty());
            prop_assert!(ctx.panels().iter().all(|p| allowed.contains(p)));
        }
    }
}
