//! Element locators and observed element state

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum characters of outer HTML kept in an [`ElementState`]
pub const HTML_SNIPPET_LIMIT: usize = 300;

/// Identifies DOM elements for a query
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    /// CSS selector, e.g. `div[data-testid='calendar-input']`
    Css { selector: String },

    /// `data-testid` attribute value
    TestId { id: String },

    /// ARIA role with optional exact accessible name
    Role { role: String, name: Option<String> },
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css {
            selector: selector.into(),
        }
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Locator::TestId { id: id.into() }
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: Some(name.into()),
        }
    }

}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { selector } => write!(f, "locator({})", selector),
            Locator::TestId { id } => write!(f, "getByTestId({})", id),
            Locator::Role { role, name: Some(name) } => {
                write!(f, "getByRole({}, name={:?})", role, name)
            }
            Locator::Role { role, name: None } => write!(f, "getByRole({})", role),
        }
    }
}

/// Snapshot of what a locator matched at one instant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    /// Number of matching elements
    pub count: usize,

    /// Whether the first match is visible
    pub visible: bool,

    /// Outer HTML of the first match, truncated
    #[serde(default)]
    pub html: Option<String>,
}

impl ElementState {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn visible(html: impl Into<String>) -> Self {
        Self {
            count: 1,
            visible: true,
            html: Some(truncate_html(html.into())),
        }
    }

    pub fn hidden(html: impl Into<String>) -> Self {
        Self {
            count: 1,
            visible: false,
            html: Some(truncate_html(html.into())),
        }
    }

    pub fn is_present(&self) -> bool {
        self.count > 0
    }

    /// More than one match: single-element assertions refuse to pick one
    pub fn is_ambiguous(&self) -> bool {
        self.count > 1
    }

    /// Exactly one match and it is visible
    pub fn is_visible(&self) -> bool {
        self.count == 1 && self.visible
    }

    /// Absent elements count as hidden
    pub fn is_hidden(&self) -> bool {
        !self.is_present() || (!self.is_ambiguous() && !self.visible)
    }

    /// Apply the snippet limit to HTML reported by a browser driver
    pub(crate) fn truncated(mut self) -> Self {
        self.html = self.html.map(truncate_html);
        self
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_present() {
            return write!(f, "no matching element");
        }
        if self.is_ambiguous() {
            write!(f, "{} matches (strict mode)", self.count)?;
            if let Some(html) = &self.html {
                write!(f, ", first: {}", html)?;
            }
            return Ok(());
        }
        write!(
            f,
            "{} match(es), first {}",
            self.count,
            if self.visible { "visible" } else { "hidden" }
        )?;
        if let Some(html) = &self.html {
            write!(f, ": {}", html)?;
        }
        Ok(())
    }
}

fn truncate_html(mut html: String) -> String {
    if html.chars().count() > HTML_SNIPPET_LIMIT {
        html = html.chars().take(HTML_SNIPPET_LIMIT).collect();
        html.push('…');
    }
    html
}
