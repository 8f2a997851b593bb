//! Types shared by session drivers.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Portal login credentials.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Selector {
    Css(String),
    Id(String),
}

impl Selector {
    /// Parse a configured selector: `#name` with no other CSS syntax is an
    /// element id, anything else is CSS.
    pub fn parse(value: &str) -> Self {
        match value.strip_prefix('#') {
            Some(id) if !id.contains([' ', '.', '[', ':', '>', ',']) => Selector::Id(id.to_string()),
            _ => Selector::Css(value.to_string()),
        }
    }

    /// CSS form of the selector.
    pub fn to_css(&self) -> String {
        match self {
            Selector::Css(css) => css.clone(),
            Selector::Id(id) => format!("[id='{}']", id),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "css:{}", css),
            Selector::Id(id) => write!(f, "id:{}", id),
        }
    }
}

/// Opaque reference to a located element, valid within its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub id: String,
    pub selector: Selector,
}

/// Something to wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    ElementPresent(Selector),
    UrlContains(String),
    /// Any of the given fragments appears in the page (case-insensitive).
    PageContainsAny(Vec<String>),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ElementPresent(selector) => write!(f, "element {}", selector),
            Condition::UrlContains(fragment) => write!(f, "url containing '{}'", fragment),
            Condition::PageContainsAny(fragments) => {
                write!(f, "page containing any of {:?}", fragments)
            }
        }
    }
}

/// Interaction with a located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    /// Click a link that opens a new window and switch to it.
    FollowLink,
    Clear,
    Type(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::FollowLink => "follow_link",
            Action::Clear => "clear",
            Action::Type(_) => "type",
        }
    }
}

/// Parameters for triggering an artifact download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Control that starts the download.
    pub control: Selector,
    /// Where the artifact must be written.
    pub destination: PathBuf,
    /// How long to wait for the artifact to become available.
    pub timeout: Duration,
}

/// Diagnostic state captured from a session.
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: Option<String>,
    pub title: Option<String>,
    pub page_source: Option<String>,
    /// PNG screenshot bytes.
    pub screenshot: Option<Vec<u8>>,
}

/// Failure snapshot written to the diagnostics directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticSnapshot {
    pub case_number: String,
    pub step: String,
    pub error: String,
    pub captured_at: DateTime<Utc>,
    pub url: Option<String>,
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_source: Option<String>,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
}

impl DiagnosticSnapshot {
    pub fn new(
        case_number: impl Into<String>,
        step: impl Into<String>,
        error: impl Into<String>,
        page: PageState,
    ) -> Self {
        Self {
            case_number: case_number.into(),
            step: step.into(),
            error: error.into(),
            captured_at: Utc::now(),
            url: page.url,
            title: page.title,
            page_source: page.page_source,
            screenshot: page.screenshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parse() {
        assert_eq!(Selector::parse("#username"), Selector::Id("username".into()));
        assert_eq!(
            Selector::parse("#a.b"),
            Selector::Css("#a.b".into())
        );
        assert_eq!(
            Selector::parse("input[type='submit']"),
            Selector::Css("input[type='submit']".into())
        );
    }

    #[test]
    fn test_selector_to_css() {
        assert_eq!(Selector::Id("x:y".into()).to_css(), "[id='x:y']");
        assert_eq!(Selector::Css("a.b".into()).to_css(), "a.b");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "clerk".into(),
            password: "secret".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("clerk"));
        assert!(!debug.contains("secret"));
    }
}
