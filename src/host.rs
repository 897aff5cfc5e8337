//! Page host capability
//!
//! The observer never reaches for ambient browser globals. Everything it
//! reads about the page (location, title, referrer, geometry, cookies, input
//! fields) comes through [`PageHost`], which an embedding supplies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Width and height in CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// An `<input>` element present in the document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    /// Stable key the host uses when dispatching input signals for this field
    pub key: String,
    /// The `type` attribute (`text`, `search`, ...)
    #[serde(default)]
    pub input_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
}

/// Read access to the page the observer is attached to
pub trait PageHost: Send + Sync {
    /// Full current URL (`location.href`)
    fn location_href(&self) -> String;

    fn title(&self) -> String;

    fn referrer(&self) -> String;

    fn screen_size(&self) -> Dimensions;

    fn viewport_size(&self) -> Dimensions;

    /// Raw cookie string (`document.cookie`)
    fn cookie(&self) -> String;

    /// Input fields present in the document right now
    fn input_fields(&self) -> Vec<InputField>;

    /// Path component of the current URL
    fn pathname(&self) -> String {
        pathname_of(&self.location_href())
    }

    /// Value of the named cookie, or an empty string
    fn cookie_value(&self, name: &str) -> String {
        cookie_value(&self.cookie(), name).unwrap_or_default()
    }
}

/// Extract the path from an absolute or root-relative URL
pub fn pathname_of(href: &str) -> String {
    match url::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => {
            let end = href.find(['?', '#']).unwrap_or(href.len());
            let path = &href[..end];
            if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            }
        }
    }
}

/// Find a cookie by name in a `name=value; name2=value2` string
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// A fixed description of a page, used for recordings, the CLI and FFI hosts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub href: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub referrer: String,
    #[serde(default)]
    pub screen: Dimensions,
    #[serde(default)]
    pub viewport: Dimensions,
    #[serde(default)]
    pub cookie: String,
    #[serde(default)]
    pub input_fields: Vec<InputField>,
}

impl PageSnapshot {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = referrer.into();
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = Dimensions::new(width, height);
        self
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.viewport = Dimensions::new(width, height);
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    pub fn with_input_field(mut self, field: InputField) -> Self {
        self.input_fields.push(field);
        self
    }
}

impl PageHost for PageSnapshot {
    fn location_href(&self) -> String {
        self.href.clone()
    }

    fn title(&self) -> String {
        self.title.clone()
    }

    fn referrer(&self) -> String {
        self.referrer.clone()
    }

    fn screen_size(&self) -> Dimensions {
        self.screen
    }

    fn viewport_size(&self) -> Dimensions {
        self.viewport
    }

    fn cookie(&self) -> String {
        self.cookie.clone()
    }

    fn input_fields(&self) -> Vec<InputField> {
        self.input_fields.clone()
    }
}
