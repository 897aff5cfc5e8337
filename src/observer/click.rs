//! Click classification and labelling
//!
//! Rules are checked in a fixed order and the first match wins, so an
//! element matching several rules (a `<button class="btn">`, an
//! `<a role="button">`) always gets the label of the earliest rule.

use serde::{Deserialize, Serialize};

/// The element a click landed on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickTarget {
    /// Tag name, e.g. `BUTTON` or `a`
    pub tag_name: String,
    /// `type` attribute, relevant for `<input>`
    pub input_type: String,
    /// Raw text content (untrimmed)
    pub text_content: String,
    pub value: String,
    pub href: String,
    pub id: String,
    /// Space-separated class list
    pub class_name: String,
    pub role: String,
}

impl ClickTarget {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text_content = text.into();
        self
    }

    pub fn with_type(mut self, input_type: impl Into<String>) -> Self {
        self.input_type = input_type.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = href.into();
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    fn has_class(&self, class: &str) -> bool {
        self.class_name.split_whitespace().any(|c| c == class)
    }

    fn trimmed_text(&self) -> &str {
        self.text_content.trim()
    }
}

/// Which rule matched a click target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickCategory {
    /// `<button>`
    Button,
    /// `<a>`
    Link,
    /// anything with `type="submit"`
    Submit,
    /// class `btn` or `role="button"`
    Clickable,
}

impl ClickCategory {
    /// Classify a target; `None` for plain content
    pub fn classify(target: &ClickTarget) -> Option<Self> {
        if target.tag_name.eq_ignore_ascii_case("button") {
            Some(ClickCategory::Button)
        } else if target.tag_name.eq_ignore_ascii_case("a") {
            Some(ClickCategory::Link)
        } else if target.input_type.eq_ignore_ascii_case("submit") {
            Some(ClickCategory::Submit)
        } else if target.has_class("btn") || target.role == "button" {
            Some(ClickCategory::Clickable)
        } else {
            None
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ClickCategory::Button => "Button",
            ClickCategory::Link => "Link",
            ClickCategory::Submit => "Submit",
            ClickCategory::Clickable => "Element",
        }
    }

    /// Label text for a target in this category
    fn label<'a>(&self, target: &'a ClickTarget) -> &'a str {
        match self {
            ClickCategory::Button => first_non_empty(&[
                target.trimmed_text(),
                target.value.as_str(),
                target.id.as_str(),
            ]),
            ClickCategory::Link => {
                first_non_empty(&[target.trimmed_text(), target.href.as_str()])
            }
            ClickCategory::Submit => {
                first_non_empty(&[target.value.as_str(), target.trimmed_text()])
            }
            ClickCategory::Clickable => {
                first_non_empty(&[target.trimmed_text(), target.class_name.as_str()])
            }
        }
    }
}

/// Human-readable description such as `Button: Save`, or `None` when the
/// target is not a recognised control
pub fn describe_click(target: &ClickTarget) -> Option<String> {
    let category = ClickCategory::classify(target)?;
    Some(format!("{}: {}", category.prefix(), category.label(target)))
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> &'a str {
    candidates
        .iter()
        .copied()
        .find(|c| !c.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_label() {
        let target = ClickTarget::new("BUTTON").with_text("  Save \n");
        assert_eq!(describe_click(&target).as_deref(), Some("Button: Save"));
    }

    #[test]
    fn test_button_falls_back_to_value_then_id() {
        let target = ClickTarget::new("BUTTON").with_value("go").with_id("submit-btn");
        assert_eq!(describe_click(&target).as_deref(), Some("Button: go"));

        let target = ClickTarget::new("button").with_text("   ").with_id("submit-btn");
        assert_eq!(describe_click(&target).as_deref(), Some("Button: submit-btn"));
    }

    #[test]
    fn test_button_without_any_label_still_reported() {
        let target = ClickTarget::new("BUTTON");
        assert_eq!(describe_click(&target).as_deref(), Some("Button: "));
    }

    #[test]
    fn test_link_label() {
        let target = ClickTarget::new("A")
            .with_text("Pricing")
            .with_href("https://shop.test/pricing/");
        assert_eq!(describe_click(&target).as_deref(), Some("Link: Pricing"));

        let icon_link = ClickTarget::new("A").with_href("https://shop.test/cart/");
        assert_eq!(
            describe_click(&icon_link).as_deref(),
            Some("Link: https://shop.test/cart/")
        );
    }

    #[test]
    fn test_submit_prefers_value() {
        let target = ClickTarget::new("INPUT")
            .with_type("submit")
            .with_value("Sign in")
            .with_text("ignored");
        assert_eq!(describe_click(&target).as_deref(), Some("Submit: Sign in"));
    }

    #[test]
    fn test_generic_clickable() {
        let by_class = ClickTarget::new("DIV").with_class("card btn btn-primary");
        assert_eq!(
            describe_click(&by_class).as_deref(),
            Some("Element: card btn btn-primary")
        );

        let by_role = ClickTarget::new("SPAN").with_role("button").with_text("Close");
        assert_eq!(describe_click(&by_role).as_deref(), Some("Element: Close"));
    }

    #[test]
    fn test_btn_must_be_a_whole_class() {
        let target = ClickTarget::new("DIV").with_class("btn-group");
        assert_eq!(describe_click(&target), None);
    }

    #[test]
    fn test_plain_content_not_reported() {
        let target = ClickTarget::new("P").with_text("Some paragraph");
        assert_eq!(describe_click(&target), None);
        assert_eq!(ClickCategory::classify(&target), None);
    }

    #[test]
    fn test_precedence_order() {
        // A <button type="submit" class="btn"> matches three rules
        let button = ClickTarget::new("BUTTON")
            .with_type("submit")
            .with_class("btn")
            .with_text("Pay");
        assert_eq!(ClickCategory::classify(&button), Some(ClickCategory::Button));
        assert_eq!(describe_click(&button).as_deref(), Some("Button: Pay"));

        // A link styled as a button stays a link
        let link = ClickTarget::new("A").with_role("button").with_text("Next");
        assert_eq!(describe_click(&link).as_deref(), Some("Link: Next"));

        // An input submit with the btn class is a submit
        let input = ClickTarget::new("INPUT")
            .with_type("submit")
            .with_class("btn")
            .with_value("Send");
        assert_eq!(describe_click(&input).as_deref(), Some("Submit: Send"));
    }
}
