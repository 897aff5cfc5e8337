//! Form submission description

use serde::{Deserialize, Serialize};

use crate::types::FormSubmitted;

/// Form identifier used when a form has neither id nor class
pub const UNKNOWN_FORM_ID: &str = "unknown";

/// A submitted `<form>` as seen at submit time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSubmission {
    pub id: String,
    pub class_name: String,
    /// `action` attribute; empty when the form posts back to the page
    pub action: String,
    /// Number of entries in the submitted form data
    pub field_count: usize,
}

impl FormSubmission {
    /// Describe the submission; `page_url` stands in for a missing action
    pub fn describe(&self, page_url: &str) -> FormSubmitted {
        let form_id = [self.id.as_str(), self.class_name.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_FORM_ID);

        let form_action = if self.action.is_empty() {
            page_url
        } else {
            self.action.as_str()
        };

        FormSubmitted {
            form_id: form_id.to_string(),
            form_action: form_action.to_string(),
            field_count: self.field_count,
        }
    }
}
