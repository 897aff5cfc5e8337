//! Search field detection and query filtering

use crate::host::InputField;

/// Marker looked for in an input's `name` or `id`
const SEARCH_MARKER: &str = "search";

/// Whether an input looks like a search box
///
/// Matches `type="search"`, or a `name`/`id` containing `search`.
pub fn is_search_field(field: &InputField) -> bool {
    field.input_type.eq_ignore_ascii_case("search")
        || field.name.contains(SEARCH_MARKER)
        || field.id.contains(SEARCH_MARKER)
}

/// The trimmed query if it is long enough to report
pub fn settled_query(value: &str, min_chars: usize) -> Option<String> {
    let query = value.trim();
    if query.chars().count() >= min_chars {
        Some(query.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(input_type: &str, name: &str, id: &str) -> InputField {
        InputField {
            key: "f".to_string(),
            input_type: input_type.to_string(),
            name: name.to_string(),
            id: id.to_string(),
        }
    }

    #[test]
    fn test_search_field_heuristic() {
        assert!(is_search_field(&field("search", "", "")));
        assert!(is_search_field(&field("SEARCH", "", "")));
        assert!(is_search_field(&field("text", "site_search", "")));
        assert!(is_search_field(&field("text", "", "header-search-box")));
        assert!(!is_search_field(&field("text", "email", "email")));
        assert!(!is_search_field(&field("text", "", "Search")));
    }

    #[test]
    fn test_settled_query_threshold() {
        assert_eq!(settled_query("ab", 3), None);
        assert_eq!(settled_query("  ab  ", 3), None);
        assert_eq!(settled_query("abc", 3).as_deref(), Some("abc"));
        assert_eq!(settled_query("  red shoes ", 3).as_deref(), Some("red shoes"));
        assert_eq!(settled_query("", 3), None);
    }

    #[test]
    fn test_settled_query_counts_characters() {
        assert_eq!(settled_query("né", 3), None);
        assert_eq!(settled_query("café", 3).as_deref(), Some("café"));
    }
}
