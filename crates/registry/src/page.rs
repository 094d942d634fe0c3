//! Paged listing responses and query filters.

use itertools::Itertools;
use serde::Deserialize;

/// One page of a registry listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Continuation token; absent or empty on the last page.
    #[serde(default)]
    pub token: Option<String>,
}

impl<T> Page<T> {
    /// Token for the next page, if there is one.
    pub fn next_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Render an `in` filter over string values.
///
/// Single quotes inside values are doubled.
pub fn field_in(field: &str, values: &[String]) -> String {
    let list = values
        .iter()
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .join(",");
    format!("{field} in ({list})")
}
