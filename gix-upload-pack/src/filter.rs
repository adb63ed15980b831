//! Partial-clone filter specifications.
//!
//! A `FilterSpec` is a pair of bounds `(blob_limit, tree_depth_limit)` where
//! `-1` means "unconstrained" and any other value is an active bound. The
//! wire grammar is `blob:none | blob:limit=<u64> | tree:<u64> | combine:<f>(+<f>)*`.

use std::fmt;

/// Blob/tree filter bounds negotiated for `uploadpack.allowFilter`.
///
/// `-1` in either field means that dimension is unconstrained; `NO_FILTER`
/// has both fields unconstrained and never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    pub blob_limit: i64,
    pub tree_depth_limit: i64,
}

/// The sentinel spec meaning "no filtering at all".
pub const NO_FILTER: FilterSpec = FilterSpec {
    blob_limit: -1,
    tree_depth_limit: -1,
};

/// Error returned when a filter-line fails to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFilter(pub String);

impl fmt::Display for InvalidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid filter: {}", self.0)
    }
}

impl std::error::Error for InvalidFilter {}

impl FilterSpec {
    /// Parse a filter-line value (the part after `filter `), per the grammar
    /// `blob:none | blob:limit=<u64> | tree:<u64> | combine:<f>(+<f>)*`.
    pub fn from_filter_line(s: &str) -> Result<Self, InvalidFilter> {
        let body = s.strip_prefix("combine:").unwrap_or(s);
        let mut spec = NO_FILTER;

        for component in body.split('+') {
            if component == "blob:none" {
                spec.blob_limit = 0;
            } else if let Some(value) = component.strip_prefix("blob:limit=") {
                spec.blob_limit = value
                    .parse::<u64>()
                    .map_err(|_| InvalidFilter(s.to_string()))? as i64;
            } else if let Some(value) = component.strip_prefix("tree:") {
                spec.tree_depth_limit = value
                    .parse::<u64>()
                    .map_err(|_| InvalidFilter(s.to_string()))? as i64;
            } else {
                return Err(InvalidFilter(s.to_string()));
            }
        }

        Ok(spec)
    }

    /// Render this spec back to its wire `filter <line>` form, or `None` for [`NO_FILTER`].
    pub fn filter_line(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.blob_limit == 0 {
            parts.push("blob:none".to_string());
        } else if self.blob_limit > 0 {
            parts.push(format!("blob:limit={}", self.blob_limit));
        }
        if self.tree_depth_limit >= 0 {
            parts.push(format!("tree:{}", self.tree_depth_limit));
        }

        match parts.len() {
            0 => None,
            1 => Some(parts.remove(0)),
            _ => Some(format!("combine:{}", parts.join("+"))),
        }
    }

    /// Whether this is the unconstrained sentinel.
    pub fn is_no_filter(&self) -> bool {
        *self == NO_FILTER
    }

    /// Whether an object of the given kind passes this filter's blob bound.
    ///
    /// Tree-depth bounding requires traversal context and is applied by the
    /// caller during tree walking; this only covers the blob dimension.
    pub fn allows_blob(&self, blob_size: Option<u64>) -> bool {
        match self.blob_limit {
            -1 => true,
            0 => false,
            limit => blob_size.map(|size| size <= limit as u64).unwrap_or(true),
        }
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        NO_FILTER
    }
}
