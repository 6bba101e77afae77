//! Resource name filtering
//!
//! A pattern containing glob metacharacters is matched as a glob against the
//! whole resource name; anything else is a substring test. Both ignore case.

use glob::Pattern;
use tracing::warn;

/// Resource name filter, built once per run
#[derive(Debug, Clone, Default)]
pub enum NameFilter {
    #[default]
    All,
    Glob(Pattern),
    Substring(String),
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

impl NameFilter {
    /// Build a filter; empty or whitespace-only input matches everything
    pub fn parse(pattern: Option<&str>) -> Self {
        let Some(pattern) = pattern.map(str::trim).filter(|p| !p.is_empty()) else {
            return NameFilter::All;
        };
        let lowered = pattern.to_lowercase();

        if is_glob(&lowered) {
            match Pattern::new(&lowered) {
                Ok(glob) => return NameFilter::Glob(glob),
                Err(error) => warn!(
                    pattern = %pattern,
                    error = %error,
                    "Invalid glob filter, falling back to substring match"
                ),
            }
        }
        NameFilter::Substring(lowered)
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::All => true,
            NameFilter::Glob(glob) => glob.matches(&name.to_lowercase()),
            NameFilter::Substring(needle) => name.to_lowercase().contains(needle.as_str()),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, NameFilter::All)
    }
}
