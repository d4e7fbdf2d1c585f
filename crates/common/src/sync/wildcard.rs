use regex::Regex;

use crate::path::{Path, SEPARATOR, WILDCARD};

/// A compiled `GetObject` id
///
/// The base is everything before the first `*`; the pattern matches whole
///  paths, each `*` standing for exactly one segment.
#[derive(Debug, Clone)]
pub struct PathPattern {
    base: Path,
    regex: Regex,
}

impl PathPattern {
    pub fn compile(id: &Path) -> Result<Self, regex::Error> {
        let separator = SEPARATOR.to_string();
        let escaped_separator = regex::escape(&separator);
        let base = Path::new(
            id.segments()
                .take_while(|segment| *segment != WILDCARD)
                .collect::<Vec<_>>()
                .join(separator.as_str()),
        );
        let body = id
            .segments()
            .map(|segment| {
                if segment == WILDCARD {
                    format!("[^{}]+", escaped_separator)
                } else {
                    regex::escape(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(escaped_separator.as_str());
        let regex = Regex::new(&format!("^{}$", body))?;
        Ok(Self { base, regex })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.regex.is_match(path.as_str())
    }
}
