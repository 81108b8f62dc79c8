//! Match profile text format.
//!
//! ```text
//! # IMAGE MATCH DATA
//!
//! [localization]
//! backend = feature
//! ransac_reproj_threshold = <value='3.0' min='0.0' max='200.0' delta='10.0' tolerance='1.0' fixed='False'>
//! ```
//!
//! One section per category, a mandatory `backend` key naming the active
//! algorithm, then one line per parameter. Sections missing from the text
//! keep their defaults. Blank lines and lines starting with `#` or `;` are
//! ignored. Keys are case-sensitive.

use crate::equalizer::{Category, Equalizer, Parameter};
use crate::trace::trace_event;
use crate::util::{LocateError, LocateResult};
use std::fmt::Write as _;

/// Comment line written at the top of every profile.
pub const PROFILE_HEADER: &str = "# IMAGE MATCH DATA";

const BACKEND_KEY: &str = "backend";

struct Section<'a> {
    category: Category,
    line: usize,
    backend: Option<&'a str>,
    entries: Vec<(usize, &'a str, &'a str)>,
}

impl Equalizer {
    /// Renders the full registry as match profile text.
    pub fn to_profile(&self) -> String {
        let mut out = String::new();
        out.push_str(PROFILE_HEADER);
        out.push('\n');
        for category in Category::ALL {
            let _ = write!(
                out,
                "\n[{}]\n{} = {}\n",
                category.key(),
                BACKEND_KEY,
                self.active(category)
            );
            for (name, param) in self.parameters(category) {
                let _ = writeln!(out, "{name} = {param}");
            }
        }
        out
    }

    /// Parses match profile text into a new equalizer.
    pub fn from_profile(text: &str) -> LocateResult<Self> {
        let sections = split_sections(text)?;
        let mut eq = Equalizer::new();
        for section in sections {
            section.apply(&mut eq)?;
        }
        trace_event!("profile_loaded", backend = eq.active(Category::Localization));
        Ok(eq)
    }
}

fn split_sections(text: &str) -> LocateResult<Vec<Section<'_>>> {
    let mut sections: Vec<Section<'_>> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let category: Category = name
                .trim()
                .parse()
                .map_err(|err: LocateError| err.at_line(line_no))?;
            if sections.iter().any(|s| s.category == category) {
                return Err(LocateError::MalformedConfig {
                    line: line_no,
                    reason: format!("duplicate section [{category}]"),
                });
            }
            sections.push(Section {
                category,
                line: line_no,
                backend: None,
                entries: Vec::new(),
            });
            continue;
        }

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| LocateError::MalformedConfig {
                line: line_no,
                reason: format!("expected 'key = value', got '{line}'"),
            })?;
        let (key, value) = (key.trim(), value.trim());
        let section = sections
            .last_mut()
            .ok_or_else(|| LocateError::MalformedConfig {
                line: line_no,
                reason: format!("key '{key}' appears before any section"),
            })?;
        if key == BACKEND_KEY {
            section.backend = Some(value);
        } else {
            section.entries.push((line_no, key, value));
        }
    }
    Ok(sections)
}

impl Section<'_> {
    fn apply(self, eq: &mut Equalizer) -> LocateResult<()> {
        let backend = self.backend.ok_or_else(|| LocateError::MalformedConfig {
            line: self.line,
            reason: format!("section [{}] has no '{BACKEND_KEY}' key", self.category),
        })?;
        eq.select(self.category, backend)?;

        for (line_no, key, value) in self.entries {
            let param: Parameter = value.parse().map_err(|err: LocateError| err.at_line(line_no))?;
            eq.replace_parameter(self.category, key, param)
                .map_err(|err| match err {
                    LocateError::UnknownParameter { category, name } => {
                        LocateError::MalformedConfig {
                            line: line_no,
                            reason: format!("unknown parameter '{name}' in [{category}]"),
                        }
                    }
                    other => other.for_parameter(key),
                })?;
        }
        Ok(())
    }
}
