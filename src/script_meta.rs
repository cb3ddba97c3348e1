//! Metadata pulled from a UV script's header, for documentation only

use std::sync::OnceLock;

use regex::Regex;

/// What the README needs to know about a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptMeta {
    pub dependencies: Vec<String>,
    pub description: Option<String>,
}

impl ScriptMeta {
    pub fn extract(source: &str) -> Self {
        Self {
            dependencies: extract_dependencies(source),
            description: extract_description(source),
        }
    }
}

fn quoted() -> &'static Regex {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    QUOTED.get_or_init(|| Regex::new(r#""([^"]+)""#).expect("valid regex"))
}

fn docstring() -> &'static Regex {
    static DOCSTRING: OnceLock<Regex> = OnceLock::new();
    DOCSTRING.get_or_init(|| Regex::new(r#"(?s)"""(.*?)""""#).expect("valid regex"))
}

/// Quoted entries of the first `dependencies = [...]` list, in order
pub fn extract_dependencies(source: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut lines = source.lines();

    for line in lines.by_ref() {
        if let Some(idx) = line.find("dependencies = [") {
            let rest = &line[idx + "dependencies = [".len()..];
            // Single-line list: `dependencies = ["a", "b"]`
            if let Some(end) = rest.find(']') {
                collect_quoted(&rest[..end], &mut deps);
                return deps;
            }
            collect_quoted(rest, &mut deps);
            break;
        }
    }

    for line in lines {
        if let Some(end) = line.find(']') {
            collect_quoted(&line[..end], &mut deps);
            break;
        }
        collect_quoted(line, &mut deps);
    }
    deps
}

fn collect_quoted(text: &str, into: &mut Vec<String>) {
    into.extend(quoted().captures_iter(text).map(|c| c[1].to_string()));
}

/// First non-blank line of the first triple-quoted string
pub fn extract_description(source: &str) -> Option<String> {
    let body = docstring().captures(source)?.get(1)?.as_str();
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = r#"#!/usr/bin/env python3
# /// script
# requires-python = ">=3.8"
# dependencies = [
#     "cowsay",
#     "rich>=13",
# ]
# ///
"""A simple UV script example for hfjobs.

This script demonstrates how UV scripts can specify their dependencies
inline.
"""

import cowsay
"#;

    #[test]
    fn test_extracts_multiline_dependencies() {
        assert_eq!(extract_dependencies(HELLO), vec!["cowsay", "rich>=13"]);
    }

    #[test]
    fn test_extracts_single_line_dependencies() {
        let source = "# dependencies = [\"datasets\", \"tqdm\"]\nprint('x')\n";
        assert_eq!(extract_dependencies(source), vec!["datasets", "tqdm"]);
    }

    #[test]
    fn test_no_dependency_block() {
        assert!(extract_dependencies("print(\"hello\")\n").is_empty());
        assert!(extract_dependencies("").is_empty());
    }

    #[test]
    fn test_stops_at_closing_bracket() {
        let source = "# dependencies = [\n#   \"a\",\n# ]\nx = [\"not-a-dep\"]\n";
        assert_eq!(extract_dependencies(source), vec!["a"]);
    }

    #[test]
    fn test_description_is_first_non_blank_docstring_line() {
        assert_eq!(
            extract_description(HELLO).as_deref(),
            Some("A simple UV script example for hfjobs.")
        );
        let padded = "\"\"\"\n\n   Deduplicate a dataset.  \nMore.\n\"\"\"\n";
        assert_eq!(
            extract_description(padded).as_deref(),
            Some("Deduplicate a dataset.")
        );
    }

    #[test]
    fn test_missing_or_blank_docstring() {
        assert_eq!(extract_description("# just a comment\n"), None);
        assert_eq!(extract_description("\"\"\"   \n\"\"\""), None);
    }

    #[test]
    fn test_script_meta_extract() {
        let meta = ScriptMeta::extract(HELLO);
        assert_eq!(meta.dependencies.len(), 2);
        assert!(meta.description.is_some());
        assert_eq!(ScriptMeta::extract(""), ScriptMeta::default());
    }
}
