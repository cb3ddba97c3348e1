//! README generation for script repositories
//!
//! `uv` repositories keep a table of scripts between two marker comments so
//! later pushes can add rows without touching hand-written text. `scripts`
//! repositories use the older free-form layout with one section per script.

use chrono::{DateTime, Utc};

use crate::hub::short_name;
use crate::script_meta::ScriptMeta;

pub const START_MARKER: &str = "<!-- AUTO-GENERATED SCRIPTS LIST - DO NOT EDIT MANUALLY -->";
pub const END_MARKER: &str = "<!-- END AUTO-GENERATED SCRIPTS LIST -->";

const FOOTER_MARKER: &str = "---\n*Created with";
const FOOTER: &str = "---\n*Created with [hfjobs](https://github.com/huggingface/hfjobs)*\n";

/// Image and tag used in the copy-paste run snippets
const RUN_IMAGE: &str = "ghcr.io/astral-sh/uv:python3.12";

/// README for a `uv init` repository: front matter, usage and the scripts table
pub fn render_collection(repo_id: &str, script_name: &str, description: Option<&str>) -> String {
    let name = short_name(repo_id);
    format!(
        r#"---
tags:
- hfjobs-uv-script
- uv
- python
viewer: false
---

# {name}

A collection of UV scripts for hfjobs.

## Usage

Run any script using:
```bash
hfjobs uv run <script_name> --repo {name}
```

## Scripts

{START_MARKER}
| Script | Description | Command |
|--------|-------------|---------|
{row}
{END_MARKER}

## Learn More

Learn more about UV scripts in the [UV documentation](https://docs.astral.sh/uv/guides/scripts/).

{FOOTER}"#,
        row = script_row(repo_id, script_name, description),
    )
}

/// One table row: linked file name, description and run command
pub fn script_row(repo_id: &str, script_name: &str, description: Option<&str>) -> String {
    let description = description.unwrap_or("UV script").replace('|', "\\|");
    format!(
        "| [{script}](./blob/main/{script}) | {description} | `hfjobs uv run {script} --repo {repo}` |",
        script = script_name,
        description = description,
        repo = short_name(repo_id),
    )
}

/// Whether the scripts table already lists `script_name`
pub fn lists_script(doc: &str, script_name: &str) -> bool {
    doc.contains(&format!("| [{}]", script_name))
}

/// Adds `script_name` to the table, returning the document unchanged when it is already listed.
///
/// Without both markers the document cannot be patched safely and is
/// regenerated from scratch, which drops any other rows and manual edits.
pub fn add_script_row(
    doc: &str,
    repo_id: &str,
    script_name: &str,
    description: Option<&str>,
) -> String {
    if lists_script(doc, script_name) {
        return doc.to_string();
    }

    let (Some(start), Some(end)) = (doc.find(START_MARKER), doc.find(END_MARKER)) else {
        tracing::warn!("README has no scripts table markers, regenerating it");
        return render_collection(repo_id, script_name, description);
    };
    if end < start {
        tracing::warn!("README scripts table markers are out of order, regenerating it");
        return render_collection(repo_id, script_name, description);
    }

    // Insert after the last line of the table, i.e. right before the end marker's line
    let insert_at = doc[..end].rfind('\n').unwrap_or(end);
    let row = script_row(repo_id, script_name, description);
    format!("{}\n{}{}", &doc[..insert_at], row, &doc[insert_at..])
}

/// README for a `scripts init` repository holding a single script
pub fn render_single_script(
    repo_id: &str,
    script_name: &str,
    script_url: &str,
    meta: &ScriptMeta,
) -> String {
    let mut readme = format!(
        r#"---
tags:
- hfjobs-uv-script
- uv
- python
---

# {name}

A UV script for hfjobs.

## Usage

```bash
hfjobs run {RUN_IMAGE} \
  uv run {script_url} \
  <your-args>
```

## Script Details

**Script:** `{script_name}`
"#,
        name = short_name(repo_id),
    );

    if let Some(description) = &meta.description {
        readme.push_str(&format!("\n**Description:** {}\n", description));
    }
    if !meta.dependencies.is_empty() {
        readme.push_str("\n**Dependencies:**\n");
        for dep in &meta.dependencies {
            readme.push_str(&format!("- {}\n", dep));
        }
    }

    readme.push('\n');
    readme.push_str(FOOTER);
    readme
}

/// Appends a `### <script>` entry to the `## Scripts` section, creating the section if needed
pub fn add_script_section(
    doc: &str,
    script_name: &str,
    script_url: &str,
    meta: &ScriptMeta,
) -> String {
    if doc.contains(&format!("### {}\n", script_name)) {
        return doc.to_string();
    }

    let (before, section_header, after) = match doc.find("## Scripts") {
        Some(idx) => {
            let body_start = idx + "## Scripts".len();
            let remaining = &doc[body_start..];
            let split = remaining
                .find("\n## ")
                .or_else(|| remaining.find(&format!("\n{}", FOOTER_MARKER)))
                .unwrap_or(remaining.len());
            (
                &doc[..body_start + split],
                "",
                &doc[body_start + split..],
            )
        }
        None => match doc.find(FOOTER_MARKER) {
            Some(idx) => (&doc[..idx], "\n## Scripts\n\n", &doc[idx..]),
            None => (doc, "\n## Scripts\n\n", ""),
        },
    };

    let mut entry = format!("\n### {}\n", script_name);
    if let Some(description) = &meta.description {
        entry.push_str(&format!("{}\n\n", description));
    }
    entry.push_str(&format!(
        "```bash\nhfjobs run {} \\\n  uv run {}\n```\n",
        RUN_IMAGE, script_url
    ));
    if !meta.dependencies.is_empty() {
        entry.push_str(&format!(
            "\n**Dependencies:** {}\n",
            meta.dependencies.join(", ")
        ));
    }

    // A document without a footer gets one
    let after = if after.is_empty() && !doc.contains(FOOTER_MARKER) {
        format!("\n{}", FOOTER)
    } else {
        after.to_string()
    };

    format!("{}{}{}{}", before, section_header, entry, after)
}

/// README for the throwaway repository `uv run` creates when no repo is given
pub fn render_ephemeral(
    script_name: &str,
    script_url: &str,
    description: Option<&str>,
    created: DateTime<Utc>,
) -> String {
    let mut readme = format!(
        r#"---
tags:
- hfjobs-uv-script
- ephemeral
- uv
- python
viewer: false
---

# Ephemeral UV Script Repository

This is a temporary repository created by `hfjobs uv run` for one-time script execution.

**Script:** `{script_name}`
**Created:** {created}
"#,
        created = created.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    if let Some(description) = description {
        readme.push_str(&format!("**Description:** {}\n", description));
    }

    readme.push_str(&format!(
        r#"
## Direct Execution

This script was executed using:
```bash
hfjobs uv run {script_name}
```

## Script URL

```
{script_url}
```

{FOOTER}"#
    ));
    readme
}
