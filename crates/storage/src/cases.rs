use std::{
    fs,
    path::{Path, PathBuf},
};

use shared::domain::Case;
use tracing::{info, warn};

const CASE_EXTENSION: &str = "html";

/// Loads every `*.html` file in `dir`, in ascending file-name order.
///
/// A missing or unreadable directory yields an empty list. Files that fail to
/// read are skipped, and indices stay dense over the files that did load.
pub fn list_cases(dir: &Path) -> Vec<Case> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(dir = %dir.display(), %error, "case directory unavailable");
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some(CASE_EXTENSION)
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut cases = Vec::with_capacity(files.len());
    for path in files {
        let source_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        match fs::read_to_string(&path) {
            Ok(text) => cases.push(Case {
                index: cases.len(),
                source_file,
                text,
            }),
            Err(error) => {
                warn!(file = %path.display(), %error, "skipping unreadable case file");
            }
        }
    }

    info!(dir = %dir.display(), count = cases.len(), "loaded cases");
    cases
}

/// Built-in cases so the study can run without a case directory.
pub fn sample_cases() -> Vec<Case> {
    [
        (
            "case1.html",
            "<p><strong>Case 1:</strong> A 65-year-old man presents with sudden onset of weakness on the right side of his body and difficulty speaking.</p>",
        ),
        (
            "case2.html",
            "<p><strong>Case 2:</strong> A 28-year-old woman complains of episodes of visual disturbances followed by severe headache.</p>",
        ),
        (
            "case3.html",
            "<p><strong>Case 3:</strong> A 45-year-old man has progressive memory loss and behavioral changes over the past year.</p>",
        ),
        (
            "case4.html",
            "<p><strong>Case 4:</strong> A 22-year-old student presents with tremor, muscle rigidity, and slow movements.</p>",
        ),
    ]
    .into_iter()
    .enumerate()
    .map(|(index, (source_file, text))| Case {
        index,
        source_file: source_file.to_string(),
        text: text.to_string(),
    })
    .collect()
}

pub fn load_cases_or_samples(dir: &Path) -> Vec<Case> {
    let cases = list_cases(dir);
    if cases.is_empty() {
        warn!(dir = %dir.display(), "no case files found; using built-in sample cases");
        return sample_cases();
    }
    cases
}

const BLOCK_TAGS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
];

/// Plain-text rendering of case markup: tags dropped, block tags turned into
/// line breaks, common entities decoded, whitespace collapsed.
pub fn html_to_text(markup: &str) -> String {
    let mut raw = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(open) = rest.find('<') {
        raw.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let looks_like_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        match after.find('>') {
            Some(close) if looks_like_tag => {
                let name = after[..close]
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();
                if BLOCK_TAGS.contains(&name.as_str()) {
                    raw.push('\n');
                }
                rest = &after[close + 1..];
            }
            // A stray `<` is text, as in "BP < 120".
            _ => {
                raw.push('<');
                rest = after;
            }
        }
    }
    raw.push_str(rest);

    let decoded = decode_entities(&raw);
    decoded
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
#[path = "tests/cases_tests.rs"]
mod tests;
