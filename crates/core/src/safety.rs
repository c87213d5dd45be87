//! Pre-execution screening of generated source.
//!
//! Nothing reaches an interpreter, renderer or compiler without passing
//! [`screen`]. The checks are substring denylists plus a structural marker per
//! technology. They catch accidental misuse; the executors still run in a
//! separate process with a hard kill.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::DiagramError;
use crate::types::{GenerationResult, Technology};

/// Call-shaped evaluation and process primitives, rejected for every
/// technology. Bare words stay out of this list so labels like "Subprocess"
/// survive in markup and graphs.
const UNIVERSAL_DENYLIST: &[&str] = &[
    "eval(",
    "exec(",
    "__import__",
    "os.system(",
    "os.popen(",
    "subprocess.",
];

/// Process, file, network and reflection primitives that only make sense to
/// check in Python source.
const PYTHON_DENYLIST: &[&str] = &[
    "subprocess",
    "os.system",
    "os.popen",
    "open(",
    "compile(",
    "importlib",
    "os.spawn",
    "os.exec",
    "os.remove",
    "shutil",
    "pathlib",
    "socket",
    "urllib",
    "requests.",
    "http.client",
    "globals(",
    "locals(",
    "vars(",
    "getattr(",
    "setattr(",
    "delattr(",
    "__builtins__",
    "__class__",
    "__subclasses__",
    "__globals__",
    "sys.",
    "input(",
    "breakpoint(",
    "np.load",
    "np.save",
    "loadtxt",
    "savetxt",
    "genfromtxt",
    "fromfile",
    "tofile",
    "imread",
];

/// TeX primitives that touch the filesystem or shell.
const LATEX_DENYLIST: &[&str] = &[
    "\\write18",
    "\\immediate",
    "\\openout",
    "\\openin",
    "\\input",
    "\\include",
    "\\read",
    "\\catcode",
    "shellesc",
    "\\ShellEscape",
];

/// Markup that would execute in the client when the SVG is displayed inline.
const SVG_DENYLIST: &[&str] = &["<script", "javascript:", "<foreignobject"];

static SVG_EVENT_HANDLER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\son[a-z]+\s*=").expect("svg event handler regex"));

static SVG_ROOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<svg[\s>]").expect("svg root regex"));

static DOT_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)^\s*(?://[^\n]*\n\s*|/\*.*?\*/\s*|#[^\n]*\n\s*)*",
        r"(?:strict\s+)?(?:di)?graph\b[^{]*\{",
    ))
    .expect("dot header regex")
});

/// Tokens checked for a technology. Graphviz only gets the universal list so
/// that ordinary labels such as "Data Import" or "Open Account" pass.
pub fn denylist(technology: Technology) -> Vec<&'static str> {
    let mut tokens = UNIVERSAL_DENYLIST.to_vec();
    match technology {
        Technology::Matplotlib => tokens.extend_from_slice(PYTHON_DENYLIST),
        Technology::Latex => tokens.extend_from_slice(LATEX_DENYLIST),
        Technology::Svg => tokens.extend_from_slice(SVG_DENYLIST),
        Technology::Graphviz => {}
    }
    tokens
}

/// Reject source containing any denylisted token for its technology.
pub fn check_denylist(technology: Technology, source: &str) -> Result<(), DiagramError> {
    let haystack = source.to_ascii_lowercase();

    for token in denylist(technology) {
        if haystack.contains(&token.to_ascii_lowercase()) {
            return Err(DiagramError::SafetyRejection(format!(
                "{technology} source contains forbidden token '{token}'"
            )));
        }
    }

    if technology == Technology::Svg && SVG_EVENT_HANDLER.is_match(source) {
        return Err(DiagramError::SafetyRejection(
            "svg source contains an inline event handler".to_string(),
        ));
    }

    Ok(())
}

/// Require the minimal structural marker of the technology.
pub fn check_structure(technology: Technology, source: &str) -> Result<(), DiagramError> {
    let ok = match technology {
        Technology::Matplotlib => source.contains("plt."),
        Technology::Svg => {
            SVG_ROOT.is_match(source) && source.to_ascii_lowercase().contains("</svg>")
        }
        Technology::Latex => source.contains("\\begin{") || source.contains("\\draw"),
        Technology::Graphviz => DOT_HEADER.is_match(source) && source.contains('}'),
    };

    if ok {
        Ok(())
    } else {
        let expected = match technology {
            Technology::Matplotlib => "a plt.* call",
            Technology::Svg => "an <svg> root element",
            Technology::Latex => "a \\begin{...} environment",
            Technology::Graphviz => "a graph or digraph declaration",
        };
        Err(DiagramError::SafetyRejection(format!(
            "{technology} source is missing {expected}"
        )))
    }
}

/// Locate the first character outside printable ASCII (tabs and newlines allowed).
pub fn first_non_portable(source: &str) -> Option<(usize, char)> {
    source.lines().enumerate().find_map(|(index, line)| {
        line.chars()
            .find(|c| !(c.is_ascii_graphic() || *c == ' ' || *c == '\t' || *c == '\r'))
            .map(|c| (index + 1, c))
    })
}

pub fn check_portable(source: &str) -> Result<(), DiagramError> {
    match first_non_portable(source) {
        Some((line, c)) => Err(DiagramError::NonPortableText(format!(
            "character '{c}' (U+{:04X}) on line {line}",
            c as u32
        ))),
        None => Ok(()),
    }
}

/// Every check a generation result must pass before execution.
///
/// Code-executing technologies are scanned for non-portable text first, so a
/// label the renderer cannot draw never costs an execution attempt.
pub fn screen(result: &GenerationResult) -> Result<(), DiagramError> {
    if result.technology.executes_code() {
        check_portable(&result.content)?;
    }
    check_denylist(result.technology, &result.content)?;
    check_structure(result.technology, &result.content)
}
