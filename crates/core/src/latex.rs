/// Name of the scratch source file inside a per-request directory.
pub const SOURCE_FILE: &str = "diagram.tex";
/// Compiler output for [`SOURCE_FILE`].
pub const PDF_FILE: &str = "diagram.pdf";
/// Converter output.
pub const SVG_FILE: &str = "diagram.svg";

const PREAMBLE: &str = r"\documentclass[border=10pt]{standalone}
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage{tikz}
\usetikzlibrary{angles,arrows.meta,calc,positioning,quotes,shapes.geometric}";

/// Wrap a TikZ fragment in a minimal standalone document.
///
/// Complete documents (those carrying their own `\documentclass`) are passed
/// through. Bare drawing commands are put inside a `tikzpicture`.
pub fn standalone_document(fragment: &str) -> String {
    let fragment = fragment.trim();

    if fragment.contains("\\documentclass") {
        return format!("{fragment}\n");
    }

    let body = if fragment.contains("\\begin{") {
        fragment.to_string()
    } else {
        format!("\\begin{{tikzpicture}}\n{fragment}\n\\end{{tikzpicture}}")
    };

    format!("{PREAMBLE}\n\\begin{{document}}\n{body}\n\\end{{document}}\n")
}

/// Pull the first TeX error line (`! ...`) out of a compiler log.
pub fn first_error(log: &str) -> Option<String> {
    let mut lines = log.lines();
    while let Some(line) = lines.next() {
        if let Some(message) = line.strip_prefix("! ") {
            let context = lines
                .find(|l| l.starts_with("l."))
                .map(|l| format!(" ({})", l.trim()))
                .unwrap_or_default();
            return Some(format!("{}{}", message.trim(), context));
        }
    }
    None
}
