//! SVG post-processing and placeholder synthesis.
//!
//! All edits touch the root `<svg ...>` opening tag only. The rest of the
//! document is passed through byte for byte.

use regex::Regex;
use std::sync::LazyLock;

/// Padding added around generated SVG, in user units.
pub const DEFAULT_PADDING: f64 = 20.0;

/// Marker attribute set on the root element once padding has been applied.
pub const PADDED_MARKER: &str = "data-drawkit-padded";

pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

pub const PLACEHOLDER_WIDTH: u32 = 800;
pub const PLACEHOLDER_HEIGHT: u32 = 400;

static SVG_OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<svg\b[^>]*>").expect("svg open tag regex"));

fn attribute_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)\s{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(name)
    ))
    .expect("attribute regex")
}

/// Value of an attribute on an opening tag.
pub fn get_attribute(tag: &str, name: &str) -> Option<String> {
    attribute_regex(name).captures(tag).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string())
    })
}

/// Replace or append an attribute on an opening tag.
pub fn set_attribute(tag: &str, name: &str, value: &str) -> String {
    let re = attribute_regex(name);
    let replacement = format!(" {name}=\"{value}\"");

    if re.is_match(tag) {
        return re.replace(tag, regex::NoExpand(&replacement)).into_owned();
    }

    let insert_at = if tag.ends_with("/>") {
        tag.len() - 2
    } else {
        tag.len() - 1
    };
    format!("{}{}{}", &tag[..insert_at], replacement, &tag[insert_at..])
}

/// Parse a length such as `400`, `400px` or `12.5pt`. Percentages and other
/// relative units yield `None`.
pub fn parse_length(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let number = trimmed
        .strip_suffix("px")
        .or_else(|| trimmed.strip_suffix("pt"))
        .unwrap_or(trimmed)
        .trim();
    number.parse::<f64>().ok().filter(|n| n.is_finite() && *n > 0.0)
}

pub fn parse_view_box(value: &str) -> Option<[f64; 4]> {
    let numbers: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;

    match numbers.as_slice() {
        [x, y, w, h] if *w > 0.0 && *h > 0.0 => Some([*x, *y, *w, *h]),
        _ => None,
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn format_view_box(view_box: [f64; 4]) -> String {
    view_box
        .iter()
        .map(|n| format_number(*n))
        .collect::<Vec<_>>()
        .join(" ")
}

fn rewrite_root(svg: &str, edit: impl FnOnce(&str) -> Option<String>) -> String {
    let Some(found) = SVG_OPEN_TAG.find(svg) else {
        return svg.to_string();
    };
    match edit(found.as_str()) {
        Some(tag) => format!("{}{}{}", &svg[..found.start()], tag, &svg[found.end()..]),
        None => svg.to_string(),
    }
}

/// Expand the root viewBox by `padding` on every side so strokes and labels at
/// the edge are not cropped, and make sure width/height are explicit.
///
/// Applied once per rendered SVG. The result carries [`PADDED_MARKER`], and
/// input that already carries it is returned unchanged, so the padding never
/// compounds. Documents without a usable viewBox or numeric size are returned
/// as-is.
pub fn pad_svg(svg: &str, padding: f64) -> String {
    rewrite_root(svg, |tag| {
        if get_attribute(tag, PADDED_MARKER).is_some() {
            return None;
        }

        let width = get_attribute(tag, "width");
        let height = get_attribute(tag, "height");
        let numeric_width = width.as_deref().and_then(parse_length);
        let numeric_height = height.as_deref().and_then(parse_length);

        let [x, y, w, h] = get_attribute(tag, "viewBox")
            .as_deref()
            .and_then(parse_view_box)
            .or_else(|| Some([0.0, 0.0, numeric_width?, numeric_height?]))?;

        let padded = [x - padding, y - padding, w + 2.0 * padding, h + 2.0 * padding];
        let mut tag = set_attribute(tag, "viewBox", &format_view_box(padded));

        match (width, numeric_width) {
            (Some(_), Some(n)) => {
                tag = set_attribute(&tag, "width", &format_number(n + 2.0 * padding))
            }
            (None, _) => tag = set_attribute(&tag, "width", &format_number(padded[2])),
            (Some(_), None) => {}
        }
        match (height, numeric_height) {
            (Some(_), Some(n)) => {
                tag = set_attribute(&tag, "height", &format_number(n + 2.0 * padding))
            }
            (None, _) => tag = set_attribute(&tag, "height", &format_number(padded[3])),
            (Some(_), None) => {}
        }

        Some(set_attribute(&tag, PADDED_MARKER, "true"))
    })
}

/// Add namespace, viewBox and accessibility attributes when missing.
pub fn ensure_svg_metadata(svg: &str, title: &str, width: u32, height: u32) -> String {
    rewrite_root(svg, |tag| {
        let mut tag = tag.to_string();

        if get_attribute(&tag, "xmlns").is_none() {
            tag = set_attribute(&tag, "xmlns", SVG_NAMESPACE);
        }

        if get_attribute(&tag, "viewBox").is_none() {
            let w = get_attribute(&tag, "width")
                .as_deref()
                .and_then(parse_length)
                .unwrap_or(width as f64);
            let h = get_attribute(&tag, "height")
                .as_deref()
                .and_then(parse_length)
                .unwrap_or(height as f64);
            tag = set_attribute(&tag, "viewBox", &format_view_box([0.0, 0.0, w, h]));
        }

        if get_attribute(&tag, "role").is_none() {
            tag = set_attribute(&tag, "role", "img");
        }

        if get_attribute(&tag, "aria-label").is_none() {
            tag = set_attribute(&tag, "aria-label", &escape_xml(title));
        }

        Some(tag)
    })
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn wrap_words(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            last.push_str(" ...");
        }
    }
    lines
}

/// Deterministic placeholder shown when every rendering attempt failed.
pub fn placeholder_svg(title: &str, reason: &str) -> String {
    let title: String = if title.chars().count() > 80 {
        format!("{}...", title.chars().take(77).collect::<String>())
    } else {
        title.to_string()
    };
    let title = escape_xml(&title);

    let reason_lines = wrap_words(reason, 70, 4)
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            format!(
                r##"  <text x="400" y="{}" font-family="Helvetica, Arial, sans-serif" font-size="14" fill="#6b7280" text-anchor="middle">{}</text>"##,
                220 + i * 22,
                escape_xml(&line)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r##"<svg xmlns="{SVG_NAMESPACE}" width="{PLACEHOLDER_WIDTH}" height="{PLACEHOLDER_HEIGHT}" viewBox="0 0 {PLACEHOLDER_WIDTH} {PLACEHOLDER_HEIGHT}" role="img" aria-label="{title}">
  <rect x="0" y="0" width="{PLACEHOLDER_WIDTH}" height="{PLACEHOLDER_HEIGHT}" fill="#ffffff"/>
  <rect x="16" y="16" width="768" height="368" rx="12" fill="none" stroke="#9ca3af" stroke-width="2" stroke-dasharray="8 6"/>
  <text x="400" y="140" font-family="Helvetica, Arial, sans-serif" font-size="24" font-weight="bold" fill="#111827" text-anchor="middle">{title}</text>
  <text x="400" y="180" font-family="Helvetica, Arial, sans-serif" font-size="16" fill="#374151" text-anchor="middle">The diagram could not be rendered.</text>
{reason_lines}
</svg>"##
    )
}
