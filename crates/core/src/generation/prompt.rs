use crate::ladder::Narrowing;
use crate::types::{ConversationTurn, DiagramRequest, Technology};

/// Number of most recent conversation turns included in the prompt.
pub const HISTORY_WINDOW: usize = 6;

/// Per-turn character cap for conversation context.
pub const TURN_CHAR_LIMIT: usize = 500;

pub const SYSTEM_PREAMBLE: &str = "\
You are a diagram generator for an educational tutoring service.
You receive a conversation between a student and a tutor plus a diagram request.
You respond with ONE JSON object and nothing else.";

/// Appended to the prompt when a regeneration reply failed the strict check.
pub const RETURN_JSON_REMINDER: &str = "\
IMPORTANT: Your previous reply was empty or not a valid diagram object.
Return the JSON object now. No prose, no markdown fences, all required keys present.";

const TECHNOLOGY_GUIDE: &str = "\
Choose exactly ONE rendering technology:
- \"matplotlib\": data plots, function graphs, statistics charts, coordinate geometry with numeric axes.
- \"svg\": shapes, labelled concept illustrations, simple geometry, physics setups, cycles.
- \"latex\": formal geometric constructions and proofs (TikZ).
- \"graphviz\": trees, flowcharts, hierarchies, state machines, dependency graphs.";

const TECHNOLOGY_RULES: &str = "\
Rules for \"content\":
- matplotlib: Python code using the pre-imported names plt, np and math. Create the figure with plt.figure(figsize=...) or plt.subplots(...). Do not import anything else, do not read or write files, do not call plt.show() or plt.savefig().
- svg: one complete <svg> element with xmlns=\"http://www.w3.org/2000/svg\" and a viewBox. No <script>, no event handlers, no external references.
- latex: a TikZ fragment (\\begin{tikzpicture} ... \\end{tikzpicture}). No \\documentclass, no preamble, no \\input or \\write18.
- graphviz: a complete DOT graph starting with \"digraph\" or \"graph\".
The code must be complete and directly executable, with no placeholders.";

fn language_name(code: &str) -> &str {
    match code.trim().to_ascii_lowercase().as_str() {
        "" | "en" | "english" => "English",
        "es" | "spanish" => "Spanish",
        "fr" | "french" => "French",
        "de" | "german" => "German",
        "pt" | "portuguese" => "Portuguese",
        "zh" | "zh-hans" | "chinese" => "Chinese",
        "ja" | "japanese" => "Japanese",
        "ko" | "korean" => "Korean",
        _ => code.trim(),
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let head: String = text.chars().take(limit).collect();
        format!("{head}...")
    }
}

/// Most recent turns, oldest first, each truncated.
pub fn conversation_window(history: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let skip = history.len().saturating_sub(HISTORY_WINDOW);
    history
        .iter()
        .skip(skip)
        .map(|turn| ConversationTurn {
            role: turn.role.clone(),
            content: truncate_chars(turn.content.trim(), TURN_CHAR_LIMIT),
        })
        .collect()
}

/// Build the single prompt that asks the model to both pick a technology and
/// write its source.
pub fn build_generation_prompt(request: &DiagramRequest, narrowing: Option<&Narrowing>) -> String {
    let mut parts = Vec::new();

    parts.push(TECHNOLOGY_GUIDE.to_string());
    parts.push(TECHNOLOGY_RULES.to_string());

    let display_language = narrowing
        .map(|n| n.language.as_str())
        .unwrap_or_else(|| language_name(&request.language));

    parts.push(format!(
        "Text rules:\n\
         - Every label, annotation and string INSIDE the code must use plain ASCII characters only. \
         The renderer has no fonts for other scripts, so translate or transliterate labels.\n\
         - \"title\" and \"explanation\" are shown to the student and must be written in {display_language}.\n\
         - \"width\" and \"height\" are the preferred size in pixels (between 200 and 4096)."
    ));

    let window = conversation_window(&request.conversation_history);
    if !window.is_empty() {
        let transcript = window
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.content))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!("Conversation so far:\n{transcript}"));
    }

    parts.push(format!("Subject: {}", request.subject.trim()));
    parts.push(format!("Diagram request:\n{}", request.diagram_request.trim()));

    if let Some(narrowing) = narrowing {
        parts.push(narrowed_instructions(narrowing));
    }

    parts.push(
        "Respond with a JSON object with keys: type, content, title, explanation, width, height."
            .to_string(),
    );

    parts.join("\n\n")
}

fn narrowed_instructions(narrowing: &Narrowing) -> String {
    let mut lines = vec![
        format!(
            "RETRY: the previous attempt failed ({}).",
            narrowing.previous_failure
        ),
        format!(
            "- You MUST use \"type\": \"{}\".",
            narrowing.technology.as_str()
        ),
    ];
    if narrowing.ascii_only {
        lines.push(
            "- Use ASCII characters only, everywhere, including title and explanation.".to_string(),
        );
    }
    lines.push(format!(
        "- Write the title and explanation in {}.",
        narrowing.language
    ));
    if narrowing.technology == Technology::Svg {
        lines.push(
            "- Keep the drawing simple: basic shapes, lines and short text labels.".to_string(),
        );
    }
    lines.join("\n")
}

/// Prompt for the bounded regeneration retry.
pub fn with_json_reminder(prompt: &str) -> String {
    format!("{prompt}\n\n{RETURN_JSON_REMINDER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DiagramError;

    fn turn(role: &str, content: &str) -> ConversationTurn {
        ConversationTurn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_conversation_window_keeps_most_recent_turns() {
        let history: Vec<_> = (0..10).map(|i| turn("student", &format!("turn {i}"))).collect();
        let window = conversation_window(&history);
        assert_eq!(window.len(), HISTORY_WINDOW);
        assert_eq!(window[0].content, "turn 4");
        assert_eq!(window[5].content, "turn 9");
    }

    #[test]
    fn test_conversation_window_truncates_long_turns() {
        let history = vec![turn("tutor", &"a".repeat(TURN_CHAR_LIMIT + 50))];
        let window = conversation_window(&history);
        assert_eq!(window[0].content.chars().count(), TURN_CHAR_LIMIT + 3);
    }

    #[test]
    fn test_prompt_contains_request_and_language() {
        let mut request = DiagramRequest::new("Draw the water cycle");
        request.language = "es".to_string();
        request.subject = "biology".to_string();
        request.conversation_history = vec![turn("student", "What is evaporation?")];

        let prompt = build_generation_prompt(&request, None);
        assert!(prompt.contains("Draw the water cycle"));
        assert!(prompt.contains("written in Spanish"));
        assert!(prompt.contains("Subject: biology"));
        assert!(prompt.contains("student: What is evaporation?"));
        assert!(!prompt.contains("RETRY"));
    }

    #[test]
    fn test_narrowed_prompt_forces_svg_and_english() {
        let mut request = DiagramRequest::new("Dibuja un triangulo");
        request.language = "es".to_string();
        let narrowing = Narrowing::after(&DiagramError::timeout("plot execution", 5));

        let prompt = build_generation_prompt(&request, Some(&narrowing));
        assert!(prompt.contains("RETRY"));
        assert!(prompt.contains("\"type\": \"svg\""));
        assert!(prompt.contains("written in English"));
        assert!(prompt.contains("Timed out after 5s"));
    }

    #[test]
    fn test_json_reminder_appended() {
        let prompt = with_json_reminder("base");
        assert!(prompt.starts_with("base"));
        assert!(prompt.ends_with(RETURN_JSON_REMINDER));
    }
}
