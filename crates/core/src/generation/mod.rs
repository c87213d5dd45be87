pub mod extract;
pub mod prompt;
pub mod reply;
pub mod schema;

pub use extract::{extract_generation, salvage_json};
pub use prompt::{build_generation_prompt, with_json_reminder, SYSTEM_PREAMBLE};
pub use reply::{decode_reply, probe_shape, ModelReply, ReplyBlock, ReplyBody, ReplyShape};
pub use schema::{has_required_keys, is_usable_response, response_schema, validate_object};

/// Strict regeneration check applied to a whole reply.
pub fn is_usable_reply(reply: &ModelReply) -> bool {
    reply
        .candidate_texts()
        .iter()
        .any(|text| is_usable_response(text))
}
