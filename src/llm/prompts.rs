//! System prompt for the career coach

/// Fixed instructions that precede the user-settable prompt
pub const BASE_INSTRUCTIONS: &str = r#"You are a warm, practical career coach having a spoken conversation. Your replies are read aloud, so keep them short, natural and free of lists, markdown, links or code.

Guidelines:
- Ask one question at a time
- Reflect back what you heard before giving advice
- Prefer concrete next steps over general encouragement
- Keep each reply to two or three sentences"#;

/// Build the full system prompt from the base instructions and a user-provided addition
pub fn build_system_prompt(custom: &str) -> String {
    let custom = custom.trim();
    if custom.is_empty() {
        BASE_INSTRUCTIONS.to_string()
    } else {
        format!("{BASE_INSTRUCTIONS}\n\n{custom}")
    }
}
