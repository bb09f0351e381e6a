use crate::error::ApiError;

/// Maximum prompt length accepted by the relay endpoints
const MAX_PROMPT_LENGTH: usize = 4000;

/// Validate a relay prompt
pub fn validate_prompt(prompt: &str) -> Result<(), ApiError> {
    if prompt.trim().is_empty() {
        return Err(ApiError::InvalidInput("Prompt cannot be empty".to_string()));
    }
    if prompt.chars().count() > MAX_PROMPT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Prompt too long (max {} characters)",
            MAX_PROMPT_LENGTH
        )));
    }
    Ok(())
}
