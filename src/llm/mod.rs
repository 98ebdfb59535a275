// Gemini API client, model fallback resolver, and prompt templating.

pub mod client;
pub mod prompt;
