use pdf_rag_core::RetrievalResponse;
use std::fmt;

pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant. Treat the retrieved context as \
your main source and answer in your own words, combining the relevant parts. If the context is \
incomplete you may add general knowledge for obvious facts. If the context does not cover the \
question at all, say so.";

/// Chat-style prompt handed to the inference server together with the cited sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedPrompt {
    pub system: String,
    pub user: String,
}

pub fn grounded_prompt(question: &str, response: &RetrievalResponse) -> GroundedPrompt {
    GroundedPrompt {
        system: SYSTEM_INSTRUCTION.to_string(),
        user: format!(
            "Retrieved Context: {}\n\nQuestion: {}\n\nAnswer:",
            response.content, question
        ),
    }
}

impl fmt::Display for GroundedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[system]\n{}\n", self.system)?;
        write!(f, "[user]\n{}", self.user)
    }
}
