//! Question answering grounded in a single document.

use std::sync::Arc;

use crate::generator::{GenerationOptions, TextGenerator};
use crate::text_utils::truncate_chars;
use crate::{ChatRole, ChatTurn, Config, CoreError, ExtractedDocument};

/// Asked when the conversation has no usable final user question.
pub const DEFAULT_QUESTION: &str = "What is the main topic of this document?";

/// A conversation about one document. Turns are append-only.
#[derive(Debug, Clone)]
pub struct ChatSession {
    document: ExtractedDocument,
    turns: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(document: ExtractedDocument) -> Self {
        Self {
            document,
            turns: Vec::new(),
        }
    }

    pub fn with_history(document: ExtractedDocument, turns: Vec<ChatTurn>) -> Self {
        Self { document, turns }
    }

    pub fn document(&self) -> &ExtractedDocument {
        &self.document
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }
}

/// Builds one prompt from the document and the whole transcript and makes a
/// single generator call. No state is kept between calls.
pub struct ChatResponder {
    generator: Arc<dyn TextGenerator>,
    char_limit: usize,
    language: String,
}

impl ChatResponder {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &Config) -> Self {
        Self {
            generator,
            char_limit: config.chat_char_limit,
            language: config.response_language.clone(),
        }
    }

    /// Answer the last user turn of `messages` using `document_text`.
    pub async fn reply(&self, document_text: &str, messages: &[ChatTurn]) -> Result<String, CoreError> {
        let prompt = self.build_prompt(document_text, messages);
        let options = GenerationOptions::default();
        let reply = self.generator.generate(&prompt, &options).await?;
        Ok(reply.trim().to_string())
    }

    /// Ask `question` within `session`, recording both the question and the
    /// answer. Nothing is recorded if the generator fails.
    pub async fn ask(&self, session: &mut ChatSession, question: &str) -> Result<String, CoreError> {
        let mut turns = session.turns().to_vec();
        turns.push(ChatTurn::user(question));
        let answer = self.reply(session.document().text(), &turns).await?;
        session.push(ChatTurn::user(question));
        session.push(ChatTurn::assistant(answer.clone()));
        Ok(answer)
    }

    fn build_prompt(&self, document_text: &str, messages: &[ChatTurn]) -> String {
        let mut history = String::new();
        for turn in messages.iter().filter(|t| !t.content.trim().is_empty()) {
            let speaker = match turn.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            history.push_str(speaker);
            history.push_str(": ");
            history.push_str(turn.content.trim());
            history.push('\n');
        }

        format!(
            "You are an expert academic assistant.\n\
             Use the following text extracted from a scientific article as your only source \
             of truth to answer the user's question.\n\n\
             --- BEGIN ARTICLE ---\n{article}\n--- END ARTICLE ---\n\n\
             Instructions:\n\
             1. Answer directly, politely and technically.\n\
             2. If the answer is not in the article, say that the article does not mention it.\n\
             3. Use Markdown formatting to keep the answer clear.\n\
             4. Answer in {language}.\n\n\
             Conversation history:\n{history}\n\
             User: {question}\n\
             Answer:",
            article = truncate_chars(document_text, self.char_limit),
            language = self.language,
            history = history,
            question = last_question(messages),
        )
    }
}

/// The final user turn, or [`DEFAULT_QUESTION`] when the transcript is empty,
/// ends with an assistant turn, or ends with a blank question.
fn last_question(messages: &[ChatTurn]) -> &str {
    match messages.last() {
        Some(turn) if turn.role == ChatRole::User && !turn.content.trim().is_empty() => {
            turn.content.trim()
        }
        _ => DEFAULT_QUESTION,
    }
}
