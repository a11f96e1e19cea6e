//! Scripted generator for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{GenerationOptions, GeneratorError, TextGenerator};

/// A configurable reply for [`MockGenerator`].
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    /// Simulate an API failure (quota, malformed request, ...).
    Error(String),
    /// Simulate a reply with no text.
    Empty,
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }
}

/// A hand-rolled mock implementing [`TextGenerator`].
///
/// Reply selection, in order:
/// - the first rule whose needle occurs in the prompt,
/// - the next reply of the sequence (if any remain),
/// - the fallback.
///
/// Every prompt and its options are recorded.
pub struct MockGenerator {
    rules: Vec<(String, MockReply)>,
    responses: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    schema: bool,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    options: Mutex<Vec<GenerationOptions>>,
}

impl MockGenerator {
    /// A mock that always returns `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self {
            rules: Vec::new(),
            responses: Mutex::new(Vec::new()),
            fallback: reply,
            schema: false,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// A mock that always returns `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(MockReply::Text(text.into()))
    }

    /// Replies in order, then `fallback` once the sequence is exhausted.
    pub fn with_sequence(mut self, mut replies: Vec<MockReply>) -> Self {
        replies.reverse();
        self.responses = Mutex::new(replies);
        self
    }

    /// Reply with `reply` whenever the prompt contains `needle`.
    pub fn with_rule(mut self, needle: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    /// Claim schema support, so callers take the schema-constrained path.
    pub fn with_schema_support(mut self, schema: bool) -> Self {
        self.schema = schema;
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn recorded_options(&self) -> Vec<GenerationOptions> {
        self.options.lock().unwrap().clone()
    }

    fn next_reply(&self, prompt: &str) -> MockReply {
        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return reply.clone();
        }
        let mut seq = self.responses.lock().unwrap();
        seq.pop().unwrap_or_else(|| self.fallback.clone())
    }
}

impl TextGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_schema(&self) -> bool {
        self.schema
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        options: &'a GenerationOptions,
    ) -> Pin<Box<dyn Future<Output = Result<String, GeneratorError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.options.lock().unwrap().push(options.clone());
        let reply = self.next_reply(prompt);

        Box::pin(async move {
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Error(message) => Err(GeneratorError::Api {
                    status: 500,
                    message,
                }),
                MockReply::Empty => Err(GeneratorError::EmptyResponse),
            }
        })
    }
}
