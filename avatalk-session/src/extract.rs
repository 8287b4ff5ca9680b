//! Reply extraction from answer-service responses.
//!
//! The answer service does not commit to one response shape. A
//! [`ReplyExtractorChain`] tries its extractors in order and the first
//! non-blank string wins.

use serde_json::Value;
use tracing::debug;

pub trait ReplyExtractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, response: &Value) -> Option<String>;
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First element of an array field: either a string or an object holding
/// `item_field`.
pub struct ArrayFieldExtractor {
    field: String,
    item_field: String,
}

impl ArrayFieldExtractor {
    pub fn new(field: impl Into<String>, item_field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            item_field: item_field.into(),
        }
    }
}

impl ReplyExtractor for ArrayFieldExtractor {
    fn name(&self) -> &str {
        "array"
    }

    fn extract(&self, response: &Value) -> Option<String> {
        let first = response.get(&self.field)?.as_array()?.first()?;
        match first {
            Value::String(_) => non_blank(first),
            Value::Object(_) => non_blank(first.get(&self.item_field)?),
            _ => None,
        }
    }
}

/// Field reached through a JSON pointer, e.g. `/data/answer`.
pub struct NestedFieldExtractor {
    pointer: String,
}

impl NestedFieldExtractor {
    pub fn new(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }
}

impl ReplyExtractor for NestedFieldExtractor {
    fn name(&self) -> &str {
        "nested"
    }

    fn extract(&self, response: &Value) -> Option<String> {
        non_blank(response.pointer(&self.pointer)?)
    }
}

pub struct TopLevelFieldExtractor {
    field: String,
}

impl TopLevelFieldExtractor {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl ReplyExtractor for TopLevelFieldExtractor {
    fn name(&self) -> &str {
        "top-level"
    }

    fn extract(&self, response: &Value) -> Option<String> {
        non_blank(response.get(&self.field)?)
    }
}

pub struct ReplyExtractorChain {
    extractors: Vec<Box<dyn ReplyExtractor>>,
}

impl Default for ReplyExtractorChain {
    /// `answers[0]`, then `data.answer`, then `answer`.
    fn default() -> Self {
        Self::empty()
            .with(ArrayFieldExtractor::new("answers", "answer"))
            .with(NestedFieldExtractor::new("/data/answer"))
            .with(TopLevelFieldExtractor::new("answer"))
    }
}

impl ReplyExtractorChain {
    pub fn empty() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Append an extractor; it runs after the ones already present.
    pub fn with(mut self, extractor: impl ReplyExtractor + 'static) -> Self {
        self.extractors.push(Box::new(extractor));
        self
    }

    pub fn extract(&self, response: &Value) -> Option<String> {
        self.extractors.iter().find_map(|extractor| {
            let reply = extractor.extract(response)?;
            debug!("Reply extracted by {} extractor", extractor.name());
            Some(reply)
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }
}
