// One-shot question against the answer service

use avatalk_session::{split_sentences, AnswerService, ReplyExtractorChain, Result};

/// What the avatar would say for one question.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    Segments(Vec<String>),
    NoAnswer,
}

pub async fn ask(
    answers: &dyn AnswerService,
    extractors: &ReplyExtractorChain,
    question: &str,
) -> Result<AskOutcome> {
    let response = answers.ask(question.trim()).await?;
    let outcome = match extractors.extract(&response) {
        Some(reply) => AskOutcome::Segments(split_sentences(&reply)),
        None => AskOutcome::NoAnswer,
    };
    Ok(outcome)
}
