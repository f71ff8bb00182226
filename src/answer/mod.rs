//! Answer generation seam
//!
//! The text-generation step is an external collaborator: the core hands it
//! a question plus retrieved passages and receives prose back. It is modeled
//! as an injected capability so the retrieval core has no compile-time
//! coupling to any provider. The bundled `CommandGenerator` pipes the
//! assembled prompt to a user-configured command.

use crate::error::{RagnarError, Result};
use crate::retrieval::{HybridRetriever, RetrievedPassage};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnswerError {
    #[error("Generator failed: {0}")]
    Generator(String),

    #[error("Generator produced no output")]
    EmptyOutput,
}

/// Injected text-generation capability
pub trait AnswerGenerator: Send + Sync {
    /// Turn an assembled prompt into answer prose
    fn generate(&self, prompt: &str) -> std::result::Result<String, AnswerError>;
}

/// A generated answer with its citation material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// The passages the answer was grounded on, verbatim
    pub sources: Vec<RetrievedPassage>,
}

/// Assemble the generation prompt: context-only answering with an explicit
/// "I don't know" escape hatch.
pub fn build_prompt(question: &str, passages: &[RetrievedPassage]) -> String {
    let context: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
    format!(
        "You are a helpful assistant.\n\
         Answer the question using ONLY the context below.\n\
         If the answer is not in the context, say \"I don't know\".\n\
         \n\
         Context:\n{}\n\
         \n\
         Question:\n{}\n\
         \n\
         Answer:\n",
        context.join("\n\n"),
        question
    )
}

/// Composes retrieval and generation into question answering
pub struct AnswerEngine<G: AnswerGenerator> {
    retriever: HybridRetriever,
    generator: G,
}

impl<G: AnswerGenerator> AnswerEngine<G> {
    pub fn new(retriever: HybridRetriever, generator: G) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    /// Retrieve context for `question` and generate a grounded answer.
    ///
    /// Retrieval failures propagate as-is; they are never disguised as an
    /// empty answer.
    pub async fn ask(&self, question: &str, k: usize, alpha: f32) -> Result<Answer> {
        let sources = self.retriever.retrieve(question, k, alpha).await?;
        let prompt = build_prompt(question, &sources);
        let text = self
            .generator
            .generate(&prompt)
            .map_err(|e| RagnarError::Answer(e.to_string()))?;

        Ok(Answer { text, sources })
    }
}

/// Pipes the prompt to an external command's stdin and reads the answer
/// from its stdout.
pub struct CommandGenerator {
    command: String,
    args: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl AnswerGenerator for CommandGenerator {
    fn generate(&self, prompt: &str) -> std::result::Result<String, AnswerError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AnswerError::Generator(format!("{}: {}", self.command, e)))?;

        child
            .stdin
            .take()
            .ok_or_else(|| AnswerError::Generator("stdin unavailable".to_string()))?
            .write_all(prompt.as_bytes())
            .map_err(|e| AnswerError::Generator(format!("writing prompt: {}", e)))?;

        let output = child
            .wait_with_output()
            .map_err(|e| AnswerError::Generator(format!("waiting for generator: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnswerError::Generator(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(AnswerError::EmptyOutput);
        }
        Ok(text)
    }
}
