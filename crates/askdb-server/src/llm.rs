//! OpenAI integration: SQL generation and answer composition
//!
//! Two prompts back the pipeline's language-generation stages. The generator
//! turns a question plus schema context into exactly one DuckDB SQL query;
//! the composer turns {question, query, result} into a natural-language
//! answer. Both sample at temperature 0.0 to favor reproducible output.

use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::warn;

use crate::config::LlmConfig;
use crate::pipeline::{AnswerComposer, PipelineError, QueryGenerator};

/// System prompt for SQL generation. The schema context is appended at
/// request time so generated queries reference real tables and columns.
const SQL_SYSTEM_PROMPT: &str = r#"You are an expert at translating natural language questions into a single SQL query for a DuckDB database.

Rules:
1. Return ONLY the SQL query - no markdown fences, no explanations, no prose.
2. Produce exactly one statement and terminate it with a semicolon.
3. Use only the tables and columns listed in the database schema below.
4. Never write statements that modify data (INSERT, UPDATE, DELETE, DROP, CREATE, ALTER).
5. When the question asks "how many", use COUNT(*)."#;

fn generation_system_prompt(schema: &str) -> String {
    format!("{}\n\n## Database Schema\n\n{}", SQL_SYSTEM_PROMPT, schema)
}

/// Answer-composition prompt embedding all three pipeline values verbatim.
fn answer_prompt(question: &str, sql: &str, result: &str) -> String {
    format!(
        "Given the following user question, corresponding SQL query, and SQL result, \
         answer the user question.\n\n\
         Question: {}\n\
         SQL Query: {}\n\
         SQL Result: {}\n\
         Answer: ",
        question, sql, result
    )
}

/// Strip markdown fences the model sometimes adds despite instructions.
fn extract_sql(content: &str) -> String {
    let trimmed = content.trim();

    let without_fence = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed);

    without_fence.trim().to_string()
}

/// One chat completion at temperature 0.0, with bounded retry-with-backoff.
///
/// `max_retries` = 0 preserves the fail-on-first-error contract; the backoff
/// grows linearly with the attempt number.
async fn chat_completion(
    client: &Client<OpenAIConfig>,
    model: &str,
    messages: Vec<ChatCompletionRequestMessage>,
    max_retries: u32,
    retry_backoff_ms: u64,
) -> Result<String, String> {
    let mut attempt: u32 = 0;

    loop {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages.clone())
            .temperature(0.0)
            .build()
            .map_err(|e| e.to_string())?;

        match client.chat().create(request).await {
            Ok(response) => {
                return response
                    .choices
                    .first()
                    .and_then(|choice| choice.message.content.clone())
                    .filter(|content| !content.trim().is_empty())
                    .ok_or_else(|| "empty completion from language model".to_string());
            }
            Err(e) if attempt < max_retries => {
                attempt += 1;
                warn!(attempt, error = %e, "chat completion failed, retrying");
                tokio::time::sleep(Duration::from_millis(retry_backoff_ms * attempt as u64))
                    .await;
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// OpenAI-backed SQL generator.
pub struct SqlGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl SqlGenerator {
    pub fn new(client: Client<OpenAIConfig>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[async_trait]
impl QueryGenerator for SqlGenerator {
    async fn generate(&self, question: &str, schema: &str) -> Result<String, PipelineError> {
        let messages = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(generation_system_prompt(schema))
                    .build()
                    .map_err(|e| PipelineError::Generation(e.to_string()))?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(question)
                    .build()
                    .map_err(|e| PipelineError::Generation(e.to_string()))?,
            ),
        ];

        let content = chat_completion(
            &self.client,
            &self.model,
            messages,
            self.max_retries,
            self.retry_backoff_ms,
        )
        .await
        .map_err(PipelineError::Generation)?;

        Ok(extract_sql(&content))
    }
}

/// OpenAI-backed natural-language answer composer.
pub struct NlComposer {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl NlComposer {
    pub fn new(client: Client<OpenAIConfig>, config: &LlmConfig) -> Self {
        Self {
            client,
            model: config.model.clone(),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[async_trait]
impl AnswerComposer for NlComposer {
    async fn compose(
        &self,
        question: &str,
        sql: &str,
        result: &str,
    ) -> Result<String, PipelineError> {
        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(answer_prompt(question, sql, result))
                .build()
                .map_err(|e| PipelineError::Composition(e.to_string()))?,
        )];

        let content = chat_completion(
            &self.client,
            &self.model,
            messages,
            self.max_retries,
            self.retry_backoff_ms,
        )
        .await
        .map_err(PipelineError::Composition)?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_prompt_embeds_schema() {
        let prompt = generation_system_prompt("artists(id INTEGER, name VARCHAR)");
        assert!(prompt.contains("## Database Schema"));
        assert!(prompt.contains("artists(id INTEGER, name VARCHAR)"));
        assert!(prompt.contains("ONLY the SQL query"));
    }

    #[test]
    fn test_answer_prompt_embeds_all_three_values() {
        let prompt = answer_prompt(
            "How many artists are in the database?",
            "SELECT COUNT(*) FROM artists;",
            "42",
        );
        assert!(prompt.contains("Question: How many artists are in the database?"));
        assert!(prompt.contains("SQL Query: SELECT COUNT(*) FROM artists;"));
        assert!(prompt.contains("SQL Result: 42"));
    }

    #[test]
    fn test_extract_sql_passes_bare_sql_through() {
        assert_eq!(
            extract_sql("SELECT COUNT(*) FROM artists;"),
            "SELECT COUNT(*) FROM artists;"
        );
    }

    #[test]
    fn test_extract_sql_strips_fenced_blocks() {
        assert_eq!(
            extract_sql("```sql\nSELECT 1;\n```"),
            "SELECT 1;"
        );
        assert_eq!(extract_sql("```\nSELECT 1;\n```"), "SELECT 1;");
    }

    #[test]
    fn test_extract_sql_trims_whitespace() {
        assert_eq!(extract_sql("  SELECT 1;  \n"), "SELECT 1;");
    }
}
