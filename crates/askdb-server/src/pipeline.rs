//! Question-answering pipeline
//!
//! Three strictly sequential stages over one request: generate a SQL query
//! from the question and schema context, execute it against the store, then
//! compose a natural-language answer from the result. Each stage is a trait
//! so its inputs and outputs are declared by signature and tests can swap in
//! mocks. The first failure propagates; there is no fallback candidate and no
//! self-repair loop.

use std::sync::Arc;

use askdb_duck::{DuckExecutor, ExecutionError};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Query generation failed: {0}")]
    Generation(String),

    #[error("Query execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Answer composition failed: {0}")]
    Composition(String),
}

/// Produces one SQL query from a question and the schema grounding context.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate(&self, question: &str, schema: &str) -> Result<String, PipelineError>;
}

/// Executes a generated query and serializes the result set to text.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<String, PipelineError>;
}

/// Synthesizes a natural-language answer from question, query, and result.
#[async_trait]
pub trait AnswerComposer: Send + Sync {
    async fn compose(
        &self,
        question: &str,
        sql: &str,
        result: &str,
    ) -> Result<String, PipelineError>;
}

#[async_trait]
impl QueryExecutor for DuckExecutor {
    async fn execute(&self, sql: &str) -> Result<String, PipelineError> {
        let result = self.execute_sql(sql)?;
        Ok(result.to_compact_string())
    }
}

/// The composed question → query → result → answer flow.
///
/// Built once at startup and shared read-only across requests. Owns the
/// process-lifetime schema description; per-request values live on the stack
/// of `answer_question`.
pub struct Pipeline {
    schema: String,
    generator: Arc<dyn QueryGenerator>,
    executor: Arc<dyn QueryExecutor>,
    composer: Arc<dyn AnswerComposer>,
}

impl Pipeline {
    pub fn new(
        schema: String,
        generator: Arc<dyn QueryGenerator>,
        executor: Arc<dyn QueryExecutor>,
        composer: Arc<dyn AnswerComposer>,
    ) -> Self {
        Self {
            schema,
            generator,
            executor,
            composer,
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Answer one natural-language question.
    ///
    /// Up to two outbound language-generation calls and one store call; the
    /// stages never overlap since each consumes the previous stage's output.
    pub async fn answer_question(&self, question: &str) -> Result<String, PipelineError> {
        let sql = self.generator.generate(question, &self.schema).await?;
        debug!(%sql, "query generated");

        let result = self.executor.execute(&sql).await?;
        debug!(result_len = result.len(), "query executed");

        let answer = self.composer.compose(question, &sql, &result).await?;
        debug!(answer_len = answer.len(), "answer composed");

        Ok(answer)
    }
}
