use super::types::{SchemaSnapshot, SqlRow};

/// Row ceiling the model is asked to respect in generated SQL.
pub const PROMPT_ROW_LIMIT: usize = 200;

pub const SQL_DIALECT: &str = "SQLite";

pub const SYSTEM_PROMPT: &str = "You are MovieBot, an AI assistant that helps users with \
movie-related questions by querying a movie database.\n\
The database holds movies, ratings, tags and links to IMDb/TMDb ids.";

pub fn build_generation_prompt(schema: &SchemaSnapshot, question: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "You are an assistant that converts natural language questions into a single {} SELECT statement.\n",
        SQL_DIALECT
    ));
    prompt.push_str("Only output SQL, no explanation.\n");
    prompt.push_str("Database schema:\n");
    if schema.is_empty() {
        prompt.push_str("(schema unavailable)\n");
    } else {
        prompt.push_str(&schema.to_string());
    }
    prompt.push_str(&format!("User question: {}\n", question));
    prompt.push_str(&format!("Limit results to {} rows.", PROMPT_ROW_LIMIT));
    prompt
}

pub fn build_repair_prompt(original_sql: &str, error_message: &str) -> String {
    format!(
        "You are an SQL expert. Fix the SQL query to be valid {dialect} syntax.\n\
         It must be a single SELECT statement.\n\
         Only output corrected SQL, nothing else.\n\
         Original SQL: {original_sql}\n\
         Error: {error_message}",
        dialect = SQL_DIALECT,
    )
}

pub fn build_answer_prompt(
    question: &str,
    columns: &[String],
    preview: &[SqlRow],
    truncated: bool,
) -> String {
    let rows_json = serde_json::to_string(preview).unwrap_or_else(|_| "[]".to_string());
    let mut prompt = format!(
        "You are a helpful assistant. The user asked: {}\n\
         Below are the database query results:\n\
         Columns: {}\n\
         Rows (preview): {}\n",
        question,
        columns.join(", "),
        rows_json
    );
    if truncated {
        prompt.push_str("The result set was cut at the row limit; more rows may exist.\n");
    }
    prompt.push_str("Provide a concise, conversational answer based on these results.");
    prompt
}

pub fn build_apology_prompt(question: &str, failure_message: &str) -> String {
    format!(
        "You are a helpful assistant. The user asked: {}\n\
         The database could not answer this question. Internal error: {}\n\
         Apologize briefly and suggest rephrasing the question. \
         Do not quote SQL or the internal error text.",
        question, failure_message
    )
}
