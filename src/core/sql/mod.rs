pub mod execution;
pub mod gate;
pub mod generation;
pub mod prompts;
pub mod repair;
pub mod types;

pub use execution::execute;
pub use generation::generate_sql;
pub use repair::repair_sql;
pub use types::{
    AgentError, CandidateOrigin, ConversationTurn, QueryResult, SchemaSnapshot, SqlCandidate,
    TurnRole,
};
