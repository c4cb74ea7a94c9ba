//! Question supply pipeline: prompt building, defensive parsing, validation,
//! de-duplication, the static fallback bank and the controller-local pool.

mod fallback;
mod generator;
mod parse;
mod pool;
mod prompt;

pub use fallback::{BankEntry, FallbackBank};
pub use generator::QuestionGenerator;
pub use parse::{answers_match, normalize, parse_questions, validate, RawQuestion};
pub use pool::{PreparedPool, SharedPool};
pub use prompt::{difficulty_text, system_prompt, temperature_for_attempt, user_prompt};
