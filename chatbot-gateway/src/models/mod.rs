pub mod error;
pub mod openai;
pub mod project;
pub mod turn;
