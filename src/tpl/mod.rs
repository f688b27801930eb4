pub mod ast;
mod channel;
pub(crate) mod engine;
pub mod lexer;
mod parser;
mod pipeline;
pub mod token;
pub mod tree;
