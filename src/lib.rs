pub mod data;
pub mod error;
pub mod export;
pub mod parser;
pub mod solver;
