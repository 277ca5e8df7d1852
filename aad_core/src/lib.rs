pub mod cleaner;
pub mod error;
pub mod graph;
pub mod helpers;
pub mod retention;
