pub mod columns;
pub mod comparer;
pub mod duplicates;
pub mod engine;
pub mod monitoring;
pub mod ordering;
pub mod session;
pub mod source;
