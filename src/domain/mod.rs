pub mod cell;
pub mod column;
pub mod error;
pub mod ports;
pub mod row_diff;
pub mod stats;
pub mod value_objects;
