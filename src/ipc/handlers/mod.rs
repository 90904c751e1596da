pub mod core;
pub mod records;
pub mod settings;
pub mod stats;
pub mod students;
