pub mod algorithm;
pub mod config;
pub mod error;
pub mod input;
pub mod preprocess;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod store;
pub mod token;
pub mod validate;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error>>;
