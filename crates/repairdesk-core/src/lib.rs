pub mod board;
pub mod card;
pub mod columns;
pub mod error;
pub mod escalation;
pub mod history;
pub mod io;
pub mod lifecycle;
pub mod notify;
pub mod parser;
pub mod paths;
pub mod report;
pub mod scheduler;
pub mod seed;
pub mod settings;
pub mod store;

pub use error::{DeskError, Result};
