pub mod board;
pub mod cards;
pub mod reports;
pub mod settings;
pub mod telegram;
