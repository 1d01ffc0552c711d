pub mod delete;
pub mod health;
pub mod preview;
pub mod process;
pub mod progress;
pub mod reset;
pub mod upload;
