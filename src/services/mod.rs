pub mod archive;
pub mod pipeline;
pub mod progress;
pub mod reaper;
pub mod tabular;
pub mod transcripts;
pub mod upload;
