//! ytm4a fetch engine
//!
//! Runs `yt-dlp` as a child process for each job and translates its output
//! into the typed progress events and results the job runner consumes.
pub mod protocol;
pub mod ytdlp;

pub use ytdlp::YtDlpEngine;
