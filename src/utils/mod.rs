pub mod validation;

use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on timestamp bumps when two callers claim the same name
pub const MAX_CLAIM_ATTEMPTS: i64 = 1000;

/// Milliseconds since the Unix epoch, used to prefix stored names
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Creates `{root}/{prefix}{timestamp}` and returns its absolute path.
///
/// `create_dir` fails on an existing directory, so two callers racing within
/// the same millisecond never share a directory: the loser bumps the stamp.
pub fn claim_unique_dir(root: &Path, prefix: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let root = std::path::absolute(root)?;
    let started_at = unix_millis();

    for bump in 0..MAX_CLAIM_ATTEMPTS {
        let candidate = root.join(format!("{}{}", prefix, started_at + bump));
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free directory name for {}", prefix),
    ))
}

/// Creates an empty `{root}/{prefix}{timestamp}{suffix}` with create-new
/// semantics and returns its absolute path.
///
/// The caller owns the claimed name and may replace the file in place.
pub fn claim_unique_file(root: &Path, prefix: &str, suffix: &str) -> io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let root = std::path::absolute(root)?;
    let started_at = unix_millis();

    for bump in 0..MAX_CLAIM_ATTEMPTS {
        let candidate = root.join(format!("{}{}{}", prefix, started_at + bump, suffix));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {}", prefix),
    ))
}
