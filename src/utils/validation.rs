use crate::api::error::AppError;
use std::path::{Component, Path, PathBuf};

/// Maximum stored filename length in bytes, timestamp prefix excluded
pub const MAX_FILENAME_LEN: usize = 200;

/// Sanitizes an uploaded filename so it can be stored under an upload root.
///
/// Only the last path component is kept, whitespace runs become `_`, and
/// reserved or control characters are replaced.
pub fn sanitize_filename(filename: &str) -> Result<String, AppError> {
    // Browsers on Windows may send the full client path
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if name.is_empty() {
        return Err(AppError::InvalidRequest(
            "Filename cannot be empty".to_string(),
        ));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload filename: {}", filename);
    }

    let mut sanitized = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                sanitized.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;

        if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
            sanitized.push('_');
        } else {
            sanitized.push(c);
        }
    }

    // Limit length safely for UTF-8, keeping the extension intact
    let sanitized = if sanitized.len() > MAX_FILENAME_LEN {
        let ext = Path::new(&sanitized)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let mut end = MAX_FILENAME_LEN.saturating_sub(ext.len());
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}{}", &sanitized[..end], ext)
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(AppError::InvalidRequest(
            "Hidden files (starting with '.') are not allowed".to_string(),
        ));
    }

    Ok(sanitized)
}

/// Case-insensitive extension check, `extension` given without the dot
pub fn has_extension(filename: &str, extension: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Resolves a caller supplied path against `root`, refusing anything that
/// would land outside of it.
///
/// Leading slashes are ignored so both `uploadedZip/a.zip` and
/// `/uploadedZip/a.zip` resolve to the same place. An absolute path that
/// already points inside `root` is accepted as is.
pub fn resolve_within_root(root: &Path, requested: &str) -> Result<PathBuf, AppError> {
    let requested = requested.trim();
    let inside_root = std::path::absolute(root)
        .ok()
        .and_then(|abs| Path::new(requested).strip_prefix(abs).ok().map(Path::to_path_buf));
    let trimmed = match &inside_root {
        Some(rest) => rest.to_str().unwrap_or_default(),
        None => requested.trim_start_matches(['/', '\\']),
    };
    let relative = normalized_relative(Path::new(trimmed)).ok_or_else(|| {
        tracing::warn!("Rejected path outside of data root: {}", requested);
        AppError::InvalidRequest(format!("Invalid file path: {}", requested))
    })?;

    if relative.as_os_str().is_empty() {
        return Err(AppError::InvalidRequest(
            "Invalid file path: path must name an entry inside the data root".to_string(),
        ));
    }

    Ok(root.join(relative))
}

/// Returns `path` with `.` components dropped, or `None` if it is absolute
/// or climbs with `..`.
pub fn normalized_relative(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}
