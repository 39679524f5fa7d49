use std::path::{Component, Path};

use crate::TransferError;

/// Validates a logical file name before it is resolved against a storage root.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows drive prefixes (`C:`) and UNC paths (`\\server`)
pub fn validate_file_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    // Checked textually so the result does not depend on the host platform.
    if name.len() >= 2 && name.as_bytes()[1] == b':' {
        return Err(TransferError::InvalidName(format!(
            "drive prefix not allowed: {name}"
        )));
    }
    if name.starts_with("\\\\") {
        return Err(TransferError::InvalidName(format!(
            "UNC path not allowed: {name}"
        )));
    }

    let path = Path::new(name);
    if path.is_absolute() {
        return Err(TransferError::InvalidName(format!(
            "absolute path not allowed: {name}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidName(format!(
                    "parent directory traversal not allowed: {name}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidName(format!(
                    "absolute path not allowed: {name}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
