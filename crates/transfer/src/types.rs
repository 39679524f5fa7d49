use crate::TransferError;
use crate::validation::validate_file_name;

/// A named file of known length, fixed once a transfer begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    len: u64,
}

impl FileHandle {
    /// Creates a handle, rejecting empty or path-traversing names.
    pub fn new(name: impl Into<String>, len: u64) -> Result<Self, TransferError> {
        let name = name.into();
        validate_file_name(&name)?;
        Ok(Self { name, len })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Cumulative progress of an upload, emitted once per accepted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    pub bytes_so_far: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_accessors() {
        let handle = FileHandle::new("a.txt", 10).unwrap();
        assert_eq!(handle.name(), "a.txt");
        assert_eq!(handle.len(), 10);
        assert!(!handle.is_empty());
    }

    #[test]
    fn handle_rejects_traversal() {
        assert!(matches!(
            FileHandle::new("../secret", 1),
            Err(TransferError::InvalidName(_))
        ));
        assert!(FileHandle::new("", 0).is_err());
    }
}
