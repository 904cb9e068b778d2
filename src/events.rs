use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    DirectoryCreated,
    DirectoryDeleted,
}

impl FileEventKind {
    pub fn label(self) -> &'static str {
        match self {
            FileEventKind::Created => "CREATED",
            FileEventKind::Modified => "MODIFIED",
            FileEventKind::Deleted => "DELETED",
            FileEventKind::DirectoryCreated => "DIR CREATED",
            FileEventKind::DirectoryDeleted => "DIR DELETED",
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            FileEventKind::Created => "C",
            FileEventKind::Modified => "M",
            FileEventKind::Deleted => "D",
            FileEventKind::DirectoryCreated => "+",
            FileEventKind::DirectoryDeleted => "-",
        }
    }
}

/// A delivered watcher callback, as reported to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
    pub timestamp: DateTime<Local>,
}

impl FileEvent {
    pub fn new(path: impl AsRef<Path>, kind: FileEventKind) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
            timestamp: Local::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    FileChanged(FileEvent),
    SeedsReloaded { count: usize, skipped: usize },
    Command(String),
    Quit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let event = FileEvent::new("/w/a.txt", FileEventKind::Modified);
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(json["kind"], "Modified");
        assert_eq!(json["path"], "/w/a.txt");
        assert!(json["timestamp"].is_string());
    }
}
