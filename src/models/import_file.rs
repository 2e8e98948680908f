use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::trade::ParsedTrade;

/// Stable identifier assigned to a file when it enters the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub fn new() -> Self {
        FileId(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
}

impl FileFormat {
    /// Classify by extension (case-insensitive). Anything else is unsupported.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        if lower.ends_with(".csv") {
            Some(FileFormat::Csv)
        } else if lower.ends_with(".xlsx") {
            Some(FileFormat::Xlsx)
        } else if lower.ends_with(".xls") {
            Some(FileFormat::Xls)
        } else {
            None
        }
    }
}

/// A file handed to the importer, before its format has been checked
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Accepted input file. Immutable once selected.
#[derive(Debug, Clone, Serialize)]
pub struct RawFile {
    pub name: String,
    pub format: FileFormat,
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
}

impl RawFile {
    /// Returns `None` when the name has no supported extension.
    pub fn classify(incoming: IncomingFile) -> Option<Self> {
        let format = FileFormat::from_file_name(&incoming.name)?;
        Some(Self {
            name: incoming.name,
            format,
            bytes: Arc::from(incoming.bytes),
        })
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Parsing,
    Parsed,
    Error,
    Importing,
    Imported,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Parsing => "parsing",
            FileStatus::Parsed => "parsed",
            FileStatus::Error => "error",
            FileStatus::Importing => "importing",
            FileStatus::Imported => "imported",
        }
    }

    /// pending → parsing → {parsed | error}; parsed → importing → {imported | parsed}
    pub fn can_transition_to(&self, next: FileStatus) -> bool {
        matches!(
            (self, next),
            (FileStatus::Pending, FileStatus::Parsing)
                | (FileStatus::Parsing, FileStatus::Parsed)
                | (FileStatus::Parsing, FileStatus::Error)
                | (FileStatus::Parsed, FileStatus::Importing)
                | (FileStatus::Importing, FileStatus::Imported)
                | (FileStatus::Importing, FileStatus::Parsed)
        )
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file state held by an import session
#[derive(Debug, Clone, Serialize)]
pub struct FileImportState {
    pub id: FileId,
    pub file: RawFile,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trades: Option<Arc<Vec<ParsedTrade>>>,
}

impl FileImportState {
    pub fn new(file: RawFile) -> Self {
        Self {
            id: FileId::new(),
            file,
            status: FileStatus::Pending,
            error: None,
            trades: None,
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.as_ref().map(|t| t.len()).unwrap_or(0)
    }
}

/// Entry of the session's append-only transition log.
/// `from` is `None` for the entry recorded at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub file_id: FileId,
    pub from: Option<FileStatus>,
    pub to: FileStatus,
    pub at: DateTime<Utc>,
}
