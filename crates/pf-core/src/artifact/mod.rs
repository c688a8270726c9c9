//! Export artifacts: the finished output of a copy or download action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CSV_FILE_NAME: &str = "psp.csv";
pub const PNG_FILE_NAME: &str = "psp.png";
pub const CSV_MIME: &str = "text/csv";
pub const PNG_MIME: &str = "image/png";

/// Which producer serves an export, derived from the widget's `view` attribute.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    /// Grid view; exports rows as CSV.
    Tabular,
    /// Any chart view; exports the rendered image.
    Visual,
}

impl ViewMode {
    /// Only the grid plugin is tabular.
    pub fn from_view_attribute(view: &str) -> Self {
        if view == "hypergrid" {
            ViewMode::Tabular
        } else {
            ViewMode::Visual
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    TabularSnapshot(Vec<Value>),
    ImageBlob { bytes: Vec<u8>, mime: String },
}

impl Artifact {
    pub fn png(bytes: Vec<u8>) -> Self {
        Artifact::ImageBlob {
            bytes,
            mime: PNG_MIME.to_string(),
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            Artifact::TabularSnapshot(_) => CSV_FILE_NAME,
            Artifact::ImageBlob { .. } => PNG_FILE_NAME,
        }
    }

    pub fn mime(&self) -> &str {
        match self {
            Artifact::TabularSnapshot(_) => CSV_MIME,
            Artifact::ImageBlob { mime, .. } => mime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_mode_from_attribute() {
        assert_eq!(ViewMode::from_view_attribute("hypergrid"), ViewMode::Tabular);
        assert_eq!(ViewMode::from_view_attribute("y_line"), ViewMode::Visual);
        assert_eq!(ViewMode::from_view_attribute(""), ViewMode::Visual);
    }

    #[test]
    fn artifact_names() {
        let table = Artifact::TabularSnapshot(vec![]);
        assert_eq!(table.file_name(), "psp.csv");
        assert_eq!(table.mime(), "text/csv");

        let image = Artifact::png(vec![1, 2, 3]);
        assert_eq!(image.file_name(), "psp.png");
        assert_eq!(image.mime(), "image/png");
    }
}
