use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a datasource row while a request is in flight.
///
/// `Pending` and `Processing` are written by the caller before admission;
/// the pipeline itself only ever writes `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DataSourceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for DataSourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&DataSourceStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");
    }

    #[test]
    fn display_matches_column_values() {
        assert_eq!(DataSourceStatus::Failed.to_string(), "FAILED");
        assert_eq!(DataSourceStatus::Processing.to_string(), "PROCESSING");
    }
}
