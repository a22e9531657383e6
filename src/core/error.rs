use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,

    DeckFormat,
    DeckDuplicateDefinition,

    RenumberCollision,
    RenumberDanglingReference,
    RenumberInvalidRule,

    EditTargetNotFound,
    EditInvalid,

    RewriteInconsistent,

    InternalIoError,
    InternalJsonError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::DeckFormat => "deck.format",
            ErrorCode::DeckDuplicateDefinition => "deck.duplicate_definition",

            ErrorCode::RenumberCollision => "renumber.collision",
            ErrorCode::RenumberDanglingReference => "renumber.dangling_reference",
            ErrorCode::RenumberInvalidRule => "renumber.invalid_rule",

            ErrorCode::EditTargetNotFound => "edit.target_not_found",
            ErrorCode::EditInvalid => "edit.invalid",

            ErrorCode::RewriteInconsistent => "rewrite.inconsistent",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeckFormatDetails {
    pub line: usize,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditDetails {
    pub cell: i64,
    pub field: String,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

pub fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.clone(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            format!("Invalid argument: {}", problem),
            details,
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in plan file",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.clone(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value: {}", problem),
            details,
        )
    }

    /// Unparseable deck structure. Always fatal, raised before indexing.
    pub fn deck_format(line: usize, problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::DeckFormat,
            format!("Deck format error at line {}: {}", line, problem),
            to_details(DeckFormatDetails { line, problem }),
        )
    }

    pub fn deck_duplicate_definition(duplicates: Value, count: usize) -> Self {
        Self::new(
            ErrorCode::DeckDuplicateDefinition,
            format!("{} identifier(s) are defined more than once", count),
            serde_json::json!({ "duplicates": duplicates, "count": count }),
        )
    }

    /// Renumbering violations, aggregated. `code` picks the headline category.
    pub fn renumber_rejected(code: ErrorCode, violations: Value, count: usize) -> Self {
        let headline = match code {
            ErrorCode::RenumberCollision => "Renumbering produces identifier collisions",
            ErrorCode::RenumberDanglingReference => "Renumbering targets undefined identifiers",
            _ => "Renumbering rules are invalid",
        };

        Self::new(
            code,
            format!("{} ({} violation(s))", headline, count),
            serde_json::json!({ "violations": violations, "count": count }),
        )
        .with_hint("No output was written. Adjust the rules and run again.")
    }

    pub fn edit_target_not_found(cell: i64, field: impl Into<String>) -> Self {
        let details = to_details(EditDetails {
            cell,
            field: field.into(),
            problem: "no cell card defines this identifier".to_string(),
        });

        Self::new(
            ErrorCode::EditTargetNotFound,
            format!("Cell {} is not defined in the deck", cell),
            details,
        )
        .with_hint("Run 'cardshift info <deck>' to list defined cells")
    }

    pub fn edit_invalid(cell: i64, field: impl Into<String>, problem: impl Into<String>) -> Self {
        let field = field.into();
        let problem = problem.into();
        let details = to_details(EditDetails {
            cell,
            field: field.clone(),
            problem: problem.clone(),
        });

        Self::new(
            ErrorCode::EditInvalid,
            format!("Cannot edit '{}' of cell {}: {}", field, cell, problem),
            details,
        )
    }

    /// Internal-consistency fault in the final rewrite pass.
    pub fn rewrite_inconsistent(problem: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RewriteInconsistent,
            "Rewrite failed on an internal inconsistency",
            serde_json::json!({ "problem": problem.into() }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_format_carries_line() {
        let err = Error::deck_format(7, "continuation line with no preceding card");
        assert_eq!(err.code.as_str(), "deck.format");
        assert_eq!(err.details["line"], 7);
        assert!(err.message.contains("line 7"));
    }

    #[test]
    fn renumber_rejected_adds_hint() {
        let err = Error::renumber_rejected(
            ErrorCode::RenumberCollision,
            serde_json::json!([{ "type": "collision" }]),
            1,
        );
        assert_eq!(err.code, ErrorCode::RenumberCollision);
        assert_eq!(err.hints.len(), 1);
        assert!(err.message.contains("collisions"));
    }
}
