//! Domain error types.

/// Top-level error type for microtrader.
#[derive(Debug, thiserror::Error)]
pub enum MicrotraderError {
    #[error("dataset not found: {path}")]
    DatasetNotFound { path: String },

    #[error("missing required columns: {columns}")]
    SchemaMissingColumns { columns: String },

    #[error("invalid value in column {column} at data row {row}: {reason}")]
    FieldInvalid {
        column: String,
        row: usize,
        reason: String,
    },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("invalid config value {field}: {reason}")]
    ConfigInvalid { field: String, reason: String },

    #[error("invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("no order book data in {path}")]
    NoData { path: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&MicrotraderError> for std::process::ExitCode {
    fn from(err: &MicrotraderError) -> Self {
        let code: u8 = match err {
            MicrotraderError::Io(_) | MicrotraderError::Json(_) => 1,
            MicrotraderError::ConfigParse { .. } | MicrotraderError::ConfigInvalid { .. } => 2,
            MicrotraderError::SchemaMissingColumns { .. }
            | MicrotraderError::FieldInvalid { .. }
            | MicrotraderError::Csv { .. } => 3,
            MicrotraderError::InvalidArgument { .. } => 4,
            MicrotraderError::DatasetNotFound { .. } | MicrotraderError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_include_context() {
        let err = MicrotraderError::SchemaMissingColumns {
            columns: "bid_price_1, ask_price_1".into(),
        };
        assert_eq!(
            err.to_string(),
            "missing required columns: bid_price_1, ask_price_1"
        );

        let err = MicrotraderError::FieldInvalid {
            column: "bid_size_1".into(),
            row: 7,
            reason: "invalid float literal".into(),
        };
        assert!(err.to_string().contains("bid_size_1"));
        assert!(err.to_string().contains("row 7"));
    }

    // ExitCode has no PartialEq, so compare the Debug rendering.
    fn code_of(err: &MicrotraderError) -> String {
        format!("{:?}", std::process::ExitCode::from(err))
    }

    #[test]
    fn exit_codes_group_by_family() {
        let io: MicrotraderError = std::io::Error::other("boom").into();
        assert_eq!(code_of(&io), format!("{:?}", std::process::ExitCode::from(1)));

        let config = MicrotraderError::ConfigInvalid {
            field: "training_ratio".into(),
            reason: "must lie in (0,1)".into(),
        };
        assert_eq!(
            code_of(&config),
            format!("{:?}", std::process::ExitCode::from(2))
        );

        let schema = MicrotraderError::SchemaMissingColumns {
            columns: "symbol".into(),
        };
        assert_eq!(
            code_of(&schema),
            format!("{:?}", std::process::ExitCode::from(3))
        );

        let missing = MicrotraderError::DatasetNotFound {
            path: "/tmp/none.csv".into(),
        };
        assert_eq!(
            code_of(&missing),
            format!("{:?}", std::process::ExitCode::from(5))
        );
    }
}
