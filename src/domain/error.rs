//! Domain error types.

/// A parse error with position information for predicate parsing.
#[derive(Debug, Clone, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    ///
    /// `position` is a byte offset into `input`; the caret column counts
    /// characters so it lines up past multi-byte text.
    pub fn display_with_context(&self, input: &str) -> String {
        let column = input
            .get(..self.position)
            .map_or(self.position, |prefix| prefix.chars().count());
        let caret = " ".repeat(column) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Top-level error type for backlab.
#[derive(Debug, thiserror::Error)]
pub enum BacklabError {
    #[error("unknown security: {symbol}")]
    UnknownSecurity { symbol: String },

    #[error("invalid series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error("duplicate indicator column: {name}")]
    DuplicateIndicator { name: String },

    #[error("duplicate signal: {name}")]
    DuplicateSignal { name: String },

    #[error("generator {generator}: {reason}")]
    GeneratorArgument { generator: String, reason: String },

    #[error("undefined column: {column}")]
    UndefinedColumn { column: String },

    #[error("unknown signal: {name}")]
    UnknownSignal { name: String },

    #[error("empty optimization range")]
    EmptyRange,

    #[error("insufficient history for {column} on {symbol}: have {have} rows, need {need}")]
    InsufficientHistory {
        symbol: String,
        column: String,
        have: usize,
        need: usize,
    },

    #[error("strategy has no compiled decisions; compile signals before running")]
    NotCompiled,

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    PredicateParse(#[from] ParseError),

    #[error(transparent)]
    Universe(#[from] crate::domain::universe::UniverseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&BacklabError> for std::process::ExitCode {
    fn from(err: &BacklabError) -> Self {
        std::process::ExitCode::from(exit_code(err))
    }
}

fn exit_code(err: &BacklabError) -> u8 {
    match err {
        BacklabError::Io(_) => 1,
        BacklabError::ConfigParse { .. }
        | BacklabError::ConfigMissing { .. }
        | BacklabError::ConfigInvalid { .. } => 2,
        BacklabError::DataSource { .. }
        | BacklabError::UnknownSecurity { .. }
        | BacklabError::InvalidSeries { .. }
        | BacklabError::Universe(_) => 3,
        BacklabError::PredicateParse(_)
        | BacklabError::DuplicateIndicator { .. }
        | BacklabError::DuplicateSignal { .. }
        | BacklabError::GeneratorArgument { .. }
        | BacklabError::UndefinedColumn { .. }
        | BacklabError::UnknownSignal { .. }
        | BacklabError::NotCompiled => 4,
        BacklabError::EmptyRange | BacklabError::InsufficientHistory { .. } => 5,
    }
}
