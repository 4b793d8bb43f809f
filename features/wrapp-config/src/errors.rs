/// Errors when reading a module header
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The header contains no clause at all
    #[error("The header is empty")]
    Empty,
    /// A quoted value was never closed
    #[error("Unterminated quote in header at offset {0}")]
    UnterminatedQuote(usize),
    /// A parameter has no name before its `=` or `:=`
    #[error("Parameter without a name in clause '{0}'")]
    UnnamedParameter(String),
}

/// Errors when turning directives into a container configuration
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The header itself could not be parsed
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// A known directive carries a value of the wrong shape
    #[error("Directive '{directive}' has an invalid value '{value}'")]
    InvalidDirective { directive: String, value: String },
}
