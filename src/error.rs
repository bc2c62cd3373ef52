/// Failure categories surfaced by the analysis layer.
///
/// The driver binary maps these to process exit codes; the library itself
/// never exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unsupported configuration (spline family, algorithm, population
    /// count). Detected before any model or optimizer state exists.
    Configuration,
    /// Malformed or uninformative input data, or a degenerate derived
    /// quantity (non-finite theta, NeN0, penalty).
    Data,
    /// Plugin registered after optimization began.
    PluginRegistration,
    /// Filesystem failure while writing run artifacts.
    Io,
}

#[derive(Clone)]
pub struct AnalysisError {
    kind: ErrorKind,
    message: String,
}

impl AnalysisError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    pub fn plugin(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PluginRegistration, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Exit code for the (out-of-scope) driver binary.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::Configuration => 2,
            ErrorKind::Data => 3,
            ErrorKind::PluginRegistration | ErrorKind::Io => 4,
        }
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AnalysisError {}
