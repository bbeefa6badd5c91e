/// Broad category of a failure, used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A physical quantity was given on the wrong scale (e.g. Celsius where Kelvin is required).
    Unit,
    /// Malformed input: shape mismatch, empty data, invalid ranges.
    InvalidInput,
    /// The 2×2 transfer matrix of a polarizing element is not invertible.
    SingularCorrection,
    /// A nonlinear fit did not converge or produced unphysical parameters.
    FitConvergence,
    /// Inputs disagree with the configured setup (e.g. plus/minus tagging).
    ConfigMismatch,
    /// Configuration could not be parsed.
    Config,
    /// Reading an external table failed.
    Io,
}

#[derive(Clone)]
pub struct PolarizationError {
    kind: ErrorKind,
    message: String,
}

impl PolarizationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn unit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unit, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn singular(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SingularCorrection, message)
    }

    pub fn fit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FitConvergence, message)
    }

    pub fn config_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigMismatch, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }
}

impl std::fmt::Display for PolarizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for PolarizationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolarizationError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for PolarizationError {}

impl From<csv::Error> for PolarizationError {
    fn from(err: csv::Error) -> Self {
        Self::new(ErrorKind::Io, format!("CSV error: {err}"))
    }
}
