use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EmulatorErrorKind {
    Misc,
    UnmappedAddress,
    OutOfRange,
    ReadOnly,
}

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("breakpoint reached: {0}")]
    Breakpoint(String),
    #[error("{1}")]
    Emulator(EmulatorErrorKind, String),
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn new<S>(msg: S) -> Error
    where
        S: Into<String>,
    {
        Error::Emulator(EmulatorErrorKind::Misc, msg.into())
    }

    pub fn emulator<S>(kind: EmulatorErrorKind, msg: S) -> Error
    where
        S: Into<String>,
    {
        Error::Emulator(kind, msg.into())
    }

    pub fn breakpoint<S>(msg: S) -> Error
    where
        S: Into<String>,
    {
        Error::Breakpoint(msg.into())
    }

    pub fn assertion<S>(msg: S) -> Error
    where
        S: Into<String>,
    {
        Error::Assertion(msg.into())
    }

    pub fn msg(&self) -> &str {
        match self {
            Error::Assertion(msg) | Error::Breakpoint(msg) | Error::Other(msg) | Error::Emulator(_, msg) => msg.as_str(),
        }
    }

    pub fn kind(&self) -> Option<EmulatorErrorKind> {
        match self {
            Error::Emulator(kind, _) => Some(*kind),
            _ => None,
        }
    }
}
