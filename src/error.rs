use std::fmt::{self, Display};
use std::io;

#[derive(Debug)]
pub enum QuizError {
    /// The answer-spec field held something other than space-separated
    /// `0`/`1` tokens, or was empty.
    MalformedAnswerSpec(String),
    /// A card record is missing required fields or yields no usable options.
    InvalidQuestion(String),
    /// `start` was called with an empty question pool.
    EmptyPool,
    /// `start` was called with a non-positive question count.
    InvalidCount(usize),
    /// Navigation target outside the session's question list.
    IndexOutOfRange { index: usize, len: usize },
    /// Results were requested before the session completed.
    SessionNotCompleted,
    /// A persisted snapshot failed signature or structural validation.
    CorruptSnapshot(String),
    Io(io::Error),
}

impl Display for QuizError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use QuizError::*;
        match self {
            MalformedAnswerSpec(spec) => write!(f, "malformed answer spec: {:?}", spec),
            InvalidQuestion(reason) => write!(f, "invalid question: {}", reason),
            EmptyPool => f.write_str("question pool is empty"),
            InvalidCount(count) => write!(f, "invalid question count: {}", count),
            IndexOutOfRange { index, len } => {
                write!(f, "question index {} out of range (session has {})", index, len)
            }
            SessionNotCompleted => f.write_str("session is not completed"),
            CorruptSnapshot(reason) => write!(f, "corrupt session snapshot: {}", reason),
            Io(err) => write!(f, "storage error: {}", err),
        }
    }
}

impl std::error::Error for QuizError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QuizError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for QuizError {
    fn from(err: io::Error) -> Self {
        QuizError::Io(err)
    }
}

impl From<csv::Error> for QuizError {
    fn from(err: csv::Error) -> Self {
        QuizError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, QuizError>;
