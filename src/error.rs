use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FormStampError {
    TemplateMissing(PathBuf),
    SignatureDecode(String),
    PageIndexOutOfRange {
        field: String,
        page: usize,
        page_count: usize,
    },
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for FormStampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormStampError::TemplateMissing(path) => {
                write!(f, "template pdf does not exist: {}", path.display())
            }
            FormStampError::SignatureDecode(message) => {
                write!(f, "signature image cannot be decoded: {}", message)
            }
            FormStampError::PageIndexOutOfRange {
                field,
                page,
                page_count,
            } => write!(
                f,
                "layout entry '{}' targets page {} but the template has {} page(s)",
                field, page, page_count
            ),
            FormStampError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            FormStampError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FormStampError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FormStampError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FormStampError {
    fn from(value: std::io::Error) -> Self {
        FormStampError::Io(value)
    }
}
