//! crates/study_assistant_core/src/error.rs
//!
//! The error taxonomy shared by every core service. Each kind carries a localized
//! message for display; none of them is fatal to the application.

use crate::ports::PortError;

/// Missing or unacceptable user input. Recovered locally, no retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("at least one file is required")]
    NoFiles,
    #[error("at least one question type must be enabled")]
    NoQuestionTypes,
    #[error("a query or an attachment is required")]
    EmptyQuery,
    #[error("a message or an attachment is required")]
    EmptyMessage,
    #[error("unsupported file type '{0}'")]
    UnsupportedFile(String),
    #[error("file '{name}' exceeds the {limit} byte limit")]
    FileTooLarge { name: String, limit: usize },
    #[error("the camera is not open")]
    CameraClosed,
    #[error("nothing to refine")]
    NothingToRefine,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
}

/// The primary error type for the core services.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Administrator role required")]
    AdminOnly,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Clipboard unavailable")]
    ClipboardUnavailable,

    #[error("Index {index} out of range for {len} files")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Store(#[from] PortError),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// A stable, machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::PermissionDenied => "permission_denied",
            CoreError::AdminOnly => "forbidden",
            CoreError::DuplicateEmail => "duplicate_email",
            CoreError::InvalidCredentials => "invalid_credentials",
            CoreError::NotAuthenticated => "not_authenticated",
            CoreError::GenerationFailed(_) => "generation_failed",
            CoreError::ExportFailed(_) => "export_failed",
            CoreError::ClipboardUnavailable => "clipboard_unavailable",
            CoreError::IndexOutOfRange { .. } => "index_out_of_range",
            CoreError::NotFound(_) => "not_found",
            CoreError::Store(_) => "storage_error",
        }
    }

    /// The localized message shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(v) => match v {
                ValidationError::NoFiles => "অনুগ্রহ করে অন্তত একটি ফাইল আপলোড করুন।".to_string(),
                ValidationError::NoQuestionTypes => {
                    "অনুগ্রহ করে অন্তত একটি প্রশ্নের ধরণ নির্বাচন করুন।".to_string()
                }
                ValidationError::EmptyQuery => {
                    "অনুগ্রহ করে আপনার প্রশ্ন লিখুন অথবা একটি ফাইল যুক্ত করুন।".to_string()
                }
                ValidationError::EmptyMessage => "অনুগ্রহ করে একটি বার্তা লিখুন।".to_string(),
                ValidationError::UnsupportedFile(mime) => {
                    format!("এই ধরণের ফাইল সমর্থিত নয়: {}", mime)
                }
                ValidationError::FileTooLarge { name, .. } => {
                    format!("ফাইলটি অনেক বড়: {}", name)
                }
                ValidationError::CameraClosed => "ক্যামেরা চালু নেই।".to_string(),
                ValidationError::NothingToRefine => {
                    "সংশোধনের জন্য কোনো প্রশ্নপত্র নেই।".to_string()
                }
                ValidationError::MissingField(field) => format!("প্রয়োজনীয় তথ্য নেই: {}", field),
            },
            CoreError::PermissionDenied => {
                "ক্যামেরা ব্যবহারের অনুমতি পাওয়া যায়নি। অনুগ্রহ করে ব্রাউজার সেটিংস চেক করুন।"
                    .to_string()
            }
            CoreError::AdminOnly => "এই কাজের জন্য অ্যাডমিন অনুমতি প্রয়োজন।".to_string(),
            CoreError::DuplicateEmail => "এই ইমেইল দিয়ে ইতিমধ্যে একটি অ্যাকাউন্ট আছে।".to_string(),
            CoreError::InvalidCredentials => "ইমেইল অথবা পাসওয়ার্ড সঠিক নয়।".to_string(),
            CoreError::NotAuthenticated => "অনুগ্রহ করে আগে লগইন করুন।".to_string(),
            CoreError::GenerationFailed(msg) => {
                format!("AI প্রসেসিং করতে ব্যর্থ হয়েছে: {}", msg)
            }
            CoreError::ExportFailed(msg) => format!("ফাইল তৈরি করা সম্ভব হয়নি: {}", msg),
            CoreError::ClipboardUnavailable => "ক্লিপবোর্ডে কপি করা সম্ভব হয়নি।".to_string(),
            CoreError::IndexOutOfRange { .. } => "ফাইলটি খুঁজে পাওয়া যায়নি।".to_string(),
            CoreError::NotFound(_) => "তথ্যটি খুঁজে পাওয়া যায়নি।".to_string(),
            CoreError::Store(_) => "অপ্রত্যাশিত কোনো সমস্যা হয়েছে।".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failure_keeps_underlying_message() {
        let err = CoreError::GenerationFailed("quota exceeded".to_string());
        assert_eq!(err.kind(), "generation_failed");
        assert!(err.user_message().ends_with("quota exceeded"));
    }

    #[test]
    fn validation_converts_from_inner_kind() {
        let err: CoreError = ValidationError::NoFiles.into();
        assert_eq!(err.kind(), "validation_error");
        assert!(matches!(err, CoreError::Validation(ValidationError::NoFiles)));
    }
}
