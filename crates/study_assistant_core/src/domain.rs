//! crates/study_assistant_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Everything here is plain data: persistence and transport concerns live behind the ports.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//=========================================================================================
// Users
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

/// A stored registry record. Only used inside the core - contains the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
    pub usage_count: u64,
}

// Represents a user - safe to hand to the outer layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
    pub usage_count: u64,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            joined_at: user.joined_at,
            usage_count: user.usage_count,
        }
    }
}

impl PublicUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

//=========================================================================================
// Uploaded content
//=========================================================================================

/// A normalized uploaded or captured file: a self-describing data URI plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePart {
    pub data: String,
    pub mime_type: String,
    pub name: String,
}

impl FilePart {
    /// Encodes raw bytes into a `data:<mime>;base64,<payload>` file part.
    pub fn from_bytes(bytes: &[u8], mime_type: &str, name: &str) -> Self {
        Self {
            data: format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes)),
            mime_type: mime_type.to_string(),
            name: name.to_string(),
        }
    }

    /// The base64 payload without the data URI prefix.
    pub fn payload(&self) -> &str {
        match self.data.split_once(',') {
            Some((_, payload)) => payload,
            None => &self.data,
        }
    }
}

//=========================================================================================
// Generation parameters
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionCategory {
    MultipleChoice,
    FillInBlank,
    TrueFalse,
    Brief,
    Descriptive,
    Creative,
}

impl QuestionCategory {
    pub const ALL: [QuestionCategory; 6] = [
        QuestionCategory::MultipleChoice,
        QuestionCategory::FillInBlank,
        QuestionCategory::TrueFalse,
        QuestionCategory::Brief,
        QuestionCategory::Descriptive,
        QuestionCategory::Creative,
    ];

    /// The label used inside prompts.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionCategory::MultipleChoice => "বহুনির্বাচনি প্রশ্ন (MCQ)",
            QuestionCategory::FillInBlank => "শূন্যস্থান পূরণ",
            QuestionCategory::TrueFalse => "সত্য-মিথ্যা",
            QuestionCategory::Brief => "সংক্ষিপ্ত প্রশ্ন",
            QuestionCategory::Descriptive => "বর্ণনামূলক প্রশ্ন",
            QuestionCategory::Creative => "সৃজনশীল প্রশ্ন",
        }
    }

    fn default_count(&self) -> u32 {
        match self {
            QuestionCategory::Descriptive | QuestionCategory::Creative => 3,
            _ => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTypeConfig {
    pub enabled: bool,
    pub count: u32,
}

/// One `QuestionTypeConfig` per supported category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTypes(BTreeMap<QuestionCategory, QuestionTypeConfig>);

impl Default for QuestionTypes {
    fn default() -> Self {
        Self(
            QuestionCategory::ALL
                .iter()
                .map(|c| {
                    (
                        *c,
                        QuestionTypeConfig {
                            enabled: false,
                            count: c.default_count(),
                        },
                    )
                })
                .collect(),
        )
    }
}

impl QuestionTypes {
    pub fn set(&mut self, category: QuestionCategory, enabled: bool, count: u32) {
        self.0.insert(category, QuestionTypeConfig { enabled, count });
    }

    pub fn get(&self, category: QuestionCategory) -> QuestionTypeConfig {
        self.0.get(&category).copied().unwrap_or(QuestionTypeConfig {
            enabled: false,
            count: category.default_count(),
        })
    }

    pub fn any_enabled(&self) -> bool {
        self.0.values().any(|c| c.enabled)
    }

    /// Enabled categories with their counts, in category order.
    pub fn enabled(&self) -> impl Iterator<Item = (QuestionCategory, u32)> + '_ {
        self.0
            .iter()
            .filter(|(_, config)| config.enabled)
            .map(|(category, config)| (*category, config.count))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Generate,
    Search,
    Chat,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Generate => "GENERATE",
            Mode::Search => "SEARCH",
            Mode::Chat => "CHAT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    #[default]
    General,
    Bangla,
    English,
    Math,
    Science,
    Ict,
    SocialScience,
    Religion,
}

impl Subject {
    /// Quantitative and scientific subjects are routed to the higher-capability model tier.
    pub fn is_quantitative(&self) -> bool {
        matches!(self, Subject::Math | Subject::Science)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Subject::General => "সাধারণ",
            Subject::Bangla => "বাংলা",
            Subject::English => "ইংরেজি",
            Subject::Math => "গণিত",
            Subject::Science => "বিজ্ঞান",
            Subject::Ict => "তথ্য ও যোগাযোগ প্রযুক্তি",
            Subject::SocialScience => "বাংলাদেশ ও বিশ্বপরিচয়",
            Subject::Religion => "ধর্ম ও নৈতিক শিক্ষা",
        }
    }
}

//=========================================================================================
// Results
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Ai,
}

/// A single entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Ai,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The stored outcome of one generation, search or chat interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub image_count: usize,
    pub mode: Mode,
    pub subject: Subject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<Vec<ChatMessage>>,
    /// Set when this record replaces an earlier one (a refinement).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<Uuid>,
}

impl GenerationResult {
    pub fn new(
        user_id: Uuid,
        mode: Mode,
        subject: Subject,
        content: String,
        image_count: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            content,
            created_at: Utc::now(),
            image_count,
            mode,
            subject,
            query: None,
            transcript: None,
            supersedes: None,
        }
    }
}

//=========================================================================================
// Admin configuration
//=========================================================================================

/// An admin-supplied replacement for the built-in instruction templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionOverride {
    pub version: u32,
    pub system_instruction: String,
    pub updated_by: Uuid,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_part_encodes_data_uri() {
        let part = FilePart::from_bytes(b"hello", "image/png", "page.png");
        assert_eq!(part.data, "data:image/png;base64,aGVsbG8=");
        assert_eq!(part.payload(), "aGVsbG8=");
    }

    #[test]
    fn payload_without_prefix_is_whole_string() {
        let part = FilePart {
            data: "aGVsbG8=".to_string(),
            mime_type: "image/png".to_string(),
            name: "raw".to_string(),
        };
        assert_eq!(part.payload(), "aGVsbG8=");
    }

    #[test]
    fn question_types_default_to_disabled() {
        let types = QuestionTypes::default();
        assert!(!types.any_enabled());
        assert_eq!(types.get(QuestionCategory::Descriptive).count, 3);
        assert_eq!(types.get(QuestionCategory::MultipleChoice).count, 5);
    }

    #[test]
    fn enabled_lists_only_selected_categories() {
        let mut types = QuestionTypes::default();
        types.set(QuestionCategory::TrueFalse, true, 4);
        types.set(QuestionCategory::MultipleChoice, true, 10);
        let enabled: Vec<_> = types.enabled().collect();
        assert_eq!(
            enabled,
            vec![
                (QuestionCategory::MultipleChoice, 10),
                (QuestionCategory::TrueFalse, 4)
            ]
        );
    }

    #[test]
    fn mode_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Mode::Chat).unwrap(), "\"CHAT\"");
        assert!(Subject::Science.is_quantitative());
        assert!(!Subject::Bangla.is_quantitative());
    }
}
