//! crates/study_assistant_core/src/prompt.rs
//!
//! Instruction templates, the admin instruction override, and model tier routing.

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{InstructionOverride, Mode, QuestionTypes, Subject};
use crate::error::CoreResult;
use crate::store::{keys, JsonStore};

const REFERENCE_RULE: &str = "প্রতিটি উত্তর বা প্রশ্নের শেষে অবশ্যই রেফারেন্স হিসেবে বইয়ের পৃষ্ঠা নম্বর, অনুচ্ছেদ নম্বর এবং লাইন নম্বর উল্লেখ করবে। উদাহরণ: (সূত্র: পৃষ্ঠা-২৪, অনুচ্ছেদ-০২, লাইন-০৮)।";

const MATH_TEMPLATE: &str = r#"তুমি একজন গণিত বিশেষজ্ঞ। গাইড বইয়ের ফরম্যাট অনুসরণ করো:
১. প্রথমে 'সমাধানঃ' লিখবে, তারপর 'দেওয়া আছেঃ' লিখে প্রশ্নের মানগুলো লিখবে।
২. 'আমরা জানি,' লিখে প্রয়োজনীয় সূত্রটি লিখবে।
৩. 'ধাপ ১' বা 'Step 1' এর মতো কোনো ক্রমিক লেবেল ব্যবহার করবে না।
৪. গুণ ও ভাগের জন্য × এবং ÷ চিহ্ন ব্যবহার করবে, প্রতিটি ধাপ আলাদা লাইনে লিখবে।
৫. উত্তরের শেষে একক উল্লেখ করবে।
৬. {reference}
৭. কোনো মার্কডাউন (**, #) ব্যবহার করবে না।"#;

const ANSWER_TEMPLATE: &str = r#"তুমি একজন বিশেষজ্ঞ শিক্ষক। তোমার উত্তরের ফরম্যাট:
১. সমাধানঃ উত্তরটি সরাসরি ও যৌক্তিকভাবে সাজিয়ে দাও, কোনো ক্রমিক ধাপ লেবেল ছাড়া।
২. তথ্যসূত্রঃ {reference}
৩. কোনো মার্কডাউন (যেমন **, #) ব্যবহার করবে না।
৪. তথ্যগুলো আলাদা আলাদা লাইনে গাইড বইয়ের স্টাইলে সাজিয়ে লিখবে।"#;

const PAPER_TEMPLATE: &str = r#"তুমি একজন দক্ষ প্রশ্নপত্র প্রস্তুতকারক।
১. রেফারেন্সঃ প্রতিটি প্রশ্নের শেষে (পৃষ্ঠা, অনুচ্ছেদ, লাইন) ব্র্যাকেটে উল্লেখ করবে।
২. স্টাইলঃ কোনো ** বা মার্কডাউন ফরম্যাটিং ব্যবহার করবে না।
৩. গঠনঃ বিষয়বস্তু মার্জিত ভাষায় আলাদা লাইনে লিখবে, অতিরিক্ত ফাঁকা লাইন ছাড়া।"#;

const DEFAULT_CUSTOM_INSTRUCTION: &str = "বইয়ের তথ্য অনুযায়ী নিখুঁত প্রশ্ন ও উত্তর তৈরি করো।";

//=========================================================================================
// Model tiers
//=========================================================================================

/// The two model identifiers requests are routed between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTiers {
    pub pro: String,
    pub flash: String,
}

impl Default for ModelTiers {
    fn default() -> Self {
        Self {
            pro: "gemini-2.5-pro".to_string(),
            flash: "gemini-2.5-flash".to_string(),
        }
    }
}

impl ModelTiers {
    /// Static routing: quantitative subjects get the higher-capability tier.
    pub fn select(&self, subject: Subject) -> &str {
        if subject.is_quantitative() {
            &self.pro
        } else {
            &self.flash
        }
    }
}

//=========================================================================================
// Instruction resolution
//=========================================================================================

/// The instruction for one request: a non-blank admin override wins over the templates.
pub fn resolve_instruction(
    override_record: Option<&InstructionOverride>,
    mode: Mode,
    subject: Subject,
) -> String {
    if let Some(record) = override_record {
        if !record.system_instruction.trim().is_empty() {
            return record.system_instruction.clone();
        }
    }
    let template = if subject == Subject::Math {
        MATH_TEMPLATE
    } else {
        match mode {
            Mode::Chat | Mode::Search => ANSWER_TEMPLATE,
            Mode::Generate => PAPER_TEMPLATE,
        }
    };
    template.replace("{reference}", REFERENCE_RULE)
}

/// Structured parameters appended after the instruction.
#[derive(Debug, Clone)]
pub enum PromptParams<'a> {
    Paper {
        types: &'a QuestionTypes,
        custom_instruction: &'a str,
    },
    Query {
        text: &'a str,
    },
    Refine {
        previous: &'a str,
        instruction: &'a str,
    },
}

pub fn build_prompt(instruction: &str, subject: Subject, params: &PromptParams<'_>) -> String {
    let mut prompt = format!("{}\nবিষয়: {}\n", instruction, subject.label());
    match params {
        PromptParams::Paper {
            types,
            custom_instruction,
        } => {
            let details = types
                .enabled()
                .map(|(category, count)| format!("{}: {}টি", category.label(), count))
                .collect::<Vec<_>>()
                .join(", ");
            let custom = if custom_instruction.trim().is_empty() {
                DEFAULT_CUSTOM_INSTRUCTION
            } else {
                custom_instruction.trim()
            };
            prompt.push_str(&format!("প্রশ্নের ধরণ: {}\n", details));
            prompt.push_str(&format!("ব্যবহারকারীর বিশেষ নির্দেশ: {}\n", custom));
            prompt.push_str("বিশেষ নির্দেশ: ফাইল থেকে তথ্য নিয়ে প্রশ্ন ও উত্তর তৈরি করো।\n");
        }
        PromptParams::Query { text } => {
            prompt.push_str(&format!("ব্যবহারকারীর জিজ্ঞাসা: \"{}\"\n", text.trim()));
            prompt.push_str("নির্দেশ: উত্তরটি রেফারেন্স (পৃষ্ঠা, অনুচ্ছেদ, লাইন) সহ নিখুঁতভাবে তৈরি করো।\n");
        }
        PromptParams::Refine {
            previous,
            instruction,
        } => {
            prompt.push_str("বর্তমান প্রশ্নপত্র:\n");
            prompt.push_str(previous);
            prompt.push_str(&format!("\nসংশোধনের নির্দেশ: {}\n", instruction.trim()));
            prompt.push_str("নির্দেশ অনুযায়ী সম্পূর্ণ সংশোধিত প্রশ্নপত্রটি আবার লেখো।\n");
        }
    }
    prompt
}

//=========================================================================================
// Admin override record
//=========================================================================================

/// Reads and writes the versioned instruction override.
#[derive(Clone)]
pub struct InstructionSource {
    store: JsonStore,
}

impl InstructionSource {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    /// The current override. An unreadable record falls back to the templates.
    pub async fn current(&self) -> Option<InstructionOverride> {
        match self.store.load(keys::ADMIN_CONFIG).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Admin config error, using built-in templates: {}", e);
                None
            }
        }
    }

    /// Stores a new override version. Blank text clears the override.
    pub async fn update(
        &self,
        system_instruction: &str,
        admin_id: Uuid,
    ) -> CoreResult<Option<InstructionOverride>> {
        if system_instruction.trim().is_empty() {
            self.store.delete(keys::ADMIN_CONFIG).await?;
            info!("Instruction override cleared.");
            return Ok(None);
        }
        let version = self.current().await.map(|r| r.version + 1).unwrap_or(1);
        let record = InstructionOverride {
            version,
            system_instruction: system_instruction.to_string(),
            updated_by: admin_id,
            updated_at: Utc::now(),
        };
        self.store.save(keys::ADMIN_CONFIG, &record).await?;
        info!(version, "Instruction override updated.");
        Ok(Some(record))
    }
}
