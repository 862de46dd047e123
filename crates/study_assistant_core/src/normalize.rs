//! crates/study_assistant_core/src/normalize.rs
//!
//! Strips presentational artifacts the model may emit despite being told not to.

use regex::Regex;
use std::sync::OnceLock;

struct Patterns {
    bold: Regex,
    heading: Regex,
    bengali_step: Regex,
    english_step: Regex,
    blank_line: Regex,
    excess_newlines: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        bold: Regex::new(r"\*\*").expect("valid bold pattern"),
        heading: Regex::new(r"#+").expect("valid heading pattern"),
        bengali_step: Regex::new(r"ধাপ\s*[০-৯0-9]+\s*[:।\-]\s*").expect("valid step pattern"),
        english_step: Regex::new(r"(?i)step\s*[0-9]+\s*[:।\-]\s*").expect("valid step pattern"),
        blank_line: Regex::new(r"(?m)^[ \t]+$").expect("valid blank line pattern"),
        excess_newlines: Regex::new(r"\n{3,}").expect("valid newline pattern"),
    })
}

/// Removes markdown emphasis and heading markers, "ধাপ N:" / "Step N:" labels and
/// excess blank lines; a lone `*` left over is a multiplication sign.
///
/// Applying it to its own output changes nothing.
pub fn clean_response(text: &str) -> String {
    let p = patterns();
    let mut text = text.replace('\r', "");
    // A removal can splice its neighbours into a new marker, so repeat to a fixed point.
    loop {
        let next = [&p.bold, &p.heading, &p.bengali_step, &p.english_step]
            .iter()
            .fold(text.clone(), |acc, re| re.replace_all(&acc, "").into_owned());
        if next == text {
            break;
        }
        text = next;
    }
    let text = p.blank_line.replace_all(&text, "");
    let text = p.excess_newlines.replace_all(&text, "\n\n");
    text.replace('*', "×").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_markers() {
        assert_eq!(clean_response("## শিরোনাম\n**গুরুত্বপূর্ণ** তথ্য"), "শিরোনাম\nগুরুত্বপূর্ণ তথ্য");
    }

    #[test]
    fn removes_step_labels_in_both_languages() {
        assert_eq!(clean_response("ধাপ ১: ক = ২\nStep 2 - x = 4"), "ক = ২\nx = 4");
        assert_eq!(clean_response("ধাপ২। যোগ করি"), "যোগ করি");
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(clean_response("a\r\n\n  \n\n\nb"), "a\n\nb");
    }

    #[test]
    fn single_star_becomes_multiplication() {
        assert_eq!(clean_response("৫ * ৩ = ১৫"), "৫ × ৩ = ১৫");
    }

    #[test]
    fn spliced_labels_are_removed_in_one_call() {
        assert_eq!(clean_response("StStep 1: ep 2: x"), "x");
        assert_eq!(clean_response("Step 1: ধাপStep 2: ১: উত্তর"), "উত্তর");
        assert_eq!(clean_response("#Step 1: # শিরোনাম"), "শিরোনাম");
    }

    #[test]
    fn is_idempotent() {
        let samples = [
            "**প্রশ্ন ১**\n\n\n\nউত্তর: ৪ * ২\n### Step 3: done",
            "  ধাপ ১ : সমাধানঃ\n \t \nআমরা জানি,\n\n\n\n\nx = 2  ",
            "Plain text with nothing to strip.",
            "",
            "StStep 1: ep 2: x",
            "Step 1: ধাপStep 2: ১: উত্তর",
            "#Step 1: # শিরোনাম",
            "*Step 1: *x",
            "ধাপ ধাপ ১: ২: শেষ",
        ];
        for sample in samples {
            let once = clean_response(sample);
            assert_eq!(clean_response(&once), once, "sample: {:?}", sample);
        }
    }
}
