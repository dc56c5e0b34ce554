use lazy_static::lazy_static;
use regex::Regex;

use crate::models::chat::ChatMessage;

/// Number of trailing session messages scanned along with the question.
pub const RECENT_MESSAGES_SCANNED: usize = 3;

pub const CRISIS_MESSAGE: &str = "If you are thinking about harming yourself or others, please seek \
immediate help. Contact local emergency services, a crisis hotline or a mental health professional. \
I cannot provide emergency intervention.";

lazy_static! {
    static ref CRISIS_PATTERN: Regex =
        Regex::new(r"(?i)suicid|kill myself|harm myself|self-harm|overdose|hurt myself")
            .expect("crisis pattern is valid");
}

pub fn contains_crisis(text: &str) -> bool {
    CRISIS_PATTERN.is_match(text)
}

/// True when the question or any of the last few messages mentions a crisis.
pub fn screen(question: &str, history: &[ChatMessage]) -> bool {
    if contains_crisis(question) {
        return true;
    }
    history
        .iter()
        .rev()
        .take(RECENT_MESSAGES_SCANNED)
        .any(|m| contains_crisis(&m.message))
}
