//! Decides which answer a question gets: a stored answer when retrieval is
//! confident, otherwise a generated one, otherwise a fixed fallback.

use serde::{Deserialize, Serialize};

use crate::generation::GeneratedAnswer;
use crate::retrieval::RetrievalHit;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.35;

pub const FALLBACK_MESSAGE: &str =
    "I'm not sure about that. Please consult a qualified health professional or provide more details.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    Retrieval,
    Generation,
    Fallback,
    Safety,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedAnswer {
    pub text: String,
    pub confidence: Option<f64>,
    pub source: AnswerSource,
    pub flagged: bool,
}

impl SelectedAnswer {
    pub fn fallback() -> Self {
        Self {
            text: FALLBACK_MESSAGE.to_string(),
            confidence: None,
            source: AnswerSource::Fallback,
            flagged: false,
        }
    }

    pub fn crisis(text: &str) -> Self {
        Self {
            text: text.to_string(),
            confidence: None,
            source: AnswerSource::Safety,
            flagged: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnswerSelector {
    threshold: f64,
}

impl Default for AnswerSelector {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl AnswerSelector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn retrieval_is_confident(&self, hit: Option<&RetrievalHit>) -> bool {
        hit.map_or(false, |h| h.score >= self.threshold && !h.text.trim().is_empty())
    }

    pub fn select(
        &self,
        retrieval: Option<&RetrievalHit>,
        generation: Option<&GeneratedAnswer>,
    ) -> SelectedAnswer {
        if let Some(hit) = retrieval.filter(|h| self.retrieval_is_confident(Some(h))) {
            return SelectedAnswer {
                text: hit.text.clone(),
                confidence: Some(hit.score),
                source: AnswerSource::Retrieval,
                flagged: false,
            };
        }

        match generation.filter(|g| !g.text.trim().is_empty()) {
            Some(generated) => SelectedAnswer {
                text: generated.text.clone(),
                confidence: generation_confidence(generated),
                source: AnswerSource::Generation,
                flagged: false,
            },
            None => SelectedAnswer::fallback(),
        }
    }
}

/// `exp(log_likelihood)`: the per-token geometric-mean probability when the
/// model reports a length-normalised score.
pub fn generation_confidence(answer: &GeneratedAnswer) -> Option<f64> {
    answer
        .log_likelihood
        .filter(|ll| ll.is_finite())
        .map(f64::exp)
}

pub fn display_score(score: Option<f64>) -> Option<f64> {
    score.map(|s| s.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f64) -> RetrievalHit {
        RetrievalHit {
            text: "Stored answer".to_string(),
            score,
        }
    }

    fn generated(log_likelihood: Option<f64>) -> GeneratedAnswer {
        GeneratedAnswer {
            text: "Generated answer".to_string(),
            log_likelihood,
        }
    }

    #[test]
    fn confident_retrieval_wins() {
        let selector = AnswerSelector::new(0.35);
        let answer = selector.select(Some(&hit(0.5)), Some(&generated(Some(-0.1))));
        assert_eq!(answer.source, AnswerSource::Retrieval);
        assert_eq!(answer.confidence, Some(0.5));
        assert_eq!(answer.text, "Stored answer");
    }

    #[test]
    fn threshold_is_inclusive() {
        let selector = AnswerSelector::new(0.35);
        assert_eq!(selector.select(Some(&hit(0.35)), None).source, AnswerSource::Retrieval);
    }

    #[test]
    fn weak_retrieval_defers_to_generation() {
        let selector = AnswerSelector::new(0.35);
        let answer = selector.select(Some(&hit(0.1)), Some(&generated(Some(0.0))));
        assert_eq!(answer.source, AnswerSource::Generation);
        assert_eq!(answer.confidence, Some(1.0));
        assert_eq!(answer.text, "Generated answer");
    }

    #[test]
    fn generation_without_likelihood_has_no_confidence() {
        let answer = AnswerSelector::default().select(None, Some(&generated(None)));
        assert_eq!(answer.source, AnswerSource::Generation);
        assert_eq!(answer.confidence, None);
    }

    #[test]
    fn both_failing_returns_fallback() {
        let answer = AnswerSelector::default().select(None, None);
        assert_eq!(answer, SelectedAnswer::fallback());
        assert_eq!(answer.text, FALLBACK_MESSAGE);

        let weak = AnswerSelector::default().select(Some(&hit(0.1)), None);
        assert_eq!(weak.source, AnswerSource::Fallback);
        assert_eq!(weak.confidence, None);
    }

    #[test]
    fn empty_generation_counts_as_missing() {
        let empty = GeneratedAnswer {
            text: "   ".to_string(),
            log_likelihood: Some(-0.2),
        };
        let answer = AnswerSelector::default().select(Some(&hit(0.2)), Some(&empty));
        assert_eq!(answer.source, AnswerSource::Fallback);
    }

    #[test]
    fn blank_retrieved_text_is_not_confident() {
        let selector = AnswerSelector::new(0.35);
        let blank = RetrievalHit {
            text: "   ".to_string(),
            score: 0.9,
        };
        assert!(!selector.retrieval_is_confident(Some(&blank)));

        let answer = selector.select(Some(&blank), Some(&generated(Some(-0.1))));
        assert_eq!(answer.source, AnswerSource::Generation);
        assert_eq!(answer.text, "Generated answer");

        let answer = selector.select(Some(&blank), None);
        assert_eq!(answer.source, AnswerSource::Fallback);
        assert_eq!(answer.confidence, None);
    }

    #[test]
    fn display_score_is_clamped() {
        assert_eq!(display_score(Some(1.7)), Some(1.0));
        assert_eq!(display_score(Some(-0.3)), Some(0.0));
        assert_eq!(display_score(Some(0.42)), Some(0.42));
        assert_eq!(display_score(None), None);
    }

    #[test]
    fn source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&AnswerSource::Generation).unwrap(), "\"generation\"");
    }
}
