//! Intent classification
//!
//! Decides which specialist a question belongs to. The primary classifier is
//! a weighted keyword match (fast, free, deterministic). A model-assisted
//! classifier can be layered on top for questions the keywords can't place;
//! its prompt and reply parsing live here too.
//!
//! Confidence for keyword matching is the winning specialization's share of
//! all matched weight: 1.0 when only one specialization matched anything,
//! 0.5 for an even two-way split, 0.0 when nothing matched.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use crate::error::Candidate;
use crate::providers::{ChatMessage, LlmProvider};
use crate::types::Specialization;

/// Keyword phrase and its weight. Multi-word phrases must match contiguous
/// tokens. A trailing plural "s"/"es" on the query token is folded.
type Keyword = (&'static str, f32);

const BENEFITS_KEYWORDS: &[Keyword] = &[
    ("deductible", 3.0),
    ("copay", 3.0),
    ("coinsurance", 3.0),
    ("premium", 2.0),
    ("out of pocket", 3.0),
    ("health plan", 3.0),
    ("health insurance", 3.0),
    ("insurance", 2.0),
    ("northwind", 3.0),
    ("health plus", 3.0),
    ("medical", 2.0),
    ("coverage", 2.0),
    ("covered", 1.5),
    ("prescription", 2.5),
    ("dental", 2.5),
    ("vision", 2.0),
    ("in network", 2.5),
    ("out of network", 2.5),
    ("enrollment", 1.5),
    ("enroll", 1.5),
    ("plan", 1.0),
    ("benefit", 1.0),
];

const HR_POLICY_KEYWORDS: &[Keyword] = &[
    ("policy", 2.0),
    ("policies", 2.0),
    ("handbook", 3.0),
    ("employee handbook", 3.0),
    ("remote work", 3.0),
    ("work from home", 3.0),
    ("hybrid work", 3.0),
    ("conduct", 2.5),
    ("dress code", 3.0),
    ("harassment", 3.0),
    ("performance review", 3.0),
    ("review", 1.0),
    ("leave", 2.0),
    ("sick leave", 3.0),
    ("parental leave", 3.0),
    ("pto", 2.5),
    ("vacation", 1.5),
    ("time off", 1.5),
    ("holiday", 1.5),
    ("disciplinary", 3.0),
    ("onboarding", 2.5),
    ("procedure", 2.0),
    ("job role", 2.5),
    ("role", 1.0),
    ("responsibilities", 2.0),
    ("promotion", 2.0),
    ("career", 1.5),
    ("safety", 2.0),
    ("compliance", 2.0),
];

const PERKS_KEYWORDS: &[Keyword] = &[
    ("perk", 3.0),
    ("perksplus", 3.0),
    ("gym", 3.0),
    ("fitness", 3.0),
    ("wellness", 3.0),
    ("wellbeing", 3.0),
    ("well being", 3.0),
    ("yoga", 3.0),
    ("massage", 2.5),
    ("reimbursement", 2.0),
    ("reimburse", 2.0),
    ("reimbursed", 2.0),
    ("membership", 2.0),
    ("discount", 2.0),
    ("recognition", 2.5),
    ("work life balance", 2.5),
    ("tuition", 2.5),
    ("professional development", 2.5),
    ("mental health", 2.0),
];

fn keywords_for(s: Specialization) -> &'static [Keyword] {
    match s {
        Specialization::Benefits => BENEFITS_KEYWORDS,
        Specialization::HrPolicy => HR_POLICY_KEYWORDS,
        Specialization::Perks => PERKS_KEYWORDS,
    }
}

/// How a routing decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationMethod {
    Keyword,
    Model,
}

/// Classifier output before any ambiguity policy is applied
#[derive(Debug, Clone)]
pub struct Classification {
    /// Highest-confidence specialization (tie-break: declaration order)
    pub best: Specialization,
    pub confidence: f32,
    pub method: ClassificationMethod,
    /// Matched keywords or the model's stated reason
    pub rationale: String,
    /// Confidence for every specialization, in declaration order
    pub candidates: Vec<Candidate>,
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn token_matches(query_token: &str, keyword_token: &str) -> bool {
    query_token == keyword_token
        || query_token
            .strip_prefix(keyword_token)
            .is_some_and(|rest| rest == "s" || rest == "es")
}

fn phrase_matches(tokens: &[String], phrase: &str) -> bool {
    let words: Vec<&str> = phrase.split_whitespace().collect();
    if words.is_empty() || words.len() > tokens.len() {
        return false;
    }
    tokens
        .windows(words.len())
        .any(|w| w.iter().zip(&words).all(|(t, k)| token_matches(t, k)))
}

/// Score a query against every specialization's keyword table
pub fn classify_keywords(query: &str) -> Classification {
    let tokens = tokenize(query);

    let scored: Vec<(Specialization, f32, Vec<&'static str>)> = Specialization::ALL
        .into_iter()
        .map(|s| {
            let matched: Vec<&'static str> = keywords_for(s)
                .iter()
                .filter(|(phrase, _)| phrase_matches(&tokens, phrase))
                .map(|(phrase, _)| *phrase)
                .collect();
            let score: f32 = keywords_for(s)
                .iter()
                .filter(|(phrase, _)| matched.contains(phrase))
                .map(|(_, w)| *w)
                .sum();
            (s, score, matched)
        })
        .collect();

    let total: f32 = scored.iter().map(|(_, score, _)| *score).sum();
    let confidence_of = |score: f32| if total > 0.0 { score / total } else { 0.0 };

    let mut best = &scored[0];
    for entry in &scored[1..] {
        if entry.1 > best.1 {
            best = entry;
        }
    }

    let candidates = scored
        .iter()
        .map(|(s, score, _)| Candidate {
            specialization: *s,
            confidence: confidence_of(*score),
        })
        .collect();

    let rationale = if best.2.is_empty() {
        "no topic keywords matched".to_string()
    } else {
        format!("matched keywords: {}", best.2.join(", "))
    };

    debug!(
        "Keyword classification: best={}, confidence={:.2}, total_weight={:.1}",
        best.0,
        confidence_of(best.1),
        total
    );

    Classification {
        best: best.0,
        confidence: confidence_of(best.1),
        method: ClassificationMethod::Keyword,
        rationale,
        candidates,
    }
}

/// Confidence for a model reply that names the agent in the expected format
pub const MODEL_EXPLICIT_CONFIDENCE: f32 = 0.9;
/// Confidence for a model reply that only mentions an agent in passing
pub const MODEL_MENTION_CONFIDENCE: f32 = 0.6;

const ORCHESTRATOR_INSTRUCTIONS: &str = r#"You are an HR Assistant Orchestrator. Your role is to analyze employee questions and route them to the appropriate specialist agent.

You have access to three specialist agents:
1. benefits: Handles health insurance, medical plans, coverage, deductibles, copays
2. hr-policy: Handles workplace policies, employee handbook, job roles, procedures
3. perks: Handles wellness programs, gym benefits, reimbursements, employee recognition

Respond with ONLY a JSON object:
{"agent": "<benefits|hr-policy|perks>", "reason": "<brief reason>"}

Examples:
- "What's my deductible for the health plan?" -> {"agent": "benefits", "reason": "Health plan deductible question"}
- "What's the policy on remote work?" -> {"agent": "hr-policy", "reason": "Remote work policy is in the employee handbook"}
- "How do I use my gym membership benefit?" -> {"agent": "perks", "reason": "Gym membership is a wellness perk"}

If a question spans multiple domains, route to the most relevant agent based on the primary focus."#;

#[derive(Debug, Deserialize)]
struct RoutingReply {
    agent: String,
    #[serde(default)]
    reason: String,
}

/// Ask the model which specialist should take the query
pub async fn classify_with_model(llm: &dyn LlmProvider, query: &str) -> Result<Classification> {
    let response = llm
        .chat(&[ChatMessage::user(query)], ORCHESTRATOR_INSTRUCTIONS)
        .await
        .context("Failed to classify query")?;

    let classification = parse_model_reply(&response.text);
    debug!(
        "Model classification: best={}, confidence={:.2}, rationale={}",
        classification.best, classification.confidence, classification.rationale
    );
    Ok(classification)
}

/// Parse a routing reply.
///
/// Accepts a `{"agent", "reason"}` JSON object, `AGENT:` / `REASON:` lines, or
/// a bare mention of an agent id anywhere in the text, in that order.
pub fn parse_model_reply(text: &str) -> Classification {
    let (picked, confidence, rationale) = parse_json_reply(text)
        .or_else(|| parse_line_reply(text))
        .map(|(s, reason)| (Some(s), MODEL_EXPLICIT_CONFIDENCE, reason))
        .or_else(|| {
            parse_mention(text).map(|s| {
                (
                    Some(s),
                    MODEL_MENTION_CONFIDENCE,
                    "agent mentioned in unstructured reply".to_string(),
                )
            })
        })
        .unwrap_or((None, 0.0, "model reply named no known agent".to_string()));

    let best = picked.unwrap_or(Specialization::Benefits);
    let candidates = Specialization::ALL
        .into_iter()
        .map(|s| Candidate {
            specialization: s,
            confidence: if picked == Some(s) { confidence } else { 0.0 },
        })
        .collect();

    Classification {
        best,
        confidence,
        method: ClassificationMethod::Model,
        rationale,
        candidates,
    }
}

fn parse_json_reply(text: &str) -> Option<(Specialization, String)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let reply: RoutingReply = serde_json::from_str(&text[start..=end]).ok()?;
    Specialization::from_id(&reply.agent).map(|s| (s, reply.reason))
}

fn parse_line_reply(text: &str) -> Option<(Specialization, String)> {
    let value_of = |key: &str| {
        text.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            (k.trim().eq_ignore_ascii_case(key)).then(|| v.trim().to_string())
        })
    };
    let agent = value_of("agent")?;
    let specialization = Specialization::from_id(&agent)?;
    Some((specialization, value_of("reason").unwrap_or_default()))
}

fn parse_mention(text: &str) -> Option<Specialization> {
    let lower = text.to_lowercase();
    if lower.contains("hr-policy") {
        return Some(Specialization::HrPolicy);
    }
    let tokens = tokenize(&lower);
    Specialization::ALL
        .into_iter()
        .find(|s| tokens.iter().any(|t| t == s.id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLlm;

    #[test]
    fn test_canonical_benefits_query() {
        let c = classify_keywords("What's the deductible for the health plan?");
        assert_eq!(c.best, Specialization::Benefits);
        assert!(c.confidence >= 0.6, "confidence {}", c.confidence);
        assert!(c.rationale.contains("deductible"));
    }

    #[test]
    fn test_canonical_hr_policy_query() {
        let c = classify_keywords("What's the policy on remote work?");
        assert_eq!(c.best, Specialization::HrPolicy);
        assert!(c.confidence >= 0.6, "confidence {}", c.confidence);
    }

    #[test]
    fn test_canonical_perks_query() {
        let c = classify_keywords("What gym benefits are available?");
        assert_eq!(c.best, Specialization::Perks);
        assert!(c.confidence >= 0.6, "confidence {}", c.confidence);
    }

    #[test]
    fn test_demo_queries_route_sensibly() {
        assert_eq!(
            classify_keywords("What's the difference between Northwind Health Plus and Standard plans?").best,
            Specialization::Benefits
        );
        assert_eq!(
            classify_keywords("What is the company's policy on remote work?").best,
            Specialization::HrPolicy
        );
        assert_eq!(
            classify_keywords("What wellness benefits does the company offer?").best,
            Specialization::Perks
        );
        assert_eq!(
            classify_keywords("What's the deductible for the health insurance?").best,
            Specialization::Benefits
        );
    }

    #[test]
    fn test_no_keywords_means_zero_confidence() {
        let c = classify_keywords("Hello there, how are you?");
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.best, Specialization::Benefits);
        assert!(c.candidates.iter().all(|c| c.confidence == 0.0));
    }

    #[test]
    fn test_even_split_is_low_confidence() {
        // "gym" (perks, 3.0) vs "deductible" (benefits, 3.0)
        let c = classify_keywords("gym deductible");
        assert!((c.confidence - 0.5).abs() < f32::EPSILON);
        assert_eq!(c.best, Specialization::Benefits);
    }

    #[test]
    fn test_candidates_sum_to_one() {
        let c = classify_keywords("Is my gym membership covered by the health plan?");
        let sum: f32 = c.candidates.iter().map(|c| c.confidence).sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(c.candidates.len(), 3);
    }

    #[test]
    fn test_plural_folding_and_word_boundaries() {
        let tokens = tokenize("Copays and deductibles");
        assert!(phrase_matches(&tokens, "copay"));
        assert!(phrase_matches(&tokens, "deductible"));
        // "planet" must not match "plan"
        assert!(!phrase_matches(&tokenize("planet"), "plan"));
        assert!(phrase_matches(&tokenize("out-of-pocket max"), "out of pocket"));
    }

    #[test]
    fn test_parse_json_reply() {
        let c = parse_model_reply(r#"Sure: {"agent": "perks", "reason": "Gym reimbursement"}"#);
        assert_eq!(c.best, Specialization::Perks);
        assert_eq!(c.confidence, MODEL_EXPLICIT_CONFIDENCE);
        assert_eq!(c.rationale, "Gym reimbursement");
        assert_eq!(c.method, ClassificationMethod::Model);
    }

    #[test]
    fn test_parse_line_reply() {
        let c = parse_model_reply("AGENT: hr-policy-agent\nREASON: Remote work is in the handbook");
        assert_eq!(c.best, Specialization::HrPolicy);
        assert_eq!(c.confidence, MODEL_EXPLICIT_CONFIDENCE);
        assert_eq!(c.rationale, "Remote work is in the handbook");
    }

    #[test]
    fn test_parse_mention_reply() {
        let c = parse_model_reply("I think the perks specialist fits best.");
        assert_eq!(c.best, Specialization::Perks);
        assert_eq!(c.confidence, MODEL_MENTION_CONFIDENCE);
    }

    #[test]
    fn test_parse_unknown_reply() {
        let c = parse_model_reply(r#"{"agent": "roles", "reason": "career"}"#);
        assert_eq!(c.confidence, 0.0);
        assert!(c.candidates.iter().all(|c| c.confidence == 0.0));
    }

    #[tokio::test]
    async fn test_classify_with_model_uses_orchestrator_prompt() {
        let llm = FakeLlm::reply(r#"{"agent": "benefits", "reason": "plan question"}"#);
        let seen = llm.seen_systems();
        let c = classify_with_model(&llm, "Which plan should I pick?").await.unwrap();
        assert_eq!(c.best, Specialization::Benefits);
        assert!(seen.lock().unwrap()[0].contains("HR Assistant Orchestrator"));
    }

    #[tokio::test]
    async fn test_classify_with_model_propagates_failure() {
        let llm = FakeLlm::failing("connection reset");
        assert!(classify_with_model(&llm, "q").await.is_err());
    }
}
