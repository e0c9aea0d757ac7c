//! Intent Classifier
//!
//! Maps free text onto a governed action using an ordered rule table.
//! Each rule is a keyword predicate over normalized text (lower-cased,
//! whitespace collapsed) plus an extractor for embedded parameters.
//! Rules are tried top-down and the first match wins, so the position of a
//! rule in `RULES` is its priority. No I/O and no randomness.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Action, Parameters};

/// Longest free-text message the classifier will look at.
pub const MAX_MESSAGE_CHARS: usize = 5000;

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Matched {
        action: Action,
        parameters: Parameters,
    },
    Unrecognized {
        text: String,
        reason: UnrecognizedReason,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnrecognizedReason {
    EmptyMessage,
    MessageTooLong,
    UnknownIntent,
    MissingSessionId,
    MissingSessionNames,
}

impl UnrecognizedReason {
    pub fn hint(&self) -> &'static str {
        match self {
            UnrecognizedReason::EmptyMessage => "the message is empty",
            UnrecognizedReason::MessageTooLong => "the message exceeds 5000 characters",
            UnrecognizedReason::UnknownIntent => "try one of the example prompts",
            UnrecognizedReason::MissingSessionId => {
                "include a session id, e.g. 'reconcile session 1'"
            }
            UnrecognizedReason::MissingSessionNames => {
                "use 'create session <name> between <system a> and <system b>'"
            }
        }
    }
}

/// Text in the form the rules see it.
pub struct NormalizedText<'a> {
    /// Whitespace-split tokens with their original casing.
    original: Vec<&'a str>,
    lower: Vec<String>,
    text: String,
}

impl<'a> NormalizedText<'a> {
    pub fn new(input: &'a str) -> Self {
        let original: Vec<&str> = input.split_whitespace().collect();
        let lower: Vec<String> = original.iter().map(|t| t.to_lowercase()).collect();
        let text = lower.join(" ");
        Self {
            original,
            lower,
            text,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    fn contains(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }

    fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.text.contains(n))
    }

    /// One of `first` immediately followed by `second`, both as whole words.
    fn has_pair(&self, first: &[&str], second: &str) -> bool {
        self.lower.windows(2).any(|pair| {
            let head = clean_token(&pair[0]);
            first.iter().any(|w| *w == head) && clean_token(&pair[1]) == second
        })
    }

    /// A whole-word verb somewhere before a word starting with `noun`.
    fn verb_before(&self, verbs: &[&str], noun: &str) -> bool {
        self.lower.iter().enumerate().any(|(i, token)| {
            let word = clean_token(token);
            verbs.iter().any(|v| *v == word)
                && self.lower[i + 1..]
                    .iter()
                    .any(|t| clean_token(t).starts_with(noun))
        })
    }
}

enum Extraction {
    Parameters(Parameters),
    Missing(UnrecognizedReason),
}

/// One row of the priority table.
pub struct Rule {
    pub action: Action,
    matches: fn(&NormalizedText) -> bool,
    extract: fn(&NormalizedText) -> Extraction,
}

impl Rule {
    pub fn matches(&self, text: &NormalizedText) -> bool {
        (self.matches)(text)
    }
}

static RULES: [Rule; 10] = [
    Rule {
        action: Action::Health,
        matches: |t| t.contains_any(&["health", "status"]),
        extract: no_parameters,
    },
    Rule {
        action: Action::ClearTransactions,
        matches: |t| t.verb_before(&["clear", "delete", "remove"], "transaction"),
        extract: session_parameters,
    },
    Rule {
        action: Action::DeleteSession,
        matches: |t| t.has_pair(&["delete", "remove"], "session"),
        extract: session_parameters,
    },
    Rule {
        action: Action::CreateSession,
        matches: |t| t.has_pair(&["create", "new"], "session"),
        extract: create_session_parameters,
    },
    Rule {
        action: Action::ListSessions,
        matches: |t| {
            t.contains("list sessions")
                || (t.contains("sessions") && t.contains_any(&["list", "show", "all"]))
        },
        extract: no_parameters,
    },
    Rule {
        action: Action::GetSession,
        matches: |t| t.contains_any(&["get session", "session details"]),
        extract: session_parameters,
    },
    Rule {
        action: Action::GetSummary,
        matches: |t| t.contains("summary"),
        extract: session_parameters,
    },
    Rule {
        action: Action::GetDiscrepancies,
        matches: |t| t.contains_any(&["discrepanc", "mismatch"]),
        extract: session_parameters,
    },
    Rule {
        action: Action::RunReconciliation,
        matches: |t| t.contains_any(&["reconcil", "analyse", "analyze", "compare", "match"]),
        extract: session_parameters,
    },
    Rule {
        action: Action::ListTransactions,
        matches: |t| t.contains("transaction"),
        extract: session_parameters,
    },
];

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify free text into an action and its parameters.
    pub fn classify(text: &str) -> Classification {
        let unrecognized = |reason| Classification::Unrecognized {
            text: text.to_string(),
            reason,
        };

        if text.trim().is_empty() {
            return unrecognized(UnrecognizedReason::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return unrecognized(UnrecognizedReason::MessageTooLong);
        }

        let normalized = NormalizedText::new(text);

        match RULES.iter().find(|rule| rule.matches(&normalized)) {
            Some(rule) => match (rule.extract)(&normalized) {
                Extraction::Parameters(parameters) => Classification::Matched {
                    action: rule.action,
                    parameters,
                },
                Extraction::Missing(reason) => unrecognized(reason),
            },
            None => unrecognized(UnrecognizedReason::UnknownIntent),
        }
    }

    /// The rule table in priority order.
    pub fn rules() -> &'static [Rule] {
        &RULES
    }

    /// Every action whose rule matches `text`, highest priority first.
    pub fn candidates(text: &str) -> Vec<Action> {
        let normalized = NormalizedText::new(text);
        RULES
            .iter()
            .filter(|rule| rule.matches(&normalized))
            .map(|rule| rule.action)
            .collect()
    }
}

/// Prompts shown to chat users when their request is not recognized.
pub const EXAMPLE_PROMPTS: &[(&str, &str)] = &[
    ("health", "Check if the API is running"),
    ("list sessions", "List all reconciliation sessions"),
    ("get session 1", "Get details of a specific session"),
    ("reconcile session 1", "Run reconciliation analysis using set operations"),
    ("show discrepancies for session 1", "Find amount mismatches between systems"),
    ("summary for session 1", "Get reconciliation summary with match rate"),
    ("show transactions for session 1", "List all transactions in a session"),
    (
        "create session q3-close between finance and stripe",
        "Create a new reconciliation session",
    ),
    ("delete session 1", "Delete a session and its transactions"),
];

//
// ================= Extractors =================
//

fn no_parameters(_: &NormalizedText) -> Extraction {
    Extraction::Parameters(Parameters::new())
}

fn session_parameters(text: &NormalizedText) -> Extraction {
    match extract_session_id(text) {
        Some(id) => {
            let mut parameters = Parameters::new();
            parameters.insert("session_id".to_string(), json!(id));
            Extraction::Parameters(parameters)
        }
        None => Extraction::Missing(UnrecognizedReason::MissingSessionId),
    }
}

fn clean_token(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

fn parse_id(token: &str) -> Option<i64> {
    let token = clean_token(token);
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// `session <N>` / `session #<N>` first, then the first standalone integer.
pub fn extract_session_id(text: &NormalizedText) -> Option<i64> {
    let tokens = &text.lower;

    let after_keyword = tokens.windows(2).find_map(|pair| {
        if clean_token(&pair[0]) == "session" {
            parse_id(&pair[1])
        } else {
            None
        }
    });

    after_keyword.or_else(|| tokens.iter().find_map(|t| parse_id(t)))
}

fn create_session_parameters(text: &NormalizedText) -> Extraction {
    let missing = Extraction::Missing(UnrecognizedReason::MissingSessionNames);
    let lower = &text.lower;

    let Some(start) = lower
        .windows(2)
        .position(|pair| matches!(pair[0].as_str(), "create" | "new") && pair[1] == "session")
        .map(|i| i + 2)
    else {
        return missing;
    };

    let Some(between) = position_after(lower, start, "between") else {
        return missing;
    };
    let Some(and) = position_after(lower, between + 1, "and") else {
        return missing;
    };

    let name = join_tokens(&text.original[start..between]);
    let system_a = join_tokens(&text.original[between + 1..and]);
    let system_b = join_tokens(&text.original[and + 1..]);

    if name.is_empty() || system_a.is_empty() || system_b.is_empty() {
        return missing;
    }

    let mut parameters = Parameters::new();
    parameters.insert("session_name".to_string(), Value::String(name));
    parameters.insert("system_a_name".to_string(), Value::String(system_a));
    parameters.insert("system_b_name".to_string(), Value::String(system_b));
    Extraction::Parameters(parameters)
}

fn position_after(tokens: &[String], from: usize, word: &str) -> Option<usize> {
    tokens
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, t)| t.as_str() == word)
        .map(|(i, _)| i)
}

fn join_tokens(tokens: &[&str]) -> String {
    tokens
        .join(" ")
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '.' | ',' | '!' | '?'))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched(text: &str) -> (Action, Value) {
        match IntentClassifier::classify(text) {
            Classification::Matched { action, parameters } => (action, Value::Object(parameters)),
            other => panic!("'{}' was not matched: {:?}", text, other),
        }
    }

    fn reason(text: &str) -> UnrecognizedReason {
        match IntentClassifier::classify(text) {
            Classification::Unrecognized { reason, text: kept } => {
                assert_eq!(kept, text);
                reason
            }
            other => panic!("'{}' unexpectedly matched: {:?}", text, other),
        }
    }

    #[test]
    fn test_table_driven_classification() {
        let cases = vec![
            ("health", Action::Health, json!({})),
            ("Is the API status ok?", Action::Health, json!({})),
            ("list sessions", Action::ListSessions, json!({})),
            ("show me all sessions", Action::ListSessions, json!({})),
            ("get session 7", Action::GetSession, json!({"session_id": 7})),
            ("session details for #12", Action::GetSession, json!({"session_id": 12})),
            ("summary for session 1", Action::GetSummary, json!({"session_id": 1})),
            ("show discrepancies for session 3", Action::GetDiscrepancies, json!({"session_id": 3})),
            ("any amount mismatch in 4?", Action::GetDiscrepancies, json!({"session_id": 4})),
            ("reconcile session 1", Action::RunReconciliation, json!({"session_id": 1})),
            ("Analyze   SESSION   9", Action::RunReconciliation, json!({"session_id": 9})),
            ("show transactions for session 1", Action::ListTransactions, json!({"session_id": 1})),
            ("delete session 1", Action::DeleteSession, json!({"session_id": 1})),
            ("clear transactions for session 5", Action::ClearTransactions, json!({"session_id": 5})),
        ];

        for (text, action, parameters) in cases {
            assert_eq!(matched(text), (action, parameters), "input: {}", text);
        }
    }

    #[test]
    fn test_classification_is_deterministic() {
        for (prompt, _) in EXAMPLE_PROMPTS {
            let first = IntentClassifier::classify(prompt);
            for _ in 0..5 {
                assert_eq!(IntentClassifier::classify(prompt), first);
            }
        }
    }

    #[test]
    fn test_earlier_rule_wins_when_several_match() {
        // Both the discrepancy rule and the reconciliation rule ("match")
        // accept this text; the discrepancy rule sits higher in the table.
        let text = "mismatch report for session 2";
        assert_eq!(
            IntentClassifier::candidates(text),
            vec![Action::GetDiscrepancies, Action::RunReconciliation]
        );
        assert_eq!(matched(text).0, Action::GetDiscrepancies);

        // Write rules outrank the generic transaction listing.
        let text = "delete transactions for session 3";
        assert_eq!(
            IntentClassifier::candidates(text),
            vec![Action::ClearTransactions, Action::ListTransactions]
        );
        assert_eq!(matched(text).0, Action::ClearTransactions);

        assert_eq!(matched("discrepancies for session 3").0, Action::GetDiscrepancies);
    }

    #[test]
    fn test_write_verbs_must_be_whole_words() {
        let reads = vec![
            "show deleted transactions for session 3",
            "show cleared transactions for session 3",
            "list removed transactions in session 3",
            "unclear transactions in session 3",
        ];
        for text in reads {
            assert_eq!(IntentClassifier::candidates(text), vec![Action::ListTransactions], "{}", text);
            assert_eq!(matched(text), (Action::ListTransactions, json!({"session_id": 3})));
        }

        assert_eq!(reason("undelete session 4"), UnrecognizedReason::UnknownIntent);
        assert_eq!(reason("recreate session q3 between a and b"), UnrecognizedReason::UnknownIntent);
        assert_eq!(matched("Delete Session: 4"), (Action::DeleteSession, json!({"session_id": 4})));
    }

    #[test]
    fn test_priority_table_order_is_fixed() {
        let order: Vec<Action> = IntentClassifier::rules().iter().map(|r| r.action).collect();
        assert_eq!(
            order,
            vec![
                Action::Health,
                Action::ClearTransactions,
                Action::DeleteSession,
                Action::CreateSession,
                Action::ListSessions,
                Action::GetSession,
                Action::GetSummary,
                Action::GetDiscrepancies,
                Action::RunReconciliation,
                Action::ListTransactions,
            ]
        );
    }

    #[test]
    fn test_session_token_preferred_over_other_numbers() {
        assert_eq!(
            matched("reconcile the 2 ledgers in session 14"),
            (Action::RunReconciliation, json!({"session_id": 14}))
        );
    }

    #[test]
    fn test_create_session_extraction_keeps_casing() {
        assert_eq!(
            matched("Create session \"Q3 Close\" between Finance System and Stripe."),
            (
                Action::CreateSession,
                json!({
                    "session_name": "Q3 Close",
                    "system_a_name": "Finance System",
                    "system_b_name": "Stripe",
                })
            )
        );
        assert_eq!(reason("create session q3"), UnrecognizedReason::MissingSessionNames);
    }

    #[test]
    fn test_unrecognized_inputs() {
        assert_eq!(reason("xyzzy plugh"), UnrecognizedReason::UnknownIntent);
        assert_eq!(reason("reconcile everything"), UnrecognizedReason::MissingSessionId);
        assert_eq!(reason("   "), UnrecognizedReason::EmptyMessage);
        assert_eq!(
            reason(&"x".repeat(MAX_MESSAGE_CHARS + 1)),
            UnrecognizedReason::MessageTooLong
        );
    }
}
