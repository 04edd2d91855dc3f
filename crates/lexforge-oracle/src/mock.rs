//! Deterministic in-process oracles
//!
//! [`SubstitutionOracle`] actually understands the common literal amendment
//! forms (replace/delete quoted words) and is the default offline transform
//! backend. [`ScriptedOracle`] replays canned replies and is for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;

use crate::{AddressOracle, OracleError, TransformOracle, FAILURE_MARKER};

// ============================================================================
// Substitution oracle
// ============================================================================

/// Transform oracle for literal instructions.
///
/// Handles the two mechanical amendment forms:
/// - `слова 'X' заменить словами 'Y'` (also «...» quoting)
/// - `исключить слова 'X'`
///
/// Anything else, or a quoted fragment absent from the text, produces a
/// [`FAILURE_MARKER`] reply so the caller records a per-target failure.
pub struct SubstitutionOracle {
    replace: Regex,
    exclude: Regex,
}

impl Default for SubstitutionOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstitutionOracle {
    pub fn new() -> Self {
        Self {
            replace: Regex::new(
                r#"(?i)слов[ауо]?\s+['«"]([^'»"]+)['»"]\s+заменить\s+слов(?:ами|ом)?\s+['«"]([^'»"]+)['»"]"#,
            )
            .expect("fixed pattern"),
            exclude: Regex::new(r#"(?i)исключить\s+слов[ауо]?\s+['«"]([^'»"]+)['»"]"#)
                .expect("fixed pattern"),
        }
    }
}

#[async_trait]
impl TransformOracle for SubstitutionOracle {
    async fn transform(&self, before: &str, instruction: &str) -> Result<String, OracleError> {
        if let Some(caps) = self.replace.captures(instruction) {
            let old = &caps[1];
            let new = &caps[2];
            if !before.contains(old) {
                return Ok(format!("{FAILURE_MARKER} фрагмент '{old}' не найден]"));
            }
            return Ok(before.replace(old, new));
        }
        if let Some(caps) = self.exclude.captures(instruction) {
            let old = &caps[1];
            if !before.contains(old) {
                return Ok(format!("{FAILURE_MARKER} фрагмент '{old}' не найден]"));
            }
            return Ok(before.replacen(old, "", 1).replace("  ", " "));
        }
        Ok(format!("{FAILURE_MARKER} инструкция не распознана]"))
    }
}

// ============================================================================
// Scripted oracle
// ============================================================================

enum ScriptedReply {
    Text(String),
    Error(String),
}

/// Replays a fixed script of replies, in order. Optionally delays each reply
/// to exercise caller-side timeouts.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies
            .lock()
            .push_back(ScriptedReply::Text(text.to_string()));
        self
    }

    pub fn error(self, message: &str) -> Self {
        self.replies
            .lock()
            .push_back(ScriptedReply::Error(message.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransformOracle for ScriptedOracle {
    async fn transform(&self, _before: &str, _instruction: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.replies.lock().pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(message)) => Err(OracleError::Api(message)),
            None => Err(OracleError::Api("reply script exhausted".to_string())),
        }
    }
}

// ============================================================================
// Address oracles
// ============================================================================

/// Case-insensitive substring match over the candidate labels. The offline
/// stand-in for semantic address matching.
pub struct SubstringAddressOracle;

#[async_trait]
impl AddressOracle for SubstringAddressOracle {
    async fn match_address(
        &self,
        address: &str,
        candidates: &[String],
    ) -> Result<Option<String>, OracleError> {
        let needle = address.to_lowercase();
        Ok(candidates
            .iter()
            .find(|c| c.to_lowercase().contains(&needle))
            .cloned())
    }
}

/// Replays fixed address answers, membership-unchecked on purpose so tests
/// can exercise the caller's candidate validation.
#[derive(Default)]
pub struct ScriptedAddressOracle {
    answers: Mutex<VecDeque<Option<String>>>,
}

impl ScriptedAddressOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, candidate: &str) -> Self {
        self.answers.lock().push_back(Some(candidate.to_string()));
        self
    }

    pub fn no_answer(self) -> Self {
        self.answers.lock().push_back(None);
        self
    }
}

#[async_trait]
impl AddressOracle for ScriptedAddressOracle {
    async fn match_address(
        &self,
        _address: &str,
        _candidates: &[String],
    ) -> Result<Option<String>, OracleError> {
        match self.answers.lock().pop_front() {
            Some(answer) => Ok(answer),
            None => Err(OracleError::Api("answer script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_failure_reply;

    #[tokio::test]
    async fn substitution_replaces_quoted_words() {
        let oracle = SubstitutionOracle::new();
        let after = oracle
            .transform(
                "Статья 2. Здесь старое слово.",
                "в статье 2 слова 'старое' заменить словами 'новое'",
            )
            .await
            .unwrap();
        assert_eq!(after, "Статья 2. Здесь новое слово.");
    }

    #[tokio::test]
    async fn substitution_handles_guillemets_and_exclusion() {
        let oracle = SubstitutionOracle::new();
        let after = oracle
            .transform("текст до и после", "исключить слова «до и»")
            .await
            .unwrap();
        assert_eq!(after, "текст после");
        let after = oracle
            .transform("один два", "слова «один» заменить словами «三»")
            .await
            .unwrap();
        assert_eq!(after, "三 два");
    }

    #[tokio::test]
    async fn substitution_reports_missing_fragment_via_marker() {
        let oracle = SubstitutionOracle::new();
        let reply = oracle
            .transform("другой текст", "слова 'нет такого' заменить словами 'x'")
            .await
            .unwrap();
        assert!(is_failure_reply(&reply));
    }

    #[tokio::test]
    async fn scripted_oracle_replays_in_order_and_counts() {
        let oracle = ScriptedOracle::new().reply("первый").error("сбой");
        assert_eq!(oracle.transform("", "").await.unwrap(), "первый");
        assert!(oracle.transform("", "").await.is_err());
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn substring_address_oracle_matches_case_insensitively() {
        let candidates = vec!["Глава 1 / Статья 6.1".to_string(), "Статья 7".to_string()];
        let hit = SubstringAddressOracle
            .match_address("статья 7", &candidates)
            .await
            .unwrap();
        assert_eq!(hit.as_deref(), Some("Статья 7"));
    }
}
