use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use super::parse::{normalize, validate, RawQuestion};
use crate::types::Question;

/// A question from the static bank, before it gets a per-use id
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankEntry {
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

impl BankEntry {
    fn new(text: &str, options: [&str; 4], correct_answer: &str) -> Self {
        Self {
            text: text.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            correct_answer: correct_answer.to_string(),
        }
    }

    fn to_raw(&self) -> RawQuestion {
        RawQuestion {
            text: self.text.clone(),
            options: self
                .options
                .iter()
                .map(|o| serde_json::Value::String(o.clone()))
                .collect(),
            correct_answer: serde_json::Value::String(self.correct_answer.clone()),
        }
    }
}

/// Questions served when every backend fails
#[derive(Debug, Clone)]
pub struct FallbackBank {
    entries: Vec<BankEntry>,
}

impl Default for FallbackBank {
    fn default() -> Self {
        Self {
            entries: vec![
                BankEntry::new(
                    "What is the capital of France?",
                    ["London", "Berlin", "Paris", "Madrid"],
                    "Paris",
                ),
                BankEntry::new(
                    "Which planet is known as the Red Planet?",
                    ["Venus", "Mars", "Jupiter", "Saturn"],
                    "Mars",
                ),
                BankEntry::new("What is 2 + 2?", ["3", "4", "5", "6"], "4"),
                BankEntry::new(
                    "Who painted the Mona Lisa?",
                    ["Van Gogh", "Da Vinci", "Picasso", "Rembrandt"],
                    "Da Vinci",
                ),
                BankEntry::new(
                    "What is the largest ocean?",
                    ["Atlantic", "Indian", "Arctic", "Pacific"],
                    "Pacific",
                ),
                BankEntry::new(
                    "Which element has the symbol O?",
                    ["Gold", "Oxygen", "Silver", "Iron"],
                    "Oxygen",
                ),
                BankEntry::new("How many continents are there?", ["5", "6", "7", "8"], "7"),
                BankEntry::new(
                    "What is the speed of light?",
                    ["Fast", "Very Fast", "Super Fast", "299,792 km/s"],
                    "299,792 km/s",
                ),
                BankEntry::new(
                    "Which animal is the king of the jungle?",
                    ["Tiger", "Lion", "Elephant", "Giraffe"],
                    "Lion",
                ),
                BankEntry::new(
                    "What is the boiling point of water?",
                    ["90°C", "100°C", "110°C", "120°C"],
                    "100°C",
                ),
            ],
        }
    }
}

impl FallbackBank {
    /// Build a bank from entries, keeping only the ones that validate.
    /// Returns None if nothing valid remains.
    pub fn from_entries(entries: Vec<BankEntry>) -> Option<Self> {
        let entries: Vec<BankEntry> = entries
            .into_iter()
            .filter(|entry| validate(&entry.to_raw(), String::new()).is_some())
            .collect();
        (!entries.is_empty()).then_some(Self { entries })
    }

    /// Load a bank from a JSON array file, falling back to the built-in bank
    pub fn load_or_default(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    "Failed to read question bank {}: {}, using built-in bank",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        let entries: Vec<BankEntry> = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    "Failed to parse question bank {}: {}, using built-in bank",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };

        match Self::from_entries(entries) {
            Some(bank) => {
                tracing::info!(
                    "Loaded {} fallback questions from {}",
                    bank.len(),
                    path.display()
                );
                bank
            }
            None => {
                tracing::warn!(
                    "Question bank {} has no valid questions, using built-in bank",
                    path.display()
                );
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produce `count` questions by cycling the bank from `offset`.
    /// Ids are `fallback-<stamp>-<position>`.
    pub fn synthesize(&self, count: usize, offset: usize, stamp: i64) -> Vec<Question> {
        self.synthesize_avoiding(count, offset, stamp, &HashSet::new())
    }

    /// Like [`synthesize`](Self::synthesize), but entries whose normalized
    /// text is in `known` come last: the bank only repeats once every fresh
    /// entry has been served.
    pub fn synthesize_avoiding(
        &self,
        count: usize,
        offset: usize,
        stamp: i64,
        known: &HashSet<String>,
    ) -> Vec<Question> {
        let len = self.entries.len();
        if len == 0 {
            return Vec::new();
        }

        let fresh: Vec<usize> = (0..len)
            .map(|i| (offset + i) % len)
            .filter(|&i| !known.contains(&normalize(&self.entries[i].text)))
            .collect();
        let cycled = (0..).map(|i| (offset + i) % len);

        fresh
            .into_iter()
            .chain(cycled)
            .take(count)
            .enumerate()
            .filter_map(|(n, i)| {
                validate(
                    &self.entries[i].to_raw(),
                    format!("fallback-{}-{}", stamp, offset + n),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_bank_is_valid() {
        let bank = FallbackBank::default();
        assert_eq!(bank.len(), 10);
        let questions = bank.synthesize(10, 0, 1);
        assert_eq!(questions.len(), 10);
        assert_eq!(questions[0].correct_answer, "Paris");
    }

    #[test]
    fn test_synthesize_cycles_with_unique_ids() {
        let bank = FallbackBank::default();
        let questions = bank.synthesize(25, 3, 42);
        assert_eq!(questions.len(), 25);
        assert_eq!(questions[0].text, "Who painted the Mona Lisa?");
        assert_eq!(questions[10].text, questions[0].text);
        let ids: std::collections::HashSet<_> = questions.iter().map(|q| &q.id).collect();
        assert_eq!(ids.len(), 25);
        assert!(questions[0].id.starts_with("fallback-42-"));
    }

    #[test]
    fn test_synthesize_prefers_unknown_texts() {
        let bank = FallbackBank::default();
        let all = bank.synthesize(10, 0, 1);
        let known: HashSet<String> = all[..9].iter().map(|q| normalize(&q.text)).collect();

        let questions = bank.synthesize_avoiding(3, 0, 2, &known);
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].text, all[9].text);
        // Only then does the bank start over
        assert_eq!(questions[1].text, all[0].text);
        let ids: HashSet<_> = questions.iter().map(|q| &q.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"text": "Largest planet?", "options": ["Jupiter", "Mars", "Venus", "Earth"], "correctAnswer": "jupiter"}},
                {{"text": "Broken", "options": ["a", "b"], "correctAnswer": "a"}}
            ]"#
        )
        .unwrap();

        let bank = FallbackBank::load_or_default(file.path());
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.synthesize(1, 0, 0)[0].correct_answer, "Jupiter");
    }

    #[test]
    fn test_invalid_file_uses_builtin_bank() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert_eq!(FallbackBank::load_or_default(file.path()).len(), 10);

        let missing = std::path::Path::new("/nonexistent/bank.json");
        assert_eq!(FallbackBank::load_or_default(missing).len(), 10);
    }
}
