//! Typed view over a comment record's metadata rows.
//!
//! Each family owns a fixed set of [`MetaKey`]s. Rows under other keys are
//! left alone on load and on write, so metadata attached by other components
//! survives a save.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::persistence::PersistenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetaKey {
    Start,
    Complete,
    Created,
    Grade,
    QuizAnswers,
    QuizGrades,
    AnswersFeedback,
}

impl MetaKey {
    pub const ALL: [MetaKey; 7] = [
        MetaKey::Start,
        MetaKey::Complete,
        MetaKey::Created,
        MetaKey::Grade,
        MetaKey::QuizAnswers,
        MetaKey::QuizGrades,
        MetaKey::AnswersFeedback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetaKey::Start => "start",
            MetaKey::Complete => "complete",
            MetaKey::Created => "created",
            MetaKey::Grade => "grade",
            MetaKey::QuizAnswers => "quiz_answers",
            MetaKey::QuizGrades => "quiz_grades",
            MetaKey::AnswersFeedback => "answers_feedback",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == raw)
    }
}

/// Metadata of one comment record, restricted to known keys.
///
/// Values are kept as the raw stored strings and decoded on access, so a
/// record with one malformed value can still be listed and reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaMap {
    entries: BTreeMap<MetaKey, String>,
}

impl MetaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw `(meta_key, meta_value)` rows, skipping unknown keys.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries = rows
            .into_iter()
            .filter_map(|(key, value)| MetaKey::parse(&key).map(|key| (key, value)))
            .collect();
        Self { entries }
    }

    pub fn raw(&self, key: MetaKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    pub fn set_raw(&mut self, key: MetaKey, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }

    pub fn remove(&mut self, key: MetaKey) {
        self.entries.remove(&key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetaKey, &str)> {
        self.entries.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn timestamp(&self, key: MetaKey) -> Result<Option<u64>, MetaError> {
        match self.raw(key) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|_| MetaError::new(key, format!("not a timestamp: {raw:?}"))),
        }
    }

    pub fn set_timestamp(&mut self, key: MetaKey, value: Option<u64>) {
        match value {
            Some(ts) => self.set_raw(key, ts.to_string()),
            None => self.remove(key),
        }
    }

    pub fn number(&self, key: MetaKey) -> Result<Option<f64>, MetaError> {
        match self.raw(key) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| MetaError::new(key, format!("not a number: {raw:?}"))),
        }
    }

    pub fn set_number(&mut self, key: MetaKey, value: Option<f64>) {
        match value {
            Some(n) => self.set_raw(key, n.to_string()),
            None => self.remove(key),
        }
    }

    /// Decode a JSON value; a missing key decodes as `T::default()`.
    pub fn json<T>(&self, key: MetaKey) -> Result<T, MetaError>
    where
        T: DeserializeOwned + Default,
    {
        match self.raw(key) {
            None | Some("") => Ok(T::default()),
            Some(raw) => serde_json::from_str(raw).map_err(|e| MetaError::new(key, e.to_string())),
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: MetaKey, value: &T) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string(value)?;
        self.set_raw(key, encoded);
        Ok(())
    }
}

/// A metadata value that does not decode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("meta key '{}': {reason}", key.as_str())]
pub struct MetaError {
    pub key: MetaKey,
    pub reason: String,
}

impl MetaError {
    fn new(key: MetaKey, reason: String) -> Self {
        Self { key, reason }
    }

    pub fn into_corrupt(self, entity: &'static str, comment_id: u64) -> PersistenceError {
        PersistenceError::Corrupt {
            entity,
            id: comment_id,
            reason: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let meta = MetaMap::from_rows(rows(&[("start", "10"), ("_edit_lock", "x")]));
        assert_eq!(meta.iter().count(), 1);
        assert_eq!(meta.timestamp(MetaKey::Start).unwrap(), Some(10));
    }

    #[test]
    fn timestamps_decode_or_report() {
        let meta = MetaMap::from_rows(rows(&[("start", "soon"), ("complete", "")]));
        assert_eq!(meta.timestamp(MetaKey::Complete).unwrap(), None);
        let err = meta.timestamp(MetaKey::Start).unwrap_err();
        assert_eq!(err.key, MetaKey::Start);
        assert!(matches!(
            err.into_corrupt("course progress", 4),
            PersistenceError::Corrupt { id: 4, .. }
        ));
    }

    #[test]
    fn json_maps_use_question_ids_as_keys() {
        let mut meta = MetaMap::new();
        let grades: BTreeMap<u64, u32> = [(3, 2), (11, 0)].into_iter().collect();
        meta.set_json(MetaKey::QuizGrades, &grades).unwrap();
        assert_eq!(meta.raw(MetaKey::QuizGrades), Some(r#"{"3":2,"11":0}"#));

        let decoded: BTreeMap<u64, u32> = meta.json(MetaKey::QuizGrades).unwrap();
        assert_eq!(decoded, grades);
        let missing: BTreeMap<u64, String> = meta.json(MetaKey::AnswersFeedback).unwrap();
        assert!(missing.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let meta = MetaMap::from_rows(rows(&[("quiz_grades", "{not json")]));
        assert!(meta.json::<BTreeMap<u64, u32>>(MetaKey::QuizGrades).is_err());
    }

    #[test]
    fn clearing_a_timestamp_removes_the_key() {
        let mut meta = MetaMap::new();
        meta.set_timestamp(MetaKey::Complete, Some(5));
        meta.set_timestamp(MetaKey::Complete, None);
        assert_eq!(meta.raw(MetaKey::Complete), None);
    }
}
