//! Per-attempt answer store.
//!
//! Holds the current value of every question's answer together with its
//! dirty flag and version. `drain_dirty` is the only way pending edits leave
//! the store, so two flushes can never pick up the same edit.

use std::collections::HashMap;

use crate::model::{Answer, AnswerValue, SavedAnswer};

/// A dirty answer taken out of the store for writing.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub question_id: String,
    pub value: AnswerValue,
    pub version: u64,
}

/// Mapping from question id to [`Answer`] for one attempt.
#[derive(Debug, Default)]
pub struct AnswerStore {
    answers: HashMap<String, Answer>,
    /// Monotonic local edit counter; every `set` takes the next value.
    edit_counter: u64,
}

impl AnswerStore {
    /// Create a store with an empty, clean answer for each question.
    pub fn new<I, S>(question_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let answers = question_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), Answer::empty(id))
            })
            .collect();
        Self {
            answers,
            edit_counter: 0,
        }
    }

    /// Seed answers the gateway already holds. Seeded answers are clean.
    /// Ids that are not part of the attempt are ignored.
    pub fn load_saved(&mut self, saved: &[SavedAnswer]) {
        for s in saved {
            if let Some(answer) = self.answers.get_mut(&s.question_id) {
                answer.value = s.value.clone();
                answer.dirty = false;
                answer.version = s.version;
                answer.synced_version = s.version;
                self.edit_counter = self.edit_counter.max(s.version);
            }
        }
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.answers.contains_key(question_id)
    }

    /// Current value, or `None` for an unknown question.
    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id).map(|a| &a.value)
    }

    /// Full answer record including sync bookkeeping.
    pub fn answer(&self, question_id: &str) -> Option<&Answer> {
        self.answers.get(question_id)
    }

    /// Overwrite a question's value and mark it dirty.
    ///
    /// Returns the version assigned to this edit, or `None` if the question
    /// is not part of the attempt.
    pub fn set(&mut self, question_id: &str, value: AnswerValue) -> Option<u64> {
        let answer = self.answers.get_mut(question_id)?;
        self.edit_counter += 1;
        answer.value = value;
        answer.dirty = true;
        answer.version = self.edit_counter;
        Some(self.edit_counter)
    }

    /// Take every dirty answer and clear its dirty flag in one step.
    ///
    /// Results are ordered by version so writes go out in edit order.
    pub fn drain_dirty(&mut self) -> Vec<PendingWrite> {
        let mut drained: Vec<PendingWrite> = self
            .answers
            .values_mut()
            .filter(|a| a.dirty)
            .map(|a| {
                a.dirty = false;
                PendingWrite {
                    question_id: a.question_id.clone(),
                    value: a.value.clone(),
                    version: a.version,
                }
            })
            .collect();
        drained.sort_by_key(|w| w.version);
        drained
    }

    /// Record that the gateway acknowledged `version` of a question.
    pub fn mark_synced(&mut self, question_id: &str, version: u64) {
        if let Some(answer) = self.answers.get_mut(question_id) {
            answer.synced_version = answer.synced_version.max(version);
        }
    }

    /// Put writes that did not reach the gateway back into the dirty set.
    ///
    /// An answer edited again since it was drained is already dirty with a
    /// newer value; it is left alone so the newer value is what gets sent.
    pub fn restore(&mut self, writes: &[PendingWrite]) {
        for write in writes {
            if let Some(answer) = self.answers.get_mut(&write.question_id) {
                if answer.version == write.version && answer.synced_version < write.version {
                    answer.dirty = true;
                }
            }
        }
    }

    pub fn is_dirty(&self, question_id: &str) -> bool {
        self.answers.get(question_id).is_some_and(|a| a.dirty)
    }

    pub fn dirty_count(&self) -> usize {
        self.answers.values().filter(|a| a.dirty).count()
    }

    /// Number of questions with a non-empty answer.
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|a| !a.value.is_empty()).count()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Drop every answer. Used when the attempt is finalized or abandoned.
    pub fn clear(&mut self) {
        self.answers.clear();
    }
}
