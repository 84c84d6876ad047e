// src/engine/selection.rs

use serde::{Deserialize, Serialize};

use crate::models::question::PICKS_PER_QUESTION;

/// Options a user has picked for one question, in the order they were picked.
/// Never holds more than two entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Selection(Vec<String>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    Unselected,
    Partial,
    Full,
}

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// A third distinct option was toggled; the selection is unchanged.
    Rejected,
}

impl Selection {
    /// Removes `option` if picked, otherwise adds it when there is room.
    pub fn toggle(&mut self, option: &str) -> ToggleOutcome {
        if let Some(pos) = self.0.iter().position(|o| o == option) {
            self.0.remove(pos);
            return ToggleOutcome::Removed;
        }
        if self.0.len() >= PICKS_PER_QUESTION {
            return ToggleOutcome::Rejected;
        }
        self.0.push(option.to_string());
        ToggleOutcome::Added
    }

    pub fn state(&self) -> SelectionState {
        match self.0.len() {
            0 => SelectionState::Unselected,
            n if n < PICKS_PER_QUESTION => SelectionState::Partial,
            _ => SelectionState::Full,
        }
    }

    pub fn is_full(&self) -> bool {
        self.state() == SelectionState::Full
    }

    pub fn contains(&self, option: &str) -> bool {
        self.0.iter().any(|o| o == option)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
