use serde::{Deserialize, Serialize};
use shared::domain::{Case, Condition};
use thiserror::Error;

/// Number of cases every participant works through.
pub const STUDY_LENGTH: usize = 4;

/// One position in the fixed case sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSlot {
    pub condition: Condition,
    /// Case shown in this slot; defaults to the slot's own position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
}

impl SequenceSlot {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            case_index: None,
            difficulty: None,
        }
    }

    pub fn with_case(mut self, case_index: usize) -> Self {
        self.case_index = Some(case_index);
        self
    }

    pub fn with_difficulty(mut self, difficulty: impl Into<String>) -> Self {
        self.difficulty = Some(difficulty.into());
        self
    }

    pub fn resolved_case_index(&self, position: usize) -> usize {
        self.case_index.unwrap_or(position)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("study plan needs exactly {expected} slots, found {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error(
        "slot {slot} selects case {case_index}, but only {} case(s) are available:\n{}",
        .available.len(),
        .available.join("\n")
    )]
    CaseOutOfRange {
        /// 1-based, as shown to operators.
        slot: usize,
        case_index: usize,
        available: Vec<String>,
    },
}

/// The fixed, ordered sequence of conditions a participant moves through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudyPlan {
    slots: Vec<SequenceSlot>,
}

impl StudyPlan {
    pub fn new(slots: Vec<SequenceSlot>) -> Self {
        Self { slots }
    }

    /// AI, Reference, AI, Reference over the first four cases.
    pub fn alternating() -> Self {
        Self::new(
            [
                Condition::Ai,
                Condition::Reference,
                Condition::Ai,
                Condition::Reference,
            ]
            .into_iter()
            .map(SequenceSlot::new)
            .collect(),
        )
    }

    pub fn slots(&self) -> &[SequenceSlot] {
        &self.slots
    }

    pub fn slot(&self, position: usize) -> Option<&SequenceSlot> {
        self.slots.get(position)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn case_index(&self, position: usize) -> Option<usize> {
        self.slot(position)
            .map(|slot| slot.resolved_case_index(position))
    }

    /// Checks the plan against the loaded cases. Runs once at startup.
    pub fn validate(&self, cases: &[Case]) -> Result<(), PlanError> {
        if self.slots.len() != STUDY_LENGTH {
            return Err(PlanError::WrongLength {
                expected: STUDY_LENGTH,
                actual: self.slots.len(),
            });
        }

        for (position, slot) in self.slots.iter().enumerate() {
            let case_index = slot.resolved_case_index(position);
            if case_index >= cases.len() {
                return Err(PlanError::CaseOutOfRange {
                    slot: position + 1,
                    case_index,
                    available: cases
                        .iter()
                        .map(|case| format!("  {}: {}", case.index, case.source_file))
                        .collect(),
                });
            }
        }
        Ok(())
    }
}

impl Default for StudyPlan {
    fn default() -> Self {
        Self::alternating()
    }
}
