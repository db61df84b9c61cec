//! Operation selection seam.
//!
//! The orchestrator asks an [`OperationSelector`] which operation to run at
//! the start of each stage, offering only the choices the catalog allows for
//! that provider and input type. Interactive front ends implement the trait
//! with a prompt; [`PresetSelector`] answers from choices fixed in advance
//! (CLI flags, tests).

use crate::error::PipelineError;
use crate::job::ArtifactType;
use crate::pipeline::catalog::OperationChoice;
use crate::pipeline::provider::Provider;

/// What the selector is being asked to choose.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub step: u8,
    pub provider: Provider,
    pub input: ArtifactType,
    /// Valid choices, in display order. Never empty.
    pub choices: &'a [OperationChoice],
}

pub trait OperationSelector: Send + Sync {
    /// Return one of `request.choices`, or [`PipelineError::UserCancelled`].
    fn select(&self, request: &SelectionRequest<'_>) -> Result<OperationChoice, PipelineError>;
}

/// Selector answering from a fixed choice per step.
#[derive(Debug, Clone, Default)]
pub struct PresetSelector {
    first: Option<OperationChoice>,
    second: Option<OperationChoice>,
}

impl PresetSelector {
    pub fn new(first: Option<OperationChoice>, second: Option<OperationChoice>) -> Self {
        Self { first, second }
    }
}

impl OperationSelector for PresetSelector {
    fn select(&self, request: &SelectionRequest<'_>) -> Result<OperationChoice, PipelineError> {
        let preset = match request.step {
            1 => self.first,
            _ => self.second,
        };
        let choice = preset.ok_or(PipelineError::UserCancelled { step: request.step })?;
        if !request.choices.contains(&choice) {
            let offered: Vec<&str> = request.choices.iter().map(|c| c.id()).collect();
            return Err(PipelineError::Validation(format!(
                "'{}' is not available for {} input on {} (offered: {})",
                choice.id(),
                request.input,
                request.provider,
                offered.join(", ")
            )));
        }
        Ok(choice)
    }
}
