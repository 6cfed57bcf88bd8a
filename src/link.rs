use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::classify::OutputRecord;
use crate::domain::SynapseId;
use crate::error::AnnotatorError;
use crate::samplesheet::SampleInputRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedRecord {
    #[serde(flatten)]
    pub output: OutputRecord,
    pub input_ids: Vec<SynapseId>,
}

impl LinkedRecord {
    pub fn primary_input(&self) -> Option<&SynapseId> {
        self.input_ids.first()
    }
}

/// Left join of outputs onto inputs by sample. Every output sample must exist
/// among the inputs; unused inputs are fine.
pub fn link_io(
    inputs: &[SampleInputRecord],
    outputs: &[OutputRecord],
) -> Result<Vec<LinkedRecord>, AnnotatorError> {
    let by_sample = inputs
        .iter()
        .map(|input| (input.sample.as_str(), &input.input_ids))
        .collect::<HashMap<_, _>>();

    let missing = outputs
        .iter()
        .filter(|output| !by_sample.contains_key(output.sample.as_str()))
        .map(|output| output.sample.clone())
        .collect::<BTreeSet<_>>();
    if !missing.is_empty() {
        return Err(AnnotatorError::UnlinkedSample {
            samples: missing.into_iter().collect(),
        });
    }

    Ok(outputs
        .iter()
        .map(|output| LinkedRecord {
            output: output.clone(),
            input_ids: by_sample
                .get(output.sample.as_str())
                .map(|ids| ids.to_vec())
                .unwrap_or_default(),
        })
        .collect())
}
