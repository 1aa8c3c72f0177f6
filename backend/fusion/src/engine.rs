use std::collections::HashSet;

use labelscan_core::{ExtractionError, ExtractionResult, FieldName, MergedRecord, SlotLabel};
use tracing::{debug, warn};

use crate::policy::{policy_for, FieldPolicy, Position};

/// Whether a batch is resolved by slot labels or by capture position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    Labeled,
    Unlabeled,
}

impl FusionMode {
    pub fn detect(results: &[ExtractionResult]) -> Self {
        if results.iter().any(|r| r.slot_label.is_some()) {
            FusionMode::Labeled
        } else {
            FusionMode::Unlabeled
        }
    }
}

/// Merge an ordered list of per-image results into a single record.
///
/// Total and deterministic: identical input in identical order always yields
/// an identical record, and missing data produces empty fields, not errors.
pub fn fuse(results: &[ExtractionResult]) -> MergedRecord {
    let mode = FusionMode::detect(results);
    let mut record = MergedRecord::default();

    for field in FieldName::ALL {
        match policy_for(field) {
            FieldPolicy::PreferSlot { slot, unlabeled } => {
                let value = pick_scalar(results, field, mode, slot, unlabeled);
                record.set_text(field, value);
            }
            FieldPolicy::Union => {
                record.set_list(field, union_list(results, field));
            }
        }
    }

    record.confidence = mean_confidence(results);

    for result in results {
        let mut key = result.slot_key();
        if record.raw_text_by_slot.contains_key(&key) {
            key = format!("{key}_{}", result.source_index);
        }
        record.raw_text_by_slot.insert(key, result.raw_text.clone());
    }

    debug!(
        results = results.len(),
        mode = ?mode,
        empty = record.is_empty(),
        "Fused extraction results"
    );
    record
}

/// Fuse settled extraction outcomes, dropping failed images entirely.
///
/// Order of the surviving results is preserved. When every extraction failed
/// the returned record is empty with no confidence.
pub fn fuse_outcomes(
    outcomes: Vec<Result<ExtractionResult, ExtractionError>>,
) -> MergedRecord {
    let total = outcomes.len();
    let results: Vec<ExtractionResult> = outcomes
        .into_iter()
        .enumerate()
        .filter_map(|(index, outcome)| match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(image_index = index, error = %e, "Excluding image from fusion");
                None
            }
        })
        .collect();

    if results.len() < total {
        debug!(
            kept = results.len(),
            dropped = total - results.len(),
            "Some extractions failed"
        );
    }
    fuse(&results)
}

fn pick_scalar(
    results: &[ExtractionResult],
    field: FieldName,
    mode: FusionMode,
    slot: SlotLabel,
    unlabeled: Position,
) -> Option<String> {
    let preferred: Vec<usize> = match mode {
        FusionMode::Labeled => results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.slot_label == Some(slot))
            .map(|(i, _)| i)
            .collect(),
        FusionMode::Unlabeled => match unlabeled {
            Position::Earliest if !results.is_empty() => vec![0],
            Position::Latest if !results.is_empty() => vec![results.len() - 1],
            _ => Vec::new(),
        },
    };

    // Preferred slots first (lowest index wins ties), then everything else in capture order.
    let fallback = (0..results.len()).filter(|i| !preferred.contains(i));
    preferred
        .iter()
        .copied()
        .chain(fallback)
        .find_map(|i| results[i].text(field))
        .map(str::to_string)
}

fn union_list(results: &[ExtractionResult], field: FieldName) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for result in results {
        for item in result.list(field) {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            if seen.insert(item.to_lowercase()) {
                merged.push(item.to_string());
            }
        }
    }
    merged
}

fn mean_confidence(results: &[ExtractionResult]) -> Option<f64> {
    let values: Vec<f64> = results
        .iter()
        .filter_map(|r| r.confidence)
        .filter(|c| c.is_finite())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}
