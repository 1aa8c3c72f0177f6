use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of one capture session.
pub type SessionId = Uuid;

/// Semantic tag for a capture slot in slot-aware mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotLabel {
    Front,
    Back,
}

impl SlotLabel {
    /// Labels in the order they are filled during a slot-aware session.
    pub const SEQUENCE: [SlotLabel; 2] = [SlotLabel::Front, SlotLabel::Back];

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotLabel::Front => "front",
            SlotLabel::Back => "back",
        }
    }
}

impl fmt::Display for SlotLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "front" => Ok(SlotLabel::Front),
            "back" => Ok(SlotLabel::Back),
            other => Err(format!("unknown slot label '{other}'")),
        }
    }
}

/// The closed set of label fields the engine knows how to fuse.
///
/// Adding a variant forces an update of the precedence table in
/// `labelscan-fusion`, since the policy lookup is an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    ProductName,
    Brand,
    ExpiryDate,
    MfgDate,
    Ingredients,
    Warnings,
}

impl FieldName {
    pub const ALL: [FieldName; 6] = [
        FieldName::ProductName,
        FieldName::Brand,
        FieldName::ExpiryDate,
        FieldName::MfgDate,
        FieldName::Ingredients,
        FieldName::Warnings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::ProductName => "product_name",
            FieldName::Brand => "brand",
            FieldName::ExpiryDate => "expiry_date",
            FieldName::MfgDate => "mfg_date",
            FieldName::Ingredients => "ingredients",
            FieldName::Warnings => "warnings",
        }
    }

    /// Whether the field holds a list of strings rather than a single value.
    pub fn is_list(&self) -> bool {
        matches!(self, FieldName::Ingredients | FieldName::Warnings)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single extracted value: scalar text or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Empty strings and empty (or all-blank) lists count as absent.
    pub fn is_absent(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(|i| i.trim().is_empty()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> &[String] {
        match self {
            FieldValue::List(items) => items,
            FieldValue::Text(_) => &[],
        }
    }
}

/// Output of the extraction adapter for one captured image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Position of the source image in the uploaded batch.
    pub source_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_label: Option<SlotLabel>,
    #[serde(default)]
    pub fields: BTreeMap<FieldName, FieldValue>,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ExtractionResult {
    pub fn new(source_index: usize, raw_text: impl Into<String>) -> Self {
        Self {
            source_index,
            slot_label: None,
            fields: BTreeMap::new(),
            raw_text: raw_text.into(),
            confidence: None,
        }
    }

    pub fn with_slot(mut self, slot: SlotLabel) -> Self {
        self.slot_label = Some(slot);
        self
    }

    pub fn with_text(mut self, field: FieldName, value: impl Into<String>) -> Self {
        self.fields.insert(field, FieldValue::Text(value.into()));
        self
    }

    pub fn with_list<I, S>(mut self, field: FieldName, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        self.fields.insert(field, FieldValue::List(items));
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Non-absent scalar value for `field`, if any.
    pub fn text(&self, field: FieldName) -> Option<&str> {
        self.fields
            .get(&field)
            .filter(|v| !v.is_absent())
            .and_then(FieldValue::as_text)
            .map(str::trim)
    }

    pub fn list(&self, field: FieldName) -> &[String] {
        self.fields.get(&field).map(FieldValue::as_list).unwrap_or(&[])
    }

    /// Key under which this result's raw text is filed in a merged record.
    pub fn slot_key(&self) -> String {
        match self.slot_label {
            Some(label) => label.to_string(),
            None => self.source_index.to_string(),
        }
    }
}

/// The fused record produced from one or more extraction results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub expiry_date: Option<String>,
    pub mfg_date: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub raw_text_by_slot: BTreeMap<String, String>,
}

impl MergedRecord {
    /// True when no label field carries a value.
    pub fn is_empty(&self) -> bool {
        FieldName::ALL.iter().all(|&f| {
            if f.is_list() {
                self.list(f).is_empty()
            } else {
                self.text(f).is_none()
            }
        })
    }

    pub fn text(&self, field: FieldName) -> Option<&str> {
        let value = match field {
            FieldName::ProductName => self.product_name.as_deref(),
            FieldName::Brand => self.brand.as_deref(),
            FieldName::ExpiryDate => self.expiry_date.as_deref(),
            FieldName::MfgDate => self.mfg_date.as_deref(),
            FieldName::Ingredients | FieldName::Warnings => None,
        };
        value.filter(|s| !s.trim().is_empty())
    }

    pub fn set_text(&mut self, field: FieldName, value: Option<String>) {
        match field {
            FieldName::ProductName => self.product_name = value,
            FieldName::Brand => self.brand = value,
            FieldName::ExpiryDate => self.expiry_date = value,
            FieldName::MfgDate => self.mfg_date = value,
            FieldName::Ingredients | FieldName::Warnings => {}
        }
    }

    pub fn list(&self, field: FieldName) -> &[String] {
        match field {
            FieldName::Ingredients => &self.ingredients,
            FieldName::Warnings => &self.warnings,
            _ => &[],
        }
    }

    pub fn set_list(&mut self, field: FieldName, items: Vec<String>) {
        match field {
            FieldName::Ingredients => self.ingredients = items,
            FieldName::Warnings => self.warnings = items,
            _ => {}
        }
    }

    /// Short human-readable line, e.g. "Dove Soap. Expires 12/2026".
    pub fn summary(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(name) = self.product_name.as_deref().or(self.brand.as_deref()) {
            parts.push(name.to_string());
        }
        if let Some(expiry) = &self.expiry_date {
            parts.push(format!("Expires {expiry}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(". "))
        }
    }
}

/// Wire payload returned by the scan endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub id: String,
    #[serde(flatten)]
    pub record: MergedRecord,
    pub image_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub scanned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ScanResponse {
    pub fn new(record: MergedRecord, image_count: usize) -> Self {
        let failure_reason = record
            .is_empty()
            .then(|| "Label text could not be detected".to_string());
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            summary: record.summary(),
            record,
            image_count,
            scanned_at: Utc::now(),
            failure_reason,
        }
    }
}

/// Reference to image bytes owned by the camera subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHandle {
    pub uri: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageHandle {
    pub fn new(uri: impl Into<String>, mime_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// One acquired frame. Immutable once created.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub handle: ImageHandle,
    pub slot_label: Option<SlotLabel>,
    pub captured_at: Instant,
}

impl CapturedImage {
    pub fn new(handle: ImageHandle, slot_label: Option<SlotLabel>) -> Self {
        Self {
            handle,
            slot_label,
            captured_at: Instant::now(),
        }
    }
}

/// Progress stages reported while a batch is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Uploading,
    Extracting,
    Complete,
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessingStage::Uploading => "uploading",
            ProcessingStage::Extracting => "extracting",
            ProcessingStage::Complete => "complete",
        };
        f.write_str(s)
    }
}
