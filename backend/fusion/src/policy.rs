use labelscan_core::{FieldName, SlotLabel};

/// Which capture to favour when batches carry no slot labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Earliest,
    Latest,
}

/// How a single field is resolved across results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Scalar: first non-empty value from the preferred slot (or positional
    /// stand-in when unlabeled), then first non-empty from the rest in
    /// capture order.
    PreferSlot { slot: SlotLabel, unlabeled: Position },
    /// List: union of all values, deduplicated case-insensitively, first-seen order.
    Union,
}

/// Precedence table. Exhaustive on purpose: a new field does not compile
/// until it is given a policy here.
pub fn policy_for(field: FieldName) -> FieldPolicy {
    match field {
        FieldName::ProductName | FieldName::Brand => FieldPolicy::PreferSlot {
            slot: SlotLabel::Front,
            unlabeled: Position::Earliest,
        },
        FieldName::ExpiryDate | FieldName::MfgDate => FieldPolicy::PreferSlot {
            slot: SlotLabel::Back,
            unlabeled: Position::Latest,
        },
        FieldName::Ingredients | FieldName::Warnings => FieldPolicy::Union,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_fields_use_union() {
        for field in FieldName::ALL {
            assert_eq!(
                field.is_list(),
                policy_for(field) == FieldPolicy::Union,
                "{field} policy does not match its shape"
            );
        }
    }

    #[test]
    fn test_dates_prefer_back() {
        assert_eq!(
            policy_for(FieldName::ExpiryDate),
            FieldPolicy::PreferSlot {
                slot: SlotLabel::Back,
                unlabeled: Position::Latest
            }
        );
    }
}
