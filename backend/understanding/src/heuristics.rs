//! Heuristic label field extraction from OCR text.
//!
//! Used on its own by the `heuristic` provider and as a gap filler for
//! fields a vision model left empty. Never invents a value: anything not
//! clearly present is returned as `None` or an empty list.

use once_cell::sync::Lazy;
use regex::Regex;

use labelscan_core::{ExtractionResult, FieldName, FieldValue};

/// Brands matched verbatim (case-insensitive) anywhere in the text.
const KNOWN_BRANDS: &[&str] = &[
    "TONYMOLY", "LANEIGE", "AMOREPACIFIC", "INNISFREE", "ETUDE HOUSE", "COSRX", "PURITO",
    "ISNTREE", "ROUND LAB", "SKIN FUNCTIONAL", "DOVE", "NIVEA", "VASELINE", "CETAPHIL",
    "CERAVE", "NEUTROGENA", "OLAY", "L'OREAL", "MAYBELLINE", "LOREAL",
];

/// Lines containing any of these are reported as warnings.
const WARNING_KEYWORDS: &[&str] = &[
    "warning", "may contain", "contains", "allergen", "not suitable", "caution", "risk",
    "external use", "avoid eyes", "keep away", "do not ingest", "patch test",
];

/// All-caps lines containing these are descriptions, not brands.
const NON_BRAND_KEYWORDS: &[&str] = &["warning", "contains", "nourishing", "bouncy", "moist", "for"];

const MAX_INGREDIENTS: usize = 30;

static EXPIRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:exp|expiry|expires?|best\s*before|use\s*by)[:\s]*([0-9]{1,2}[/-][0-9]{1,2}[/-][0-9]{2,4}|[0-9]{1,2}[/-][0-9]{4}|[A-Za-z]+\s+[0-9]{4})",
    )
    .unwrap()
});

static MFG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:mfg|manufactured|prod|production|date\s*of)[:\s]*([0-9]{1,2}[/-][0-9]{1,2}[/-][0-9]{2,4}|[0-9]{1,2}[/-][0-9]{4}|[A-Za-z]+\s+[0-9]{4})",
    )
    .unwrap()
});

static FULL_NUMERIC_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2})[/-]([0-9]{1,2})[/-]([0-9]{2,4})$").unwrap());

static INGREDIENTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)ingredients?[:\s]*\n?(.+?)(?:\n\s*\n|\n[A-Z][a-z]+:|$)").unwrap()
});

static INGREDIENT_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;\n]+").unwrap());

static NUMERIC_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9\W]+$").unwrap());

fn non_empty_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty())
}

fn is_all_caps(line: &str) -> bool {
    line.chars().any(char::is_alphabetic) && !line.chars().any(char::is_lowercase)
}

/// Brand: a known brand first, otherwise the first short all-caps line.
pub fn extract_brand(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    if let Some(brand) = KNOWN_BRANDS.iter().find(|b| upper.contains(*b)) {
        return Some(brand.to_string());
    }

    non_empty_lines(text)
        .filter(|line| is_all_caps(line) && (3..=20).contains(&line.chars().count()))
        .find(|line| {
            let lower = line.to_lowercase();
            !NON_BRAND_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .map(str::to_string)
}

/// Product name: the first descriptive line near the top of the label.
pub fn extract_product_name(text: &str) -> Option<String> {
    non_empty_lines(text)
        .take(15)
        .find(|line| {
            let len = line.chars().count();
            if len < 3 || NUMERIC_LINE_RE.is_match(line) {
                return false;
            }
            // Long all-caps runs are descriptions; single all-caps words are brands.
            if is_all_caps(line) && (len > 40 || line.split_whitespace().count() == 1) {
                return false;
            }
            true
        })
        .map(str::to_string)
}

/// Normalize `d/m/yy` style dates to `d/m/20yy`; text dates pass through.
fn normalize_date(raw: &str) -> String {
    match FULL_NUMERIC_DATE_RE.captures(raw) {
        Some(caps) => {
            let year = &caps[3];
            let year = if year.len() == 2 {
                format!("20{year}")
            } else {
                year.to_string()
            };
            format!("{}/{}/{}", &caps[1], &caps[2], year)
        }
        None => raw.replace('-', "/"),
    }
}

pub fn extract_expiry_date(text: &str) -> Option<String> {
    EXPIRY_RE
        .captures(text)
        .map(|caps| normalize_date(caps[1].trim()))
}

pub fn extract_mfg_date(text: &str) -> Option<String> {
    MFG_RE.captures(text).map(|caps| normalize_date(caps[1].trim()))
}

/// Split a delimited run on commas, semicolons and newlines, stripping
/// bullets and dropping blanks.
pub fn split_items(text: &str) -> Vec<String> {
    INGREDIENT_SPLIT_RE
        .split(text)
        .map(|p| p.trim().trim_matches(|c| matches!(c, '•' | '-' | '*' | '.')).trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Items of the `Ingredients:` block.
pub fn extract_ingredients(text: &str) -> Vec<String> {
    let Some(caps) = INGREDIENTS_RE.captures(text) else {
        return Vec::new();
    };
    split_items(&caps[1])
        .into_iter()
        .filter(|p| p.chars().count() > 2)
        .take(MAX_INGREDIENTS)
        .collect()
}

pub fn extract_warnings(text: &str) -> Vec<String> {
    non_empty_lines(text)
        .filter(|line| line.chars().count() > 3)
        .filter(|line| {
            let lower = line.to_lowercase();
            WARNING_KEYWORDS.iter().any(|kw| lower.contains(kw))
        })
        .map(str::to_string)
        .collect()
}

/// Score what was found. No product name means no confidence at all.
pub fn score(result: &ExtractionResult) -> f64 {
    if result.text(FieldName::ProductName).is_none() {
        return 0.0;
    }
    let mut score = 0.40;
    if result.text(FieldName::Brand).is_some() {
        score += 0.25;
    }
    if result.text(FieldName::ExpiryDate).is_some() {
        score += 0.20;
    }
    if !result.list(FieldName::Ingredients).is_empty() {
        score += 0.10;
    }
    if !result.list(FieldName::Warnings).is_empty() {
        score += 0.05;
    }
    f64::min(score, 1.0)
}

/// Fill every absent field of `result` from its raw text.
pub fn fill_gaps(result: &mut ExtractionResult) {
    let text = result.raw_text.clone();
    for field in FieldName::ALL {
        if result.fields.get(&field).is_some_and(|v| !v.is_absent()) {
            continue;
        }
        let value = match field {
            FieldName::ProductName => extract_product_name(&text).map(FieldValue::Text),
            FieldName::Brand => extract_brand(&text).map(FieldValue::Text),
            FieldName::ExpiryDate => extract_expiry_date(&text).map(FieldValue::Text),
            FieldName::MfgDate => extract_mfg_date(&text).map(FieldValue::Text),
            FieldName::Ingredients => non_empty(extract_ingredients(&text)),
            FieldName::Warnings => non_empty(extract_warnings(&text)),
        };
        if let Some(value) = value {
            result.fields.insert(field, value);
        }
    }
}

fn non_empty(items: Vec<String>) -> Option<FieldValue> {
    (!items.is_empty()).then_some(FieldValue::List(items))
}

/// Build a complete result from OCR text alone.
pub fn extract_from_text(text: &str) -> ExtractionResult {
    let mut result = ExtractionResult::new(0, text);
    fill_gaps(&mut result);
    let confidence = score(&result);
    result.with_confidence(confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACK_LABEL: &str = "Directions: apply daily\n\
        Ingredients: Water, Glycerin; Niacinamide\nSodium Hyaluronate\n\n\
        WARNING: For external use only\n\
        Keep away from children\n\
        EXP 03/11/27\n\
        MFG: 03-11-2024";

    #[test]
    fn test_known_brand() {
        assert_eq!(extract_brand("new\nDove beauty bar").as_deref(), Some("DOVE"));
    }

    #[test]
    fn test_all_caps_brand_candidate() {
        assert_eq!(
            extract_brand("ACME LABS\nGentle Cleanser").as_deref(),
            Some("ACME LABS")
        );
        assert!(extract_brand("WARNING\nsoft text").is_none());
    }

    #[test]
    fn test_product_name_skips_brand_and_numbers() {
        let text = "COSRX\n12345\nLow pH Good Morning Gel Cleanser\n150ml";
        assert_eq!(
            extract_product_name(text).as_deref(),
            Some("Low pH Good Morning Gel Cleanser")
        );
    }

    #[test]
    fn test_dates_are_normalized() {
        assert_eq!(extract_expiry_date(BACK_LABEL).as_deref(), Some("03/11/2027"));
        assert_eq!(extract_mfg_date(BACK_LABEL).as_deref(), Some("03/11/2024"));
        assert_eq!(
            extract_expiry_date("Best before: March 2026").as_deref(),
            Some("March 2026")
        );
        assert_eq!(extract_expiry_date("USE BY 12/2026").as_deref(), Some("12/2026"));
        assert!(extract_expiry_date("no dates here").is_none());
    }

    #[test]
    fn test_ingredients_block() {
        assert_eq!(
            extract_ingredients(BACK_LABEL),
            vec!["Water", "Glycerin", "Niacinamide", "Sodium Hyaluronate"]
        );
        assert!(extract_ingredients("nothing listed").is_empty());
    }

    #[test]
    fn test_split_items() {
        assert_eq!(
            split_items("• Water;\n- Glycerin, , Shea Butter."),
            vec!["Water", "Glycerin", "Shea Butter"]
        );
        assert!(split_items(" ,; ").is_empty());
    }

    #[test]
    fn test_warning_lines() {
        assert_eq!(
            extract_warnings(BACK_LABEL),
            vec!["WARNING: For external use only", "Keep away from children"]
        );
    }

    #[test]
    fn test_score_requires_product_name() {
        let without_name = ExtractionResult::new(0, "").with_text(FieldName::Brand, "DOVE");
        assert_eq!(score(&without_name), 0.0);

        let full = ExtractionResult::new(0, "")
            .with_text(FieldName::ProductName, "Soap")
            .with_text(FieldName::Brand, "DOVE")
            .with_text(FieldName::ExpiryDate, "12/2026")
            .with_list(FieldName::Ingredients, ["Water"])
            .with_list(FieldName::Warnings, ["Caution"]);
        assert!((score(&full) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fill_gaps_keeps_existing_values() {
        let mut result = ExtractionResult::new(0, "DOVE\nBeauty Bar\nEXP 01/02/2026")
            .with_text(FieldName::ProductName, "Deep Moisture Bar");
        fill_gaps(&mut result);
        assert_eq!(result.text(FieldName::ProductName), Some("Deep Moisture Bar"));
        assert_eq!(result.text(FieldName::Brand), Some("DOVE"));
        assert_eq!(result.text(FieldName::ExpiryDate), Some("01/02/2026"));
    }

    #[test]
    fn test_extract_from_text() {
        let result = extract_from_text("DOVE\nDeep Moisture Bar\nCaution: avoid eyes");
        assert_eq!(result.text(FieldName::ProductName), Some("Deep Moisture Bar"));
        assert_eq!(result.list(FieldName::Warnings), ["Caution: avoid eyes"]);
        assert!((result.confidence.unwrap() - 0.70).abs() < 1e-9);
    }
}
