//! Extraction of nutrition facts from a rendered page
//!
//! The page loader hands over the DOM after the nutrition panel has rendered;
//! this module applies a fixed table of field rules to it. Each rule either
//! reads an element directly by selector or finds a label by its visible text
//! and reads the element right after it.

use crate::{normalize_whitespace, NutritionError, NutritionRecord};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;

lazy_static! {
    /// Grouped form only when the last group ends the number, so `1,2345`
    /// never reads as 1234.
    static ref NUMERAL: Regex =
        Regex::new(r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?)(?:[^\d,]|$)|(\d+(?:\.\d+)?)")
            .expect("numeral pattern is valid");
    static ref SERVING_GRAMS: Regex =
        Regex::new(r"\(\s*(\d+(?:\.\d+)?)\s*g").expect("serving size pattern is valid");
}

/// Fields pulled out of a nutrition panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FoodName,
    ServingSize,
    Quantity,
    QuantityUnit,
    Calories,
    TotalFat,
    TotalCarbohydrates,
    DietaryFiber,
    Protein,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::FoodName => "foodName",
            Field::ServingSize => "servingSize",
            Field::Quantity => "quantity",
            Field::QuantityUnit => "quantityUnit",
            Field::Calories => "calories",
            Field::TotalFat => "totalFat",
            Field::TotalCarbohydrates => "totalCarbohydrates",
            Field::DietaryFiber => "dietaryFiber",
            Field::Protein => "protein",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a field's raw text is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// Trimmed text of the first element in the panel matching the selector.
    Selector(&'static str),
    /// Element whose own text is exactly the label, then its next sibling element.
    LabelSibling(&'static str),
    /// `value` attribute of the first matching input in the panel.
    InputValue(&'static str),
    /// Own text of the matching element, up to the first `(`.
    UnitLabel(&'static str),
    /// Document title with the given prefix removed.
    DocumentTitle { prefix: &'static str },
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub field: Field,
    pub rule: ExtractionRule,
}

pub const NUTRITION_RULES: &[FieldRule] = &[
    FieldRule {
        field: Field::FoodName,
        rule: ExtractionRule::DocumentTitle {
            prefix: "Calories in ",
        },
    },
    FieldRule {
        field: Field::ServingSize,
        rule: ExtractionRule::Selector(".nf-serving-unit-name"),
    },
    FieldRule {
        field: Field::Quantity,
        rule: ExtractionRule::InputValue("input.nf-unitQuantityBox"),
    },
    FieldRule {
        field: Field::QuantityUnit,
        rule: ExtractionRule::UnitLabel(".nf-serving-unit-name"),
    },
    FieldRule {
        field: Field::Calories,
        rule: ExtractionRule::Selector(r#"span.nf-pr[itemprop="calories"]"#),
    },
    FieldRule {
        field: Field::TotalFat,
        rule: ExtractionRule::LabelSibling("Total Fat"),
    },
    FieldRule {
        field: Field::TotalCarbohydrates,
        rule: ExtractionRule::LabelSibling("Total Carbohydrates"),
    },
    FieldRule {
        field: Field::DietaryFiber,
        rule: ExtractionRule::LabelSibling("Dietary Fiber"),
    },
    FieldRule {
        field: Field::Protein,
        rule: ExtractionRule::LabelSibling("Protein"),
    },
];

/// A record plus the fields that fell back to a default while parsing.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: NutritionRecord,
    pub degraded: Vec<Field>,
}

/// First integer or decimal numeral in `text`, or `0.0` when there is none.
///
/// Thousands separators are accepted (`"1,250 kcal"` gives 1250).
pub fn parse_numeral(text: &str) -> f64 {
    NUMERAL
        .captures(text)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
        .unwrap_or(0.0)
}

/// Grams per serving from text shaped like `"<unit> (<number>g)"`, or `0.0`.
pub fn parse_serving_size(text: &str) -> f64 {
    SERVING_GRAMS
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0.0)
}

/// Apply [`NUTRITION_RULES`] to a rendered page.
pub fn extract_record(
    food_id: &str,
    html: &str,
    panel_selector: &str,
) -> Result<Extraction, NutritionError> {
    let document = Html::parse_document(html);
    let panel_sel = parse_selector(panel_selector)?;
    let panel = document
        .select(&panel_sel)
        .next()
        .ok_or_else(|| NutritionError::PanelMissing(panel_selector.to_string()))?;

    let mut texts = Vec::with_capacity(NUTRITION_RULES.len());
    for rule in NUTRITION_RULES {
        texts.push((rule.field, apply_rule(&document, panel, rule.rule)?));
    }
    let text_of = |field: Field| {
        texts
            .iter()
            .find(|(f, _)| *f == field)
            .and_then(|(_, text)| text.as_deref())
            .filter(|text| !text.is_empty())
    };

    let mut degraded = Vec::new();
    let mut numeric = |field: Field| -> f64 {
        match text_of(field) {
            Some(text) if NUMERAL.is_match(text) => parse_numeral(text),
            _ => {
                degraded.push(field);
                0.0
            }
        }
    };
    let calories = numeric(Field::Calories);
    let total_fat = numeric(Field::TotalFat);
    let total_carbohydrates = numeric(Field::TotalCarbohydrates);
    let dietary_fiber = numeric(Field::DietaryFiber);
    let protein = numeric(Field::Protein);

    let serving_text = text_of(Field::ServingSize);
    let serving_size = serving_text.map_or(0.0, parse_serving_size);
    if serving_size <= 0.0 {
        return Err(NutritionError::MalformedField(format!(
            "{}: no gram weight in {:?}",
            Field::ServingSize,
            serving_text.unwrap_or_default()
        )));
    }

    let quantity = match text_of(Field::Quantity).map(parse_numeral) {
        Some(quantity) if quantity > 0.0 => quantity,
        _ => {
            degraded.push(Field::Quantity);
            1.0
        }
    };

    let food_name = match text_of(Field::FoodName) {
        Some(name) => name.to_string(),
        None => {
            degraded.push(Field::FoodName);
            food_id.to_string()
        }
    };
    let quantity_unit = text_of(Field::QuantityUnit).unwrap_or_default().to_string();

    Ok(Extraction {
        record: NutritionRecord {
            food_id: food_id.to_string(),
            food_name,
            serving_size,
            quantity,
            quantity_unit,
            calories,
            total_fat,
            total_carbohydrates,
            dietary_fiber,
            protein,
        },
        degraded,
    })
}

fn apply_rule(
    document: &Html,
    panel: ElementRef<'_>,
    rule: ExtractionRule,
) -> Result<Option<String>, NutritionError> {
    let text = match rule {
        ExtractionRule::Selector(selector) => {
            let sel = parse_selector(selector)?;
            panel.select(&sel).next().map(element_text)
        }
        ExtractionRule::LabelSibling(label) => find_label(panel, label)
            .and_then(next_sibling_element)
            .map(element_text),
        ExtractionRule::InputValue(selector) => {
            let sel = parse_selector(selector)?;
            panel
                .select(&sel)
                .next()
                .and_then(|input| input.value().attr("value"))
                .map(|value| value.trim().to_string())
        }
        ExtractionRule::UnitLabel(selector) => {
            let sel = parse_selector(selector)?;
            panel.select(&sel).next().map(|el| {
                let own = own_text(el);
                own.split('(').next().unwrap_or_default().trim().to_string()
            })
        }
        ExtractionRule::DocumentTitle { prefix } => {
            let sel = parse_selector("title")?;
            document.select(&sel).next().map(|title| {
                let text = element_text(title);
                match text.find(prefix) {
                    Some(idx) => text[idx + prefix.len()..].trim().to_string(),
                    None => text,
                }
            })
        }
    };
    Ok(text)
}

fn parse_selector(selector: &str) -> Result<Selector, NutritionError> {
    Selector::parse(selector)
        .map_err(|e| NutritionError::InvalidSelector(format!("{selector}: {e:?}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Text held directly by `element`, ignoring descendants.
fn own_text(element: ElementRef<'_>) -> String {
    let direct: String = element
        .children()
        .filter_map(|child| child.value().as_text().map(|text| &**text))
        .collect();
    normalize_whitespace(&direct)
}

fn find_label<'a>(panel: ElementRef<'a>, label: &str) -> Option<ElementRef<'a>> {
    panel
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| own_text(*el) == label)
}

fn next_sibling_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANEL: &str = include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/fixtures/nutrition_panel.html"
    ));

    #[test]
    fn test_parse_numeral() {
        assert_eq!(parse_numeral("10g"), 10.0);
        assert_eq!(parse_numeral("  3.6 g "), 3.6);
        assert_eq!(parse_numeral("Calories 285"), 285.0);
        assert_eq!(parse_numeral("1,250 kcal"), 1250.0);
        assert_eq!(parse_numeral("1,250mg"), 1250.0);
        assert_eq!(parse_numeral("12,345.5"), 12345.5);
        assert_eq!(parse_numeral("1,250"), 1250.0);
        // Not a valid grouping, so only the leading digits count
        assert_eq!(parse_numeral("1,2345"), 1.0);
        assert_eq!(parse_numeral("1,234,5678"), 1.0);
        assert_eq!(parse_numeral("2 (about 3.5oz)"), 2.0);
        assert_eq!(parse_numeral("Data not available"), 0.0);
        assert_eq!(parse_numeral(""), 0.0);
    }

    #[test]
    fn test_parse_serving_size() {
        assert_eq!(parse_serving_size("Nutrition Facts (28g)"), 28.0);
        assert_eq!(parse_serving_size("slice (107g)"), 107.0);
        assert_eq!(parse_serving_size("cup, chopped ( 140.5 g)"), 140.5);
        assert_eq!(parse_serving_size("2 slices (about 3oz)"), 0.0);
        assert_eq!(parse_serving_size("no numbers here"), 0.0);
    }

    #[test]
    fn test_extract_record_from_panel() {
        let extraction = extract_record("pizza", PANEL, ".nf").unwrap();
        let record = extraction.record;

        assert_eq!(record.food_id, "pizza");
        assert_eq!(record.food_name, "1 slice of Cheese Pizza");
        assert_eq!(record.serving_size, 107.0);
        assert_eq!(record.quantity, 1.0);
        assert_eq!(record.quantity_unit, "slice");
        assert_eq!(record.calories, 285.0);
        assert_eq!(record.total_fat, 10.4);
        assert_eq!(record.total_carbohydrates, 35.7);
        assert_eq!(record.dietary_fiber, 2.5);
        assert_eq!(record.protein, 12.2);
        assert!(extraction.degraded.is_empty(), "{:?}", extraction.degraded);
    }

    #[test]
    fn test_missing_fields_degrade_to_zero() {
        let html = r#"
            <html><head><title>Calories in Water</title></head><body>
            <div class="nf">
              <div class="nf-serving-unit-name">cup (237g)</div>
              <span class="nf-pr" itemprop="calories">0</span>
              <div><span>Protein</span><span>n/a</span></div>
            </div></body></html>"#;

        let extraction = extract_record("water", html, ".nf").unwrap();
        assert_eq!(extraction.record.food_name, "Water");
        assert_eq!(extraction.record.quantity, 1.0);
        assert_eq!(extraction.record.total_fat, 0.0);
        assert_eq!(extraction.record.protein, 0.0);
        assert!(extraction.degraded.contains(&Field::TotalFat));
        assert!(extraction.degraded.contains(&Field::Protein));
        assert!(extraction.degraded.contains(&Field::Quantity));
    }

    #[test]
    fn test_label_must_match_exactly() {
        let html = r#"
            <html><body><div class="nf">
              <div class="nf-serving-unit-name">bar (40g)</div>
              <div><span>Protein Blend</span><span>99g</span></div>
              <div><span> Protein </span><b>7g</b></div>
            </div></body></html>"#;

        let extraction = extract_record("bar", html, ".nf").unwrap();
        assert_eq!(extraction.record.protein, 7.0);
        assert_eq!(extraction.record.food_name, "bar");
    }

    #[test]
    fn test_missing_serving_size_is_malformed() {
        let html = r#"<html><body><div class="nf">
              <span class="nf-pr" itemprop="calories">120</span>
            </div></body></html>"#;

        let result = extract_record("mystery", html, ".nf");
        assert!(matches!(result, Err(NutritionError::MalformedField(_))));
    }

    #[test]
    fn test_missing_panel() {
        let result = extract_record("pizza", "<html><body><p>Not found</p></body></html>", ".nf");
        assert!(matches!(result, Err(NutritionError::PanelMissing(_))));
    }

    #[test]
    fn test_every_field_has_a_rule() {
        for field in [
            Field::FoodName,
            Field::ServingSize,
            Field::Quantity,
            Field::QuantityUnit,
            Field::Calories,
            Field::TotalFat,
            Field::TotalCarbohydrates,
            Field::DietaryFiber,
            Field::Protein,
        ] {
            assert!(NUTRITION_RULES.iter().any(|r| r.field == field), "{field}");
        }
    }
}
