//! Nutrition records and the scaled results derived from them

use crate::NutritionError;
use serde::{Deserialize, Serialize};

/// Macro data for one food item, as scraped for a single serving.
///
/// Persisted once per `food_id` and never re-scraped afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct NutritionRecord {
    pub food_id: String,
    pub food_name: String,
    /// Grams per single serving
    pub serving_size: f64,
    /// Serving units shown in the page's default display
    pub quantity: f64,
    pub quantity_unit: String,
    pub calories: f64,
    pub total_fat: f64,
    pub total_carbohydrates: f64,
    pub dietary_fiber: f64,
    pub protein: f64,
}

/// How a request wants a record scaled: by serving count or by grams.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScaleInput {
    Count(u32),
    Weight(f64),
}

impl ScaleInput {
    /// Build a scale from raw query values.
    ///
    /// Empty strings count as absent. When both are given `count` wins.
    pub fn from_query(count: Option<&str>, weight: Option<&str>) -> Result<Self, NutritionError> {
        let count = count.map(str::trim).filter(|v| !v.is_empty());
        let weight = weight.map(str::trim).filter(|v| !v.is_empty());

        match (count, weight) {
            (Some(count), _) => match count.parse::<u32>() {
                Ok(count) if count > 0 => Ok(ScaleInput::Count(count)),
                _ => Err(NutritionError::InvalidRequest(format!(
                    "count must be a positive integer, got '{count}'"
                ))),
            },
            (None, Some(weight)) => match weight.parse::<f64>() {
                Ok(weight) if weight.is_finite() && weight > 0.0 => Ok(ScaleInput::Weight(weight)),
                _ => Err(NutritionError::InvalidRequest(format!(
                    "weight must be a positive number, got '{weight}'"
                ))),
            },
            (None, None) => Err(NutritionError::InvalidRequest(
                "either count or weight is required".to_string(),
            )),
        }
    }

    /// Multiplier applied to every per-serving value.
    pub fn factor(&self, serving_size: f64) -> Result<f64, NutritionError> {
        match *self {
            ScaleInput::Count(count) => Ok(f64::from(count)),
            ScaleInput::Weight(weight) => {
                if !serving_size.is_finite() || serving_size <= 0.0 {
                    return Err(NutritionError::InvalidScaleInput(format!(
                        "cannot scale by weight with a serving size of {serving_size}"
                    )));
                }
                Ok(weight / serving_size)
            }
        }
    }
}

/// A record scaled for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledMacroResult {
    pub food_id: String,
    pub food_name: String,
    #[serde(flatten)]
    pub scale: ScaleInput,
    pub quantity: f64,
    pub quantity_unit: String,
    pub calories: f64,
    pub total_fat: f64,
    pub total_carbohydrates: f64,
    pub dietary_fiber: f64,
    pub protein: f64,
}

impl ScaledMacroResult {
    pub fn from_record(record: &NutritionRecord, scale: ScaleInput) -> Result<Self, NutritionError> {
        let factor = scale.factor(record.serving_size)?;
        let scaled = |value: f64| round_tenths(value * factor);

        Ok(Self {
            food_id: record.food_id.clone(),
            food_name: record.food_name.clone(),
            scale,
            quantity: scaled(record.quantity),
            quantity_unit: record.quantity_unit.clone(),
            calories: scaled(record.calories),
            total_fat: scaled(record.total_fat),
            total_carbohydrates: scaled(record.total_carbohydrates),
            dietary_fiber: scaled(record.dietary_fiber),
            protein: scaled(record.protein),
        })
    }
}

/// Round to one decimal place, halves rounding up.
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bagel() -> NutritionRecord {
        NutritionRecord {
            food_id: "bagel".to_string(),
            food_name: "Bagel".to_string(),
            serving_size: 50.0,
            quantity: 1.0,
            quantity_unit: "small".to_string(),
            calories: 155.0,
            total_fat: 0.95,
            total_carbohydrates: 30.2,
            dietary_fiber: 1.3,
            protein: 6.04,
        }
    }

    #[test]
    fn test_round_tenths() {
        assert_eq!(round_tenths(12.34), 12.3);
        assert_eq!(round_tenths(12.35), 12.4);
        assert_eq!(round_tenths(310.0), 310.0);
        assert_eq!(round_tenths(0.04), 0.0);
    }

    #[test]
    fn test_scale_by_count() {
        let result = ScaledMacroResult::from_record(&bagel(), ScaleInput::Count(2)).unwrap();
        assert_eq!(result.calories, 310.0);
        assert_eq!(result.total_fat, 1.9);
        assert_eq!(result.protein, 12.1);
        assert_eq!(result.quantity, 2.0);
        assert_eq!(result.quantity_unit, "small");
    }

    #[test]
    fn test_scale_by_weight() {
        let result = ScaledMacroResult::from_record(&bagel(), ScaleInput::Weight(100.0)).unwrap();
        assert_eq!(result.calories, 310.0);
        assert_eq!(result.scale, ScaleInput::Weight(100.0));

        let result = ScaledMacroResult::from_record(&bagel(), ScaleInput::Weight(25.0)).unwrap();
        assert_eq!(result.calories, 77.5);
    }

    #[test]
    fn test_zero_serving_size_is_rejected_for_weight() {
        let record = NutritionRecord {
            serving_size: 0.0,
            ..bagel()
        };
        let result = ScaledMacroResult::from_record(&record, ScaleInput::Weight(100.0));
        assert!(matches!(result, Err(NutritionError::InvalidScaleInput(_))));

        // Count scaling never divides, so it still works
        let result = ScaledMacroResult::from_record(&record, ScaleInput::Count(1)).unwrap();
        assert_eq!(result.calories, 155.0);
    }

    #[test]
    fn test_scale_input_from_query() {
        assert_eq!(
            ScaleInput::from_query(Some("2"), None).unwrap(),
            ScaleInput::Count(2)
        );
        assert_eq!(
            ScaleInput::from_query(None, Some("150.5")).unwrap(),
            ScaleInput::Weight(150.5)
        );
        assert_eq!(
            ScaleInput::from_query(Some("3"), Some("100")).unwrap(),
            ScaleInput::Count(3)
        );
        assert_eq!(
            ScaleInput::from_query(Some(""), Some("40")).unwrap(),
            ScaleInput::Weight(40.0)
        );
    }

    #[test]
    fn test_scale_input_rejects_invalid() {
        for (count, weight) in [
            (None, None),
            (Some(""), Some(" ")),
            (Some("0"), None),
            (Some("-1"), None),
            (Some("two"), None),
            (None, Some("0")),
            (None, Some("NaN")),
            (None, Some("inf")),
        ] {
            assert!(
                matches!(
                    ScaleInput::from_query(count, weight),
                    Err(NutritionError::InvalidRequest(_))
                ),
                "expected rejection for count={count:?} weight={weight:?}"
            );
        }
    }

    #[test]
    fn test_scaled_result_json_shape() {
        let result = ScaledMacroResult::from_record(&bagel(), ScaleInput::Count(2)).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["count"], 2);
        assert!(json.get("weight").is_none());
        assert_eq!(json["totalCarbohydrates"], 60.4);
        assert!(json.get("servingSize").is_none());

        let result = ScaledMacroResult::from_record(&bagel(), ScaleInput::Weight(100.0)).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["weight"], 100.0);
        assert!(json.get("count").is_none());
    }

    #[test]
    fn test_record_json_is_camel_case() {
        let json = serde_json::to_value(bagel()).unwrap();
        assert_eq!(json["foodId"], "bagel");
        assert_eq!(json["servingSize"], 50.0);
        assert_eq!(json["dietaryFiber"], 1.3);
    }
}
