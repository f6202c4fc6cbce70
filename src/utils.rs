use crate::NutritionError;
use std::time::Duration;
use url::Url;

/// Parse `url` and require an http or https scheme.
pub fn validate_url(url: &str) -> Result<Url, NutritionError> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(NutritionError::InvalidUrl(format!(
            "unsupported scheme '{other}' in {url}"
        ))),
    }
}

/// Trim a caller-supplied food id, rejecting blank ones.
pub fn normalize_food_id(food_id: &str) -> Result<&str, NutritionError> {
    let trimmed = food_id.trim();
    if trimmed.is_empty() {
        return Err(NutritionError::InvalidRequest(
            "food item must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Build the nutrition page URL for `food_id` under `base_url`.
///
/// The id becomes exactly one path segment; characters such as `/` or `?` are
/// percent-encoded so a food id can never escape the base path.
pub fn build_source_url(base_url: &str, food_id: &str) -> Result<Url, NutritionError> {
    let mut url = validate_url(base_url)?;

    url.path_segments_mut()
        .map_err(|_| NutritionError::InvalidUrl(format!("{base_url} cannot be a base URL")))?
        .pop_if_empty()
        .push(food_id);

    Ok(url)
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

/// Collapse runs of whitespace (including newlines and tabs) into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
