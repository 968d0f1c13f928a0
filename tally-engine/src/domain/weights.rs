//! Extraction of per-record effort weights from a generator's free-text reply.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::{models::WorklogRecord, RecordWeight, ValidationError};

#[derive(Debug, Deserialize)]
struct RawWeight {
    index: Value,
    hours: Value,
}

/// The first non-empty `[{index, hours}, ...]` array in `text`.
///
/// Every `[` is tried as a start; the stream deserializer stops after one
/// value, so prose before and after the array is ignored.
fn find_weight_array(text: &str) -> Result<Vec<RawWeight>, ValidationError> {
    let mut first_error = None;
    let mut saw_empty = false;

    for (start, _) in text.match_indices('[') {
        let mut values =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<Vec<RawWeight>>();
        match values.next() {
            Some(Ok(raw)) if raw.is_empty() => saw_empty = true,
            Some(Ok(raw)) => return Ok(raw),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }

    Err(match (saw_empty, first_error) {
        (true, _) => ValidationError::invalid_weights("weight array is empty"),
        (false, Some(e)) => ValidationError::invalid_weights(format!("malformed JSON array: {e}")),
        (false, None) => ValidationError::invalid_weights("no JSON array found in reply"),
    })
}

/// Parse a reply of the shape `[{"index": 0, "hours": 1.5}, ...]` embedded in
/// arbitrary text, mapping each index onto the record at that position.
///
/// Zero weights are accepted here. Whether the set is usable depends on the
/// defaults given to records the reply left out, which the distribution
/// engine decides.
///
/// # Examples
///
/// ```
/// use tally_engine::domain::{parse_weight_payload, models::WorklogRecord};
/// use time::macros::date;
///
/// let records = vec![
///     WorklogRecord::new("1", "PROJ-1", 3600, date!(2024 - 03 - 04)),
///     WorklogRecord::new("2", "PROJ-2", 3600, date!(2024 - 03 - 04)),
/// ];
/// let reply = r#"Sure! [{"index": 0, "hours": 2}, {"index": 1, "hours": 6}]"#;
/// let weights = parse_weight_payload(reply, &records).unwrap();
/// assert_eq!(weights[1].hours, 6.0);
/// ```
pub fn parse_weight_payload(
    text: &str,
    records: &[WorklogRecord],
) -> Result<Vec<RecordWeight>, ValidationError> {
    let raw = find_weight_array(text)?;

    // Later duplicates overwrite earlier ones
    let mut by_index: BTreeMap<usize, f64> = BTreeMap::new();
    for item in raw {
        let index = item
            .index
            .as_u64()
            .map(|i| i as usize)
            .filter(|i| *i < records.len())
            .ok_or_else(|| {
                ValidationError::invalid_weights(format!(
                    "index {} is not a position in 0..{}",
                    item.index,
                    records.len()
                ))
            })?;

        let hours = item
            .hours
            .as_f64()
            .filter(|h| h.is_finite() && *h >= 0.0)
            .ok_or_else(|| {
                ValidationError::invalid_weights(format!(
                    "hours {} is not a non-negative number",
                    item.hours
                ))
            })?;

        by_index.insert(index, hours);
    }

    Ok(by_index
        .into_iter()
        .map(|(index, hours)| RecordWeight::new(records[index].id.clone(), hours))
        .collect())
}
