//! Parsing of a single cron field into its allowed value set.
//!
//! Supports wildcards (`*`, `?`), lists (`a,b,c`), ranges (`a-b`), steps
//! (`*/n`, `a-b/n`, `a/n` meaning "from a to the field maximum"), and
//! three-letter month/weekday names.

use crate::cron::error::CronError;

pub(crate) const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub(crate) const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Parse one field. `None` means the field is unrestricted (`*` or `?`).
///
/// `names` are symbolic values starting at `name_base` (1 for months, 0 for
/// weekdays).
pub(crate) fn parse_field(
    field: &'static str,
    text: &str,
    min: u32,
    max: u32,
    names: &[&str],
    name_base: u32,
) -> Result<Option<Vec<u32>>, CronError> {
    if text == "*" || text == "?" {
        return Ok(None);
    }

    let mut values = Vec::new();
    for part in text.split(',') {
        parse_part(field, text, part, min, max, names, name_base, &mut values)?;
    }
    if values.is_empty() {
        return Err(err(field, text, "empty value list"));
    }
    values.sort_unstable();
    values.dedup();
    Ok(Some(values))
}

#[allow(clippy::too_many_arguments)]
fn parse_part(
    field: &'static str,
    full: &str,
    part: &str,
    min: u32,
    max: u32,
    names: &[&str],
    name_base: u32,
    out: &mut Vec<u32>,
) -> Result<(), CronError> {
    if part.is_empty() {
        return Err(err(field, full, "empty list entry"));
    }

    let (range_text, step) = match part.split_once('/') {
        Some((range_text, step_text)) => {
            let step: u32 = step_text
                .parse()
                .map_err(|_| err(field, full, "step is not a number"))?;
            if step == 0 {
                return Err(err(field, full, "step must be greater than zero"));
            }
            (range_text, step)
        }
        None => (part, 1),
    };

    let (start, end) = if range_text == "*" || range_text == "?" {
        (min, max)
    } else if let Some((start_text, end_text)) = range_text.split_once('-') {
        (
            parse_value(field, full, start_text, names, name_base)?,
            parse_value(field, full, end_text, names, name_base)?,
        )
    } else {
        let value = parse_value(field, full, range_text, names, name_base)?;
        // "n/step" runs from n to the field maximum, a bare "n" is just n
        if part.contains('/') {
            (value, max)
        } else {
            (value, value)
        }
    };

    if start < min || end > max {
        return Err(err(field, full, "value out of range"));
    }
    if start > end {
        return Err(err(field, full, "range start exceeds range end"));
    }

    let mut value = start;
    while value <= end {
        out.push(value);
        value += step;
    }
    Ok(())
}

fn parse_value(
    field: &'static str,
    full: &str,
    token: &str,
    names: &[&str],
    name_base: u32,
) -> Result<u32, CronError> {
    if token.chars().all(|c| c.is_ascii_digit()) && !token.is_empty() {
        return token
            .parse()
            .map_err(|_| err(field, full, "value is not a number"));
    }
    let lower = token.to_ascii_lowercase();
    names
        .iter()
        .position(|name| *name == lower)
        .map(|idx| idx as u32 + name_base)
        .ok_or_else(|| err(field, full, "unrecognized value"))
}

fn err(field: &'static str, value: &str, reason: &'static str) -> CronError {
    CronError::InvalidField {
        field,
        value: value.to_string(),
        reason,
    }
}
