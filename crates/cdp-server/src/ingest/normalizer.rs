//! Row normalizer
//!
//! Pure mapping from a raw CSV record to a canonical customer row. A record
//! without an email (after trimming) is not a customer and maps to `None`;
//! the caller counts it as skipped. No I/O happens here.

use serde::{Deserialize, Serialize};

/// One raw record as read from the customer CSV
///
/// Every field is optional: source exports routinely omit columns or leave
/// cells empty, and that is handled here rather than in the reader.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCustomerRecord {
    #[serde(rename = "Email", default)]
    pub email: Option<String>,

    #[serde(rename = "First Name", default)]
    pub first_name: Option<String>,

    #[serde(rename = "Last Name", default)]
    pub last_name: Option<String>,

    #[serde(rename = "Phone 1", default)]
    pub phone_primary: Option<String>,

    #[serde(rename = "Phone 2", default)]
    pub phone_secondary: Option<String>,
}

/// A canonical customer row ready for insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Normalize a raw record into a canonical customer row
///
/// Returns `None` when the record has no usable email. The display name joins
/// first and last name with a single space; the phone takes the first
/// non-empty of the two phone columns.
pub fn normalize(record: &RawCustomerRecord) -> Option<NewCustomer> {
    let email = non_empty(&record.email)?;

    let name_parts: Vec<&str> = [
        non_empty(&record.first_name),
        non_empty(&record.last_name),
    ]
    .into_iter()
    .flatten()
    .collect();

    let name = if name_parts.is_empty() {
        None
    } else {
        Some(name_parts.join(" "))
    };

    let phone = non_empty(&record.phone_primary)
        .or_else(|| non_empty(&record.phone_secondary))
        .map(str::to_string);

    Some(NewCustomer {
        email: email.to_string(),
        name,
        phone,
    })
}
