//! Request parameters for the WOW `automaticreading` endpoint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{ConvertedSnapshot, Credentials};

/// Client identifier sent as `softwaretype`.
pub const SOFTWARE_TYPE: &str = concat!("wow-relay-", env!("CARGO_PKG_VERSION"));

/// `dateutc` format. The space is encoded by the transport (`+`).
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const SITE_ID: &str = "siteid";
pub const AUTH_KEY: &str = "siteAuthenticationKey";
pub const DATE_UTC: &str = "dateutc";
pub const SOFTWARE: &str = "softwaretype";

/// Ordered query parameters, ready for `reqwest::RequestBuilder::query`.
pub type QueryParams = Vec<(&'static str, String)>;

// ---

/// The four fields every request carries.
pub fn required_params(
    credentials: &Credentials,
    now: DateTime<Utc>,
    software_type: &str,
) -> QueryParams {
    // ---
    vec![
        (SITE_ID, credentials.site_id.clone()),
        (AUTH_KEY, credentials.auth_key.clone()),
        (DATE_UTC, now.format(DATE_FORMAT).to_string()),
        (SOFTWARE, software_type.to_string()),
    ]
}

/// Build the full parameter set: required fields, then one field per
/// converted parameter in [`Parameter::ALL`](crate::models::Parameter::ALL) order.
pub fn build_params(
    snapshot: &ConvertedSnapshot,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> QueryParams {
    // ---
    let mut params = required_params(credentials, now, SOFTWARE_TYPE);

    for (parameter, value) in &snapshot.values {
        params.push((parameter.wow_field(), format_value(*value)));
    }

    params
}

/// Render a value rounded to two decimals, without trailing zeros.
pub fn format_value(value: f64) -> String {
    // ---
    let rounded = (value * 100.0).round() / 100.0;
    // Avoid rendering "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    rounded.to_string()
}

/// Copy of the parameters without credentials, for status display.
pub fn debug_view(params: &[(&'static str, String)]) -> BTreeMap<String, String> {
    params
        .iter()
        .filter(|(key, _)| *key != SITE_ID && *key != AUTH_KEY)
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Parameters with the authentication key masked, for logging.
pub fn masked(params: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
    params
        .iter()
        .map(|(key, value)| {
            if *key == AUTH_KEY {
                (*key, "******".to_string())
            } else {
                (*key, value.clone())
            }
        })
        .collect()
}
