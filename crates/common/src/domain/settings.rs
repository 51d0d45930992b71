//! Conference settings persisted as key/value pairs
//!
//! Administrators edit these at runtime; every request reads the current
//! values so fee or credential changes apply immediately.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::money::{format_minor_units, parse_minor_units};

pub const KEY_CHIP_BRAND_ID: &str = "chip_brand_id";
pub const KEY_CHIP_API_KEY: &str = "chip_api_key";
pub const KEY_WEBHOOK_SECRET: &str = "webhook_secret";
pub const KEY_PAYMENT_AMOUNT: &str = "payment_amount";
pub const KEY_CURRENCY: &str = "currency";
pub const KEY_CONFERENCE_NAME: &str = "conference_name";
pub const KEY_CONFERENCE_DATE: &str = "conference_date";
pub const KEY_CONFERENCE_VENUE: &str = "conference_venue";
pub const KEY_NOTIFICATION_EMAIL: &str = "notification_email";

/// Placeholder shown in place of stored secrets
pub const SECRET_MASK: &str = "********";

/// Registration fee used when none is configured (300.00)
pub const DEFAULT_FEE_MINOR: i64 = 30_000;
pub const DEFAULT_CURRENCY: &str = "MYR";
pub const DEFAULT_CONFERENCE_NAME: &str = "International Conference 2025";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceSettings {
    pub chip_brand_id: Option<String>,
    pub chip_api_key: Option<String>,
    pub webhook_secret: Option<String>,
    /// Registration fee in minor units
    pub fee_minor: Option<i64>,
    pub currency: Option<String>,
    pub conference_name: Option<String>,
    pub conference_date: Option<String>,
    pub conference_venue: Option<String>,
    pub notification_email: Option<String>,
}

/// Gateway account identifier and secret key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub brand_id: String,
    pub api_key: String,
}

fn non_empty(map: &HashMap<String, String>, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ConferenceSettings {
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        Self {
            chip_brand_id: non_empty(map, KEY_CHIP_BRAND_ID),
            chip_api_key: non_empty(map, KEY_CHIP_API_KEY),
            webhook_secret: non_empty(map, KEY_WEBHOOK_SECRET),
            fee_minor: non_empty(map, KEY_PAYMENT_AMOUNT).and_then(|v| parse_minor_units(&v)),
            currency: non_empty(map, KEY_CURRENCY),
            conference_name: non_empty(map, KEY_CONFERENCE_NAME),
            conference_date: non_empty(map, KEY_CONFERENCE_DATE),
            conference_venue: non_empty(map, KEY_CONFERENCE_VENUE),
            notification_email: non_empty(map, KEY_NOTIFICATION_EMAIL),
        }
    }

    /// Flatten into key/value pairs; unset values are written as empty strings
    pub fn to_map(&self) -> HashMap<String, String> {
        let entries = [
            (KEY_CHIP_BRAND_ID, self.chip_brand_id.clone()),
            (KEY_CHIP_API_KEY, self.chip_api_key.clone()),
            (KEY_WEBHOOK_SECRET, self.webhook_secret.clone()),
            (KEY_PAYMENT_AMOUNT, self.fee_minor.map(format_minor_units)),
            (KEY_CURRENCY, self.currency.clone()),
            (KEY_CONFERENCE_NAME, self.conference_name.clone()),
            (KEY_CONFERENCE_DATE, self.conference_date.clone()),
            (KEY_CONFERENCE_VENUE, self.conference_venue.clone()),
            (KEY_NOTIFICATION_EMAIL, self.notification_email.clone()),
        ];

        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.unwrap_or_default()))
            .collect()
    }

    /// Both credentials must be present for the gateway to be usable
    pub fn gateway_credentials(&self) -> Option<GatewayCredentials> {
        match (&self.chip_brand_id, &self.chip_api_key) {
            (Some(brand_id), Some(api_key)) => Some(GatewayCredentials {
                brand_id: brand_id.clone(),
                api_key: api_key.clone(),
            }),
            _ => None,
        }
    }

    pub fn fee(&self) -> i64 {
        self.fee_minor.unwrap_or(DEFAULT_FEE_MINOR)
    }

    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY)
    }

    pub fn conference_name(&self) -> &str {
        self.conference_name.as_deref().unwrap_or(DEFAULT_CONFERENCE_NAME)
    }

    /// Copy with secrets replaced by a fixed mask, for display
    pub fn masked(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| SECRET_MASK.to_string());
        Self {
            chip_api_key: mask(&self.chip_api_key),
            webhook_secret: mask(&self.webhook_secret),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_gateway_credentials_require_both_values() {
        let settings = ConferenceSettings::from_map(&map(&[(KEY_CHIP_BRAND_ID, "brand")]));
        assert!(settings.gateway_credentials().is_none());

        let settings = ConferenceSettings::from_map(&map(&[
            (KEY_CHIP_BRAND_ID, "brand"),
            (KEY_CHIP_API_KEY, "   "),
        ]));
        assert!(settings.gateway_credentials().is_none());

        let settings = ConferenceSettings::from_map(&map(&[
            (KEY_CHIP_BRAND_ID, "brand"),
            (KEY_CHIP_API_KEY, "secret"),
        ]));
        let creds = settings.gateway_credentials().unwrap();
        assert_eq!(creds.brand_id, "brand");
        assert_eq!(creds.api_key, "secret");
    }

    #[test]
    fn test_fee_defaults_and_parses() {
        let settings = ConferenceSettings::default();
        assert_eq!(settings.fee(), 30_000);
        assert_eq!(settings.currency(), "MYR");

        let settings = ConferenceSettings::from_map(&map(&[(KEY_PAYMENT_AMOUNT, "450.50")]));
        assert_eq!(settings.fee(), 45_050);
    }

    #[test]
    fn test_map_round_trip() {
        let settings = ConferenceSettings {
            chip_brand_id: Some("brand".into()),
            fee_minor: Some(30_000),
            conference_name: Some("RustConf".into()),
            ..Default::default()
        };

        let back = ConferenceSettings::from_map(&settings.to_map());
        assert_eq!(back, settings);
    }

    #[test]
    fn test_masked_hides_secrets() {
        let settings = ConferenceSettings {
            chip_api_key: Some("secret".into()),
            webhook_secret: Some("hook".into()),
            chip_brand_id: Some("brand".into()),
            ..Default::default()
        };

        let masked = settings.masked();
        assert_eq!(masked.chip_api_key.as_deref(), Some("********"));
        assert_eq!(masked.webhook_secret.as_deref(), Some("********"));
        assert_eq!(masked.chip_brand_id.as_deref(), Some("brand"));
    }
}
