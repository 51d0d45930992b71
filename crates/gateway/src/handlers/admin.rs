//! Administration handlers: dashboard statistics and conference settings

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail};

use crate::AppState;
use paperdesk_common::{
    auth::AuthContext,
    domain::{format_minor_units, parse_minor_units, ConferenceSettings, SECRET_MASK},
    errors::{AppError, Result},
    store::SettingsStore,
    workflow::{dashboard_stats, DashboardStats},
};

/// Settings as shown to administrators
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub chip_brand_id: Option<String>,
    pub chip_api_key: Option<String>,
    pub webhook_secret: Option<String>,
    /// Decimal string, e.g. `300.00`
    pub payment_amount: String,
    pub currency: String,
    pub conference_name: String,
    pub conference_date: Option<String>,
    pub conference_venue: Option<String>,
    pub notification_email: Option<String>,
    pub gateway_configured: bool,
}

impl From<&ConferenceSettings> for SettingsResponse {
    fn from(settings: &ConferenceSettings) -> Self {
        let masked = settings.masked();
        Self {
            gateway_configured: settings.gateway_credentials().is_some(),
            payment_amount: format_minor_units(settings.fee()),
            currency: settings.currency().to_string(),
            conference_name: settings.conference_name().to_string(),
            chip_brand_id: masked.chip_brand_id,
            chip_api_key: masked.chip_api_key,
            webhook_secret: masked.webhook_secret,
            conference_date: masked.conference_date,
            conference_venue: masked.conference_venue,
            notification_email: masked.notification_email,
        }
    }
}

/// Partial update. Absent fields are left alone, empty strings clear a
/// value, and the mask placeholder keeps a stored secret.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    pub chip_brand_id: Option<String>,
    pub chip_api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub payment_amount: Option<String>,
    #[validate(length(max = 3))]
    pub currency: Option<String>,
    pub conference_name: Option<String>,
    pub conference_date: Option<String>,
    pub conference_venue: Option<String>,
    pub notification_email: Option<String>,
}

fn apply(target: &mut Option<String>, update: Option<String>) {
    if let Some(value) = update {
        let value = value.trim();
        *target = if value.is_empty() { None } else { Some(value.to_string()) };
    }
}

fn apply_secret(target: &mut Option<String>, update: Option<String>) {
    match update {
        Some(value) if value == SECRET_MASK => {}
        other => apply(target, other),
    }
}

impl UpdateSettingsRequest {
    fn merge_into(self, settings: &mut ConferenceSettings) -> Result<()> {
        if let Some(raw) = self.payment_amount {
            settings.fee_minor = if raw.trim().is_empty() {
                None
            } else {
                let fee = parse_minor_units(&raw)
                    .filter(|&minor| minor > 0)
                    .ok_or_else(|| AppError::Validation {
                        message: format!("Payment amount must be a positive decimal: {}", raw),
                        field: Some("payment_amount".to_string()),
                    })?;
                Some(fee)
            };
        }

        if let Some(email) = self.notification_email.as_deref().map(str::trim) {
            if !email.is_empty() && !email.validate_email() {
                return Err(AppError::Validation {
                    message: format!("Invalid notification email: {}", email),
                    field: Some("notification_email".to_string()),
                });
            }
        }

        apply(&mut settings.chip_brand_id, self.chip_brand_id);
        apply_secret(&mut settings.chip_api_key, self.chip_api_key);
        apply_secret(&mut settings.webhook_secret, self.webhook_secret);
        apply(&mut settings.currency, self.currency.map(|c| c.to_uppercase()));
        apply(&mut settings.conference_name, self.conference_name);
        apply(&mut settings.conference_date, self.conference_date);
        apply(&mut settings.conference_venue, self.conference_venue);
        apply(&mut settings.notification_email, self.notification_email);
        Ok(())
    }
}

/// Dashboard statistics (managers)
pub async fn stats(State(state): State<AppState>, auth: AuthContext) -> Result<Json<DashboardStats>> {
    auth.require_manager()?;
    Ok(Json(dashboard_stats(&state.store).await?))
}

/// Current settings with secrets masked (administrators)
pub async fn get_settings(State(state): State<AppState>, auth: AuthContext) -> Result<Json<SettingsResponse>> {
    auth.require_admin()?;
    let settings = state.store.load_settings().await?;
    Ok(Json(SettingsResponse::from(&settings)))
}

/// Update settings (administrators)
pub async fn update_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>> {
    auth.require_admin()?;
    request.validate()?;

    let mut settings = state.store.load_settings().await?;
    request.merge_into(&mut settings)?;
    state.store.save_settings(&settings).await?;

    tracing::info!(
        user_id = auth.user_id,
        gateway_configured = settings.gateway_credentials().is_some(),
        "Conference settings updated"
    );

    Ok(Json(SettingsResponse::from(&settings)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> ConferenceSettings {
        ConferenceSettings {
            chip_brand_id: Some("brand".to_string()),
            chip_api_key: Some("sk_live".to_string()),
            webhook_secret: Some("whsec".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_mask_keeps_secret() {
        let mut settings = stored();
        UpdateSettingsRequest {
            chip_api_key: Some(SECRET_MASK.to_string()),
            webhook_secret: Some("rotated".to_string()),
            payment_amount: Some("450.5".to_string()),
            ..Default::default()
        }
        .merge_into(&mut settings)
        .unwrap();

        assert_eq!(settings.chip_api_key.as_deref(), Some("sk_live"));
        assert_eq!(settings.webhook_secret.as_deref(), Some("rotated"));
        assert_eq!(settings.fee_minor, Some(45_050));
    }

    #[test]
    fn test_empty_string_clears() {
        let mut settings = stored();
        UpdateSettingsRequest {
            chip_brand_id: Some(String::new()),
            ..Default::default()
        }
        .merge_into(&mut settings)
        .unwrap();

        assert!(settings.chip_brand_id.is_none());
        assert!(settings.gateway_credentials().is_none());
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let mut settings = stored();
        let err = UpdateSettingsRequest {
            payment_amount: Some("three hundred".to_string()),
            ..Default::default()
        }
        .merge_into(&mut settings)
        .unwrap_err();

        assert!(matches!(err, AppError::Validation { .. }));

        for zero in ["0", "0.00", "."] {
            let err = UpdateSettingsRequest {
                payment_amount: Some(zero.to_string()),
                ..Default::default()
            }
            .merge_into(&mut settings)
            .unwrap_err();

            assert!(matches!(
                err,
                AppError::Validation { field: Some(ref f), .. } if f == "payment_amount"
            ));
        }
        assert_eq!(settings.fee_minor, None);
    }

    #[test]
    fn test_notification_email_validated() {
        for bad in ["@", "a@", "desk.example.com"] {
            let mut settings = stored();
            let err = UpdateSettingsRequest {
                notification_email: Some(bad.to_string()),
                ..Default::default()
            }
            .merge_into(&mut settings)
            .unwrap_err();

            assert!(matches!(
                err,
                AppError::Validation { field: Some(ref f), .. } if f == "notification_email"
            ));
        }

        let mut settings = stored();
        UpdateSettingsRequest {
            notification_email: Some(" desk@example.com ".to_string()),
            ..Default::default()
        }
        .merge_into(&mut settings)
        .unwrap();
        assert_eq!(settings.notification_email.as_deref(), Some("desk@example.com"));

        UpdateSettingsRequest {
            notification_email: Some(String::new()),
            ..Default::default()
        }
        .merge_into(&mut settings)
        .unwrap();
        assert!(settings.notification_email.is_none());
    }

    #[test]
    fn test_response_masks_secrets() {
        let response = SettingsResponse::from(&stored());
        assert_eq!(response.chip_api_key.as_deref(), Some(SECRET_MASK));
        assert_eq!(response.payment_amount, "300.00");
        assert!(response.gateway_configured);
    }
}
