//! Participant pass rendering
//!
//! A pass is a self-contained printable HTML page. Rendering is pure; the
//! payment workflow stores the result on the paper.

use sha2::{Digest, Sha256};

use crate::domain::{ConferenceSettings, Paper, User};
use crate::notify::escape_html;

/// Hex digits kept from the verification digest
pub const VERIFICATION_CODE_LEN: usize = 12;

/// Short code printed on the pass so staff can check it against the
/// registration record
pub fn verification_code(paper: &Paper, email: &str) -> String {
    let reference = paper.payment_reference.as_deref().unwrap_or_default();
    let digest = Sha256::digest(format!("{}:{}:{}", paper.registration_id(), email, reference).as_bytes());

    let mut code = hex::encode(digest);
    code.truncate(VERIFICATION_CODE_LEN);
    code
}

/// QR image source for a registration id
pub fn qr_image_url(qr_service_url: &str, registration_id: &str) -> String {
    format!("{}{}", qr_service_url, registration_id)
}

/// Render the pass for `paper`, owned by `owner`
pub fn render_pass(paper: &Paper, owner: &User, settings: &ConferenceSettings, qr_service_url: &str) -> String {
    let registration_id = paper.registration_id();

    let mut event_line = escape_html(settings.conference_name());
    for extra in [&settings.conference_date, &settings.conference_venue].into_iter().flatten() {
        event_line.push_str(" &middot; ");
        event_line.push_str(&escape_html(extra));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Participant Pass {registration_id}</title>
<style>
  body {{ font-family: Arial, sans-serif; }}
  .pass-container {{ width: 400px; border: 3px solid #4CAF50; padding: 30px; margin: 50px auto; text-align: center; }}
  .pass-header {{ background-color: #4CAF50; color: white; padding: 20px; margin: -30px -30px 20px -30px; }}
  .participant-name {{ font-size: 24px; font-weight: bold; margin: 20px 0; }}
  .info {{ text-align: left; margin: 20px 0; }}
  .qr-code {{ margin: 20px 0; }}
  .verification {{ font-family: monospace; letter-spacing: 2px; }}
</style>
</head>
<body>
<div class="pass-container">
  <div class="pass-header">
    <h1>PARTICIPANT PASS</h1>
    <p>{event_line}</p>
  </div>
  <div class="participant-name">{name}</div>
  <div class="info">
    <p><strong>Organization:</strong> {organization}</p>
    <p><strong>Country:</strong> {country}</p>
    <p><strong>Email:</strong> {email}</p>
    <p><strong>Phone:</strong> {phone}</p>
    <p><strong>Paper:</strong> {title}</p>
    <p><strong>Registration ID:</strong> {registration_id}</p>
  </div>
  <div class="qr-code">
    <img src="{qr}" alt="QR Code">
  </div>
  <p class="verification">Verification: {code}</p>
  <p style="font-size: 12px; color: #666;">Please present this pass at the conference venue</p>
</div>
</body>
</html>
"#,
        registration_id = escape_html(&registration_id),
        event_line = event_line,
        name = escape_html(&owner.display_name),
        organization = escape_html(&owner.profile.organization),
        country = escape_html(&owner.profile.country),
        email = escape_html(&owner.email),
        phone = escape_html(&owner.profile.phone),
        title = escape_html(&paper.title),
        qr = escape_html(&qr_image_url(qr_service_url, &registration_id)),
        code = verification_code(paper, &owner.email),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PaperStatus, Profile, Role};
    use crate::workflow::testing::paper;
    use chrono::Utc;

    const QR: &str = "https://api.qrserver.com/v1/create-qr-code/?size=150x150&data=";

    fn owner() -> User {
        User {
            id: 1,
            email: "ada@example.com".to_string(),
            display_name: "Ada <Lovelace>".to_string(),
            role: Role::Participant,
            password_hash: String::new(),
            profile: Profile {
                phone: "+60123456789".to_string(),
                organization: "Analytical & Co".to_string(),
                address: String::new(),
                postcode: String::new(),
                country: "Malaysia".to_string(),
            },
            created_at: Utc::now(),
        }
    }

    fn paid_paper() -> Paper {
        let mut p = paper(42, 1, PaperStatus::Paid);
        p.title = "<script>alert(1)</script>".to_string();
        p.payment_reference = Some("PAPER-42-1700000000".to_string());
        p
    }

    #[test]
    fn test_pass_contents_are_escaped() {
        let html = render_pass(&paid_paper(), &owner(), &ConferenceSettings::default(), QR);

        assert!(html.contains("PAPER-42"));
        assert!(html.contains("Ada &lt;Lovelace&gt;"));
        assert!(html.contains("Analytical &amp; Co"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("size=150x150&amp;data=PAPER-42"));
        assert!(html.contains("International Conference 2025"));
    }

    #[test]
    fn test_verification_code() {
        let p = paid_paper();
        let code = verification_code(&p, "ada@example.com");

        assert_eq!(code.len(), VERIFICATION_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(code, verification_code(&p, "ada@example.com"));
        assert_ne!(code, verification_code(&p, "eve@example.com"));

        let html = render_pass(&p, &owner(), &ConferenceSettings::default(), QR);
        assert!(html.contains(&code));
    }

    #[test]
    fn test_event_details_in_header() {
        let settings = ConferenceSettings {
            conference_name: Some("RustConf Asia".to_string()),
            conference_venue: Some("KLCC".to_string()),
            ..Default::default()
        };

        let html = render_pass(&paid_paper(), &owner(), &settings, QR);
        assert!(html.contains("RustConf Asia &middot; KLCC"));
    }
}
