//! Transactional email templates
//!
//! Rendering is pure: each function takes the data it shows and returns a
//! subject plus an HTML body. Interpolated user text is always escaped.

use chrono::{DateTime, Utc};

use crate::domain::{format_minor_units, Paper, User};

/// A rendered email ready for the outbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body_html: String,
}

/// Values shared by every template
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub conference_name: &'a str,
    pub public_url: &'a str,
}

impl TemplateContext<'_> {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.public_url.trim_end_matches('/'), path)
    }
}

/// Escape text for HTML element and attribute content
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn format_amount(minor: i64, currency: &str) -> String {
    format!("{} {}", currency, format_minor_units(minor))
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn layout(ctx: &TemplateContext<'_>, accent: &str, heading: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
body {{ font-family: Arial, sans-serif; line-height: 1.6; }}
.container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
.header {{ background-color: {accent}; color: white; padding: 20px; text-align: center; }}
.content {{ padding: 20px; background-color: #f9f9f9; }}
.button {{ display: inline-block; padding: 10px 20px; background-color: {accent}; color: white; text-decoration: none; border-radius: 5px; }}
.footer {{ padding: 20px; text-align: center; font-size: 12px; color: #666; }}
</style>
</head>
<body>
<div class="container">
<div class="header"><h2>{heading}</h2></div>
<div class="content">
{content}
</div>
<div class="footer"><p>&copy; {name}</p></div>
</div>
</body>
</html>
"#,
        accent = accent,
        heading = escape_html(heading),
        content = content,
        name = escape_html(ctx.conference_name),
    )
}

pub fn submission_received(ctx: &TemplateContext<'_>, paper: &Paper) -> RenderedEmail {
    let content = format!(
        "<p>Dear Participant,</p>\
         <p>Your conference paper has been successfully submitted for review.</p>\
         <h3>Submission Details:</h3>\
         <ul>\
         <li><strong>Paper Title:</strong> {title}</li>\
         <li><strong>Submission Date:</strong> {date}</li>\
         <li><strong>Status:</strong> Under Review</li>\
         </ul>\
         <p>Our conference management team will review your paper and notify you of the outcome shortly.</p>\
         <p>You can track your submission status from your dashboard.</p>",
        title = escape_html(&paper.title),
        date = format_date(paper.submitted_at),
    );

    RenderedEmail {
        subject: "Conference Paper Submission Confirmation".to_string(),
        body_html: layout(ctx, "#4CAF50", "Paper Submission Received", &content),
    }
}

pub fn acceptance(ctx: &TemplateContext<'_>, paper: &Paper, fee_minor: i64, currency: &str) -> RenderedEmail {
    let payment_url = ctx.url(&format!("/participant-dashboard/?paper_id={}&action=payment", paper.id));

    let content = format!(
        "<p>Dear Participant,</p>\
         <p>We are pleased to inform you that your conference paper has been <strong>ACCEPTED</strong>!</p>\
         <h3>Paper Details:</h3>\
         <ul>\
         <li><strong>Paper Title:</strong> {title}</li>\
         <li><strong>Status:</strong> Accepted - Pending Payment</li>\
         </ul>\
         <h3>Payment Information:</h3>\
         <p>To complete your registration, please make a payment of:</p>\
         <p><strong>{amount}</strong></p>\
         <p><a href=\"{url}\" class=\"button\">Make Payment Now</a></p>\
         <p>After successful payment, you will receive your participant pass.</p>",
        title = escape_html(&paper.title),
        amount = escape_html(&format_amount(fee_minor, currency)),
        url = escape_html(&payment_url),
    );

    RenderedEmail {
        subject: "Conference Paper Accepted - Payment Required".to_string(),
        body_html: layout(ctx, "#4CAF50", "Congratulations! Your Paper Has Been Accepted", &content),
    }
}

pub fn rejection(ctx: &TemplateContext<'_>, paper: &Paper) -> RenderedEmail {
    let content = format!(
        "<p>Dear Participant,</p>\
         <p>Thank you for submitting your paper to our conference.</p>\
         <h3>Paper Details:</h3>\
         <ul>\
         <li><strong>Paper Title:</strong> {title}</li>\
         <li><strong>Status:</strong> Not Accepted</li>\
         </ul>\
         <p>After careful review by our conference committee, we regret to inform you that your paper has not been selected for this conference.</p>\
         <p>We appreciate your interest and encourage you to submit your work to future conferences.</p>",
        title = escape_html(&paper.title),
    );

    RenderedEmail {
        subject: "Conference Paper Review Result".to_string(),
        body_html: layout(ctx, "#f44336", "Conference Paper Review Result", &content),
    }
}

/// Uses the amount, currency and timestamp recorded on the paper
pub fn payment_confirmation(ctx: &TemplateContext<'_>, paper: &Paper) -> RenderedEmail {
    let amount = paper
        .payment_amount
        .map(|minor| format_amount(minor, paper.payment_currency.as_deref().unwrap_or("")))
        .unwrap_or_default();
    let paid_at = paper.paid_at.map(format_date).unwrap_or_default();

    let content = format!(
        "<p><strong>Your payment has been successfully processed!</strong></p>\
         <p>Dear Participant,</p>\
         <p>Thank you for completing your conference registration payment.</p>\
         <h3>Payment Details:</h3>\
         <ul>\
         <li><strong>Paper Title:</strong> {title}</li>\
         <li><strong>Amount Paid:</strong> {amount}</li>\
         <li><strong>Payment Date:</strong> {paid_at}</li>\
         <li><strong>Registration ID:</strong> {registration}</li>\
         <li><strong>Status:</strong> Completed</li>\
         </ul>\
         <p>Your participant pass is now available in your dashboard. Please keep it for the conference.</p>",
        title = escape_html(&paper.title),
        amount = escape_html(amount.trim()),
        paid_at = paid_at,
        registration = paper.registration_id(),
    );

    RenderedEmail {
        subject: "Payment Confirmation - Conference Registration Complete".to_string(),
        body_html: layout(ctx, "#4CAF50", "Payment Confirmed!", &content),
    }
}

pub fn new_submission_alert(ctx: &TemplateContext<'_>, paper: &Paper, author: &User) -> RenderedEmail {
    let review_url = ctx.url(&format!("/manager-dashboard/?paper_id={}", paper.id));

    let content = format!(
        "<p>A new conference paper has been submitted for review.</p>\
         <h3>Submission Details:</h3>\
         <ul>\
         <li><strong>Paper Title:</strong> {title}</li>\
         <li><strong>Submitted By:</strong> {name}</li>\
         <li><strong>Email:</strong> {email}</li>\
         <li><strong>Date:</strong> {date}</li>\
         </ul>\
         <p><a href=\"{url}\" class=\"button\">Review Submission</a></p>",
        title = escape_html(&paper.title),
        name = escape_html(&author.display_name),
        email = escape_html(&author.email),
        date = format_date(paper.submitted_at),
        url = escape_html(&review_url),
    );

    RenderedEmail {
        subject: "New Conference Paper Submission".to_string(),
        body_html: layout(ctx, "#2196F3", "New Paper Submission", &content),
    }
}
