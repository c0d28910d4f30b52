use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::debug;

use crate::config::Webhook;
use crate::db::model::{OfferForNotify, PayslipForNotify, TimesheetForNotify};

/// Delivery seam for structured engagement events. The engine enqueues events
/// transactionally and the outbox worker pushes them through this trait;
/// failures are retried with backoff and never unwind core mutations.
#[async_trait]
pub trait NotifyService: Send + Sync {
    async fn deliver(&self, event: &Value) -> Result<()>;
}

#[derive(Clone)]
pub struct WebhookClient {
    http: Client,
    endpoint: Url,
    token: String,
}

impl fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl WebhookClient {
    pub fn from_config(cfg: &Webhook) -> Result<Self> {
        let endpoint = Url::parse(&cfg.url).context("invalid webhook URL")?;
        Ok(Self::with_endpoint(endpoint, cfg.token.clone()))
    }

    pub fn with_endpoint(endpoint: Url, token: String) -> Self {
        let http = Client::builder()
            .user_agent("ozziework-core/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            endpoint,
            token,
        }
    }

    pub fn build_request(&self, body: &Value) -> Result<reqwest::Request> {
        self.http
            .post(self.endpoint.clone())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .build()
            .context("failed to build webhook request")
    }
}

#[async_trait]
impl NotifyService for WebhookClient {
    async fn deliver(&self, event: &Value) -> Result<()> {
        let request = self.build_request(event)?;
        debug!(url=%request.url(), payload=%event, "sending webhook event");
        let res = self
            .http
            .execute(request)
            .await
            .context("failed to reach webhook")?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("received 429 from webhook: {}", body));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("webhook error {}: {}", status, body));
        }
        Ok(())
    }
}

pub fn build_offer_event(offer: &OfferForNotify, event: &str) -> Value {
    json!({
        "kind": "job_offer",
        "event": event,
        "offer_id": offer.offer_id,
        "application_id": offer.application_id,
        "job_id": offer.job_id,
        "status": offer.status.as_str(),
        "rate_type": offer.rate_type.as_str(),
        "rate_amount": offer.rate_amount.to_string(),
        "rate_currency": offer.rate_currency,
        "start_date": offer.start_date.to_string(),
        "end_date": offer.end_date.map(|d| d.to_string()),
        "accommodation_details": offer.accommodation_details,
    })
}

pub fn build_timesheet_event(timesheet: &TimesheetForNotify, event: &str) -> Value {
    json!({
        "kind": "timesheet",
        "event": event,
        "timesheet_id": timesheet.timesheet_id,
        "offer_id": timesheet.offer_id,
        "application_id": timesheet.application_id,
        "status": timesheet.status.as_str(),
        "entry_count": timesheet.entry_count,
        "total_hours": timesheet.total_hours.to_string(),
    })
}

pub fn build_payslip_event(payslip: &PayslipForNotify, event: &str) -> Value {
    json!({
        "kind": "payslip",
        "event": event,
        "payslip_id": payslip.payslip_id,
        "offer_id": payslip.offer_id,
        "application_id": payslip.application_id,
        "status": payslip.status.as_str(),
        "instructions_status": payslip.instructions_status.as_str(),
        "hour_count": payslip.hour_count.to_string(),
        "rate_amount": payslip.rate_amount.to_string(),
        "rate_currency": payslip.rate_currency,
        "gross_amount": payslip.gross_amount.to_string(),
        "commission_amount": payslip.commission_amount.to_string(),
        "tax_withheld": payslip.tax_withheld.to_string(),
        "net_payment": payslip.net_payment.to_string(),
        "super_amount": payslip.super_amount.to_string(),
        "pay_period_start": payslip.pay_period_start.to_string(),
        "pay_period_end": payslip.pay_period_end.to_string(),
    })
}
