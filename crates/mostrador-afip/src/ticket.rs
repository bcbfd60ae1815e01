//! # Login Ticket Request
//!
//! The `loginTicketRequest` document signed and sent to WSAA.
//!
//! ```text
//! <loginTicketRequest version="1.0">
//!   <header>
//!     <uniqueId>3721398211</uniqueId>
//!     <generationTime>2024-05-01T09:50:00-03:00</generationTime>
//!     <expirationTime>2024-05-02T09:50:00-03:00</expirationTime>
//!   </header>
//!   <service>wsfe</service>
//! </loginTicketRequest>
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, Utc};

use crate::soap::escape_xml;

/// Argentina has no DST; WSAA expects local times at UTC-03:00.
const ARGENTINA_WEST_SECS: i32 = 3 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicketRequest {
    pub unique_id: u32,
    pub generation_time: DateTime<FixedOffset>,
    pub expiration_time: DateTime<FixedOffset>,
    pub service: String,
}

fn argentina() -> FixedOffset {
    FixedOffset::west_opt(ARGENTINA_WEST_SECS).unwrap_or_else(|| Utc.fix())
}

/// Calendar date in Argentina at `now`; voucher dates (`CbteFch`) use it.
pub fn argentina_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&argentina()).date_naive()
}

impl LoginTicketRequest {
    /// Request valid from `now - skew` for `validity`.
    pub fn new(service: &str, now: DateTime<Utc>, skew: Duration, validity: Duration) -> Self {
        Self::with_unique_id(rand::random::<u32>(), service, now, skew, validity)
    }

    pub fn with_unique_id(
        unique_id: u32,
        service: &str,
        now: DateTime<Utc>,
        skew: Duration,
        validity: Duration,
    ) -> Self {
        let generation = (now - skew).with_timezone(&argentina());
        LoginTicketRequest {
            unique_id,
            generation_time: generation,
            expiration_time: generation + validity,
            service: service.to_string(),
        }
    }

    pub fn to_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<loginTicketRequest version="1.0">"#,
                "<header>",
                "<uniqueId>{}</uniqueId>",
                "<generationTime>{}</generationTime>",
                "<expirationTime>{}</expirationTime>",
                "</header>",
                "<service>{}</service>",
                "</loginTicketRequest>"
            ),
            self.unique_id,
            self.generation_time.format("%Y-%m-%dT%H:%M:%S%:z"),
            self.expiration_time.format("%Y-%m-%dT%H:%M:%S%:z"),
            escape_xml(&self.service),
        )
    }
}
