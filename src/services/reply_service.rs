use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use regex::{Captures, Regex};
use serde::Serialize;
use sqlx::types::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::database::Store;
use crate::dto::inbound_dto::InboundEmail;
use crate::error::{Error, Result};
use crate::models::availability::AvailabilityReply;
use crate::models::interview::ScheduleSlot;
use crate::services::lifecycle_service::LifecycleService;
use crate::utils::time::Clock;

const MAX_SLOTS: usize = 3;
const DEFAULT_SLOT_MINUTES: i64 = 60;
const MIN_SLOT_MINUTES: i64 = 30;
const MAX_SLOT_MINUTES: i64 = 240;
const LOOKBACK_DAYS: i64 = 1;
const HORIZON_DAYS: i64 = 90;

const SLOT_PATTERN: &str = r"(?ix)
    \b(?:
        (?P<year>\d{4})-(?P<month>\d{1,2})-(?P<day>\d{1,2})
      |
        (?P<month_name>jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?
        \s+(?P<named_day>\d{1,2})(?:st|nd|rd|th)?
        (?:,?\s+(?P<named_year>\d{4}))?
    )
    (?:T|,?\s*(?:at\s+)?)
    (?P<hour>\d{1,2})(?::(?P<minute>\d{2}))?(?::\d{2})?\s*(?P<meridiem>am|pm)?
    (?:
        \s*(?:-|to|until)\s*
        (?P<end_hour>\d{1,2})(?::(?P<end_minute>\d{2}))?\s*(?P<end_meridiem>am|pm)?
    )?";

/// Rule-based extraction of proposed interview times from a free-text reply.
///
/// Times are read as UTC. A slot without an end runs for an hour; slots shorter
/// than 30 minutes or longer than 4 hours are dropped, as are starts outside
/// `[now - 1 day, now + 90 days]`.
#[derive(Debug, Clone)]
pub struct SlotExtractor {
    slot: Regex,
    tags: Regex,
    sign_off: Regex,
    application_id: Regex,
}

impl SlotExtractor {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Internal(format!("Regex error: {}", e)))
        };
        Ok(Self {
            slot: compile(SLOT_PATTERN)?,
            tags: compile(r"<[^>]+>")?,
            sign_off: compile(r"(?i)^\s*(?:best regards|kind regards|regards|sincerely|thanks|thank you|cheers)\b[^\d]{0,40}$|^On .+ wrote:\s*$")?,
            application_id: compile(r"AppID:\s*([0-9a-fA-F-]{36})")?,
        })
    }

    /// The application a reply belongs to, read from the `[AppID:<uuid>]` subject tag.
    pub fn application_id(&self, subject: &str) -> Option<Uuid> {
        self.application_id
            .captures(subject)
            .and_then(|caps| Uuid::parse_str(&caps[1]).ok())
    }

    /// Strips markup and quoted history, and cuts at the first sign-off line.
    pub fn clean(&self, text: &str) -> String {
        let text = self.tags.replace_all(text, " ");
        let mut kept = Vec::new();
        for line in text.lines() {
            if self.sign_off.is_match(line) {
                break;
            }
            let line = line.trim();
            if line.is_empty() || line.starts_with('>') {
                continue;
            }
            kept.push(line);
        }
        kept.join("\n")
    }

    /// At most three valid slots, in the order they appear.
    pub fn extract(&self, text: &str, now: DateTime<Utc>) -> Vec<ScheduleSlot> {
        let earliest = now - Duration::days(LOOKBACK_DAYS);
        let latest = now + Duration::days(HORIZON_DAYS);
        text.lines()
            .flat_map(|line| self.slot.captures_iter(line))
            .filter_map(|caps| slot_from(&caps, now))
            .filter(|slot| slot.start >= earliest && slot.start <= latest)
            .filter(|slot| {
                let minutes = (slot.end - slot.start).num_minutes();
                (MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&minutes)
            })
            .take(MAX_SLOTS)
            .collect()
    }
}

fn number(caps: &Captures, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn month_number(name: &str) -> Option<u32> {
    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = name.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// 24-hour clock hour, applying an am/pm marker when present.
fn clock_hour(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    match meridiem.map(str::to_ascii_lowercase).as_deref() {
        None if hour < 24 => Some(hour),
        Some("am") if (1..=12).contains(&hour) => Some(hour % 12),
        Some("pm") if (1..=12).contains(&hour) => Some(hour % 12 + 12),
        _ => None,
    }
}

fn slot_from(caps: &Captures, now: DateTime<Utc>) -> Option<ScheduleSlot> {
    let meridiem = caps.name("meridiem").map(|m| m.as_str());
    let minute = number(caps, "minute");
    // A bare number after a date is a count, not a time.
    if minute.is_none() && meridiem.is_none() {
        return None;
    }

    let date = match caps.name("month_name") {
        Some(name) => {
            let month = month_number(name.as_str())?;
            let day = number(caps, "named_day")?;
            match number(caps, "named_year") {
                Some(year) => NaiveDate::from_ymd_opt(year as i32, month, day)?,
                None => {
                    // No year: the next occurrence that is not already past.
                    let this_year = NaiveDate::from_ymd_opt(now.year(), month, day)?;
                    if this_year < (now - Duration::days(LOOKBACK_DAYS)).date_naive() {
                        NaiveDate::from_ymd_opt(now.year() + 1, month, day)?
                    } else {
                        this_year
                    }
                }
            }
        }
        None => NaiveDate::from_ymd_opt(
            number(caps, "year")? as i32,
            number(caps, "month")?,
            number(caps, "day")?,
        )?,
    };

    let hour = clock_hour(number(caps, "hour")?, meridiem)?;
    let start = Utc.from_utc_datetime(&date.and_hms_opt(hour, minute.unwrap_or(0), 0)?);

    let end = match number(caps, "end_hour") {
        Some(end_hour) => {
            let end_meridiem = caps.name("end_meridiem").map(|m| m.as_str()).or(meridiem);
            let end_hour = clock_hour(end_hour, end_meridiem)?;
            let end_minute = number(caps, "end_minute").unwrap_or(0);
            Utc.from_utc_datetime(&date.and_hms_opt(end_hour, end_minute, 0)?)
        }
        None => start + Duration::minutes(DEFAULT_SLOT_MINUTES),
    };
    (end > start).then_some(ScheduleSlot { start, end })
}

/// What the inbound webhook reports back to the mail provider.
#[derive(Debug, Clone, Serialize)]
pub struct InboundOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub slots_found: usize,
    pub auto_scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<AvailabilityReply>,
}

impl InboundOutcome {
    fn ignored(note: &str) -> Self {
        Self {
            ok: true,
            note: Some(note.to_string()),
            slots_found: 0,
            auto_scheduled: false,
            reply: None,
        }
    }
}

/// Turns a candidate's emailed availability into a booked interview.
///
/// The earliest proposed slot is confirmed against the application's latest
/// invitation token, so every rule of a link-based confirmation applies.
#[derive(Clone)]
pub struct ReplyService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    lifecycle: LifecycleService,
    extractor: SlotExtractor,
    secret: Option<String>,
}

impl ReplyService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        lifecycle: LifecycleService,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            store,
            clock,
            lifecycle,
            extractor: SlotExtractor::new()?,
            secret: config.inbound_secret.clone(),
        })
    }

    /// Rejects the webhook call unless it presents the configured shared secret.
    pub fn authorize(&self, presented: Option<&str>) -> Result<()> {
        match (&self.secret, presented) {
            (Some(expected), Some(given)) if expected == given => Ok(()),
            (None, _) => Err(Error::Forbidden(
                "inbound email is not configured".to_string(),
            )),
            _ => Err(Error::Forbidden("invalid inbound secret".to_string())),
        }
    }

    pub async fn list(&self, application_id: Uuid) -> Result<Vec<AvailabilityReply>> {
        self.store.list_availability(application_id).await
    }

    pub async fn handle_inbound(&self, email: InboundEmail) -> Result<InboundOutcome> {
        let subject = email.subject.unwrap_or_default();
        let Some(application_id) = self.extractor.application_id(&subject) else {
            tracing::info!(%subject, "inbound email without application tag ignored");
            return Ok(InboundOutcome::ignored("no application id found"));
        };
        if self.store.get_application(application_id).await?.is_none() {
            tracing::info!(%application_id, "inbound email for unknown application ignored");
            return Ok(InboundOutcome::ignored("application not found"));
        }

        let raw_text = email
            .text
            .filter(|t| !t.trim().is_empty())
            .or(email.html)
            .unwrap_or_default();
        let now = self.clock.now();
        let cleaned = self.extractor.clean(&raw_text);
        let slots = self.extractor.extract(&cleaned, now);
        let chosen = slots.iter().min_by_key(|s| s.start).copied();

        let (outcome, interview_id) = match chosen {
            None => ("no_slots".to_string(), None),
            Some(slot) => self.schedule(application_id, slot).await?,
        };

        let reply = self
            .store
            .record_availability(AvailabilityReply {
                id: Uuid::new_v4(),
                application_id,
                raw_text,
                parsed_slots: Json(slots.clone()),
                chosen_slot: chosen.map(Json),
                interview_id,
                outcome,
                received_at: now,
            })
            .await?;
        tracing::info!(
            %application_id,
            slots_found = slots.len(),
            outcome = %reply.outcome,
            "availability reply processed"
        );
        Ok(InboundOutcome {
            ok: true,
            note: None,
            slots_found: slots.len(),
            auto_scheduled: interview_id.is_some(),
            reply: Some(reply),
        })
    }

    /// Confirms `slot` with the latest invitation token. Lifecycle refusals are
    /// recorded as the outcome rather than failing the webhook.
    async fn schedule(
        &self,
        application_id: Uuid,
        slot: ScheduleSlot,
    ) -> Result<(String, Option<Uuid>)> {
        let Some(link) = self.store.latest_link(application_id).await? else {
            return Ok(("no_invitation".to_string(), None));
        };
        match self.lifecycle.confirm(&link.token, slot).await {
            Ok(confirmation) => Ok(("scheduled".to_string(), Some(confirmation.interview.id))),
            Err(err) if err.is_transient() || matches!(err, Error::Database(_)) => Err(err),
            Err(err) => {
                tracing::warn!(%application_id, error = %err, "availability reply could not be scheduled");
                Ok((err.code().to_string(), None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap()
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn reads_iso_dates_with_and_without_ranges() {
        let extractor = SlotExtractor::new().unwrap();
        let slots = extractor.extract(
            "I could do 2026-10-22 14:00-15:30\nor 2026-10-23T10:00 if that's easier",
            now(),
        );
        assert_eq!(
            slots,
            vec![
                ScheduleSlot {
                    start: at(22, 14, 0),
                    end: at(22, 15, 30),
                },
                ScheduleSlot {
                    start: at(23, 10, 0),
                    end: at(23, 11, 0),
                },
            ]
        );
    }

    #[test]
    fn reads_month_names_and_meridiem() {
        let extractor = SlotExtractor::new().unwrap();
        let slots = extractor.extract("How about Oct 21 at 2pm to 3pm? Or October 24th, 11am.", now());
        assert_eq!(slots[0].start, at(21, 14, 0));
        assert_eq!(slots[0].end, at(21, 15, 0));
        assert_eq!(slots[1].start, at(24, 11, 0));
    }

    #[test]
    fn drops_out_of_range_and_oversized_slots() {
        let extractor = SlotExtractor::new().unwrap();
        let text = "2026-10-01 10:00\n2027-06-01 10:00\n2026-10-22 09:00 to 17:00\n2026-10-22 3 people";
        assert!(extractor.extract(text, now()).is_empty());
    }

    #[test]
    fn keeps_at_most_three_slots() {
        let extractor = SlotExtractor::new().unwrap();
        let text = "2026-10-20 10:00\n2026-10-21 10:00\n2026-10-22 10:00\n2026-10-23 10:00";
        assert_eq!(extractor.extract(text, now()).len(), MAX_SLOTS);
    }

    #[test]
    fn cleaning_drops_quotes_markup_and_signature() {
        let extractor = SlotExtractor::new().unwrap();
        let cleaned = extractor.clean(
            "<p>Hi,</p>\n<p>2026-10-22 10:00 works</p>\n> 2026-10-20 10:00 quoted\nThanks,\nAda\n2026-10-21 10:00",
        );
        assert_eq!(cleaned, "Hi,\n2026-10-22 10:00 works");
    }

    #[test]
    fn application_tag_is_read_from_subject() {
        let extractor = SlotExtractor::new().unwrap();
        let id = Uuid::new_v4();
        let subject = format!("Re: You're shortlisted [AppID:{}]", id);
        assert_eq!(extractor.application_id(&subject), Some(id));
        assert_eq!(extractor.application_id("Re: hello"), None);
    }
}
