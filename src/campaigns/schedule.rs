//! Fire time computation for one contact and one campaign event.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{MailroomError, Result};
use crate::models::{CampaignEvent, Contact, OffsetUnit};

/// When `event` should fire for `contact`, or `None` if it shouldn't.
///
/// Minute and hour offsets are added to the instant. Day and week offsets are
/// calendar arithmetic in the org timezone, so a fire keeps its wall-clock time
/// across DST changes, and `delivery_hour` (if set) moves it to that hour.
/// Returns `None` when the contact has no value for the event's field or the
/// computed time has already passed.
pub fn schedule_for_contact(
    event: &CampaignEvent,
    timezone: &str,
    now: DateTime<Utc>,
    contact: &Contact,
) -> Result<Option<DateTime<Utc>>> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| MailroomError::Scheduling(format!("unknown timezone '{timezone}'")))?;

    let Some(start) = contact.datetime_for(&event.relative_to) else {
        return Ok(None);
    };

    let offset = i64::from(event.offset);
    let scheduled = match event.unit {
        OffsetUnit::Minutes => add_duration(start, Duration::try_minutes(offset), event)?,
        OffsetUnit::Hours => add_duration(start, Duration::try_hours(offset), event)?,
        OffsetUnit::Days => add_local_days(start, tz, offset, event)?,
        OffsetUnit::Weeks => add_local_days(start, tz, offset.saturating_mul(7), event)?,
    };

    if scheduled < now {
        return Ok(None);
    }
    Ok(Some(scheduled))
}

fn overflow(event: &CampaignEvent) -> MailroomError {
    MailroomError::Scheduling(format!(
        "offset {}{} of campaign event {} is out of range",
        event.offset, event.unit, event.id
    ))
}

fn add_duration(
    start: DateTime<Utc>,
    delta: Option<Duration>,
    event: &CampaignEvent,
) -> Result<DateTime<Utc>> {
    delta
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| overflow(event))
}

fn add_local_days(
    start: DateTime<Utc>,
    tz: Tz,
    days: i64,
    event: &CampaignEvent,
) -> Result<DateTime<Utc>> {
    let local = start.with_timezone(&tz).naive_local();
    let date = Duration::try_days(days)
        .and_then(|d| local.date().checked_add_signed(d))
        .ok_or_else(|| overflow(event))?;

    let time = match event.delivery_hour {
        Some(hour) => NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| {
            MailroomError::Scheduling(format!(
                "delivery hour {hour} of campaign event {} is invalid",
                event.id
            ))
        })?,
        None => local.time(),
    };

    resolve_local(tz, date.and_time(time)).ok_or_else(|| overflow(event))
}

/// Map a wall-clock time to an instant; times skipped by a DST jump move forward an hour
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use uuid::Uuid;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn event(offset: i32, unit: OffsetUnit, delivery_hour: Option<u32>) -> CampaignEvent {
        CampaignEvent {
            id: 1,
            uuid: Uuid::new_v4(),
            campaign_id: 1,
            group_id: 1,
            relative_to: "joined".to_string(),
            offset,
            unit,
            delivery_hour,
        }
    }

    fn contact_with_joined(joined: Option<DateTime<Utc>>) -> Contact {
        let mut contact = Contact::new(1, 1, utc(2026, 1, 1, 0, 0));
        if let Some(joined) = joined {
            contact
                .fields
                .insert("joined".to_string(), FieldValue::datetime(joined));
        }
        contact
    }

    #[test]
    fn test_day_offset_from_field() {
        let joined = utc(2026, 6, 10, 14, 30);
        let contact = contact_with_joined(Some(joined));
        let scheduled =
            schedule_for_contact(&event(2, OffsetUnit::Days, None), "UTC", utc(2026, 6, 1, 0, 0), &contact)
                .unwrap();
        assert_eq!(scheduled, Some(utc(2026, 6, 12, 14, 30)));
    }

    #[test]
    fn test_minute_hour_and_week_offsets() {
        let joined = utc(2026, 6, 10, 14, 30);
        let contact = contact_with_joined(Some(joined));
        let now = utc(2026, 6, 1, 0, 0);

        let minutes = schedule_for_contact(&event(-15, OffsetUnit::Minutes, None), "UTC", now, &contact);
        assert_eq!(minutes.unwrap(), Some(utc(2026, 6, 10, 14, 15)));

        let hours = schedule_for_contact(&event(3, OffsetUnit::Hours, None), "UTC", now, &contact);
        assert_eq!(hours.unwrap(), Some(utc(2026, 6, 10, 17, 30)));

        let weeks = schedule_for_contact(&event(1, OffsetUnit::Weeks, None), "UTC", now, &contact);
        assert_eq!(weeks.unwrap(), Some(utc(2026, 6, 17, 14, 30)));
    }

    #[test]
    fn test_delivery_hour_in_org_timezone() {
        let joined = utc(2026, 1, 10, 14, 30);
        let contact = contact_with_joined(Some(joined));
        let scheduled = schedule_for_contact(
            &event(1, OffsetUnit::Days, Some(9)),
            "America/New_York",
            utc(2026, 1, 1, 0, 0),
            &contact,
        )
        .unwrap();
        // 09:00 EST is 14:00 UTC
        assert_eq!(scheduled, Some(utc(2026, 1, 11, 14, 0)));
    }

    #[test]
    fn test_missing_value_or_past_schedule_is_none() {
        let now = utc(2026, 6, 1, 0, 0);
        let empty = contact_with_joined(None);
        assert_eq!(
            schedule_for_contact(&event(2, OffsetUnit::Days, None), "UTC", now, &empty).unwrap(),
            None
        );

        let past = contact_with_joined(Some(utc(2026, 5, 1, 0, 0)));
        assert_eq!(
            schedule_for_contact(&event(2, OffsetUnit::Days, None), "UTC", now, &past).unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_timezone_is_a_scheduling_error() {
        let contact = contact_with_joined(Some(utc(2026, 6, 10, 0, 0)));
        let err = schedule_for_contact(
            &event(1, OffsetUnit::Days, None),
            "Mars/Olympus_Mons",
            utc(2026, 6, 1, 0, 0),
            &contact,
        )
        .unwrap_err();
        assert!(matches!(err, MailroomError::Scheduling(_)));
    }
}
