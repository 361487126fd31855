//! Codecs for date, time, timestamp and interval values.
//!
//! Binary values use microseconds since the postgres epoch 2000-01-01.
//! Text values are only parsed in the ISO `DateStyle`, other styles pass
//! through as text. Values outside the client datetime range, including
//! the infinity sentinels, also pass through as text.
use time::{Date, PrimitiveDateTime, Time, UtcOffset};

use super::{exact, utf8, DecodeContext, DecodeError, Value};

/// Julian day of 2000-01-01.
const PG_EPOCH_JULIAN: i64 = 2_451_545;
const USECS_PER_DAY: i64 = 86_400_000_000;
const USECS_PER_HOUR: i64 = 3_600_000_000;
const USECS_PER_MINUTE: i64 = 60_000_000;
const USECS_PER_SEC: i64 = 1_000_000;

/// An `interval` value in its wire components.
///
/// The three fields do not reduce into each other, a month has no fixed
/// day count and days ignore daylight saving shifts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

pub(crate) fn date_text(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    if ctx.iso_dates {
        if let Some(date) = parse_date(buf) {
            return Ok(Value::Date(date));
        }
    }
    Ok(Value::Text(text.to_owned()))
}

pub(crate) fn date_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let days = i32::from_be_bytes(exact("date", buf)?);
    match days {
        i32::MAX => return Ok(Value::Text("infinity".to_owned())),
        i32::MIN => return Ok(Value::Text("-infinity".to_owned())),
        _ => {}
    }
    let julian = days as i64 + PG_EPOCH_JULIAN;
    if let Ok(julian) = i32::try_from(julian) {
        if let Ok(date) = Date::from_julian_day(julian) {
            return Ok(Value::Date(date));
        }
    }
    let (year, month, day) = date_parts(days as i64);
    Ok(Value::Text(format_date(year, month, day)))
}

pub(crate) fn time_text(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    if ctx.iso_dates {
        if let Some((time, rest)) = parse_hms(buf) {
            if rest.is_empty() {
                return Ok(Value::Time(time));
            }
        }
    }
    Ok(Value::Text(text.to_owned()))
}

pub(crate) fn time_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let usecs = i64::from_be_bytes(exact("time", buf)?);
    Ok(Value::Time(time_from_usecs(usecs).ok_or(DecodeError::invalid("time"))?))
}

pub(crate) fn timetz_text(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    if ctx.iso_dates {
        if let Some((time, rest)) = parse_hms(buf) {
            if let Some(offset) = parse_offset(rest) {
                return Ok(Value::TimeTz { time, offset });
            }
        }
    }
    Ok(Value::Text(text.to_owned()))
}

pub(crate) fn timetz_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let [time_raw @ .., w0, w1, w2, w3] = exact::<12>("timetz", buf)?;
    let usecs = i64::from_be_bytes(time_raw);
    // seconds west of greenwich on the wire
    let west = i32::from_be_bytes([w0, w1, w2, w3]);
    let time = time_from_usecs(usecs).ok_or(DecodeError::invalid("timetz"))?;
    let offset = west
        .checked_neg()
        .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
        .ok_or(DecodeError::invalid("timetz"))?;
    Ok(Value::TimeTz { time, offset })
}

pub(crate) fn timestamp_text(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    if ctx.iso_dates {
        if let Some((datetime, rest)) = parse_datetime(buf) {
            if rest.is_empty() {
                return Ok(Value::Timestamp(datetime));
            }
        }
    }
    Ok(Value::Text(text.to_owned()))
}

pub(crate) fn timestamp_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let usecs = i64::from_be_bytes(exact("timestamp", buf)?);
    match usecs {
        i64::MAX => return Ok(Value::Text("infinity".to_owned())),
        i64::MIN => return Ok(Value::Text("-infinity".to_owned())),
        _ => {}
    }
    match datetime_from_usecs(usecs) {
        Some(datetime) => Ok(Value::Timestamp(datetime)),
        None => Ok(Value::Text(format_datetime(usecs, false))),
    }
}

pub(crate) fn timestamptz_text(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    if ctx.iso_dates {
        if let Some((datetime, rest)) = parse_datetime(buf) {
            if let Some(offset) = parse_offset(rest) {
                return Ok(Value::TimestampTz(datetime.assume_offset(offset)));
            }
        }
    }
    Ok(Value::Text(text.to_owned()))
}

pub(crate) fn timestamptz_bin(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let usecs = i64::from_be_bytes(exact("timestamptz", buf)?);
    match usecs {
        i64::MAX => return Ok(Value::Text("infinity".to_owned())),
        i64::MIN => return Ok(Value::Text("-infinity".to_owned())),
        _ => {}
    }
    let Some(datetime) = datetime_from_usecs(usecs) else {
        return Ok(Value::Text(format_datetime(usecs, true)));
    };
    let utc = datetime.assume_utc();
    let local = match ctx.tz_offset {
        Some(offset) => utc.checked_to_offset(offset).unwrap_or(utc),
        None => utc,
    };
    Ok(Value::TimestampTz(local))
}

pub(crate) fn interval_text(ctx: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let text = utf8(buf)?;
    if ctx.postgres_intervals {
        if let Some(interval) = parse_interval(text) {
            return Ok(Value::Interval(interval));
        }
    }
    Ok(Value::Text(text.to_owned()))
}

pub(crate) fn interval_bin(_: &DecodeContext, buf: &[u8]) -> Result<Value, DecodeError> {
    let [micros_raw @ .., d0, d1, d2, d3, m0, m1, m2, m3] = exact::<16>("interval", buf)?;
    Ok(Value::Interval(Interval {
        microseconds: i64::from_be_bytes(micros_raw),
        days: i32::from_be_bytes([d0, d1, d2, d3]),
        months: i32::from_be_bytes([m0, m1, m2, m3]),
    }))
}

/// Days since the postgres epoch for a binary date or timestamp.
pub(crate) fn date_to_pg_days(date: Date) -> i32 {
    date.to_julian_day() - PG_EPOCH_JULIAN as i32
}

pub(crate) fn time_to_usecs(time: Time) -> i64 {
    time.hour() as i64 * USECS_PER_HOUR
        + time.minute() as i64 * USECS_PER_MINUTE
        + time.second() as i64 * USECS_PER_SEC
        + time.microsecond() as i64
}

pub(crate) fn datetime_to_usecs(datetime: PrimitiveDateTime) -> i64 {
    date_to_pg_days(datetime.date()) as i64 * USECS_PER_DAY + time_to_usecs(datetime.time())
}

fn time_from_usecs(usecs: i64) -> Option<Time> {
    if !(0..=USECS_PER_DAY).contains(&usecs) {
        return None;
    }
    let mut hour = usecs / USECS_PER_HOUR;
    let rest = usecs % USECS_PER_HOUR;
    if hour == 24 {
        hour = 0;
    }
    Time::from_hms_micro(
        hour as u8,
        (rest / USECS_PER_MINUTE) as u8,
        (rest % USECS_PER_MINUTE / USECS_PER_SEC) as u8,
        (rest % USECS_PER_SEC) as u32,
    )
    .ok()
}

fn datetime_from_usecs(usecs: i64) -> Option<PrimitiveDateTime> {
    let days = usecs.div_euclid(USECS_PER_DAY);
    let time = time_from_usecs(usecs.rem_euclid(USECS_PER_DAY))?;
    let julian = i32::try_from(days + PG_EPOCH_JULIAN).ok()?;
    Some(PrimitiveDateTime::new(Date::from_julian_day(julian).ok()?, time))
}

/// Calendar parts of a date beyond the client range, from the postgres
/// `j2date` routine.
fn date_parts(pg_days: i64) -> (i64, u8, u8) {
    let julian = pg_days + PG_EPOCH_JULIAN + 32_044;
    let (quad, extra) = (julian.div_euclid(146_097), julian.rem_euclid(146_097));
    let extra = extra * 4 + 3;
    let julian = julian + 60 + quad * 3 + extra.div_euclid(146_097);
    let (quad, julian) = (julian.div_euclid(1461), julian.rem_euclid(1461));
    let mut year = julian * 4 / 1461;
    let julian = match year == 0 {
        true => (julian + 306) % 366,
        false => (julian + 305) % 365,
    } + 123;
    year += quad * 4;
    let quad = julian * 2141 / 65_536;
    let month = ((quad + 10) % 12 + 1) as u8;
    let day = (julian - 7834 * quad / 256) as u8;
    (year - 4800, month, day)
}

fn format_date(year: i64, month: u8, day: u8) -> String {
    match year > 0 {
        true => format!("{year:04}-{month:02}-{day:02}"),
        false => format!("{:04}-{month:02}-{day:02} BC", -year + 1),
    }
}

fn format_datetime(usecs: i64, utc_suffix: bool) -> String {
    let days = usecs.div_euclid(USECS_PER_DAY);
    let rest = usecs.rem_euclid(USECS_PER_DAY);
    let (year, month, day) = date_parts(days);
    let hour = rest / USECS_PER_HOUR;
    let minute = rest % USECS_PER_HOUR / USECS_PER_MINUTE;
    let second = rest % USECS_PER_MINUTE / USECS_PER_SEC;
    let usec = rest % USECS_PER_SEC;
    let display_year = match year > 0 {
        true => year,
        false => -year + 1,
    };
    let mut out =
        format!("{display_year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}");
    if usec != 0 {
        out.push('.');
        out.push_str(format!("{usec:06}").trim_end_matches('0'));
    }
    if utc_suffix {
        out.push_str("+00");
    }
    if year <= 0 {
        out.push_str(" BC");
    }
    out
}

fn two_digits(buf: &[u8]) -> Option<u8> {
    match buf {
        [a @ b'0'..=b'9', b @ b'0'..=b'9'] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}

fn parse_date(buf: &[u8]) -> Option<Date> {
    if buf.len() != 10 || buf[4] != b'-' || buf[7] != b'-' {
        return None;
    }
    let year: i32 = std::str::from_utf8(&buf[..4]).ok()?.parse().ok()?;
    let month = two_digits(&buf[5..7])?;
    let day = two_digits(&buf[8..10])?;
    Date::from_calendar_date(year, month.try_into().ok()?, day).ok()
}

/// Parse `HH:MM:SS` with an optional fraction, returns the rest of the
/// input.
fn parse_hms(buf: &[u8]) -> Option<(Time, &[u8])> {
    if buf.len() < 8 || buf[2] != b':' || buf[5] != b':' {
        return None;
    }
    let hour = two_digits(&buf[..2])?;
    let minute = two_digits(&buf[3..5])?;
    let second = two_digits(&buf[6..8])?;
    let mut micro = 0u32;
    let mut rest = &buf[8..];
    if let Some(frac) = rest.strip_prefix(b".") {
        let len = frac.iter().take_while(|b| b.is_ascii_digit()).count();
        if len == 0 || len > 6 {
            return None;
        }
        for digit in &frac[..len] {
            micro = micro * 10 + (digit - b'0') as u32;
        }
        micro *= 10u32.pow(6 - len as u32);
        rest = &frac[len..];
    }
    let time = match (hour, minute, second, micro) {
        (24, 0, 0, 0) => Time::MIDNIGHT,
        _ => Time::from_hms_micro(hour, minute, second, micro).ok()?,
    };
    Some((time, rest))
}

fn parse_datetime(buf: &[u8]) -> Option<(PrimitiveDateTime, &[u8])> {
    if buf.len() < 11 || buf[10] != b' ' {
        return None;
    }
    let date = parse_date(&buf[..10])?;
    let (time, rest) = parse_hms(&buf[11..])?;
    Some((PrimitiveDateTime::new(date, time), rest))
}

/// Parse `+HH`, `+HH:MM` or `+HH:MM:SS` utc offsets.
fn parse_offset(buf: &[u8]) -> Option<UtcOffset> {
    let (sign, rest) = match buf.split_first()? {
        (b'+', rest) => (1i32, rest),
        (b'-', rest) => (-1i32, rest),
        _ => return None,
    };
    let hour = two_digits(rest.get(..2)?)?;
    let mut seconds = hour as i32 * 3600;
    let mut rest = &rest[2..];
    for scale in [60, 1] {
        if let Some(tail) = rest.strip_prefix(b":") {
            seconds += two_digits(tail.get(..2)?)? as i32 * scale;
            rest = &tail[2..];
        }
    }
    if !rest.is_empty() {
        return None;
    }
    UtcOffset::from_whole_seconds(sign * seconds).ok()
}

/// Resolve a reported `TimeZone` setting to a fixed utc offset.
///
/// Named zones need a timezone database to resolve, those keep
/// timestamptz values in utc.
pub(crate) fn fixed_offset(value: &str) -> Option<UtcOffset> {
    if value.eq_ignore_ascii_case("UTC") || value.eq_ignore_ascii_case("GMT") {
        return Some(UtcOffset::UTC);
    }
    let rest = value
        .strip_prefix("UTC")
        .or_else(|| value.strip_prefix("GMT"))
        .unwrap_or(value);
    parse_offset(rest.as_bytes())
}

/// Parse the `postgres` IntervalStyle output.
fn parse_interval(text: &str) -> Option<Interval> {
    let mut interval = Interval::default();
    let mut rest = text.trim();
    let mut matched = false;
    for (unit_singular, unit_plural) in [("year", "years"), ("mon", "mons"), ("day", "days")] {
        let Some((number, tail)) = rest.split_once(' ') else { break };
        let Some(unit_end) = tail.split_once(' ').map(|(u, _)| u).or(Some(tail)) else { break };
        if unit_end != unit_singular && unit_end != unit_plural {
            continue;
        }
        let value: i64 = number.parse().ok()?;
        let value32 = i32::try_from(value).ok()?;
        match unit_singular {
            "year" => interval.months = interval.months.checked_add(value32.checked_mul(12)?)?,
            "mon" => interval.months = interval.months.checked_add(value32)?,
            _ => interval.days = value32,
        }
        matched = true;
        rest = tail.strip_prefix(unit_end)?.trim_start();
    }
    if !rest.is_empty() {
        let (negative, clock) = match rest.strip_prefix('-') {
            Some(clock) => (true, clock),
            None => (false, rest.strip_prefix('+').unwrap_or(rest)),
        };
        let mut usecs = parse_clock(clock)?;
        if negative {
            usecs = -usecs;
        }
        interval.microseconds = usecs;
        matched = true;
    }
    matched.then_some(interval)
}

/// Parse `HH:MM:SS` with unbounded hours, as interval clocks exceed a day.
fn parse_clock(clock: &str) -> Option<i64> {
    let (hours, rest) = clock.split_once(':')?;
    if hours.is_empty() || !hours.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i64 = hours.parse().ok()?;
    let buf = rest.as_bytes();
    if buf.len() < 5 || buf[2] != b':' {
        return None;
    }
    let minute = two_digits(&buf[..2])?;
    let second = two_digits(&buf[3..5])?;
    let mut micro = 0i64;
    let mut tail = &buf[5..];
    if let Some(frac) = tail.strip_prefix(b".") {
        let len = frac.iter().take_while(|b| b.is_ascii_digit()).count();
        if len == 0 || len > 6 {
            return None;
        }
        for digit in &frac[..len] {
            micro = micro * 10 + (digit - b'0') as i64;
        }
        micro *= 10i64.pow(6 - len as u32);
        tail = &frac[len..];
    }
    if !tail.is_empty() || minute > 59 || second > 59 {
        return None;
    }
    hours
        .checked_mul(USECS_PER_HOUR)?
        .checked_add(minute as i64 * USECS_PER_MINUTE + second as i64 * USECS_PER_SEC + micro)
}

#[cfg(test)]
mod test {
    use time::macros::{date, datetime, offset, time};

    use super::*;

    fn iso() -> DecodeContext {
        DecodeContext { iso_dates: true, postgres_intervals: true, tz_offset: None }
    }

    #[test]
    fn date_binary() {
        assert_eq!(date_bin(&iso(), &0i32.to_be_bytes()).unwrap(), Value::Date(date!(2000-01-01)));
        assert_eq!(
            date_bin(&iso(), &366i32.to_be_bytes()).unwrap(),
            Value::Date(date!(2001-01-01)),
        );
        assert_eq!(
            date_bin(&iso(), &i32::MAX.to_be_bytes()).unwrap(),
            Value::Text("infinity".to_owned()),
        );
        assert_eq!(
            date_bin(&iso(), &i32::MIN.to_be_bytes()).unwrap(),
            Value::Text("-infinity".to_owned()),
        );
    }

    #[test]
    fn date_binary_beyond_client_range() {
        // 100000-01-01 is 35_793_765 days past the epoch
        let days = 35_793_765i32;
        assert_eq!(
            date_bin(&iso(), &days.to_be_bytes()).unwrap(),
            Value::Text("100000-01-01".to_owned()),
        );
    }

    #[test]
    fn date_text_iso_only() {
        assert_eq!(
            date_text(&iso(), b"2024-02-29").unwrap(),
            Value::Date(date!(2024-02-29)),
        );
        let style = DecodeContext::default();
        assert_eq!(
            date_text(&style, b"2024-02-29").unwrap(),
            Value::Text("2024-02-29".to_owned()),
        );
        assert_eq!(
            date_text(&iso(), b"01/02/2024").unwrap(),
            Value::Text("01/02/2024".to_owned()),
        );
    }

    #[test]
    fn time_binary() {
        let usecs = 13 * USECS_PER_HOUR + 30 * USECS_PER_MINUTE + 1_500_000;
        assert_eq!(
            time_bin(&iso(), &usecs.to_be_bytes()).unwrap(),
            Value::Time(time!(13:30:01.5)),
        );
        assert_eq!(
            time_bin(&iso(), &USECS_PER_DAY.to_be_bytes()).unwrap(),
            Value::Time(Time::MIDNIGHT),
        );
        assert!(time_bin(&iso(), &(-1i64).to_be_bytes()).is_err());
    }

    #[test]
    fn timetz_binary_negates_wire_offset() {
        let mut wire = Vec::new();
        wire.extend((12 * USECS_PER_HOUR).to_be_bytes());
        wire.extend((-7200i32).to_be_bytes());
        assert_eq!(
            timetz_bin(&iso(), &wire).unwrap(),
            Value::TimeTz { time: time!(12:00), offset: offset!(+2) },
        );
    }

    #[test]
    fn timestamp_binary() {
        let usecs = 366 * USECS_PER_DAY + 90_000_000;
        assert_eq!(
            timestamp_bin(&iso(), &usecs.to_be_bytes()).unwrap(),
            Value::Timestamp(datetime!(2001-01-01 00:01:30)),
        );
        assert_eq!(
            timestamp_bin(&iso(), &i64::MAX.to_be_bytes()).unwrap(),
            Value::Text("infinity".to_owned()),
        );
    }

    #[test]
    fn timestamptz_binary_applies_session_offset() {
        let ctx = DecodeContext { tz_offset: Some(offset!(+2)), ..iso() };
        let value = timestamptz_bin(&ctx, &0i64.to_be_bytes()).unwrap();
        assert_eq!(value, Value::TimestampTz(datetime!(2000-01-01 02:00 +2)));
        let utc = timestamptz_bin(&iso(), &0i64.to_be_bytes()).unwrap();
        assert_eq!(utc, Value::TimestampTz(datetime!(2000-01-01 00:00 UTC)));
    }

    #[test]
    fn timestamptz_text_offset_forms() {
        assert_eq!(
            timestamptz_text(&iso(), b"2024-05-01 10:00:00+05:30").unwrap(),
            Value::TimestampTz(datetime!(2024-05-01 10:00 +5:30)),
        );
        assert_eq!(
            timestamptz_text(&iso(), b"2024-05-01 10:00:00.25-08").unwrap(),
            Value::TimestampTz(datetime!(2024-05-01 10:00:00.25 -8)),
        );
    }

    #[test]
    fn interval_binary_field_order() {
        let mut wire = Vec::new();
        wire.extend(5_000_000i64.to_be_bytes());
        wire.extend(3i32.to_be_bytes());
        wire.extend(14i32.to_be_bytes());
        assert_eq!(
            interval_bin(&iso(), &wire).unwrap(),
            Value::Interval(Interval { months: 14, days: 3, microseconds: 5_000_000 }),
        );
    }

    #[test]
    fn interval_text_postgres_style() {
        assert_eq!(
            interval_text(&iso(), b"1 year 2 mons 3 days -04:05:06").unwrap(),
            Value::Interval(Interval {
                months: 14,
                days: 3,
                microseconds: -(4 * USECS_PER_HOUR + 5 * USECS_PER_MINUTE + 6 * USECS_PER_SEC),
            }),
        );
        assert_eq!(
            interval_text(&iso(), b"02:30:00").unwrap(),
            Value::Interval(Interval {
                months: 0,
                days: 0,
                microseconds: 2 * USECS_PER_HOUR + 30 * USECS_PER_MINUTE,
            }),
        );
        // interval clocks are not bounded to a day
        assert_eq!(
            interval_text(&iso(), b"30:00:00").unwrap(),
            Value::Interval(Interval {
                months: 0,
                days: 0,
                microseconds: 30 * USECS_PER_HOUR,
            }),
        );
        // sql standard style passes through
        assert_eq!(
            interval_text(&DecodeContext { postgres_intervals: false, ..iso() }, b"1-2").unwrap(),
            Value::Text("1-2".to_owned()),
        );
    }

    #[test]
    fn encode_helpers_match_epoch() {
        assert_eq!(date_to_pg_days(date!(2000-01-01)), 0);
        assert_eq!(datetime_to_usecs(datetime!(2000-01-02 00:00:01)), USECS_PER_DAY + 1_000_000);
    }
}
