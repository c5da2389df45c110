//! Next-run computation.

use {
    chrono::{DateTime, Utc},
    cron::Schedule,
};

use crate::{
    error::{Error, Result},
    types::CronSchedule,
};

/// Parse a cron expression, accepting the 5-field form by padding it with a
/// seconds field and a year field.
pub fn parse_expr(expr: &str) -> Result<Schedule> {
    let expr = expr.trim();
    expr.parse::<Schedule>()
        .or_else(|_| format!("0 {expr} *").parse::<Schedule>())
        .map_err(|source| Error::CronParse {
            expr: expr.to_string(),
            source,
        })
}

/// Next fire time strictly after `now_ms` (epoch millis).
///
/// `Ok(None)` when the expression has no future occurrence.
pub fn compute_next_run(schedule: &CronSchedule, now_ms: u64) -> Result<Option<u64>> {
    let parsed = parse_expr(&schedule.expr)?;
    let now = DateTime::<Utc>::from_timestamp_millis(now_ms as i64).unwrap_or_default();

    let next = match schedule.tz.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(tz_name) => {
            let tz: chrono_tz::Tz = tz_name
                .parse()
                .map_err(|_| Error::unknown_timezone(tz_name))?;
            parsed
                .after(&now.with_timezone(&tz))
                .next()
                .map(|dt| dt.timestamp_millis())
        },
        None => parsed.after(&now).next().map(|dt| dt.timestamp_millis()),
    };

    Ok(next.and_then(|ms| u64::try_from(ms).ok()))
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn ms(rfc3339: &str) -> u64 {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().timestamp_millis() as u64
    }

    #[test]
    fn daily_moscow_evening() {
        let s = CronSchedule::daily(19, 0, "Europe/Moscow");
        // 15:00 UTC is 18:00 in Moscow; the run is at 16:00 UTC the same day.
        let next = compute_next_run(&s, ms("2024-05-10T15:00:00Z")).unwrap();
        assert_eq!(next, Some(ms("2024-05-10T16:00:00Z")));

        // Right at the trigger the next run is a day later.
        let next = compute_next_run(&s, ms("2024-05-10T16:00:00Z")).unwrap();
        assert_eq!(next, Some(ms("2024-05-11T16:00:00Z")));
    }

    #[test]
    fn five_field_without_timezone_is_utc() {
        let s = CronSchedule {
            expr: "30 9 * * *".into(),
            tz: None,
        };
        let next = compute_next_run(&s, ms("2024-02-01T00:00:00Z")).unwrap();
        assert_eq!(next, Some(ms("2024-02-01T09:30:00Z")));
    }

    #[test]
    fn seven_field_expression_is_accepted() {
        let s = CronSchedule {
            expr: "*/10 * * * * * *".into(),
            tz: Some("UTC".into()),
        };
        let next = compute_next_run(&s, ms("2024-02-01T00:00:05Z")).unwrap();
        assert_eq!(next, Some(ms("2024-02-01T00:00:10Z")));
    }

    #[rstest]
    #[case("not a cron")]
    #[case("61 25 * * *")]
    fn invalid_expressions(#[case] expr: &str) {
        let s = CronSchedule {
            expr: expr.into(),
            tz: None,
        };
        assert!(matches!(
            compute_next_run(&s, 0),
            Err(Error::CronParse { .. })
        ));
    }

    #[test]
    fn unknown_timezone() {
        let s = CronSchedule::daily(19, 0, "Mars/Olympus");
        assert!(matches!(
            compute_next_run(&s, 0),
            Err(Error::UnknownTimezone { .. })
        ));
    }

    #[test]
    fn no_future_occurrence() {
        let s = CronSchedule {
            expr: "0 0 0 1 1 * 2000".into(),
            tz: None,
        };
        assert_eq!(compute_next_run(&s, ms("2024-01-01T00:00:00Z")).unwrap(), None);
    }
}
