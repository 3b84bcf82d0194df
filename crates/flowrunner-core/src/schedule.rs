//! Schedule specification for `schedule`-kind triggers (Design Note in §9
//! of spec.md: "Re-architect against an explicit schedule spec... the
//! interface is `NextFireTime(last, now) -> time?`").
//!
//! The teacher depends on both `croner` and `tokio-cron-scheduler`
//! (`boternity-core/src/workflow/trigger.rs`, `scheduler.rs`) to host cron
//! jobs on their own clock. §4.1 item 2 instead has the engine own a
//! single ~1-minute poll loop that asks each trigger "should you fire
//! now?" -- so only `croner`, used directly for cron-expression parsing,
//! is carried; the job-hosting runtime is dropped (see DESIGN.md).

use std::time::Duration;

use chrono::{DateTime, Utc};

/// How a `schedule` trigger decides when to fire.
#[derive(Debug, Clone)]
pub enum ScheduleSpec {
    /// Fire no more often than the given interval.
    Interval(Duration),
    /// Fire according to a cron expression, evaluated in UTC.
    Cron(String),
}

impl ScheduleSpec {
    /// Parse a trigger's free-form `schedule_spec` string. A string parsed
    /// as a plain integer is treated as a number of seconds; anything else
    /// is handed to the cron parser. Falls back to a one-minute interval
    /// on a spec the engine cannot parse, logged by the caller rather than
    /// failing the whole trigger loop.
    pub fn parse(raw: &str) -> Self {
        if let Ok(secs) = raw.trim().parse::<u64>() {
            return ScheduleSpec::Interval(Duration::from_secs(secs));
        }
        ScheduleSpec::Cron(raw.to_string())
    }

    /// The next fire time strictly after `now`, given the trigger last
    /// fired at `last` (`None` if it has never fired).
    ///
    /// §4.1 item 2: "at minimum, if `last_triggered` is nil fire once,
    /// otherwise fire when the configured minimum interval has elapsed."
    pub fn next_fire_time(
        &self,
        last: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            ScheduleSpec::Interval(interval) => match last {
                None => Some(now),
                Some(last) => {
                    let due = last + chrono::Duration::from_std(*interval).ok()?;
                    if due <= now { Some(due) } else { None }
                }
            },
            ScheduleSpec::Cron(expr) => {
                let cron = expr.parse::<croner::Cron>().ok()?;
                match last {
                    None => Some(now),
                    Some(last) => cron.iter_after(last).take_while(|t| *t <= now).last(),
                }
            }
        }
    }

    /// Whether this schedule should fire at `now`, given it last fired at
    /// `last`.
    pub fn should_fire(&self, last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        self.next_fire_time(last, now).is_some()
    }
}
