//! Cron schedule compilation
//!
//! Expressions are standard five-field cron (minute, hour, day of month,
//! month, day of week) evaluated in the task's IANA timezone, never in
//! process-local time.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use croner::Cron;

use crate::error::{SchedulerError, SchedulerResult};
use crate::models::TaskDefinition;

/// A compiled (expression, timezone) pair
#[derive(Clone)]
pub struct Schedule {
    cron: Cron,
    expression: String,
    timezone: Tz,
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("expression", &self.expression)
            .field("timezone", &self.timezone.name())
            .finish()
    }
}

impl Schedule {
    /// Compile an expression in the given timezone
    ///
    /// # Errors
    /// - `SchedulerError::InvalidSchedule` if the expression does not parse
    /// - `SchedulerError::UnknownTimezone` if the zone is not an IANA name
    pub fn parse(expression: &str, timezone: &str) -> SchedulerResult<Self> {
        let expression = expression.trim();
        if expression.split_whitespace().count() != 5 {
            return Err(SchedulerError::invalid_schedule(
                expression,
                "expected 5 fields (minute hour day-of-month month day-of-week)",
            ));
        }

        let cron = Cron::new(expression)
            .parse()
            .map_err(|e| SchedulerError::invalid_schedule(expression, e))?;

        let timezone: Tz = timezone
            .trim()
            .parse()
            .map_err(|_| SchedulerError::UnknownTimezone(timezone.to_string()))?;

        Ok(Self {
            cron,
            expression: expression.to_string(),
            timezone,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> &str {
        self.timezone.name()
    }

    /// First fire time strictly after `after`
    ///
    /// # Errors
    /// `SchedulerError::InvalidSchedule` if the expression can never fire
    /// (for example February 30th).
    pub fn next_after(&self, after: DateTime<Utc>) -> SchedulerResult<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.cron
            .find_next_occurrence(&local, false)
            .map(|next| next.with_timezone(&Utc))
            .map_err(|e| SchedulerError::invalid_schedule(&self.expression, e))
    }

    /// Next fire time from now
    pub fn next_from_now(&self) -> SchedulerResult<DateTime<Utc>> {
        self.next_after(Utc::now())
    }

    /// Compile a stored definition's schedule
    pub fn for_task(task: &TaskDefinition) -> SchedulerResult<Self> {
        Self::parse(&task.expression, &task.timezone)
    }
}

/// Next fire time to persist for a task: `None` while paused or when the
/// stored schedule no longer compiles
pub fn next_run_for(task: &TaskDefinition) -> Option<DateTime<Utc>> {
    if !task.is_active() {
        return None;
    }
    match Schedule::for_task(task).and_then(|s| s.next_from_now()) {
        Ok(next) => Some(next),
        Err(e) => {
            tracing::warn!(task_id = %task.id, error = %e, "Cannot compute next run");
            None
        }
    }
}
