//! Next-occurrence calculation for recurring tasks.

use chrono::{Days, Months, NaiveDate};

use crate::models::{Recurrence, Task, TaskDraft};
use crate::{Error, Result};

/// Advance `from` by one period of `rule`.
///
/// Month arithmetic keeps the day of month and clamps to the last valid day
/// when the target month is shorter (Jan 31 -> Feb 28, Feb 29 -> Feb 28).
/// Returns `None` for [`Recurrence::None`] or when the date would overflow.
pub fn advance(rule: Recurrence, from: NaiveDate) -> Option<NaiveDate> {
    match rule {
        Recurrence::None => None,
        Recurrence::Daily => from.checked_add_days(Days::new(1)),
        Recurrence::Weekly => from.checked_add_days(Days::new(7)),
        Recurrence::Monthly => from.checked_add_months(Months::new(1)),
        Recurrence::Yearly => from.checked_add_months(Months::new(12)),
    }
}

/// Draft the next instance of a recurring task.
///
/// The draft copies title, description, urgency, owner, assignees,
/// prerequisites and the rule itself, and starts as `todo`. The new due date
/// is one period after the old due date, or after `completed_on` when the
/// task had none. Returns `Ok(None)` when the task does not recur.
pub fn next_occurrence(task: &Task, completed_on: NaiveDate) -> Result<Option<TaskDraft>> {
    if !task.recurrence.is_recurring() {
        return Ok(None);
    }

    let base = task.due_date.unwrap_or(completed_on);
    let due_date = advance(task.recurrence, base).ok_or_else(|| {
        Error::InvalidInput(format!(
            "next {} occurrence of task {} is out of the supported date range",
            task.recurrence, task.id
        ))
    })?;

    Ok(Some(TaskDraft {
        title: task.title.clone(),
        description: task.description.clone(),
        urgency: task.urgency,
        due_date: Some(due_date),
        recurrence: task.recurrence,
        owner: task.owner.clone(),
        assignee_users: task.assignee_users.clone(),
        assignee_groups: task.assignee_groups.clone(),
        prerequisites: task.prerequisites.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TaskStatus, Urgency};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recurring(rule: Recurrence, due: Option<NaiveDate>) -> Task {
        let mut task = Task::new(
            "tk-00000001".to_string(),
            "Water plants".to_string(),
            "us-00000001".to_string(),
        );
        task.recurrence = rule;
        task.due_date = due;
        task.status = TaskStatus::Completed;
        task
    }

    #[test]
    fn test_daily_copies_attributes() {
        let mut task = recurring(Recurrence::Daily, Some(date(2025, 1, 20)));
        task.urgency = Urgency::High;
        task.assignee_users = vec!["us-00000002".to_string()];
        task.assignee_groups = vec!["gp-00000001".to_string()];

        let draft = next_occurrence(&task, date(2025, 1, 25)).unwrap().unwrap();
        assert_eq!(draft.due_date, Some(date(2025, 1, 21)));
        assert_eq!(draft.title, "Water plants");
        assert_eq!(draft.urgency, Urgency::High);
        assert_eq!(draft.assignee_users, task.assignee_users);
        assert_eq!(draft.assignee_groups, task.assignee_groups);
        assert_eq!(draft.recurrence, Recurrence::Daily);
    }

    #[test]
    fn test_weekly() {
        assert_eq!(advance(Recurrence::Weekly, date(2025, 12, 29)), Some(date(2026, 1, 5)));
    }

    #[test]
    fn test_monthly_clamps_to_month_end() {
        assert_eq!(advance(Recurrence::Monthly, date(2025, 1, 31)), Some(date(2025, 2, 28)));
        assert_eq!(advance(Recurrence::Monthly, date(2024, 1, 31)), Some(date(2024, 2, 29)));
        assert_eq!(advance(Recurrence::Monthly, date(2025, 12, 15)), Some(date(2026, 1, 15)));
    }

    #[test]
    fn test_yearly_clamps_leap_day() {
        assert_eq!(advance(Recurrence::Yearly, date(2024, 2, 29)), Some(date(2025, 2, 28)));
        assert_eq!(advance(Recurrence::Yearly, date(2025, 3, 1)), Some(date(2026, 3, 1)));
    }

    #[test]
    fn test_missing_due_date_uses_completion_date() {
        let task = recurring(Recurrence::Weekly, None);
        let draft = next_occurrence(&task, date(2025, 6, 2)).unwrap().unwrap();
        assert_eq!(draft.due_date, Some(date(2025, 6, 9)));
    }

    #[test]
    fn test_non_recurring_yields_nothing() {
        let task = recurring(Recurrence::None, Some(date(2025, 1, 20)));
        assert!(next_occurrence(&task, date(2025, 1, 20)).unwrap().is_none());
        assert_eq!(advance(Recurrence::None, date(2025, 1, 20)), None);
    }
}
