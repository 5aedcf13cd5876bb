use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Repeat day-set for an alarm template.
///
/// An empty set means the alarm is one-shot: it fires at the next
/// occurrence of its clock time and is then retired.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DaySet {
    days: Vec<Weekday>,
}

impl DaySet {
    pub fn new(mut days: Vec<Weekday>) -> Self {
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        Self { days }
    }

    /// Every day of the week.
    pub fn every_day() -> Self {
        use Weekday::*;
        Self::new(vec![Mon, Tue, Wed, Thu, Fri, Sat, Sun])
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.days.contains(&day)
    }

    pub fn days(&self) -> &[Weekday] {
        &self.days
    }

    /// Number of days to add to `from` to land on the next matching
    /// weekday strictly after `from`. Returns `None` for an empty set.
    pub fn days_until_next(&self, from: Weekday) -> Option<u32> {
        if self.days.is_empty() {
            return None;
        }
        (1..=7).find(|offset| {
            let candidate = weekday_add(from, *offset);
            self.contains(candidate)
        })
    }

    /// Next matching date strictly after `date`.
    pub fn next_date_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let offset = self.days_until_next(date.weekday())?;
        date.checked_add_days(chrono::Days::new(offset as u64))
    }
}

fn weekday_add(day: Weekday, offset: u32) -> Weekday {
    let num = (day.num_days_from_monday() + offset) % 7;
    match num {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        _ => Weekday::Sun,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_has_no_next() {
        let days = DaySet::default();
        assert!(days.is_empty());
        assert_eq!(days.days_until_next(Weekday::Mon), None);
    }

    #[test]
    fn next_from_same_day_is_a_week_later() {
        let days = DaySet::new(vec![Weekday::Wed]);
        assert_eq!(days.days_until_next(Weekday::Wed), Some(7));
    }

    #[test]
    fn mon_wed_fri_from_monday() {
        let days = DaySet::new(vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert_eq!(days.days_until_next(Weekday::Mon), Some(2));
        assert_eq!(days.days_until_next(Weekday::Wed), Some(2));
        assert_eq!(days.days_until_next(Weekday::Fri), Some(3));
        assert_eq!(days.days_until_next(Weekday::Sat), Some(2));
    }

    #[test]
    fn next_date_after_crosses_week_boundary() {
        let days = DaySet::new(vec![Weekday::Mon]);
        // 2026-08-28 is a Friday.
        let friday = NaiveDate::from_ymd_opt(2026, 8, 28).unwrap();
        let next = days.next_date_after(friday).unwrap();
        assert_eq!(next, NaiveDate::from_ymd_opt(2026, 8, 31).unwrap());
        assert_eq!(next.weekday(), Weekday::Mon);
    }

    #[test]
    fn new_sorts_and_dedups() {
        let days = DaySet::new(vec![Weekday::Fri, Weekday::Mon, Weekday::Fri]);
        assert_eq!(days.days(), &[Weekday::Mon, Weekday::Fri]);
    }
}
