use crate::models::CalendarKey;
use chrono::{Datelike, NaiveDate};

pub fn calendar_key(date: NaiveDate) -> CalendarKey {
    let week = date.iso_week();
    CalendarKey {
        year_week: format!("{}{}", week.year(), week.week()),
        iso_year: week.year(),
        iso_week: week.week(),
        day_of_week: date.weekday().num_days_from_monday() as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::calendar_key;
    use chrono::{NaiveDate, Weekday};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn monday_is_zero_and_sunday_is_six() {
        let monday = calendar_key(day(2021, 1, 4));
        assert_eq!(monday.day_of_week, 0);
        assert_eq!(monday.year_week, "20211");

        let sunday = calendar_key(day(2021, 1, 10));
        assert_eq!(sunday.day_of_week, 6);
        assert_eq!(sunday.year_week, "20211");
    }

    #[test]
    fn early_january_belongs_to_previous_iso_year() {
        let key = calendar_key(day(2021, 1, 1));
        assert_eq!(key.iso_year, 2020);
        assert_eq!(key.iso_week, 53);
        assert_eq!(key.year_week, "202053");
        assert_eq!(key.day_of_week, 4);
    }

    #[test]
    fn year_week_string_can_collide() {
        let modern = calendar_key(day(2021, 1, 11));
        let ancient = calendar_key(
            NaiveDate::from_isoywd_opt(202, 12, Weekday::Mon).expect("valid iso date"),
        );
        assert_eq!(modern.year_week, "20212");
        assert_eq!(modern.year_week, ancient.year_week);
        assert_ne!(
            (modern.iso_year, modern.iso_week),
            (ancient.iso_year, ancient.iso_week)
        );
    }
}
