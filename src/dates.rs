use chrono::{Datelike, Local, NaiveDate};

/// `YYYY-MM-DD` becomes `MM-DD-YYYY`; anything unparsable is returned verbatim.
pub fn format_dob(raw: &str) -> String {
    let trimmed = raw.trim();
    match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => date.format("%m-%d-%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// US short date without zero padding, e.g. `5/2/2025`.
pub fn format_stamp_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dob_reformats_iso_dates() {
        assert_eq!(format_dob("1990-05-02"), "05-02-1990");
        assert_eq!(format_dob(" 2001-12-31 "), "12-31-2001");
    }

    #[test]
    fn dob_passes_through_unparsable_input() {
        assert_eq!(format_dob("05/02/1990"), "05/02/1990");
        assert_eq!(format_dob("1990-13-40"), "1990-13-40");
        assert_eq!(format_dob(""), "");
    }

    #[test]
    fn stamp_date_is_unpadded() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 2).expect("date");
        assert_eq!(format_stamp_date(date), "5/2/2025");
        let date = NaiveDate::from_ymd_opt(2024, 11, 30).expect("date");
        assert_eq!(format_stamp_date(date), "11/30/2024");
    }
}
