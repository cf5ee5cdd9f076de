//! Pure lending rules: contact and enrolment validation, loan windows and
//! late-return sanctions.
//!
//! Nothing here performs I/O; callers pass the current instant explicitly.

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use thiserror::Error;

/// Upper bound on concurrently borrowed books per student.
pub const ALLOWANCE_CAP: i32 = 3;
/// Sanction charged per full day a book is returned late.
pub const SANCTION_PER_DAY: i64 = 2000;
/// Longest loan a student may request, in days.
pub const MAX_LOAN_DAYS: i64 = 7;
/// Calendar format clients use for due dates (`dd-mm-yyyy`).
pub const DUE_DATE_FORMAT: &str = "%d-%m-%Y";

/// Rejections raised by the rule functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    /// Phone number outside 8–15 characters after cleaning.
    #[error("number length must be 8-15")]
    PhoneLength,
    /// Phone number contains something other than digits and a leading `+`.
    #[error("only numeric characters are allowed")]
    PhoneCharacters,
    /// Phone number uses an unsupported national prefix.
    #[error("prefix format must start with 0 / 62 / +62")]
    PhonePrefix,
    /// Major is not offered.
    #[error("major must be one of RPL SIJA PSPT TPTU TEI MEKA TOI TEK IOP")]
    UnknownMajor,
    /// Class does not exist for the chosen major.
    #[error("class not available for {major} (max {max})")]
    ClassUnavailable {
        /// Major the class was checked against.
        major: &'static str,
        /// Highest class offered by that major.
        max: &'static str,
    },
    /// Sub-class outside `A`, `B`, `C`.
    #[error("sub class must be one of A B C")]
    UnknownSubClass,
    /// Due date did not match `dd-mm-yyyy`.
    #[error("wrong format make sure it is like this: dd-mm-yyyy")]
    DueDateFormat,
    /// Due date lies before the current instant.
    #[error("date cannot be in the past")]
    DueDateInPast,
    /// Due date lies beyond the maximum loan window.
    #[error("maximum loan limit is {MAX_LOAN_DAYS} days")]
    DueDateTooFar,
}

/// Normalise a phone number to its `+62` international form.
///
/// Separators (`-`, `(`, `)`, `.` and spaces) are stripped first.
///
/// # Examples
/// ```
/// use lending::domain::rules::normalize_phone;
///
/// assert_eq!(normalize_phone("0812-3456-789").unwrap(), "+628123456789");
/// assert_eq!(normalize_phone("62 812 3456 789").unwrap(), "+628123456789");
/// ```
pub fn normalize_phone(raw: &str) -> Result<String, RuleViolation> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | '(' | ')' | '.' | ' '))
        .collect();
    if !(8..=15).contains(&cleaned.len()) {
        return Err(RuleViolation::PhoneLength);
    }
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RuleViolation::PhoneCharacters);
    }
    if cleaned.starts_with("+62") {
        Ok(cleaned)
    } else if cleaned.starts_with("62") {
        Ok(format!("+{cleaned}"))
    } else if let Some(local) = cleaned.strip_prefix('0') {
        Ok(format!("+62{local}"))
    } else {
        Err(RuleViolation::PhonePrefix)
    }
}

/// Majors offered by the school.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Major {
    Rpl,
    Sija,
    Pspt,
    Tptu,
    Tei,
    Meka,
    Toi,
    Tek,
    Iop,
}

impl Major {
    const ALL: [(&'static str, Self); 9] = [
        ("RPL", Self::Rpl),
        ("SIJA", Self::Sija),
        ("PSPT", Self::Pspt),
        ("TPTU", Self::Tptu),
        ("TEI", Self::Tei),
        ("MEKA", Self::Meka),
        ("TOI", Self::Toi),
        ("TEK", Self::Tek),
        ("IOP", Self::Iop),
    ];

    /// Parse the upper-case major code.
    pub fn parse(raw: &str) -> Result<Self, RuleViolation> {
        Self::ALL
            .iter()
            .find(|(code, _)| *code == raw)
            .map(|(_, major)| *major)
            .ok_or(RuleViolation::UnknownMajor)
    }

    /// Upper-case code as stored.
    pub fn code(self) -> &'static str {
        Self::ALL
            .iter()
            .find(|(_, major)| *major == self)
            .map_or("", |(code, _)| code)
    }

    /// Four-year programmes run an extra `XIII` class.
    fn runs_four_years(self) -> bool {
        matches!(self, Self::Iop | Self::Sija)
    }
}

/// Check that `class` exists for `major`.
///
/// # Examples
/// ```
/// use lending::domain::rules::{Major, validate_class};
///
/// assert!(validate_class(Major::Iop, "XIII").is_ok());
/// assert!(validate_class(Major::Rpl, "XIII").is_err());
/// ```
pub fn validate_class(major: Major, class: &str) -> Result<(), RuleViolation> {
    let offered: &[&str] = if major.runs_four_years() {
        &["X", "XI", "XII", "XIII"]
    } else {
        &["X", "XI", "XII"]
    };
    if offered.contains(&class) {
        return Ok(());
    }
    Err(if major.runs_four_years() {
        RuleViolation::ClassUnavailable {
            major: "IOP/SIJA",
            max: "XIII",
        }
    } else {
        RuleViolation::ClassUnavailable {
            major: "this major",
            max: "XII",
        }
    })
}

/// Check the sub-class letter.
pub fn validate_sub_class(sub_class: &str) -> Result<(), RuleViolation> {
    match sub_class {
        "A" | "B" | "C" => Ok(()),
        _ => Err(RuleViolation::UnknownSubClass),
    }
}

/// Parse a `dd-mm-yyyy` due date and check it against the loan window.
///
/// The date resolves to midnight UTC. It must not lie before `now` and must
/// not lie more than [`MAX_LOAN_DAYS`] after it.
pub fn parse_due_date(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, RuleViolation> {
    let date = NaiveDate::parse_from_str(raw.trim(), DUE_DATE_FORMAT)
        .map_err(|_| RuleViolation::DueDateFormat)?;
    let due = date.and_time(chrono::NaiveTime::MIN).and_utc();
    if due > now + TimeDelta::days(MAX_LOAN_DAYS) {
        return Err(RuleViolation::DueDateTooFar);
    }
    if due < now {
        return Err(RuleViolation::DueDateInPast);
    }
    Ok(due)
}

/// Sanction owed when a loan due at `due` is returned at `returned`.
///
/// Only full 24-hour periods after the due moment count. Returning at or
/// before the due moment costs nothing.
///
/// # Examples
/// ```
/// use chrono::{TimeDelta, Utc};
/// use lending::domain::rules::sanction_for;
///
/// let due = Utc::now();
/// assert_eq!(sanction_for(due, due + TimeDelta::hours(49)), 4000);
/// assert_eq!(sanction_for(due, due - TimeDelta::days(1)), 0);
/// ```
pub fn sanction_for(due: DateTime<Utc>, returned: DateTime<Utc>) -> i64 {
    if returned <= due {
        return 0;
    }
    (returned - due).num_days() * SANCTION_PER_DAY
}
