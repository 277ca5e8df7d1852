use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionVerdict {
    pub is_older_than_three_months: bool,
    pub has_sign_in: bool,
    pub has_not_expired: bool,
    pub will_delete: bool,
}

impl RetentionVerdict {
    pub fn new(is_older_than_three_months: bool, has_sign_in: bool, has_not_expired: bool) -> Self {
        Self {
            is_older_than_three_months,
            has_sign_in,
            has_not_expired,
            will_delete: is_older_than_three_months && !has_sign_in && !has_not_expired,
        }
    }
}

/// One evaluated application, rendered as the console trace line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionTrace<'a> {
    pub display_name: &'a str,
    pub verdict: RetentionVerdict,
}

impl fmt::Display for RetentionTrace<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DisplayName={} isOlderThanThreeMonths={} hasSignIns={} hasNotExpired={} willBeDeleted={}",
            self.display_name,
            self.verdict.is_older_than_three_months,
            self.verdict.has_sign_in,
            self.verdict.has_not_expired,
            self.verdict.will_delete
        )
    }
}
