//! Struct validation with failures in declaration order.
//!
//! `garde` reports failures sorted by field name. Payloads implement
//! [`Validated`] to name their fields in declaration order, and every report
//! is put back into that order before it reaches a client.

use std::fmt;

/// A `garde`-validated payload that knows its own field order.
///
/// ```rust
/// use ledger_api::Validated;
///
/// #[derive(garde::Validate)]
/// struct Transfer {
///     #[garde(length(min = 1))]
///     to_account: String,
///     #[garde(range(min = 1))]
///     amount: i64,
/// }
///
/// impl Validated for Transfer {
///     const FIELDS: &'static [&'static str] = &["to_account", "amount"];
/// }
/// ```
pub trait Validated: garde::Validate<Context = ()> {
    /// Field names, in declaration order.
    const FIELDS: &'static [&'static str];
}

/// The first failed rule of one field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldFailure {
    /// Dotted path, e.g. `currency_code` or `lines[0].amount`.
    pub path: String,
    /// Name of the failed rule, e.g. `required` or `length`.
    pub tag: &'static str,
    /// Rule message, for logs.
    pub message: String,
}

/// Every failure of one validation run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldFailures(Vec<FieldFailure>);

impl FieldFailures {
    /// Orders `report` by `fields`, keeping the first failure of each path.
    /// Paths whose top-level field is not listed go last, in report order.
    pub fn from_report(report: &garde::Report, fields: &[&str]) -> Self {
        let mut failures: Vec<(usize, FieldFailure)> = Vec::new();
        for (path, error) in report.iter() {
            let path = path.to_string();
            if failures.iter().any(|(_, f)| f.path == path) {
                continue;
            }
            let position = fields
                .iter()
                .position(|field| *field == top_level(&path))
                .unwrap_or(fields.len());
            failures.push((
                position,
                FieldFailure { tag: rule_tag(error.message()), message: error.message().to_owned(), path },
            ));
        }
        failures.sort_by_key(|(position, _)| *position);
        Self(failures.into_iter().map(|(_, failure)| failure).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldFailure> {
        self.0.iter()
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl fmt::Display for FieldFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.path, failure.message)?;
        }
        Ok(())
    }
}

/// Validates `value`, ordering any failures by declaration.
pub(crate) fn check<T: Validated>(value: &T) -> Result<(), FieldFailures> {
    value
        .validate()
        .map_err(|report| FieldFailures::from_report(&report, T::FIELDS))
}

fn top_level(path: &str) -> &str {
    path.split(['.', '[']).next().unwrap_or(path)
}

/// Maps a `garde` rule message back to the rule's name. Messages from
/// custom rules map to `custom`.
fn rule_tag(message: &str) -> &'static str {
    const PREFIXES: &[(&str, &str)] = &[
        ("not set", "required"),
        ("length is ", "length"),
        ("lower than ", "range"),
        ("greater than ", "range"),
        ("not ascii", "ascii"),
        ("not alphanumeric", "alphanumeric"),
        ("not a valid email", "email"),
        ("not a valid url", "url"),
        ("not a valid phone number", "phone_number"),
        ("not a valid credit card number", "credit_card"),
        ("does not match pattern /", "pattern"),
        ("does not contain ", "contains"),
        ("value does not begin with ", "prefix"),
        ("does not end with ", "suffix"),
    ];

    if let Some((_, tag)) = PREFIXES.iter().find(|(prefix, _)| message.starts_with(prefix)) {
        return tag;
    }
    if message.starts_with("not a valid ") && message.ends_with(" address") {
        return "ip";
    }
    if message.starts_with("does not match ") && message.ends_with(" field") {
        return "matches";
    }
    "custom"
}

#[cfg(test)]
mod tests {
    use garde::Validate;
    use rstest::rstest;

    use super::*;

    fn is_even(value: &i64, _ctx: &()) -> garde::Result {
        if value % 2 == 0 {
            Ok(())
        } else {
            Err(garde::Error::new("must be even"))
        }
    }

    #[derive(garde::Validate)]
    struct Transfer {
        #[garde(length(min = 1))]
        to_account: String,
        #[garde(range(min = 1), custom(is_even))]
        amount: i64,
        #[garde(required)]
        currency: Option<String>,
    }

    impl Validated for Transfer {
        const FIELDS: &'static [&'static str] = &["to_account", "amount", "currency"];
    }

    #[test]
    fn failures_follow_declaration_order() {
        let transfer = Transfer { to_account: String::new(), amount: 0, currency: None };
        let failures = check(&transfer).unwrap_err();
        let summary: Vec<(&str, &str)> =
            failures.iter().map(|f| (f.path.as_str(), f.tag)).collect();
        assert_eq!(
            summary,
            vec![("to_account", "length"), ("amount", "range"), ("currency", "required")]
        );
    }

    #[test]
    fn one_failure_per_field() {
        let transfer = Transfer { to_account: "acc-1".to_owned(), amount: -3, currency: Some("EUR".to_owned()) };
        let report = transfer.validate().unwrap_err();
        assert_eq!(report.iter().count(), 2);

        let failures = FieldFailures::from_report(&report, Transfer::FIELDS);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.iter().next().unwrap().path, "amount");
    }

    #[test]
    fn unlisted_fields_go_last() {
        let transfer = Transfer { to_account: String::new(), amount: 2, currency: None };
        let report = transfer.validate().unwrap_err();
        let failures = FieldFailures::from_report(&report, &["currency"]);
        let paths: Vec<&str> = failures.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["currency", "to_account"]);
        assert_eq!(failures.to_string(), "currency: not set; to_account: length is lower than 1");
    }

    #[rstest]
    #[case("not set", "required")]
    #[case("length is lower than 3", "length")]
    #[case("length is greater than 3", "length")]
    #[case("greater than 10", "range")]
    #[case("not a valid email: missing '@'", "email")]
    #[case("not a valid IPv4 address", "ip")]
    #[case("does not match password field", "matches")]
    #[case("does not match pattern /^[A-Z]{3}$/", "pattern")]
    #[case("must be even", "custom")]
    fn rule_messages_map_to_tags(#[case] message: &str, #[case] tag: &str) {
        assert_eq!(rule_tag(message), tag);
    }

    #[test]
    fn nested_paths_group_under_their_field() {
        assert_eq!(top_level("lines[0].amount"), "lines");
        assert_eq!(top_level("address.city"), "address");
        assert_eq!(top_level("name"), "name");
    }
}
