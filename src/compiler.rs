//! Compiles preconditions into IMAP SEARCH tokens.
//!
//! A precondition names a search field and its arguments; compiling it
//! appends the corresponding token sequence to a [`TokenCollector`].
//! Field identity and arity are validated here, and scalar arguments are
//! decoded by the kind the field expects: verbatim strings, decimal
//! numbers, absolute dates, or relative durations resolved against the
//! caller-supplied `now`. Compilation has no side effect beyond the
//! collector appends, so the validation pass can run it against a
//! discarding collector.

use core::num::ParseIntError;

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::document::{Location, Precondition, Value, ValueNode};

/// Date layout the SEARCH grammar expects, e.g. `02-Jan-2024`.
const DATE_LAYOUT: &str = "%d-%b-%Y";

/// Receives compiled search tokens, one at a time.
pub trait TokenCollector {
    /// Appends one token to the query under construction.
    fn append(&mut self, token: String);
}

impl TokenCollector for Vec<String> {
    fn append(&mut self, token: String) {
        self.push(token);
    }
}

/// The recognized search fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    All,
    Answered,
    Bcc,
    Before,
    Body,
    Cc,
    Deleted,
    Draft,
    Flagged,
    From,
    Header,
    Keyword,
    Larger,
    Msg,
    New,
    Not,
    Old,
    OlderThan,
    On,
    Or,
    Recent,
    Seen,
    SentBefore,
    SentOn,
    SentSince,
    Since,
    Smaller,
    Subject,
    Text,
    To,
    Uid,
    Unanswered,
    Undeleted,
    Undraft,
    Unflagged,
    Unkeyword,
    Unseen,
}

/// How a field's arguments are decoded and emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    /// One relative duration, emitted as the absolute date `now − duration`.
    Age,
    /// One absolute date.
    Date,
    /// No arguments; the tag alone.
    Flag,
    /// Exactly two strings, emitted in order.
    Header,
    /// Zero or more nested preconditions, left-fold emission.
    Or,
    /// Exactly one nested precondition.
    Not,
    /// One decimal number.
    Number,
    /// Any number of decimal numbers, no tag.
    NumberList,
    /// One string, verbatim.
    Text,
    /// Any number of strings between `(` and `)`, after the tag.
    UidSet,
}

impl Field {
    /// Looks a field up by its document tag.
    fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "ALL" => Self::All,
            "ANSWERED" => Self::Answered,
            "BCC" => Self::Bcc,
            "BEFORE" => Self::Before,
            "BODY" => Self::Body,
            "CC" => Self::Cc,
            "DELETED" => Self::Deleted,
            "DRAFT" => Self::Draft,
            "FLAGGED" => Self::Flagged,
            "FROM" => Self::From,
            "HEADER" => Self::Header,
            "KEYWORD" => Self::Keyword,
            "LARGER" => Self::Larger,
            "MSG" => Self::Msg,
            "NEW" => Self::New,
            "NOT" => Self::Not,
            "OLD" => Self::Old,
            "OLDERTHAN" => Self::OlderThan,
            "ON" => Self::On,
            "OR" => Self::Or,
            "RECENT" => Self::Recent,
            "SEEN" => Self::Seen,
            "SENTBEFORE" => Self::SentBefore,
            "SENTON" => Self::SentOn,
            "SENTSINCE" => Self::SentSince,
            "SINCE" => Self::Since,
            "SMALLER" => Self::Smaller,
            "SUBJECT" => Self::Subject,
            "TEXT" => Self::Text,
            "TO" => Self::To,
            "UID" => Self::Uid,
            "UNANSWERED" => Self::Unanswered,
            "UNDELETED" => Self::Undeleted,
            "UNDRAFT" => Self::Undraft,
            "UNFLAGGED" => Self::Unflagged,
            "UNKEYWORD" => Self::Unkeyword,
            "UNSEEN" => Self::Unseen,
            _ => return None,
        })
    }

    /// Returns the token emitted for this field.
    ///
    /// `OLDERTHAN` is sugar: it emits `BEFORE` with a computed date.
    const fn tag(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::Answered => "ANSWERED",
            Self::Bcc => "BCC",
            Self::Before | Self::OlderThan => "BEFORE",
            Self::Body => "BODY",
            Self::Cc => "CC",
            Self::Deleted => "DELETED",
            Self::Draft => "DRAFT",
            Self::Flagged => "FLAGGED",
            Self::From => "FROM",
            Self::Header => "HEADER",
            Self::Keyword => "KEYWORD",
            Self::Larger => "LARGER",
            Self::Msg => "MSG",
            Self::New => "NEW",
            Self::Not => "NOT",
            Self::Old => "OLD",
            Self::On => "ON",
            Self::Or => "OR",
            Self::Recent => "RECENT",
            Self::Seen => "SEEN",
            Self::SentBefore => "SENTBEFORE",
            Self::SentOn => "SENTON",
            Self::SentSince => "SENTSINCE",
            Self::Since => "SINCE",
            Self::Smaller => "SMALLER",
            Self::Subject => "SUBJECT",
            Self::Text => "TEXT",
            Self::To => "TO",
            Self::Uid => "UID",
            Self::Unanswered => "UNANSWERED",
            Self::Undeleted => "UNDELETED",
            Self::Undraft => "UNDRAFT",
            Self::Unflagged => "UNFLAGGED",
            Self::Unkeyword => "UNKEYWORD",
            Self::Unseen => "UNSEEN",
        }
    }

    /// Returns how this field's arguments are handled.
    const fn kind(self) -> Kind {
        match self {
            Self::All
            | Self::Answered
            | Self::Deleted
            | Self::Draft
            | Self::Flagged
            | Self::New
            | Self::Old
            | Self::Recent
            | Self::Seen
            | Self::Unanswered
            | Self::Undeleted
            | Self::Undraft
            | Self::Unflagged
            | Self::Unseen => Kind::Flag,
            Self::Bcc
            | Self::Body
            | Self::Cc
            | Self::From
            | Self::Keyword
            | Self::Subject
            | Self::Text
            | Self::To
            | Self::Unkeyword => Kind::Text,
            Self::Before | Self::On | Self::SentBefore | Self::SentOn | Self::SentSince
            | Self::Since => Kind::Date,
            Self::Header => Kind::Header,
            Self::Larger | Self::Smaller => Kind::Number,
            Self::Msg => Kind::NumberList,
            Self::Not => Kind::Not,
            Self::OlderThan => Kind::Age,
            Self::Or => Kind::Or,
            Self::Uid => Kind::UidSet,
        }
    }
}

/// Compiles one precondition into the collector.
///
/// `now` anchors relative durations; the caller stamps it once per run so
/// every rule resolves against the same instant.
pub fn compile(
    node: &Precondition,
    collector: &mut impl TokenCollector,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    let Some(field) = Field::parse(&node.field) else {
        return Err(Error::UnknownField { field: node.field.clone(), location: node.location });
    };

    match field.kind() {
        Kind::Flag => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 0)?;
        }
        Kind::Text => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 1)?;
            collector.append(decode_string(&node.values[0])?);
        }
        Kind::Header => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 2)?;
            collector.append(decode_string(&node.values[0])?);
            collector.append(decode_string(&node.values[1])?);
        }
        Kind::Number => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 1)?;
            collector.append(decode_number(&node.values[0])?);
        }
        Kind::Date => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 1)?;
            let date = decode_date(&node.values[0])?;
            collector.append(date.format(DATE_LAYOUT).to_string());
        }
        Kind::Age => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 1)?;
            let age = decode_duration(&node.values[0])?;
            collector.append((now - age).format(DATE_LAYOUT).to_string());
        }
        Kind::NumberList => {
            for value in &node.values {
                collector.append(decode_number(value)?);
            }
        }
        Kind::UidSet => {
            collector.append("(".to_owned());
            collector.append(field.tag().to_owned());
            for value in &node.values {
                collector.append(decode_string(value)?);
            }
            collector.append(")".to_owned());
        }
        Kind::Not => {
            collector.append(field.tag().to_owned());
            expect_arity(node, 1)?;
            compile(decode_nested(&node.values[0])?, collector, now)?;
        }
        Kind::Or => {
            if let Some((last, rest)) = node.values.split_last() {
                let mut failures = Vec::new();
                for value in rest {
                    collector.append(field.tag().to_owned());
                    if let Err(error) = compile_operand(value, collector, now) {
                        failures.push(error);
                    }
                }
                if let Err(error) = compile_operand(last, collector, now) {
                    failures.push(error);
                }
                return gather(failures);
            }
        }
    }

    Ok(())
}

/// Compiles one OR operand.
fn compile_operand(
    value: &ValueNode,
    collector: &mut impl TokenCollector,
    now: DateTime<Utc>,
) -> Result<(), Error> {
    compile(decode_nested(value)?, collector, now)
}

/// Folds gathered operand failures back into a single result.
fn gather(mut failures: Vec<Error>) -> Result<(), Error> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(Error::Multiple(failures)),
    }
}

/// Checks the declared argument count against the field's fixed arity.
fn expect_arity(node: &Precondition, expected: usize) -> Result<(), Error> {
    let actual = node.values.len();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::ArityMismatch {
            field: node.field.clone(),
            expected,
            actual,
            location: node.location,
        })
    }
}

/// Decodes a string argument, taken verbatim.
fn decode_string(value: &ValueNode) -> Result<String, Error> {
    match &value.value {
        Value::Scalar(text) => Ok(text.clone()),
        Value::Nested(_) => Err(Error::ExpectedScalar { location: value.location }),
    }
}

/// Decodes an unsigned decimal number, re-emitted in canonical form.
fn decode_number(value: &ValueNode) -> Result<String, Error> {
    match &value.value {
        Value::Scalar(text) => text
            .parse::<u32>()
            .map(|number| number.to_string())
            .map_err(|source| Error::InvalidNumber {
                value: text.clone(),
                source,
                location: value.location,
            }),
        Value::Nested(_) => Err(Error::ExpectedScalar { location: value.location }),
    }
}

/// Decodes an absolute date, `YYYY-MM-DD` or RFC 3339.
fn decode_date(value: &ValueNode) -> Result<NaiveDate, Error> {
    let Value::Scalar(text) = &value.value else {
        return Err(Error::ExpectedScalar { location: value.location });
    };
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(text).map(|instant| instant.date_naive()))
        .map_err(|_| Error::InvalidDate { value: text.clone(), location: value.location })
}

/// Decodes a relative duration such as `36h`, `1.5h` or `2d12h`.
fn decode_duration(value: &ValueNode) -> Result<Duration, Error> {
    let Value::Scalar(text) = &value.value else {
        return Err(Error::ExpectedScalar { location: value.location });
    };
    parse_duration(text)
        .ok_or_else(|| Error::InvalidDuration { value: text.clone(), location: value.location })
}

/// Expects a nested precondition under a combinator.
fn decode_nested(value: &ValueNode) -> Result<&Precondition, Error> {
    match &value.value {
        Value::Nested(nested) => Ok(nested),
        Value::Scalar(_) => Err(Error::ExpectedPrecondition { location: value.location }),
    }
}

/// Parses `<number><unit>` segments into a duration.
///
/// Units are `s`, `m`, `h` and `d`; numbers may be fractional; segments
/// concatenate (`2d12h`).
fn parse_duration(text: &str) -> Option<Duration> {
    let mut rest = text.trim();
    if rest.is_empty() {
        return None;
    }

    let mut seconds = 0_f64;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let value: f64 = number.parse().ok()?;

        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);
        let factor = match unit {
            "s" => 1_f64,
            "m" => 60_f64,
            "h" => 3600_f64,
            "d" => 86400_f64,
            _ => return None,
        };

        seconds += value * factor;
        rest = tail;
    }

    #[expect(clippy::cast_possible_truncation, reason = "bounded by the parse above")]
    let whole_seconds = seconds.round() as i64;
    Some(Duration::seconds(whole_seconds))
}

/// Errors that may occur while compiling a precondition.
#[derive(Debug)]
pub enum Error {
    /// A field was given the wrong number of arguments.
    ArityMismatch {
        /// The field, as spelled in the document.
        field: String,
        /// Arguments the field requires.
        expected: usize,
        /// Arguments the document declared.
        actual: usize,
        /// Position of the precondition.
        location: Location,
    },
    /// A combinator argument is a plain scalar.
    ExpectedPrecondition {
        /// Position of the argument.
        location: Location,
    },
    /// A scalar argument is a nested precondition.
    ExpectedScalar {
        /// Position of the argument.
        location: Location,
    },
    /// An absolute date argument did not parse.
    InvalidDate {
        /// The raw text.
        value: String,
        /// Position of the argument.
        location: Location,
    },
    /// A relative duration argument did not parse.
    InvalidDuration {
        /// The raw text.
        value: String,
        /// Position of the argument.
        location: Location,
    },
    /// A numeric argument did not parse.
    InvalidNumber {
        /// The raw text.
        value: String,
        /// The parse failure.
        source: ParseIntError,
        /// Position of the argument.
        location: Location,
    },
    /// Several operand failures gathered under one OR.
    Multiple(Vec<Error>),
    /// The field tag is not recognized.
    UnknownField {
        /// The tag, as spelled in the document.
        field: String,
        /// Position of the precondition.
        location: Location,
    },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ArityMismatch { field, expected, actual, location } => write!(
                f,
                "{location}: search field {field} takes {expected} arguments, {actual} given"
            ),
            Self::ExpectedPrecondition { location } => {
                write!(f, "{location}: expected a nested precondition")
            }
            Self::ExpectedScalar { location } => write!(f, "{location}: expected a scalar value"),
            Self::InvalidDate { value, location } => {
                write!(f, "{location}: invalid date {value}")
            }
            Self::InvalidDuration { value, location } => {
                write!(f, "{location}: invalid duration {value}")
            }
            Self::InvalidNumber { value, source, location } => {
                write!(f, "{location}: invalid number {value}: {source}")
            }
            Self::Multiple(errors) => {
                let mut first = true;
                for error in errors {
                    if !first {
                        writeln!(f)?;
                    }
                    first = false;
                    write!(f, "{error}")?;
                }
                Ok(())
            }
            Self::UnknownField { field, location } => {
                write!(f, "{location}: unknown search field {field}")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{DateTime, TimeZone as _, Utc};

    use super::{Error, compile, parse_duration};
    use crate::document::{Location, Precondition, Value, ValueNode};

    /// All fields that take no argument.
    const FLAG_FIELDS: &[&str] = &[
        "ALL",
        "ANSWERED",
        "DELETED",
        "DRAFT",
        "FLAGGED",
        "NEW",
        "OLD",
        "RECENT",
        "SEEN",
        "UNANSWERED",
        "UNDELETED",
        "UNDRAFT",
        "UNFLAGGED",
        "UNSEEN",
    ];

    fn node(field: &str, values: Vec<ValueNode>) -> Precondition {
        Precondition { field: field.to_owned(), values, location: Location::new(4, 7) }
    }

    fn scalar(text: &str) -> ValueNode {
        ValueNode { value: Value::Scalar(text.to_owned()), location: Location::new(5, 9) }
    }

    fn nested(precondition: Precondition) -> ValueNode {
        ValueNode { value: Value::Nested(precondition), location: Location::new(5, 9) }
    }

    #[expect(clippy::unwrap_used, reason = "test")]
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn tokens(precondition: &Precondition) -> Result<Vec<String>, Error> {
        let mut collected = Vec::new();
        compile(precondition, &mut collected, fixed_now())?;
        Ok(collected)
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn bcc_with_one_string() {
        assert_eq!(tokens(&node("BCC", vec![scalar("x")])).unwrap(), ["BCC", "x"]);
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn flag_fields_take_no_argument() {
        for field in FLAG_FIELDS {
            assert_eq!(tokens(&node(field, Vec::new())).unwrap(), [*field]);

            match tokens(&node(field, vec![scalar("x")])) {
                Err(Error::ArityMismatch { field: reported, expected: 0, actual: 1, .. }) => {
                    assert_eq!(reported, *field);
                }
                other => panic!("expected an arity mismatch for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_field_is_reported() {
        assert!(matches!(
            tokens(&node("FOO", Vec::new())),
            Err(Error::UnknownField { field, .. }) if field == "FOO"
        ));
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn or_folds_left() {
        let or = node(
            "OR",
            vec![
                nested(node("FROM", vec![scalar("a")])),
                nested(node("TO", vec![scalar("b")])),
                nested(node("SEEN", Vec::new())),
            ],
        );
        assert_eq!(tokens(&or).unwrap(), ["OR", "FROM", "a", "OR", "TO", "b", "SEEN"]);
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn or_with_one_operand_is_transparent() {
        let or = node("OR", vec![nested(node("FROM", vec![scalar("a")]))]);
        assert_eq!(tokens(&or).unwrap(), ["FROM", "a"]);
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn or_with_no_operand_emits_nothing() {
        assert!(tokens(&node("OR", Vec::new())).unwrap().is_empty());
    }

    #[test]
    fn or_gathers_operand_failures() {
        let or = node("OR", vec![scalar("a"), scalar("b")]);
        match tokens(&or) {
            Err(Error::Multiple(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors
                    .iter()
                    .all(|error| matches!(error, Error::ExpectedPrecondition { .. })));
            }
            other => panic!("expected gathered failures, got {other:?}"),
        }
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn not_requires_exactly_one_operand() {
        assert!(matches!(
            tokens(&node("NOT", Vec::new())),
            Err(Error::ArityMismatch { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            tokens(&node(
                "NOT",
                vec![nested(node("SEEN", Vec::new())), nested(node("OLD", Vec::new()))]
            )),
            Err(Error::ArityMismatch { expected: 1, actual: 2, .. })
        ));
        assert_eq!(
            tokens(&node("NOT", vec![nested(node("SEEN", Vec::new()))])).unwrap(),
            ["NOT", "SEEN"]
        );
    }

    #[test]
    fn not_rejects_a_scalar_operand() {
        assert!(matches!(
            tokens(&node("NOT", vec![scalar("SEEN")])),
            Err(Error::ExpectedPrecondition { .. })
        ));
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn header_takes_two_strings_in_order() {
        let header = node("HEADER", vec![scalar("List-Id"), scalar("announce")]);
        assert_eq!(tokens(&header).unwrap(), ["HEADER", "List-Id", "announce"]);
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn msg_emits_numbers_without_a_tag() {
        let msg = node("MSG", vec![scalar("3"), scalar("007"), scalar("12")]);
        assert_eq!(tokens(&msg).unwrap(), ["3", "7", "12"]);
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn uid_wraps_its_arguments_in_delimiters() {
        let uid = node("UID", vec![scalar("1:100"), scalar("200")]);
        assert_eq!(tokens(&uid).unwrap(), ["(", "UID", "1:100", "200", ")"]);
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn numbers_decode_or_fail() {
        assert_eq!(tokens(&node("LARGER", vec![scalar("2048")])).unwrap(), ["LARGER", "2048"]);
        assert!(matches!(
            tokens(&node("SMALLER", vec![scalar("big")])),
            Err(Error::InvalidNumber { value, .. }) if value == "big"
        ));
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn dates_decode_or_fail() {
        assert_eq!(
            tokens(&node("BEFORE", vec![scalar("2024-01-02")])).unwrap(),
            ["BEFORE", "02-Jan-2024"]
        );
        assert_eq!(
            tokens(&node("SENTSINCE", vec![scalar("2023-11-20T14:22:01-08:00")])).unwrap(),
            ["SENTSINCE", "20-Nov-2023"]
        );
        assert!(matches!(
            tokens(&node("ON", vec![scalar("yesterday")])),
            Err(Error::InvalidDate { value, .. }) if value == "yesterday"
        ));
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn olderthan_matches_the_equivalent_absolute_date() {
        // 36h before 2024-03-10T12:00:00Z is 2024-03-09T00:00:00Z.
        let relative = tokens(&node("OLDERTHAN", vec![scalar("36h")])).unwrap();
        let absolute = tokens(&node("BEFORE", vec![scalar("2024-03-09")])).unwrap();
        assert_eq!(relative, absolute);
        assert_eq!(relative, ["BEFORE", "09-Mar-2024"]);
    }

    #[test]
    fn bad_durations_are_reported() {
        assert!(matches!(
            tokens(&node("OLDERTHAN", vec![scalar("soon")])),
            Err(Error::InvalidDuration { value, .. }) if value == "soon"
        ));
    }

    #[test]
    #[expect(clippy::unwrap_used, reason = "test")]
    fn durations_parse_segments_and_fractions() {
        assert_eq!(parse_duration("36h").unwrap().num_seconds(), 36 * 3600);
        assert_eq!(parse_duration("1.5h").unwrap().num_seconds(), 5400);
        assert_eq!(parse_duration("2d12h").unwrap().num_seconds(), 216_000);
        assert_eq!(parse_duration("90s").unwrap().num_seconds(), 90);
        assert!(parse_duration("").is_none());
        assert!(parse_duration("12").is_none());
        assert!(parse_duration("12y").is_none());
    }
}
