//! Core types for attendance records.

use crate::error::{AttendanceError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a community (an event people attend).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommunityId(String);

/// Identifier of a person record.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

macro_rules! string_id {
    ($name:ident, $what:literal) => {
        impl $name {
            /// Parse an identifier, rejecting empty or blank input.
            pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
                let raw = raw.as_ref();
                if raw.trim().is_empty() {
                    return Err(AttendanceError::InvalidArgument(format!(
                        "{} must be a non-empty identifier",
                        $what
                    )));
                }
                Ok(Self(raw.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(CommunityId, "communityId");
string_id!(PersonId, "personId");

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// An event people can attend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
}

impl Community {
    pub fn new(id: CommunityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// Attendance record for one registrant within one community.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: PersonId,
    pub community_id: CommunityId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub check_in_date: Option<Timestamp>,
    pub check_out_date: Option<Timestamp>,
}

impl Person {
    /// Where this record sits in the attendance state machine.
    pub fn state(&self) -> AttendanceState {
        match (self.check_in_date, self.check_out_date) {
            (_, Some(_)) => AttendanceState::Departed,
            (Some(_), None) => AttendanceState::Present,
            (None, None) => AttendanceState::Unregistered,
        }
    }

    pub fn is_present(&self) -> bool {
        self.state() == AttendanceState::Present
    }

    pub fn is_departed(&self) -> bool {
        self.state() == AttendanceState::Departed
    }

    /// A check-out date requires a check-in date no later than it.
    pub fn is_consistent(&self) -> bool {
        match (self.check_in_date, self.check_out_date) {
            (_, None) => true,
            (Some(check_in), Some(check_out)) => check_out >= check_in,
            (None, Some(_)) => false,
        }
    }

    /// Apply a patch, returning the patched copy.
    pub fn patched(&self, patch: &PersonPatch) -> Person {
        let mut next = self.clone();
        if let Some(check_in) = patch.check_in_date {
            next.check_in_date = check_in;
        }
        if let Some(check_out) = patch.check_out_date {
            next.check_out_date = check_out;
        }
        next
    }
}

/// Input for provisioning a person (dates always start null).
#[derive(Clone, Debug)]
pub struct NewPerson {
    pub id: PersonId,
    pub community_id: CommunityId,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub title: Option<String>,
}

impl NewPerson {
    pub fn new(
        id: PersonId,
        community_id: CommunityId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            community_id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            company_name: None,
            title: None,
        }
    }

    pub fn with_company(mut self, company_name: impl Into<String>) -> Self {
        self.company_name = Some(company_name.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub(crate) fn into_person(self) -> Person {
        Person {
            id: self.id,
            community_id: self.community_id,
            first_name: self.first_name,
            last_name: self.last_name,
            company_name: self.company_name,
            title: self.title,
            check_in_date: None,
            check_out_date: None,
        }
    }
}

/// Partial update of the attendance fields.
///
/// `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersonPatch {
    pub check_in_date: Option<Option<Timestamp>>,
    pub check_out_date: Option<Option<Timestamp>>,
}

impl PersonPatch {
    pub fn check_in(at: Timestamp) -> Self {
        Self {
            check_in_date: Some(Some(at)),
            check_out_date: Some(None),
        }
    }

    pub fn check_out(at: Timestamp) -> Self {
        Self {
            check_in_date: None,
            check_out_date: Some(Some(at)),
        }
    }

    pub fn clear() -> Self {
        Self {
            check_in_date: Some(None),
            check_out_date: Some(None),
        }
    }
}

/// State machine position of a person.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    /// Neither date set.
    Unregistered,
    /// Checked in, not checked out.
    Present,
    /// Checked out.
    Departed,
}

/// Any record a subscriber can observe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "collection", rename_all = "snake_case")]
pub enum Record {
    Community(Community),
    Person(Person),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Community(c) => RecordKey::Community(c.id.clone()),
            Record::Person(p) => RecordKey::Person(p.id.clone()),
        }
    }

    pub fn as_person(&self) -> Option<&Person> {
        match self {
            Record::Person(p) => Some(p),
            Record::Community(_) => None,
        }
    }

    pub fn as_community(&self) -> Option<&Community> {
        match self {
            Record::Community(c) => Some(c),
            Record::Person(_) => None,
        }
    }
}

/// Stable identity of a record across collections.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "collection", content = "id", rename_all = "snake_case")]
pub enum RecordKey {
    Community(CommunityId),
    Person(PersonId),
}

/// Successful result of a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionReceipt {
    pub success: bool,
    pub timestamp: Timestamp,
}

impl TransitionReceipt {
    pub(crate) fn at(timestamp: Timestamp) -> Self {
        Self {
            success: true,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Person {
        NewPerson::new(
            PersonId::parse("P1").unwrap(),
            CommunityId::parse("C1").unwrap(),
            "Ana",
            "Lee",
        )
        .into_person()
    }

    #[test]
    fn test_blank_ids_rejected() {
        assert!(PersonId::parse("").is_err());
        assert!(PersonId::parse("   ").is_err());
        assert!(CommunityId::parse("\t").is_err());
        assert_eq!(PersonId::parse("P1").unwrap().as_str(), "P1");
    }

    #[test]
    fn test_state_machine_positions() {
        let mut p = person();
        assert_eq!(p.state(), AttendanceState::Unregistered);

        p = p.patched(&PersonPatch::check_in(Timestamp(10)));
        assert_eq!(p.state(), AttendanceState::Present);
        assert!(p.is_present());

        p = p.patched(&PersonPatch::check_out(Timestamp(20)));
        assert_eq!(p.state(), AttendanceState::Departed);
        assert_eq!(p.check_in_date, Some(Timestamp(10)));
        assert!(p.is_consistent());

        p = p.patched(&PersonPatch::clear());
        assert_eq!(p.state(), AttendanceState::Unregistered);
    }

    #[test]
    fn test_consistency() {
        let mut p = person();
        p.check_out_date = Some(Timestamp(5));
        assert!(!p.is_consistent());

        p.check_in_date = Some(Timestamp(6));
        assert!(!p.is_consistent());

        p.check_in_date = Some(Timestamp(5));
        assert!(p.is_consistent());
    }

    #[test]
    fn test_person_serializes_camel_case() {
        let p = person().patched(&PersonPatch::check_in(Timestamp(42)));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["communityId"], "C1");
        assert_eq!(json["firstName"], "Ana");
        assert_eq!(json["checkInDate"], 42);
        assert!(json["checkOutDate"].is_null());
        assert!(json.get("companyName").is_none());
    }
}
