//! The closed record model.
//!
//! Every record kind the system tracks is a variant of [`Record`], with an
//! explicit projection of its synchronizable fields. The projection is what
//! conflict detection hashes; it deliberately excludes generated fields
//! (storage timestamps, rendered output) so that re-rendering a page never
//! looks like an edit.

use crate::RecordId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The kind tag of a tracked record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKind {
    Entry,
    Event,
    Person,
    Location,
    Thread,
}

impl RecordKind {
    /// Returns the canonical string tag for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Entry => "Entry",
            RecordKind::Event => "Event",
            RecordKind::Person => "Person",
            RecordKind::Location => "Location",
            RecordKind::Thread => "Thread",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Entry" => Ok(RecordKind::Entry),
            "Event" => Ok(RecordKind::Event),
            "Person" => Ok(RecordKind::Person),
            "Location" => Ok(RecordKind::Location),
            "Thread" => Ok(RecordKind::Thread),
            other => Err(crate::Error::UnknownKind(other.to_string())),
        }
    }
}

/// A reference from one record to another, by kind and id.
///
/// Associations are materialized as link rows in the relational store and
/// are the unit of tombstone suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Association {
    pub kind: RecordKind,
    pub id: RecordId,
}

impl Association {
    pub fn new(kind: RecordKind, id: impl Into<RecordId>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// A dated journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// The entry's date; also its identifier (one entry per day).
    pub date: NaiveDate,
    pub title: Option<String>,
    pub body: String,
    pub tags: Vec<String>,
    /// Slugs of people mentioned in the entry.
    pub people: Vec<String>,
    /// Slugs of locations mentioned in the entry.
    pub locations: Vec<String>,
}

/// A named event spanning or anchored to a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub slug: String,
    pub date: NaiveDate,
    pub name: String,
    pub description: String,
    pub people: Vec<String>,
    pub locations: Vec<String>,
}

/// A person referenced from entries and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub slug: String,
    pub name: String,
    pub aka: Vec<String>,
    pub notes: String,
}

/// A location referenced from entries and events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub slug: String,
    pub name: String,
    pub region: Option<String>,
    pub notes: String,
}

/// A narrative thread tying entries together across time.
///
/// Threads refer to entries by date literal. A referenced date may not have
/// an entry yet (threads routinely point at entries still to be written), so
/// these literals resolve through the deferred-reference protocol rather
/// than binding at import time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub slug: String,
    pub title: String,
    pub summary: String,
    /// Entry-date literals, verbatim as written in the source file.
    pub entry_refs: Vec<String>,
}

/// A tracked record: one variant per kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Record {
    Entry(EntryRecord),
    Event(EventRecord),
    Person(PersonRecord),
    Location(LocationRecord),
    Thread(ThreadRecord),
}

impl Record {
    /// Returns the record's kind tag.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Entry(_) => RecordKind::Entry,
            Record::Event(_) => RecordKind::Event,
            Record::Person(_) => RecordKind::Person,
            Record::Location(_) => RecordKind::Location,
            Record::Thread(_) => RecordKind::Thread,
        }
    }

    /// Returns the record's identifier within its kind's namespace.
    #[must_use]
    pub fn id(&self) -> RecordId {
        match self {
            Record::Entry(e) => RecordId::new(e.date.format("%Y-%m-%d").to_string()),
            Record::Event(e) => RecordId::new(e.slug.as_str()),
            Record::Person(p) => RecordId::new(p.slug.as_str()),
            Record::Location(l) => RecordId::new(l.slug.as_str()),
            Record::Thread(t) => RecordId::new(t.slug.as_str()),
        }
    }

    /// Projects the record's synchronizable fields.
    ///
    /// The projection is canonical: a `BTreeMap` keyed by field name, with
    /// list-valued fields sorted and joined, so two records with identical
    /// content project identically regardless of field or list ordering in
    /// the source file. Generated fields never appear here.
    #[must_use]
    pub fn synchronizable_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        match self {
            Record::Entry(e) => {
                fields.insert("date".into(), e.date.format("%Y-%m-%d").to_string());
                fields.insert("title".into(), e.title.clone().unwrap_or_default());
                fields.insert("body".into(), e.body.clone());
                fields.insert("tags".into(), join_sorted(&e.tags));
                fields.insert("people".into(), join_sorted(&e.people));
                fields.insert("locations".into(), join_sorted(&e.locations));
            }
            Record::Event(e) => {
                fields.insert("date".into(), e.date.format("%Y-%m-%d").to_string());
                fields.insert("name".into(), e.name.clone());
                fields.insert("description".into(), e.description.clone());
                fields.insert("people".into(), join_sorted(&e.people));
                fields.insert("locations".into(), join_sorted(&e.locations));
            }
            Record::Person(p) => {
                fields.insert("name".into(), p.name.clone());
                fields.insert("aka".into(), join_sorted(&p.aka));
                fields.insert("notes".into(), p.notes.clone());
            }
            Record::Location(l) => {
                fields.insert("name".into(), l.name.clone());
                fields.insert("region".into(), l.region.clone().unwrap_or_default());
                fields.insert("notes".into(), l.notes.clone());
            }
            Record::Thread(t) => {
                fields.insert("title".into(), t.title.clone());
                fields.insert("summary".into(), t.summary.clone());
                fields.insert("entry_refs".into(), join_sorted(&t.entry_refs));
            }
        }
        fields
    }

    /// Returns the record-to-record associations this record declares.
    #[must_use]
    pub fn associations(&self) -> Vec<Association> {
        match self {
            Record::Entry(e) => collect_associations(&e.people, &e.locations),
            Record::Event(e) => collect_associations(&e.people, &e.locations),
            _ => Vec::new(),
        }
    }

    /// Returns the forward-reference literals this record carries.
    ///
    /// Only threads hold deferred references today; the literals are entry
    /// dates, kept verbatim so resolution can be retried indefinitely.
    #[must_use]
    pub fn reference_literals(&self) -> Vec<String> {
        match self {
            Record::Thread(t) => t.entry_refs.clone(),
            _ => Vec::new(),
        }
    }

    /// Drops every association for which `keep` returns false, removing it
    /// from the underlying list fields. Kinds without associations are
    /// untouched.
    pub fn retain_associations(&mut self, keep: impl Fn(&Association) -> bool) {
        match self {
            Record::Entry(e) => {
                e.people
                    .retain(|p| keep(&Association::new(RecordKind::Person, p.as_str())));
                e.locations
                    .retain(|l| keep(&Association::new(RecordKind::Location, l.as_str())));
            }
            Record::Event(e) => {
                e.people
                    .retain(|p| keep(&Association::new(RecordKind::Person, p.as_str())));
                e.locations
                    .retain(|l| keep(&Association::new(RecordKind::Location, l.as_str())));
            }
            _ => {}
        }
    }
}

fn collect_associations(people: &[String], locations: &[String]) -> Vec<Association> {
    let mut out = Vec::with_capacity(people.len() + locations.len());
    for p in people {
        out.push(Association::new(RecordKind::Person, p.as_str()));
    }
    for l in locations {
        out.push(Association::new(RecordKind::Location, l.as_str()));
    }
    out
}

/// Joins a list field into a single canonical value. The unit separator
/// keeps values containing commas or newlines unambiguous.
fn join_sorted(values: &[String]) -> String {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join("\u{1f}")
}
