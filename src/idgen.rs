//! # Unique Identifier Generator
//!
//! Unbounded supply of fresh identifiers for a declared field type. The
//! generator owns its exclusion set: everything reserved up front plus every
//! value it has issued, so a draw never repeats within a run.

use crate::error::NetsyncError;
use crate::model::Identifier;
use rand::distr::{Alphanumeric, SampleString};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Declared type of an identifier field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    #[default]
    Integer,
    Text,
    Uuid,
    Double,
    Date,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Integer => "integer",
            FieldType::Text => "text",
            FieldType::Uuid => "uuid",
            FieldType::Double => "double",
            FieldType::Date => "date",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum Source {
    /// Next candidate; starts at 1 because 0 means "no value".
    Integer { next: i64 },
    Text { length: usize },
    Uuid,
}

/// Collision-avoiding identifier source.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    field: String,
    source: Source,
    used: HashSet<Identifier>,
    rng: StdRng,
}

impl IdGenerator {
    /// Create a generator for `field`.
    ///
    /// `text_length` only applies to text fields; `seed` makes text and
    /// uuid draws reproducible.
    pub fn new(
        field: &str,
        field_type: FieldType,
        text_length: usize,
        seed: Option<u64>,
    ) -> Result<Self, NetsyncError> {
        let source = match field_type {
            FieldType::Integer => Source::Integer { next: 1 },
            FieldType::Text if text_length == 0 => {
                return Err(NetsyncError::Config(format!(
                    "text identifiers for `{}` need a positive length",
                    field
                )))
            }
            FieldType::Text => Source::Text {
                length: text_length,
            },
            FieldType::Uuid => Source::Uuid,
            FieldType::Double | FieldType::Date => {
                return Err(NetsyncError::UnsupportedIdentifierType {
                    field: field.to_string(),
                    field_type,
                })
            }
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            field: field.to_string(),
            source,
            used: HashSet::new(),
            rng,
        })
    }

    /// Integer generator with an empty exclusion set.
    pub fn integer(field: &str) -> Self {
        Self {
            field: field.to_string(),
            source: Source::Integer { next: 1 },
            used: HashSet::new(),
            rng: StdRng::seed_from_u64(0),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Add values to the exclusion set. Missing sentinels are ignored.
    pub fn reserve<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = Identifier>,
    {
        self.used
            .extend(ids.into_iter().filter(|id| !id.is_missing()));
    }

    pub fn is_used(&self, id: &Identifier) -> bool {
        self.used.contains(id)
    }

    pub fn used_count(&self) -> usize {
        self.used.len()
    }

    /// Draw the next identifier not in the exclusion set and reserve it.
    pub fn next_id(&mut self) -> Identifier {
        loop {
            let candidate = match &mut self.source {
                Source::Integer { next } => {
                    let value = *next;
                    *next += 1;
                    Identifier::Int(value)
                }
                Source::Text { length } => {
                    Identifier::Text(Alphanumeric.sample_string(&mut self.rng, *length))
                }
                Source::Uuid => {
                    let bytes: [u8; 16] = self.rng.random();
                    Identifier::Uuid(uuid::Builder::from_random_bytes(bytes).into_uuid())
                }
            };
            if candidate.is_missing() {
                continue;
            }
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

impl Iterator for IdGenerator {
    type Item = Identifier;

    fn next(&mut self) -> Option<Identifier> {
        Some(self.next_id())
    }
}
