//! Movie records.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::data::patch::Patch;
use crate::data::store::Versioned;

/// Field name → message.
pub type FieldErrors = BTreeMap<&'static str, String>;

pub const MAX_TITLE_BYTES: usize = 500;
pub const MAX_GENRES: usize = 5;
pub const FIRST_YEAR: i32 = 1888;
pub const LAST_YEAR: i32 = 2100;

/// Running time in whole minutes, written as `"<n> mins"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidRuntime;

impl fmt::Display for InvalidRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid runtime format")
    }
}

impl std::error::Error for InvalidRuntime {}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = InvalidRuntime;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let minutes = s.strip_suffix(" mins").ok_or(InvalidRuntime)?;
        if minutes.is_empty() || !minutes.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InvalidRuntime);
        }
        minutes.parse().map(Runtime).map_err(|_| InvalidRuntime)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: u32,
}

impl Versioned for Movie {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }
}

impl Movie {
    /// Collects every field violation.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        if self.title.is_empty() {
            errors.insert("title", "must be provided".into());
        } else if self.title.len() > MAX_TITLE_BYTES {
            errors.insert(
                "title",
                format!("must not be more than {MAX_TITLE_BYTES} bytes long"),
            );
        }

        if !(FIRST_YEAR..=LAST_YEAR).contains(&self.year) {
            errors.insert(
                "year",
                format!("must be between {FIRST_YEAR} and {LAST_YEAR}"),
            );
        }

        if self.runtime.0 == 0 {
            errors.insert("runtime", "must be a positive integer".into());
        }

        if self.genres.is_empty() {
            errors.insert("genres", "must contain at least 1 genre".into());
        } else if self.genres.len() > MAX_GENRES {
            errors.insert(
                "genres",
                format!("must not contain more than {MAX_GENRES} genres"),
            );
        } else {
            let unique: HashSet<&str> = self.genres.iter().map(String::as_str).collect();
            if unique.len() != self.genres.len() {
                errors.insert("genres", "must not contain duplicate values".into());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Body of `POST /v1/movies`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieInput {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

impl From<MovieInput> for Movie {
    fn from(input: MovieInput) -> Self {
        Movie {
            id: 0,
            title: input.title,
            year: input.year,
            runtime: input.runtime,
            genres: input.genres,
            version: 0,
        }
    }
}

/// Body of `PATCH /v1/movies/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieUpdate {
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub year: Patch<i32>,
    #[serde(default)]
    pub runtime: Patch<Runtime>,
    #[serde(default)]
    pub genres: Patch<Vec<String>>,
}

impl MovieUpdate {
    pub fn is_empty(&self) -> bool {
        !(self.title.is_present()
            || self.year.is_present()
            || self.runtime.is_present()
            || self.genres.is_present())
    }

    pub fn apply(self, movie: &mut Movie) {
        self.title.apply_to(&mut movie.title);
        self.year.apply_to(&mut movie.year);
        self.runtime.apply_to(&mut movie.runtime);
        self.genres.apply_to(&mut movie.genres);
    }
}
