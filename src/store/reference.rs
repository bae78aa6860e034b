//! The opaque item reference carried by every store request.
//!
//! Wire form is `id:<uuid>` or `name:<name>`; the empty string means
//! "no reference".

use std::fmt;
use std::str::FromStr;

use crate::errors::BwStateError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reference {
    #[default]
    Empty,
    ById(String),
    ByName(String),
}

impl Reference {
    pub fn is_empty(&self) -> bool {
        matches!(self, Reference::Empty)
    }
}

impl FromStr for Reference {
    type Err = BwStateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Ok(Reference::Empty);
        }
        match raw.split_once(':') {
            Some(("id", value)) => Ok(Reference::ById(value.to_string())),
            Some(("name", value)) => Ok(Reference::ByName(value.to_string())),
            _ => Err(BwStateError::InvalidReference(raw.to_string())),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Empty => Ok(()),
            Reference::ById(id) => write!(f, "id:{id}"),
            Reference::ByName(name) => write!(f, "name:{name}"),
        }
    }
}
