//! Purpose: Parse, validate, and render structured document ids.
//! Exports: `DocumentId`, `IdOption`.
//! Role: Typed key for every decoded feed operation.
//! Invariants: Number and group are mutually exclusive by construction (`IdOption`).
//! Invariants: The user-specific part is the verbatim remainder after the fourth `:`.
//! Invariants: `Display` renders the canonical form accepted back by `parse`.
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::core::error::{Error, ErrorKind};

const SCHEME: &str = "id:";

/// Location modifier carried in the options field of an id.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum IdOption {
    #[default]
    None,
    Number(i64),
    Group(String),
}

/// A document id of the form `id:<namespace>:<type>:<options>:<user-specific>`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct DocumentId {
    namespace: String,
    doc_type: String,
    option: IdOption,
    user_specific: String,
}

fn invalid(literal: &str, rule: &str) -> Error {
    Error::new(ErrorKind::Identifier)
        .with_literal(literal)
        .with_message(rule)
}

impl DocumentId {
    pub fn new(
        namespace: impl Into<String>,
        doc_type: impl Into<String>,
        user_specific: impl Into<String>,
    ) -> Result<Self, Error> {
        let id = Self {
            namespace: namespace.into(),
            doc_type: doc_type.into(),
            option: IdOption::None,
            user_specific: user_specific.into(),
        };
        id.validate()?;
        Ok(id)
    }

    pub fn with_number(mut self, number: i64) -> Self {
        self.option = IdOption::Number(number);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Result<Self, Error> {
        let group = group.into();
        if group.is_empty() {
            return Err(invalid(&self.to_string(), "group must be non-empty"));
        }
        self.option = IdOption::Group(group);
        Ok(self)
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid(s, "must start with \"id:\""))?;
        let mut parts = rest.splitn(4, ':');
        let (Some(namespace), Some(doc_type), Some(options), Some(user_specific)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid(
                s,
                "expected id:<namespace>:<type>:<options>:<user-specific>",
            ));
        };
        let option = parse_option(s, options)?;
        let id = Self {
            namespace: namespace.to_string(),
            doc_type: doc_type.to_string(),
            option,
            user_specific: user_specific.to_string(),
        };
        id.validate().map_err(|err| err.with_literal(s))?;
        Ok(id)
    }

    fn validate(&self) -> Result<(), Error> {
        let rule = if self.namespace.is_empty() {
            "namespace must be non-empty"
        } else if self.doc_type.is_empty() {
            "document type must be non-empty"
        } else if self.user_specific.is_empty() {
            "user-specific part must be non-empty"
        } else if self.namespace.contains(':') || self.doc_type.contains(':') {
            "namespace and document type must not contain ':'"
        } else {
            return Ok(());
        };
        Err(Error::new(ErrorKind::Identifier)
            .with_literal(self.to_string())
            .with_message(rule))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn option(&self) -> &IdOption {
        &self.option
    }

    pub fn number(&self) -> Option<i64> {
        match self.option {
            IdOption::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<&str> {
        match &self.option {
            IdOption::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn user_specific(&self) -> &str {
        &self.user_specific
    }
}

fn parse_option(literal: &str, options: &str) -> Result<IdOption, Error> {
    if options.is_empty() {
        return Ok(IdOption::None);
    }
    if let Some(number) = options.strip_prefix("n=") {
        if number.is_empty() {
            return Err(invalid(literal, "number option n= must have a value"));
        }
        return number
            .parse::<i64>()
            .map(IdOption::Number)
            .map_err(|err| {
                invalid(literal, "number option n= must be a signed 64-bit integer")
                    .with_source(err)
            });
    }
    if let Some(group) = options.strip_prefix("g=") {
        if group.is_empty() {
            return Err(invalid(literal, "group option g= must have a value"));
        }
        return Ok(IdOption::Group(group.to_string()));
    }
    Err(invalid(
        literal,
        "options must be empty, n=<number>, or g=<group>",
    ))
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}:", self.namespace, self.doc_type)?;
        match &self.option {
            IdOption::None => {}
            IdOption::Number(n) => write!(f, "n={n}")?,
            IdOption::Group(g) => write!(f, "g={g}")?,
        }
        write!(f, ":{}", self.user_specific)
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let literal = String::deserialize(deserializer)?;
        Self::parse(&literal).map_err(de::Error::custom)
    }
}
