//! Node address lists.
//!
//! A node is known by one or more addresses. The first one is the primary
//! address and serves as the node's external identity across snapshots;
//! the rest are local (alias) addresses.
//!
//! Raw input may separate addresses with commas, semicolons or whitespace.
//! The stored field form is semicolon-joined with a trailing delimiter:
//!
//! ```text
//! "192.168.0.1;  10.0.0.1,10.0.0.2;10.0.0.3"
//!   -> "192.168.0.1; 10.0.0.1; 10.0.0.2; 10.0.0.3;"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use super::validation::ValidationError;

/// Ordered, deduplicated list of node addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressList(Vec<String>);

fn is_delimiter(c: char) -> bool {
    c == ',' || c == ';' || c.is_whitespace()
}

/// True when `address` is one non-empty token with no delimiter or control
/// characters.
pub fn is_single_address(address: &str) -> bool {
    !address.is_empty() && !address.chars().any(|c| is_delimiter(c) || c.is_control())
}

impl AddressList {
    /// Parse a raw address field.
    pub fn parse(input: &str) -> Self {
        Self::from_iter_dedup(input.split(is_delimiter))
    }

    /// Build from a primary address followed by local addresses.
    ///
    /// Each part is itself parsed, so a part carrying several addresses
    /// is split rather than stored verbatim.
    pub fn from_parts<I, A>(primary: &str, locals: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut parts: Vec<String> = primary.split(is_delimiter).map(str::to_string).collect();
        for local in locals {
            parts.extend(local.as_ref().split(is_delimiter).map(str::to_string));
        }
        Self::from_iter_dedup(parts.iter().map(String::as_str))
    }

    fn from_iter_dedup<'a>(parts: impl Iterator<Item = &'a str>) -> Self {
        let mut out: Vec<String> = Vec::new();
        for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
            if !out.iter().any(|existing| existing == part) {
                out.push(part.to_string());
            }
        }
        Self(out)
    }

    /// Primary (canonical) address.
    pub fn primary(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Addresses beyond the primary one.
    pub fn local_addresses(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// All addresses in order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Iterate over all addresses.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Exact match against any address.
    pub fn contains(&self, address: &str) -> bool {
        self.0.iter().any(|a| a == address)
    }

    /// Number of addresses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no address is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stored field form: `"a; b; c;"`.
    pub fn to_field(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        format!("{};", self.0.join("; "))
    }

    /// Check the list is non-empty and every address is a single clean token.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            return Err(ValidationError::EmptyAddresses);
        }
        for address in &self.0 {
            if !is_single_address(address) {
                return Err(ValidationError::MalformedAddress(address.clone()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for AddressList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field())
    }
}
