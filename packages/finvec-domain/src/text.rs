//! Canonical text representation of a transaction.
//!
//! The string produced here is what the embedding provider sees. It must stay byte-stable for
//! identical inputs, so nothing in this module reads clocks, locales, or the environment.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

pub const UNCATEGORIZED: &str = "uncategorized";
pub const NO_DESCRIPTION: &str = "no description";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	Income,
	Expense,
	Transfer,
}
impl Direction {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Income => "income",
			Self::Expense => "expense",
			Self::Transfer => "transfer",
		}
	}

	pub fn label(self) -> &'static str {
		match self {
			Self::Income => "Income",
			Self::Expense => "Expense",
			Self::Transfer => "Transfer",
		}
	}
}

impl fmt::Display for Direction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Direction {
	type Err = ParseDirectionError;

	fn from_str(raw: &str) -> Result<Self, Self::Err> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"income" => Ok(Self::Income),
			"expense" => Ok(Self::Expense),
			"transfer" => Ok(Self::Transfer),
			_ => Err(ParseDirectionError { value: raw.to_string() }),
		}
	}
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown transaction direction {value:?}.")]
pub struct ParseDirectionError {
	pub value: String,
}

pub fn build(
	description: &str,
	category: Option<&str>,
	amount_minor: i64,
	direction: Direction,
) -> String {
	let description = normalize_whitespace(description);
	let description =
		if description.is_empty() { NO_DESCRIPTION.to_string() } else { description };
	let category = category
		.map(normalize_whitespace)
		.filter(|value| !value.is_empty())
		.unwrap_or_else(|| UNCATEGORIZED.to_string());

	format!(
		"Transaction: {description}. Category: {category}. Amount: {}. Type: {}.",
		format_major_units(amount_minor),
		direction.label(),
	)
}

/// Absolute value of a minor-unit amount, rendered with two decimals.
pub fn format_major_units(amount_minor: i64) -> String {
	let magnitude = amount_minor.unsigned_abs();

	format!("{}.{:02}", magnitude / 100, magnitude % 100)
}

fn normalize_whitespace(text: &str) -> String {
	text.split_whitespace().collect::<Vec<_>>().join(" ")
}
