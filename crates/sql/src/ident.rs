// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

/// Quotes an identifier: `users` becomes `"users"`, embedded quotes are doubled.
pub fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal: `it's` becomes `'it''s'`.
pub fn quote_literal(value: &str) -> String {
	format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_quote_ident() {
		assert_eq!(quote_ident("users"), "\"users\"");
		assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
	}

	#[test]
	fn test_quote_literal() {
		assert_eq!(quote_literal("it's"), "'it''s'");
	}
}
