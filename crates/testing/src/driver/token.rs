// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

use crate::driver::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	// Keywords
	Keyword(Keyword),
	// Identifiers
	Ident(String),
	QuotedIdent(String),
	// Literals
	Integer(i64),
	Float(f64),
	StringLit(String),
	// $n
	Placeholder(usize),
	// Operators & punctuation
	Asterisk,   // *
	Comma,      // ,
	Dot,        // .
	Semicolon,  // ;
	OpenParen,  // (
	CloseParen, // )
	Plus,       // +
	Minus,      // -
	Slash,      // /
	Percent,    // %
	Eq,         // =
	NotEq,      // <> or !=
	Lt,         // <
	Gt,         // >
	LtEq,       // <=
	GtEq,       // >=
	Cast,       // ::
	Concat,     // ||
	Arrow,      // ->
	LongArrow,  // ->>
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Keyword {
	Select,
	From,
	Where,
	And,
	Or,
	Not,
	As,
	Order,
	By,
	Asc,
	Desc,
	Limit,
	Offset,
	For,
	Insert,
	Into,
	Values,
	Update,
	Set,
	Delete,
	Create,
	Drop,
	Alter,
	Table,
	Index,
	Unique,
	Unlogged,
	Logged,
	If,
	Exists,
	On,
	Conflict,
	Do,
	Nothing,
	Excluded,
	Returning,
	Primary,
	Key,
	Null,
	True,
	False,
	Is,
	In,
}

pub fn tokenize(sql: &str) -> Result<Vec<Token>, SyntaxError> {
	let mut tokens = Vec::new();
	let chars: Vec<char> = sql.chars().collect();
	let len = chars.len();
	let mut i = 0;

	while i < len {
		let c = chars[i];

		// Skip whitespace
		if c.is_ascii_whitespace() {
			i += 1;
			continue;
		}

		// Skip line comments (-- ...)
		if c == '-' && i + 1 < len && chars[i + 1] == '-' {
			while i < len && chars[i] != '\n' {
				i += 1;
			}
			continue;
		}

		// Operators and punctuation
		let (token, width) = match c {
			'*' => (Some(Token::Asterisk), 1),
			',' => (Some(Token::Comma), 1),
			'.' => (Some(Token::Dot), 1),
			';' => (Some(Token::Semicolon), 1),
			'(' => (Some(Token::OpenParen), 1),
			')' => (Some(Token::CloseParen), 1),
			'+' => (Some(Token::Plus), 1),
			'/' => (Some(Token::Slash), 1),
			'%' => (Some(Token::Percent), 1),
			'=' => (Some(Token::Eq), 1),
			'-' => match (chars.get(i + 1), chars.get(i + 2)) {
				(Some('>'), Some('>')) => (Some(Token::LongArrow), 3),
				(Some('>'), _) => (Some(Token::Arrow), 2),
				_ => (Some(Token::Minus), 1),
			},
			':' => match chars.get(i + 1) {
				Some(':') => (Some(Token::Cast), 2),
				_ => return Err(SyntaxError(format!("unexpected character ':' at position {i}"))),
			},
			'|' => match chars.get(i + 1) {
				Some('|') => (Some(Token::Concat), 2),
				_ => return Err(SyntaxError(format!("unexpected character '|' at position {i}"))),
			},
			'<' => match chars.get(i + 1) {
				Some('=') => (Some(Token::LtEq), 2),
				Some('>') => (Some(Token::NotEq), 2),
				_ => (Some(Token::Lt), 1),
			},
			'>' => match chars.get(i + 1) {
				Some('=') => (Some(Token::GtEq), 2),
				_ => (Some(Token::Gt), 1),
			},
			'!' => match chars.get(i + 1) {
				Some('=') => (Some(Token::NotEq), 2),
				_ => return Err(SyntaxError(format!("unexpected character '!' at position {i}"))),
			},
			_ => (None, 0),
		};
		if let Some(token) = token {
			tokens.push(token);
			i += width;
			continue;
		}

		// String literals and quoted identifiers; the quote doubles as its own escape
		if c == '\'' || c == '"' {
			i += 1;
			let mut s = String::new();
			while i < len {
				if chars[i] == c {
					if i + 1 < len && chars[i + 1] == c {
						s.push(c);
						i += 2;
					} else {
						break;
					}
				} else {
					s.push(chars[i]);
					i += 1;
				}
			}
			if i >= len {
				return Err(SyntaxError(if c == '\'' {
					"unterminated string literal".into()
				} else {
					"unterminated quoted identifier".into()
				}));
			}
			i += 1; // skip closing quote
			tokens.push(if c == '\'' {
				Token::StringLit(s)
			} else {
				Token::QuotedIdent(s)
			});
			continue;
		}

		// Placeholders
		if c == '$' {
			let start = i + 1;
			i = start;
			while i < len && chars[i].is_ascii_digit() {
				i += 1;
			}
			let text: String = chars[start..i].iter().collect();
			let n: usize = text.parse().map_err(|e| SyntaxError(format!("invalid placeholder '${text}': {e}")))?;
			if n == 0 {
				return Err(SyntaxError("placeholders start at $1".into()));
			}
			tokens.push(Token::Placeholder(n));
			continue;
		}

		// Numeric literals
		if c.is_ascii_digit() {
			let start = i;
			while i < len && chars[i].is_ascii_digit() {
				i += 1;
			}
			if i < len && chars[i] == '.' && i + 1 < len && chars[i + 1].is_ascii_digit() {
				i += 1; // skip dot
				while i < len && chars[i].is_ascii_digit() {
					i += 1;
				}
				let text: String = chars[start..i].iter().collect();
				let f: f64 = text.parse().map_err(|e| SyntaxError(format!("invalid float: {e}")))?;
				tokens.push(Token::Float(f));
			} else {
				let text: String = chars[start..i].iter().collect();
				let n: i64 = text.parse().map_err(|e| SyntaxError(format!("invalid integer: {e}")))?;
				tokens.push(Token::Integer(n));
			}
			continue;
		}

		// Identifiers and keywords
		if c.is_ascii_alphabetic() || c == '_' {
			let start = i;
			while i < len && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
				i += 1;
			}
			let word: String = chars[start..i].iter().collect();
			let upper = word.to_ascii_uppercase();
			let token = match upper.as_str() {
				"SELECT" => Token::Keyword(Keyword::Select),
				"FROM" => Token::Keyword(Keyword::From),
				"WHERE" => Token::Keyword(Keyword::Where),
				"AND" => Token::Keyword(Keyword::And),
				"OR" => Token::Keyword(Keyword::Or),
				"NOT" => Token::Keyword(Keyword::Not),
				"AS" => Token::Keyword(Keyword::As),
				"ORDER" => Token::Keyword(Keyword::Order),
				"BY" => Token::Keyword(Keyword::By),
				"ASC" => Token::Keyword(Keyword::Asc),
				"DESC" => Token::Keyword(Keyword::Desc),
				"LIMIT" => Token::Keyword(Keyword::Limit),
				"OFFSET" => Token::Keyword(Keyword::Offset),
				"FOR" => Token::Keyword(Keyword::For),
				"INSERT" => Token::Keyword(Keyword::Insert),
				"INTO" => Token::Keyword(Keyword::Into),
				"VALUES" => Token::Keyword(Keyword::Values),
				"UPDATE" => Token::Keyword(Keyword::Update),
				"SET" => Token::Keyword(Keyword::Set),
				"DELETE" => Token::Keyword(Keyword::Delete),
				"CREATE" => Token::Keyword(Keyword::Create),
				"DROP" => Token::Keyword(Keyword::Drop),
				"ALTER" => Token::Keyword(Keyword::Alter),
				"TABLE" => Token::Keyword(Keyword::Table),
				"INDEX" => Token::Keyword(Keyword::Index),
				"UNIQUE" => Token::Keyword(Keyword::Unique),
				"UNLOGGED" => Token::Keyword(Keyword::Unlogged),
				"LOGGED" => Token::Keyword(Keyword::Logged),
				"IF" => Token::Keyword(Keyword::If),
				"EXISTS" => Token::Keyword(Keyword::Exists),
				"ON" => Token::Keyword(Keyword::On),
				"CONFLICT" => Token::Keyword(Keyword::Conflict),
				"DO" => Token::Keyword(Keyword::Do),
				"NOTHING" => Token::Keyword(Keyword::Nothing),
				"EXCLUDED" => Token::Keyword(Keyword::Excluded),
				"RETURNING" => Token::Keyword(Keyword::Returning),
				"PRIMARY" => Token::Keyword(Keyword::Primary),
				"KEY" => Token::Keyword(Keyword::Key),
				"NULL" => Token::Keyword(Keyword::Null),
				"TRUE" => Token::Keyword(Keyword::True),
				"FALSE" => Token::Keyword(Keyword::False),
				"IS" => Token::Keyword(Keyword::Is),
				"IN" => Token::Keyword(Keyword::In),
				_ => Token::Ident(word),
			};
			tokens.push(token);
			continue;
		}

		return Err(SyntaxError(format!("unexpected character '{c}' at position {i}")));
	}

	Ok(tokens)
}
