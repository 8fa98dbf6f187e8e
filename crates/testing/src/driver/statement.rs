// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! The statement shapes the in-memory driver understands: the DDL, inserts
//! and single-table selects with equality filters that the lock store, the
//! bulk copy and plain collection calls produce.

use crate::driver::{
	SyntaxError,
	token::{Keyword, Token, tokenize},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
	CreateTable(CreateTable),
	DropTable {
		name: String,
	},
	SetLogged {
		name: String,
	},
	CreateIndex {
		table: String,
	},
	Insert(InsertInto),
	Select(SelectFrom),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
	pub name: String,
	pub columns: Vec<String>,
	pub primary_key: Vec<String>,
	pub unlogged: bool,
	pub if_not_exists: bool,
}

/// A value in a `VALUES` tuple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
	Arg(usize),
	Null,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OnConflict {
	Raise,
	Ignore,
	/// `DO UPDATE SET c = EXCLUDED.c, ...` over these columns.
	Overwrite(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Returned {
	Column(String),
	/// `(xmax = 0) AS "name"`: true for inserted rows, false for updated ones.
	Inserted(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertInto {
	pub table: String,
	pub columns: Vec<String>,
	pub rows: Vec<Vec<Operand>>,
	pub on_conflict: OnConflict,
	pub returning: Vec<Returned>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
	All,
	Count(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectFrom {
	pub table: String,
	pub projection: Projection,
	/// `"column" = $n` conditions joined by `AND`.
	pub filter: Vec<(String, usize)>,
	/// Columns and whether they sort descending.
	pub order: Vec<(String, bool)>,
	pub limit: Option<usize>,
	pub offset: Option<usize>,
}

pub fn parse(sql: &str) -> Result<Parsed, SyntaxError> {
	let mut parser = Parser {
		tokens: tokenize(sql)?,
		position: 0,
	};
	let parsed = match parser.next() {
		Some(Token::Keyword(Keyword::Create)) => parser.create()?,
		Some(Token::Keyword(Keyword::Drop)) => {
			parser.keyword(Keyword::Table)?;
			if parser.accept_keyword(Keyword::If) {
				parser.keyword(Keyword::Exists)?;
			}
			Parsed::DropTable {
				name: parser.ident()?,
			}
		}
		Some(Token::Keyword(Keyword::Alter)) => {
			parser.keyword(Keyword::Table)?;
			let name = parser.ident()?;
			parser.keyword(Keyword::Set)?;
			parser.keyword(Keyword::Logged)?;
			Parsed::SetLogged {
				name,
			}
		}
		Some(Token::Keyword(Keyword::Insert)) => Parsed::Insert(parser.insert()?),
		Some(Token::Keyword(Keyword::Select)) => Parsed::Select(parser.select()?),
		other => return Err(SyntaxError(format!("unsupported statement starting with {other:?}"))),
	};
	parser.accept(&Token::Semicolon);
	parser.end()?;
	Ok(parsed)
}

struct Parser {
	tokens: Vec<Token>,
	position: usize,
}

impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.position)
	}

	fn next(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.position).cloned();
		if token.is_some() {
			self.position += 1;
		}
		token
	}

	fn accept(&mut self, token: &Token) -> bool {
		if self.peek() == Some(token) {
			self.position += 1;
			true
		} else {
			false
		}
	}

	fn accept_keyword(&mut self, keyword: Keyword) -> bool {
		self.accept(&Token::Keyword(keyword))
	}

	fn expect(&mut self, token: Token) -> Result<(), SyntaxError> {
		match self.next() {
			Some(next) if next == token => Ok(()),
			other => Err(SyntaxError(format!("expected {token:?}, got {other:?}"))),
		}
	}

	fn keyword(&mut self, keyword: Keyword) -> Result<(), SyntaxError> {
		self.expect(Token::Keyword(keyword))
	}

	fn end(&self) -> Result<(), SyntaxError> {
		match self.peek() {
			None => Ok(()),
			Some(token) => Err(SyntaxError(format!("unsupported trailing {token:?}"))),
		}
	}

	fn ident(&mut self) -> Result<String, SyntaxError> {
		match self.next() {
			Some(Token::QuotedIdent(name)) => Ok(name),
			Some(Token::Ident(name)) => Ok(name.to_ascii_lowercase()),
			other => Err(SyntaxError(format!("expected an identifier, got {other:?}"))),
		}
	}

	fn placeholder(&mut self) -> Result<usize, SyntaxError> {
		let n = match self.next() {
			Some(Token::Placeholder(n)) => n,
			other => return Err(SyntaxError(format!("expected a placeholder, got {other:?}"))),
		};
		self.skip_cast()?;
		Ok(n)
	}

	fn skip_cast(&mut self) -> Result<(), SyntaxError> {
		if self.accept(&Token::Cast) {
			self.ident()?;
		}
		Ok(())
	}

	/// Skips to the parenthesis closing one that was just consumed.
	fn skip_group(&mut self) -> Result<(), SyntaxError> {
		let mut depth = 1usize;
		while depth > 0 {
			match self.next() {
				Some(Token::OpenParen) => depth += 1,
				Some(Token::CloseParen) => depth -= 1,
				Some(_) => {}
				None => return Err(SyntaxError("unbalanced parentheses".into())),
			}
		}
		Ok(())
	}

	fn ident_list(&mut self) -> Result<Vec<String>, SyntaxError> {
		self.expect(Token::OpenParen)?;
		let mut names = vec![self.ident()?];
		while self.accept(&Token::Comma) {
			names.push(self.ident()?);
		}
		self.expect(Token::CloseParen)?;
		Ok(names)
	}

	fn create(&mut self) -> Result<Parsed, SyntaxError> {
		if self.accept_keyword(Keyword::Unique) || self.peek() == Some(&Token::Keyword(Keyword::Index)) {
			self.keyword(Keyword::Index)?;
			while !self.accept_keyword(Keyword::On) {
				if self.next().is_none() {
					return Err(SyntaxError("CREATE INDEX without ON".into()));
				}
			}
			let table = self.ident()?;
			self.expect(Token::OpenParen)?;
			self.skip_group()?;
			return Ok(Parsed::CreateIndex {
				table,
			});
		}

		let unlogged = self.accept_keyword(Keyword::Unlogged);
		self.keyword(Keyword::Table)?;
		let if_not_exists = self.accept_keyword(Keyword::If);
		if if_not_exists {
			self.keyword(Keyword::Not)?;
			self.keyword(Keyword::Exists)?;
		}
		let name = self.ident()?;

		let mut columns = Vec::new();
		let mut primary_key = Vec::new();
		self.expect(Token::OpenParen)?;
		loop {
			if self.accept_keyword(Keyword::Primary) {
				self.keyword(Keyword::Key)?;
				primary_key.extend(self.ident_list()?);
			} else {
				let column = self.ident()?;
				let mut depth = 0usize;
				while let Some(token) = self.peek() {
					match token {
						Token::Comma | Token::CloseParen if depth == 0 => break,
						Token::OpenParen => depth += 1,
						Token::CloseParen => depth -= 1,
						Token::Keyword(Keyword::Primary) if depth == 0 => primary_key.push(column.clone()),
						_ => {}
					}
					self.position += 1;
				}
				columns.push(column);
			}

			match self.next() {
				Some(Token::Comma) => continue,
				Some(Token::CloseParen) => break,
				other => return Err(SyntaxError(format!("expected ',' or ')' in CREATE TABLE, got {other:?}"))),
			}
		}

		Ok(Parsed::CreateTable(CreateTable {
			name,
			columns,
			primary_key,
			unlogged,
			if_not_exists,
		}))
	}

	fn operand(&mut self) -> Result<Operand, SyntaxError> {
		if self.accept_keyword(Keyword::Null) {
			self.skip_cast()?;
			return Ok(Operand::Null);
		}
		Ok(Operand::Arg(self.placeholder()?))
	}

	fn insert(&mut self) -> Result<InsertInto, SyntaxError> {
		self.keyword(Keyword::Into)?;
		let table = self.ident()?;
		let columns = self.ident_list()?;
		self.keyword(Keyword::Values)?;

		let mut rows = Vec::new();
		loop {
			self.expect(Token::OpenParen)?;
			let mut row = vec![self.operand()?];
			while self.accept(&Token::Comma) {
				row.push(self.operand()?);
			}
			self.expect(Token::CloseParen)?;
			if row.len() != columns.len() {
				return Err(SyntaxError(format!(
					"VALUES tuple has {} entries for {} columns",
					row.len(),
					columns.len()
				)));
			}
			rows.push(row);
			if !self.accept(&Token::Comma) {
				break;
			}
		}

		let mut on_conflict = OnConflict::Raise;
		if self.accept_keyword(Keyword::On) {
			self.keyword(Keyword::Conflict)?;
			if self.accept(&Token::OpenParen) {
				self.skip_group()?;
			}
			self.keyword(Keyword::Do)?;
			on_conflict = if self.accept_keyword(Keyword::Nothing) {
				OnConflict::Ignore
			} else {
				self.keyword(Keyword::Update)?;
				self.keyword(Keyword::Set)?;
				let mut overwritten = Vec::new();
				loop {
					let column = self.ident()?;
					self.expect(Token::Eq)?;
					self.keyword(Keyword::Excluded).map_err(|_| {
						SyntaxError(format!("only 'EXCLUDED.column' updates are supported, at '{column}'"))
					})?;
					self.expect(Token::Dot)?;
					let source = self.ident()?;
					if source != column {
						return Err(SyntaxError(format!("'{column}' is set from EXCLUDED.'{source}'")));
					}
					overwritten.push(column);
					if !self.accept(&Token::Comma) {
						break;
					}
				}
				OnConflict::Overwrite(overwritten)
			};
		}

		let mut returning = Vec::new();
		if self.accept_keyword(Keyword::Returning) {
			loop {
				if self.accept(&Token::OpenParen) {
					self.skip_group()?;
					self.keyword(Keyword::As)?;
					returning.push(Returned::Inserted(self.ident()?));
				} else {
					returning.push(Returned::Column(self.ident()?));
				}
				if !self.accept(&Token::Comma) {
					break;
				}
			}
		}

		Ok(InsertInto {
			table,
			columns,
			rows,
			on_conflict,
			returning,
		})
	}

	fn select(&mut self) -> Result<SelectFrom, SyntaxError> {
		let projection = if self.accept(&Token::Asterisk) {
			Projection::All
		} else if self.peek() == Some(&Token::Ident("count".to_string())) {
			self.position += 1;
			self.expect(Token::OpenParen)?;
			self.expect(Token::Asterisk)?;
			self.expect(Token::CloseParen)?;
			self.keyword(Keyword::As)?;
			Projection::Count(self.ident()?)
		} else {
			self.ident()?;
			self.expect(Token::Dot)?;
			self.expect(Token::Asterisk)?;
			Projection::All
		};

		self.keyword(Keyword::From)?;
		let table = self.ident()?;

		let mut filter = Vec::new();
		if self.accept_keyword(Keyword::Where) {
			loop {
				let column = self.ident()?;
				self.expect(Token::Eq)?;
				filter.push((column, self.placeholder()?));
				if !self.accept_keyword(Keyword::And) {
					break;
				}
			}
		}

		let mut order = Vec::new();
		if self.accept_keyword(Keyword::Order) {
			self.keyword(Keyword::By)?;
			loop {
				let column = self.ident()?;
				let descending = if self.accept_keyword(Keyword::Desc) {
					true
				} else {
					self.accept_keyword(Keyword::Asc);
					false
				};
				order.push((column, descending));
				if !self.accept(&Token::Comma) {
					break;
				}
			}
		}

		let limit = if self.accept_keyword(Keyword::Limit) {
			Some(self.placeholder()?)
		} else {
			None
		};
		let offset = if self.accept_keyword(Keyword::Offset) {
			Some(self.placeholder()?)
		} else {
			None
		};
		if self.accept_keyword(Keyword::For) {
			self.keyword(Keyword::Update)?;
		}

		Ok(SelectFrom {
			table,
			projection,
			filter,
			order,
			limit,
			offset,
		})
	}
}
