//! The configuration language: lexer and parser.
//!
//! Architecture:
//!
//! ```text
//! Source text
//!     |
//! Lexer (logos) -> Token stream with landmarks
//!     |              (config strings scanned on demand after '(')
//! Parser (recursive descent) -> graph::Router
//! ```
//!
//! The lexer runs eagerly, producing the whole token stream up front;
//! the parser walks it with arbitrary pushback. Statement-level error
//! recovery resynchronizes on `;`, `}`, and `)`.

mod lexer;
mod parser;

pub use lexer::{Token, TokenKind, tokenize};
pub use parser::{Parser, parse_file, parse_string};
