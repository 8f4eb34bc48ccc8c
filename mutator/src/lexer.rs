//! Tokenizer for EH script source.

use crate::error::{ParseError, ParseResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Fn,
    Exception,
    Let,
    If,
    Else,
    While,
    Foreach,
    In,
    Using,
    Try,
    Catch,
    Finally,
    Throw,
    Return,
    New,
    Stackalloc,
    True,
    False,

    // Literals
    Ident(String),
    Int(i64),
    Str(String),

    // Symbols
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    Semi,
    Assign,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd,
    OrOr,

    Eof,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::Fn => "fn",
            TokenKind::Exception => "exception",
            TokenKind::Let => "let",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Foreach => "foreach",
            TokenKind::In => "in",
            TokenKind::Using => "using",
            TokenKind::Try => "try",
            TokenKind::Catch => "catch",
            TokenKind::Finally => "finally",
            TokenKind::Throw => "throw",
            TokenKind::Return => "return",
            TokenKind::New => "new",
            TokenKind::Stackalloc => "stackalloc",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Int(_) => "integer",
            TokenKind::Str(_) => "string",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Semi => ";",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Bang => "!",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Eof => "end of input",
        }
    }

    fn keyword(word: &str) -> Option<TokenKind> {
        Some(match word {
            "fn" => TokenKind::Fn,
            "exception" => TokenKind::Exception,
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "foreach" => TokenKind::Foreach,
            "in" => TokenKind::In,
            "using" => TokenKind::Using,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "finally" => TokenKind::Finally,
            "throw" => TokenKind::Throw,
            "return" => TokenKind::Return,
            "new" => TokenKind::New,
            "stackalloc" => TokenKind::Stackalloc,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offsets into the source.
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next()?;
        if next.1 == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(next)
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|&(i, _)| i).unwrap_or(self.src.len())
    }

    /// Whitespace and `//` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.comment_ahead() => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn comment_ahead(&mut self) -> bool {
        let at = self.offset();
        self.src[at..].starts_with("//")
    }

    pub fn tokenize(mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let (line, column) = (self.line, self.column);
            let start = self.offset();
            let Some((_, c)) = self.bump() else {
                tokens.push(Token { kind: TokenKind::Eof, start, end: start, line, column });
                return Ok(tokens);
            };

            let kind = match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,
                ';' => TokenKind::Semi,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '=' => self.follow('=', TokenKind::EqEq, TokenKind::Assign),
                '!' => self.follow('=', TokenKind::NotEq, TokenKind::Bang),
                '<' => self.follow('=', TokenKind::LtEq, TokenKind::Lt),
                '>' => self.follow('=', TokenKind::GtEq, TokenKind::Gt),
                '&' => self.pair('&', TokenKind::AndAnd, line, column)?,
                '|' => self.pair('|', TokenKind::OrOr, line, column)?,
                '"' => self.string(line, column)?,
                c if c.is_ascii_digit() => self.number(start, line, column)?,
                c if c.is_alphabetic() || c == '_' => {
                    while matches!(self.peek_char(), Some(c) if c.is_alphanumeric() || c == '_') {
                        self.bump();
                    }
                    let (src, end) = (self.src, self.offset());
                    let word = &src[start..end];
                    TokenKind::keyword(word).unwrap_or_else(|| TokenKind::Ident(word.to_string()))
                }
                other => {
                    return Err(ParseError::new(format!("unexpected character '{}'", other), line, column));
                }
            };
            let end = self.offset();
            tokens.push(Token { kind, start, end, line, column });
        }
    }

    fn follow(&mut self, next: char, two: TokenKind, one: TokenKind) -> TokenKind {
        if self.peek_char() == Some(next) {
            self.bump();
            two
        } else {
            one
        }
    }

    fn pair(&mut self, next: char, kind: TokenKind, line: usize, column: usize) -> ParseResult<TokenKind> {
        if self.peek_char() == Some(next) {
            self.bump();
            Ok(kind)
        } else {
            Err(ParseError::new(format!("expected '{}{}'", next, next), line, column))
        }
    }

    fn number(&mut self, start: usize, line: usize, column: usize) -> ParseResult<TokenKind> {
        while matches!(self.peek_char(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let (src, end) = (self.src, self.offset());
        let text = &src[start..end];
        text.parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ParseError::new(format!("integer literal out of range: {}", text), line, column))
    }

    fn string(&mut self, line: usize, column: usize) -> ParseResult<TokenKind> {
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some((_, '\n')) => return Err(ParseError::new("unterminated string literal", line, column)),
                Some((_, '"')) => return Ok(TokenKind::Str(value)),
                Some((_, '\\')) => match self.bump() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, '\\')) => value.push('\\'),
                    _ => return Err(ParseError::new("invalid escape in string literal", line, column)),
                },
                Some((_, c)) => value.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_and_operators() {
        assert_eq!(
            kinds("try { x <= 1 && !y; } // trailing"),
            vec![
                TokenKind::Try,
                TokenKind::LBrace,
                TokenKind::Ident("x".into()),
                TokenKind::LtEq,
                TokenKind::Int(1),
                TokenKind::AndAnd,
                TokenKind::Bang,
                TokenKind::Ident("y".into()),
                TokenKind::Semi,
                TokenKind::RBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\"b\n""#), vec![TokenKind::Str("a\"b\n".into()), TokenKind::Eof]);
    }

    #[test]
    fn positions() {
        let tokens = Lexer::new("fn\n  main").tokenize().unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
        assert_eq!(&"fn\n  main"[tokens[1].start..tokens[1].end], "main");
    }

    #[test]
    fn rejects_stray_characters() {
        let err = Lexer::new("let x = 1 # 2;").tokenize().unwrap_err();
        assert_eq!(err.column, 11);
    }
}
