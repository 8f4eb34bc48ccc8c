//! Recursive descent parser producing green trees.
//!
//! ```text
//! program := item*
//! item    := 'fn' IDENT '(' params ')' block
//!          | 'exception' IDENT (':' IDENT)? ';'
//! block   := '{' stmt* '}'
//! stmt    := block | let | if | while | foreach | using | try
//!          | 'throw' expr? ';' | 'return' expr? ';' | expr ('=' expr)? ';'
//! ```
//!
//! Expressions use the usual precedence ladder: `||`, `&&`, equality,
//! comparison, additive, multiplicative, unary, postfix (call, index).

use std::path::Path;

use crate::error::{ParseError, ParseResult};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::tree::{GreenNode, Span, SyntaxKind, SyntaxTree};

/// Parse a whole source file.
pub fn parse(source: &str, path: impl AsRef<Path>) -> ParseResult<SyntaxTree> {
    let mut parser = Parser::new(source)?;
    let root = parser.parse_program()?;
    Ok(SyntaxTree::new(root, path.as_ref()))
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    // ==================== TOKEN HELPERS ====================

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.pos + ahead).min(self.tokens.len() - 1)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, expected: &str) -> ParseError {
        let token = self.peek();
        ParseError::unexpected(expected, token.kind.name(), token.line, token.column)
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(kind.name()))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                let token = self.advance();
                Ok((name, span_of(&token)))
            }
            _ => Err(self.error_here("identifier")),
        }
    }

    /// Span from `start` to the last consumed token.
    fn span_from(&self, start: &Token) -> Span {
        let last = &self.tokens[self.pos.saturating_sub(1)];
        Span::new(start.start, last.end.max(start.end), start.line, last.line.max(start.line))
    }

    fn node(&self, kind: SyntaxKind, text: Option<&str>, children: Vec<GreenNode>, start: &Token) -> GreenNode {
        GreenNode::new(kind, text, children, Some(self.span_from(start)))
    }

    // ==================== DECLARATIONS ====================

    pub fn parse_program(&mut self) -> ParseResult<GreenNode> {
        let start = self.peek().clone();
        let mut items = Vec::new();
        while !self.check(&TokenKind::Eof) {
            items.push(match self.peek().kind {
                TokenKind::Fn => self.parse_fn()?,
                TokenKind::Exception => self.parse_exception()?,
                _ => return Err(self.error_here("'fn' or 'exception'")),
            });
        }
        Ok(self.node(SyntaxKind::Program, None, items, &start))
    }

    fn parse_fn(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::Fn)?;
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(self.node(SyntaxKind::FnDecl, Some(&name), vec![params, body], &start))
    }

    fn parse_exception(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::Exception)?;
        let (name, _) = self.expect_ident()?;
        let mut children = Vec::new();
        if self.eat(&TokenKind::Colon) {
            let (base, span) = self.expect_ident()?;
            children.push(GreenNode::new(SyntaxKind::Name, Some(&base), vec![], Some(span)));
        }
        self.expect(&TokenKind::Semi)?;
        Ok(self.node(SyntaxKind::ExceptionDecl, Some(&name), children, &start))
    }

    fn parse_params(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::LParen)?;
        let mut names = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (name, span) = self.expect_ident()?;
                names.push(GreenNode::new(SyntaxKind::Name, Some(&name), vec![], Some(span)));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(self.node(SyntaxKind::ParamList, None, names, &start))
    }

    // ==================== STATEMENTS ====================

    pub fn parse_block(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.error_here("'}'"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(self.node(SyntaxKind::Block, None, stmts, &start))
    }

    fn parse_stmt(&mut self) -> ParseResult<GreenNode> {
        match self.peek().kind {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Let => self.parse_let(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Foreach => self.parse_scoped(TokenKind::Foreach, TokenKind::In, SyntaxKind::ForEachStmt),
            TokenKind::Using => self.parse_scoped(TokenKind::Using, TokenKind::Assign, SyntaxKind::UsingStmt),
            TokenKind::Try => self.parse_try(),
            TokenKind::Throw => self.parse_jump(TokenKind::Throw, SyntaxKind::ThrowStmt),
            TokenKind::Return => self.parse_jump(TokenKind::Return, SyntaxKind::ReturnStmt),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_let(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::Let)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::Assign)?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semi)?;
        Ok(self.node(SyntaxKind::LetStmt, Some(&name), vec![value], &start))
    }

    fn parse_if(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let then = self.parse_block()?;
        let mut children = vec![cond, then];
        if self.eat(&TokenKind::Else) {
            children.push(if self.check(&TokenKind::If) { self.parse_if()? } else { self.parse_block()? });
        }
        Ok(self.node(SyntaxKind::IfStmt, None, children, &start))
    }

    fn parse_while(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(self.node(SyntaxKind::WhileStmt, None, vec![cond, body], &start))
    }

    /// `foreach (x in e) { .. }` and `using (x = e) { .. }`
    fn parse_scoped(&mut self, keyword: TokenKind, separator: TokenKind, kind: SyntaxKind) -> ParseResult<GreenNode> {
        let start = self.expect(&keyword)?;
        self.expect(&TokenKind::LParen)?;
        let (name, _) = self.expect_ident()?;
        self.expect(&separator)?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(self.node(kind, Some(&name), vec![value, body], &start))
    }

    fn parse_try(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::Try)?;
        let mut children = vec![self.parse_block()?];
        while self.check(&TokenKind::Catch) {
            children.push(self.parse_catch()?);
        }
        if self.check(&TokenKind::Finally) {
            let fin = self.advance();
            let body = self.parse_block()?;
            children.push(self.node(SyntaxKind::FinallyClause, None, vec![body], &fin));
        }
        if children.len() == 1 {
            return Err(self.error_here("'catch' or 'finally'"));
        }
        Ok(self.node(SyntaxKind::TryStmt, None, children, &start))
    }

    fn parse_catch(&mut self) -> ParseResult<GreenNode> {
        let start = self.expect(&TokenKind::Catch)?;
        let mut children = Vec::with_capacity(2);
        if self.check(&TokenKind::LParen) {
            let open = self.advance();
            let (ty, _) = self.expect_ident()?;
            let mut binding = Vec::new();
            if let TokenKind::Ident(_) = self.peek().kind {
                let (name, span) = self.expect_ident()?;
                binding.push(GreenNode::new(SyntaxKind::Name, Some(&name), vec![], Some(span)));
            }
            self.expect(&TokenKind::RParen)?;
            children.push(self.node(SyntaxKind::CatchDecl, Some(&ty), binding, &open));
        }
        children.push(self.parse_block()?);
        Ok(self.node(SyntaxKind::CatchClause, None, children, &start))
    }

    fn parse_jump(&mut self, keyword: TokenKind, kind: SyntaxKind) -> ParseResult<GreenNode> {
        let start = self.expect(&keyword)?;
        let mut children = Vec::new();
        if !self.check(&TokenKind::Semi) {
            children.push(self.parse_expr()?);
        }
        self.expect(&TokenKind::Semi)?;
        Ok(self.node(kind, None, children, &start))
    }

    fn parse_expr_stmt(&mut self) -> ParseResult<GreenNode> {
        let start = self.peek().clone();
        let expr = self.parse_expr()?;
        if self.eat(&TokenKind::Assign) {
            if !matches!(expr.kind(), SyntaxKind::NameRef | SyntaxKind::Index) {
                return Err(ParseError::new("invalid assignment target", start.line, start.column));
            }
            let value = self.parse_expr()?;
            self.expect(&TokenKind::Semi)?;
            return Ok(self.node(SyntaxKind::AssignStmt, None, vec![expr, value], &start));
        }
        self.expect(&TokenKind::Semi)?;
        Ok(self.node(SyntaxKind::ExprStmt, None, vec![expr], &start))
    }

    // ==================== EXPRESSIONS ====================

    pub fn parse_expr(&mut self) -> ParseResult<GreenNode> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<GreenNode> {
        const LEVELS: &[&[TokenKind]] = &[
            &[TokenKind::OrOr],
            &[TokenKind::AndAnd],
            &[TokenKind::EqEq, TokenKind::NotEq],
            &[TokenKind::Lt, TokenKind::LtEq, TokenKind::Gt, TokenKind::GtEq],
            &[TokenKind::Plus, TokenKind::Minus],
            &[TokenKind::Star, TokenKind::Slash, TokenKind::Percent],
        ];
        if level == LEVELS.len() {
            return self.parse_unary();
        }
        let start = self.peek().clone();
        let mut lhs = self.parse_binary(level + 1)?;
        while let Some(op) = LEVELS[level].iter().find(|k| self.check(k)) {
            let op = op.name();
            self.advance();
            let rhs = self.parse_binary(level + 1)?;
            lhs = self.node(SyntaxKind::Binary, Some(op), vec![lhs, rhs], &start);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<GreenNode> {
        if self.check(&TokenKind::Minus) || self.check(&TokenKind::Bang) {
            let start = self.advance();
            let operand = self.parse_unary()?;
            return Ok(self.node(SyntaxKind::Unary, Some(start.kind.name()), vec![operand], &start));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<GreenNode> {
        let start = self.peek().clone();
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::LParen) {
                let mut children = vec![expr];
                if !self.check(&TokenKind::RParen) {
                    loop {
                        children.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RParen)?;
                expr = self.node(SyntaxKind::Call, None, children, &start);
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                expr = self.node(SyntaxKind::Index, None, vec![expr, index], &start);
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<GreenNode> {
        let start = self.peek().clone();
        match start.kind.clone() {
            TokenKind::Int(n) => {
                self.advance();
                Ok(self.node(SyntaxKind::IntLit, Some(&n.to_string()), vec![], &start))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(self.node(SyntaxKind::StrLit, Some(&s), vec![], &start))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(self.node(SyntaxKind::BoolLit, Some(start.kind.name()), vec![], &start))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(self.node(SyntaxKind::NameRef, Some(&name), vec![], &start))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::New => {
                self.advance();
                let (ty, _) = self.expect_ident()?;
                self.expect(&TokenKind::LParen)?;
                self.expect(&TokenKind::RParen)?;
                Ok(self.node(SyntaxKind::NewObject, Some(&ty), vec![], &start))
            }
            TokenKind::Stackalloc => {
                self.advance();
                self.expect(&TokenKind::LBracket)?;
                let len = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(self.node(SyntaxKind::StackAlloc, None, vec![len], &start))
            }
            TokenKind::Fn if matches!(self.peek_at(1), TokenKind::LParen) => {
                self.advance();
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                Ok(self.node(SyntaxKind::Lambda, None, vec![params, body], &start))
            }
            _ => Err(self.error_here("expression")),
        }
    }
}

fn span_of(token: &Token) -> Span {
    Span::new(token.start, token.end, token.line, token.line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_of(tree: &SyntaxTree) -> Vec<SyntaxKind> {
        tree.root().descendants().map(|n| n.kind()).collect()
    }

    #[test]
    fn parses_minimal_program() {
        let tree = parse("fn main() { return 100; }", "t.eh").unwrap();
        assert_eq!(
            kinds_of(&tree),
            vec![
                SyntaxKind::FnDecl,
                SyntaxKind::ParamList,
                SyntaxKind::Block,
                SyntaxKind::ReturnStmt,
                SyntaxKind::IntLit,
            ]
        );
        assert_eq!(tree.path(), Path::new("t.eh"));
    }

    #[test]
    fn precedence() {
        let tree = parse("fn main() { return 1 + 2 * 3 == 7; }", "t.eh").unwrap();
        let ret = tree.root().descendants().find(|n| n.kind() == SyntaxKind::ReturnStmt).unwrap();
        let eq = ret.child(0).unwrap();
        assert_eq!(eq.text(), Some("=="));
        let add = eq.child(0).unwrap();
        assert_eq!(add.text(), Some("+"));
        assert_eq!(add.child(1).unwrap().text(), Some("*"));
    }

    #[test]
    fn try_catch_finally_shape() {
        let src = r#"
            exception Oops : Exception;
            fn main() {
                try { throw new Oops(); }
                catch (Oops e) { print(e); }
                catch { }
                finally { print("done"); }
                return 100;
            }
        "#;
        let tree = parse(src, "t.eh").unwrap();
        let try_stmt = tree.root().descendants().find(|n| n.kind() == SyntaxKind::TryStmt).unwrap();
        let kinds: Vec<_> = try_stmt.children().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![SyntaxKind::Block, SyntaxKind::CatchClause, SyntaxKind::CatchClause, SyntaxKind::FinallyClause]
        );
        let decl = try_stmt.child(1).unwrap().child(0).unwrap();
        assert_eq!(decl.kind(), SyntaxKind::CatchDecl);
        assert_eq!(decl.text(), Some("Oops"));
        assert_eq!(decl.child(0).unwrap().text(), Some("e"));
    }

    #[test]
    fn spans_track_lines() {
        let tree = parse("fn main() {\n  let x = 1;\n  return x;\n}", "t.eh").unwrap();
        let body = tree.blocks().next().unwrap();
        let span = body.span().unwrap();
        assert_eq!((span.line_start, span.line_end), (1, 4));
    }

    #[test]
    fn try_without_handlers_is_rejected() {
        let err = parse("fn main() { try { } return 1; }", "t.eh").unwrap_err();
        assert!(err.message.contains("'catch' or 'finally'"));
    }

    #[test]
    fn bad_assignment_target() {
        assert!(parse("fn main() { 1 = 2; }", "t.eh").is_err());
    }
}
