//! Pretty printer. Output always re-parses to a structurally equal tree.

use crate::tree::{GreenNode, SyntaxKind, SyntaxTree};

pub struct Emitter {
    indent: usize,
    output: String,
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Emitter {
    pub fn new() -> Self {
        Self {
            indent: 0,
            output: String::new(),
        }
    }

    pub fn emit_inline(&mut self, s: &str) {
        self.output.push_str(s);
    }

    /// Start a new line at the current indentation.
    pub fn emit_block(&mut self, s: &str) {
        self.output.push('\n');
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.output.push_str(s);
    }

    pub fn enter_block(&mut self) {
        self.indent += 1
    }

    pub fn exit_block(&mut self) {
        self.indent -= 1
    }

    pub fn finish(self) -> String {
        let mut out = self.output.trim_start().to_string();
        out.push('\n');
        out
    }
}

pub trait Emit {
    fn emit(&self, e: &mut Emitter);

    fn to_source(&self) -> String {
        let mut e = Emitter::new();
        self.emit(&mut e);
        e.finish()
    }
}

impl Emit for SyntaxTree {
    fn emit(&self, e: &mut Emitter) {
        self.green().emit(e)
    }
}

impl Emit for GreenNode {
    fn emit(&self, e: &mut Emitter) {
        if self.kind().is_statement() || self.kind().is_declaration() {
            emit_stmt(self, e)
        } else {
            emit_expr(self, e)
        }
    }
}

fn text(node: &GreenNode) -> &str {
    node.text().unwrap_or_default()
}

fn emit_stmt(node: &GreenNode, e: &mut Emitter) {
    let kids = node.children();
    match node.kind() {
        SyntaxKind::Program => {
            for (i, item) in kids.iter().enumerate() {
                if i > 0 {
                    e.emit_block("");
                }
                e.emit_block("");
                emit_stmt(item, e);
            }
        }
        SyntaxKind::FnDecl => {
            e.emit_inline(&format!("fn {}", text(node)));
            emit_params(&kids[0], e);
            e.emit_inline(" ");
            emit_stmt(&kids[1], e);
        }
        SyntaxKind::ExceptionDecl => {
            e.emit_inline(&format!("exception {}", text(node)));
            if let Some(base) = kids.first() {
                e.emit_inline(&format!(" : {}", text(base)));
            }
            e.emit_inline(";");
        }
        SyntaxKind::Block => {
            if kids.is_empty() {
                e.emit_inline("{ }");
                return;
            }
            e.emit_inline("{");
            e.enter_block();
            for stmt in kids {
                e.emit_block("");
                emit_stmt(stmt, e);
            }
            e.exit_block();
            e.emit_block("}");
        }
        SyntaxKind::LetStmt => {
            e.emit_inline(&format!("let {} = ", text(node)));
            emit_expr(&kids[0], e);
            e.emit_inline(";");
        }
        SyntaxKind::AssignStmt => {
            emit_expr(&kids[0], e);
            e.emit_inline(" = ");
            emit_expr(&kids[1], e);
            e.emit_inline(";");
        }
        SyntaxKind::ExprStmt => {
            emit_expr(&kids[0], e);
            e.emit_inline(";");
        }
        SyntaxKind::IfStmt => {
            e.emit_inline("if (");
            emit_expr(&kids[0], e);
            e.emit_inline(") ");
            emit_stmt(&kids[1], e);
            if let Some(alt) = kids.get(2) {
                e.emit_inline(" else ");
                emit_stmt(alt, e);
            }
        }
        SyntaxKind::WhileStmt => {
            e.emit_inline("while (");
            emit_expr(&kids[0], e);
            e.emit_inline(") ");
            emit_stmt(&kids[1], e);
        }
        SyntaxKind::ForEachStmt | SyntaxKind::UsingStmt => {
            let (keyword, sep) = if node.kind() == SyntaxKind::ForEachStmt {
                ("foreach", "in")
            } else {
                ("using", "=")
            };
            e.emit_inline(&format!("{} ({} {} ", keyword, text(node), sep));
            emit_expr(&kids[0], e);
            e.emit_inline(") ");
            emit_stmt(&kids[1], e);
        }
        SyntaxKind::TryStmt => {
            e.emit_inline("try ");
            for (i, part) in kids.iter().enumerate() {
                if i > 0 {
                    e.emit_block("");
                }
                emit_stmt(part, e);
            }
        }
        SyntaxKind::CatchClause => {
            e.emit_inline("catch ");
            for part in kids {
                if part.kind() == SyntaxKind::CatchDecl {
                    e.emit_inline(&format!("({}", text(part)));
                    if let Some(binding) = part.children().first() {
                        e.emit_inline(&format!(" {}", text(binding)));
                    }
                    e.emit_inline(") ");
                } else {
                    emit_stmt(part, e);
                }
            }
        }
        SyntaxKind::FinallyClause => {
            e.emit_inline("finally ");
            emit_stmt(&kids[0], e);
        }
        SyntaxKind::ThrowStmt | SyntaxKind::ReturnStmt => {
            e.emit_inline(if node.kind() == SyntaxKind::ThrowStmt { "throw" } else { "return" });
            if let Some(value) = kids.first() {
                e.emit_inline(" ");
                emit_expr(value, e);
            }
            e.emit_inline(";");
        }
        _ => emit_expr(node, e),
    }
}

fn emit_params(params: &GreenNode, e: &mut Emitter) {
    let names: Vec<&str> = params.children().iter().map(text).collect();
    e.emit_inline(&format!("({})", names.join(", ")));
}

fn precedence(node: &GreenNode) -> u8 {
    match (node.kind(), text(node)) {
        (SyntaxKind::Binary, "||") => 1,
        (SyntaxKind::Binary, "&&") => 2,
        (SyntaxKind::Binary, "==" | "!=") => 3,
        (SyntaxKind::Binary, "<" | "<=" | ">" | ">=") => 4,
        (SyntaxKind::Binary, "+" | "-") => 5,
        (SyntaxKind::Binary, _) => 6,
        (SyntaxKind::Unary, _) => 7,
        (SyntaxKind::Lambda, _) => 0,
        _ => 8,
    }
}

fn emit_operand(node: &GreenNode, min: u8, e: &mut Emitter) {
    if precedence(node) < min {
        e.emit_inline("(");
        emit_expr(node, e);
        e.emit_inline(")");
    } else {
        emit_expr(node, e);
    }
}

fn emit_expr(node: &GreenNode, e: &mut Emitter) {
    let kids = node.children();
    match node.kind() {
        SyntaxKind::IntLit | SyntaxKind::BoolLit | SyntaxKind::NameRef | SyntaxKind::Name => e.emit_inline(text(node)),
        SyntaxKind::StrLit => e.emit_inline(&quote(text(node))),
        SyntaxKind::Binary => {
            let p = precedence(node);
            emit_operand(&kids[0], p, e);
            e.emit_inline(&format!(" {} ", text(node)));
            emit_operand(&kids[1], p + 1, e);
        }
        SyntaxKind::Unary => {
            e.emit_inline(text(node));
            emit_operand(&kids[0], 7, e);
        }
        SyntaxKind::Call => {
            emit_operand(&kids[0], 8, e);
            e.emit_inline("(");
            for (i, arg) in kids[1..].iter().enumerate() {
                if i > 0 {
                    e.emit_inline(", ");
                }
                emit_expr(arg, e);
            }
            e.emit_inline(")");
        }
        SyntaxKind::Index => {
            emit_operand(&kids[0], 8, e);
            e.emit_inline("[");
            emit_expr(&kids[1], e);
            e.emit_inline("]");
        }
        SyntaxKind::NewObject => e.emit_inline(&format!("new {}()", text(node))),
        SyntaxKind::StackAlloc => {
            e.emit_inline("stackalloc[");
            emit_expr(&kids[0], e);
            e.emit_inline("]");
        }
        SyntaxKind::Lambda => {
            e.emit_inline("fn");
            emit_params(&kids[0], e);
            e.emit_inline(" ");
            emit_stmt(&kids[1], e);
        }
        _ => emit_stmt(node, e),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const SAMPLE: &str = r#"
exception Oops : Exception;

fn helper(a, b) {
    return (a + b) * -a;
}

fn main() {
    let xs = stackalloc[3];
    foreach (i in range(0, 3)) { xs[i] = i; }
    using (r = "res\"ource") { print(r); }
    let f = fn(x) { return x - (1 - 2); };
    if (!(1 < 2) || true && false) { } else if (len(xs) == 3) { print(1); } else { }
    while (false) { }
    try {
        throw new Oops();
    } catch (Oops e) {
        print(e);
    } catch {
        throw;
    } finally { }
    return f(helper(1, 2))[0];
}
"#;

    #[test]
    fn printed_source_reparses_to_same_tree() {
        let tree = parse(SAMPLE, "sample.eh").unwrap();
        let printed = tree.to_source();
        let again = parse(&printed, "sample.eh").unwrap();
        assert_eq!(tree.green(), again.green());
        assert_eq!(again.to_source(), printed);
    }

    #[test]
    fn layout() {
        let tree = parse("fn main() { try { return 100; } finally { } }", "t.eh").unwrap();
        assert_eq!(
            tree.to_source(),
            "fn main() {\n    try {\n        return 100;\n    }\n    finally { }\n}\n"
        );
    }
}
