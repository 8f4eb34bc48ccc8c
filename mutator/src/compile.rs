//! Static checks and lowering of a tree into an executable [`Program`].
//!
//! Besides name resolution the checker enforces the runtime's EH rules:
//! control may not leave a finally clause through `return`, a bare `throw;`
//! needs an enclosing catch clause (and not a finally nested inside it),
//! and `stackalloc` is not allowed inside a catch clause.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::{CompileError, Diagnostic};
use crate::factory::SENTINEL_EXCEPTION;
use crate::tree::{GreenNode, SyntaxKind, SyntaxTree};

pub const ROOT_EXCEPTION: &str = "Exception";
pub const DIVIDE_BY_ZERO: &str = "DivideByZero";
pub const INDEX_OUT_OF_RANGE: &str = "IndexOutOfRange";
pub const ENTRY_POINT: &str = "main";

const BUILTIN_EXCEPTIONS: &[&str] = &[SENTINEL_EXCEPTION, DIVIDE_BY_ZERO, INDEX_OUT_OF_RANGE];

/// Builtin functions with their arity; `None` is variadic.
const BUILTIN_FUNCTIONS: &[(&str, Option<usize>)] = &[("print", None), ("range", Some(2)), ("len", Some(1))];

pub fn is_builtin_function(name: &str) -> bool {
    BUILTIN_FUNCTIONS.iter().any(|(n, _)| *n == name)
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub body: GreenNode,
}

/// The compiled artifact: checked functions plus the exception hierarchy.
#[derive(Debug)]
pub struct Program {
    pub functions: HashMap<String, Rc<Function>>,
    /// Exception type -> base type. The root maps to `None`.
    pub exceptions: HashMap<String, Option<String>>,
}

impl Program {
    /// `ty` is `target` or derives from it.
    pub fn is_subtype(&self, ty: &str, target: &str) -> bool {
        let mut current = Some(ty);
        while let Some(t) = current {
            if t == target {
                return true;
            }
            current = self.exceptions.get(t).and_then(|base| base.as_deref());
        }
        false
    }

    pub fn entry(&self) -> Option<&Rc<Function>> {
        self.functions.get(ENTRY_POINT)
    }
}

pub fn compile(tree: &SyntaxTree) -> Result<Program, CompileError> {
    let mut checker = Checker::default();
    let program = checker.declare(tree.green());
    for item in tree.green().children() {
        if item.kind() == SyntaxKind::FnDecl {
            checker.check_fn(item, &program);
        }
    }
    if checker.diagnostics.is_empty() {
        Ok(program)
    } else {
        Err(CompileError::new(checker.diagnostics))
    }
}

/// Lexical EH context of the statement being checked.
#[derive(Copy, Clone, Default)]
struct Context {
    in_finally: bool,
    in_catch: bool,
    rethrow_allowed: bool,
}

#[derive(Default)]
struct Checker {
    diagnostics: Vec<Diagnostic>,
    scopes: Vec<HashSet<String>>,
}

impl Checker {
    fn error(&mut self, message: impl Into<String>, node: &GreenNode) {
        self.diagnostics.push(Diagnostic::new(message, node.span()));
    }

    /// First pass: collect functions and exception types.
    fn declare(&mut self, root: &GreenNode) -> Program {
        let mut functions = HashMap::new();
        let mut exceptions: HashMap<String, Option<String>> = HashMap::new();
        exceptions.insert(ROOT_EXCEPTION.to_string(), None);
        for name in BUILTIN_EXCEPTIONS {
            exceptions.insert(name.to_string(), Some(ROOT_EXCEPTION.to_string()));
        }

        for item in root.children() {
            let name = item.text().unwrap_or_default().to_string();
            match item.kind() {
                SyntaxKind::FnDecl => {
                    if functions.contains_key(&name) || is_builtin_function(&name) {
                        self.error(format!("duplicate function '{}'", name), item);
                        continue;
                    }
                    let params = item.children()[0]
                        .children()
                        .iter()
                        .map(|p| p.text().unwrap_or_default().to_string())
                        .collect();
                    let body = item.children()[1].clone();
                    functions.insert(name.clone(), Rc::new(Function { name, params, body }));
                }
                SyntaxKind::ExceptionDecl => {
                    if exceptions.contains_key(&name) {
                        self.error(format!("duplicate exception type '{}'", name), item);
                        continue;
                    }
                    let base = item
                        .children()
                        .first()
                        .and_then(|b| b.text())
                        .unwrap_or(ROOT_EXCEPTION)
                        .to_string();
                    exceptions.insert(name, Some(base));
                }
                _ => self.error("unexpected top-level item", item),
            }
        }

        for item in root.children().iter().filter(|i| i.kind() == SyntaxKind::ExceptionDecl) {
            let name = item.text().unwrap_or_default();
            let mut seen = HashSet::new();
            let mut current = Some(name.to_string());
            while let Some(t) = current {
                if !seen.insert(t.clone()) {
                    self.error(format!("exception type '{}' has cyclic inheritance", name), item);
                    break;
                }
                match exceptions.get(&t) {
                    Some(base) => current = base.clone(),
                    None => {
                        self.error(format!("unknown base exception type '{}'", t), item);
                        break;
                    }
                }
            }
        }

        match functions.get(ENTRY_POINT) {
            None => self.diagnostics.push(Diagnostic::new("program has no 'main' function", root.span())),
            Some(f) if !f.params.is_empty() => {
                self.diagnostics.push(Diagnostic::new("'main' must not take parameters", f.body.span()))
            }
            Some(_) => {}
        }

        Program { functions, exceptions }
    }

    fn check_fn(&mut self, item: &GreenNode, program: &Program) {
        let params: HashSet<String> = item.children()[0]
            .children()
            .iter()
            .map(|p| p.text().unwrap_or_default().to_string())
            .collect();
        self.scopes = vec![params];
        self.check_stmt(&item.children()[1], Context::default(), program);
        self.scopes.clear();
    }

    fn declare_local(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }

    fn check_exception_type(&mut self, node: &GreenNode, program: &Program) {
        let ty = node.text().unwrap_or_default();
        if !program.exceptions.contains_key(ty) {
            self.error(format!("unknown exception type '{}'", ty), node);
        }
    }

    fn check_stmt(&mut self, node: &GreenNode, cx: Context, program: &Program) {
        let kids = node.children();
        match node.kind() {
            SyntaxKind::Block => {
                self.scopes.push(HashSet::new());
                for stmt in kids {
                    self.check_stmt(stmt, cx, program);
                }
                self.scopes.pop();
            }
            SyntaxKind::LetStmt => {
                self.check_expr(&kids[0], cx, program);
                self.declare_local(node.text().unwrap_or_default());
            }
            SyntaxKind::AssignStmt => {
                let target = &kids[0];
                if target.kind() == SyntaxKind::NameRef {
                    let name = target.text().unwrap_or_default();
                    if !self.is_local(name) {
                        self.error(format!("cannot assign to '{}': not a local variable", name), target);
                    }
                } else {
                    self.check_expr(target, cx, program);
                }
                self.check_expr(&kids[1], cx, program);
            }
            SyntaxKind::ExprStmt => self.check_expr(&kids[0], cx, program),
            SyntaxKind::IfStmt | SyntaxKind::WhileStmt => {
                self.check_expr(&kids[0], cx, program);
                for branch in &kids[1..] {
                    self.check_stmt(branch, cx, program);
                }
            }
            SyntaxKind::ForEachStmt | SyntaxKind::UsingStmt => {
                self.check_expr(&kids[0], cx, program);
                self.scopes.push(HashSet::from([node.text().unwrap_or_default().to_string()]));
                self.check_stmt(&kids[1], cx, program);
                self.scopes.pop();
            }
            SyntaxKind::TryStmt => {
                self.check_stmt(&kids[0], cx, program);
                for part in &kids[1..] {
                    match part.kind() {
                        SyntaxKind::CatchClause => self.check_catch(part, cx, program),
                        SyntaxKind::FinallyClause => {
                            let inner = Context { in_finally: true, rethrow_allowed: false, ..cx };
                            self.check_stmt(&part.children()[0], inner, program);
                        }
                        _ => self.error("malformed try statement", part),
                    }
                }
            }
            SyntaxKind::ThrowStmt => match kids.first() {
                Some(value) => self.check_expr(value, cx, program),
                None if !cx.rethrow_allowed => {
                    let message = "a throw statement with no arguments is only allowed directly inside a catch clause";
                    self.error(message, node)
                }
                None => {}
            },
            SyntaxKind::ReturnStmt => {
                if cx.in_finally {
                    self.error("control cannot leave the body of a finally clause", node);
                }
                if let Some(value) = kids.first() {
                    self.check_expr(value, cx, program);
                }
            }
            _ => self.error(format!("expected statement, found {:?}", node.kind()), node),
        }
    }

    fn check_catch(&mut self, clause: &GreenNode, cx: Context, program: &Program) {
        let mut scope = HashSet::new();
        for part in clause.children() {
            if part.kind() == SyntaxKind::CatchDecl {
                self.check_exception_type(part, program);
                if let Some(binding) = part.children().first() {
                    scope.insert(binding.text().unwrap_or_default().to_string());
                }
            }
        }
        self.scopes.push(scope);
        let inner = Context { in_catch: true, rethrow_allowed: true, ..cx };
        if let Some(body) = clause.children().last() {
            self.check_stmt(body, inner, program);
        }
        self.scopes.pop();
    }

    fn check_expr(&mut self, node: &GreenNode, cx: Context, program: &Program) {
        let kids = node.children();
        match node.kind() {
            SyntaxKind::IntLit | SyntaxKind::BoolLit | SyntaxKind::StrLit => {}
            SyntaxKind::NameRef => {
                let name = node.text().unwrap_or_default();
                if !self.is_local(name) && !program.functions.contains_key(name) && !is_builtin_function(name) {
                    self.error(format!("the name '{}' does not exist in the current context", name), node);
                }
            }
            SyntaxKind::Binary | SyntaxKind::Unary | SyntaxKind::Index => {
                for k in kids {
                    self.check_expr(k, cx, program);
                }
            }
            SyntaxKind::Call => {
                for k in kids {
                    self.check_expr(k, cx, program);
                }
                self.check_arity(node, program);
            }
            SyntaxKind::NewObject => self.check_exception_type(node, program),
            SyntaxKind::StackAlloc => {
                if cx.in_catch {
                    self.error("stackalloc may not be used in a catch clause", node);
                }
                self.check_expr(&kids[0], cx, program);
            }
            SyntaxKind::Lambda => {
                let params = kids[0].children().iter().map(|p| p.text().unwrap_or_default().to_string()).collect();
                self.scopes.push(params);
                // EH context does not flow into a nested function body.
                self.check_stmt(&kids[1], Context::default(), program);
                self.scopes.pop();
            }
            _ => self.error(format!("expected expression, found {:?}", node.kind()), node),
        }
    }

    fn check_arity(&mut self, call: &GreenNode, program: &Program) {
        let callee = &call.children()[0];
        if callee.kind() != SyntaxKind::NameRef {
            return;
        }
        let name = callee.text().unwrap_or_default();
        if self.is_local(name) {
            return;
        }
        let given = call.children().len() - 1;
        let expected = match program.functions.get(name) {
            Some(f) => Some(f.params.len()),
            None => BUILTIN_FUNCTIONS.iter().find(|(n, _)| *n == name).and_then(|(_, arity)| *arity),
        };
        if let Some(expected) = expected {
            if expected != given {
                self.error(format!("'{}' takes {} argument(s) but {} were supplied", name, expected, given), call);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn errors(src: &str) -> Vec<String> {
        match compile(&parse(src, "t.eh").unwrap()) {
            Ok(_) => vec![],
            Err(e) => e.diagnostics.into_iter().map(|d| d.message).collect(),
        }
    }

    #[test]
    fn accepts_well_formed_program() {
        let src = r#"
            exception Oops;
            fn add(a, b) { return a + b; }
            fn main() {
                let xs = stackalloc[2];
                foreach (x in range(0, 2)) { xs[x] = add(x, 1); }
                try { throw new Oops(); } catch (Oops e) { print(e); } finally { print("f"); }
                try { } catch { try { throw; } finally { } }
                return 100;
            }
        "#;
        assert_eq!(errors(src), Vec::<String>::new());
    }

    #[test]
    fn return_in_finally() {
        let errs = errors("fn main() { try { } finally { return 1; } return 100; }");
        assert_eq!(errs, vec!["control cannot leave the body of a finally clause"]);
    }

    #[test]
    fn return_in_lambda_inside_finally_is_fine() {
        let errs = errors("fn main() { try { } finally { let f = fn() { return 1; }; } return 100; }");
        assert!(errs.is_empty());
    }

    #[test]
    fn rethrow_placement() {
        assert_eq!(errors("fn main() { throw; }").len(), 1);
        assert_eq!(errors("fn main() { try { } catch { try { } finally { throw; } } return 1; }").len(), 1);
        assert!(errors("fn main() { try { } catch { throw; } return 1; }").is_empty());
    }

    #[test]
    fn stackalloc_in_catch() {
        let errs = errors("fn main() { try { } catch { let a = stackalloc[1]; } return 1; }");
        assert_eq!(errs, vec!["stackalloc may not be used in a catch clause"]);
    }

    #[test]
    fn names_and_types() {
        let errs = errors("fn main() { x = 1; return y; }");
        assert_eq!(errs.len(), 2);
        let errs = errors("fn main() { throw new Nope(); }");
        assert_eq!(errs, vec!["unknown exception type 'Nope'"]);
        let errs = errors("exception A : B; exception B : A; fn main() { return 1; }");
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn entry_point_and_arity() {
        assert_eq!(errors("fn other() { return 1; }"), vec!["program has no 'main' function"]);
        let errs = errors("fn f(a) { return a; } fn main() { return f(1, 2) + len(1, 2); }");
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn sentinel_hierarchy() {
        let program = compile(&parse("fn main() { return 1; }", "t.eh").unwrap()).unwrap();
        assert!(program.is_subtype(SENTINEL_EXCEPTION, ROOT_EXCEPTION));
        assert!(!program.is_subtype(ROOT_EXCEPTION, SENTINEL_EXCEPTION));
    }
}
