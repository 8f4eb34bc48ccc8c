//! Tree-walking executor for compiled programs.
//!
//! Every run is bounded: a step budget, a wall-clock deadline, a call depth
//! limit and a nesting limit turn runaway variants into [`RuntimeFault`]s
//! instead of hanging or overflowing the harness.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::compile::{is_builtin_function, Program, DIVIDE_BY_ZERO, INDEX_OUT_OF_RANGE};
use crate::environment::Environment;
use crate::error::RuntimeFault;
use crate::tree::{GreenNode, SyntaxKind};

const MAX_STACKALLOC: i64 = 1 << 20;
/// How many steps pass between deadline checks.
const CLOCK_INTERVAL: u64 = 4096;

#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Int(i64),
    Bool(bool),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Func(Callable),
    Exception(Rc<str>),
}

#[derive(Clone, Debug)]
pub enum Callable {
    Named(Rc<str>),
    Closure(Rc<Closure>),
}

#[derive(Debug)]
pub struct Closure {
    params: Vec<String>,
    body: GreenNode,
    captured: Vec<(String, Value)>,
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Unit => "unit",
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Func(_) => "function",
            Value::Exception(_) => "exception",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) => {
                let items = items.borrow();
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Value::Func(_) => write!(f, "<fn>"),
            Value::Exception(ty) => write!(f, "{}", ty),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Limits {
    pub step_limit: u64,
    pub time_limit: Duration,
    /// Active function calls.
    pub max_depth: usize,
    /// Statements and expressions being evaluated at once, across calls.
    /// Every level is a native frame, so this bounds the interpreter's own
    /// stack; the default fits a 2 MiB thread in an unoptimized build.
    pub max_nesting: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            step_limit: 10_000_000,
            time_limit: Duration::from_secs(10),
            max_depth: 128,
            max_nesting: 320,
        }
    }
}

/// Result of a run that reached the end of `main`.
#[derive(Debug)]
pub struct Execution {
    pub code: i32,
    pub output: String,
}

enum Unwind {
    Return(Value),
    Throw(Rc<str>),
    Fault(RuntimeFault),
}

type Exec<T> = Result<T, Unwind>;

fn fault<T>(message: impl Into<String>) -> Exec<T> {
    Err(Unwind::Fault(RuntimeFault::Type(message.into())))
}

/// Run `program` from its entry point.
pub fn execute(program: &Program, limits: Limits) -> Result<Execution, RuntimeFault> {
    let mut interp = Interpreter::new(program, limits);
    let entry = program
        .entry()
        .ok_or_else(|| RuntimeFault::BadExit("no entry point".to_string()))?
        .clone();
    let result = interp.call_function(&entry.params, &entry.body, Environment::new(), vec![]);
    let value = match result {
        Ok(v) => v,
        Err(Unwind::Return(v)) => v,
        Err(Unwind::Throw(ty)) => return Err(RuntimeFault::Uncaught { type_name: ty.to_string() }),
        Err(Unwind::Fault(f)) => return Err(f),
    };
    match value {
        Value::Int(n) => {
            let code = i32::try_from(n).map_err(|_| RuntimeFault::BadExit(format!("{} does not fit an exit code", n)))?;
            Ok(Execution { code, output: interp.output })
        }
        other => Err(RuntimeFault::BadExit(format!("returned {}", other.type_name()))),
    }
}

struct Interpreter<'p> {
    program: &'p Program,
    limits: Limits,
    env: Environment,
    steps: u64,
    started: Instant,
    depth: usize,
    nesting: usize,
    /// Exceptions being handled, innermost last. `throw;` rethrows the top.
    handling: Vec<Rc<str>>,
    output: String,
}

impl<'p> Interpreter<'p> {
    fn new(program: &'p Program, limits: Limits) -> Self {
        Self {
            program,
            limits,
            env: Environment::new(),
            steps: 0,
            started: Instant::now(),
            depth: 0,
            nesting: 0,
            handling: Vec::new(),
            output: String::new(),
        }
    }

    fn tick(&mut self) -> Exec<()> {
        self.steps += 1;
        if self.steps > self.limits.step_limit {
            return Err(Unwind::Fault(RuntimeFault::out_of_steps(self.limits.step_limit)));
        }
        if self.steps % CLOCK_INTERVAL == 0 && self.started.elapsed() > self.limits.time_limit {
            return Err(Unwind::Fault(RuntimeFault::timeout(self.limits.time_limit)));
        }
        Ok(())
    }

    /// Enter one nesting level. Every successful call is paired with a
    /// decrement once the statement or expression is done.
    fn enter(&mut self) -> Exec<()> {
        if self.nesting >= self.limits.max_nesting {
            return Err(Unwind::Fault(RuntimeFault::StackOverflow {
                what: "nesting",
                depth: self.limits.max_nesting,
            }));
        }
        self.nesting += 1;
        Ok(())
    }

    fn throw<T>(&self, ty: &str) -> Exec<T> {
        Err(Unwind::Throw(Rc::from(ty)))
    }

    // ==================== STATEMENTS ====================

    fn exec_block(&mut self, block: &GreenNode) -> Exec<()> {
        self.env.push_scope();
        let result = block.children().iter().try_for_each(|stmt| self.exec(stmt));
        self.env.pop_scope();
        result
    }

    /// Run `body` in a fresh scope where `name` is bound to `value`.
    fn exec_scoped(&mut self, name: &str, value: Value, body: &GreenNode) -> Exec<()> {
        self.env.push_scope();
        self.env.bind(name, value);
        let result = self.exec_block(body);
        self.env.pop_scope();
        result
    }

    fn exec(&mut self, stmt: &GreenNode) -> Exec<()> {
        self.tick()?;
        self.enter()?;
        let result = self.exec_stmt(stmt);
        self.nesting -= 1;
        result
    }

    fn exec_stmt(&mut self, stmt: &GreenNode) -> Exec<()> {
        let kids = stmt.children();
        match stmt.kind() {
            SyntaxKind::Block => self.exec_block(stmt),
            SyntaxKind::LetStmt => {
                let value = self.eval(&kids[0])?;
                self.env.bind(stmt.text().unwrap_or_default(), value);
                Ok(())
            }
            SyntaxKind::AssignStmt => {
                let value = self.eval(&kids[1])?;
                self.assign(&kids[0], value)
            }
            SyntaxKind::ExprStmt => self.eval(&kids[0]).map(|_| ()),
            SyntaxKind::IfStmt => {
                if self.eval_bool(&kids[0])? {
                    self.exec(&kids[1])
                } else if let Some(alt) = kids.get(2) {
                    self.exec(alt)
                } else {
                    Ok(())
                }
            }
            SyntaxKind::WhileStmt => {
                while self.eval_bool(&kids[0])? {
                    self.exec(&kids[1])?;
                }
                Ok(())
            }
            SyntaxKind::ForEachStmt => {
                let items = match self.eval(&kids[0])? {
                    Value::Array(items) => {
                        let snapshot = items.borrow().clone();
                        snapshot
                    }
                    other => return fault(format!("cannot iterate over {}", other.type_name())),
                };
                let name = stmt.text().unwrap_or_default();
                for item in items {
                    self.exec_scoped(name, item, &kids[1])?;
                }
                Ok(())
            }
            SyntaxKind::UsingStmt => {
                let resource = self.eval(&kids[0])?;
                self.exec_scoped(stmt.text().unwrap_or_default(), resource, &kids[1])
            }
            SyntaxKind::TryStmt => self.exec_try(stmt),
            SyntaxKind::ThrowStmt => match kids.first() {
                Some(value) => match self.eval(value)? {
                    Value::Exception(ty) => Err(Unwind::Throw(ty)),
                    other => fault(format!("cannot throw a value of type {}", other.type_name())),
                },
                None => match self.handling.last() {
                    Some(ty) => Err(Unwind::Throw(ty.clone())),
                    None => fault("rethrow outside of a catch clause"),
                },
            },
            SyntaxKind::ReturnStmt => {
                let value = match kids.first() {
                    Some(v) => self.eval(v)?,
                    None => Value::Unit,
                };
                Err(Unwind::Return(value))
            }
            other => fault(format!("not a statement: {:?}", other)),
        }
    }

    fn exec_try(&mut self, stmt: &GreenNode) -> Exec<()> {
        let kids = stmt.children();
        let mut outcome = self.exec_block(&kids[0]);

        if let Err(Unwind::Throw(ty)) = &outcome {
            let ty = ty.clone();
            let handler = kids[1..]
                .iter()
                .filter(|k| k.kind() == SyntaxKind::CatchClause)
                .find(|clause| match clause.first_child_of(SyntaxKind::CatchDecl) {
                    Some(decl) => self.program.is_subtype(&ty, decl.text().unwrap_or_default()),
                    None => true,
                });
            if let Some(clause) = handler {
                outcome = self.exec_catch(clause, ty);
            }
        }

        // Faults are not exceptions: nothing runs on their way out.
        if let Err(Unwind::Fault(_)) = outcome {
            return outcome;
        }
        if let Some(finally) = stmt.first_child_of(SyntaxKind::FinallyClause) {
            self.exec_block(&finally.children()[0])?;
        }
        outcome
    }

    fn exec_catch(&mut self, clause: &GreenNode, ty: Rc<str>) -> Exec<()> {
        let Some(body) = clause.children().last() else {
            return Ok(());
        };
        let binding = clause
            .first_child_of(SyntaxKind::CatchDecl)
            .and_then(|d| d.children().first())
            .and_then(|n| n.text());
        self.handling.push(ty.clone());
        let result = match binding {
            Some(name) => self.exec_scoped(name, Value::Exception(ty), body),
            None => self.exec_block(body),
        };
        self.handling.pop();
        result
    }

    fn assign(&mut self, target: &GreenNode, value: Value) -> Exec<()> {
        match target.kind() {
            SyntaxKind::NameRef => {
                let name = target.text().unwrap_or_default();
                if self.env.assign(name, value) {
                    Ok(())
                } else {
                    fault(format!("assignment to unbound variable '{}'", name))
                }
            }
            SyntaxKind::Index => {
                let (items, i) = self.eval_index_target(target)?;
                let mut items = items.borrow_mut();
                match usize::try_from(i).ok().filter(|&i| i < items.len()) {
                    Some(i) => {
                        items[i] = value;
                        Ok(())
                    }
                    None => self.throw(INDEX_OUT_OF_RANGE),
                }
            }
            other => fault(format!("invalid assignment target {:?}", other)),
        }
    }

    fn eval_index_target(&mut self, index: &GreenNode) -> Exec<(Rc<RefCell<Vec<Value>>>, i64)> {
        let kids = index.children();
        let base = self.eval(&kids[0])?;
        let i = self.eval_int(&kids[1])?;
        match base {
            Value::Array(items) => Ok((items, i)),
            other => fault(format!("cannot index into {}", other.type_name())),
        }
    }

    // ==================== EXPRESSIONS ====================

    fn eval_bool(&mut self, expr: &GreenNode) -> Exec<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => fault(format!("expected bool, found {}", other.type_name())),
        }
    }

    fn eval_int(&mut self, expr: &GreenNode) -> Exec<i64> {
        match self.eval(expr)? {
            Value::Int(n) => Ok(n),
            other => fault(format!("expected int, found {}", other.type_name())),
        }
    }

    fn eval(&mut self, expr: &GreenNode) -> Exec<Value> {
        self.tick()?;
        self.enter()?;
        let result = self.eval_expr(expr);
        self.nesting -= 1;
        result
    }

    fn eval_expr(&mut self, expr: &GreenNode) -> Exec<Value> {
        let kids = expr.children();
        let text = expr.text().unwrap_or_default();
        match expr.kind() {
            SyntaxKind::IntLit => text.parse().map(Value::Int).or_else(|_| fault("malformed integer literal")),
            SyntaxKind::BoolLit => Ok(Value::Bool(text == "true")),
            SyntaxKind::StrLit => Ok(Value::Str(Rc::from(text))),
            SyntaxKind::NameRef => {
                if let Some(v) = self.env.lookup(text) {
                    Ok(v.clone())
                } else if self.program.functions.contains_key(text) || is_builtin_function(text) {
                    Ok(Value::Func(Callable::Named(Rc::from(text))))
                } else {
                    fault(format!("unbound name '{}'", text))
                }
            }
            SyntaxKind::Binary => self.eval_binary(text, &kids[0], &kids[1]),
            SyntaxKind::Unary => match (text, self.eval(&kids[0])?) {
                ("-", Value::Int(n)) => Ok(Value::Int(n.wrapping_neg())),
                ("!", Value::Bool(b)) => Ok(Value::Bool(!b)),
                (op, v) => fault(format!("cannot apply '{}' to {}", op, v.type_name())),
            },
            SyntaxKind::Call => {
                let callee = self.eval(&kids[0])?;
                let args = kids[1..].iter().map(|a| self.eval(a)).collect::<Exec<Vec<_>>>()?;
                self.call(callee, args)
            }
            SyntaxKind::Index => {
                let (items, i) = self.eval_index_target(expr)?;
                let items = items.borrow();
                match usize::try_from(i).ok().and_then(|i| items.get(i)) {
                    Some(v) => Ok(v.clone()),
                    None => self.throw(INDEX_OUT_OF_RANGE),
                }
            }
            SyntaxKind::NewObject => Ok(Value::Exception(Rc::from(text))),
            SyntaxKind::StackAlloc => {
                let len = self.eval_int(&kids[0])?;
                if !(0..=MAX_STACKALLOC).contains(&len) {
                    return fault(format!("invalid stackalloc length {}", len));
                }
                Ok(Value::Array(Rc::new(RefCell::new(vec![Value::Int(0); len as usize]))))
            }
            SyntaxKind::Lambda => {
                let params = kids[0].children().iter().map(|p| p.text().unwrap_or_default().to_string()).collect();
                Ok(Value::Func(Callable::Closure(Rc::new(Closure {
                    params,
                    body: kids[1].clone(),
                    captured: self.env.enumerate_bindings(),
                }))))
            }
            other => fault(format!("not an expression: {:?}", other)),
        }
    }

    fn eval_binary(&mut self, op: &str, lhs: &GreenNode, rhs: &GreenNode) -> Exec<Value> {
        if op == "&&" || op == "||" {
            let l = self.eval_bool(lhs)?;
            if (op == "&&") != l {
                return Ok(Value::Bool(l));
            }
            return self.eval_bool(rhs).map(Value::Bool);
        }
        let l = self.eval(lhs)?;
        let r = self.eval(rhs)?;
        match (op, &l, &r) {
            ("+", Value::Str(_), _) | ("+", _, Value::Str(_)) => Ok(Value::Str(Rc::from(format!("{}{}", l, r)))),
            ("==", _, _) => Ok(Value::Bool(values_equal(&l, &r))),
            ("!=", _, _) => Ok(Value::Bool(!values_equal(&l, &r))),
            (_, Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                Ok(match op {
                    "+" => Value::Int(a.wrapping_add(b)),
                    "-" => Value::Int(a.wrapping_sub(b)),
                    "*" => Value::Int(a.wrapping_mul(b)),
                    "/" | "%" if b == 0 => return self.throw(DIVIDE_BY_ZERO),
                    "/" => Value::Int(a.wrapping_div(b)),
                    "%" => Value::Int(a.wrapping_rem(b)),
                    "<" => Value::Bool(a < b),
                    "<=" => Value::Bool(a <= b),
                    ">" => Value::Bool(a > b),
                    ">=" => Value::Bool(a >= b),
                    _ => return fault(format!("unknown operator '{}'", op)),
                })
            }
            _ => fault(format!("cannot apply '{}' to {} and {}", op, l.type_name(), r.type_name())),
        }
    }

    // ==================== CALLS ====================

    fn call(&mut self, callee: Value, args: Vec<Value>) -> Exec<Value> {
        match callee {
            Value::Func(Callable::Named(name)) => {
                if let Some(f) = self.program.functions.get(&*name).cloned() {
                    return self.call_function(&f.params, &f.body, Environment::new(), args);
                }
                self.call_builtin(&name, args)
            }
            Value::Func(Callable::Closure(closure)) => {
                let env = Environment::with_bindings(closure.captured.iter().cloned());
                self.call_function(&closure.params, &closure.body, env, args)
            }
            other => fault(format!("cannot call a value of type {}", other.type_name())),
        }
    }

    fn call_function(
        &mut self,
        params: &[String],
        body: &GreenNode,
        mut env: Environment,
        args: Vec<Value>,
    ) -> Exec<Value> {
        if params.len() != args.len() {
            return fault(format!("expected {} argument(s), got {}", params.len(), args.len()));
        }
        if self.depth >= self.limits.max_depth {
            return Err(Unwind::Fault(RuntimeFault::StackOverflow {
                what: "call",
                depth: self.limits.max_depth,
            }));
        }
        env.push_scope();
        for (name, value) in params.iter().zip(args) {
            env.bind(name, value);
        }

        let saved_env = std::mem::replace(&mut self.env, env);
        let saved_handling = std::mem::take(&mut self.handling);
        self.depth += 1;
        let result = self.exec_block(body);
        self.depth -= 1;
        self.handling = saved_handling;
        self.env = saved_env;

        match result {
            Ok(()) => Ok(Value::Unit),
            Err(Unwind::Return(v)) => Ok(v),
            Err(other) => Err(other),
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Exec<Value> {
        match (name, args.as_slice()) {
            ("print", _) => {
                let parts: Vec<String> = args.iter().map(|v| v.to_string()).collect();
                self.output.push_str(&parts.join(" "));
                self.output.push('\n');
                Ok(Value::Unit)
            }
            ("range", [Value::Int(lo), Value::Int(hi)]) => {
                if hi.saturating_sub(*lo) > MAX_STACKALLOC {
                    return fault("range too large");
                }
                Ok(Value::Array(Rc::new(RefCell::new((*lo..*hi).map(Value::Int).collect()))))
            }
            ("len", [Value::Array(items)]) => Ok(Value::Int(items.borrow().len() as i64)),
            ("len", [Value::Str(s)]) => Ok(Value::Int(s.chars().count() as i64)),
            _ => fault(format!("bad call to builtin '{}'", name)),
        }
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Unit, Value::Unit) => true,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Exception(a), Value::Exception(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::parser::parse;

    fn run(src: &str) -> Result<Execution, RuntimeFault> {
        let program = compile(&parse(src, "t.eh").unwrap()).unwrap();
        execute(&program, Limits::default())
    }

    fn code(src: &str) -> i32 {
        run(src).unwrap().code
    }

    #[test]
    fn arithmetic_and_control_flow() {
        let src = r#"
            fn fib(n) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }
            fn main() {
                let total = 0;
                let i = 0;
                while (i < 5) { total = total + i; i = i + 1; }
                return total * 10 + fib(10) - 55;
            }
        "#;
        assert_eq!(code(src), 100);
    }

    #[test]
    fn finally_runs_on_every_path() {
        let src = r#"
            exception Oops;
            fn f(log) {
                try { return 1; } finally { log[0] = log[0] + 1; }
            }
            fn main() {
                let log = stackalloc[1];
                f(log);
                try {
                    try { throw new Oops(); } finally { log[0] = log[0] + 10; }
                } catch (Oops) { log[0] = log[0] + 100; }
                return log[0] - 11;
            }
        "#;
        assert_eq!(code(src), 100);
    }

    #[test]
    fn catch_matches_hierarchy_and_rethrows() {
        let src = r#"
            exception Base;
            exception Derived : Base;
            fn main() {
                let hits = 0;
                try {
                    try { throw new Derived(); } catch (Base e) { hits = hits + 1; throw; }
                } catch (Derived) { hits = hits + 10; }
                try { let z = 1 / 0; } catch (DivideByZero) { hits = hits + 100; }
                return hits - 11;
            }
        "#;
        assert_eq!(code(src), 100);
    }

    #[test]
    fn uncaught_exception_faults() {
        let err = run("exception Oops; fn main() { throw new Oops(); }").unwrap_err();
        assert!(matches!(err, RuntimeFault::Uncaught { ref type_name } if type_name == "Oops"));
    }

    #[test]
    fn closures_capture_by_value() {
        let src = r#"
            fn main() {
                let base = 90;
                let add = fn(x) { return base + x; };
                base = 0;
                return add(10);
            }
        "#;
        assert_eq!(code(src), 100);
    }

    #[test]
    fn output_is_captured() {
        let src = r#"fn main() { print("a", 1, true); foreach (x in range(0, 2)) { print(x); } return 100; }"#;
        let exec = run(src).unwrap();
        assert_eq!(exec.output, "a 1 true\n0\n1\n");
    }

    #[test]
    fn runaway_loops_hit_the_step_budget() {
        let program = compile(&parse("fn main() { while (true) { } return 1; }", "t.eh").unwrap()).unwrap();
        let limits = Limits { step_limit: 10_000, ..Limits::default() };
        assert!(matches!(execute(&program, limits), Err(RuntimeFault::Timeout { .. })));
    }

    #[test]
    fn unbounded_recursion_overflows() {
        let program = compile(&parse("fn f() { return f(); } fn main() { return f(); }", "t.eh").unwrap()).unwrap();
        let err = execute(&program, Limits { max_depth: 32, ..Limits::default() }).unwrap_err();
        assert!(matches!(err, RuntimeFault::StackOverflow { what: "call", .. }));
    }

    #[test]
    fn deep_nesting_overflows_before_the_native_stack() {
        // 100 calls fit the call limit; 200 nested blocks per call do not.
        let blocks = 200;
        let body = format!(
            "{}if (n == 0) {{ return 100; }} return down(n - 1);{}",
            "{ ".repeat(blocks),
            " }".repeat(blocks)
        );
        let src = format!("fn down(n) {{ {} }} fn main() {{ return down(100); }}", body);
        let err = run(&src).unwrap_err();
        assert!(matches!(err, RuntimeFault::StackOverflow { what: "nesting", depth: 320 }));

        let limits = Limits { max_nesting: 16, ..Limits::default() };
        let program = compile(&parse("fn main() { { { { return 100; } } } }", "t.eh").unwrap()).unwrap();
        assert_eq!(execute(&program, limits).unwrap().code, 100);
        let shallow = Limits { max_nesting: 3, ..Limits::default() };
        assert!(execute(&program, shallow).is_err());
    }

    #[test]
    fn non_integer_exit_is_rejected() {
        assert!(matches!(run("fn main() { return true; }"), Err(RuntimeFault::BadExit(_))));
        assert!(matches!(run("fn main() { return 5000000000; }"), Err(RuntimeFault::BadExit(_))));
    }

    #[test]
    fn index_out_of_range_is_catchable() {
        let src = r#"
            fn main() {
                let a = stackalloc[1];
                try { a[3] = 1; } catch (IndexOutOfRange) { return 100; }
                return 0;
            }
        "#;
        assert_eq!(code(src), 100);
    }
}
