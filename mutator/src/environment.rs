use std::collections::HashMap;

use crate::interp::Value;

#[derive(Default)]
struct Scope {
    bindings: HashMap<String, Value>,
}

/// Local variables of one activation.
#[derive(Default)]
pub struct Environment {
    scopes: Vec<Scope>,
}

impl Environment {
    pub fn new() -> Self {
        let mut env = Self::default();
        env.push_scope();
        env
    }

    /// Environment whose outermost scope holds `bindings`.
    pub fn with_bindings(bindings: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            scopes: vec![Scope { bindings: bindings.into_iter().collect() }],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn bind(&mut self, name: &str, value: Value) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.bindings.get(name))
    }

    /// Overwrite the innermost binding of `name`. Returns false if unbound.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.scopes.iter_mut().rev().find_map(|s| s.bindings.get_mut(name)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Every visible binding, inner scopes shadowing outer ones.
    pub fn enumerate_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings: HashMap<String, Value> = HashMap::new();
        for scope in self.scopes.iter() {
            for (name, value) in scope.bindings.iter() {
                bindings.insert(name.clone(), value.clone());
            }
        }
        bindings.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadowing_and_assignment() {
        let mut env = Environment::new();
        env.bind("x", Value::Int(1));
        env.push_scope();
        env.bind("x", Value::Int(2));
        assert!(matches!(env.lookup("x"), Some(Value::Int(2))));
        assert!(env.assign("x", Value::Int(3)));
        env.pop_scope();
        assert!(matches!(env.lookup("x"), Some(Value::Int(1))));
        assert!(!env.assign("y", Value::Unit));
    }

    #[test]
    fn enumerate_prefers_inner_scope() {
        let mut env = Environment::new();
        env.bind("a", Value::Int(1));
        env.push_scope();
        env.bind("a", Value::Int(2));
        env.bind("b", Value::Bool(true));
        let mut seen = env.enumerate_bindings();
        seen.sort_by(|l, r| l.0.cmp(&r.0));
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0].1, Value::Int(2)));
    }
}
