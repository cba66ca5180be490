//! Runs generated statements in-process so emitted decoders can be compared with `decode`
use std::collections::HashMap;

use decgen_core::{codegen::ident, Decoder, Error, Expr, Stmt};

const SOURCE: &str = "inst";
const FALLBACK: &str = "undef";

struct Machine {
    vars: HashMap<String, u64>,
    calls: Vec<String>,
}

impl Machine {
    fn eval(&self, expr: &Expr) -> u64 {
        expr.eval(&|name| self.vars.get(name).copied()).unwrap()
    }

    /// Returns true once a `return` is executed
    fn run(&mut self, stmts: &[Stmt]) -> bool {
        for stmt in stmts {
            match stmt {
                Stmt::Let { name, value, .. } | Stmt::Flag { name, value } => {
                    let value = self.eval(value);
                    self.vars.insert(name.clone(), value);
                }
                Stmt::Expr(Expr::Call { callee, .. }) => self.calls.push(callee.clone()),
                Stmt::Expr(other) => {
                    self.eval(other);
                }
                Stmt::Return => return true,
                Stmt::Switch { scrutinee, arms, default } => {
                    let value = self.eval(scrutinee);
                    let body = arms
                        .iter()
                        .find(|(key, _)| self.eval(key) == value)
                        .map_or(default.as_slice(), |(_, body)| body.as_slice());
                    if self.run(body) {
                        return true;
                    }
                }
                Stmt::If { branches, otherwise } => {
                    let body = branches
                        .iter()
                        .find(|(test, _)| self.eval(test) != 0)
                        .map_or(otherwise.as_slice(), |(_, body)| body.as_slice());
                    if self.run(body) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// First handler the generated field section and body call for `word`
pub fn run_generated(decoder: &Decoder, word: u64) -> String {
    let mut machine = Machine { vars: HashMap::from([(SOURCE.to_string(), word)]), calls: vec![] };
    machine.run(&decoder.field_stmts(SOURCE));
    machine.run(&decoder.body_stmts(FALLBACK));
    machine.calls.into_iter().next().unwrap_or_default()
}

/// The handler `decode` selects for `word`, named the way generated code calls it
pub fn expected_call(decoder: &Decoder, word: u64) -> String {
    match decoder.decode(word) {
        Ok(m) => ident(&m.operation),
        Err(Error::NoMatch { .. }) => FALLBACK.to_string(),
        Err(other) => panic!("unexpected error {other:?}"),
    }
}
