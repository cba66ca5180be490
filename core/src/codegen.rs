//! Rendering of expression trees and statements into source text
//!
//! The line [`Formatter`] follows the srcgen formatter used by cranelift's meta crates: it
//! collects indented lines and hands back the finished text.
use std::{fmt, str::FromStr};

use itertools::Itertools;

use crate::expr::{BinOp, Expr, ShiftDir};

static SHIFTWIDTH: usize = 4;

/// Target language of generated code
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum Syntax {
    /// C99: binary literals padded to the literal width, `name(arg = arg)` dispatch
    #[default]
    C,
    /// Rust: grouped hex literals, positional dispatch, `match` for switches
    Rust,
}

impl FromStr for Syntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "c" => Ok(Syntax::C),
            "rust" | "rs" => Ok(Syntax::Rust),
            other => Err(format!("unknown syntax `{other}`, expected `c` or `rust`")),
        }
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::C => write!(f, "c"),
            Syntax::Rust => write!(f, "rust"),
        }
    }
}

/// A generated statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Declare an unsigned variable of the instruction word's type
    Let { name: String, value: Expr, word_width: u32 },
    /// Declare a boolean variable
    Flag { name: String, value: Expr },
    /// Expression statement, typically a handler call
    Expr(Expr),
    /// Leave the enclosing decoder function
    Return,
    /// Multi-way branch on the value of `scrutinee`; arm keys are literals
    Switch { scrutinee: Expr, arms: Vec<(Expr, Vec<Stmt>)>, default: Vec<Stmt> },
    /// `if` / `else if` chain with a final `else`
    If { branches: Vec<(Expr, Vec<Stmt>)>, otherwise: Vec<Stmt> },
}

/// Turn an operation or field name into a valid identifier
pub fn ident(name: &str) -> String {
    let mut out: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Smallest standard unsigned width holding `bits`
pub(crate) fn container_bits(bits: u32) -> u32 {
    match bits {
        0..=8 => 8,
        9..=16 => 16,
        17..=32 => 32,
        _ => 64,
    }
}

impl Syntax {
    /// Render a literal with `width` bits of precision
    pub fn literal(self, value: u64, width: u32) -> String {
        let width = width.max(1) as usize;
        match self {
            Syntax::C => format!("0b{value:0width$b}"),
            Syntax::Rust => {
                let digits = format!("{value:0w$X}", w = width.div_ceil(4));
                let groups = digits
                    .as_bytes()
                    .rchunks(4)
                    .rev()
                    .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
                    .join("_");
                format!("0x{groups}")
            }
        }
    }

    fn op_str(self, op: BinOp) -> &'static str {
        match op {
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Eq => "==",
            BinOp::LogicalAnd => "&&",
        }
    }

    fn uint_type(self, word_width: u32) -> String {
        let bits = container_bits(word_width);
        match self {
            Syntax::C => format!("uint{bits}_t"),
            Syntax::Rust => format!("u{bits}"),
        }
    }

    /// Render an expression. The outermost operator is left unparenthesized.
    pub fn expr(self, expr: &Expr) -> String {
        self.expr_inner(expr, true)
    }

    fn expr_inner(self, expr: &Expr, top: bool) -> String {
        let wrap = |text: String| if top { text } else { format!("({text})") };
        match expr {
            Expr::Var(name) => name.clone(),
            Expr::Lit { value, width } => self.literal(*value, *width),
            Expr::Binary { op, lhs, rhs } => {
                let terms = if op.is_associative() {
                    expr.flatten(*op)
                } else {
                    vec![lhs.as_ref(), rhs.as_ref()]
                };
                let text = terms
                    .into_iter()
                    .map(|term| self.expr_inner(term, false))
                    .join(&format!(" {} ", self.op_str(*op)));
                wrap(text)
            }
            Expr::Cast { value, width } => {
                let ty = self.uint_type(*width);
                match self {
                    Syntax::C => format!("({ty}){}", self.expr_inner(value, false)),
                    Syntax::Rust => wrap(format!("{} as {ty}", self.expr_inner(value, false))),
                }
            }
            Expr::Shift { dir, value, amount } => {
                let op = match dir {
                    ShiftDir::Left => "<<",
                    ShiftDir::Right => ">>",
                };
                wrap(format!("{} {op} {amount}", self.expr_inner(value, false)))
            }
            Expr::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|(param, value)| match self {
                        Syntax::C => format!("{param} = {}", self.expr(value)),
                        Syntax::Rust => self.expr(value),
                    })
                    .join(", ");
                format!("{callee}({args})")
            }
        }
    }

    /// Render statements into `fmt`
    pub fn stmts(self, fmt: &mut Formatter, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(fmt, stmt);
        }
    }

    fn stmt(self, fmt: &mut Formatter, stmt: &Stmt) {
        match stmt {
            Stmt::Let { name, value, word_width } => {
                let head = match self {
                    Syntax::C => format!("{} {name} =", self.uint_type(*word_width)),
                    Syntax::Rust => format!("let {name}: {} =", self.uint_type(*word_width)),
                };
                self.assignment(fmt, head, value);
            }
            Stmt::Flag { name, value } => {
                let head = match self {
                    Syntax::C => format!("bool {name} ="),
                    Syntax::Rust => format!("let {name}: bool ="),
                };
                self.assignment(fmt, head, value);
            }
            Stmt::Expr(expr) => fmt.line(format!("{};", self.expr(expr))),
            Stmt::Return => fmt.line("return;"),
            Stmt::Switch { scrutinee, arms, default } => self.switch(fmt, scrutinee, arms, default),
            Stmt::If { branches, otherwise } => self.if_chain(fmt, branches, otherwise),
        }
    }

    /// `head value;` with multi-term or chains broken one term per line
    fn assignment(self, fmt: &mut Formatter, head: String, value: &Expr) {
        let terms = value.flatten(BinOp::Or);
        if terms.len() == 1 {
            fmt.line(format!("{head} {};", self.expr(value)));
            return;
        }
        fmt.line(head);
        fmt.indent(|fmt| {
            let last = terms.len() - 1;
            for (i, term) in terms.into_iter().enumerate() {
                let term = self.expr_inner(term, false);
                if i == last {
                    fmt.line(format!("{term};"));
                } else {
                    fmt.line(format!("{term} |"));
                }
            }
        });
    }

    fn switch(
        self,
        fmt: &mut Formatter,
        scrutinee: &Expr,
        arms: &[(Expr, Vec<Stmt>)],
        default: &[Stmt],
    ) {
        match self {
            Syntax::C => {
                fmt.line(format!("switch ({}) {{", self.expr(scrutinee)));
                fmt.indent(|fmt| {
                    for (key, body) in arms {
                        fmt.line(format!("case {}: {{", self.expr(key)));
                        fmt.indent(|fmt| {
                            self.stmts(fmt, body);
                            fmt.line("break;");
                        });
                        fmt.line("}");
                    }
                    fmt.line("default: {");
                    fmt.indent(|fmt| {
                        self.stmts(fmt, default);
                        fmt.line("break;");
                    });
                    fmt.line("}");
                });
                fmt.line("}");
            }
            Syntax::Rust => {
                fmt.line(format!("match {} {{", self.expr(scrutinee)));
                fmt.indent(|fmt| {
                    for (key, body) in arms {
                        fmt.line(format!("{} => {{", self.expr(key)));
                        fmt.indent(|fmt| self.stmts(fmt, body));
                        fmt.line("}");
                    }
                    fmt.line("_ => {");
                    fmt.indent(|fmt| self.stmts(fmt, default));
                    fmt.line("}");
                });
                fmt.line("}");
            }
        }
    }

    fn if_chain(self, fmt: &mut Formatter, branches: &[(Expr, Vec<Stmt>)], otherwise: &[Stmt]) {
        if branches.is_empty() {
            self.stmts(fmt, otherwise);
            return;
        }
        let cond = |expr: &Expr| match self {
            Syntax::C => format!("({})", self.expr(expr)),
            Syntax::Rust => self.expr(expr),
        };
        for (i, (test, body)) in branches.iter().enumerate() {
            if i == 0 {
                fmt.line(format!("if {} {{", cond(test)));
            } else {
                fmt.line(format!("}} else if {} {{", cond(test)));
            }
            fmt.indent(|fmt| self.stmts(fmt, body));
        }
        if !otherwise.is_empty() {
            fmt.line("} else {");
            fmt.indent(|fmt| self.stmts(fmt, otherwise));
        }
        fmt.line("}");
    }
}

/// Collect generated source lines and keep track of indentation
#[derive(Debug, Default)]
pub struct Formatter {
    indent: usize,
    lines: Vec<String>,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increase current indentation level by one.
    pub fn indent_push(&mut self) {
        self.indent += 1;
    }

    /// Decrease indentation by one level.
    pub fn indent_pop(&mut self) {
        assert!(self.indent > 0, "Already at top level indentation");
        self.indent -= 1;
    }

    /// Write all formatting commands in `f` while indented one level.
    pub fn indent<T, F: FnOnce(&mut Formatter) -> T>(&mut self, f: F) -> T {
        self.indent_push();
        let ret = f(self);
        self.indent_pop();
        ret
    }

    /// Add an indented line.
    pub fn line(&mut self, contents: impl AsRef<str>) {
        let contents = contents.as_ref();
        if contents.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{:1$}{contents}", "", self.indent * SHIFTWIDTH));
        }
    }

    /// Push an empty line.
    pub fn empty_line(&mut self) {
        self.lines.push(String::new());
    }

    /// Add a comment line.
    pub fn comment(&mut self, s: impl AsRef<str>) {
        self.line(format!("// {}", s.as_ref()));
    }

    /// The collected text, one `\n` after every line
    pub fn finish(&self) -> String {
        self.lines.iter().map(|l| format!("{l}\n")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expr::emit_extraction, field::FieldCompiler};

    #[test]
    fn test_shamt_c_expression() {
        let field = FieldCompiler::new(32).compile("shamt", &["24:20"], 0).unwrap();
        let expr = emit_extraction(&field, "inst");
        assert_eq!(Syntax::C.expr(&expr), "(inst & 0b00000001111100000000000000000000) >> 20");
        assert_eq!(Syntax::Rust.expr(&expr), "(inst & 0x01F0_0000) >> 20");
    }

    #[test]
    fn test_multi_segment_statement() {
        let field =
            FieldCompiler::new(32).compile("str_imm", &["11:7", "31:25"], 0).unwrap();
        let stmt = Stmt::Let {
            name: "str_imm".into(),
            value: emit_extraction(&field, "inst"),
            word_width: 32,
        };
        let mut fmt = Formatter::new();
        Syntax::C.stmts(&mut fmt, &[stmt]);
        assert_eq!(
            fmt.finish(),
            "uint32_t str_imm =\n    \
             ((inst & 0b00000000000000000000111110000000) >> 7) |\n    \
             ((inst & 0b11111110000000000000000000000000) >> 20);\n"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(Syntax::C.literal(0b0110011, 7), "0b0110011");
        assert_eq!(Syntax::Rust.literal(0x33, 7), "0x33");
        assert_eq!(Syntax::Rust.literal(0xFE00_0000, 32), "0xFE00_0000");
        assert_eq!(Syntax::Rust.literal(0x1_0000, 17), "0x1_0000");
    }

    #[test]
    fn test_call_and_recognizer() {
        let call = Expr::Call {
            callee: "add".into(),
            args: vec![("rd".into(), Expr::var("rd")), ("rs1".into(), Expr::var("rs1"))],
        };
        assert_eq!(Syntax::C.expr(&call), "add(rd = rd, rs1 = rs1)");
        assert_eq!(Syntax::Rust.expr(&call), "add(rd, rs1)");

        let test = Expr::chain(
            BinOp::LogicalAnd,
            [
                Expr::binary(BinOp::Eq, Expr::var("opcode"), Expr::lit(0b0110011, 7)),
                Expr::binary(BinOp::Eq, Expr::var("funct3"), Expr::lit(0, 3)),
                Expr::binary(BinOp::Eq, Expr::var("funct7"), Expr::lit(0, 7)),
            ],
        )
        .unwrap();
        assert_eq!(
            Syntax::C.expr(&test),
            "(opcode == 0b0110011) && (funct3 == 0b000) && (funct7 == 0b0000000)"
        );
    }

    #[test]
    fn test_single_comparison() {
        let test = Expr::binary(BinOp::Eq, Expr::var("opcode"), Expr::lit(0x33, 7));
        assert_eq!(Syntax::C.expr(&test), "opcode == 0b0110011");
        assert_eq!(Syntax::Rust.expr(&test), "opcode == 0x33");

        let nested = Expr::binary(BinOp::Eq, test, Expr::lit(1, 1));
        assert_eq!(Syntax::C.expr(&nested), "(opcode == 0b0110011) == 0b1");
    }

    #[test]
    fn test_widened_source() {
        let field = FieldCompiler::new(16).compile("imm", &["15:12"], 14).unwrap();
        let source = Expr::cast(Expr::var("inst"), field.value_width());
        let expr = crate::expr::emit_extraction_from(&field, &source);
        assert_eq!(Syntax::Rust.expr(&expr), "((inst as u32) & 0xF000) << 2");
        assert_eq!(Syntax::C.expr(&expr), "((uint32_t)inst & 0b1111000000000000) << 2");
        assert_eq!(expr.eval(&|_| Some(0xF000)), Some(0xF << 14));
    }

    #[test]
    fn test_switch_rendering() {
        let stmt = Stmt::Switch {
            scrutinee: Expr::var("funct3"),
            arms: vec![(
                Expr::lit(1, 3),
                vec![Stmt::Expr(Expr::Call { callee: "sll".into(), args: vec![] })],
            )],
            default: vec![Stmt::Expr(Expr::Call { callee: "undef".into(), args: vec![] })],
        };
        let mut fmt = Formatter::new();
        Syntax::Rust.stmts(&mut fmt, std::slice::from_ref(&stmt));
        assert_eq!(
            fmt.finish(),
            "match funct3 {\n    0x1 => {\n        sll();\n    }\n    _ => {\n        undef();\n    }\n}\n"
        );

        let mut fmt = Formatter::new();
        Syntax::C.stmts(&mut fmt, &[stmt]);
        assert!(fmt.finish().starts_with("switch (funct3) {\n    case 0b001: {\n        sll();\n        break;\n"));
    }

    #[test]
    fn test_ident() {
        assert_eq!(ident("fence.i"), "fence_i");
        assert_eq!(ident("c.addi4spn"), "c_addi4spn");
        assert_eq!(ident("3op"), "_3op");
    }

    #[test]
    fn test_syntax_from_str() {
        assert_eq!("C".parse(), Ok(Syntax::C));
        assert_eq!("rs".parse(), Ok(Syntax::Rust));
        assert!("go".parse::<Syntax>().is_err());
    }
}
