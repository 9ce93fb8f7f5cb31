//! # Template engine
//!
//! Every `req`, `res` contract, variable value and component `args` block in
//! a test tree is a template: a JSON-shaped structure whose string leaves may
//! compute their value from the current bindings (`var`, `seed`, `x`, `res`,
//! ...). The engine walks the structure and returns a structure of the same
//! shape.
//!
//! ## Prefixes
//!
//! The first character of a string leaf selects how it is rendered:
//!
//! | Prefix | Meaning                                                   |
//! |--------|-----------------------------------------------------------|
//! | `#`    | evaluate the rest as an expression, keep the value's type |
//! | `%`    | run a small script (assignments + final expression)       |
//! | `!`    | expression yielding a list, spliced into the parent list  |
//! | `$`    | run the rest through `sh -c`, value is trimmed stdout     |
//!
//! Unprefixed strings pass through untouched except for `${dotted.path}`
//! placeholders, which interpolate the bound value as text.
//!
//! ## Expressions
//!
//! Dotted paths over the bindings (`res.body.code`, `seed.user[0].name`),
//! literals, arithmetic, comparisons, `&&`/`||`/`!`, and the builtins
//! `len`, `str`, `int`, `float`. There is no control flow; a template that
//! needs iteration uses the `!` splice form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::errors::BenchError;

static INTERPOLATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_][A-Za-z0-9_.\[\]-]*)\}").expect("valid interpolation regex")
});

/// Bindings visible to a render call. Keys are top-level namespaces
/// (`var`, `seed`, `x`, `res`, ...).
pub type Bindings = Map<String, Value>;

/// Seam between the core and the renderer: bindings in, same shape out.
pub trait Render: Send + Sync {
    fn render(&self, value: &Value, bindings: &Bindings) -> Result<Value, BenchError>;
}

/// The default engine. Prefixes are configurable through the customize file.
#[derive(Debug, Clone)]
pub struct Engine {
    eval: String,
    exec: String,
    splice: String,
    shell: String,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new("#", "%", "!", "$")
    }
}

impl Engine {
    pub fn new(
        eval: impl Into<String>,
        exec: impl Into<String>,
        splice: impl Into<String>,
        shell: impl Into<String>,
    ) -> Self {
        Self {
            eval: eval.into(),
            exec: exec.into(),
            splice: splice.into(),
            shell: shell.into(),
        }
    }

    fn render_string(&self, s: &str, bindings: &Bindings) -> Result<Value, BenchError> {
        if let Some(expr) = s.strip_prefix(self.eval.as_str()) {
            return eval_expr(expr, bindings).map_err(|e| BenchError::render(s, e));
        }
        if let Some(script) = s.strip_prefix(self.exec.as_str()) {
            return eval_script(script, bindings).map_err(|e| BenchError::render(s, e));
        }
        if let Some(expr) = s.strip_prefix(self.splice.as_str()) {
            let value = eval_expr(expr, bindings).map_err(|e| BenchError::render(s, e))?;
            if !value.is_array() {
                return Err(BenchError::render(s, "splice expression must yield a list"));
            }
            return Ok(value);
        }
        if let Some(cmd) = s.strip_prefix(self.shell.as_str()) {
            // `${...}` is interpolation, not a shell command starting with `{`.
            if !cmd.starts_with('{') {
                return shell_substitute(cmd).map_err(|e| BenchError::render(s, e));
            }
        }
        interpolate(s, bindings).map(Value::String)
    }

    fn render_value(&self, value: &Value, bindings: &Bindings) -> Result<Value, BenchError> {
        match value {
            Value::String(s) => self.render_string(s, bindings),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    // A splice element expands in place instead of nesting.
                    let is_splice = matches!(item, Value::String(s) if s.starts_with(self.splice.as_str()));
                    let rendered = self.render_value(item, bindings)?;
                    if is_splice {
                        match rendered {
                            Value::Array(inner) => out.extend(inner),
                            other => out.push(other),
                        }
                    } else {
                        out.push(rendered);
                    }
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.render_value(v, bindings)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

impl Render for Engine {
    fn render(&self, value: &Value, bindings: &Bindings) -> Result<Value, BenchError> {
        self.render_value(value, bindings)
    }
}

/// Interpolates `${path}` placeholders inside a plain string.
fn interpolate(input: &str, bindings: &Bindings) -> Result<String, BenchError> {
    let mut out = String::new();
    let mut last = 0;
    for capture in INTERPOLATION_RE.captures_iter(input) {
        let whole = capture.get(0).expect("regex group 0");
        out.push_str(&input[last..whole.start()]);
        let path = capture.get(1).expect("regex group 1").as_str();
        let value = eval_expr(path, bindings)
            .map_err(|e| BenchError::render(input, format!("placeholder `{path}`: {e}")))?;
        match value {
            Value::String(s) => out.push_str(&s),
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Runs a command through `sh -c` and returns its trimmed stdout.
fn shell_substitute(cmd: &str) -> Result<Value, String> {
    let output = std::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| format!("spawn failed: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "exit status {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Value::String(stdout.trim_end_matches('\n').to_string()))
}

/// Evaluates a `%` script: `name = expr` statements building up a scratch
/// scope, with the final bare expression as the script's value.
fn eval_script(script: &str, bindings: &Bindings) -> Result<Value, String> {
    static ASSIGN_RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=([^=].*)$").expect("assign regex"));

    let mut scope = bindings.clone();
    let mut result = Value::Null;
    for stmt in script.split(|c| c == ';' || c == '\n') {
        if stmt.trim().is_empty() {
            continue;
        }
        if let Some(caps) = ASSIGN_RE.captures(stmt) {
            let name = caps.get(1).expect("assign name").as_str();
            let value = eval_expr(caps.get(2).expect("assign expr").as_str(), &scope)?;
            scope.insert(name.to_string(), value);
            result = Value::Null;
        } else {
            result = eval_expr(stmt, &scope)?;
        }
    }
    Ok(result)
}

/// Evaluates one expression against the bindings.
pub fn eval_expr(expr: &str, bindings: &Bindings) -> Result<Value, String> {
    let tokens = lex(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        bindings,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("unexpected trailing input in `{}`", expr.trim()));
    }
    Ok(value)
}

// ----------------------------------------------------------------------------
// Lexer
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut is_float = false;
                if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    is_float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                if is_float {
                    tokens.push(Token::Float(text.parse().map_err(|e| format!("{e}"))?));
                } else {
                    tokens.push(Token::Int(text.parse().map_err(|e| format!("{e}"))?));
                }
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut text = String::new();
                loop {
                    if i >= chars.len() {
                        return Err("unterminated string literal".to_string());
                    }
                    match chars[i] {
                        '\\' if i + 1 < chars.len() => {
                            let escaped = chars[i + 1];
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 2;
                        }
                        ch if ch == quote => {
                            i += 1;
                            break;
                        }
                        ch => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(text));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("<="));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(">="));
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::Op("&&"));
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Op("||"));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op("<"));
                i += 1;
            }
            '>' => {
                tokens.push(Token::Op(">"));
                i += 1;
            }
            '!' => {
                tokens.push(Token::Op("!"));
                i += 1;
            }
            '+' => {
                tokens.push(Token::Op("+"));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op("-"));
                i += 1;
            }
            '*' => {
                tokens.push(Token::Op("*"));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op("/"));
                i += 1;
            }
            '%' => {
                tokens.push(Token::Op("%"));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Op("("));
                i += 1;
            }
            ')' => {
                tokens.push(Token::Op(")"));
                i += 1;
            }
            '[' => {
                tokens.push(Token::Op("["));
                i += 1;
            }
            ']' => {
                tokens.push(Token::Op("]"));
                i += 1;
            }
            ',' => {
                tokens.push(Token::Op(","));
                i += 1;
            }
            '.' => {
                tokens.push(Token::Op("."));
                i += 1;
            }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }
    Ok(tokens)
}

// ----------------------------------------------------------------------------
// Parser / evaluator
// ----------------------------------------------------------------------------

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    bindings: &'a Bindings,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Token::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &'static str) -> Result<(), String> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(format!("expected `{op}`"))
        }
    }

    fn parse_or(&mut self) -> Result<Value, String> {
        let mut left = self.parse_and()?;
        while self.eat_op("||") {
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, String> {
        let mut left = self.parse_cmp()?;
        while self.eat_op("&&") {
            let right = self.parse_cmp()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Value, String> {
        let left = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Op(o @ ("==" | "!=" | "<=" | ">=" | "<" | ">"))) => *o,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_add()?;
        compare(op, &left, &right)
    }

    fn parse_add(&mut self) -> Result<Value, String> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(o @ ("+" | "-"))) => *o,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_mul()?;
            left = arithmetic(op, &left, &right)?;
        }
    }

    fn parse_mul(&mut self) -> Result<Value, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(o @ ("*" | "/" | "%"))) => *o,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = arithmetic(op, &left, &right)?;
        }
    }

    fn parse_unary(&mut self) -> Result<Value, String> {
        if self.eat_op("-") {
            let value = self.parse_unary()?;
            return match value {
                Value::Number(n) if n.is_i64() => {
                    Ok(Value::Number(Number::from(-n.as_i64().expect("i64"))))
                }
                Value::Number(n) => float_value(-n.as_f64().unwrap_or(0.0)),
                other => Err(format!("cannot negate {other}")),
            };
        }
        if self.eat_op("!") {
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!truthy(&value)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Value, String> {
        let mut value = self.parse_primary()?;
        loop {
            if self.eat_op(".") {
                match self.tokens.get(self.pos).cloned() {
                    Some(Token::Ident(key)) => {
                        self.pos += 1;
                        value = index_key(&value, &key)?;
                    }
                    Some(Token::Int(idx)) => {
                        self.pos += 1;
                        value = index_list(&value, idx)?;
                    }
                    _ => return Err("expected field name after `.`".to_string()),
                }
            } else if self.eat_op("[") {
                let idx = self.parse_or()?;
                self.expect_op("]")?;
                value = match idx {
                    Value::Number(n) if n.is_i64() => {
                        index_list(&value, n.as_i64().expect("i64"))?
                    }
                    Value::String(key) => index_key(&value, &key)?,
                    other => return Err(format!("invalid index {other}")),
                };
            } else {
                return Ok(value);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Value, String> {
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Int(n)) => {
                self.pos += 1;
                Ok(Value::Number(Number::from(n)))
            }
            Some(Token::Float(f)) => {
                self.pos += 1;
                float_value(f)
            }
            Some(Token::Str(s)) => {
                self.pos += 1;
                Ok(Value::String(s))
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                match name.as_str() {
                    "true" => Ok(Value::Bool(true)),
                    "false" => Ok(Value::Bool(false)),
                    "null" => Ok(Value::Null),
                    _ if matches!(self.peek(), Some(Token::Op("("))) => self.parse_call(&name),
                    _ => self
                        .bindings
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| format!("unknown binding `{name}`")),
                }
            }
            Some(Token::Op("(")) => {
                self.pos += 1;
                let value = self.parse_or()?;
                self.expect_op(")")?;
                Ok(value)
            }
            _ => Err("unexpected end of expression".to_string()),
        }
    }

    fn parse_call(&mut self, name: &str) -> Result<Value, String> {
        self.expect_op("(")?;
        let mut args = Vec::new();
        if !self.eat_op(")") {
            loop {
                args.push(self.parse_or()?);
                if self.eat_op(")") {
                    break;
                }
                self.expect_op(",")?;
            }
        }
        builtin(name, &args)
    }
}

fn builtin(name: &str, args: &[Value]) -> Result<Value, String> {
    match (name, args) {
        ("len", [Value::String(s)]) => Ok(Value::Number(Number::from(s.chars().count() as i64))),
        ("len", [Value::Array(a)]) => Ok(Value::Number(Number::from(a.len() as i64))),
        ("len", [Value::Object(m)]) => Ok(Value::Number(Number::from(m.len() as i64))),
        ("str", [Value::String(s)]) => Ok(Value::String(s.clone())),
        ("str", [v]) => Ok(Value::String(v.to_string())),
        ("int", [Value::Number(n)]) => Ok(Value::Number(Number::from(
            n.as_f64().unwrap_or(0.0) as i64
        ))),
        ("int", [Value::String(s)]) => s
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(Number::from(n)))
            .map_err(|e| format!("int({s:?}): {e}")),
        ("float", [Value::Number(n)]) => float_value(n.as_f64().unwrap_or(0.0)),
        ("float", [Value::String(s)]) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("float({s:?}): {e}"))
            .and_then(float_value),
        _ => Err(format!("unknown function `{name}` for {} args", args.len())),
    }
}

fn index_key(value: &Value, key: &str) -> Result<Value, String> {
    match value {
        Value::Object(map) => map
            .get(key)
            .cloned()
            .ok_or_else(|| format!("missing field `{key}`")),
        other => Err(format!("cannot read field `{key}` of {other}")),
    }
}

fn index_list(value: &Value, idx: i64) -> Result<Value, String> {
    match value {
        Value::Array(items) => {
            let len = items.len() as i64;
            let resolved = if idx < 0 { len + idx } else { idx };
            if resolved < 0 || resolved >= len {
                return Err(format!("index {idx} out of range (len {len})"));
            }
            Ok(items[resolved as usize].clone())
        }
        other => Err(format!("cannot index {other} with {idx}")),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn float_value(f: f64) -> Result<Value, String> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("non-finite number {f}"))
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn arithmetic(op: &str, left: &Value, right: &Value) -> Result<Value, String> {
    if let (Value::String(a), Value::String(b), "+") = (left, right, op) {
        return Ok(Value::String(format!("{a}{b}")));
    }
    if let (Value::Number(a), Value::Number(b)) = (left, right) {
        if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
            match op {
                "+" => return Ok(Value::Number(Number::from(ai + bi))),
                "-" => return Ok(Value::Number(Number::from(ai - bi))),
                "*" => return Ok(Value::Number(Number::from(ai * bi))),
                "%" if bi != 0 => return Ok(Value::Number(Number::from(ai % bi))),
                "%" => return Err("modulo by zero".to_string()),
                _ => {}
            }
        }
        let (af, bf) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
        return match op {
            "+" => float_value(af + bf),
            "-" => float_value(af - bf),
            "*" => float_value(af * bf),
            "/" if bf != 0.0 => float_value(af / bf),
            "/" => Err("division by zero".to_string()),
            "%" if bf != 0.0 => float_value(af % bf),
            "%" => Err("modulo by zero".to_string()),
            _ => Err(format!("unsupported operator `{op}`")),
        };
    }
    Err(format!("cannot apply `{op}` to {left} and {right}"))
}

fn compare(op: &str, left: &Value, right: &Value) -> Result<Value, String> {
    let result = match op {
        "==" => values_equal(left, right),
        "!=" => !values_equal(left, right),
        _ => {
            if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
                match op {
                    "<" => a < b,
                    ">" => a > b,
                    "<=" => a <= b,
                    ">=" => a >= b,
                    _ => unreachable!(),
                }
            } else if let (Value::String(a), Value::String(b)) = (left, right) {
                match op {
                    "<" => a < b,
                    ">" => a > b,
                    "<=" => a <= b,
                    ">=" => a >= b,
                    _ => unreachable!(),
                }
            } else {
                return Err(format!("cannot order {left} and {right}"));
            }
        }
    };
    Ok(Value::Bool(result))
}

/// Equality with numeric coercion, so `1 == 1.0` holds.
fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
        return a == b;
    }
    left == right
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bindings(entries: &[(&str, &Value)]) -> Bindings {
        let mut map = Map::new();
        for (name, value) in entries {
            map.insert((*name).to_string(), (*value).clone());
        }
        map
    }

    fn b() -> Bindings {
        let var = json!({"host": "localhost", "port": 8080, "nested": {"deep": [1, 2, 3]}});
        let res = json!({"code": "OK", "status": 200, "body": {"items": ["a", "b"]}});
        let seed = json!({"user": {"name": "alice"}});
        bindings(&[("var", &var), ("res", &res), ("seed", &seed)])
    }

    #[test]
    fn test_eval_path() {
        assert_eq!(eval_expr("res.code", &b()).unwrap(), json!("OK"));
        assert_eq!(eval_expr("var.nested.deep.1", &b()).unwrap(), json!(2));
        assert_eq!(eval_expr("var.nested.deep[2]", &b()).unwrap(), json!(3));
        assert_eq!(eval_expr("res.body.items[-1]", &b()).unwrap(), json!("b"));
    }

    #[test]
    fn test_eval_arithmetic() {
        assert_eq!(eval_expr("var.port + 1", &b()).unwrap(), json!(8081));
        assert_eq!(eval_expr("2 * 3 + 4", &b()).unwrap(), json!(10));
        assert_eq!(eval_expr("2 + 3 * 4", &b()).unwrap(), json!(14));
        assert_eq!(eval_expr("10 / 4", &b()).unwrap(), json!(2.5));
        assert_eq!(eval_expr("10 % 3", &b()).unwrap(), json!(1));
        assert_eq!(eval_expr("-(1 + 2)", &b()).unwrap(), json!(-3));
    }

    #[test]
    fn test_eval_comparison_and_logic() {
        assert_eq!(eval_expr("res.status == 200", &b()).unwrap(), json!(true));
        assert_eq!(eval_expr("res.status == 200.0", &b()).unwrap(), json!(true));
        assert_eq!(eval_expr("res.code == 'OK'", &b()).unwrap(), json!(true));
        assert_eq!(
            eval_expr("res.status >= 200 && res.status < 300", &b()).unwrap(),
            json!(true)
        );
        assert_eq!(eval_expr("!false || false", &b()).unwrap(), json!(true));
    }

    #[test]
    fn test_eval_builtins() {
        assert_eq!(eval_expr("len(res.body.items)", &b()).unwrap(), json!(2));
        assert_eq!(eval_expr("str(res.status)", &b()).unwrap(), json!("200"));
        assert_eq!(eval_expr("int('42')", &b()).unwrap(), json!(42));
        assert_eq!(eval_expr("float(1)", &b()).unwrap(), json!(1.0));
    }

    #[test]
    fn test_eval_string_concat() {
        assert_eq!(
            eval_expr("var.host + ':' + str(var.port)", &b()).unwrap(),
            json!("localhost:8080")
        );
    }

    #[test]
    fn test_eval_unknown_binding_fails() {
        assert!(eval_expr("nope.code", &b()).is_err());
        assert!(eval_expr("res.missing", &b()).is_err());
    }

    #[test]
    fn test_interpolation() {
        let engine = Engine::default();
        let rendered = engine
            .render(&json!("http://${var.host}:${var.port}/ping"), &b())
            .unwrap();
        assert_eq!(rendered, json!("http://localhost:8080/ping"));
    }

    #[test]
    fn test_render_eval_prefix_keeps_type() {
        let engine = Engine::default();
        assert_eq!(engine.render(&json!("#var.port"), &b()).unwrap(), json!(8080));
        assert_eq!(
            engine.render(&json!("#res.code == 'OK'"), &b()).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_render_exec_script() {
        let engine = Engine::default();
        let rendered = engine
            .render(&json!("%base = var.port * 2; base + 1"), &b())
            .unwrap();
        assert_eq!(rendered, json!(16161));
    }

    #[test]
    fn test_render_shell_prefix() {
        let engine = Engine::default();
        let rendered = engine.render(&json!("$echo hello"), &b()).unwrap();
        assert_eq!(rendered, json!("hello"));
    }

    #[test]
    fn test_shell_prefix_does_not_swallow_placeholders() {
        let engine = Engine::default();
        let rendered = engine.render(&json!("${var.host}"), &b()).unwrap();
        assert_eq!(rendered, json!("localhost"));
    }

    #[test]
    fn test_render_splice_into_list() {
        let engine = Engine::default();
        let rendered = engine
            .render(&json!(["first", "!var.nested.deep", "last"]), &b())
            .unwrap();
        assert_eq!(rendered, json!(["first", 1, 2, 3, "last"]));
    }

    #[test]
    fn test_render_same_shape() {
        let engine = Engine::default();
        let template = json!({
            "url": "http://${var.host}/api",
            "retries": 3,
            "codes": ["#res.status", "#res.code"],
            "inner": {"enabled": true}
        });
        let rendered = engine.render(&template, &b()).unwrap();
        assert_eq!(
            rendered,
            json!({
                "url": "http://localhost/api",
                "retries": 3,
                "codes": [200, "OK"],
                "inner": {"enabled": true}
            })
        );
    }

    #[test]
    fn test_render_error_carries_input() {
        let engine = Engine::default();
        let err = engine.render(&json!("#missing.path"), &b()).unwrap_err();
        assert!(err.to_string().contains("missing.path"));
    }

    #[test]
    fn test_custom_prefixes() {
        let engine = Engine::new("@", "%", "!", "$");
        assert_eq!(engine.render(&json!("@1 + 1"), &b()).unwrap(), json!(2));
        // With `#` unbound, the string is plain text.
        assert_eq!(engine.render(&json!("#1 + 1"), &b()).unwrap(), json!("#1 + 1"));
    }
}
