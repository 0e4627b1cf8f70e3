//! Restricted evaluation for `EXEC { ... }` blocks.
//!
//! Not a general-purpose language: a closed expression grammar over bit
//! strings with a whitelist of pure functions, a step budget, and no access
//! to ambient state (no clock, no randomness, no I/O). The only input is
//! the current buffer, bound to the name `bits`; the result must be a bit
//! string.
//!
//! ```text
//! expr := 'bits' | BITSTRING | NUMBER | ident '(' [expr {',' expr}] ')'
//! ```
//!
//! Functions: not, and, or, xor, rev, concat, slice, head, tail, repeat,
//! zeros, ones.

use crate::is_bit_string;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ScriptError(pub String);

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bits(String),
    Number(u64),
}

impl Value {
    fn bits(self, ctx: &str) -> Result<String, ScriptError> {
        match self {
            Value::Bits(b) => Ok(b),
            Value::Number(n) => Err(ScriptError(format!(
                "{ctx}: expected a bit string, got number {n}"
            ))),
        }
    }
}

/// Evaluate `code` against `bits` within `step_budget` evaluation steps.
/// Every expression node costs one step; exceeding the budget is an error,
/// so scripts cannot loop the interpreter forever.
pub fn evaluate(code: &str, bits: &str, step_budget: u64) -> Result<String, ScriptError> {
    let tokens = tokenize(code)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        steps_left: step_budget,
        bits,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ScriptError(format!(
            "trailing input after expression: {:?}",
            parser.tokens[parser.pos..].to_vec()
        )));
    }
    let out = value.bits("script result")?;
    if !out.is_empty() && !is_bit_string(&out) {
        return Err(ScriptError(format!("script produced a non-bit string {out:?}")));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    BitsLit(String),
    NumberLit(u64),
    LParen,
    RParen,
    Comma,
}

fn tokenize(code: &str) -> Result<Vec<Token>, ScriptError> {
    let mut out = Vec::new();
    let mut chars = code.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                out.push(Token::LParen);
                chars.next();
            }
            ')' => {
                out.push(Token::RParen);
                chars.next();
            }
            ',' => {
                out.push(Token::Comma);
                chars.next();
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Token::Ident(word.to_ascii_lowercase()));
            }
            c if c.is_ascii_digit() => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // All-binary digit runs are bit-string literals; anything
                // else is a number. `slice(bits, 0, 4)` still works because
                // bit literals convert to numbers on demand.
                if word.bytes().all(|b| b == b'0' || b == b'1') {
                    out.push(Token::BitsLit(word));
                } else {
                    let n = word
                        .parse()
                        .map_err(|_| ScriptError(format!("invalid number {word:?}")))?;
                    out.push(Token::NumberLit(n));
                }
            }
            _ => {
                return Err(ScriptError(format!(
                    "unexpected character {c:?} at offset {i}"
                )));
            }
        }
    }
    Ok(out)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    steps_left: u64,
    bits: &'a str,
}

impl Parser<'_> {
    fn spend(&mut self) -> Result<(), ScriptError> {
        if self.steps_left == 0 {
            return Err(ScriptError("script step budget exhausted".to_string()));
        }
        self.steps_left -= 1;
        Ok(())
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token) -> Result<(), ScriptError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(ScriptError(format!("expected {token:?}, got {other:?}"))),
        }
    }

    fn expr(&mut self) -> Result<Value, ScriptError> {
        self.spend()?;
        match self.next() {
            Some(Token::BitsLit(b)) => Ok(Value::Bits(b)),
            Some(Token::NumberLit(n)) => Ok(Value::Number(n)),
            Some(Token::Ident(name)) if name == "bits" => Ok(Value::Bits(self.bits.to_string())),
            Some(Token::Ident(name)) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.tokens.get(self.pos) != Some(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        match self.tokens.get(self.pos) {
                            Some(Token::Comma) => {
                                self.pos += 1;
                            }
                            _ => break,
                        }
                    }
                }
                self.expect(Token::RParen)?;
                call(&name, args)
            }
            other => Err(ScriptError(format!("unexpected token {other:?}"))),
        }
    }
}

fn as_len(v: Value, ctx: &str) -> Result<usize, ScriptError> {
    match v {
        Value::Number(n) => Ok(n as usize),
        // A bit literal like `10` can also mean the number ten.
        Value::Bits(b) => b
            .parse::<u64>()
            .map(|n| n as usize)
            .map_err(|_| ScriptError(format!("{ctx}: expected a number"))),
    }
}

fn arity(name: &str, args: &[Value], n: usize) -> Result<(), ScriptError> {
    if args.len() != n {
        return Err(ScriptError(format!(
            "{name} takes {n} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn zip_gate(name: &str, a: String, b: String, f: impl Fn(bool, bool) -> bool) -> Result<Value, ScriptError> {
    if a.len() != b.len() {
        return Err(ScriptError(format!(
            "{name}: operand lengths differ ({} vs {})",
            a.len(),
            b.len()
        )));
    }
    Ok(Value::Bits(
        a.bytes()
            .zip(b.bytes())
            .map(|(x, y)| if f(x == b'1', y == b'1') { '1' } else { '0' })
            .collect(),
    ))
}

fn call(name: &str, mut args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "not" => {
            arity(name, &args, 1)?;
            let a = args.remove(0).bits(name)?;
            Ok(Value::Bits(
                a.bytes().map(|b| if b == b'1' { '0' } else { '1' }).collect(),
            ))
        }
        "and" | "or" | "xor" => {
            arity(name, &args, 2)?;
            let b = args.remove(1).bits(name)?;
            let a = args.remove(0).bits(name)?;
            match name {
                "and" => zip_gate(name, a, b, |x, y| x && y),
                "or" => zip_gate(name, a, b, |x, y| x || y),
                _ => zip_gate(name, a, b, |x, y| x != y),
            }
        }
        "rev" => {
            arity(name, &args, 1)?;
            let a = args.remove(0).bits(name)?;
            Ok(Value::Bits(a.chars().rev().collect()))
        }
        "concat" => {
            arity(name, &args, 2)?;
            let b = args.remove(1).bits(name)?;
            let a = args.remove(0).bits(name)?;
            Ok(Value::Bits(format!("{a}{b}")))
        }
        "slice" => {
            arity(name, &args, 3)?;
            let end = as_len(args.remove(2), name)?;
            let start = as_len(args.remove(1), name)?;
            let a = args.remove(0).bits(name)?;
            if start > end || end > a.len() {
                return Err(ScriptError(format!(
                    "slice bounds [{start}:{end}] out of range for length {}",
                    a.len()
                )));
            }
            Ok(Value::Bits(a[start..end].to_string()))
        }
        "head" => {
            arity(name, &args, 2)?;
            let n = as_len(args.remove(1), name)?;
            let a = args.remove(0).bits(name)?;
            let n = n.min(a.len());
            Ok(Value::Bits(a[..n].to_string()))
        }
        "tail" => {
            arity(name, &args, 2)?;
            let n = as_len(args.remove(1), name)?;
            let a = args.remove(0).bits(name)?;
            let n = n.min(a.len());
            Ok(Value::Bits(a[a.len() - n..].to_string()))
        }
        "repeat" => {
            arity(name, &args, 2)?;
            let n = as_len(args.remove(1), name)?;
            let a = args.remove(0).bits(name)?;
            if a.len().saturating_mul(n) > 1 << 20 {
                return Err(ScriptError("repeat result too large".to_string()));
            }
            Ok(Value::Bits(a.repeat(n)))
        }
        "zeros" => {
            arity(name, &args, 1)?;
            let n = as_len(args.remove(0), name)?;
            Ok(Value::Bits("0".repeat(n.min(1 << 20))))
        }
        "ones" => {
            arity(name, &args, 1)?;
            let n = as_len(args.remove(0), name)?;
            Ok(Value::Bits("1".repeat(n.min(1 << 20))))
        }
        other => Err(ScriptError(format!("unknown function {other:?}"))),
    }
}
