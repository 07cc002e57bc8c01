//! Arithmetic tool.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool, ToolArgs, ToolCategory};

/// Longest expression accepted, in characters.
const MAX_EXPRESSION_CHARS: usize = 4096;

/// Deepest nesting of unary operators, exponents and parentheses.
const MAX_DEPTH: usize = 64;

/// Evaluate arithmetic expressions.
pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / // % **, parentheses, \
         the constants pi and e, and the functions abs, round, sqrt, min, max, pow."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate, e.g. '2 + 3 * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Math
    }

    async fn execute(&self, args: &ToolArgs) -> anyhow::Result<String> {
        let expression = required_str(args, "expression")?;
        tracing::debug!("Evaluating: {}", expression);
        let value = evaluate(expression)?;
        Ok(format_number(value))
    }
}

/// Evaluate an expression to a finite number.
pub(crate) fn evaluate(expression: &str) -> anyhow::Result<f64> {
    let chars: Vec<char> = expression.chars().collect();
    if chars.len() > MAX_EXPRESSION_CHARS {
        anyhow::bail!("Expression longer than {} characters", MAX_EXPRESSION_CHARS);
    }
    let mut parser = Parser { chars, pos: 0, depth: 0 };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        anyhow::bail!(
            "Unexpected '{}' at position {}",
            parser.chars[parser.pos],
            parser.pos
        );
    }
    if !value.is_finite() {
        anyhow::bail!("Result is not a finite number");
    }
    Ok(value)
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    /// Consume `token` if it is next.
    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        let len = token.chars().count();
        let matches = self.pos + len <= self.chars.len()
            && self.chars[self.pos..self.pos + len].iter().copied().eq(token.chars());
        if matches {
            self.pos += len;
        }
        matches
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> anyhow::Result<f64> {
        let mut value = self.term()?;
        loop {
            if self.eat("+") {
                value += self.term()?;
            } else if self.eat("-") {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    // term := unary (('*' | '//' | '/' | '%') unary)*
    fn term(&mut self) -> anyhow::Result<f64> {
        let mut value = self.unary()?;
        loop {
            if self.eat("*") {
                value *= self.unary()?;
            } else if self.eat("//") {
                value = (value / nonzero(self.unary()?)?).floor();
            } else if self.eat("/") {
                value /= nonzero(self.unary()?)?;
            } else if self.eat("%") {
                let rhs = nonzero(self.unary()?)?;
                value = value - rhs * (value / rhs).floor();
            } else {
                return Ok(value);
            }
        }
    }

    // Every recursive path passes through here.
    fn unary(&mut self) -> anyhow::Result<f64> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            anyhow::bail!("Expression nested too deeply");
        }
        let value = self.signed();
        self.depth -= 1;
        value
    }

    // unary := ('-' | '+') unary | power
    fn signed(&mut self) -> anyhow::Result<f64> {
        if self.eat("-") {
            Ok(-self.unary()?)
        } else if self.eat("+") {
            self.unary()
        } else {
            self.power()
        }
    }

    // power := primary ('**' unary)?
    fn power(&mut self) -> anyhow::Result<f64> {
        let base = self.primary()?;
        if self.eat("**") {
            let exponent = self.unary()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> anyhow::Result<f64> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                if !self.eat(")") {
                    anyhow::bail!("Missing closing parenthesis");
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.identifier(),
            Some(c) => anyhow::bail!("Unexpected '{}' at position {}", c, self.pos),
            None => anyhow::bail!("Unexpected end of expression"),
        }
    }

    fn number(&mut self) -> anyhow::Result<f64> {
        let start = self.pos;
        while self.pos < self.chars.len() && (self.chars[self.pos].is_ascii_digit() || self.chars[self.pos] == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid number '{}'", literal))
    }

    fn identifier(&mut self) -> anyhow::Result<f64> {
        let start = self.pos;
        while self.pos < self.chars.len() && self.chars[self.pos].is_ascii_alphanumeric() {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if !self.eat("(") {
            return match name.as_str() {
                "pi" => Ok(std::f64::consts::PI),
                "e" => Ok(std::f64::consts::E),
                _ => anyhow::bail!("Unknown constant '{}'", name),
            };
        }

        let mut args = Vec::new();
        if !self.eat(")") {
            loop {
                args.push(self.expr()?);
                if self.eat(",") {
                    continue;
                }
                if self.eat(")") {
                    break;
                }
                anyhow::bail!("Expected ',' or ')' in call to {}", name);
            }
        }
        apply(&name, &args)
    }
}

fn nonzero(value: f64) -> anyhow::Result<f64> {
    if value == 0.0 {
        anyhow::bail!("Division by zero");
    }
    Ok(value)
}

fn apply(name: &str, args: &[f64]) -> anyhow::Result<f64> {
    let arity = |n: usize| -> anyhow::Result<()> {
        if args.len() != n {
            anyhow::bail!("{} expects {} argument(s), got {}", name, n, args.len());
        }
        Ok(())
    };

    match name {
        "abs" => {
            arity(1)?;
            Ok(args[0].abs())
        }
        "round" => {
            arity(1)?;
            Ok(args[0].round())
        }
        "sqrt" => {
            arity(1)?;
            if args[0] < 0.0 {
                anyhow::bail!("sqrt of a negative number");
            }
            Ok(args[0].sqrt())
        }
        "pow" => {
            arity(2)?;
            Ok(args[0].powf(args[1]))
        }
        "min" | "max" => {
            if args.is_empty() {
                anyhow::bail!("{} expects at least one argument", name);
            }
            let fold: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
            Ok(args[1..].iter().copied().fold(args[0], fold))
        }
        _ => anyhow::bail!("Unknown function '{}'", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 ** 3 ** 2").unwrap(), 512.0);
        assert_eq!(evaluate("-2 ** 2").unwrap(), -4.0);
        assert_eq!(evaluate("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(evaluate("7 // 2").unwrap(), 3.0);
        assert_eq!(evaluate("-7 % 3").unwrap(), 2.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(evaluate("max(1, 5, 3)").unwrap(), 5.0);
        assert_eq!(evaluate("min(4, -2)").unwrap(), -2.0);
        assert_eq!(evaluate("pow(2, 10)").unwrap(), 1024.0);
        assert_eq!(evaluate("sqrt(16) + abs(-1)").unwrap(), 5.0);
        assert!((evaluate("pi").unwrap() - std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn errors_are_reported() {
        assert!(evaluate("1 / 0").unwrap_err().to_string().contains("Division by zero"));
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("foo(1)").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let signs = format!("{}1", "-".repeat(200_000));
        assert!(evaluate(&signs).unwrap_err().to_string().contains("longer than"));

        let parens = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(evaluate(&parens).unwrap_err().to_string().contains("nested too deeply"));

        let minus = format!("{}1", "-".repeat(100));
        assert!(evaluate(&minus).unwrap_err().to_string().contains("nested too deeply"));

        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);
        assert_eq!(evaluate("--1").unwrap(), 1.0);
    }

    #[tokio::test]
    async fn formats_integral_results_without_fraction() {
        let mut args = ToolArgs::new();
        args.insert("expression".into(), json!("6 * 7"));
        assert_eq!(Calculator.execute(&args).await.unwrap(), "42");

        args.insert("expression".into(), json!("1 / 4"));
        assert_eq!(Calculator.execute(&args).await.unwrap(), "0.25");
    }
}
