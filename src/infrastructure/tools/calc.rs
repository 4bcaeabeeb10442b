//! Restricted arithmetic evaluator.
//!
//! Accepts numeric literals, parentheses, unary `+`/`-` and the binary
//! operators `+ - * / // % **` with Python precedence:
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/' | '//' | '%') unary)*
//! unary := ('+' | '-') unary | power
//! power := atom ('**' unary)?
//! atom  := NUMBER | '(' expr ')'
//! ```
//!
//! Anything else (names, calls, strings, other operators) is rejected while
//! tokenizing or parsing, before any evaluation happens.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::models::{JsonMap, PlannedStep, ToolName};
use crate::domain::ports::{Tool, ToolError};

/// Longest expression accepted, in characters
pub const MAX_EXPR_CHARS: usize = 1000;

/// Deepest nesting of parentheses and unary operators accepted
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ToolError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let (value, next) = number(&chars, i)?;
                tokens.push(Token::Num(value));
                i = next;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                return Err(ToolError::DisallowedSyntax(format!("name '{name}'")));
            }
            '\'' | '"' => return Err(ToolError::DisallowedSyntax("string literal".into())),
            other => return Err(ToolError::DisallowedSyntax(format!("character '{other}'"))),
        }
    }

    Ok(tokens)
}

/// Scan a decimal literal (`12`, `1.5`, `.5`, `1e-3`, `1_000`) starting at `start`.
fn number(chars: &[char], start: usize) -> Result<(f64, usize), ToolError> {
    let mut i = start;
    let mut text = String::new();

    let digits = |i: &mut usize, text: &mut String| {
        while *i < chars.len() && (chars[*i].is_ascii_digit() || chars[*i] == '_') {
            if chars[*i] != '_' {
                text.push(chars[*i]);
            }
            *i += 1;
        }
    };

    digits(&mut i, &mut text);
    if chars.get(i) == Some(&'.') {
        text.push('.');
        i += 1;
        digits(&mut i, &mut text);
    }
    if matches!(chars.get(i), Some('e' | 'E')) {
        text.push('e');
        i += 1;
        if let Some(sign @ ('+' | '-')) = chars.get(i) {
            text.push(*sign);
            i += 1;
        }
        digits(&mut i, &mut text);
    }
    // `2j`, `0x1f` and friends are not plain numbers.
    if let Some(c) = chars.get(i).filter(|c| c.is_alphanumeric() || **c == '_') {
        return Err(ToolError::DisallowedSyntax(format!("numeric literal suffix '{c}'")));
    }

    let literal: String = chars[start..i].iter().collect();
    text.parse::<f64>()
        .map(|value| (value, i))
        .map_err(|_| ToolError::Evaluation(format!("invalid number literal '{literal}'")))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn descend(&mut self) -> Result<(), ToolError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ToolError::InvalidInput(format!(
                "expression nested deeper than {MAX_DEPTH} levels"
            )));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<f64, ToolError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ToolError> {
        let mut value = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash | Token::Percent)) => op,
                _ => return Ok(value),
            };
            self.advance();
            let rhs = self.unary()?;
            value = match op {
                Token::Star => value * rhs,
                Token::Slash => {
                    if rhs == 0.0 {
                        return Err(ToolError::Evaluation("division by zero".into()));
                    }
                    value / rhs
                }
                Token::DoubleSlash => floor_div(value, rhs)?,
                _ => py_mod(value, rhs)?,
            };
        }
    }

    fn unary(&mut self) -> Result<f64, ToolError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.advance();
                self.descend()?;
                let value = self.unary()?;
                self.depth -= 1;
                Ok(value)
            }
            Some(Token::Minus) => {
                self.advance();
                self.descend()?;
                let value = self.unary()?;
                self.depth -= 1;
                Ok(-value)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, ToolError> {
        let base = self.atom()?;
        if self.peek() != Some(Token::DoubleStar) {
            return Ok(base);
        }
        self.advance();
        self.descend()?;
        let exponent = self.unary()?;
        self.depth -= 1;

        if base == 0.0 && exponent < 0.0 {
            return Err(ToolError::Evaluation(
                "0.0 cannot be raised to a negative power".into(),
            ));
        }
        Ok(base.powf(exponent))
    }

    fn atom(&mut self) -> Result<f64, ToolError> {
        match self.advance() {
            Some(Token::Num(value)) => Ok(value),
            Some(Token::LParen) => {
                self.descend()?;
                let value = self.expr()?;
                if self.advance() != Some(Token::RParen) {
                    return Err(ToolError::Evaluation("invalid syntax: '(' was never closed".into()));
                }
                self.depth -= 1;
                Ok(value)
            }
            Some(Token::RParen) => Err(ToolError::Evaluation("invalid syntax: unmatched ')'".into())),
            Some(_) => Err(ToolError::Evaluation("invalid syntax: operator without operand".into())),
            None => Err(ToolError::Evaluation("invalid syntax: unexpected end of expression".into())),
        }
    }
}

/// Floor division with Python's float semantics.
fn floor_div(a: f64, b: f64) -> Result<f64, ToolError> {
    if b == 0.0 {
        return Err(ToolError::Evaluation("integer division or modulo by zero".into()));
    }
    let modulo = a % b;
    let mut div = (a - modulo) / b;
    if modulo != 0.0 && ((b < 0.0) != (modulo < 0.0)) {
        div -= 1.0;
    }
    if div == 0.0 {
        return Ok(0.0_f64.copysign(a / b));
    }
    let floored = div.floor();
    Ok(if div - floored > 0.5 { floored + 1.0 } else { floored })
}

/// Modulo whose result takes the sign of the divisor.
fn py_mod(a: f64, b: f64) -> Result<f64, ToolError> {
    if b == 0.0 {
        return Err(ToolError::Evaluation("integer division or modulo by zero".into()));
    }
    let mut modulo = a % b;
    if modulo != 0.0 {
        if (b < 0.0) != (modulo < 0.0) {
            modulo += b;
        }
    } else {
        modulo = 0.0_f64.copysign(b);
    }
    Ok(modulo)
}

/// Evaluate `expr` under the restricted grammar.
pub fn evaluate(expr: &str) -> Result<f64, ToolError> {
    let len = expr.chars().count();
    if len > MAX_EXPR_CHARS {
        return Err(ToolError::InvalidInput(format!(
            "expression longer than {MAX_EXPR_CHARS} characters ({len})"
        )));
    }

    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(ToolError::Evaluation("invalid syntax: unexpected trailing input".into()));
    }
    if !value.is_finite() {
        return Err(ToolError::Evaluation("expression did not produce a finite number".into()));
    }
    Ok(value)
}

/// The `calc` tool.
#[derive(Debug, Default, Clone, Copy)]
pub struct CalcTool;

impl CalcTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CalcTool {
    fn name(&self) -> ToolName {
        ToolName::Calc
    }

    async fn execute(&self, step: &PlannedStep) -> Result<JsonMap, ToolError> {
        let PlannedStep::Calc { expr } = step else {
            return Err(ToolError::WrongStep {
                tool: ToolName::Calc.to_string(),
                got: step.tool().to_string(),
            });
        };

        let value = evaluate(expr)?;
        let mut output = JsonMap::new();
        output.insert("value".into(), json!(value));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn eval(expr: &str) -> f64 {
        evaluate(expr).unwrap_or_else(|e| panic!("{expr} failed: {e}"))
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(eval("2+2"), 4.0);
        assert_eq!(eval(" 2 + 3 * 4 "), 14.0);
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("7 / 2"), 3.5);
        assert_eq!(eval("1.5e2 + .5"), 150.5);
        assert_eq!(eval("1_000 + 1"), 1001.0);
    }

    #[test]
    fn test_power_precedence_matches_python() {
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("(-2) ** 2"), 4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("--3"), 3.0);
    }

    #[test]
    fn test_floor_division_and_modulo_follow_divisor_sign() {
        assert_eq!(eval("7 // 2"), 3.0);
        assert_eq!(eval("-7 // 2"), -4.0);
        assert_eq!(eval("7 // -2"), -4.0);
        assert_eq!(eval("7 % 3"), 1.0);
        assert_eq!(eval("-7 % 3"), 2.0);
        assert_eq!(eval("7 % -3"), -2.0);
        assert_eq!(eval("7.5 % 2"), 1.5);
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        for expr in ["1/0", "1//0", "1%0", "0 ** -1"] {
            assert!(matches!(evaluate(expr), Err(ToolError::Evaluation(_))), "{expr}");
        }
    }

    #[test]
    fn test_disallowed_syntax_is_rejected_before_evaluation() {
        let err = evaluate("__import__('os')").unwrap_err();
        assert_eq!(err, ToolError::DisallowedSyntax("name '__import__'".into()));
        assert!(err.to_string().starts_with("calc: disallowed syntax"));

        for expr in ["x + 1", "'a' * 3", "1 << 2", "[1]", "2j", "abs(-1)", "1 if 1 else 2"] {
            assert!(
                matches!(evaluate(expr), Err(ToolError::DisallowedSyntax(_))),
                "{expr} should be disallowed"
            );
        }
    }

    #[test]
    fn test_malformed_expressions() {
        for expr in ["", "2 +", "(1 + 2", "1 + 2)", "* 3", "1 2"] {
            assert!(matches!(evaluate(expr), Err(ToolError::Evaluation(_))), "{expr:?}");
        }
    }

    #[test]
    fn test_limits() {
        let long = "1+".repeat(MAX_EXPR_CHARS / 2) + "1";
        assert!(matches!(evaluate(&long), Err(ToolError::InvalidInput(_))));

        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(matches!(evaluate(&deep), Err(ToolError::InvalidInput(_))));

        let ok = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(eval(&ok), 1.0);
    }

    #[test]
    fn test_non_finite_result_is_an_error() {
        assert!(evaluate("10 ** 400").is_err());
        assert!(evaluate("(-8) ** 0.5").is_err());
    }

    #[tokio::test]
    async fn test_tool_returns_value_map() {
        let tool = CalcTool::new();
        let output = tool.execute(&PlannedStep::calc("2+2")).await.unwrap();
        assert_eq!(output.get("value").and_then(|v| v.as_f64()), Some(4.0));
        assert_eq!(serde_json::Value::Object(output), json!({"value": 4.0}));

        let err = tool
            .execute(&PlannedStep::http_get("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::WrongStep { .. }));
    }

    proptest! {
        #[test]
        fn prop_never_panics(input in "\\PC{0,64}") {
            let _ = evaluate(&input);
        }

        #[test]
        fn prop_integer_sums_are_exact(a in -10_000i64..10_000, b in -10_000i64..10_000) {
            let expr = format!("{a} + ({b})");
            prop_assert_eq!(evaluate(&expr).unwrap(), (a + b) as f64);
        }

        #[test]
        fn prop_modulo_has_divisor_sign(a in -1000i64..1000, b in 1i64..100) {
            let positive = evaluate(&format!("{a} % {b}")).unwrap();
            prop_assert!((0.0..b as f64).contains(&positive));
            let negative = evaluate(&format!("{a} % -{b}")).unwrap();
            prop_assert!(negative <= 0.0 && negative > -(b as f64));
        }
    }
}
