//! 计算器工具：安全的算术表达式求值
//!
//! 递归下降解析，支持 + - * / % ^（** 等价于 ^）、括号、一元负号、常用数学函数与 pi / e 常量；
//! 英文运算词（plus、times、divided by 等）先归一化为符号。多个表达式用 `;` 分隔，逐个求值。

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::core::AgentError;
use crate::tools::{StepArgs, Tool, ToolKind};

/// 计算器工具
#[derive(Debug, Default)]
pub struct CalculatorTool;

impl CalculatorTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Calculator
    }

    fn description(&self) -> &str {
        "Evaluate arithmetic expressions. Args: {\"expression\": \"32 + sqrt(223) + abs(-22) / 123\"}"
    }

    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if expression.is_empty() {
            return Err(AgentError::ToolExecutionFailed(
                "Calculator error: no expression provided".to_string(),
            ));
        }
        evaluate_all(expression)
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Calculator error: {e}")))
    }
}

/// 对 `;` 分隔的每个表达式求值，返回 "expr = value; expr = value"
pub fn evaluate_all(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();
    for part in input.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let normalized = normalize(part);
        let value = evaluate(&normalized)?;
        lines.push(format!("{} = {}", normalized, format_number(value)));
    }
    if lines.is_empty() {
        return Err("no expression provided".to_string());
    }
    Ok(lines.join("; "))
}

/// 求值单个（已归一化或原始）表达式
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(&normalize(expression))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("unexpected token '{}'", tok));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

/// 最多 6 位小数，去掉末尾的 0 与小数点
pub fn format_number(value: f64) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn word_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"\bto the power of\b", "^"),
            (r"\bmultiplied by\b", "*"),
            (r"\bdivided by\b", "/"),
            (r"\b(?:plus|add)\b", "+"),
            (r"\b(?:minus|subtract)\b", "-"),
            (r"\b(?:times|multiply)\b", "*"),
            (r"\bdivide\b", "/"),
            (r"(\d)\s*x\s*(\d)", "$1*$2"),
        ]
        .into_iter()
        .filter_map(|(pattern, repl)| Regex::new(pattern).ok().map(|re| (re, repl)))
        .collect()
    })
}

/// 运算词替换为符号、去空白、去掉结尾的 ? . =
pub fn normalize(expression: &str) -> String {
    let mut s = expression
        .trim()
        .to_lowercase()
        .replace('×', "*")
        .replace('÷', "/")
        .replace("**", "^");
    for (re, repl) in word_rules() {
        s = re.replace_all(&s, *repl).into_owned();
    }
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    s.trim_end_matches(['?', '.', '=']).to_string()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Op(c) => write!(f, "{c}"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // 科学计数法 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Number(n));
                continue;
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
                continue;
            }
            '+' | '-' | '*' | '/' | '%' | '^' => tokens.push(Token::Op(c)),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            other => return Err(format!("unexpected character '{other}'")),
        }
        i += 1;
    }
    Ok(tokens)
}

/// 括号 / 一元符号的最大嵌套层数
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_op(&mut self, ops: &[char]) -> Option<char> {
        match self.peek() {
            Some(Token::Op(c)) if ops.contains(c) => {
                let c = *c;
                self.pos += 1;
                Some(c)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.eat_op(&['+', '-']) {
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op) = self.eat_op(&['*', '/', '%']) {
            let rhs = self.unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err("division by zero".to_string()),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    // 所有递归路径（括号、函数参数、指数、连续符号）都经过这里
    fn unary(&mut self) -> Result<f64, String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(format!("expression is nested more than {MAX_DEPTH} levels deep"));
        }
        let value = match self.eat_op(&['-', '+']) {
            Some('-') => self.unary().map(|v| -v),
            Some(_) => self.unary(),
            None => self.power(),
        };
        self.depth -= 1;
        value
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.eat_op(&['^']).is_some() {
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("missing ')'".to_string()),
                }
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let args = self.arguments()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(tok) => Err(format!("unexpected token '{}'", tok)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                _ => return Err("missing ')' after arguments".to_string()),
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        "tau" => Ok(std::f64::consts::TAU),
        _ => Err(format!("unknown name '{name}'")),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, String> {
    let one = |f: fn(f64) -> f64| -> Result<f64, String> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(format!("{name}() takes exactly one argument")),
        }
    };
    let non_empty = || -> Result<(), String> {
        if args.is_empty() {
            Err(format!("{name}() needs at least one argument"))
        } else {
            Ok(())
        }
    };
    match name {
        "sqrt" => match args {
            [x] if *x < 0.0 => Err("math domain error".to_string()),
            _ => one(f64::sqrt),
        },
        "abs" => one(f64::abs),
        "sin" => one(f64::sin),
        "cos" => one(f64::cos),
        "tan" => one(f64::tan),
        "exp" => one(f64::exp),
        "floor" => one(f64::floor),
        "ceil" => one(f64::ceil),
        "round" => one(f64::round),
        "log10" => log_checked(args, one(f64::log10)),
        "log2" => log_checked(args, one(f64::log2)),
        "ln" => log_checked(args, one(f64::ln)),
        "log" => match args {
            [x] if *x > 0.0 => Ok(x.ln()),
            [x, base] if *x > 0.0 && *base > 0.0 && *base != 1.0 => Ok(x.log(*base)),
            [_] | [_, _] => Err("math domain error".to_string()),
            _ => Err("log() takes one or two arguments".to_string()),
        },
        "pow" => match args {
            [a, b] => Ok(a.powf(*b)),
            _ => Err("pow() takes exactly two arguments".to_string()),
        },
        "min" => {
            non_empty()?;
            Ok(args.iter().copied().fold(f64::INFINITY, f64::min))
        }
        "max" => {
            non_empty()?;
            Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        }
        "sum" => {
            non_empty()?;
            Ok(args.iter().sum())
        }
        "avg" | "mean" | "average" => {
            non_empty()?;
            Ok(args.iter().sum::<f64>() / args.len() as f64)
        }
        _ => Err(format!("unknown function '{name}'")),
    }
}

fn log_checked(args: &[f64], value: Result<f64, String>) -> Result<f64, String> {
    match args {
        [x] if *x <= 0.0 => Err("math domain error".to_string()),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculator_addition() {
        let out = evaluate_all("32+64").unwrap();
        assert!(out.contains("96"));
        assert_eq!(out, "32+64 = 96");
    }

    #[test]
    fn test_calculator_complex() {
        let out = evaluate_all("32 + sqrt(223) + abs(-22) / 123").unwrap();
        assert!(out.contains("47.112"), "{out}");
    }

    #[test]
    fn test_scenario_expression() {
        let value = evaluate("32+16 + abs(-12) * sqrt(3333)").unwrap();
        assert!((value - (48.0 + 12.0 * 3333f64.sqrt())).abs() < 1e-9);
    }

    #[test]
    fn test_precedence_and_power() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("-2^2").unwrap(), -4.0);
        assert_eq!(evaluate("2**3**2").unwrap(), 512.0);
        assert_eq!(evaluate("(1 + 2) * 3").unwrap(), 9.0);
        assert_eq!(evaluate("2^-1").unwrap(), 0.5);
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(evaluate("5 plus 3 times 2").unwrap(), 11.0);
        assert_eq!(evaluate("10 divided by 4").unwrap(), 2.5);
        assert_eq!(evaluate("3 x 4").unwrap(), 12.0);
    }

    #[test]
    fn test_variadic_functions() {
        assert_eq!(evaluate("sum(1, 2, 3.5)").unwrap(), 6.5);
        assert_eq!(evaluate("avg(2, 4)").unwrap(), 3.0);
        assert_eq!(evaluate("max(2, 9, 4)").unwrap(), 9.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("1 / 0").unwrap_err().contains("division by zero"));
        assert!(evaluate("sqrt(-1)").unwrap_err().contains("domain"));
        assert!(evaluate("foo(2)").unwrap_err().contains("unknown function"));
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("import os").is_err());
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);

        let deep = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(evaluate(&deep).unwrap_err().contains("nested"));
        assert!(evaluate(&"-".repeat(100_000)).unwrap_err().contains("nested"));
    }

    #[test]
    fn test_parenthesized_negative_base() {
        assert_eq!(evaluate("(-5)^2").unwrap(), 25.0);
        assert_eq!(evaluate_all("(-5) ^ 2").unwrap(), "(-5)^2 = 25");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(185.4070891), "185.407089");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn test_multiple_expressions() {
        let out = evaluate_all("1+1; 2*3").unwrap();
        assert_eq!(out, "1+1 = 2; 2*3 = 6");
    }

    #[tokio::test]
    async fn test_tool_invoke_error_is_recoverable_kind() {
        let mut args = StepArgs::new();
        args.insert("expression".into(), "1/0".into());
        let err = CalculatorTool.invoke(args).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(_)));
    }
}
