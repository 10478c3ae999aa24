//! Environment markers.
//!
//! A marker such as `python_version >= "3.8" and sys_platform == "linux"`
//! gates whether a requirement applies. Markers are parsed into a typed
//! tree of comparison, `and`, `or` and `not` nodes over a fixed set of
//! environment variables and evaluated against a [`MarkerEnvironment`]
//! plus the set of activated extras.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use pyx_pep440::{Version, VersionSpecifier};
use serde::{Deserialize, Serialize};

use super::name::normalize_name;
use super::ParseError;

/// Environment attribute a marker can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerVariable {
    ImplementationName,
    ImplementationVersion,
    OsName,
    PlatformMachine,
    PlatformPythonImplementation,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    PythonFullVersion,
    PythonVersion,
    SysPlatform,
    Extra,
}

impl MarkerVariable {
    /// Look up a variable by name, accepting the legacy dotted spellings
    pub fn from_name(name: &str) -> Option<Self> {
        let variable = match name {
            "implementation_name" => MarkerVariable::ImplementationName,
            "implementation_version" => MarkerVariable::ImplementationVersion,
            "os_name" | "os.name" => MarkerVariable::OsName,
            "platform_machine" | "platform.machine" => MarkerVariable::PlatformMachine,
            "platform_python_implementation"
            | "platform.python_implementation"
            | "python_implementation" => MarkerVariable::PlatformPythonImplementation,
            "platform_release" => MarkerVariable::PlatformRelease,
            "platform_system" => MarkerVariable::PlatformSystem,
            "platform_version" | "platform.version" => MarkerVariable::PlatformVersion,
            "python_full_version" => MarkerVariable::PythonFullVersion,
            "python_version" => MarkerVariable::PythonVersion,
            "sys_platform" | "sys.platform" => MarkerVariable::SysPlatform,
            "extra" => MarkerVariable::Extra,
            _ => return None,
        };
        Some(variable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerVariable::ImplementationName => "implementation_name",
            MarkerVariable::ImplementationVersion => "implementation_version",
            MarkerVariable::OsName => "os_name",
            MarkerVariable::PlatformMachine => "platform_machine",
            MarkerVariable::PlatformPythonImplementation => "platform_python_implementation",
            MarkerVariable::PlatformRelease => "platform_release",
            MarkerVariable::PlatformSystem => "platform_system",
            MarkerVariable::PlatformVersion => "platform_version",
            MarkerVariable::PythonFullVersion => "python_full_version",
            MarkerVariable::PythonVersion => "python_version",
            MarkerVariable::SysPlatform => "sys_platform",
            MarkerVariable::Extra => "extra",
        }
    }
}

/// Comparison operator inside a marker expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    TildeEqual,
    ExactEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        let operator = match symbol {
            "==" => MarkerOperator::Equal,
            "!=" => MarkerOperator::NotEqual,
            "<" => MarkerOperator::LessThan,
            "<=" => MarkerOperator::LessThanEqual,
            ">" => MarkerOperator::GreaterThan,
            ">=" => MarkerOperator::GreaterThanEqual,
            "~=" => MarkerOperator::TildeEqual,
            "===" => MarkerOperator::ExactEqual,
            _ => return None,
        };
        Some(operator)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerOperator::Equal => "==",
            MarkerOperator::NotEqual => "!=",
            MarkerOperator::LessThan => "<",
            MarkerOperator::LessThanEqual => "<=",
            MarkerOperator::GreaterThan => ">",
            MarkerOperator::GreaterThanEqual => ">=",
            MarkerOperator::TildeEqual => "~=",
            MarkerOperator::ExactEqual => "===",
            MarkerOperator::In => "in",
            MarkerOperator::NotIn => "not in",
        }
    }
}

/// One side of a marker comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerValue {
    Variable(MarkerVariable),
    Literal(String),
}

impl MarkerValue {
    fn resolve<'a>(&'a self, env: &'a MarkerEnvironment) -> &'a str {
        match self {
            MarkerValue::Variable(variable) => env.get(*variable),
            MarkerValue::Literal(value) => value,
        }
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Variable(variable) => f.write_str(variable.as_str()),
            MarkerValue::Literal(value) if value.contains('"') => write!(f, "'{}'", value),
            MarkerValue::Literal(value) => write!(f, "\"{}\"", value),
        }
    }
}

/// A single `left op right` comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerExpression {
    pub left: MarkerValue,
    pub operator: MarkerOperator,
    pub right: MarkerValue,
}

impl MarkerExpression {
    fn mentions_extra(&self) -> bool {
        self.left == MarkerValue::Variable(MarkerVariable::Extra)
            || self.right == MarkerValue::Variable(MarkerVariable::Extra)
    }

    fn evaluate(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        if self.mentions_extra() {
            return self.evaluate_extra(extras);
        }

        let left = self.left.resolve(env);
        let right = self.right.resolve(env);

        match self.operator {
            MarkerOperator::In => right.contains(left),
            MarkerOperator::NotIn => !right.contains(left),
            MarkerOperator::ExactEqual => left == right,
            operator => match compare_versions(left, operator, right) {
                Some(result) => result,
                None => compare_strings(left, operator, right),
            },
        }
    }

    fn evaluate_extra(&self, extras: &BTreeSet<String>) -> bool {
        let literal = match (&self.left, &self.right) {
            (MarkerValue::Literal(value), _) | (_, MarkerValue::Literal(value)) => normalize_name(value),
            _ => return false,
        };

        match self.operator {
            MarkerOperator::Equal => extras.contains(&literal),
            MarkerOperator::NotEqual => !extras.contains(&literal),
            _ => false,
        }
    }
}

/// PEP 440 comparison when both sides are versions, `None` otherwise
fn compare_versions(left: &str, operator: MarkerOperator, right: &str) -> Option<bool> {
    let left = left.parse::<Version>().ok()?;
    let specifier = format!("{}{}", operator.as_str(), right)
        .parse::<VersionSpecifier>()
        .ok()?;
    Some(specifier.contains(&left))
}

fn compare_strings(left: &str, operator: MarkerOperator, right: &str) -> bool {
    match operator {
        MarkerOperator::Equal => left == right,
        MarkerOperator::NotEqual => left != right,
        MarkerOperator::LessThan => left < right,
        MarkerOperator::LessThanEqual => left <= right,
        MarkerOperator::GreaterThan => left > right,
        MarkerOperator::GreaterThanEqual => left >= right,
        // ~= has no meaning for arbitrary strings
        _ => false,
    }
}

impl fmt::Display for MarkerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.operator.as_str(), self.right)
    }
}

/// Parsed marker expression tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
    Not(Box<MarkerTree>),
}

impl MarkerTree {
    /// Parse a marker string
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
        };
        let tree = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(tree)
    }

    /// Evaluate against an environment with the given extras activated
    pub fn evaluate(&self, env: &MarkerEnvironment, extras: &BTreeSet<String>) -> bool {
        match self {
            MarkerTree::Expression(expression) => expression.evaluate(env, extras),
            MarkerTree::And(children) => children.iter().all(|child| child.evaluate(env, extras)),
            MarkerTree::Or(children) => children.iter().any(|child| child.evaluate(env, extras)),
            MarkerTree::Not(inner) => !inner.evaluate(env, extras),
        }
    }

    /// Whether any comparison in the tree references `extra`
    pub fn mentions_extra(&self) -> bool {
        match self {
            MarkerTree::Expression(expression) => expression.mentions_extra(),
            MarkerTree::And(children) | MarkerTree::Or(children) => children.iter().any(MarkerTree::mentions_extra),
            MarkerTree::Not(inner) => inner.mentions_extra(),
        }
    }

    /// Normalized extra names compared against anywhere in the tree
    pub fn extra_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_extras(&mut names);
        names
    }

    fn collect_extras(&self, names: &mut BTreeSet<String>) {
        match self {
            MarkerTree::Expression(expression) if expression.mentions_extra() => {
                for side in [&expression.left, &expression.right] {
                    if let MarkerValue::Literal(value) = side {
                        names.insert(normalize_name(value));
                    }
                }
            }
            MarkerTree::Expression(_) => {}
            MarkerTree::And(children) | MarkerTree::Or(children) => {
                for child in children {
                    child.collect_extras(names);
                }
            }
            MarkerTree::Not(inner) => inner.collect_extras(names),
        }
    }

    /// The marker with every `extra` comparison treated as satisfied.
    ///
    /// Returns `None` when nothing but extra clauses remain.
    pub fn without_extras(&self) -> Option<MarkerTree> {
        match self {
            MarkerTree::Expression(expression) if expression.mentions_extra() => None,
            MarkerTree::Expression(_) => Some(self.clone()),
            MarkerTree::And(children) => {
                let kept: Vec<MarkerTree> = children.iter().filter_map(MarkerTree::without_extras).collect();
                MarkerTree::all(kept)
            }
            MarkerTree::Or(children) => {
                let kept: Option<Vec<MarkerTree>> = children.iter().map(MarkerTree::without_extras).collect();
                kept.and_then(MarkerTree::any)
            }
            MarkerTree::Not(inner) => inner.without_extras().map(|tree| MarkerTree::Not(Box::new(tree))),
        }
    }

    /// Conjunction of the given trees, `None` when empty
    pub fn all(mut trees: Vec<MarkerTree>) -> Option<MarkerTree> {
        match trees.len() {
            0 => None,
            1 => trees.pop(),
            _ => Some(MarkerTree::And(trees)),
        }
    }

    /// Disjunction of the given trees, `None` when empty
    pub fn any(mut trees: Vec<MarkerTree>) -> Option<MarkerTree> {
        match trees.len() {
            0 => None,
            1 => trees.pop(),
            _ => Some(MarkerTree::Or(trees)),
        }
    }
}

impl FromStr for MarkerTree {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarkerTree::parse(s)
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerTree::Expression(expression) => write!(f, "{}", expression),
            MarkerTree::And(children) => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|child| match child {
                        MarkerTree::Or(_) => format!("({})", child),
                        _ => child.to_string(),
                    })
                    .collect();
                f.write_str(&parts.join(" and "))
            }
            MarkerTree::Or(children) => {
                let parts: Vec<String> = children.iter().map(|child| child.to_string()).collect();
                f.write_str(&parts.join(" or "))
            }
            MarkerTree::Not(inner) => match inner.as_ref() {
                MarkerTree::Expression(_) | MarkerTree::Not(_) => write!(f, "not {}", inner),
                _ => write!(f, "not ({})", inner),
            },
        }
    }
}

/// The environment markers are evaluated against
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerEnvironment {
    pub implementation_name: String,
    pub implementation_version: String,
    pub os_name: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: String,
    pub platform_system: String,
    pub platform_version: String,
    pub python_full_version: String,
    pub python_version: String,
    pub sys_platform: String,
}

impl MarkerEnvironment {
    /// A CPython environment for the given interpreter version.
    ///
    /// `python_version` is derived from the first two release segments;
    /// platform attributes start empty and are set with [`Self::with`].
    pub fn cpython(python_full_version: &str) -> Self {
        let python_version = python_full_version
            .trim()
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".");

        Self {
            implementation_name: "cpython".to_string(),
            implementation_version: python_full_version.trim().to_string(),
            platform_python_implementation: "CPython".to_string(),
            python_full_version: python_full_version.trim().to_string(),
            python_version,
            ..Self::default()
        }
    }

    /// Set one attribute
    pub fn with(mut self, variable: MarkerVariable, value: &str) -> Self {
        let value = value.to_string();
        match variable {
            MarkerVariable::ImplementationName => self.implementation_name = value,
            MarkerVariable::ImplementationVersion => self.implementation_version = value,
            MarkerVariable::OsName => self.os_name = value,
            MarkerVariable::PlatformMachine => self.platform_machine = value,
            MarkerVariable::PlatformPythonImplementation => self.platform_python_implementation = value,
            MarkerVariable::PlatformRelease => self.platform_release = value,
            MarkerVariable::PlatformSystem => self.platform_system = value,
            MarkerVariable::PlatformVersion => self.platform_version = value,
            MarkerVariable::PythonFullVersion => self.python_full_version = value,
            MarkerVariable::PythonVersion => self.python_version = value,
            MarkerVariable::SysPlatform => self.sys_platform = value,
            // extras are evaluated per requirement, never stored here
            MarkerVariable::Extra => {}
        }
        self
    }

    pub fn get(&self, variable: MarkerVariable) -> &str {
        match variable {
            MarkerVariable::ImplementationName => &self.implementation_name,
            MarkerVariable::ImplementationVersion => &self.implementation_version,
            MarkerVariable::OsName => &self.os_name,
            MarkerVariable::PlatformMachine => &self.platform_machine,
            MarkerVariable::PlatformPythonImplementation => &self.platform_python_implementation,
            MarkerVariable::PlatformRelease => &self.platform_release,
            MarkerVariable::PlatformSystem => &self.platform_system,
            MarkerVariable::PlatformVersion => &self.platform_version,
            MarkerVariable::PythonFullVersion => &self.python_full_version,
            MarkerVariable::PythonVersion => &self.python_version,
            MarkerVariable::SysPlatform => &self.sys_platform,
            MarkerVariable::Extra => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Op(MarkerOperator),
    LParen,
    RParen,
    And,
    Or,
    Not,
    In,
}

const SYMBOLS: [&str; 8] = ["===", "==", "!=", "<=", ">=", "~=", "<", ">"];

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let error = |reason: String| ParseError::InvalidMarker {
        marker: input.to_string(),
        reason,
    };

    let mut tokens = Vec::new();
    let mut rest = input;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                rest = &rest[1..];
            }
            ')' => {
                tokens.push(Token::RParen);
                rest = &rest[1..];
            }
            '"' | '\'' => {
                let body = &rest[1..];
                let end = body
                    .find(c)
                    .ok_or_else(|| error("unterminated string".to_string()))?;
                tokens.push(Token::Str(body[..end].to_string()));
                rest = &body[end + 1..];
            }
            '=' | '!' | '<' | '>' | '~' => {
                let symbol = SYMBOLS
                    .iter()
                    .find(|symbol| rest.starts_with(**symbol))
                    .ok_or_else(|| error(format!("invalid operator near \"{}\"", rest)))?;
                // SYMBOLS only holds valid operators
                if let Some(operator) = MarkerOperator::from_symbol(symbol) {
                    tokens.push(Token::Op(operator));
                }
                rest = &rest[symbol.len()..];
            }
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let end = rest
                    .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_' || ch == '.'))
                    .unwrap_or(rest.len());
                let word = &rest[..end];
                tokens.push(match word {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    _ => Token::Ident(word.to_string()),
                });
                rest = &rest[end..];
            }
            other => return Err(error(format!("unexpected character '{}'", other))),
        }
    }

    if tokens.is_empty() {
        return Err(error("empty marker".to_string()));
    }

    Ok(tokens)
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> ParseError {
        ParseError::InvalidMarker {
            marker: self.input.to_string(),
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<MarkerTree, ParseError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            children.push(self.parse_and()?);
        }
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(MarkerTree::Or(children))
    }

    fn parse_and(&mut self) -> Result<MarkerTree, ParseError> {
        let mut children = vec![self.parse_not()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            children.push(self.parse_not()?);
        }
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Ok(MarkerTree::And(children))
    }

    fn parse_not(&mut self) -> Result<MarkerTree, ParseError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(MarkerTree::Not(Box::new(self.parse_not()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<MarkerTree, ParseError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.error("unbalanced parentheses"));
            }
            return Ok(inner);
        }

        let left = self.parse_value()?;
        let operator = match self.next() {
            Some(Token::Op(operator)) => operator,
            Some(Token::In) => MarkerOperator::In,
            Some(Token::Not) if self.peek() == Some(&Token::In) => {
                self.pos += 1;
                MarkerOperator::NotIn
            }
            _ => return Err(self.error("expected a comparison operator")),
        };
        let right = self.parse_value()?;

        Ok(MarkerTree::Expression(MarkerExpression { left, operator, right }))
    }

    fn parse_value(&mut self) -> Result<MarkerValue, ParseError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(MarkerValue::Literal(value)),
            Some(Token::Ident(name)) => MarkerVariable::from_name(&name)
                .map(MarkerValue::Variable)
                .ok_or_else(|| self.error(&format!("unknown marker variable \"{}\"", name))),
            _ => Err(self.error("expected a variable or quoted string")),
        }
    }
}
