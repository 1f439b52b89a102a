use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z.]{1,10}$").unwrap())
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid symbol {0:?}, expected 1-10 letters or dots")]
pub struct SymbolError(pub String);

/// 股票代码，例如 `AAPL`、`BRK.A`
///
/// 构造时统一 trim + 转大写，之后必须满足 `^[A-Z.]{1,10}$`。
/// 拼进 URL 或 SQL LIKE 之前都只接受这个类型。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if symbol_re().is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(SymbolError(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 过滤一组外部输入的代码：非法的直接丢弃（不报错），重复的只保留第一次出现。
pub fn filter_symbols<I, S>(raw: I) -> Vec<Symbol>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in raw {
        match Symbol::parse(item.as_ref()) {
            Ok(symbol) => {
                if seen.insert(symbol.clone()) {
                    out.push(symbol);
                }
            }
            Err(e) => debug!("丢弃非法代码: {}", e),
        }
    }
    out
}
