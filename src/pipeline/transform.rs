//! Price rewriting for relayed message bodies.
//!
//! Applied line by line:
//! - retail ("varejo") lines without a wholesale mention are dropped
//! - the "- Atacado:" label is stripped, keeping what follows
//! - every currency amount is multiplied and rendered as `R$<amount>`
//! - runs of blank lines collapse to one; leading/trailing blanks go away

use std::sync::LazyLock;

use regex::{Captures, Regex};
use rust_decimal::{Decimal, RoundingStrategy};

/// Symbol-first, symbol-last, or a bare amount with two decimals.
static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:R\$|\$\$?)\s*(\d+(?:[.,]\d{2})?)|\b(\d+(?:[.,]\d{2})?)\s*(?:R\$|\$\$?)|\b(\d+[.,]\d{2})\b",
    )
    .expect("price regex is valid")
});

/// "- Atacado:" with optional dash, colon and surrounding spaces.
static WHOLESALE_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*-?\s*atacado\s*:?\s*").expect("label regex is valid"));

/// Rewrites message bodies for the destination audience.
#[derive(Debug, Clone)]
pub struct TextTransformer {
    multiplier: Decimal,
}

impl TextTransformer {
    pub fn new(multiplier: Decimal) -> Self {
        Self { multiplier }
    }

    /// Transform a raw body. Empty input yields empty output.
    pub fn transform(&self, body: &str) -> String {
        if body.is_empty() {
            return String::new();
        }

        let lines: Vec<String> = body
            .lines()
            .map(|line| self.transform_line(line).unwrap_or_default())
            .collect();

        collapse_blank_lines(&lines)
    }

    /// Returns `None` when the line must be dropped.
    fn transform_line(&self, line: &str) -> Option<String> {
        let lower = line.to_lowercase();
        let wholesale = lower.contains("atacado");

        if lower.contains("varejo") && !wholesale {
            return None;
        }

        let line = if wholesale {
            WHOLESALE_LABEL_RE.replace_all(line, " ").trim().to_string()
        } else {
            line.to_string()
        };

        Some(self.rewrite_prices(&line))
    }

    fn rewrite_prices(&self, line: &str) -> String {
        PRICE_RE
            .replace_all(line, |caps: &Captures<'_>| {
                let amount = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3));
                match amount.and_then(|m| self.multiply(m.as_str())) {
                    Some(price) => format!("R${price}"),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Multiply a matched amount, rendered with two decimals and a comma.
    /// `None` when the amount is not positive or the product overflows.
    fn multiply(&self, amount: &str) -> Option<String> {
        let value: Decimal = amount.replacen(',', ".", 1).parse().ok()?;
        if value <= Decimal::ZERO {
            return None;
        }
        let scaled = value
            .checked_mul(self.multiplier)?
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Some(format!("{scaled:.2}").replace('.', ","))
    }
}

/// Keep at most one blank line in a row and drop leading/trailing blanks.
///
/// Whitespace-only lines count as blank and are emitted as empty lines, so a
/// lone `"   "` between two lines becomes `""`.
fn collapse_blank_lines(lines: &[String]) -> String {
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut previous_blank = true;

    for line in lines {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        kept.push(if blank { "" } else { line.as_str() });
        previous_blank = blank;
    }

    while kept.last().is_some_and(|l| l.is_empty()) {
        kept.pop();
    }

    kept.join("\n")
}
