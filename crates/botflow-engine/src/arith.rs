//! Inline arithmetic folding for templated REST fields.
//!
//! After variable substitution, simple binary expressions
//! (`number op number`, op ∈ {+, -, *, /}) are evaluated in place. This
//! lets authors write derived values like `{{stock}} - 1` directly in a
//! URL or body. Subtraction clamps at zero — stock counts never go
//! negative. Expressions touching alphanumeric neighbors are left alone so
//! dates, uuids, and paths do not get mangled; division by zero is also
//! left unfolded.

use once_cell::sync::Lazy;
use regex::Regex;

static EXPR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([+\-*/])\s*(\d+(?:\.\d+)?)").unwrap());

/// Evaluate simple binary arithmetic expressions inside `input`.
pub fn fold_arithmetic(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;

    for caps in EXPR_RE.captures_iter(input) {
        let m = caps.get(0).unwrap();

        let glued = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-');
        let before_ok = input[..m.start()].chars().next_back().map_or(true, |c| !glued(c));
        let after_ok = input[m.end()..].chars().next().map_or(true, |c| !glued(c));
        if !before_ok || !after_ok {
            out.push_str(&input[last..m.end()]);
            last = m.end();
            continue;
        }

        let a: f64 = caps[1].parse().unwrap_or(f64::NAN);
        let b: f64 = caps[3].parse().unwrap_or(f64::NAN);
        let folded = match &caps[2] {
            "+" => Some(a + b),
            "-" => Some((a - b).max(0.0)),
            "*" => Some(a * b),
            "/" if b != 0.0 => Some(a / b),
            _ => None,
        };

        match folded {
            Some(n) if n.is_finite() => {
                out.push_str(&input[last..m.start()]);
                out.push_str(&format_number(n));
            }
            _ => out.push_str(&input[last..m.end()]),
        }
        last = m.end();
    }

    out.push_str(&input[last..]);
    out
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
