//! Token-level mutation rule tables for Go.
//! Alternatives never include the original token.

pub const ARITHMETIC_OPS: &[&str] = &["+", "-", "*", "/", "%"];
pub const COMPARISON_OPS: &[&str] = &["<", ">", "<=", ">=", "==", "!="];

/// `+ - * / %` each map to every other operator in the set.
pub fn arithmetic_alternatives(op: &str) -> Vec<&'static str> {
    substitutions(ARITHMETIC_OPS, op)
}

/// `< > <= >= == !=` each map to every other operator in the set.
pub fn comparison_alternatives(op: &str) -> Vec<&'static str> {
    substitutions(COMPARISON_OPS, op)
}

pub fn logical_alternatives(op: &str) -> Vec<&'static str> {
    match op {
        "&&" => vec!["||"],
        "||" => vec!["&&"],
        _ => vec![],
    }
}

/// Sign operators swap; `!` and `^` are removal-only.
pub fn unary_alternatives(op: &str) -> Vec<&'static str> {
    match op {
        "-" => vec!["+"],
        "+" => vec!["-"],
        "!" | "^" => vec![""],
        _ => vec![],
    }
}

pub fn boolean_alternatives(literal: &str) -> Vec<&'static str> {
    match literal {
        "true" => vec!["false"],
        "false" => vec!["true"],
        _ => vec![],
    }
}

/// Boundary flips for comparison operators inside loop conditions.
pub fn loop_boundary_alternatives(op: &str) -> Vec<&'static str> {
    match op {
        "<" => vec!["<="],
        "<=" => vec!["<"],
        ">" => vec![">="],
        ">=" => vec![">"],
        _ => vec![],
    }
}

/// Numeric literals map to `0` and `1`, skipping any alternative whose value
/// equals the literal itself. A literal `0` yields exactly one variant.
pub fn number_alternatives(literal: &str) -> Vec<&'static str> {
    ["0", "1"]
        .into_iter()
        .filter(|alt| !literal_equals(literal, alt))
        .collect()
}

fn substitutions(set: &'static [&'static str], op: &str) -> Vec<&'static str> {
    if !set.contains(&op) {
        return vec![];
    }
    set.iter().copied().filter(|o| *o != op).collect()
}

fn literal_equals(literal: &str, alt: &str) -> bool {
    match (numeric_value(literal), numeric_value(alt)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Numeric value of a Go int or float literal, covering radix prefixes and
/// digit separators. Unparsable literals compare equal to nothing.
fn numeric_value(literal: &str) -> Option<f64> {
    let cleaned = literal.replace('_', "").to_ascii_lowercase();
    if let Some(digits) = cleaned.strip_prefix("0x") {
        return i128::from_str_radix(digits, 16).ok().map(|v| v as f64);
    }
    if let Some(digits) = cleaned.strip_prefix("0o") {
        return i128::from_str_radix(digits, 8).ok().map(|v| v as f64);
    }
    if let Some(digits) = cleaned.strip_prefix("0b") {
        return i128::from_str_radix(digits, 2).ok().map(|v| v as f64);
    }
    cleaned.parse::<f64>().ok()
}
