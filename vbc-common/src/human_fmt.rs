//! Human-readable number formatting for flag narratives
//!
//! Flag descriptions are read by analysts, so money, shares and counts are
//! rendered the way a finance report would print them:
//! - Money: `$1,234,567` (whole dollars, sign before the symbol)
//! - Shares: `12.5%` from a 0-1 proportion
//! - Plain numbers: integers without a trailing `.0`

/// Insert `,` separators into the integer part of a formatted number.
fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a value with thousands separators and a fixed number of decimals.
///
/// # Examples
///
/// ```
/// use vbc_common::human_fmt::thousands;
///
/// assert_eq!(thousands(1234567.0, 0), "1,234,567");
/// assert_eq!(thousands(-9876.54, 1), "-9,876.5");
/// assert_eq!(thousands(12.0, 0), "12");
/// ```
pub fn thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::new();
    // "-0" is not a meaningful amount
    if value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_digits(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// Format a dollar amount rounded to whole dollars.
///
/// # Examples
///
/// ```
/// use vbc_common::human_fmt::money;
///
/// assert_eq!(money(100000.0), "$100,000");
/// assert_eq!(money(166666.67), "$166,667");
/// assert_eq!(money(-2500.0), "-$2,500");
/// ```
pub fn money(value: f64) -> String {
    let body = thousands(value, 0);
    match body.strip_prefix('-') {
        Some(rest) => format!("-${}", rest),
        None => format!("${}", body),
    }
}

/// Format a 0-1 proportion as a percentage.
///
/// # Examples
///
/// ```
/// use vbc_common::human_fmt::pct;
///
/// assert_eq!(pct(0.7, 0), "70%");
/// assert_eq!(pct(0.125, 1), "12.5%");
/// ```
pub fn pct(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

/// Format a 0-1 proportion as a percentage with an explicit sign.
pub fn signed_pct(value: f64, decimals: usize) -> String {
    format!("{:+.*}%", decimals, value * 100.0)
}

/// Format a number without a trailing `.0` when it is integral.
///
/// # Examples
///
/// ```
/// use vbc_common::human_fmt::plain;
///
/// assert_eq!(plain(42.0), "42");
/// assert_eq!(plain(0.125), "0.125");
/// ```
pub fn plain(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Format an optional number, printing `N/A` when absent.
pub fn plain_or_na(value: Option<f64>) -> String {
    value.map(plain).unwrap_or_else(|| "N/A".to_string())
}
