//! Numeric and boolean argument parsers.

use super::ArgError;

/// Parse a signed integer: decimal, `0x` hex, `0b` binary, or leading-0
/// octal. Underscores between digits are tolerated.
pub fn parse_integer(s: &str) -> Result<i64, ArgError> {
    let s = s.trim();
    let (neg, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits) = if let Some(d) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, d)
    } else if let Some(d) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        (2, d)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        (10, rest)
    };
    if digits.is_empty() {
        return Err(ArgError::Expected("integer"));
    }
    let mut value: i64 = 0;
    for c in digits.chars() {
        if c == '_' {
            continue;
        }
        let d = c.to_digit(radix).ok_or(ArgError::Expected("integer"))?;
        value = value
            .checked_mul(i64::from(radix))
            .and_then(|v| v.checked_add(i64::from(d)))
            .ok_or(ArgError::OutOfRange("integer"))?;
    }
    Ok(if neg { -value } else { value })
}

/// Parse an unsigned integer with the same prefixes as
/// [`parse_integer`].
pub fn parse_unsigned(s: &str) -> Result<u64, ArgError> {
    let v = parse_integer(s)?;
    u64::try_from(v).map_err(|_| ArgError::OutOfRange("integer"))
}

/// Parse a boolean: `true`/`false`, `yes`/`no`, `1`/`0`.
pub fn parse_bool(s: &str) -> Result<bool, ArgError> {
    match s.trim() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ArgError::Expected("boolean")),
    }
}

/// Parse a nonnegative real number into an integer scaled by
/// `10^frac_digits`, rounding the residue to nearest.
///
/// `parse_fixed_point("2.5", 3)` is 2500. Fractional digits beyond
/// `frac_digits` round; `"0.0015"` with 3 digits is 2.
pub fn parse_fixed_point(s: &str, frac_digits: u32) -> Result<u64, ArgError> {
    let s = s.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ArgError::Expected("real number"));
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ArgError::Expected("real number"));
    }

    let scale = 10u64.pow(frac_digits);
    let mut value: u64 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse::<u64>()
            .map_err(|_| ArgError::OutOfRange("real number"))?
    };
    value = value
        .checked_mul(scale)
        .ok_or(ArgError::OutOfRange("real number"))?;

    let mut frac: u64 = 0;
    let mut digits = 0;
    for b in frac_part.bytes().take(frac_digits as usize) {
        frac = frac * 10 + u64::from(b - b'0');
        digits += 1;
    }
    while digits < frac_digits {
        frac *= 10;
        digits += 1;
    }
    // round on the first dropped digit
    if frac_part.len() > frac_digits as usize
        && frac_part.as_bytes()[frac_digits as usize] >= b'5'
    {
        frac += 1;
    }
    value
        .checked_add(frac)
        .ok_or(ArgError::OutOfRange("real number"))
}

/// Parse a time interval in seconds (a real number) to integer
/// milliseconds.
pub fn parse_interval_ms(s: &str) -> Result<u64, ArgError> {
    parse_fixed_point(s, 3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_radixes() {
        assert_eq!(parse_integer("42").unwrap(), 42);
        assert_eq!(parse_integer("-7").unwrap(), -7);
        assert_eq!(parse_integer("0x1f").unwrap(), 31);
        assert_eq!(parse_integer("017").unwrap(), 15);
        assert_eq!(parse_integer("1_000").unwrap(), 1000);
        assert!(parse_integer("4x").is_err());
        assert!(parse_integer("").is_err());
    }

    #[test]
    fn test_bool() {
        assert!(parse_bool("true").unwrap());
        assert!(!parse_bool("no").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(parse_fixed_point("2.5", 3).unwrap(), 2500);
        assert_eq!(parse_fixed_point("2", 3).unwrap(), 2000);
        assert_eq!(parse_fixed_point(".25", 2).unwrap(), 25);
        assert_eq!(parse_fixed_point("0.0015", 3).unwrap(), 2);
        assert_eq!(parse_fixed_point("0.00049", 3).unwrap(), 0);
        assert!(parse_fixed_point("x", 3).is_err());
        assert!(parse_fixed_point(".", 3).is_err());
    }

    #[test]
    fn test_interval() {
        assert_eq!(parse_interval_ms("1.5").unwrap(), 1500);
        assert_eq!(parse_interval_ms("0.02").unwrap(), 20);
    }
}
