/// Форматирует число с разделителями тысяч (точками)
///
/// # Примеры
/// ```text
/// format_number(1234567)  -> "1.234.567"
/// format_number(-4200)    -> "-4.200"
/// format_number(0)        -> "0"
/// ```
pub fn format_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut result = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push('.');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(42), "42");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1.000");
        assert_eq!(format_number(1234567), "1.234.567");
        assert_eq!(format_number(1234567890), "1.234.567.890");
    }

    #[test]
    fn test_format_negative() {
        assert_eq!(format_number(-7), "-7");
        assert_eq!(format_number(-4200), "-4.200");
        assert_eq!(format_number(i64::MIN), "-9.223.372.036.854.775.808");
    }
}
