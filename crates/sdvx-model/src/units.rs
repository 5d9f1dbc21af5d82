// KSH parameter value parsing (lengths, decibels, frequencies, times)

use crate::error::ChartError;

fn parse_float(s: &str) -> Result<f64, ChartError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| ChartError::InvalidParameter(format!("not a number (got {s})")))
}

/// Parse a length: plain float, `a/b` fraction or `x%` percentage.
pub fn parse_length(s: &str) -> Result<f64, ChartError> {
    if let Ok(value) = s.trim().parse::<f64>() {
        return Ok(value);
    }
    if let Some((num, denom)) = s.split_once('/') {
        return Ok(parse_float(num)? / parse_float(denom)?);
    }
    if let Some(percent) = s.strip_suffix('%') {
        return Ok(parse_float(percent)? / 100.0);
    }
    if s.ends_with('s') {
        return Err(ChartError::InvalidParameter(format!(
            "s/ms units are not supported for lengths (got {s})"
        )));
    }
    Err(ChartError::InvalidParameter(format!("invalid length (got {s})")))
}

/// Parse `<float>dB`.
pub fn parse_decibel(s: &str) -> Result<f64, ChartError> {
    match s.strip_suffix("dB") {
        Some(value) => parse_float(value),
        None => Err(ChartError::InvalidParameter(format!(
            "{s} is not a valid decibel value"
        ))),
    }
}

/// Parse `<float>Hz` or `<float>kHz` into hertz.
pub fn parse_frequency(s: &str) -> Result<f64, ChartError> {
    let Some(value) = s.strip_suffix("Hz") else {
        return Err(ChartError::InvalidParameter(format!(
            "{s} is not a valid frequency value"
        )));
    };
    match value.strip_suffix('k') {
        Some(khz) => Ok(parse_float(khz)? * 1000.0),
        None => parse_float(value),
    }
}

/// Parse `<float>s` or `<float>ms` into milliseconds.
pub fn parse_time(s: &str) -> Result<f64, ChartError> {
    let Some(value) = s.strip_suffix('s') else {
        return Err(ChartError::InvalidParameter(format!(
            "{s} is not a valid time value"
        )));
    };
    match value.strip_suffix('m') {
        Some(ms) => parse_float(ms),
        None => Ok(parse_float(value)? * 1000.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_length_forms() {
        assert_eq!(parse_length("0.5").unwrap(), 0.5);
        assert_eq!(parse_length("1/8").unwrap(), 0.125);
        assert_eq!(parse_length("35%").unwrap(), 0.35);
        assert!(parse_length("100ms").is_err());
        assert!(parse_length("abc").is_err());
    }

    #[test]
    fn test_parse_decibel() {
        assert_eq!(parse_decibel("8dB").unwrap(), 8.0);
        assert_eq!(parse_decibel("-3.5dB").unwrap(), -3.5);
        assert!(parse_decibel("8").is_err());
    }

    #[test]
    fn test_parse_frequency() {
        assert_eq!(parse_frequency("500Hz").unwrap(), 500.0);
        assert_eq!(parse_frequency("18kHz").unwrap(), 18000.0);
        assert!(parse_frequency("18k").is_err());
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("60ms").unwrap(), 60.0);
        assert_eq!(parse_time("0.25s").unwrap(), 250.0);
        assert!(parse_time("60").is_err());
    }
}
