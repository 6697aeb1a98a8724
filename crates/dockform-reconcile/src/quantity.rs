//! Size, CPU and duration strings.

use crate::error::BuildError;
use std::time::Duration;

const MIB: i64 = 1 << 20;
const GIB: i64 = 1 << 30;

/// CFS period paired with every CPU quota, in microseconds.
pub const CPU_PERIOD: i64 = 100_000;

/// Largest CPU quantity accepted, so quota and shares stay within `i64`.
pub const MAX_CPU_MILLIS: i64 = i64::MAX / CPU_PERIOD;

/// Parses `<N>Mi`, `<N>Gi` or a bare byte count.
///
/// # Errors
///
/// Returns [`BuildError::InvalidSize`] for any other form, negative values
/// and overflow.
pub fn parse_byte_size(s: &str) -> Result<i64, BuildError> {
    let invalid = || BuildError::InvalidSize(s.to_string());
    let (digits, unit) = if let Some(n) = s.strip_suffix("Mi") {
        (n, MIB)
    } else if let Some(n) = s.strip_suffix("Gi") {
        (n, GIB)
    } else {
        (s, 1)
    };
    let amount: i64 = digits.parse().map_err(|_| invalid())?;
    if amount < 0 {
        return Err(invalid());
    }
    amount.checked_mul(unit).ok_or_else(invalid)
}

/// Parses a CPU quantity into millicores: `500m`, `2`, `0.5`.
///
/// # Errors
///
/// Returns [`BuildError::InvalidCpu`] for anything else, including zero,
/// negative amounts and anything above [`MAX_CPU_MILLIS`].
pub fn parse_cpu_millis(s: &str) -> Result<i64, BuildError> {
    let invalid = || BuildError::InvalidCpu(s.to_string());
    let millis = if let Some(m) = s.strip_suffix('m') {
        m.parse::<i64>().map_err(|_| invalid())?
    } else {
        let cores: f64 = s.parse().map_err(|_| invalid())?;
        #[allow(clippy::cast_precision_loss)]
        let limit = MAX_CPU_MILLIS as f64;
        if !cores.is_finite() || cores * 1000.0 > limit {
            return Err(invalid());
        }
        #[allow(clippy::cast_possible_truncation)]
        let millis = (cores * 1000.0).round() as i64;
        millis
    };
    if millis <= 0 || millis > MAX_CPU_MILLIS {
        return Err(invalid());
    }
    Ok(millis)
}

/// CFS quota for a CPU limit, relative to [`CPU_PERIOD`].
#[must_use]
pub const fn cpu_quota(millis: i64) -> i64 {
    millis * CPU_PERIOD / 1000
}

/// Relative CPU shares for a CPU request, 1024 per core.
#[must_use]
pub const fn cpu_shares(millis: i64) -> i64 {
    millis * 1024 / 1000
}

/// Parses a humantime duration (`30s`, `1m30s`, `500ms`).
///
/// # Errors
///
/// Returns [`BuildError::InvalidDuration`] naming `field`.
pub fn parse_duration(field: &'static str, s: &str) -> Result<Duration, BuildError> {
    humantime::parse_duration(s).map_err(|e| BuildError::InvalidDuration {
        field,
        value: s.to_string(),
        reason: e.to_string(),
    })
}

/// Duration in nanoseconds, saturating at `i64::MAX`.
#[must_use]
pub fn as_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_sizes() {
        assert_eq!(parse_byte_size("64Mi").unwrap(), 64 * 1024 * 1024);
        assert_eq!(parse_byte_size("2Gi").unwrap(), 2 * 1024 * 1024 * 1024);
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert_eq!(parse_byte_size("0").unwrap(), 0);
    }

    #[test]
    fn test_byte_size_rejects_unknown_suffix() {
        for bad in ["64MB", "1.5Gi", "Mi", "", "-1", "ten"] {
            assert_eq!(
                parse_byte_size(bad),
                Err(BuildError::InvalidSize(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_byte_size_overflow() {
        assert!(parse_byte_size("9223372036854775807Gi").is_err());
    }

    #[test]
    fn test_cpu() {
        assert_eq!(parse_cpu_millis("500m").unwrap(), 500);
        assert_eq!(parse_cpu_millis("2").unwrap(), 2000);
        assert_eq!(parse_cpu_millis("0.25").unwrap(), 250);
        assert!(parse_cpu_millis("0").is_err());
        assert!(parse_cpu_millis("fast").is_err());
        assert!(parse_cpu_millis("NaN").is_err());

        assert_eq!(cpu_quota(1500), 150_000);
        assert_eq!(cpu_shares(500), 512);
    }

    #[test]
    fn test_cpu_out_of_range() {
        for bad in ["99999999999999999m", "1e300", "1e17"] {
            assert_eq!(
                parse_cpu_millis(bad),
                Err(BuildError::InvalidCpu(bad.to_string())),
                "{bad}"
            );
        }

        let largest = format!("{MAX_CPU_MILLIS}m");
        let millis = parse_cpu_millis(&largest).unwrap();
        assert_eq!(cpu_quota(millis), MAX_CPU_MILLIS * CPU_PERIOD / 1000);
        assert!(cpu_shares(millis) > 0);
    }

    #[test]
    fn test_durations() {
        assert_eq!(
            parse_duration("interval", "1m30s").unwrap(),
            Duration::from_secs(90)
        );
        assert_eq!(as_nanos(Duration::from_secs(2)), 2_000_000_000);
        let err = parse_duration("timeout", "soon").unwrap_err();
        assert!(matches!(err, BuildError::InvalidDuration { field: "timeout", .. }));
    }
}
