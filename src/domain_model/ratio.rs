use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A fraction strictly between zero and one, applied to durations without
/// floating point rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ratio {
    num: u32,
    den: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RatioError {
    #[error("ratio must be written as `num/den`, got {0:?}")]
    Malformed(String),
    #[error("ratio {num}/{den} must lie strictly between 0 and 1")]
    OutOfRange { num: u32, den: u32 },
}

impl Ratio {
    pub fn new(num: u32, den: u32) -> Result<Self, RatioError> {
        if num == 0 || den == 0 || num >= den {
            return Err(RatioError::OutOfRange { num, den });
        }
        Ok(Self { num, den })
    }

    pub fn two_thirds() -> Self {
        Self { num: 2, den: 3 }
    }

    pub fn of(&self, duration: Duration) -> Duration {
        let nanos = duration.as_nanos() * u128::from(self.num) / u128::from(self.den);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Ratio {
    fn default() -> Self {
        Self::two_thirds()
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Ratio {
    type Err = RatioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (num, den) = s
            .split_once('/')
            .ok_or_else(|| RatioError::Malformed(s.to_owned()))?;
        let num = num
            .trim()
            .parse()
            .map_err(|_| RatioError::Malformed(s.to_owned()))?;
        let den = den
            .trim()
            .parse()
            .map_err(|_| RatioError::Malformed(s.to_owned()))?;
        Ratio::new(num, den)
    }
}

impl TryFrom<String> for Ratio {
    type Error = RatioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ratio> for String {
    fn from(value: Ratio) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_thirds_of_thirty_seconds_is_exact() {
        assert_eq!(Ratio::two_thirds().of(Duration::from_secs(30)), Duration::from_secs(20));
    }

    #[test]
    fn parses_and_rejects() {
        assert_eq!("3/4".parse::<Ratio>(), Ratio::new(3, 4));
        assert!(matches!("1/1".parse::<Ratio>(), Err(RatioError::OutOfRange { .. })));
        assert!(matches!("0/5".parse::<Ratio>(), Err(RatioError::OutOfRange { .. })));
        assert!(matches!("half".parse::<Ratio>(), Err(RatioError::Malformed(_))));
    }
}
