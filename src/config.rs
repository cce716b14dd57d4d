use std::str::FromStr;

use url::Url;

use crate::reveal::MotionPolicy;
use crate::telemetry::LogLevel;

const DEFAULT_REVEAL_MARGIN_PX: i32 = -100;
const DEFAULT_REVEAL_TIME_SCALE_PERCENT: u32 = 100;
const DEFAULT_MOTION_POLICY: MotionPolicy = MotionPolicy::Suppress;
const DEFAULT_LOG_LEVEL: LogLevel = LogLevel::Info;

const REVEAL_MARGIN_PX_BOUNDS: (i32, i32) = (-1_000, 1_000);
const REVEAL_TIME_SCALE_PERCENT_BOUNDS: (u32, u32) = (10, 400);

/// Runtime knobs for the presentation engine.
///
/// Every field has a default, so a lookup that knows nothing still yields a
/// usable config. Out-of-range or unparsable values fall back silently.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    pub reveal_margin_px: f64,
    pub reveal_time_scale: f64,
    pub motion_policy: MotionPolicy,
    pub log_level: LogLevel,
    pub contact_endpoint: Option<Url>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_margin_px: f64::from(DEFAULT_REVEAL_MARGIN_PX),
            reveal_time_scale: f64::from(DEFAULT_REVEAL_TIME_SCALE_PERCENT) / 100.0,
            motion_policy: DEFAULT_MOTION_POLICY,
            log_level: DEFAULT_LOG_LEVEL,
            contact_endpoint: None,
        }
    }
}

impl EngineConfig {
    /// Builds a config from an arbitrary key lookup (environment variables,
    /// `data-*` attributes on the mount element, a test map).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let reveal_margin_px = parse_with_bounds(
            &lookup,
            "REVEAL_MARGIN_PX",
            DEFAULT_REVEAL_MARGIN_PX,
            REVEAL_MARGIN_PX_BOUNDS,
        );
        let time_scale_percent = parse_with_bounds(
            &lookup,
            "REVEAL_TIME_SCALE_PERCENT",
            DEFAULT_REVEAL_TIME_SCALE_PERCENT,
            REVEAL_TIME_SCALE_PERCENT_BOUNDS,
        );
        let motion_policy = parse_non_empty_string(&lookup, "REVEAL_MOTION_POLICY")
            .and_then(|value| MotionPolicy::from_str(&value.to_ascii_lowercase()))
            .unwrap_or(DEFAULT_MOTION_POLICY);
        let log_level = parse_non_empty_string(&lookup, "LOG_LEVEL")
            .and_then(|value| LogLevel::from_str(&value.to_ascii_lowercase()))
            .unwrap_or(DEFAULT_LOG_LEVEL);
        let contact_endpoint = parse_http_url(&lookup, "CONTACT_ENDPOINT");

        Self {
            reveal_margin_px: f64::from(reveal_margin_px),
            reveal_time_scale: f64::from(time_scale_percent) / 100.0,
            motion_policy,
            log_level,
            contact_endpoint,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_non_empty_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_with_bounds<F, T>(lookup: &F, name: &str, default: T, bounds: (T, T)) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd,
{
    parse_non_empty_string(lookup, name)
        .and_then(|value| value.parse::<T>().ok())
        .filter(|value| (bounds.0..=bounds.1).contains(value))
        .unwrap_or(default)
}

fn parse_http_url<F>(lookup: &F, name: &str) -> Option<Url>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_non_empty_string(lookup, name)?;
    let parsed = Url::parse(&value).ok()?;

    if parsed.scheme() == "http" || parsed.scheme() == "https" {
        Some(parsed)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_lookup_yields_defaults() {
        let config = EngineConfig::from_lookup(|_| None);
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.reveal_margin_px, -100.0);
        assert_eq!(config.motion_policy, MotionPolicy::Suppress);
    }

    #[test]
    fn values_inside_bounds_are_used() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("REVEAL_MARGIN_PX", " 40 "),
            ("REVEAL_TIME_SCALE_PERCENT", "50"),
            ("REVEAL_MOTION_POLICY", "Shorten"),
            ("LOG_LEVEL", "debug"),
            ("CONTACT_ENDPOINT", "https://formsubmit.co/ajax/someone@example.com"),
        ]));

        assert_eq!(config.reveal_margin_px, 40.0);
        assert_eq!(config.reveal_time_scale, 0.5);
        assert_eq!(config.motion_policy, MotionPolicy::Shorten);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(
            config.contact_endpoint.as_ref().map(Url::as_str),
            Some("https://formsubmit.co/ajax/someone@example.com")
        );
    }

    #[test]
    fn malformed_endpoints_are_rejected() {
        for endpoint in [
            "https://exa mple.com/x",
            "http://[::1",
            "https://:::/",
            "http://a b",
            "formsubmit.co/ajax/someone@example.com",
        ] {
            let config = EngineConfig::from_lookup(lookup_from(&[("CONTACT_ENDPOINT", endpoint)]));
            assert_eq!(config.contact_endpoint, None, "{endpoint} should be rejected");
        }
    }

    #[test]
    fn out_of_bounds_and_garbage_fall_back() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("REVEAL_MARGIN_PX", "-5000"),
            ("REVEAL_TIME_SCALE_PERCENT", "fast"),
            ("REVEAL_MOTION_POLICY", "wiggle"),
            ("LOG_LEVEL", "trace"),
            ("CONTACT_ENDPOINT", "ftp://example.com/drop"),
        ]));

        assert_eq!(config, EngineConfig::default());
    }
}
