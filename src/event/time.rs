//! Musical time: integer ticks and rational note values.
//!
//! Timestamps and durations are integer ticks so that ordering and arithmetic
//! stay exact. Note values (a quarter note is `1/4`) are rationals; conversion
//! between the two only happens through a ticks-per-beat resolution.

use fraction::Fraction;

/// Integer unit of musical time. Signed so retiming offsets can be negative.
pub type Tick = i64;

/// Default resolution. 960 divides cleanly by 2, 3, 4, 5, 6, 8, 10, 12, 15, 16...
pub const DEFAULT_TICKS_PER_BEAT: u32 = 960;

/// Default time signature numerator.
pub const DEFAULT_BEATS_PER_BAR: u32 = 4;

/// Number of beats (quarter notes) in a whole note.
const BEATS_PER_WHOLE: u64 = 4;

/// Convert a note value into ticks, rounding to the nearest tick.
pub fn ticks_from_value(value: Fraction, ticks_per_beat: u32) -> Tick {
    let whole = Fraction::new(BEATS_PER_WHOLE * ticks_per_beat as u64, 1u64);
    let scaled = value * whole;
    let negative = scaled < zero();
    match (scaled.numer(), scaled.denom()) {
        (Some(&n), Some(&d)) if d != 0 => {
            let ticks = ((n + d / 2) / d) as Tick;
            if negative {
                -ticks
            } else {
                ticks
            }
        }
        _ => 0,
    }
}

/// Convert ticks back into an exact note value.
pub fn value_from_ticks(ticks: Tick, ticks_per_beat: u32) -> Fraction {
    let denominator = BEATS_PER_WHOLE * ticks_per_beat.max(1) as u64;
    if ticks < 0 {
        Fraction::new_neg(ticks.unsigned_abs(), denominator)
    } else {
        Fraction::new(ticks as u64, denominator)
    }
}

/// Round a tick position down to the start of its bar.
pub fn quantize_to_bar(ticks: Tick, beats_per_bar: u32, ticks_per_beat: u32) -> Tick {
    let bar = beats_per_bar as Tick * ticks_per_beat as Tick;
    if bar == 0 {
        return ticks;
    }
    ticks.div_euclid(bar) * bar
}

/// The rational zero.
pub fn zero() -> Fraction {
    Fraction::new(0u64, 1u64)
}

/// Scale a tick span by a rational factor, rounding toward zero.
pub fn scale_ticks(ticks: Tick, factor: Fraction) -> Tick {
    let scaled = value_from_ticks(ticks, 1) * factor;
    // value_from_ticks(_, 1) divides by 4; undo it after scaling.
    let negative = scaled < zero();
    match (scaled.numer(), scaled.denom()) {
        (Some(&n), Some(&d)) if d != 0 => {
            let ticks = (n * BEATS_PER_WHOLE / d) as Tick;
            if negative {
                -ticks
            } else {
                ticks
            }
        }
        _ => 0,
    }
}

/// Parse `"3/8"`, `"2"` or `"-1/4"` into a fraction.
pub fn parse_fraction(text: &str) -> Option<Fraction> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (num, den) = match body.split_once('/') {
        Some((n, d)) => (n.trim().parse::<u64>().ok()?, d.trim().parse::<u64>().ok()?),
        None => (body.parse::<u64>().ok()?, 1),
    };
    if den == 0 {
        return None;
    }
    Some(if negative {
        Fraction::new_neg(num, den)
    } else {
        Fraction::new(num, den)
    })
}

/// Render a fraction as `n/d`, or `n` when the denominator is one.
pub fn format_fraction(value: &Fraction) -> String {
    let sign = if *value < zero() { "-" } else { "" };
    match (value.numer(), value.denom()) {
        (Some(n), Some(1)) => format!("{sign}{n}"),
        (Some(n), Some(d)) => format!("{sign}{n}/{d}"),
        _ => "NaN".to_string(),
    }
}

/// Serde adapter storing fractions as `"n/d"` strings.
pub(crate) mod fraction_string {
    use fraction::Fraction;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Fraction, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_fraction(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fraction, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_fraction(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid note value '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarter_note_is_one_beat() {
        let quarter = Fraction::new(1u64, 4u64);
        assert_eq!(ticks_from_value(quarter, DEFAULT_TICKS_PER_BEAT), 960);
    }

    #[test]
    fn whole_note_is_four_beats() {
        let whole = Fraction::new(1u64, 1u64);
        assert_eq!(ticks_from_value(whole, DEFAULT_TICKS_PER_BEAT), 3840);
    }

    #[test]
    fn triplet_rounds_to_nearest_tick() {
        let triplet = Fraction::new(1u64, 12u64);
        assert_eq!(ticks_from_value(triplet, DEFAULT_TICKS_PER_BEAT), 320);
        assert_eq!(ticks_from_value(triplet, 100), 33);
    }

    #[test]
    fn value_round_trip() {
        for ticks in [0, 1, 240, 960, 1440, 3840] {
            let value = value_from_ticks(ticks, DEFAULT_TICKS_PER_BEAT);
            assert_eq!(ticks_from_value(value, DEFAULT_TICKS_PER_BEAT), ticks);
        }
    }

    #[test]
    fn negative_values() {
        let value = value_from_ticks(-960, DEFAULT_TICKS_PER_BEAT);
        assert_eq!(value, Fraction::new_neg(1u64, 4u64));
        assert_eq!(ticks_from_value(value, DEFAULT_TICKS_PER_BEAT), -960);
    }

    #[test]
    fn quantize_rounds_down_to_bar() {
        let pos = 5 * 960 + 480;
        assert_eq!(quantize_to_bar(pos, 4, 960), 4 * 960);
        assert_eq!(quantize_to_bar(-1, 4, 960), -4 * 960);
    }

    #[test]
    fn scale_ticks_by_fraction() {
        assert_eq!(scale_ticks(960, Fraction::new(1u64, 2u64)), 480);
        assert_eq!(scale_ticks(100, Fraction::new(3u64, 1u64)), 300);
        assert_eq!(scale_ticks(-100, Fraction::new(1u64, 2u64)), -50);
    }

    #[test]
    fn parse_and_format() {
        assert_eq!(parse_fraction("3/8"), Some(Fraction::new(3u64, 8u64)));
        assert_eq!(parse_fraction("2"), Some(Fraction::new(2u64, 1u64)));
        assert_eq!(parse_fraction("-1/4"), Some(Fraction::new_neg(1u64, 4u64)));
        assert_eq!(parse_fraction("1/0"), None);
        assert_eq!(parse_fraction("abc"), None);
        assert_eq!(format_fraction(&Fraction::new(3u64, 8u64)), "3/8");
        assert_eq!(format_fraction(&Fraction::new(4u64, 2u64)), "2");
        assert_eq!(format_fraction(&Fraction::new_neg(1u64, 4u64)), "-1/4");
    }
}
