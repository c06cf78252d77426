//! Rendition table types
//!
//! A rendition is one resolution/bitrate variant of a source asset. The table
//! is keyed by [`Resolution`] so a missing or unknown height is rejected when
//! the configuration is loaded rather than when a job is built.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target output height of a rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Resolution {
    P2160,
    P1440,
    P1080,
    P720,
    P480,
    P360,
    P240,
}

impl Resolution {
    /// All supported resolutions, tallest first
    pub const ALL: [Resolution; 7] = [
        Resolution::P2160,
        Resolution::P1440,
        Resolution::P1080,
        Resolution::P720,
        Resolution::P480,
        Resolution::P360,
        Resolution::P240,
    ];

    /// Output height in pixels
    pub fn height(self) -> u32 {
        match self {
            Resolution::P2160 => 2160,
            Resolution::P1440 => 1440,
            Resolution::P1080 => 1080,
            Resolution::P720 => 720,
            Resolution::P480 => 480,
            Resolution::P360 => 360,
            Resolution::P240 => 240,
        }
    }

    /// Directory name used for the rendition inside an asset's output folder
    /// (e.g. `720p`)
    pub fn dir_name(self) -> String {
        format!("{}p", self.height())
    }
}

impl TryFrom<u32> for Resolution {
    type Error = String;

    fn try_from(height: u32) -> Result<Self, Self::Error> {
        Resolution::ALL
            .into_iter()
            .find(|r| r.height() == height)
            .ok_or_else(|| {
                format!(
                    "unsupported resolution {} (expected one of 2160, 1440, 1080, 720, 480, 360, 240)",
                    height
                )
            })
    }
}

impl From<Resolution> for u32 {
    fn from(r: Resolution) -> Self {
        r.height()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}p", self.height())
    }
}

/// A bit rate as accepted by ffmpeg (`192k`, `2.5M`, `8M`, `500000`)
///
/// The original token is kept so it can be handed to the encoder verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bitrate {
    raw: String,
    bits_per_second: u64,
}

impl Bitrate {
    fn known(raw: &str, bits_per_second: u64) -> Self {
        Self {
            raw: raw.to_string(),
            bits_per_second,
        }
    }

    /// Bit rate in bits per second
    pub fn bits_per_second(&self) -> u64 {
        self.bits_per_second
    }

    /// The token passed to ffmpeg
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (number, multiplier) = match raw.char_indices().last() {
            Some((idx, 'k' | 'K')) => (&raw[..idx], 1_000f64),
            Some((idx, 'm' | 'M')) => (&raw[..idx], 1_000_000f64),
            Some((idx, 'g' | 'G')) => (&raw[..idx], 1_000_000_000f64),
            Some(_) => (raw, 1f64),
            None => return Err("empty bitrate".to_string()),
        };

        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid bitrate '{}'", raw))?;
        if !value.is_finite() || value <= 0.0 {
            return Err(format!("bitrate must be positive, got '{}'", raw));
        }

        let bits_per_second = (value * multiplier).round() as u64;
        if bits_per_second == 0 {
            return Err(format!("bitrate '{}' rounds to zero", raw));
        }

        Ok(Self {
            raw: raw.to_string(),
            bits_per_second,
        })
    }
}

impl TryFrom<String> for Bitrate {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Bitrate> for String {
    fn from(b: Bitrate) -> Self {
        b.raw
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One row of the rendition table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionSpec {
    pub resolution: Resolution,
    pub audio_bitrate: Bitrate,
    pub video_max_bitrate: Bitrate,
    /// Keep `video_max_bitrate / video_buffer_size` between 1 and 2
    pub video_buffer_size: Bitrate,
}

/// The built-in ladder: 1080p down to 240p
pub fn default_renditions() -> Vec<RenditionSpec> {
    type Rate<'a> = (&'a str, u64);
    let row = |resolution, audio: Rate, max: Rate, buffer: Rate| RenditionSpec {
        resolution,
        audio_bitrate: Bitrate::known(audio.0, audio.1),
        video_max_bitrate: Bitrate::known(max.0, max.1),
        video_buffer_size: Bitrate::known(buffer.0, buffer.1),
    };

    vec![
        row(Resolution::P1080, ("192k", 192_000), ("8M", 8_000_000), ("8M", 8_000_000)),
        row(Resolution::P720, ("192k", 192_000), ("5M", 5_000_000), ("5M", 5_000_000)),
        row(Resolution::P480, ("128k", 128_000), ("2.5M", 2_500_000), ("2.5M", 2_500_000)),
        row(Resolution::P360, ("128k", 128_000), ("1M", 1_000_000), ("1M", 1_000_000)),
        row(Resolution::P240, ("96k", 96_000), ("500k", 500_000), ("500k", 500_000)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bitrate_suffixes() {
        assert_eq!("192k".parse::<Bitrate>().unwrap().bits_per_second(), 192_000);
        assert_eq!("2.5M".parse::<Bitrate>().unwrap().bits_per_second(), 2_500_000);
        assert_eq!("8M".parse::<Bitrate>().unwrap().bits_per_second(), 8_000_000);
        assert_eq!("500000".parse::<Bitrate>().unwrap().bits_per_second(), 500_000);
        assert_eq!("1G".parse::<Bitrate>().unwrap().bits_per_second(), 1_000_000_000);
    }

    #[test]
    fn test_bitrate_keeps_original_token() {
        let b: Bitrate = " 2.5M ".parse().unwrap();
        assert_eq!(b.as_str(), "2.5M");
        assert_eq!(b.to_string(), "2.5M");
    }

    #[test]
    fn test_bitrate_rejects_garbage() {
        assert!("".parse::<Bitrate>().is_err());
        assert!("k".parse::<Bitrate>().is_err());
        assert!("fast".parse::<Bitrate>().is_err());
        assert!("-5M".parse::<Bitrate>().is_err());
        assert!("0k".parse::<Bitrate>().is_err());
    }

    #[test]
    fn test_resolution_from_height() {
        assert_eq!(Resolution::try_from(720).unwrap(), Resolution::P720);
        assert_eq!(Resolution::P720.dir_name(), "720p");
        assert!(Resolution::try_from(721).is_err());
    }

    #[test]
    fn test_default_ladder_matches_literals() {
        let table = default_renditions();
        let heights: Vec<u32> = table.iter().map(|r| r.resolution.height()).collect();
        assert_eq!(heights, vec![1080, 720, 480, 360, 240]);

        for row in &table {
            for b in [&row.audio_bitrate, &row.video_max_bitrate, &row.video_buffer_size] {
                let reparsed: Bitrate = b.as_str().parse().unwrap();
                assert_eq!(&reparsed, b);
            }
        }
        assert_eq!(table[2].video_max_bitrate.bits_per_second(), 2_500_000);
        assert_eq!(table[4].audio_bitrate.bits_per_second(), 96_000);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_kilobit_tokens_scale_by_thousand(kbps in 1u64..1_000_000) {
            let b: Bitrate = format!("{}k", kbps).parse().unwrap();
            prop_assert_eq!(b.bits_per_second(), kbps * 1000);
        }

        #[test]
        fn prop_every_supported_height_resolves(idx in 0usize..Resolution::ALL.len()) {
            let r = Resolution::ALL[idx];
            prop_assert_eq!(Resolution::try_from(r.height()).unwrap(), r);
        }
    }
}
