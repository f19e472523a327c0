//! Linear RGBA colour with hex parsing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An RGBA colour with components in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    /// Used when a colour code is missing from the palette.
    pub const FALLBACK_GREY: Color = Color::rgb(0.63, 0.65, 0.66);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
    }

    /// Build from a packed `0xRRGGBB` value.
    pub fn from_packed_rgb(value: u32) -> Self {
        Self::from_rgb8(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        )
    }

    /// Parse `#RRGGBB`, `RRGGBB` or `0xRRGGBB`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex
            .trim()
            .trim_start_matches('#')
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        if digits.len() != 6 {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self::from_packed_rgb)
    }

    pub fn with_alpha(mut self, a: f32) -> Self {
        self.a = a;
        self
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self::rgba(self.r * factor, self.g * factor, self.b * factor, self.a)
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn to_hex(self) -> String {
        let [r, g, b, _] = self.to_rgba8();
        format!("#{:02X}{:02X}{:02X}", r, g, b)
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Hex(String),
            Rgb([u8; 3]),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Hex(s) => Color::from_hex(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid colour '{}'", s))),
            Repr::Rgb([r, g, b]) => Ok(Color::from_rgb8(r, g, b)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let c = Color::from_hex("#C91A09").unwrap();
        assert_eq!(c.to_rgba8(), [0xC9, 0x1A, 0x09, 0xFF]);
        assert_eq!(Color::from_hex("0x05131D").unwrap().to_hex(), "#05131D");
        assert!(Color::from_hex("#12345").is_none());
        assert!(Color::from_hex("zzzzzz").is_none());
    }

    #[test]
    fn test_deserialize_forms() {
        let hex: Color = serde_json::from_str("\"#FF0000\"").unwrap();
        let arr: Color = serde_json::from_str("[255, 0, 0]").unwrap();
        assert_eq!(hex, arr);
        assert!(serde_json::from_str::<Color>("\"red\"").is_err());
    }
}
