//! Colour palette parsing (`LDConfig.ldr`).
//!
//! Primitive colour ids are meaningless without the palette, so the loader
//! fetches it before any geometry. Entries look like:
//!
//! ```text
//! 0 !COLOUR Red  CODE 4  VALUE #C91A09  EDGE #333333
//! 0 !COLOUR Trans_Clear  CODE 47  VALUE #FCFCFC  EDGE #C3C3C3  ALPHA 128
//! 0 !COLOUR Glow_In_Dark_Opaque  CODE 21  VALUE #E0FFB0  EDGE #A4C2A5  ALPHA 250  LUMINANCE 15
//! ```

use super::directive::{parse_colour_code, parse_line, Directive, Meta, EDGE_COLOUR, MAIN_COLOUR};
use super::document::Document;
use crate::error::ResourceError;
use crate::types::Color;
use std::collections::HashMap;
use tracing::warn;

/// Surface finish keyword of a palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Finish {
    #[default]
    Plain,
    Chrome,
    Pearlescent,
    Rubber,
    MatteMetallic,
    Metal,
    /// `MATERIAL GLITTER ...` / `MATERIAL SPECKLE ...`, kept verbatim.
    Material(String),
}

/// One `0 !COLOUR` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourDefinition {
    pub name: String,
    pub code: u32,
    pub value: Color,
    pub edge: Color,
    /// 0 = fully transparent, 255 = opaque.
    pub alpha: u8,
    /// 0..=255 glow strength.
    pub luminance: u8,
    pub finish: Finish,
}

impl ColourDefinition {
    pub fn is_transparent(&self) -> bool {
        self.alpha < 255
    }
}

/// Parse the arguments of a `0 !COLOUR` line (everything after the keyword).
pub(crate) fn parse_colour_definition(args: &str) -> Result<ColourDefinition, String> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let name = tokens
        .first()
        .ok_or_else(|| "!COLOUR without a name".to_string())?
        .to_string();

    let mut code = None;
    let mut value = None;
    let mut edge = None;
    let mut alpha = 255u8;
    let mut luminance = 0u8;
    let mut finish = Finish::Plain;

    let mut i = 1;
    while i < tokens.len() {
        let key = tokens[i].to_ascii_uppercase();
        let arg = tokens.get(i + 1).copied();
        match key.as_str() {
            "CODE" => {
                code = Some(parse_colour_code(arg.unwrap_or_default())?);
                i += 2;
            }
            "VALUE" => {
                value = Some(parse_palette_colour(arg.unwrap_or_default())?);
                i += 2;
            }
            "EDGE" => {
                // EDGE may name another colour code instead of a hex value
                edge = arg.and_then(Color::from_hex);
                i += 2;
            }
            "ALPHA" => {
                alpha = parse_byte(arg, "ALPHA")?;
                i += 2;
            }
            "LUMINANCE" => {
                luminance = parse_byte(arg, "LUMINANCE")?;
                i += 2;
            }
            "CHROME" => {
                finish = Finish::Chrome;
                i += 1;
            }
            "PEARLESCENT" => {
                finish = Finish::Pearlescent;
                i += 1;
            }
            "RUBBER" => {
                finish = Finish::Rubber;
                i += 1;
            }
            "MATTE_METALLIC" => {
                finish = Finish::MatteMetallic;
                i += 1;
            }
            "METAL" => {
                finish = Finish::Metal;
                i += 1;
            }
            "MATERIAL" => {
                finish = Finish::Material(tokens[i + 1..].join(" "));
                i = tokens.len();
            }
            _ => i += 1,
        }
    }

    let code = code.ok_or_else(|| format!("!COLOUR {} has no CODE", name))?;
    let value = value.ok_or_else(|| format!("!COLOUR {} has no VALUE", name))?;

    Ok(ColourDefinition {
        name,
        code,
        value,
        edge: edge.unwrap_or(Color::BLACK),
        alpha,
        luminance,
        finish,
    })
}

fn parse_palette_colour(token: &str) -> Result<Color, String> {
    Color::from_hex(token).ok_or_else(|| format!("invalid colour value '{}'", token))
}

fn parse_byte(token: Option<&str>, key: &str) -> Result<u8, String> {
    token
        .and_then(|t| t.parse::<u8>().ok())
        .ok_or_else(|| format!("invalid {} value", key))
}

/// The parsed colour table.
#[derive(Debug, Clone, Default)]
pub struct Palette {
    colours: HashMap<u32, ColourDefinition>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse palette text. Non-colour lines are ignored; malformed colour
    /// entries are fatal.
    pub fn parse(url: &str, text: &str) -> Result<Self, ResourceError> {
        let mut palette = Palette::new();
        for (idx, line) in text.lines().enumerate() {
            let directive = parse_line(line).map_err(|message| ResourceError::Parse {
                url: url.to_string(),
                line: idx + 1,
                message,
            })?;
            if let Some(Directive::Meta(Meta::Colour(def))) = directive {
                palette.insert(def);
            }
        }
        Ok(palette)
    }

    /// Collect the colour entries of an already parsed document.
    pub fn from_document(document: &Document) -> Self {
        let mut palette = Palette::new();
        for file in &document.files {
            for directive in &file.directives {
                if let Directive::Meta(Meta::Colour(def)) = directive {
                    palette.insert(def.clone());
                }
            }
        }
        palette
    }

    pub fn insert(&mut self, definition: ColourDefinition) {
        self.colours.insert(definition.code, definition);
    }

    pub fn get(&self, code: u32) -> Option<&ColourDefinition> {
        self.colours.get(&code)
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }

    /// All entries sorted by code.
    pub fn entries(&self) -> Vec<&ColourDefinition> {
        let mut entries: Vec<_> = self.colours.values().collect();
        entries.sort_by_key(|d| d.code);
        entries
    }

    /// Resolve a colour code to a definition, including direct colours.
    ///
    /// Unknown codes degrade to a neutral grey rather than failing the load.
    pub fn resolve(&self, code: u32) -> ColourDefinition {
        if let Some(def) = self.colours.get(&code) {
            return def.clone();
        }

        if let Some(direct) = direct_colour(code) {
            return ColourDefinition {
                name: format!("Direct_{:06X}", code & 0xFF_FFFF),
                code,
                value: direct,
                edge: Color::BLACK,
                alpha: 255,
                luminance: 0,
                finish: Finish::Plain,
            };
        }

        if code != MAIN_COLOUR && code != EDGE_COLOUR {
            warn!("colour code {} not found in palette, using fallback", code);
        }
        ColourDefinition {
            name: format!("Unknown_{}", code),
            code,
            value: Color::FALLBACK_GREY,
            edge: Color::BLACK,
            alpha: 255,
            luminance: 0,
            finish: Finish::Plain,
        }
    }
}

/// Decode `0x2RRGGBB` direct colours.
fn direct_colour(code: u32) -> Option<Color> {
    if code >> 24 == 0x2 {
        Some(Color::from_packed_rgb(code & 0xFF_FFFF))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LDCONFIG: &str = "\
0 LDraw.org Configuration File
0 Name: LDConfig.ldr
0 !COLOUR Black  CODE 0  VALUE #1B2A34  EDGE #2B4354
0 !COLOUR Red  CODE 4  VALUE #C91A09  EDGE #333333
0 !COLOUR Trans_Clear  CODE 47  VALUE #FCFCFC  EDGE #C3C3C3  ALPHA 128
0 !COLOUR Chrome_Gold  CODE 334  VALUE #BBA53D  EDGE #BBB23D  CHROME
0 !COLOUR Glitter_Trans_Clear  CODE 117  VALUE #FFFFFF  EDGE #C3C3C3  ALPHA 128  MATERIAL GLITTER VALUE #FFFFFF FRACTION 0.08 VFRACTION 0.1 SIZE 1
0 !COLOUR Glow_In_Dark_Opaque  CODE 21  VALUE #E0FFB0  EDGE #A4C2A5  ALPHA 250  LUMINANCE 15
";

    #[test]
    fn test_parse_palette() {
        let palette = Palette::parse("LDConfig.ldr", LDCONFIG).unwrap();
        assert_eq!(palette.len(), 6);

        let red = palette.get(4).unwrap();
        assert_eq!(red.name, "Red");
        assert_eq!(red.value.to_hex(), "#C91A09");
        assert!(!red.is_transparent());

        let clear = palette.get(47).unwrap();
        assert_eq!(clear.alpha, 128);
        assert!(clear.is_transparent());

        assert_eq!(palette.get(334).unwrap().finish, Finish::Chrome);
        assert!(matches!(palette.get(117).unwrap().finish, Finish::Material(_)));
        assert_eq!(palette.get(21).unwrap().luminance, 15);
    }

    #[test]
    fn test_resolve_direct_and_unknown() {
        let palette = Palette::parse("LDConfig.ldr", LDCONFIG).unwrap();
        let direct = palette.resolve(0x2FF8000);
        assert_eq!(direct.value.to_hex(), "#FF8000");

        let unknown = palette.resolve(9999);
        assert_eq!(unknown.value, Color::FALLBACK_GREY);
        assert_eq!(unknown.code, 9999);
    }

    #[test]
    fn test_palette_from_document() {
        let doc = Document::parse("file:///lib/LDConfig.ldr", LDCONFIG).unwrap();
        let palette = Palette::from_document(&doc);
        assert_eq!(palette.len(), 6);
        assert_eq!(palette.entries()[0].code, 0);
    }

    #[test]
    fn test_malformed_colour_is_fatal() {
        let err = Palette::parse("LDConfig.ldr", "0 !COLOUR Broken CODE 5").unwrap_err();
        match err {
            ResourceError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
