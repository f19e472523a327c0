//! Line-level decoding of LDraw source text.
//!
//! Every non-blank line decodes to exactly one [`Directive`]. The first token is
//! the line type; anything other than `0`..=`5` is a malformed directive.

use super::palette::{parse_colour_definition, ColourDefinition};
use crate::types::ldraw_matrix;
use glam::{Mat4, Vec3};

/// Colour code meaning "inherit the colour of the referencing line".
pub const MAIN_COLOUR: u32 = 16;
/// Colour code meaning "inherit the edge colour of the referencing line".
pub const EDGE_COLOUR: u32 = 24;

/// One decoded source line.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Type 0 meta command or comment.
    Meta(Meta),
    /// Type 1 reference to another file.
    SubFile(SubFileRef),
    /// Type 2 edge line.
    Line { colour: u32, points: [Vec3; 2] },
    /// Type 3 triangle.
    Triangle { colour: u32, points: [Vec3; 3] },
    /// Type 4 quadrilateral.
    Quad { colour: u32, points: [Vec3; 4] },
    /// Type 5 optional (conditional) edge line.
    OptionalLine {
        colour: u32,
        points: [Vec3; 2],
        controls: [Vec3; 2],
    },
}

/// Type 0 commands the loader cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    /// `0 STEP`
    Step,
    /// `0 ROTSTEP ...` (a step boundary whose view rotation is ignored).
    RotStep,
    /// `0 FILE name` starts an embedded file of a multi-part document.
    File(String),
    /// `0 NOFILE` ends an embedded file.
    NoFile,
    /// `0 !COLOUR ...` palette entry.
    Colour(ColourDefinition),
    /// `0 !LDRAW_ORG Part ...` file classification.
    LdrawOrg(String),
    /// `0 Name: ...`
    Name(String),
    /// `0 BFC INVERTNEXT`
    InvertNext,
    /// Anything else, kept verbatim.
    Comment(String),
}

/// A type-1 line: place another file with a colour and transform.
#[derive(Debug, Clone, PartialEq)]
pub struct SubFileRef {
    pub colour: u32,
    pub transform: Mat4,
    /// File name exactly as written (may contain backslashes).
    pub name: String,
}

impl Directive {
    /// Whether this directive contributes renderable polygons.
    pub fn is_polygon(&self) -> bool {
        matches!(self, Directive::Triangle { .. } | Directive::Quad { .. })
    }

    /// Whether this directive is a step boundary.
    pub fn is_step(&self) -> bool {
        matches!(self, Directive::Meta(Meta::Step) | Directive::Meta(Meta::RotStep))
    }
}

/// Decode a single line. Returns `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<Directive>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (kind, rest) = split_first(line);
    let directive = match kind {
        "0" => Directive::Meta(parse_meta(rest)?),
        "1" => {
            let (colour, rest) = parse_colour_field(rest)?;
            let (values, name) = parse_floats::<12>(rest)?;
            let name = name.trim();
            if name.is_empty() {
                return Err("type 1 line is missing a file name".to_string());
            }
            Directive::SubFile(SubFileRef {
                colour,
                transform: ldraw_matrix(&values),
                name: name.to_string(),
            })
        }
        "2" => {
            let (colour, rest) = parse_colour_field(rest)?;
            let (v, _) = parse_floats::<6>(rest)?;
            Directive::Line {
                colour,
                points: [point(&v, 0), point(&v, 1)],
            }
        }
        "3" => {
            let (colour, rest) = parse_colour_field(rest)?;
            let (v, _) = parse_floats::<9>(rest)?;
            Directive::Triangle {
                colour,
                points: [point(&v, 0), point(&v, 1), point(&v, 2)],
            }
        }
        "4" => {
            let (colour, rest) = parse_colour_field(rest)?;
            let (v, _) = parse_floats::<12>(rest)?;
            Directive::Quad {
                colour,
                points: [point(&v, 0), point(&v, 1), point(&v, 2), point(&v, 3)],
            }
        }
        "5" => {
            let (colour, rest) = parse_colour_field(rest)?;
            let (v, _) = parse_floats::<12>(rest)?;
            Directive::OptionalLine {
                colour,
                points: [point(&v, 0), point(&v, 1)],
                controls: [point(&v, 2), point(&v, 3)],
            }
        }
        other => return Err(format!("unknown line type '{}'", other)),
    };

    Ok(Some(directive))
}

fn parse_meta(rest: &str) -> Result<Meta, String> {
    let (command, args) = split_first(rest);
    let meta = match command.to_ascii_uppercase().as_str() {
        "STEP" => Meta::Step,
        "ROTSTEP" => Meta::RotStep,
        "FILE" => Meta::File(args.trim().to_string()),
        "NOFILE" => Meta::NoFile,
        "!COLOUR" => Meta::Colour(parse_colour_definition(args)?),
        "!LDRAW_ORG" => Meta::LdrawOrg(args.trim().to_string()),
        "NAME:" => Meta::Name(args.trim().to_string()),
        "BFC" if args.trim().eq_ignore_ascii_case("INVERTNEXT") => Meta::InvertNext,
        _ => Meta::Comment(rest.trim().to_string()),
    };
    Ok(meta)
}

/// Parse a colour code: decimal, or `0x2RRGGBB` direct colour.
pub fn parse_colour_code(token: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else {
        token.parse::<u32>()
    };
    parsed.map_err(|_| format!("invalid colour code '{}'", token))
}

fn parse_colour_field(rest: &str) -> Result<(u32, &str), String> {
    let (token, rest) = split_first(rest);
    if token.is_empty() {
        return Err("missing colour code".to_string());
    }
    Ok((parse_colour_code(token)?, rest))
}

/// Parse exactly `N` floats, returning them with the unparsed remainder.
fn parse_floats<const N: usize>(mut rest: &str) -> Result<([f32; N], &str), String> {
    let mut values = [0.0f32; N];
    for (i, value) in values.iter_mut().enumerate() {
        let (token, tail) = split_first(rest);
        if token.is_empty() {
            return Err(format!("expected {} numbers, found {}", N, i));
        }
        *value = token
            .parse::<f32>()
            .map_err(|_| format!("invalid number '{}'", token))?;
        rest = tail;
    }
    Ok((values, rest))
}

fn point(values: &[f32], index: usize) -> Vec3 {
    Vec3::new(values[index * 3], values[index * 3 + 1], values[index * 3 + 2])
}

/// Split off the first whitespace-delimited token.
fn split_first(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subfile_reference() {
        let d = parse_line("1 4 10 -24 0 1 0 0 0 1 0 0 0 1 3001.dat")
            .unwrap()
            .unwrap();
        match d {
            Directive::SubFile(r) => {
                assert_eq!(r.colour, 4);
                assert_eq!(r.name, "3001.dat");
                assert_eq!(r.transform.w_axis.truncate(), Vec3::new(10.0, -24.0, 0.0));
            }
            other => panic!("unexpected directive {:?}", other),
        }
    }

    #[test]
    fn test_subfile_name_keeps_spaces_and_backslashes() {
        let d = parse_line("1 16 0 0 0 1 0 0 0 1 0 0 0 1 s\\3001s01.dat")
            .unwrap()
            .unwrap();
        let Directive::SubFile(r) = d else { panic!() };
        assert_eq!(r.name, "s\\3001s01.dat");

        let d = parse_line("1 16 0 0 0 1 0 0 0 1 0 0 0 1 my sub model.ldr")
            .unwrap()
            .unwrap();
        let Directive::SubFile(r) = d else { panic!() };
        assert_eq!(r.name, "my sub model.ldr");
    }

    #[test]
    fn test_parse_meta_commands() {
        assert_eq!(parse_line("0 STEP").unwrap(), Some(Directive::Meta(Meta::Step)));
        assert_eq!(parse_line("0 step").unwrap(), Some(Directive::Meta(Meta::Step)));
        assert_eq!(
            parse_line("0 ROTSTEP 0 45 0 ABS").unwrap(),
            Some(Directive::Meta(Meta::RotStep))
        );
        assert_eq!(
            parse_line("0 FILE wheel.ldr").unwrap(),
            Some(Directive::Meta(Meta::File("wheel.ldr".to_string())))
        );
        assert_eq!(
            parse_line("0 BFC INVERTNEXT").unwrap(),
            Some(Directive::Meta(Meta::InvertNext))
        );
        assert_eq!(
            parse_line("0 Brick 2 x 4").unwrap(),
            Some(Directive::Meta(Meta::Comment("Brick 2 x 4".to_string())))
        );
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_polygons() {
        let tri = parse_line("3 16 0 0 0 1 0 0 0 1 0").unwrap().unwrap();
        assert!(tri.is_polygon());
        let quad = parse_line("4 0x2FF0000 0 0 0 1 0 0 1 1 0 0 1 0").unwrap().unwrap();
        match quad {
            Directive::Quad { colour, .. } => assert_eq!(colour, 0x2FF0000),
            other => panic!("unexpected directive {:?}", other),
        }
        let edge = parse_line("2 24 0 0 0 1 1 1").unwrap().unwrap();
        assert!(!edge.is_polygon());
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_line("7 1 2 3").is_err());
        assert!(parse_line("3 16 0 0 0 1 0").is_err());
        assert!(parse_line("1 4 0 0 0 1 0 0 0 1 0 0 0 1").is_err());
        assert!(parse_line("2 red 0 0 0 1 1 1").is_err());
        assert!(parse_line("3 16 0 0 0 a 0 0 0 1 0").is_err());
    }
}
