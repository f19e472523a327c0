//! LDraw source format parsing.
//!
//! Text is decoded line by line into a closed set of [`Directive`]s. Documents
//! may bundle several files (MPD `0 FILE` sections); the palette file is a
//! plain document whose `0 !COLOUR` lines form the [`Palette`].

pub mod directive;
pub mod document;
pub mod palette;

pub use directive::{parse_line, Directive, Meta, SubFileRef, EDGE_COLOUR, MAIN_COLOUR};
pub use document::{normalize_name, Document, SourceFile};
pub use palette::{ColourDefinition, Finish, Palette};
