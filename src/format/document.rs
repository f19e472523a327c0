//! Parsed source documents, including multi-part (MPD) files.

use super::directive::{parse_line, Directive, Meta, SubFileRef};
use crate::error::ResourceError;

/// One file's worth of directives.
#[derive(Debug, Clone, Default)]
pub struct SourceFile {
    /// Name from `0 FILE`, or the document's own file name.
    pub name: String,
    pub directives: Vec<Directive>,
}

impl SourceFile {
    /// Whether the file declares itself a library part.
    ///
    /// Falls back to the `.dat` extension when there is no `!LDRAW_ORG` header.
    pub fn is_part(&self) -> bool {
        for directive in &self.directives {
            if let Directive::Meta(Meta::LdrawOrg(kind)) = directive {
                let kind = kind.to_ascii_lowercase();
                return kind.contains("part") || kind.contains("primitive");
            }
        }
        self.name.to_ascii_lowercase().ends_with(".dat")
    }

    /// All type-1 references in source order.
    pub fn references(&self) -> impl Iterator<Item = &SubFileRef> {
        self.directives.iter().filter_map(|d| match d {
            Directive::SubFile(r) => Some(r),
            _ => None,
        })
    }

    pub fn polygon_count(&self) -> usize {
        self.directives.iter().filter(|d| d.is_polygon()).count()
    }
}

/// A fetched and decoded resource: the main file plus any embedded files.
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub url: String,
    /// `files[0]` is the main model.
    pub files: Vec<SourceFile>,
    /// Length of the source text in bytes.
    pub size: usize,
}

impl Document {
    /// Decode document text. Any malformed line fails the whole document.
    pub fn parse(url: &str, text: &str) -> Result<Self, ResourceError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let default_name = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(url)
            .to_string();

        let mut files: Vec<SourceFile> = Vec::new();
        let mut current = SourceFile {
            name: default_name,
            directives: Vec::new(),
        };
        let mut saw_file_header = false;

        for (idx, line) in text.lines().enumerate() {
            let directive = parse_line(line).map_err(|message| ResourceError::Parse {
                url: url.to_string(),
                line: idx + 1,
                message,
            })?;

            match directive {
                None => {}
                Some(Directive::Meta(Meta::File(name))) => {
                    let previous = std::mem::replace(
                        &mut current,
                        SourceFile {
                            name,
                            directives: Vec::new(),
                        },
                    );
                    if saw_file_header {
                        // embedded file not closed by 0 NOFILE
                        if !previous.name.is_empty() {
                            files.push(previous);
                        }
                    } else if has_content(&previous) {
                        // text before the first 0 FILE is only kept if it draws something
                        files.push(previous);
                    }
                    saw_file_header = true;
                }
                Some(Directive::Meta(Meta::NoFile)) => {
                    files.push(std::mem::take(&mut current));
                }
                Some(directive) => current.directives.push(directive),
            }
        }

        if !current.name.is_empty() || has_content(&current) {
            files.push(current);
        }
        if files.is_empty() {
            files.push(SourceFile::default());
        }

        Ok(Document {
            url: url.to_string(),
            files,
            size: text.len(),
        })
    }

    /// The main model.
    pub fn main(&self) -> &SourceFile {
        &self.files[0]
    }

    /// Find an embedded file by name (case-insensitive, `\` and `/` equivalent).
    pub fn embedded(&self, name: &str) -> Option<&SourceFile> {
        self.embedded_index(name).map(|i| &self.files[i])
    }

    /// Index into `files` of an embedded file.
    pub fn embedded_index(&self, name: &str) -> Option<usize> {
        let wanted = normalize_name(name);
        self.files.iter().position(|f| normalize_name(&f.name) == wanted)
    }
}

/// Whether a file holds anything besides comments.
fn has_content(file: &SourceFile) -> bool {
    file.directives
        .iter()
        .any(|d| !matches!(d, Directive::Meta(Meta::Comment(_))))
}

/// Canonical form used to compare file names.
pub fn normalize_name(name: &str) -> String {
    name.trim().replace('\\', "/").to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_document() {
        let doc = Document::parse(
            "file:///models/house.ldr",
            "0 House\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n0 STEP\n1 1 0 -24 0 1 0 0 0 1 0 0 0 1 3003.dat\n",
        )
        .unwrap();
        assert_eq!(doc.files.len(), 1);
        assert_eq!(doc.main().name, "house.ldr");
        assert_eq!(doc.main().references().count(), 2);
        assert!(!doc.main().is_part());
    }

    #[test]
    fn test_multi_part_document() {
        let text = "\
0 FILE main.ldr
1 16 0 0 0 1 0 0 0 1 0 0 0 1 wheel.ldr
0 STEP
1 16 40 0 0 1 0 0 0 1 0 0 0 1 Wheel.ldr
0 NOFILE
0 FILE wheel.ldr
1 0 0 0 0 1 0 0 0 1 0 0 0 1 3641.dat
0 NOFILE
";
        let doc = Document::parse("file:///models/car.mpd", text).unwrap();
        assert_eq!(doc.files.len(), 2);
        assert_eq!(doc.main().name, "main.ldr");
        assert!(doc.embedded("WHEEL.LDR").is_some());
        assert!(doc.embedded("3641.dat").is_none());
    }

    #[test]
    fn test_header_before_first_file_is_dropped() {
        let text = "0 exported by tool\n0 FILE a.ldr\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\n";
        let doc = Document::parse("file:///m.mpd", text).unwrap();
        assert_eq!(doc.files.len(), 1);
        assert_eq!(doc.main().name, "a.ldr");
    }

    #[test]
    fn test_part_detection() {
        let doc = Document::parse(
            "file:///lib/parts/3001.dat",
            "0 Brick 2 x 4\n0 !LDRAW_ORG Part UPDATE 2004-03\n3 16 0 0 0 1 0 0 0 1 0\n",
        )
        .unwrap();
        assert!(doc.main().is_part());
        assert_eq!(doc.main().polygon_count(), 1);

        let embedded = SourceFile {
            name: "custom.dat".to_string(),
            directives: Vec::new(),
        };
        assert!(embedded.is_part());
    }

    #[test]
    fn test_byte_order_mark_is_skipped() {
        let text = "\u{feff}0 Saved on Windows\r\n1 4 0 0 0 1 0 0 0 1 0 0 0 1 3001.dat\r\n";
        let doc = Document::parse("file:///m.ldr", text).unwrap();
        assert_eq!(doc.main().references().count(), 1);
        assert_eq!(
            doc.main().directives[0],
            Directive::Meta(Meta::Comment("Saved on Windows".to_string()))
        );
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let err = Document::parse("file:///m.ldr", "0 ok\n3 16 0 0\n").unwrap_err();
        assert_eq!(
            err,
            ResourceError::Parse {
                url: "file:///m.ldr".to_string(),
                line: 2,
                message: "expected 9 numbers, found 2".to_string(),
            }
        );
    }
}
