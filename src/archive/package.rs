//! Package document parsing (container.xml, OPF)

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::ParseError;

use super::resolve_path;

/// Well-known location of the container document
pub(crate) const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Parsed package document
#[derive(Debug, Default)]
pub(crate) struct PackageDocument {
    /// `dc:title`, if present and non-empty
    pub title: Option<String>,
    /// Manifest items in document order
    pub manifest: Vec<ManifestItem>,
    /// Spine item ids in reading order
    pub spine: Vec<String>,
}

/// One manifest entry, with its href resolved to an archive path
#[derive(Debug, Clone)]
pub(crate) struct ManifestItem {
    pub id: String,
    pub path: String,
    pub media_type: String,
}

impl PackageDocument {
    /// Manifest items in reading order
    ///
    /// Falls back to every markup item in manifest order when the spine is empty.
    /// Spine references to unknown ids are skipped.
    pub fn reading_order(&self) -> Vec<&ManifestItem> {
        if self.spine.is_empty() {
            return self
                .manifest
                .iter()
                .filter(|item| is_markup(&item.media_type, &item.path))
                .collect();
        }

        self.spine
            .iter()
            .filter_map(|idref| {
                let item = self.manifest.iter().find(|item| &item.id == idref);
                if item.is_none() {
                    tracing::debug!(idref = %idref, "spine references unknown manifest id");
                }
                item
            })
            .collect()
    }

    /// Media type declared for an archive path
    pub fn media_type_of(&self, path: &str) -> Option<&str> {
        self.manifest
            .iter()
            .find(|item| item.path == path)
            .map(|item| item.media_type.as_str())
    }
}

/// Whether a resource holds chapter markup
pub(crate) fn is_markup(media_type: &str, path: &str) -> bool {
    match media_type {
        "application/xhtml+xml" | "text/html" | "text/x-oeb1-document" => true,
        "" => {
            let lower = path.to_ascii_lowercase();
            lower.ends_with(".xhtml") || lower.ends_with(".html") || lower.ends_with(".htm")
        }
        _ => false,
    }
}

/// Find the OPF path inside `META-INF/container.xml`
pub(crate) fn parse_container(bytes: &[u8]) -> Result<String, ParseError> {
    let content = String::from_utf8_lossy(strip_bom(bytes));
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name(e.name().as_ref()) == b"rootfile" =>
            {
                if let Some(path) = attribute(&e, b"full-path") {
                    return Ok(path);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::InvalidPackageDocument {
                    path: CONTAINER_PATH.to_string(),
                    reason: e.to_string(),
                });
            }
            _ => {}
        }
    }

    Err(ParseError::InvalidPackageDocument {
        path: CONTAINER_PATH.to_string(),
        reason: "no rootfile element".to_string(),
    })
}

/// Parse an OPF package document located at `opf_path`
pub(crate) fn parse_opf(bytes: &[u8], opf_path: &str) -> Result<PackageDocument, ParseError> {
    let content = String::from_utf8_lossy(strip_bom(bytes));
    // text is kept untrimmed so entity references inside the title keep their spacing
    let mut reader = Reader::from_str(&content);

    let invalid = |reason: String| ParseError::InvalidPackageDocument {
        path: opf_path.to_string(),
        reason,
    };

    let mut doc = PackageDocument::default();
    let mut saw_package = false;
    let mut in_metadata = false;
    let mut in_title = false;
    let mut title = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                match local_name(e.name().as_ref()) {
                    b"package" => saw_package = true,
                    b"metadata" => in_metadata = true,
                    b"title" if in_metadata && doc.title.is_none() => {
                        in_title = true;
                        title.clear();
                    }
                    _ => {}
                }
                handle_item(&e, opf_path, &mut doc);
            }
            Ok(Event::Empty(e)) => handle_item(&e, opf_path, &mut doc),
            Ok(Event::Text(e)) if in_title => {
                title.push_str(&String::from_utf8_lossy(e.as_ref()));
            }
            Ok(Event::GeneralRef(e)) if in_title => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    title.push_str(&resolved);
                }
            }
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"metadata" => in_metadata = false,
                b"title" if in_title => {
                    in_title = false;
                    let trimmed = title.trim();
                    if !trimmed.is_empty() {
                        doc.title = Some(trimmed.to_string());
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(invalid(e.to_string())),
            _ => {}
        }
    }

    if !saw_package {
        return Err(invalid("no package element".to_string()));
    }

    Ok(doc)
}

fn handle_item(e: &BytesStart<'_>, opf_path: &str, doc: &mut PackageDocument) {
    match local_name(e.name().as_ref()) {
        b"item" => {
            let id = attribute(e, b"id").unwrap_or_default();
            let href = attribute(e, b"href").unwrap_or_default();
            if id.is_empty() || href.is_empty() {
                return;
            }
            let Some(path) = resolve_path(opf_path, &href) else {
                tracing::debug!(href = %href, "unresolvable manifest href");
                return;
            };
            doc.manifest.push(ManifestItem {
                id,
                path,
                media_type: attribute(e, b"media-type").unwrap_or_default(),
            });
        }
        b"itemref" => {
            if let Some(idref) = attribute(e, b"idref") {
                doc.spine.push(idref);
            }
        }
        _ => {}
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
}

/// Strip a UTF-8 byte order mark
fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Local part of a namespaced name ("dc:title" -> "title")
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(String::from)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Rock &amp; Roll</dc:title>
  </metadata>
  <manifest>
    <item id="c1" href="Text/ch%201.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="Text/ch2.xhtml" media-type="application/xhtml+xml"></item>
    <item id="img" href="../Images/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="c2"/>
    <itemref idref="missing"/>
    <itemref idref="c1"/>
  </spine>
</package>"#;

    #[test]
    fn container_points_at_opf() {
        let xml = br#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        assert_eq!(parse_container(xml).unwrap(), "OEBPS/content.opf");
    }

    #[test]
    fn container_without_rootfile_is_invalid() {
        let err = parse_container(b"<container/>").unwrap_err();
        assert!(matches!(err, ParseError::InvalidPackageDocument { .. }));
    }

    #[test]
    fn opf_title_manifest_and_spine() {
        let doc = parse_opf(OPF.as_bytes(), "OEBPS/content.opf").unwrap();

        assert_eq!(doc.title.as_deref(), Some("Rock & Roll"));
        assert_eq!(doc.manifest.len(), 3);
        assert_eq!(doc.manifest[0].path, "OEBPS/Text/ch 1.xhtml");
        assert_eq!(doc.manifest[2].path, "Images/cover.jpg");

        let order: Vec<&str> = doc.reading_order().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, vec!["c2", "c1"]);
        assert_eq!(doc.media_type_of("Images/cover.jpg"), Some("image/jpeg"));
    }

    #[test]
    fn empty_spine_uses_markup_manifest_items() {
        let opf = OPF.replace(
            r#"<spine>
    <itemref idref="c2"/>
    <itemref idref="missing"/>
    <itemref idref="c1"/>
  </spine>"#,
            "<spine/>",
        );
        let doc = parse_opf(opf.as_bytes(), "content.opf").unwrap();
        let order: Vec<&str> = doc.reading_order().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(order, vec!["c1", "c2"]);
    }

    #[test]
    fn non_package_xml_is_rejected() {
        let err = parse_opf(b"<html><body/></html>", "x.opf").unwrap_err();
        assert!(matches!(err, ParseError::InvalidPackageDocument { .. }));
    }

    #[test]
    fn markup_detection() {
        assert!(is_markup("application/xhtml+xml", "a.xhtml"));
        assert!(is_markup("", "Text/A.HTML"));
        assert!(!is_markup("image/png", "a.png"));
        assert!(!is_markup("text/css", "style.css"));
    }

    #[test]
    fn bom_is_ignored() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(br#"<container><rootfile full-path="a.opf"/></container>"#);
        assert_eq!(parse_container(&bytes).unwrap(), "a.opf");
    }
}
