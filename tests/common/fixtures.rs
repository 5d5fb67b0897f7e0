//! In-memory EPUB builders

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Container document pointing at `OEBPS/content.opf`
pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// Wrap body markup into an XHTML chapter
pub fn chapter(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<head><title>chapter</title><style>p {{ margin: 0 }}</style></head>
<body>{body}</body>
</html>"#
    )
}

/// A paragraph of `len` characters
pub fn paragraph(len: usize) -> String {
    format!("<p>{}</p>", "x".repeat(len))
}

/// Builder for small EPUB packages
pub struct EpubBuilder {
    title: String,
    chapters: Vec<(String, String)>,
    images: Vec<(String, Vec<u8>, String)>,
}

impl EpubBuilder {
    /// Start a book with the given title
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            chapters: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Add a chapter at `OEBPS/<name>`, in reading order
    pub fn chapter(mut self, name: &str, body: &str) -> Self {
        self.chapters.push((name.to_string(), chapter(body)));
        self
    }

    /// Add an image at `OEBPS/<name>`
    pub fn image(mut self, name: &str, data: &[u8], media_type: &str) -> Self {
        self.images
            .push((name.to_string(), data.to_vec(), media_type.to_string()));
        self
    }

    fn opf(&self) -> String {
        let mut manifest = String::new();
        let mut spine = String::new();
        for (i, (name, _)) in self.chapters.iter().enumerate() {
            manifest.push_str(&format!(
                r#"<item id="c{i}" href="{name}" media-type="application/xhtml+xml"/>"#
            ));
            spine.push_str(&format!(r#"<itemref idref="c{i}"/>"#));
        }
        for (i, (name, _, media_type)) in self.images.iter().enumerate() {
            manifest.push_str(&format!(
                r#"<item id="i{i}" href="{name}" media-type="{media_type}"/>"#
            ));
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>{}</dc:title>
  </metadata>
  <manifest>{manifest}</manifest>
  <spine>{spine}</spine>
</package>"#,
            self.title
        )
    }

    /// Write the package
    pub fn build(self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

        writer.start_file("mimetype", stored).unwrap();
        writer.write_all(b"application/epub+zip").unwrap();
        writer.start_file("META-INF/container.xml", deflated).unwrap();
        writer.write_all(CONTAINER_XML.as_bytes()).unwrap();
        writer.start_file("OEBPS/content.opf", deflated).unwrap();
        writer.write_all(self.opf().as_bytes()).unwrap();

        for (name, markup) in &self.chapters {
            writer.start_file(format!("OEBPS/{name}"), deflated).unwrap();
            writer.write_all(markup.as_bytes()).unwrap();
        }
        for (name, data, _) in &self.images {
            writer.start_file(format!("OEBPS/{name}"), stored).unwrap();
            writer.write_all(data).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }
}

/// Overwrite the compressed data of a named entry with `0xFF`
pub fn corrupt_entry(bytes: &mut [u8], name: &str) {
    let mut pos = 0;
    while pos + 30 <= bytes.len() {
        if &bytes[pos..pos + 4] != b"PK\x03\x04" {
            pos += 1;
            continue;
        }
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]) as usize;
        let size = u32::from_le_bytes(bytes[pos + 18..pos + 22].try_into().unwrap()) as usize;
        let name_len = u16_at(pos + 26);
        let extra_len = u16_at(pos + 28);
        if &bytes[pos + 30..pos + 30 + name_len] == name.as_bytes() {
            let start = pos + 30 + name_len + extra_len;
            bytes[start..start + size].fill(0xFF);
            return;
        }
        pos += 4;
    }
    panic!("entry {name} not found");
}
