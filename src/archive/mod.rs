//! Archive loading and repair
//!
//! [`Archive::load`] parses an uploaded package. When the package is structurally damaged
//! (unreadable central directory, an entry that fails to decompress, a missing package
//! document) it is salvaged into a fresh package from whatever entries survive, and parsed
//! again. Only when that second parse fails is the book rejected with a [`ParseError`].

mod package;
mod salvage;

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};

use tracing::{debug, info, warn};
use url::Url;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{ParseError, ResourceError};

use package::{is_markup, PackageDocument, CONTAINER_PATH};

/// One entry of the archive
#[derive(Debug, Clone)]
pub struct ContentResource {
    /// Archive-relative path
    pub path: String,
    /// Decompressed bytes
    pub data: Vec<u8>,
    /// Declared media type; empty when neither declared nor guessable
    pub media_type: String,
}

/// A loaded book archive
///
/// Immutable once loaded.
#[derive(Debug)]
pub struct Archive {
    title_hint: String,
    title: Option<String>,
    resources: Vec<ContentResource>,
    by_path: HashMap<String, usize>,
    spine: Vec<SpineItem>,
    salvaged: bool,
}

#[derive(Debug)]
struct SpineItem {
    path: String,
    media_type: String,
}

/// Package contents produced by a successful parse
struct Parsed {
    title: Option<String>,
    resources: Vec<ContentResource>,
    spine: Vec<SpineItem>,
}

impl Archive {
    /// Load an archive, salvaging it if the primary parse fails
    pub fn load(bytes: Vec<u8>, title_hint: &str) -> Result<Self, ParseError> {
        match parse(&bytes) {
            Ok(parsed) => Ok(Self::from_parsed(title_hint, parsed, false)),
            Err(primary) => {
                warn!(
                    error = %primary,
                    title_hint = %title_hint,
                    "archive failed to parse, attempting salvage"
                );
                let rebuilt = salvage::salvage(&bytes)?;
                match parse(&rebuilt) {
                    Ok(parsed) => {
                        info!(
                            title_hint = %title_hint,
                            chapters = parsed.spine.len(),
                            "archive salvaged"
                        );
                        Ok(Self::from_parsed(title_hint, parsed, true))
                    }
                    Err(e) => Err(ParseError::SalvageFailed {
                        reason: format!("{e} (after: {primary})"),
                    }),
                }
            }
        }
    }

    fn from_parsed(title_hint: &str, parsed: Parsed, salvaged: bool) -> Self {
        let by_path = parsed
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.path.clone(), i))
            .collect();

        Self {
            title_hint: title_hint.to_string(),
            title: parsed.title,
            resources: parsed.resources,
            by_path,
            spine: parsed.spine,
            salvaged,
        }
    }

    /// Book title: the package title, or the hint without its `.epub` extension
    pub fn title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        let hint = self.title_hint.trim();
        let stem = if hint.to_ascii_lowercase().ends_with(".epub") {
            &hint[..hint.len() - ".epub".len()]
        } else {
            hint
        };
        stem.to_string()
    }

    /// Whether the archive had to be salvaged
    pub fn was_salvaged(&self) -> bool {
        self.salvaged
    }

    /// Every resource in the archive, in entry order
    pub fn resources(&self) -> &[ContentResource] {
        &self.resources
    }

    /// Look up a resource by archive path
    pub fn resource(&self, path: &str) -> Option<&ContentResource> {
        self.by_path.get(path).map(|&i| &self.resources[i])
    }

    /// Number of chapters in reading order
    pub fn chapter_count(&self) -> usize {
        self.spine.len()
    }

    /// Chapters in reading order
    ///
    /// A chapter that is missing from the archive or is not markup yields a
    /// [`ResourceError`] in its place.
    pub fn chapters(&self) -> impl Iterator<Item = Result<&ContentResource, ResourceError>> + '_ {
        self.spine.iter().map(move |item| {
            if !is_markup(&item.media_type, &item.path) {
                return Err(ResourceError::NotMarkup {
                    path: item.path.clone(),
                    media_type: item.media_type.clone(),
                });
            }
            self.resource(&item.path).ok_or_else(|| ResourceError::Missing {
                path: item.path.clone(),
            })
        })
    }
}

/// Resolve `reference` relative to the archive path `base`
///
/// The reference is percent-decoded first; fragments and queries are dropped. Returns
/// `None` for references that leave the archive (other schemes) or resolve to the root.
pub fn resolve_path(base: &str, reference: &str) -> Option<String> {
    let reference = urlencoding::decode(reference)
        .map(|r| r.into_owned())
        .unwrap_or_else(|_| reference.to_string());

    let root = Url::parse("file:///").ok()?;
    let base = root.join(base).ok()?;
    let resolved = base.join(&reference).ok()?;
    if resolved.scheme() != "file" {
        return None;
    }

    let path = urlencoding::decode(resolved.path()).ok()?;
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

fn parse(bytes: &[u8]) -> Result<Parsed, ParseError> {
    let mut zip = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ParseError::Unreadable(e.to_string()))?;

    let opf_path = match read_entry(&mut zip, CONTAINER_PATH)? {
        Some(container) => package::parse_container(&container)?,
        None => first_opf(&zip).ok_or(ParseError::MissingPackageDocument)?,
    };
    let opf = read_entry(&mut zip, &opf_path)?.ok_or(ParseError::MissingPackageDocument)?;
    let doc = package::parse_opf(&opf, &opf_path)?;

    let resources = read_resources(&mut zip, &doc)?;
    let present: std::collections::HashSet<&str> =
        resources.iter().map(|r| r.path.as_str()).collect();

    let mut spine = Vec::new();
    for item in doc.reading_order() {
        if !present.contains(item.path.as_str()) {
            warn!(path = %item.path, "chapter listed in package is missing from archive");
        }
        spine.push(SpineItem {
            path: item.path.clone(),
            media_type: item.media_type.clone(),
        });
    }

    debug!(
        opf = %opf_path,
        resources = resources.len(),
        chapters = spine.len(),
        "parsed package"
    );

    Ok(Parsed {
        title: doc.title,
        resources,
        spine,
    })
}

fn first_opf<R: Read + Seek>(zip: &ZipArchive<R>) -> Option<String> {
    zip.file_names()
        .find(|name| name.to_ascii_lowercase().ends_with(".opf"))
        .map(str::to_string)
}

/// Read one entry by name; `Ok(None)` when the archive has no such entry
fn read_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    path: &str,
) -> Result<Option<Vec<u8>>, ParseError> {
    let mut file = match zip.by_name(path) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(ParseError::EntryUnreadable {
                path: path.to_string(),
                reason: e.to_string(),
            });
        }
    };

    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)
        .map_err(|e| ParseError::EntryUnreadable {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    Ok(Some(data))
}

/// Read every file entry, attaching declared (or guessed) media types
fn read_resources<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    doc: &PackageDocument,
) -> Result<Vec<ContentResource>, ParseError> {
    let mut resources = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let mut file = zip.by_index(index).map_err(|e| ParseError::EntryUnreadable {
            path: format!("#{index}"),
            reason: e.to_string(),
        })?;
        if file.is_dir() {
            continue;
        }
        let path = file.name().to_string();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| ParseError::EntryUnreadable {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let media_type = doc
            .media_type_of(&path)
            .map(str::to_string)
            .or_else(|| guess_media_type(&path).map(str::to_string))
            .unwrap_or_default();

        resources.push(ContentResource {
            path,
            data,
            media_type,
        });
    }

    Ok(resources)
}

fn guess_media_type(path: &str) -> Option<&'static str> {
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    Some(match ext.as_str() {
        "xhtml" => "application/xhtml+xml",
        "html" | "htm" => "text/html",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "css" => "text/css",
        _ => return None,
    })
}
