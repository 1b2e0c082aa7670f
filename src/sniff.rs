//! Content-based MIME detection.
//!
//! Only the bytes are consulted; file names and client-declared content types
//! never influence the result.

use std::io::Cursor;

pub const MIME_EMPTY: &str = "application/x-empty";
pub const MIME_MSWORD: &str = "application/msword";
pub const MIME_OLE_STORAGE: &str = "application/x-ole-storage";
pub const MIME_ZIP: &str = "application/zip";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const OLE_SIGNATURE: &[u8] = b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1";
const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const HTML_MARKERS: &[&str] = &[
    "<!doctype html",
    "<html",
    "<head",
    "<body",
    "<title",
    "<script",
    "<style",
    "<table",
    "<h1",
    "<div",
    "<p>",
    "<!--",
];

pub fn sniff_mime(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return MIME_EMPTY.to_string();
    }
    if bytes.starts_with(b"%PDF-") {
        return mime::APPLICATION_PDF.essence_str().to_string();
    }
    if bytes.starts_with(b"\xFF\xD8\xFF") {
        return mime::IMAGE_JPEG.essence_str().to_string();
    }
    if bytes.starts_with(PNG_SIGNATURE) {
        return mime::IMAGE_PNG.essence_str().to_string();
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return mime::IMAGE_GIF.essence_str().to_string();
    }
    if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return MIME_WEBP.to_string();
    }
    if bytes.starts_with(OLE_SIGNATURE) {
        return sniff_ole(bytes).to_string();
    }
    if bytes.starts_with(ZIP_LOCAL_HEADER) {
        return sniff_zip(bytes).to_string();
    }
    if looks_like_html(bytes) {
        return mime::TEXT_HTML.essence_str().to_string();
    }
    if !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
        return mime::TEXT_PLAIN.essence_str().to_string();
    }
    mime::APPLICATION_OCTET_STREAM.essence_str().to_string()
}

/// Word 97-2003 files store their body in a `WordDocument` stream directly
/// under the root storage. Embedded objects keep theirs in sub-storages, so
/// only the root's children count.
fn sniff_ole(bytes: &[u8]) -> &'static str {
    match Compound::parse(bytes) {
        Some(cfb) if cfb.root_has_stream("WordDocument") => MIME_MSWORD,
        _ => MIME_OLE_STORAGE,
    }
}

const CFB_HEADER_LEN: usize = 512;
const CFB_DIR_ENTRY_LEN: usize = 128;
const CFB_HEADER_DIFAT_SLOTS: usize = 109;
const CFB_END_OF_CHAIN: u32 = 0xFFFF_FFFE;
const CFB_NO_STREAM: u32 = 0xFFFF_FFFF;
const CFB_STREAM: u8 = 2;

/// Just enough of the compound file layout to walk the directory.
struct Compound<'a> {
    bytes: &'a [u8],
    sector_size: usize,
    first_dir_sector: u32,
    fat_sectors: Vec<u32>,
}

fn le_u16(bytes: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes(bytes.get(at..at + 2)?.try_into().ok()?))
}

fn le_u32(bytes: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.get(at..at + 4)?.try_into().ok()?))
}

impl<'a> Compound<'a> {
    fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < CFB_HEADER_LEN {
            return None;
        }
        let sector_shift = le_u16(bytes, 0x1E)?;
        if !(7..=12).contains(&sector_shift) {
            return None;
        }
        let fat_count = le_u32(bytes, 0x2C)? as usize;
        let fat_sectors = (0..fat_count.min(CFB_HEADER_DIFAT_SLOTS))
            .filter_map(|i| le_u32(bytes, 0x4C + i * 4))
            .collect();
        Some(Self {
            bytes,
            sector_size: 1 << sector_shift,
            first_dir_sector: le_u32(bytes, 0x30)?,
            fat_sectors,
        })
    }

    fn sector(&self, id: u32) -> Option<&'a [u8]> {
        let start = (id as usize + 1).checked_mul(self.sector_size)?;
        self.bytes.get(start..start + self.sector_size)
    }

    fn next_sector(&self, id: u32) -> Option<u32> {
        let per_sector = self.sector_size / 4;
        let fat = self.sector(*self.fat_sectors.get(id as usize / per_sector)?)?;
        le_u32(fat, (id as usize % per_sector) * 4)
    }

    fn dir_entry(&self, index: u32) -> Option<&'a [u8]> {
        let per_sector = self.sector_size / CFB_DIR_ENTRY_LEN;
        let mut sector = self.first_dir_sector;
        for _ in 0..index as usize / per_sector {
            sector = self.next_sector(sector)?;
            if sector == CFB_END_OF_CHAIN {
                return None;
            }
        }
        let offset = (index as usize % per_sector) * CFB_DIR_ENTRY_LEN;
        self.sector(sector)?.get(offset..offset + CFB_DIR_ENTRY_LEN)
    }

    /// Walks the sibling tree hanging off the root entry's child pointer.
    fn root_has_stream(&self, name: &str) -> bool {
        let wanted: Vec<u16> = name.encode_utf16().collect();
        let Some(first) = self.dir_entry(0).and_then(|root| le_u32(root, 0x4C)) else {
            return false;
        };

        let mut pending = vec![first];
        let mut budget = 4096;
        while let Some(index) = pending.pop() {
            if index == CFB_NO_STREAM {
                continue;
            }
            budget -= 1;
            if budget == 0 {
                return false;
            }
            let Some(entry) = self.dir_entry(index) else {
                continue;
            };
            if entry[0x42] == CFB_STREAM && entry_name(entry) == wanted {
                return true;
            }
            pending.extend(le_u32(entry, 0x44));
            pending.extend(le_u32(entry, 0x48));
        }
        false
    }
}

/// UTF-16LE name; the stored length counts bytes and includes the NUL.
fn entry_name(entry: &[u8]) -> Vec<u16> {
    let len = le_u16(entry, 0x40).map_or(0, |n| n as usize).min(64);
    entry[..len]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .take_while(|&unit| unit != 0)
        .collect()
}

fn sniff_zip(bytes: &[u8]) -> &'static str {
    let Ok(archive) = zip::ZipArchive::new(Cursor::new(bytes)) else {
        return MIME_ZIP;
    };
    for name in archive.file_names() {
        if name.starts_with("word/") {
            return MIME_DOCX;
        }
        if name.starts_with("ppt/") {
            return MIME_PPTX;
        }
    }
    MIME_ZIP
}

fn looks_like_html(bytes: &[u8]) -> bool {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let head = &bytes[start..bytes.len().min(start + 64)];
    let head = String::from_utf8_lossy(head).to_ascii_lowercase();
    HTML_MARKERS.iter().any(|marker| head.starts_with(marker))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::write::SimpleFileOptions;

    use super::*;

    fn zip_with(entries: &[&str]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        writer.start_file("[Content_Types].xml", options).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        for entry in entries {
            writer.start_file(*entry, options).unwrap();
            writer.write_all(b"<x/>").unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn magic_bytes() {
        assert_eq!(sniff_mime(b"%PDF-1.4\n%\xE2\xE3"), "application/pdf");
        assert_eq!(sniff_mime(b"\xFF\xD8\xFF\xE0\x00\x10JFIF"), "image/jpeg");
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR"), "image/png");
        assert_eq!(sniff_mime(b"GIF89a\x01\x00\x01\x00"), "image/gif");
        assert_eq!(sniff_mime(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "image/webp");
    }

    #[test]
    fn empty_and_plain_text_are_not_documents() {
        assert_eq!(sniff_mime(b""), MIME_EMPTY);
        assert_eq!(sniff_mime(b"just some notes\n"), "text/plain");
        assert_eq!(sniff_mime(b"\x00\x01\x02\x03garbage"), "application/octet-stream");
    }

    #[test]
    fn html_is_found_after_whitespace_and_bom() {
        assert_eq!(sniff_mime(b"<!DOCTYPE html><html></html>"), "text/html");
        assert_eq!(sniff_mime(b"\xEF\xBB\xBF\n  <HTML><body>x</body></HTML>"), "text/html");
        assert_eq!(sniff_mime(b"<h1>Test Document</h1>"), "text/html");
        assert_eq!(sniff_mime(b"hello <html>"), "text/plain");
    }

    #[test]
    fn ooxml_containers_are_told_apart() {
        assert_eq!(sniff_mime(&zip_with(&["word/document.xml"])), MIME_DOCX);
        assert_eq!(sniff_mime(&zip_with(&["ppt/presentation.xml"])), MIME_PPTX);
        assert_eq!(sniff_mime(&zip_with(&["xl/workbook.xml"])), MIME_ZIP);
        assert_eq!(sniff_mime(b"PK\x03\x04truncated"), MIME_ZIP);
    }

    /// Builds a 512-byte-sector compound file: header, one FAT sector, one
    /// directory sector holding `entries` as (name, type, left, right, child).
    fn compound_with(entries: &[(&str, u8, u32, u32, u32)]) -> Vec<u8> {
        let mut file = vec![0u8; 512 * 3];
        file[..8].copy_from_slice(OLE_SIGNATURE);
        file[0x1E..0x20].copy_from_slice(&9u16.to_le_bytes());
        file[0x2C..0x30].copy_from_slice(&1u32.to_le_bytes());
        file[0x30..0x34].copy_from_slice(&1u32.to_le_bytes());
        file[0x4C..0x50].copy_from_slice(&0u32.to_le_bytes());

        let fat = 512;
        file[fat..fat + 4].copy_from_slice(&0xFFFF_FFFDu32.to_le_bytes());
        file[fat + 4..fat + 8].copy_from_slice(&CFB_END_OF_CHAIN.to_le_bytes());

        for (i, (name, kind, left, right, child)) in entries.iter().enumerate() {
            let at = 1024 + i * CFB_DIR_ENTRY_LEN;
            let units: Vec<u16> = name.encode_utf16().collect();
            for (j, unit) in units.iter().enumerate() {
                file[at + j * 2..at + j * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
            let len = (units.len() as u16 + 1) * 2;
            file[at + 0x40..at + 0x42].copy_from_slice(&len.to_le_bytes());
            file[at + 0x42] = *kind;
            file[at + 0x44..at + 0x48].copy_from_slice(&left.to_le_bytes());
            file[at + 0x48..at + 0x4C].copy_from_slice(&right.to_le_bytes());
            file[at + 0x4C..at + 0x50].copy_from_slice(&child.to_le_bytes());
        }
        file
    }

    const NONE: u32 = CFB_NO_STREAM;

    #[test]
    fn ole_word_documents() {
        let doc = compound_with(&[
            ("Root Entry", 5, NONE, NONE, 1),
            ("1Table", 2, NONE, 2, NONE),
            ("WordDocument", 2, NONE, NONE, NONE),
        ]);
        assert_eq!(sniff_mime(&doc), MIME_MSWORD);

        let storage = compound_with(&[
            ("Root Entry", 5, NONE, NONE, 1),
            ("Workbook", 2, NONE, NONE, NONE),
        ]);
        assert_eq!(sniff_mime(&storage), MIME_OLE_STORAGE);
    }

    #[test]
    fn embedded_word_object_does_not_make_a_word_file() {
        let workbook = compound_with(&[
            ("Root Entry", 5, NONE, NONE, 1),
            ("Workbook", 2, NONE, 2, NONE),
            ("MBD0001", 1, NONE, NONE, 3),
            ("WordDocument", 2, NONE, NONE, NONE),
        ]);
        assert_eq!(sniff_mime(&workbook), MIME_OLE_STORAGE);
    }

    #[test]
    fn truncated_compound_file_is_generic_storage() {
        let mut stub = OLE_SIGNATURE.to_vec();
        for unit in "WordDocument".encode_utf16() {
            stub.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(sniff_mime(&stub), MIME_OLE_STORAGE);
    }

    #[test]
    fn mislabeled_extension_does_not_matter() {
        // Bytes of a PNG are a PNG no matter what the upload claimed to be.
        assert_eq!(sniff_mime(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_ne!(sniff_mime(b"%%EOF not really html"), "text/html");
    }
}
