use encoding_rs::WINDOWS_1252;
use std::path::Path;

/// Leading bytes inspected for content classification.
pub const SAMPLE_SIZE: usize = 8192;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Extensions that are always binary; rejected before any sampling.
const BINARY_EXTENSIONS: &[&str] = &[
    ".7z", ".a", ".avi", ".bin", ".bmp", ".bz2", ".class", ".db", ".dll", ".doc", ".docx",
    ".dylib", ".eot", ".exe", ".flac", ".gif", ".gz", ".ico", ".jar", ".jpeg", ".jpg", ".mkv",
    ".mov", ".mp3", ".mp4", ".o", ".obj", ".ogg", ".otf", ".pdf", ".png", ".ppt", ".pptx",
    ".pyc", ".rar", ".so", ".sqlite", ".sqlite3", ".tar", ".tiff", ".ttf", ".wasm", ".wav",
    ".webp", ".woff", ".woff2", ".xls", ".xlsx", ".xz", ".zip",
];

/// Magic numbers that force a binary classification regardless of extension.
const BINARY_SIGNATURES: &[&[u8]] = &[
    b"\x00\x00\x00",         // leading NULs
    b"\xff\xfe\x00\x00",     // UTF-32 LE BOM
    b"\x00\x00\xfe\xff",     // UTF-32 BE BOM
    b"\xff\xfe",             // UTF-16 LE BOM
    b"\xfe\xff",             // UTF-16 BE BOM
    b"PK\x03\x04",           // ZIP
    b"PK\x05\x06",           // ZIP (empty archive)
    b"PK\x07\x08",           // ZIP (spanned)
    b"\x1f\x8b",             // GZIP
    b"BZh",                  // BZIP2
    b"\x89PNG",              // PNG
    b"GIF87a",               // GIF
    b"GIF89a",               // GIF
    b"\xff\xd8\xff",         // JPEG
    b"ID3",                  // MP3
    b"RIFF",                 // WAV/AVI
    b"%PDF",                 // PDF
];

/// Outcome of classifying a byte sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Text,
    /// Binary, with the reason recorded in the file's error entry.
    Binary(&'static str),
}

/// Decoded file content plus how it was decoded.
#[derive(Debug)]
pub struct Decoded {
    pub content: String,
    /// Encoding label stored in the FileRecord.
    pub encoding: &'static str,
    /// True when the single-byte fallback was used; callers log a warning.
    pub lossy: bool,
}

/// Classify a file as text or binary from its extension and a leading
/// byte sample.
///
/// Order matters: the extension deny-set short-circuits without touching
/// content, magic numbers override a text-looking extension, and a null
/// byte anywhere in the sample is binary no matter what the name says.
#[must_use]
pub fn classify(path: &Path, sample: &[u8]) -> Classification {
    if let Some(ext) = extension_of(path) {
        if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            return Classification::Binary("binary file extension");
        }
    }

    for signature in BINARY_SIGNATURES {
        if sample.starts_with(signature) {
            return Classification::Binary("binary signature");
        }
    }

    if sample.contains(&0) {
        return Classification::Binary("null bytes in content");
    }

    Classification::Text
}

/// Decode file bytes: strict UTF-8 first (stripping a BOM), then the
/// windows-1252 fallback, which accepts any byte sequence.
#[must_use]
pub fn decode(bytes: &[u8]) -> Decoded {
    let (body, had_bom) = match bytes.strip_prefix(&UTF8_BOM) {
        Some(rest) => (rest, true),
        None => (bytes, false),
    };

    match std::str::from_utf8(body) {
        Ok(text) => Decoded {
            content: text.to_string(),
            encoding: if had_bom { "utf-8-sig" } else { "utf-8" },
            lossy: false,
        },
        Err(_) => {
            let (content, _, _) = WINDOWS_1252.decode(bytes);
            Decoded { content: content.into_owned(), encoding: "windows-1252", lossy: true }
        }
    }
}

/// Dot-prefixed lowercase extension, Python `Path.suffix` style
/// (".gitignore" has none, "notes.TXT" gives ".txt").
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| format!(".{}", e.to_lowercase()))
}
