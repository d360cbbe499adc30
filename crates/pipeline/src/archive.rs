//! Training photo archive.

use std::io::{Cursor, Write};

use bytes::Bytes;
use expressr_core::error::CoreError;
use expressr_core::types::JobId;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Storage path of a job's training archive.
pub fn archive_path(job_id: JobId) -> String {
    format!("{job_id}/training-images.zip")
}

/// Pack downloaded photos into a zip archive.
///
/// Entries are named `photo-01.<ext>`, `photo-02.<ext>`, ... in input order.
/// Images are already compressed, so entries are stored as-is.
pub fn build(photos: &[(String, Bytes)]) -> Result<Bytes, CoreError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (i, (source_url, bytes)) in photos.iter().enumerate() {
        let name = format!("photo-{:02}.{}", i + 1, extension(source_url));
        writer
            .start_file(name, options)
            .map_err(|e| CoreError::Internal(format!("zip entry: {e}")))?;
        writer
            .write_all(bytes)
            .map_err(|e| CoreError::Internal(format!("zip write: {e}")))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| CoreError::Internal(format!("zip finish: {e}")))?;
    Ok(Bytes::from(cursor.into_inner()))
}

/// Image extension guessed from a URL path, defaulting to `jpg`.
fn extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match path.rsplit('.').next() {
        Some("png") => "png",
        Some("webp") => "webp",
        Some("heic") => "heic",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn archive_contains_every_photo_in_order() {
        let photos = vec![
            ("https://up.test/a.JPG".to_string(), Bytes::from_static(b"first")),
            ("https://up.test/b.png?token=1".to_string(), Bytes::from_static(b"second")),
        ];
        let archive = build(&photos).unwrap();

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.to_vec())).unwrap();
        assert_eq!(zip.len(), 2);

        let mut first = String::new();
        zip.by_name("photo-01.jpg").unwrap().read_to_string(&mut first).unwrap();
        assert_eq!(first, "first");

        let mut second = String::new();
        zip.by_name("photo-02.png").unwrap().read_to_string(&mut second).unwrap();
        assert_eq!(second, "second");
    }

    #[test]
    fn unknown_extension_defaults_to_jpg() {
        assert_eq!(extension("https://up.test/photo"), "jpg");
        assert_eq!(extension("https://up.test/x.webp#frag"), "webp");
    }

    #[test]
    fn archive_path_is_per_job() {
        let id = uuid::Uuid::now_v7();
        assert_eq!(archive_path(id), format!("{id}/training-images.zip"));
    }
}
