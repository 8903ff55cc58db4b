use mime::Mime;

#[must_use]
pub fn is_image_mime(mime: &Mime) -> bool {
    mime.type_() == mime::IMAGE
}

/// Work out the MIME type of a file, preferring the magic bytes over the file name.
///
/// Falls back to `application/octet-stream` when neither gives an answer.
#[must_use]
pub fn detect_mime(bytes: &[u8], file_name: &str) -> Mime {
    if let Some(mime) = infer::get(bytes).and_then(|kind| kind.mime_type().parse().ok()) {
        return mime;
    }
    mime_guess::from_path(file_name).first_or_octet_stream()
}
