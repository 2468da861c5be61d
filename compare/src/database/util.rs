use std::path::PathBuf;

/// suffix Elasticsearch appends to the exact-match variant of text fields
pub const KEYWORD_SUFFIX: &str = ".keyword";

/// strip the `.keyword` suffix, documents only know the plain field
pub fn plain_field(field: &str) -> &str {
    field.strip_suffix(KEYWORD_SUFFIX).unwrap_or(field)
}

/// base url without trailing slashes, defaulting to http
pub fn base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    if url.contains("://") {
        url.to_owned()
    } else {
        format!("http://{url}")
    }
}

/// accepts `sqlite://<path>`, `file://<path>` or a plain path
pub fn sqlite_path(url: &str) -> PathBuf {
    PathBuf::from(
        url.strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("file://"))
            .unwrap_or(url),
    )
}
