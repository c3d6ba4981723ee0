use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

use crate::data::ImageData;

pub(crate) fn write_upload(image: &ImageData, dir: &Path) -> Result<String> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create upload dir: {}", dir.display()))?;
    let ext = image.extension();
    let suffix = format!(".{}", ext);
    let file = tempfile::Builder::new()
        .prefix("diagram-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    std::fs::write(file.path(), &image.bytes).with_context(|| "failed to write uploaded file")?;
    let path = file
        .into_temp_path()
        .keep()
        .with_context(|| "failed to persist uploaded file")?;
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_string())
        .with_context(|| format!("stored file has no usable name: {}", path.display()))
}

pub(crate) fn stored_upload_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) {
        return None;
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Some(dir.join(name)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_is_stored_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = crate::data::encode_png(&image::DynamicImage::new_rgb8(2, 2)).unwrap();
        let image = ImageData::from_bytes(bytes.clone(), Some("upload")).unwrap();
        let name = write_upload(&image, dir.path()).unwrap();
        assert!(name.starts_with("diagram-"));
        assert!(name.ends_with(".png"));
        assert_eq!(std::fs::read(dir.path().join(&name)).unwrap(), bytes);
    }

    #[test]
    fn only_bare_names_resolve() {
        let dir = Path::new("/srv/uploads");
        assert_eq!(
            stored_upload_path(dir, "diagram-abc.png"),
            Some(dir.join("diagram-abc.png"))
        );
        assert_eq!(stored_upload_path(dir, "../secret.png"), None);
        assert_eq!(stored_upload_path(dir, "nested/file.png"), None);
        assert_eq!(stored_upload_path(dir, "/etc/passwd"), None);
        assert_eq!(stored_upload_path(dir, ".."), None);
        assert_eq!(stored_upload_path(dir, ""), None);
    }
}
