//! On-disk store layout.
//!
//! Two trees hang off the base directory: a staging tree
//! `tmp/<upload-id>/parts/part-N` holding in-flight parts plus the
//! in-progress merged file, and the publish trees
//! `videos/<lesson>/video.mp4` and
//! `materials/<lesson>/<material>/<filename>` served directly by a
//! sibling static HTTP server. The publish layout is therefore part of
//! the external contract.

use crate::upload::UploadId;
use std::path::{Component, Path, PathBuf};

/// Resolved store directories for one service instance.
#[derive(Clone, Debug)]
pub struct StoreLayout {
    tmp_dir: PathBuf,
    videos_dir: PathBuf,
    materials_dir: PathBuf,
}

impl StoreLayout {
    /// Build the layout under a base directory.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        let base = base_dir.as_ref();
        Self {
            tmp_dir: base.join("tmp"),
            videos_dir: base.join("videos"),
            materials_dir: base.join("materials"),
        }
    }

    /// Staging root for in-flight uploads.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Publish root for lesson videos.
    pub fn videos_dir(&self) -> &Path {
        &self.videos_dir
    }

    /// Publish root for lesson materials.
    pub fn materials_dir(&self) -> &Path {
        &self.materials_dir
    }

    /// Staging directory for one upload.
    pub fn upload_dir(&self, id: UploadId) -> PathBuf {
        self.tmp_dir.join(id.to_string())
    }

    /// Parts directory for one upload.
    pub fn parts_dir(&self, id: UploadId) -> PathBuf {
        self.upload_dir(id).join("parts")
    }

    /// Path of one staged part file.
    pub fn part_path(&self, id: UploadId, part_num: u32) -> PathBuf {
        self.parts_dir(id).join(format!("part-{part_num}"))
    }

    /// Temporary merge output inside the upload dir. Carries the extension
    /// of the client filename so probing tools can sniff the format.
    pub fn merge_output_path(&self, id: UploadId, filename: &str) -> PathBuf {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        self.upload_dir(id).join(format!("input{ext}"))
    }

    /// Final directory for a lesson video.
    pub fn video_dir(&self, lesson_id: &str) -> crate::Result<PathBuf> {
        Ok(self.videos_dir.join(safe_component(lesson_id)?))
    }

    /// Final path for a lesson video. Uploading a new video for the same
    /// lesson overwrites the previous one.
    pub fn video_path(&self, lesson_id: &str) -> crate::Result<PathBuf> {
        Ok(self.video_dir(lesson_id)?.join("video.mp4"))
    }

    /// Final directory for one material.
    pub fn material_dir(&self, lesson_id: &str, material_id: &str) -> crate::Result<PathBuf> {
        Ok(self
            .materials_dir
            .join(safe_component(lesson_id)?)
            .join(safe_component(material_id)?))
    }

    /// Final path for one material file.
    pub fn material_path(
        &self,
        lesson_id: &str,
        material_id: &str,
        filename: &str,
    ) -> crate::Result<PathBuf> {
        Ok(self
            .material_dir(lesson_id, material_id)?
            .join(safe_component(filename)?))
    }

    /// Materials directory for a whole lesson (delete surface).
    pub fn lesson_materials_dir(&self, lesson_id: &str) -> crate::Result<PathBuf> {
        Ok(self.materials_dir.join(safe_component(lesson_id)?))
    }
}

/// Validate a client-supplied value used as a single path component.
///
/// Rejects separators, `..`, and anything that would resolve outside the
/// publish trees.
pub fn safe_component(value: &str) -> crate::Result<&str> {
    if value.is_empty() {
        return Err(crate::Error::InvalidPath("empty path component".into()));
    }
    if value.contains('/') || value.contains('\\') || value.contains('\0') {
        return Err(crate::Error::InvalidPath(format!(
            "path separator not allowed: {value}"
        )));
    }
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(value),
        _ => Err(crate::Error::InvalidPath(format!(
            "unsafe path component: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> StoreLayout {
        StoreLayout::new("/srv/uploads")
    }

    #[test]
    fn test_staging_paths() {
        let id = UploadId::new();
        let layout = layout();
        assert_eq!(
            layout.part_path(id, 3),
            PathBuf::from(format!("/srv/uploads/tmp/{id}/parts/part-3"))
        );
        assert_eq!(
            layout.merge_output_path(id, "lecture.mp4"),
            PathBuf::from(format!("/srv/uploads/tmp/{id}/input.mp4"))
        );
        assert_eq!(
            layout.merge_output_path(id, "notes"),
            PathBuf::from(format!("/srv/uploads/tmp/{id}/input"))
        );
    }

    #[test]
    fn test_publish_paths() {
        let layout = layout();
        assert_eq!(
            layout.video_path("lesson-7").unwrap(),
            PathBuf::from("/srv/uploads/videos/lesson-7/video.mp4")
        );
        assert_eq!(
            layout.material_path("lesson-7", "mat-1", "slides.pdf").unwrap(),
            PathBuf::from("/srv/uploads/materials/lesson-7/mat-1/slides.pdf")
        );
    }

    #[test]
    fn test_safe_component_rejects_traversal() {
        assert!(safe_component("..").is_err());
        assert!(safe_component("a/b").is_err());
        assert!(safe_component("a\\b").is_err());
        assert!(safe_component("").is_err());
        assert!(safe_component(".").is_err());
        assert!(safe_component("ok-name_1.pdf").is_ok());
    }

    #[test]
    fn test_traversal_cannot_escape_publish_tree() {
        let layout = layout();
        assert!(layout.video_path("../etc").is_err());
        assert!(layout.material_path("lesson", "..", "x").is_err());
        assert!(layout.material_path("lesson", "mat", "../../passwd").is_err());
    }
}
