//! Edit-session orchestration.
//!
//! An [`EditSession`] owns the working image references for one photo and
//! sequences flip, rotate and crop requests against the transform, crop and
//! filesystem capabilities. Every action performs all external calls first
//! and commits state only once they have all succeeded.

use std::path::PathBuf;
use std::sync::Arc;

use crate::autosize::SizeProbe;
use crate::layout::{self, CropLayout};
use crate::processing::{CropEngine, ImageManipulator};
use crate::state::{
    Action, ChosenPicture, CropQuad, CropRequest, FlipAxis, ImageUri, Manipulation, Photo, Point,
    SaveOptions, Size,
};
use crate::storage::{self, FileStore};

/// Width photos are normalised to when a session opens.
pub const EDITABLE_WIDTH: u32 = 1080;

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("no image loaded")]
    NoImage,
    #[error("crop requested outside crop mode")]
    NotInCropMode,
    #[error("image transform failed: {0:#}")]
    Transform(anyhow::Error),
    #[error("crop failed: {0:#}")]
    Crop(anyhow::Error),
    #[error("download failed: {0:#}")]
    Download(anyhow::Error),
    #[error("could not write cropped image: {0:#}")]
    Write(anyhow::Error),
    #[error("could not read image size: {0:#}")]
    Probe(anyhow::Error),
}

/// External capabilities an edit session delegates to.
#[derive(Clone)]
pub struct Services {
    pub manipulator: Arc<dyn ImageManipulator>,
    pub cropper: Arc<dyn CropEngine>,
    pub store: Arc<dyn FileStore>,
    pub probe: Arc<dyn SizeProbe>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    /// Corner handles are live; only crop and cancel are available.
    Crop,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub save: SaveOptions,
    pub editable_width: u32,
    pub work_dir: PathBuf,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            save: SaveOptions::default(),
            editable_width: EDITABLE_WIDTH,
            work_dir: std::env::temp_dir().join("manipulator"),
        }
    }
}

/// Next value of the rotation accumulator after a -90 degree turn.
/// Stays within `[-270, 0]`; a full turn collapses back to `0`.
pub fn next_rotation(rotation: i32) -> i32 {
    if rotation <= -270 { 0 } else { rotation - 90 }
}

struct Prepared {
    editable: ImageUri,
    initial_uri: ImageUri,
    initial_local: ImageUri,
    initial_owned: bool,
    initial_size: Size,
}

pub struct EditSession {
    services: Services,
    options: SessionOptions,
    viewport: (f32, f32),
    last_raw_uri: Option<ImageUri>,
    uri: Option<ImageUri>,
    initial_uri: Option<ImageUri>,
    /// Local copy of `initial_uri`; differs only when the original is remote.
    initial_local: Option<ImageUri>,
    /// `initial_local` lives in the work directory and may be deleted.
    initial_owned: bool,
    base64: Option<String>,
    initial_size: Size,
    crop_coords: CropQuad,
    crop: Option<CropQuad>,
    rotation: i32,
    mode: Mode,
}

impl EditSession {
    pub fn new(services: Services, options: SessionOptions) -> Self {
        Self {
            services,
            options,
            viewport: (0.0, 0.0),
            last_raw_uri: None,
            uri: None,
            initial_uri: None,
            initial_local: None,
            initial_owned: false,
            base64: None,
            initial_size: Size::default(),
            crop_coords: CropQuad::from_size(0.0, 0.0),
            crop: None,
            rotation: 0,
            mode: Mode::Idle,
        }
    }

    pub fn uri(&self) -> Option<&ImageUri> {
        self.uri.as_ref()
    }

    /// Local file the crop is cut from.
    pub fn crop_source(&self) -> Option<&ImageUri> {
        self.initial_local.as_ref()
    }

    /// The image to draw: the uncropped source while cropping, the result otherwise.
    pub fn display_uri(&self) -> Option<&ImageUri> {
        match self.mode {
            Mode::Crop => self.crop_source(),
            Mode::Idle => self.uri.as_ref(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn crop_coords(&self) -> CropQuad {
        self.crop_coords
    }

    /// Resize the viewport. Crop corners are display pixels, so they are
    /// rescaled per axis to stay on the same part of the image.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        let before = self.layout();
        self.viewport = (width, height);
        let after = self.layout();
        if before.width <= 0.0 || before.height <= 0.0 {
            return;
        }
        if (before.width, before.height) == (after.width, after.height) {
            return;
        }
        let sx = after.width / before.width;
        let sy = after.height / before.height;
        let rescale = |p: Point| Point::new(p.x * sx, p.y * sy);
        self.crop_coords = self.crop_coords.map(rescale);
        self.crop = self.crop.map(|quad| quad.map(rescale));
        tracing::debug!(sx, sy, "crop corners rescaled to new layout");
    }

    pub fn layout(&self) -> CropLayout {
        layout::crop_layout(self.initial_size, self.viewport.0, self.viewport.1)
    }

    /// Record corner positions committed by the crop handles.
    pub fn set_crop_coords(&mut self, quad: CropQuad) {
        self.crop_coords = quad;
    }

    pub fn enter_crop_mode(&mut self) {
        self.mode = Mode::Crop;
    }

    pub fn exit_crop_mode(&mut self) {
        self.mode = Mode::Idle;
    }

    /// Reset the crop quadrilateral to the full display rectangle.
    pub fn reset_crop(&mut self) {
        let layout = self.layout();
        self.crop_coords = CropQuad::from_size(layout.width, layout.height);
        self.crop = Some(self.crop_coords);
    }

    /// Load `photo` at editable size. Reopening the same photo is a no-op.
    pub fn open(&mut self, photo: &Photo) -> Result<(), EditError> {
        if self.last_raw_uri.as_ref() == Some(&photo.uri) {
            return Ok(());
        }

        let raw = self.materialize(&photo.uri)?;
        let prepared = self.prepare(&raw, photo);
        if raw != photo.uri {
            self.services.store.delete(&raw);
        }
        let Prepared {
            editable,
            initial_uri,
            initial_local,
            initial_owned,
            initial_size,
        } = prepared?;

        self.uri = Some(editable);
        self.initial_uri = Some(initial_uri);
        self.initial_local = Some(initial_local);
        self.initial_owned = initial_owned;
        self.base64 = None;
        self.initial_size = initial_size;
        self.rotation = 0;
        self.mode = Mode::Idle;
        self.last_raw_uri = Some(photo.uri.clone());
        match photo.original_crop {
            Some(quad) => {
                self.crop_coords = quad;
                self.crop = Some(quad);
            }
            None => self.reset_crop(),
        }

        tracing::info!(
            uri = %photo.uri,
            width = initial_size.width,
            height = initial_size.height,
            resumed = photo.original_photo.is_some(),
            "photo opened"
        );
        Ok(())
    }

    /// Turn the image 90 degrees counter-clockwise.
    pub fn rotate(&mut self) -> Result<Manipulation, EditError> {
        let current = self.uri.clone().ok_or(EditError::NoImage)?;
        let source = self.materialize(&current)?;
        let previous = self
            .services
            .probe
            .natural_size(&source)
            .map_err(EditError::Probe)?;
        let rotated = self.transform(
            &source,
            &[
                Action::Rotate { degrees: -90 },
                Action::Resize {
                    width: previous.width,
                },
            ],
        )?;

        let swapped = self.initial_size.swapped();
        let replayed = self.replay(&[
            Action::Rotate { degrees: -90 },
            Action::Resize {
                width: swapped.width,
            },
        ])?;

        self.uri = Some(rotated.uri);
        self.base64 = rotated.base64;
        if let Some(uri) = replayed {
            self.replace_initial(uri);
        }
        self.rotation = next_rotation(self.rotation);
        self.initial_size = swapped;
        self.reset_crop();

        tracing::info!(rotation = self.rotation, "image rotated");
        Ok(Manipulation::Rotate)
    }

    pub fn flip(&mut self, axis: FlipAxis) -> Result<Manipulation, EditError> {
        let current = self.uri.clone().ok_or(EditError::NoImage)?;
        let source = self.materialize(&current)?;
        let flipped = self.transform(&source, &[Action::Flip(axis)])?;
        let replayed = self.replay(&[Action::Flip(axis)])?;

        self.uri = Some(flipped.uri);
        self.base64 = flipped.base64;
        if let Some(uri) = replayed {
            self.replace_initial(uri);
        }
        self.reset_crop();

        tracing::info!(?axis, "image flipped");
        Ok(Manipulation::Flip(axis))
    }

    /// Crop request in natural-image coordinates for the current corners.
    pub fn crop_request(&self) -> CropRequest {
        CropRequest {
            quad: layout::to_natural_space(
                self.crop_coords,
                self.layout().width,
                self.initial_size.width,
            ),
            width: self.initial_size.width,
            height: self.initial_size.height,
        }
    }

    /// Cut the current quadrilateral out of the source image.
    ///
    /// On failure nothing is mutated and the session stays in crop mode.
    pub fn crop_image(&mut self) -> Result<Manipulation, EditError> {
        if self.mode != Mode::Crop {
            return Err(EditError::NotInCropMode);
        }
        let initial = self.initial_uri.clone().ok_or(EditError::NoImage)?;
        let source = self.initial_local.clone().ok_or(EditError::NoImage)?;
        let request = self.crop_request();

        let bytes = self
            .services
            .cropper
            .crop(&request, &source)
            .map_err(EditError::Crop)?;
        let dest = storage::timestamped_path(&self.options.work_dir, &source);
        self.services
            .store
            .write(&dest, &bytes)
            .map_err(EditError::Write)?;

        let previous = self.uri.replace(ImageUri::from(dest));
        self.base64 = None;
        self.crop = Some(self.crop_coords);
        self.mode = Mode::Idle;
        if let Some(old) = previous {
            if old != initial && old != source {
                self.services.store.delete(&old);
            }
        }

        tracing::info!(
            width = request.width,
            height = request.height,
            "image cropped"
        );
        Ok(Manipulation::Crop(request))
    }

    /// Result handed back when the user accepts the edit.
    pub fn done(&self) -> Result<ChosenPicture, EditError> {
        let uri = self.uri.clone().ok_or(EditError::NoImage)?;
        Ok(ChosenPicture {
            uri,
            initial_uri: self.initial_uri.clone(),
            base64: self.base64.clone(),
            crop: self.crop,
        })
    }

    fn transform(
        &self,
        source: &ImageUri,
        actions: &[Action],
    ) -> Result<crate::processing::Manipulated, EditError> {
        self.services
            .manipulator
            .manipulate(source, actions, &self.options.save)
            .map_err(EditError::Transform)
    }

    /// Apply `actions` to the uncropped source so it tracks the displayed image.
    fn replay(&self, actions: &[Action]) -> Result<Option<ImageUri>, EditError> {
        let Some(source) = self.initial_local.as_ref() else {
            return Ok(None);
        };
        Ok(Some(self.transform(source, actions)?.uri))
    }

    fn replace_initial(&mut self, uri: ImageUri) {
        if self.initial_owned {
            if let Some(old) = self.initial_local.take() {
                self.services.store.delete(&old);
            }
        }
        self.initial_uri = Some(uri.clone());
        self.initial_local = Some(uri);
        self.initial_owned = true;
    }

    /// Editable copy plus the uncropped source for a freshly opened photo.
    fn prepare(&self, raw: &ImageUri, photo: &Photo) -> Result<Prepared, EditError> {
        let resize = [Action::Resize {
            width: self.options.editable_width,
        }];
        let editable = self
            .services
            .manipulator
            .manipulate(raw, &resize, &SaveOptions::default())
            .map_err(EditError::Transform)?;

        let Some(original) = &photo.original_photo else {
            let copy = self
                .services
                .manipulator
                .manipulate(raw, &resize, &SaveOptions::default())
                .map_err(EditError::Transform)?;
            return Ok(Prepared {
                editable: editable.uri,
                initial_uri: copy.uri.clone(),
                initial_local: copy.uri,
                initial_owned: true,
                initial_size: Size::new(editable.width, editable.height),
            });
        };

        let local = self.materialize(original)?;
        let downloaded = &local != original;
        let initial_size = match self.services.probe.natural_size(&local) {
            Ok(size) => size,
            Err(err) => {
                if downloaded {
                    self.services.store.delete(&local);
                }
                return Err(EditError::Probe(err));
            }
        };
        Ok(Prepared {
            editable: editable.uri,
            initial_uri: original.clone(),
            initial_local: local,
            initial_owned: downloaded,
            initial_size,
        })
    }

    /// Local reference for `uri`, downloading remote images first.
    fn materialize(&self, uri: &ImageUri) -> Result<ImageUri, EditError> {
        if !uri.is_remote() {
            return Ok(uri.clone());
        }
        let dest = storage::timestamped_path(&self.options.work_dir, uri);
        self.services
            .store
            .download(uri, &dest)
            .map_err(EditError::Download)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;

    use super::*;
    use crate::processing::Manipulated;

    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    struct FakeManipulator {
        log: Arc<Log>,
        size: Mutex<Size>,
        counter: Mutex<u32>,
        fail: bool,
    }

    impl ImageManipulator for FakeManipulator {
        fn manipulate(
            &self,
            uri: &ImageUri,
            actions: &[Action],
            save: &SaveOptions,
        ) -> anyhow::Result<Manipulated> {
            self.log.push(format!("manipulate {uri} {actions:?}"));
            if self.fail {
                anyhow::bail!("transform exploded");
            }
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            let size = *self.size.lock().unwrap();
            Ok(Manipulated {
                uri: ImageUri::new(format!("/work/m{}.png", *counter)),
                width: size.width,
                height: size.height,
                base64: save.base64.then(|| "b64".to_string()),
            })
        }
    }

    struct FakeCropper {
        log: Arc<Log>,
        fail: bool,
    }

    impl CropEngine for FakeCropper {
        fn crop(&self, request: &CropRequest, uri: &ImageUri) -> anyhow::Result<Vec<u8>> {
            self.log.push(format!(
                "crop {uri} {},{}",
                request.quad.bottom_right.x, request.quad.bottom_right.y
            ));
            if self.fail {
                anyhow::bail!("native crop failed");
            }
            Ok(vec![1, 2, 3])
        }
    }

    struct FakeStore {
        log: Arc<Log>,
    }

    impl FileStore for FakeStore {
        fn write(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
            self.log.push(format!("write {} {}", path.display(), bytes.len()));
            Ok(())
        }

        fn delete(&self, uri: &ImageUri) {
            self.log.push(format!("delete {uri}"));
        }

        fn download(&self, url: &ImageUri, dest: &Path) -> anyhow::Result<ImageUri> {
            self.log.push(format!("download {url}"));
            Ok(ImageUri::from(dest.to_path_buf()))
        }
    }

    struct FakeProbe {
        size: Size,
    }

    impl SizeProbe for FakeProbe {
        fn natural_size(&self, _uri: &ImageUri) -> anyhow::Result<Size> {
            Ok(self.size)
        }
    }

    struct Harness {
        log: Arc<Log>,
        session: EditSession,
    }

    fn harness_with(size: Size, fail_transform: bool, fail_crop: bool) -> Harness {
        let log = Arc::new(Log::default());
        let services = Services {
            manipulator: Arc::new(FakeManipulator {
                log: Arc::clone(&log),
                size: Mutex::new(size),
                counter: Mutex::new(0),
                fail: fail_transform,
            }),
            cropper: Arc::new(FakeCropper {
                log: Arc::clone(&log),
                fail: fail_crop,
            }),
            store: Arc::new(FakeStore {
                log: Arc::clone(&log),
            }),
            probe: Arc::new(FakeProbe { size }),
        };
        let options = SessionOptions {
            work_dir: PathBuf::from("/work"),
            ..SessionOptions::default()
        };
        let mut session = EditSession::new(services, options);
        session.set_viewport(360.0, 800.0);
        Harness { log, session }
    }

    fn harness(size: Size) -> Harness {
        harness_with(size, false, false)
    }

    fn photo(uri: &str) -> Photo {
        Photo {
            uri: ImageUri::from(uri),
            ..Photo::default()
        }
    }

    #[test]
    fn rotation_accumulator_wraps_after_full_turn() {
        assert_eq!(next_rotation(0), -90);
        assert_eq!(next_rotation(-90), -180);
        assert_eq!(next_rotation(-180), -270);
        assert_eq!(next_rotation(-270), 0);
    }

    #[test]
    fn open_resizes_twice_and_resets_crop_to_display_rect() {
        let mut h = harness(Size::new(1080, 1920));
        h.session.open(&photo("/photos/a.png")).unwrap();

        assert_eq!(h.session.uri(), Some(&ImageUri::from("/work/m1.png")));
        assert_eq!(h.session.initial_uri.as_ref(), Some(&ImageUri::from("/work/m2.png")));
        assert_eq!(h.session.initial_size, Size::new(1080, 1920));
        let layout = h.session.layout();
        assert_eq!(
            h.session.crop_coords(),
            CropQuad::from_size(layout.width, layout.height)
        );
        assert!(h.log.entries().iter().all(|e| !e.starts_with("download")));
    }

    #[test]
    fn reopening_same_photo_is_a_no_op() {
        let mut h = harness(Size::new(100, 100));
        h.session.open(&photo("/photos/a.png")).unwrap();
        let calls = h.log.entries().len();
        h.session.open(&photo("/photos/a.png")).unwrap();
        assert_eq!(h.log.entries().len(), calls);
    }

    #[test]
    fn open_resumes_previous_edit() {
        let mut h = harness(Size::new(1080, 1920));
        let mut quad = CropQuad::from_size(100.0, 100.0);
        quad.top_left = Point::new(10.0, 10.0);
        let resumed = Photo {
            uri: ImageUri::from("/photos/cropped.png"),
            original_photo: Some(ImageUri::from("/photos/original.png")),
            original_crop: Some(quad),
        };
        h.session.open(&resumed).unwrap();

        assert_eq!(
            h.session.initial_uri.as_ref(),
            Some(&ImageUri::from("/photos/original.png"))
        );
        assert_eq!(h.session.crop_coords(), quad);
        let manipulations = h
            .log
            .entries()
            .iter()
            .filter(|e| e.starts_with("manipulate"))
            .count();
        assert_eq!(manipulations, 1);
    }

    #[test]
    fn four_rotations_restore_accumulator_and_size() {
        let mut h = harness(Size::new(1080, 1920));
        h.session.open(&photo("/photos/a.png")).unwrap();

        let mut rotations = Vec::new();
        for _ in 0..4 {
            assert_eq!(h.session.rotate().unwrap(), Manipulation::Rotate);
            rotations.push(h.session.rotation);
        }
        assert_eq!(rotations, vec![-90, -180, -270, 0]);
        assert_eq!(h.session.initial_size, Size::new(1080, 1920));
    }

    #[test]
    fn rotate_swaps_size_and_resets_crop() {
        let mut h = harness(Size::new(1080, 1920));
        h.session.open(&photo("/photos/a.png")).unwrap();
        h.session.set_crop_coords(CropQuad::from_size(5.0, 5.0));

        h.session.rotate().unwrap();

        assert_eq!(h.session.initial_size, Size::new(1920, 1080));
        let layout = h.session.layout();
        assert_eq!(
            h.session.crop_coords(),
            CropQuad::from_size(layout.width, layout.height)
        );
        let entries = h.log.entries();
        assert!(entries.iter().any(|e| e.contains("Rotate { degrees: -90 }, Resize { width: 1080 }")));
        // The uncropped source is rotated too, resized to its own new width.
        assert!(entries.iter().any(|e| e.contains("Rotate { degrees: -90 }, Resize { width: 1920 }")));
    }

    #[test]
    fn flip_replays_on_initial_and_reports_axis() {
        let mut h = harness(Size::new(200, 100));
        h.session.open(&photo("/photos/a.png")).unwrap();

        let event = h.session.flip(FlipAxis::Vertical).unwrap();
        assert_eq!(event, Manipulation::Flip(FlipAxis::Vertical));

        let flips: Vec<_> = h
            .log
            .entries()
            .into_iter()
            .filter(|e| e.contains("Flip(Vertical)"))
            .collect();
        assert_eq!(
            flips,
            vec![
                "manipulate /work/m1.png [Flip(Vertical)]".to_string(),
                "manipulate /work/m2.png [Flip(Vertical)]".to_string(),
            ]
        );
        assert_eq!(h.session.uri(), Some(&ImageUri::from("/work/m3.png")));
        assert_eq!(h.session.initial_uri.as_ref(), Some(&ImageUri::from("/work/m4.png")));
    }

    #[test]
    fn crop_requires_crop_mode() {
        let mut h = harness(Size::new(100, 100));
        h.session.open(&photo("/photos/a.png")).unwrap();
        assert!(matches!(
            h.session.crop_image(),
            Err(EditError::NotInCropMode)
        ));
    }

    #[test]
    fn crop_maps_display_coordinates_to_natural_space() {
        let mut h = harness(Size::new(1080, 1920));
        h.session.open(&photo("/photos/a.png")).unwrap();
        h.session.enter_crop_mode();

        let Manipulation::Crop(request) = h.session.crop_image().unwrap() else {
            panic!("expected crop event");
        };
        assert_eq!((request.width, request.height), (1080, 1920));
        assert!((request.quad.bottom_right.x - 1080.0).abs() < 0.01);
        assert!((request.quad.bottom_right.y - 1920.0).abs() < 0.01);
        assert_eq!(request.quad.top_left, Point::new(0.0, 0.0));
    }

    #[test]
    fn resizing_viewport_keeps_crop_on_same_image_region() {
        let mut h = harness(Size::new(1080, 1920));
        h.session.open(&photo("/photos/a.png")).unwrap();
        h.session.set_viewport(720.0, 1504.0);
        h.session.enter_crop_mode();

        let Manipulation::Crop(request) = h.session.crop_image().unwrap() else {
            panic!("expected crop event");
        };
        assert!((request.quad.bottom_right.x - 1080.0).abs() < 0.01);
        assert!((request.quad.bottom_right.y - 1920.0).abs() < 0.01);
    }

    #[test]
    fn committed_corner_maps_to_same_natural_point_after_resize() {
        let mut h = harness(Size::new(1080, 1920));
        h.session.open(&photo("/photos/a.png")).unwrap();
        let mut quad = h.session.crop_coords();
        quad.top_left = Point::new(90.0, 160.0);
        h.session.set_crop_coords(quad);
        let before = h.session.crop_request().quad.top_left;

        h.session.set_viewport(720.0, 1504.0);
        let moved = h.session.crop_coords().top_left;
        assert!((moved.x - 180.0).abs() < 0.01 && (moved.y - 320.0).abs() < 0.01);
        let after = h.session.crop_request().quad.top_left;
        assert!((before.x - after.x).abs() < 0.01 && (before.y - after.y).abs() < 0.01);
        assert!((after.x - 270.0).abs() < 0.01 && (after.y - 480.0).abs() < 0.01);
    }

    #[test]
    fn crop_commits_result_and_deletes_previous_file() {
        let mut h = harness(Size::new(300, 300));
        h.session.set_viewport(600.0, 800.0);
        h.session.open(&photo("/photos/a.png")).unwrap();
        h.session.enter_crop_mode();
        h.session.set_crop_coords(CropQuad::from_size(150.0, 120.0));

        h.session.crop_image().unwrap();

        let uri = h.session.uri().unwrap().as_str().to_string();
        assert!(uri.starts_with("/work/"));
        assert!(uri.ends_with("-m2.png"));
        assert_eq!(h.session.mode(), Mode::Idle);
        assert_eq!(h.session.crop, Some(CropQuad::from_size(150.0, 120.0)));
        assert_eq!(h.session.base64, None);

        let entries = h.log.entries();
        let crop_at = entries.iter().position(|e| e.starts_with("crop")).unwrap();
        let write_at = entries.iter().position(|e| e.starts_with("write")).unwrap();
        let delete_at = entries.iter().position(|e| e.starts_with("delete")).unwrap();
        assert!(crop_at < write_at && write_at < delete_at);
        assert_eq!(entries[delete_at], "delete /work/m1.png");
        // Display is wider than the natural image, so coordinates pass through.
        assert_eq!(entries[crop_at], "crop /work/m2.png 150,120");
    }

    #[test]
    fn failed_crop_leaves_state_untouched() {
        let mut h = harness_with(Size::new(300, 300), false, true);
        h.session.open(&photo("/photos/a.png")).unwrap();
        h.session.enter_crop_mode();
        let before = h.session.uri().cloned();

        let err = h.session.crop_image().unwrap_err();
        assert!(matches!(err, EditError::Crop(_)));
        assert!(err.to_string().contains("native crop failed"));
        assert_eq!(h.session.uri().cloned(), before);
        assert_eq!(h.session.mode(), Mode::Crop);
        assert!(h.log.entries().iter().all(|e| !e.starts_with("delete")));
    }

    #[test]
    fn failed_transform_propagates_without_mutation() {
        let mut h = harness_with(Size::new(300, 300), true, false);
        let err = h.session.open(&photo("/photos/a.png")).unwrap_err();
        assert!(matches!(err, EditError::Transform(_)));
        assert_eq!(h.session.uri(), None);
        assert!(matches!(h.session.rotate(), Err(EditError::NoImage)));
    }

    #[test]
    fn remote_original_is_downloaded_once_and_reused() {
        let mut h = harness(Size::new(300, 300));
        let resumed = Photo {
            uri: ImageUri::from("/photos/local.png"),
            original_photo: Some(ImageUri::from("https://cdn.example.com/orig.png")),
            original_crop: None,
        };
        h.session.open(&resumed).unwrap();
        assert_eq!(
            h.session.initial_uri.as_ref(),
            Some(&ImageUri::from("https://cdn.example.com/orig.png"))
        );
        assert!(!h.session.crop_source().unwrap().is_remote());

        h.session.enter_crop_mode();
        h.session.crop_image().unwrap();
        h.session.flip(FlipAxis::Horizontal).unwrap();

        let entries = h.log.entries();
        let downloads: Vec<_> = entries.iter().filter(|e| e.starts_with("download")).collect();
        assert_eq!(downloads, vec!["download https://cdn.example.com/orig.png"]);
        let download_at = entries.iter().position(|e| e.starts_with("download")).unwrap();
        let crop_at = entries.iter().position(|e| e.starts_with("crop")).unwrap();
        assert!(download_at < crop_at);
        assert!(entries[crop_at].starts_with("crop /work/"));
        // The downloaded copy is dropped once the flip replaces it.
        let local = entries[crop_at].split(' ').nth(1).unwrap().to_string();
        assert!(entries.contains(&format!("delete {local}")));
    }

    #[test]
    fn remote_photo_download_is_removed_after_resize() {
        let mut h = harness(Size::new(300, 300));
        h.session
            .open(&photo("https://cdn.example.com/raw.png"))
            .unwrap();
        let entries = h.log.entries();
        let download_at = entries.iter().position(|e| e.starts_with("download")).unwrap();
        let delete_at = entries.iter().position(|e| e.starts_with("delete")).unwrap();
        assert!(download_at < delete_at);
        assert!(entries[delete_at].starts_with("delete /work/"));
        assert!(entries[delete_at].ends_with("-raw.png"));
    }

    #[test]
    fn replay_deletes_superseded_working_copy_but_not_user_original() {
        let mut h = harness(Size::new(300, 300));
        let resumed = Photo {
            uri: ImageUri::from("/photos/cropped.png"),
            original_photo: Some(ImageUri::from("/photos/original.png")),
            original_crop: None,
        };
        h.session.open(&resumed).unwrap();
        h.session.flip(FlipAxis::Vertical).unwrap();
        h.session.flip(FlipAxis::Vertical).unwrap();

        let deletes: Vec<_> = h
            .log
            .entries()
            .into_iter()
            .filter(|e| e.starts_with("delete"))
            .collect();
        // m3 is the first replay of the original; the original itself is kept.
        assert_eq!(deletes, vec!["delete /work/m3.png".to_string()]);
    }

    #[test]
    fn local_source_is_never_downloaded() {
        let mut h = harness(Size::new(300, 300));
        h.session.open(&photo("/photos/a.png")).unwrap();
        h.session.enter_crop_mode();
        h.session.crop_image().unwrap();
        assert!(h.log.entries().iter().all(|e| !e.starts_with("download")));
    }

    #[test]
    fn display_uri_follows_mode() {
        let mut h = harness(Size::new(100, 100));
        h.session.open(&photo("/photos/a.png")).unwrap();
        assert_eq!(h.session.display_uri(), h.session.uri());
        h.session.enter_crop_mode();
        assert_eq!(h.session.display_uri(), h.session.crop_source());
        assert_eq!(h.session.display_uri(), h.session.initial_uri.as_ref());
        h.session.exit_crop_mode();
        assert_eq!(h.session.display_uri(), h.session.uri());
    }

    #[test]
    fn done_reports_current_state() {
        let mut h = harness(Size::new(100, 100));
        assert!(matches!(h.session.done(), Err(EditError::NoImage)));
        h.session.open(&photo("/photos/a.png")).unwrap();
        let chosen = h.session.done().unwrap();
        assert_eq!(chosen.uri, ImageUri::from("/work/m1.png"));
        assert_eq!(chosen.initial_uri, Some(ImageUri::from("/work/m2.png")));
        assert_eq!(chosen.crop, Some(h.session.crop_coords()));
    }
}
