//! Full-screen photo manipulator view.
//!
//! Owns one [`EditSession`] and runs every session action on a worker thread.
//! The session is moved into the worker and handed back with the outcome, so
//! only one action is ever in flight and toolbar buttons are disabled meanwhile.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex, mpsc};

use crate::autosize::{AutoSizeImage, SharedSizeCache, SizeCache, SizeProbe};
use crate::cropper::{self, CropHandles, DragGesture, HANDLE_BOX, HANDLE_DOT};
use crate::decode;
use crate::layout::{self, CropLayout, TOP_BAR_HEIGHT};
use crate::session::{EditError, EditSession, Mode, Services, SessionOptions};
use crate::state::{
    ButtonLabels, ChosenPicture, Corner, FlipAxis, ImageUri, Manipulation, Photo, Point,
};

type Rgba = (Vec<u8>, usize, usize);

enum Job {
    Open(Photo),
    Rotate,
    Flip(FlipAxis),
    Crop,
}

impl Job {
    fn name(&self) -> &'static str {
        match self {
            Job::Open(_) => "open",
            Job::Rotate => "rotate",
            Job::Flip(_) => "flip",
            Job::Crop => "crop",
        }
    }

    fn run(self, session: &mut EditSession) -> Result<Option<Manipulation>, EditError> {
        match self {
            Job::Open(photo) => session.open(&photo).map(|()| None),
            Job::Rotate => session.rotate().map(Some),
            Job::Flip(axis) => session.flip(axis).map(Some),
            Job::Crop => session.crop_image().map(Some),
        }
    }
}

enum BgResult {
    Finished {
        session: Box<EditSession>,
        job: &'static str,
        outcome: Result<Option<Manipulation>, EditError>,
    },
    Texture {
        uri: ImageUri,
        rgba: Result<Rgba, String>,
    },
}

enum TexState {
    Loading,
    Ready(egui::TextureHandle),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Close,
    EnterCrop,
    CancelCrop,
    Rotate,
    Flip(FlipAxis),
    Crop,
    Done,
}

/// Host notifications.
pub struct EditorCallbacks {
    pub on_toggle_modal: Box<dyn FnMut()>,
    pub on_picture_chosen: Box<dyn FnMut(ChosenPicture)>,
    pub on_image_manipulated: Box<dyn FnMut(&Manipulation)>,
}

/// What is painted while the session is away on a worker thread.
#[derive(Clone)]
struct View {
    uri: ImageUri,
    layout: CropLayout,
    mode: Mode,
}

pub struct Editor {
    session: Option<EditSession>,
    view: Option<View>,
    visible: bool,
    labels: ButtonLabels,
    square_aspect: bool,
    handles: Option<CropHandles>,
    gesture: DragGesture,
    autosize: AutoSizeImage,
    textures: HashMap<ImageUri, TexState>,
    http: reqwest::blocking::Client,
    status: Rc<RefCell<Option<String>>>,
    callbacks: EditorCallbacks,
    tx: mpsc::Sender<BgResult>,
    rx: mpsc::Receiver<BgResult>,
}

impl Editor {
    pub fn new(
        ctx: &egui::Context,
        services: Services,
        options: SessionOptions,
        labels: ButtonLabels,
        square_aspect: bool,
        callbacks: EditorCallbacks,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let status = Rc::new(RefCell::new(None));
        let cache: SharedSizeCache = Arc::new(Mutex::new(SizeCache::default()));
        let probe: Arc<dyn SizeProbe> = Arc::clone(&services.probe);
        let probe_status = Rc::clone(&status);
        let autosize = AutoSizeImage::new(cache, probe)
            .with_repaint(ctx.clone())
            .on_height_change(|height| tracing::trace!(height, "display height changed"))
            .on_error(move |err| *probe_status.borrow_mut() = Some(err.to_string()));

        Self {
            session: Some(EditSession::new(services, options)),
            view: None,
            visible: true,
            labels,
            square_aspect,
            handles: None,
            gesture: DragGesture::default(),
            autosize,
            textures: HashMap::new(),
            http: reqwest::blocking::Client::new(),
            status,
            callbacks,
            tx,
            rx,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_processing(&self) -> bool {
        self.session.is_none()
    }

    /// Load `photo`. Ignored while another action is running.
    pub fn open(&mut self, ctx: &egui::Context, photo: Photo) {
        let screen = ctx.screen_rect();
        if let Some(session) = self.session.as_mut() {
            session.set_viewport(screen.width(), screen.height());
        }
        self.spawn(ctx, Job::Open(photo));
    }

    fn spawn(&mut self, ctx: &egui::Context, job: Job) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        let name = job.name();
        tracing::debug!(job = name, "starting session action");
        std::thread::spawn(move || {
            let outcome = job.run(&mut session);
            let _ = tx.send(BgResult::Finished {
                session: Box::new(session),
                job: name,
                outcome,
            });
            ctx2.request_repaint();
        });
    }

    fn load_texture(&mut self, ctx: &egui::Context, uri: &ImageUri) {
        if self.textures.contains_key(uri) {
            return;
        }
        self.textures.insert(uri.clone(), TexState::Loading);

        let uri = uri.clone();
        let http = self.http.clone();
        let tx = self.tx.clone();
        let ctx2 = ctx.clone();
        std::thread::spawn(move || {
            let rgba = read_preview(&http, &uri).map_err(|err| format!("{err:#}"));
            let _ = tx.send(BgResult::Texture { uri, rgba });
            ctx2.request_repaint();
        });
    }

    fn drain(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                BgResult::Finished {
                    session,
                    job,
                    outcome,
                } => {
                    self.session = Some(*session);
                    match outcome {
                        Ok(Some(manipulation)) => {
                            tracing::info!(job, "session action finished");
                            *self.status.borrow_mut() = None;
                            (self.callbacks.on_image_manipulated)(&manipulation);
                        }
                        Ok(None) => {
                            *self.status.borrow_mut() = None;
                        }
                        Err(err) => {
                            tracing::warn!(job, %err, "session action failed");
                            *self.status.borrow_mut() = Some(err.to_string());
                        }
                    }
                    self.sync_handles();
                    self.prune_textures();
                }
                BgResult::Texture { uri, rgba } => {
                    let state = match rgba {
                        Ok((data, w, h)) => {
                            let img = egui::ColorImage::from_rgba_unmultiplied([w, h], &data);
                            TexState::Ready(ctx.load_texture(
                                format!("manipulator_{uri}"),
                                img,
                                egui::TextureOptions::LINEAR,
                            ))
                        }
                        Err(err) => {
                            tracing::warn!(%uri, %err, "could not load preview");
                            TexState::Failed
                        }
                    };
                    if let Some(slot) = self.textures.get_mut(&uri) {
                        *slot = state;
                    }
                }
            }
        }
    }

    /// Crop handles exist exactly while the session is in crop mode, sized to
    /// the current layout.
    fn sync_handles(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.mode() != Mode::Crop {
            self.handles = None;
            self.gesture = DragGesture::default();
            return;
        }
        let layout = session.layout();
        let stale = self
            .handles
            .as_ref()
            .is_none_or(|h| h.bounds() != (layout.width, layout.height));
        if stale {
            self.handles = Some(CropHandles::new(
                layout.width,
                layout.height,
                Some(session.crop_coords()),
            ));
        }
    }

    fn prune_textures(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let keep: Vec<ImageUri> = [session.uri(), session.crop_source()]
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        self.textures.retain(|uri, _| keep.contains(uri));
    }

    fn execute(&mut self, ctx: &egui::Context, command: Command) {
        match command {
            Command::Close => self.toggle_modal(),
            Command::EnterCrop => {
                if let Some(session) = self.session.as_mut() {
                    session.enter_crop_mode();
                }
                self.sync_handles();
            }
            Command::CancelCrop => {
                if let Some(session) = self.session.as_mut() {
                    session.exit_crop_mode();
                }
                self.sync_handles();
            }
            Command::Rotate => self.spawn(ctx, Job::Rotate),
            Command::Flip(axis) => self.spawn(ctx, Job::Flip(axis)),
            Command::Crop => self.spawn(ctx, Job::Crop),
            Command::Done => {
                let Some(session) = self.session.as_ref() else {
                    return;
                };
                match session.done() {
                    Ok(picture) => {
                        (self.callbacks.on_picture_chosen)(picture);
                        self.toggle_modal();
                    }
                    Err(err) => *self.status.borrow_mut() = Some(err.to_string()),
                }
            }
        }
    }

    fn toggle_modal(&mut self) {
        (self.callbacks.on_toggle_modal)();
        if let Some(session) = self.session.as_mut() {
            session.exit_crop_mode();
        }
        self.sync_handles();
    }

    pub fn show(&mut self, ctx: &egui::Context) {
        self.drain(ctx);
        self.autosize.poll();
        if !self.visible {
            return;
        }

        let screen = ctx.screen_rect();
        if let Some(session) = self.session.as_mut() {
            session.set_viewport(screen.width(), screen.height());
            self.view = session.display_uri().map(|uri| View {
                uri: uri.clone(),
                layout: session.layout(),
                mode: session.mode(),
            });
        }
        self.sync_handles();
        if let Some(view) = self.view.clone() {
            self.load_texture(ctx, &view.uri);
        }

        let mut command = None;
        egui::TopBottomPanel::top("manipulator_toolbar")
            .exact_height(TOP_BAR_HEIGHT)
            .show(ctx, |ui| {
                ui.horizontal_centered(|ui| command = self.toolbar(ui));
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE.fill(egui::Color32::BLACK))
            .show(ctx, |ui| self.canvas(ui));

        if let Some(command) = command {
            self.execute(ctx, command);
        }
    }

    fn toolbar(&self, ui: &mut egui::Ui) -> Option<Command> {
        let idle = !self.is_processing();
        let mode = self
            .view
            .as_ref()
            .map(|v| v.mode)
            .unwrap_or_default();
        let mut command = None;

        ui.add_enabled_ui(idle, |ui| match mode {
            Mode::Idle => {
                if ui.button("⬅").clicked() {
                    command = Some(Command::Close);
                }
                ui.separator();
                if ui.button(&self.labels.crop).clicked() {
                    command = Some(Command::EnterCrop);
                }
                if ui.button(&self.labels.rotate).clicked() {
                    command = Some(Command::Rotate);
                }
                if ui.button("⬍ Flip V").clicked() {
                    command = Some(Command::Flip(FlipAxis::Vertical));
                }
                if ui.button("⬌ Flip H").clicked() {
                    command = Some(Command::Flip(FlipAxis::Horizontal));
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button(&self.labels.done).clicked() {
                        command = Some(Command::Done);
                    }
                    self.status_label(ui);
                });
            }
            Mode::Crop => {
                if ui.button("⬅").clicked() {
                    command = Some(Command::CancelCrop);
                }
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let label = if idle {
                        &self.labels.crop
                    } else {
                        &self.labels.processing
                    };
                    if ui.button(label).clicked() {
                        command = Some(Command::Crop);
                    }
                    self.status_label(ui);
                });
            }
        });

        if !idle {
            ui.spinner();
        }
        command
    }

    fn status_label(&self, ui: &mut egui::Ui) {
        if let Some(status) = self.status.borrow().as_deref() {
            ui.colored_label(egui::Color32::from_rgb(0xe0, 0x60, 0x60), status);
        }
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let Some(view) = self.view.clone() else {
            ui.centered_and_justified(|ui| {
                ui.spinner();
            });
            return;
        };

        let area = ui.available_rect_before_wrap();
        let layout = view.layout;

        let image_rect = match view.mode {
            Mode::Crop => egui::Rect::from_min_size(
                area.min + egui::vec2(layout.left, layout.top),
                egui::vec2(layout.width, layout.height),
            ),
            Mode::Idle => {
                let auto_height =
                    self.autosize
                        .request(&view.uri, area.width(), Some(layout.available_height));
                let (w, h) = layout::max_sizes(area.width(), auto_height, self.square_aspect);
                let frame = egui::Rect::from_center_size(area.center(), egui::vec2(w, h));
                match self.textures.get(&view.uri) {
                    Some(TexState::Ready(tex)) => contain(tex.size_vec2(), frame),
                    _ => frame,
                }
            }
        };

        match self.textures.get(&view.uri) {
            Some(TexState::Ready(tex)) => {
                ui.painter().image(
                    tex.id(),
                    image_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }
            Some(TexState::Failed) => {
                ui.painter().text(
                    area.center(),
                    egui::Align2::CENTER_CENTER,
                    "⚠ Could not open image",
                    egui::FontId::proportional(14.0),
                    egui::Color32::LIGHT_GRAY,
                );
            }
            _ => {
                ui.put(image_rect, egui::Spinner::new());
            }
        }

        if view.mode == Mode::Crop {
            self.crop_overlay(ui, image_rect);
        }

        if self.is_processing() {
            ui.painter()
                .rect_filled(area, 0.0, egui::Color32::from_black_alpha(80));
        }
    }

    fn crop_overlay(&mut self, ui: &mut egui::Ui, rect: egui::Rect) {
        let Some(handles) = self.handles.as_mut() else {
            return;
        };
        let local = |p: egui::Pos2| Point::new(p.x - rect.min.x, p.y - rect.min.y);
        let screen = |p: Point| rect.min + egui::vec2(p.x, p.y);

        if let Some(session) = self.session.as_mut() {
            let response = ui.interact(
                rect.expand(HANDLE_BOX),
                ui.id().with("crop_handles"),
                egui::Sense::drag(),
            );
            if response.drag_started() {
                if let Some(origin) = ui.input(|i| i.pointer.press_origin()) {
                    self.gesture.grab(handles, local(origin));
                }
            }
            if response.dragged() {
                if let Some(pos) = response.interact_pointer_pos() {
                    self.gesture.move_to(handles, local(pos));
                }
            }
            if response.drag_stopped() {
                if let Some(quad) = self.gesture.release(handles) {
                    session.set_crop_coords(quad);
                }
            }
        }

        let live = handles.live();
        let points: Vec<egui::Pos2> = Corner::ALL.iter().map(|&c| screen(live.get(c))).collect();
        let stroke = egui::Stroke::new(3.0, egui::Color32::from_gray(164));
        // Crossed or dented quads would be fan-filled wrongly; outline only.
        if cropper::is_convex(&live) {
            ui.painter().add(egui::Shape::convex_polygon(
                points.clone(),
                egui::Color32::from_black_alpha(128),
                egui::Stroke::NONE,
            ));
        }
        ui.painter().add(egui::Shape::closed_line(points, stroke));

        for corner in Corner::ALL {
            let origin = handles.hit_box_origin(corner);
            let center = screen(Point::new(
                origin.x + HANDLE_BOX / 2.0,
                origin.y + HANDLE_BOX / 2.0,
            ));
            let fill = if self.gesture.active() == Some(corner) {
                egui::Color32::from_rgb(0xff, 0x60, 0x60)
            } else {
                egui::Color32::RED
            };
            ui.painter().circle_filled(center, HANDLE_DOT / 2.0, fill);
        }
    }
}

/// Largest rect with `size`'s aspect ratio centred inside `frame`.
fn contain(size: egui::Vec2, frame: egui::Rect) -> egui::Rect {
    if size.x <= 0.0 || size.y <= 0.0 {
        return frame;
    }
    let scale = (frame.width() / size.x).min(frame.height() / size.y);
    egui::Rect::from_center_size(frame.center(), size * scale)
}

fn read_preview(http: &reqwest::blocking::Client, uri: &ImageUri) -> anyhow::Result<Rgba> {
    if let Some(path) = uri.local_path() {
        return decode::preview_rgba(path);
    }
    let bytes = http
        .get(uri.as_str())
        .send()?
        .error_for_status()?
        .bytes()?;
    decode::preview_rgba_from_memory(&bytes)
}
