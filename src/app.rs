use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use crate::autosize::HeaderProbe;
use crate::config::AppConfig;
use crate::editor::{Editor, EditorCallbacks};
use crate::processing::{LocalManipulator, PerspectiveCropper};
use crate::session::{Services, SessionOptions};
use crate::state::{ChosenPicture, Manipulation, Photo};
use crate::storage::LocalFileStore;

/// Launch-time choices that are not persisted.
pub struct LaunchOptions {
    pub photo: Photo,
    pub print_events: bool,
    pub square_aspect: bool,
}

pub struct ManipulatorApp {
    editor: Editor,
    /// Opened on the first frame, once the viewport has a real size.
    pending: Option<Photo>,
    closed: Rc<Cell<bool>>,
    config: AppConfig,
}

impl ManipulatorApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig, launch: LaunchOptions) -> Self {
        let work_dir = config.resolve_work_dir();
        tracing::info!(work_dir = %work_dir.display(), "starting editor");

        let services = Services {
            manipulator: Arc::new(LocalManipulator::new(work_dir.clone())),
            cropper: Arc::new(PerspectiveCropper),
            store: Arc::new(LocalFileStore::new()),
            probe: Arc::new(HeaderProbe::new()),
        };
        let options = SessionOptions {
            save: config.save_options,
            editable_width: config.editable_width,
            work_dir,
        };

        let closed = Rc::new(Cell::new(false));
        let on_close = Rc::clone(&closed);
        let print_events = launch.print_events;
        let callbacks = EditorCallbacks {
            on_toggle_modal: Box::new(move || on_close.set(true)),
            on_picture_chosen: Box::new(|picture| match picture_json(&picture) {
                Ok(json) => println!("{json}"),
                Err(err) => tracing::error!(%err, "could not serialise chosen picture"),
            }),
            on_image_manipulated: Box::new(move |manipulation| {
                tracing::info!(?manipulation, "image manipulated");
                if !print_events {
                    return;
                }
                match event_line(manipulation) {
                    Ok(line) => println!("{line}"),
                    Err(err) => tracing::error!(%err, "could not serialise event"),
                }
            }),
        };

        let editor = Editor::new(
            &cc.egui_ctx,
            services,
            options,
            config.labels.clone(),
            launch.square_aspect || config.square_aspect,
            callbacks,
        );

        Self {
            editor,
            pending: Some(launch.photo),
            closed,
            config,
        }
    }
}

fn picture_json(picture: &ChosenPicture) -> serde_json::Result<String> {
    serde_json::to_string_pretty(picture)
}

/// One compact JSON object per line.
fn event_line(manipulation: &Manipulation) -> serde_json::Result<String> {
    serde_json::to_string(manipulation)
}

impl eframe::App for ManipulatorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let viewport_rect = ctx.input(|i| i.viewport().inner_rect);

        // Track window size for saving on exit
        if let Some(rect) = viewport_rect {
            self.config.window_width = Some(rect.width());
            self.config.window_height = Some(rect.height());
        }

        if let Some(photo) = self.pending.take() {
            self.editor.open(ctx, photo);
        }
        self.editor.show(ctx);

        if self.closed.get() && self.editor.is_visible() {
            self.editor.set_visible(false);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.config.save();
    }
}
